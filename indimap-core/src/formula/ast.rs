//! Abstract syntax tree for mapping formulas

/// One of the two input workbooks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    Hc,
    Hosp,
}

impl Source {
    pub fn name(self) -> &'static str {
        match self {
            Source::Hc => "HC",
            Source::Hosp => "HOSP",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        if name.eq_ignore_ascii_case("HC") {
            Some(Source::Hc)
        } else if name.eq_ignore_ascii_case("HOSP") {
            Some(Source::Hosp)
        } else {
            None
        }
    }
}

/// Built-in functions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    /// `HC("Sheet!A1")` / `HOSP("Sheet!A1")`
    Lookup(Source),
    Num,
    Sum,
    Avg,
    Min,
    Max,
    Round,
}

impl Function {
    /// Look up a function by name (case-insensitive)
    pub fn from_name(name: &str) -> Option<Self> {
        if let Some(source) = Source::from_name(name) {
            return Some(Function::Lookup(source));
        }
        match name.to_ascii_uppercase().as_str() {
            "NUM" => Some(Function::Num),
            "SUM" => Some(Function::Sum),
            "AVG" | "AVERAGE" => Some(Function::Avg),
            "MIN" => Some(Function::Min),
            "MAX" => Some(Function::Max),
            "ROUND" => Some(Function::Round),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Function::Lookup(source) => source.name(),
            Function::Num => "NUM",
            Function::Sum => "SUM",
            Function::Avg => "AVG",
            Function::Min => "MIN",
            Function::Max => "MAX",
            Function::Round => "ROUND",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
}

/// Parsed formula expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    /// String literal, only meaningful as an argument of HC, HOSP or NUM
    Text(String),
    /// Bare `HC` / `HOSP`: the caller-supplied value for the indicator
    Source(Source),
    /// Cell or range in the local workbook: `B2`, `Data!B2:C5`
    Reference(String),
    Negate(Box<Expr>),
    /// Left-associative run of operators of one precedence level:
    /// `first op1 e1 op2 e2 ...`. Kept flat so long sums stay shallow.
    Chain {
        first: Box<Expr>,
        rest: Vec<(BinaryOperator, Expr)>,
    },
    Call {
        function: Function,
        args: Vec<Expr>,
    },
}

impl Expr {
    pub(crate) fn source_from_name(name: &str) -> Option<Expr> {
        Source::from_name(name).map(Expr::Source)
    }
}
