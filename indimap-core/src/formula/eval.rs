//! Evaluates a parsed formula against the HC and HOSP workbooks

use log::{debug, warn};
use std::cell::RefCell;
use std::collections::HashMap;

use super::FormulaError;
use super::ast::{BinaryOperator, Expr, Function, Source};
use super::parser::parse;
use crate::reader::parser_utils::split_sheet_ref;
use crate::reader::{Sheet, Workbook};
use crate::resolver::Resolver;

/// Digits beyond this are below f64 precision anyway
const MAX_ROUND_DIGITS: f64 = 15.0;

type EvalResult = Result<f64, FormulaError>;

/// Workbook whose cells bare references (`B2`, `Data!A1:A4`) point into
#[derive(Debug, Clone, Copy)]
struct LocalScope<'a> {
    source: Source,
    default_sheet: Option<&'a Sheet>,
}

/// Everything a formula can see while it is evaluated.
///
/// HC/HOSP lookups are memoised for the lifetime of the context, and any
/// sheet that could not be found is remembered so the caller can report it.
#[derive(Debug)]
pub struct EvalContext<'a> {
    resolver: Resolver,
    hc: Option<&'a Workbook>,
    hosp: Option<&'a Workbook>,
    hc_value: Option<f64>,
    hosp_value: Option<f64>,
    local: Option<LocalScope<'a>>,
    memo: RefCell<HashMap<(Source, String), f64>>,
    warnings: RefCell<Vec<String>>,
}

impl<'a> EvalContext<'a> {
    pub fn new(resolver: Resolver) -> Self {
        Self {
            resolver,
            hc: None,
            hosp: None,
            hc_value: None,
            hosp_value: None,
            local: None,
            memo: RefCell::new(HashMap::new()),
            warnings: RefCell::new(Vec::new()),
        }
    }

    /// Workbooks that `HC("...")` and `HOSP("...")` read from
    pub fn with_workbooks(mut self, hc: Option<&'a Workbook>, hosp: Option<&'a Workbook>) -> Self {
        self.hc = hc;
        self.hosp = hosp;
        self
    }

    /// Values that bare `HC` and `HOSP` stand for
    pub fn with_values(mut self, hc: Option<f64>, hosp: Option<f64>) -> Self {
        self.hc_value = hc;
        self.hosp_value = hosp;
        self
    }

    /// Make bare cell references read the `source` workbook. References
    /// without a sheet part read `default_sheet`, or the first sheet when
    /// none is given.
    pub fn with_local(mut self, source: Source, default_sheet: Option<&'a Sheet>) -> Self {
        self.local = Some(LocalScope {
            source,
            default_sheet,
        });
        self
    }

    /// Sheet-not-found messages collected so far, in order of discovery
    pub fn warnings(&self) -> Vec<String> {
        self.warnings.borrow().clone()
    }

    /// Evaluate a formula. Blank input, parse or evaluation errors and
    /// non-finite results all give `None`.
    pub fn evaluate(&self, formula: &str) -> Option<f64> {
        if formula.trim().is_empty() {
            return None;
        }

        match self.try_evaluate(formula) {
            Ok(value) if value.is_finite() => Some(value),
            Ok(value) => {
                debug!("formula {:?} evaluated to {}", formula, value);
                None
            }
            Err(e) => {
                debug!("formula {:?} failed: {}", formula, e);
                None
            }
        }
    }

    /// Evaluate a result formula. A blank formula adds up whichever of the
    /// HC and HOSP values are present.
    pub fn evaluate_result(&self, formula: &str) -> Option<f64> {
        if !formula.trim().is_empty() {
            return self.evaluate(formula);
        }
        match (self.hc_value, self.hosp_value) {
            (Some(hc), Some(hosp)) => Some(hc + hosp),
            (Some(value), None) | (None, Some(value)) => Some(value),
            (None, None) => None,
        }
    }

    /// Parse and evaluate, keeping the error
    pub fn try_evaluate(&self, formula: &str) -> EvalResult {
        let expr = parse(formula)?;
        self.eval(&expr)
    }

    fn eval(&self, expr: &Expr) -> EvalResult {
        match expr {
            Expr::Number(n) => Ok(*n),
            Expr::Text(s) => Err(FormulaError::UnexpectedText(s.clone())),
            Expr::Source(Source::Hc) => Ok(self.hc_value.unwrap_or(0.0)),
            Expr::Source(Source::Hosp) => Ok(self.hosp_value.unwrap_or(0.0)),
            Expr::Reference(reference) => self.local_reference(reference),
            Expr::Negate(inner) => Ok(-self.eval(inner)?),
            Expr::Chain { first, rest } => {
                let mut total = self.eval(first)?;
                for (op, operand) in rest {
                    let value = self.eval(operand)?;
                    total = match op {
                        BinaryOperator::Add => total + value,
                        BinaryOperator::Subtract => total - value,
                        BinaryOperator::Multiply => total * value,
                        BinaryOperator::Divide => total / value,
                    };
                }
                Ok(total)
            }
            Expr::Call { function, args } => self.call(*function, args),
        }
    }

    fn call(&self, function: Function, args: &[Expr]) -> EvalResult {
        match function {
            Function::Lookup(source) => {
                let [arg] = args else {
                    return Err(arity(function, "1", args.len()));
                };
                match arg {
                    Expr::Text(reference) | Expr::Reference(reference) => {
                        Ok(self.lookup(source, reference))
                    }
                    _ => Err(FormulaError::Parse(format!(
                        "{} expects a quoted reference",
                        function.name()
                    ))),
                }
            }
            Function::Num => {
                let [arg] = args else {
                    return Err(arity(function, "1", args.len()));
                };
                Ok(match arg {
                    Expr::Text(text) => self.resolver.parser().parse_str(text).as_number(),
                    other => self.eval(other).ok(),
                }
                .filter(|n| n.is_finite())
                .unwrap_or(0.0))
            }
            Function::Sum | Function::Avg | Function::Min | Function::Max => {
                let values = args
                    .iter()
                    .map(|arg| self.eval(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                if values.is_empty() {
                    return Ok(0.0);
                }
                Ok(match function {
                    Function::Sum => values.iter().sum(),
                    Function::Avg => values.iter().sum::<f64>() / values.len() as f64,
                    Function::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
                    _ => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                })
            }
            Function::Round => {
                let (value, digits) = match args {
                    [value] => (self.eval(value)?, 0.0),
                    [value, digits] => (self.eval(value)?, self.eval(digits)?),
                    _ => return Err(arity(function, "1 or 2", args.len())),
                };
                Ok(round_half_away(value, digits))
            }
        }
    }

    /// `HC("Sheet!B2")`: anything that cannot be resolved reads as 0
    fn lookup(&self, source: Source, reference: &str) -> f64 {
        let key = (source, reference.trim().to_string());
        if let Some(&value) = self.memo.borrow().get(&key) {
            return value;
        }

        let value = self
            .workbook(source)
            .and_then(|workbook| {
                let (sheet_name, address) = split_sheet_ref(reference);
                let sheet = match sheet_name {
                    Some(name) => {
                        let sheet = workbook.find_sheet(&name);
                        if sheet.is_none() {
                            self.missing_sheet(source.name(), &name);
                        }
                        sheet
                    }
                    None => workbook.sheets.first(),
                }?;
                self.resolver.read(sheet, address)
            })
            .unwrap_or(0.0);

        self.memo.borrow_mut().insert(key, value);
        value
    }

    fn workbook(&self, source: Source) -> Option<&'a Workbook> {
        match source {
            Source::Hc => self.hc,
            Source::Hosp => self.hosp,
        }
    }

    fn local_reference(&self, reference: &str) -> EvalResult {
        let no_local = || FormulaError::NoLocalWorkbook(reference.to_string());
        let local = self.local.ok_or_else(no_local)?;
        let workbook = self.workbook(local.source).ok_or_else(no_local)?;

        let (sheet_name, address) = split_sheet_ref(reference);
        let sheet = match sheet_name {
            Some(name) => {
                let sheet = workbook.find_sheet(&name);
                if sheet.is_none() {
                    self.missing_sheet(local.source.name(), &name);
                }
                sheet
            }
            None => local.default_sheet.or_else(|| workbook.sheets.first()),
        };

        Ok(sheet
            .and_then(|sheet| self.resolver.read(sheet, address))
            .unwrap_or(0.0))
    }

    fn missing_sheet(&self, workbook: &str, sheet: &str) {
        let message = format!("sheet '{}' not found in {} workbook", sheet, workbook);
        let mut warnings = self.warnings.borrow_mut();
        if !warnings.contains(&message) {
            warn!("{}", message);
            warnings.push(message);
        }
    }
}

fn arity(function: Function, expected: &'static str, found: usize) -> FormulaError {
    FormulaError::Arity {
        function: function.name(),
        expected,
        found,
    }
}

/// Round half away from zero; `digits` is floored and kept within 0..=15
pub fn round_half_away(value: f64, digits: f64) -> f64 {
    let digits = if digits.is_finite() {
        digits.floor().clamp(0.0, MAX_ROUND_DIGITS)
    } else {
        0.0
    };
    let factor = 10f64.powi(digits as i32);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::{CellValue, MergeRegion};

    fn data_sheet(name: &str) -> Sheet {
        Sheet::new(name)
            .with_cell(1, 1, CellValue::Text("1,234".to_string()))
            .with_cell(2, 2, CellValue::Number(766.0))
            .with_cell(4, 0, CellValue::Number(10.0))
            .with_merge(MergeRegion::new(4, 0, 5, 1))
    }

    fn eval(formula: &str) -> Option<f64> {
        EvalContext::new(Resolver::default()).evaluate(formula)
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(eval("1 + 2 * 3"), Some(7.0));
        assert_eq!(eval("(1 + 2) * 3"), Some(9.0));
        assert_eq!(eval("-2 - -3"), Some(1.0));
        assert_eq!(eval("=10 / 4;"), Some(2.5));
        assert_eq!(eval("1 / 0"), None);
        assert_eq!(eval("   "), None);
    }

    #[test]
    fn test_long_operator_runs() {
        let sum = format!("{}1", "1+".repeat(20_000));
        assert_eq!(eval(&sum), Some(20_001.0));

        let product = format!("{}2", "1*".repeat(25_000));
        assert_eq!(eval(&product), Some(2.0));

        let dangling = format!("{}+", "1+".repeat(20_000));
        assert_eq!(eval(&dangling), None);
    }

    #[test]
    fn test_aggregates() {
        assert_eq!(eval("SUM(1,2,SUM(3,4))"), Some(10.0));
        assert_eq!(eval("avg(2, 4)"), Some(3.0));
        assert_eq!(eval("MIN(5, -1, 3)"), Some(-1.0));
        assert_eq!(eval("MAX(5, -1, 3)"), Some(5.0));
        assert_eq!(eval("SUM()"), Some(0.0));
        assert_eq!(eval("SUM(1,2"), None);
    }

    #[test]
    fn test_round() {
        assert_eq!(eval("ROUND(2.5)"), Some(3.0));
        assert_eq!(eval("ROUND(-2.5)"), Some(-3.0));
        assert_eq!(eval("ROUND(1.2345, 2)"), Some(1.23));
        assert_eq!(eval("ROUND(1.5, -2)"), Some(2.0));
        assert_eq!(eval("ROUND(1.26, 1.9)"), Some(1.3));
        assert_eq!(eval("ROUND(1, 2, 3)"), None);
    }

    #[test]
    fn test_num() {
        assert_eq!(eval(r#"NUM("1.234,5")"#), Some(1234.5));
        assert_eq!(eval(r#"NUM("(12%)")"#), Some(-0.12));
        assert_eq!(eval(r#"NUM("n/a")"#), Some(0.0));
        assert_eq!(eval("NUM(1 + 1)"), Some(2.0));
    }

    #[test]
    fn test_text_outside_lookup_fails() {
        assert_eq!(eval(r#""5" + 1"#), None);
    }

    #[test]
    fn test_sources() {
        let ctx = EvalContext::new(Resolver::default()).with_values(Some(3.0), None);
        assert_eq!(ctx.evaluate("HC * 2 + HOSP"), Some(6.0));
        assert_eq!(ctx.evaluate_result(""), Some(3.0));

        let ctx = EvalContext::new(Resolver::default()).with_values(Some(3.0), Some(4.0));
        assert_eq!(ctx.evaluate_result("  "), Some(7.0));
        assert_eq!(ctx.evaluate_result("HC - HOSP"), Some(-1.0));

        let ctx = EvalContext::new(Resolver::default());
        assert_eq!(ctx.evaluate_result(""), None);
    }

    #[test]
    fn test_workbook_lookups() {
        let hc = Workbook::new(vec![Sheet::new("Cover"), data_sheet("Data")]);
        let hosp = Workbook::new(vec![data_sheet("Page1")]);
        let ctx = EvalContext::new(Resolver::default()).with_workbooks(Some(&hc), Some(&hosp));

        assert_eq!(ctx.evaluate(r#"HC("Data!B2") + HOSP("Page1!C3")"#), Some(2000.0));
        assert_eq!(ctx.evaluate(r#"HC("2!$B$2")"#), Some(1234.0));
        assert_eq!(ctx.evaluate(r#"hosp("A5:B6")"#), Some(10.0));
        assert_eq!(ctx.evaluate(r#"HC("Data!Z99") + 1"#), Some(1.0));
        assert_eq!(ctx.evaluate(r#"SUM(HC("Data!B2,C3"), 3)"#), Some(3.0));
        assert_eq!(ctx.evaluate(r#"HC("Missing!A1") + 1"#), Some(1.0));
        assert_eq!(
            ctx.warnings(),
            vec!["sheet 'Missing' not found in HC workbook".to_string()]
        );
    }

    #[test]
    fn test_lookups_without_workbook_read_zero() {
        let ctx = EvalContext::new(Resolver::default());
        assert_eq!(ctx.evaluate(r#"HC("Data!B2") + 5"#), Some(5.0));
        assert_eq!(ctx.evaluate(r#"SUM(HC("Sheet!A1,B2"), 3)"#), Some(3.0));
    }

    #[test]
    fn test_local_references() {
        let hc = Workbook::new(vec![Sheet::new("Cover"), data_sheet("Data")]);
        let data = &hc.sheets[1];

        let ctx = EvalContext::new(Resolver::default())
            .with_workbooks(Some(&hc), None)
            .with_local(Source::Hc, Some(data));
        assert_eq!(ctx.evaluate("B2 + C3"), Some(2000.0));
        assert_eq!(ctx.evaluate("SUM(A5:B6, 1)"), Some(11.0));
        assert_eq!(ctx.evaluate("Data!B2 - 34"), Some(1200.0));
        assert_eq!(ctx.evaluate("Z9 + 1"), Some(1.0));
        assert_eq!(ctx.evaluate("Nope!A1 + 1"), Some(1.0));
        assert_eq!(
            ctx.warnings(),
            vec!["sheet 'Nope' not found in HC workbook".to_string()]
        );

        // First sheet when no default is given
        let ctx = EvalContext::new(Resolver::default())
            .with_workbooks(None, Some(&hc))
            .with_local(Source::Hosp, None);
        assert_eq!(ctx.evaluate("B2 + 1"), Some(1.0));
        assert_eq!(ctx.evaluate("Data!B2 + 1"), Some(1235.0));

        let ctx = EvalContext::new(Resolver::default());
        assert_eq!(ctx.evaluate("B2 + 1"), None);

        let ctx = EvalContext::new(Resolver::default()).with_local(Source::Hc, None);
        assert_eq!(ctx.evaluate("B2 + 1"), None);
    }
}
