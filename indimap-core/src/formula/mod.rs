//! Mapping formula language
//!
//! Formulas combine values from the HC and HOSP workbooks:
//!
//! ```text
//! ROUND(HC("Data!B2") / NUM("1 000") * 100, 1)
//! SUM(HC("Page 2!C4:C9"), HOSP("OPD!D7"))
//! HC + HOSP
//! ```
//!
//! Source text is tokenized, parsed into an [`ast::Expr`] and evaluated by
//! an [`EvalContext`]. Failures never escape as errors: a formula that
//! cannot be evaluated has no value.

pub mod ast;
pub mod eval;
mod lexer;
pub mod parser;
mod token;

pub use crate::error::FormulaError;
pub use eval::{EvalContext, round_half_away};
pub use parser::parse;

use crate::resolver::Resolver;

/// Evaluate the formula that combines an indicator's HC and HOSP values.
///
/// A blank formula sums whichever values are present and gives `None`
/// when both are missing.
pub fn eval_result_formula(formula: &str, hc: Option<f64>, hosp: Option<f64>) -> Option<f64> {
    EvalContext::new(Resolver::default())
        .with_values(hc, hosp)
        .evaluate_result(formula)
}

/// Split function arguments on commas that sit outside parentheses and
/// quotes. Each argument is trimmed.
pub fn split_args_top_level(args: &str) -> Vec<&str> {
    if args.trim().is_empty() {
        return Vec::new();
    }

    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (i, ch) in args.char_indices() {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(ch),
            (None, '(') => depth += 1,
            (None, ')') => depth = depth.saturating_sub(1),
            (None, ',') if depth == 0 => {
                parts.push(args[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(args[start..].trim());

    parts
}
