//! Locale-aware number parsing for spreadsheet cell text
//!
//! Government spreadsheets mix Khmer and ASCII digits, use `,` and `.` for
//! both grouping and decimals, and write negatives in accounting style. The
//! parser here turns that text into a number on a best-effort basis and never
//! fails: unparseable input degrades to [`ParsedNumber::Empty`] or, when the
//! input is non-empty but not numeric, optionally to [`ParsedNumber::Text`].

use crate::reader::CellValue;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Result of parsing a cell value as a number
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedNumber {
    /// A finite number
    Number(f64),
    /// No data. Distinct from zero.
    Empty,
    /// Input that could not be read as a number, returned unchanged
    Text(String),
}

impl ParsedNumber {
    /// Get the number, treating `Empty` and `Text` as no value
    pub fn as_number(&self) -> Option<f64> {
        match self {
            ParsedNumber::Number(n) => Some(*n),
            _ => None,
        }
    }
}

/// How `,` and `.` are told apart when both may appear in a number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SeparatorPolicy {
    /// The thousands-then-decimal heuristic tuned to Khmer and French style
    /// government spreadsheets: a lone `,` always groups thousands, a lone
    /// `.` groups thousands only when the digits after it look like a
    /// thousands group, and when both occur the one followed by 1-2 trailing
    /// digits is the decimal mark.
    #[default]
    ThousandsThenDecimal,
    /// `,` groups thousands, `.` is the decimal mark
    DecimalPoint,
    /// `.` groups thousands, `,` is the decimal mark
    DecimalComma,
}

/// What to return for non-empty input that contains no number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnparsedText {
    /// Treat it like an empty cell
    #[default]
    Empty,
    /// Hand the original text back so callers can flag it
    Keep,
}

/// Number parser configured with a separator policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumberParser {
    #[serde(default)]
    pub separator_policy: SeparatorPolicy,
    #[serde(default)]
    pub unparsed_text: UnparsedText,
}

impl NumberParser {
    pub fn new(separator_policy: SeparatorPolicy, unparsed_text: UnparsedText) -> Self {
        Self {
            separator_policy,
            unparsed_text,
        }
    }

    /// Parse a typed cell value.
    ///
    /// Finite numbers pass through unchanged and text goes through
    /// [`NumberParser::parse_str`]. Formulas are not evaluated here.
    pub fn parse_value(&self, value: &CellValue) -> ParsedNumber {
        match value {
            CellValue::Number(n) if n.is_finite() => ParsedNumber::Number(*n),
            CellValue::Number(n) => self.parse_str(&n.to_string()),
            CellValue::Text(s) => self.parse_str(s),
            CellValue::Empty
            | CellValue::Boolean(_)
            | CellValue::Error(_)
            | CellValue::Formula(_) => ParsedNumber::Empty,
        }
    }

    /// Parse spreadsheet text into a number
    pub fn parse_str(&self, input: &str) -> ParsedNumber {
        let normalized = normalize_text(input);
        let mut text = normalized.trim();
        if text.is_empty() {
            return ParsedNumber::Empty;
        }

        // Percent and accounting parentheses may nest either way: (12%) or (12)%
        let mut percent = false;
        let mut negate = false;
        for _ in 0..2 {
            if !percent {
                if let Some(rest) = text.strip_suffix('%') {
                    percent = true;
                    text = rest.trim_end();
                    continue;
                }
            }
            if !negate && text.len() >= 2 && text.starts_with('(') && text.ends_with(')') {
                negate = true;
                text = text[1..text.len() - 1].trim();
                continue;
            }
            break;
        }

        let canonical = self.separator_policy.canonicalize(text);
        let Some(run) = numeric_run_regex().find(&canonical) else {
            return self.unparsed(input);
        };

        let digits: String = run.as_str().chars().filter(|c| *c != ' ').collect();
        let Ok(mut value) = digits.parse::<f64>() else {
            return ParsedNumber::Text(input.to_string());
        };

        if percent {
            value /= 100.0;
        }
        if negate {
            value = -value;
        }

        if value.is_finite() {
            ParsedNumber::Number(value)
        } else {
            ParsedNumber::Text(input.to_string())
        }
    }

    fn unparsed(&self, input: &str) -> ParsedNumber {
        match self.unparsed_text {
            UnparsedText::Empty => ParsedNumber::Empty,
            UnparsedText::Keep => ParsedNumber::Text(input.to_string()),
        }
    }
}

impl SeparatorPolicy {
    /// Rewrite `text` so that grouping marks are gone and the decimal mark
    /// (if any) is `.`
    fn canonicalize(self, text: &str) -> String {
        let has_comma = text.contains(',');
        let has_dot = text.contains('.');

        match self {
            SeparatorPolicy::DecimalPoint => text.replace(',', ""),
            SeparatorPolicy::DecimalComma => text.replace('.', "").replace(',', "."),
            SeparatorPolicy::ThousandsThenDecimal => match (has_comma, has_dot) {
                (true, true) => {
                    let decimal = match trailing_decimal_mark(text) {
                        Some(mark) => mark,
                        None => {
                            // Neither mark has a short tail: the right-most one wins
                            let last_comma = text.rfind(',').unwrap_or(0);
                            let last_dot = text.rfind('.').unwrap_or(0);
                            if last_comma > last_dot { ',' } else { '.' }
                        }
                    };
                    if decimal == ',' {
                        text.replace('.', "").replace(',', ".")
                    } else {
                        text.replace(',', "")
                    }
                }
                (true, false) => text.replace(',', ""),
                (false, true) if dots_are_grouping(text) => text.replace('.', ""),
                _ => text.to_string(),
            },
        }
    }
}

/// The separator followed by exactly one or two digits at the end of `text`
fn trailing_decimal_mark(text: &str) -> Option<char> {
    let caps = trailing_decimal_regex().captures(text)?;
    caps.get(1)?.as_str().chars().next()
}

/// Whether the dots in `text` (which has no commas) are thousands separators
fn dots_are_grouping(text: &str) -> bool {
    if text.matches('.').count() >= 2 {
        return true;
    }
    match dot_group_regex().captures(text) {
        // A lone leading zero never starts a thousands group: 0.125 is a decimal
        Some(caps) => caps.get(1).is_some_and(|lead| lead.as_str() != "0"),
        None => false,
    }
}

fn numeric_run_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"-?\d{1,3}(?: \d{3})+(?:\.\d+)?|-?\d+(?:\.\d+)?|-?\.\d+").unwrap()
    })
}

fn trailing_decimal_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d([.,])\d{1,2}\s*$").unwrap())
}

fn dot_group_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?:^|[^\d])(\d{1,3})\.\d{3}\s*$").unwrap())
}

/// Parse text with the default policy
pub fn parse_locale_number(input: &str) -> ParsedNumber {
    NumberParser::default().parse_str(input)
}

/// ASCII value of a Khmer digit (០-៩)
pub fn khmer_digit_value(ch: char) -> Option<u32> {
    match ch {
        '\u{17E0}'..='\u{17E9}' => Some(ch as u32 - 0x17E0),
        _ => None,
    }
}

/// Replace Khmer digits with their ASCII equivalents
fn normalize_khmer_digits(input: &str) -> String {
    input
        .chars()
        .map(|ch| match khmer_digit_value(ch) {
            Some(d) => char::from_digit(d, 10).unwrap_or(ch),
            None => ch,
        })
        .collect()
}

fn normalize_text(input: &str) -> String {
    normalize_khmer_digits(input)
        .chars()
        .filter(|ch| *ch != '\u{200B}' && *ch != '\u{FEFF}')
        .map(|ch| match ch {
            '\u{00A0}' | '\u{2007}' | '\u{2009}' | '\u{202F}' => ' ',
            '\u{2212}' => '-',
            _ => ch,
        })
        .collect()
}
