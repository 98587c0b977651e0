//! Mapping rules and the preview they produce
//!
//! A mapping rule says where an indicator's HC and HOSP values live in the
//! uploaded workbooks and how the two combine into a total. Previewing a
//! [`MappingSet`] evaluates every rule against the decoded workbooks and
//! yields one [`PreviewRow`] per rule, in rule order.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::config::PreviewConfig;
use crate::error::MappingError;
use crate::formula::EvalContext;
use crate::formula::ast::Source;
use crate::reader::Workbook;
use crate::resolver::Resolver;

/// Where one indicator's values come from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MappingRule {
    #[serde(deserialize_with = "string_or_number")]
    pub indicator_id: String,
    #[serde(deserialize_with = "string_or_null")]
    pub hc_sheet: String,
    #[serde(deserialize_with = "string_or_null")]
    pub hc_cell: String,
    #[serde(deserialize_with = "string_or_null")]
    pub hc_formula: String,
    #[serde(deserialize_with = "string_or_null")]
    pub hosp_sheet: String,
    #[serde(deserialize_with = "string_or_null")]
    pub hosp_cell: String,
    #[serde(deserialize_with = "string_or_null")]
    pub hosp_formula: String,
    #[serde(deserialize_with = "string_or_null")]
    pub result_formula: String,
    #[serde(deserialize_with = "flag")]
    pub active: bool,
}

impl Default for MappingRule {
    fn default() -> Self {
        Self {
            indicator_id: String::new(),
            hc_sheet: String::new(),
            hc_cell: String::new(),
            hc_formula: String::new(),
            hosp_sheet: String::new(),
            hosp_cell: String::new(),
            hosp_formula: String::new(),
            result_formula: String::new(),
            active: true,
        }
    }
}

/// The sheet/cell/formula triple for one workbook
#[derive(Debug, Clone, Copy)]
struct Side<'r> {
    source: Source,
    sheet: &'r str,
    cell: &'r str,
    formula: &'r str,
}

impl MappingRule {
    pub fn new(indicator_id: impl Into<String>) -> Self {
        Self {
            indicator_id: indicator_id.into(),
            ..Default::default()
        }
    }

    fn side(&self, source: Source) -> Side<'_> {
        match source {
            Source::Hc => Side {
                source,
                sheet: &self.hc_sheet,
                cell: &self.hc_cell,
                formula: &self.hc_formula,
            },
            Source::Hosp => Side {
                source,
                sheet: &self.hosp_sheet,
                cell: &self.hosp_cell,
                formula: &self.hosp_formula,
            },
        }
    }
}

/// Catalog entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Indicator {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default, deserialize_with = "string_or_null")]
    pub name: String,
}

/// Indicator catalog plus the rules to preview
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MappingSet {
    #[serde(default)]
    pub indicators: Vec<Indicator>,
    #[serde(default)]
    pub rules: Vec<MappingRule>,
}

impl MappingSet {
    /// Load from a `.json` or `.toml` file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, MappingError> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "json" => Self::from_json(&fs::read_to_string(path)?),
            "toml" => Self::from_toml(&fs::read_to_string(path)?),
            _ => Err(MappingError::UnsupportedFormat(extension)),
        }
    }

    pub fn from_json(content: &str) -> Result<Self, MappingError> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn from_toml(content: &str) -> Result<Self, MappingError> {
        Ok(toml::from_str(content)?)
    }
}

/// One previewed indicator
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreviewRow {
    pub indicator_id: String,
    pub name: String,
    #[serde(serialize_with = "number_or_blank")]
    pub hc: Option<f64>,
    #[serde(serialize_with = "number_or_blank")]
    pub hosp: Option<f64>,
    #[serde(serialize_with = "number_or_blank")]
    pub total: Option<f64>,
    /// The indicator id exists in the catalog
    pub valid: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PreviewReport {
    pub rows: Vec<PreviewRow>,
    /// Distinct sheet-not-found messages in order of discovery
    pub warnings: Vec<String>,
}

impl PreviewReport {
    pub fn invalid_count(&self) -> usize {
        self.rows.iter().filter(|row| !row.valid).count()
    }

    fn warn(&mut self, message: String) {
        if !self.warnings.contains(&message) {
            self.warnings.push(message);
        }
    }
}

/// Evaluate every rule of `set` against the two workbooks.
///
/// Either workbook may be missing; the values for that side are then empty.
pub fn preview(
    hc: Option<&Workbook>,
    hosp: Option<&Workbook>,
    set: &MappingSet,
    config: &PreviewConfig,
) -> PreviewReport {
    let resolver = Resolver::new(config.number);
    let catalog: HashMap<&str, &Indicator> = set
        .indicators
        .iter()
        .map(|indicator| (indicator.id.trim(), indicator))
        .collect();

    let mut report = PreviewReport::default();

    for rule in &set.rules {
        if !rule.active && !config.preview.include_inactive {
            continue;
        }

        let hc_value = side_value(&resolver, hc, hosp, rule.side(Source::Hc), &mut report);
        let hosp_value = side_value(&resolver, hc, hosp, rule.side(Source::Hosp), &mut report);
        let total = EvalContext::new(resolver)
            .with_values(hc_value, hosp_value)
            .evaluate_result(&rule.result_formula);

        let indicator = catalog.get(rule.indicator_id.trim());
        report.rows.push(PreviewRow {
            indicator_id: rule.indicator_id.clone(),
            name: indicator.map(|i| i.name.clone()).unwrap_or_default(),
            hc: hc_value,
            hosp: hosp_value,
            total,
            valid: indicator.is_some(),
        });
    }

    report
}

/// Value of one side of a rule: its formula if it has one, else its cell
fn side_value(
    resolver: &Resolver,
    hc: Option<&Workbook>,
    hosp: Option<&Workbook>,
    side: Side<'_>,
    report: &mut PreviewReport,
) -> Option<f64> {
    let workbook = match side.source {
        Source::Hc => hc,
        Source::Hosp => hosp,
    }?;

    let has_formula = !side.formula.trim().is_empty();
    let has_cell = !side.cell.trim().is_empty();
    if !has_formula && !has_cell {
        return None;
    }

    let sheet = if side.sheet.trim().is_empty() {
        None
    } else {
        match workbook.find_sheet(side.sheet) {
            Some(sheet) => Some(sheet),
            None => {
                let message = format!(
                    "sheet '{}' not found in {} workbook",
                    side.sheet.trim(),
                    side.source.name()
                );
                log::warn!("{}", message);
                report.warn(message);
                return None;
            }
        }
    };

    if has_formula {
        let context = EvalContext::new(*resolver)
            .with_workbooks(hc, hosp)
            .with_local(side.source, sheet);
        let value = context.evaluate(side.formula);
        for message in context.warnings() {
            report.warn(message);
        }
        value
    } else {
        let sheet = sheet.or_else(|| workbook.sheets.first())?;
        resolver.read(sheet, side.cell.trim())
    }
}

fn number_or_blank<S: Serializer>(value: &Option<f64>, serializer: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(n) => serializer.serialize_f64(*n),
        None => serializer.serialize_str(""),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FlagValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

/// `active` arrives as 0/1, a boolean or a string of either; null means active
fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(match Option::<FlagValue>::deserialize(deserializer)? {
        None => true,
        Some(FlagValue::Bool(b)) => b,
        Some(FlagValue::Int(n)) => n != 0,
        Some(FlagValue::Float(n)) => n != 0.0,
        Some(FlagValue::Text(s)) => {
            let s = s.trim();
            !(s.is_empty() || s == "0" || s.eq_ignore_ascii_case("false"))
        }
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IdValue {
    Text(String),
    Int(i64),
    Float(f64),
}

/// Document-store exports sometimes carry numeric ids
fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Option::<IdValue>::deserialize(deserializer)? {
        None => String::new(),
        Some(IdValue::Text(s)) => s,
        Some(IdValue::Int(n)) => n.to_string(),
        Some(IdValue::Float(n)) => n.to_string(),
    })
}

/// Exported rules write `null` for fields that were never filled in
fn string_or_null<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}
