//! Workbook data structures

use regex::Regex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::OnceLock;

/// Represents a decoded workbook
#[derive(Debug, Clone, Default)]
pub struct Workbook {
    /// Source file, when the workbook was read from disk
    pub path: Option<PathBuf>,
    /// Sheets in file order
    pub sheets: Vec<Sheet>,
}

impl Workbook {
    pub fn new(sheets: Vec<Sheet>) -> Self {
        Self { path: None, sheets }
    }

    /// Get a sheet by name (case-insensitive)
    pub fn get_sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets
            .iter()
            .find(|s| s.name == name)
            .or_else(|| self.sheets.iter().find(|s| eq_ignore_case(&s.name, name)))
    }

    /// Get all sheet names
    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }

    /// Resolve a user-entered sheet selector to a sheet name.
    ///
    /// Operators type sheet selectors by hand, so this is forgiving: a number
    /// is a 1-based ordinal, "Page 2" / "សន្លឹក 2" is an ordinal too, and
    /// names match exactly (ignoring case) before falling back to the first
    /// sheet whose name contains the input.
    pub fn resolve_sheet_name(&self, input: &str) -> Option<&str> {
        let input = input.trim();
        if input.is_empty() {
            return None;
        }

        if input.chars().all(|c| c.is_ascii_digit()) {
            return self.sheet_by_ordinal(input);
        }

        if let Some(caps) = ordinal_phrase_regex().captures(input) {
            if let Some(ordinal) = caps.get(1) {
                if let Some(name) = self.sheet_by_ordinal(ordinal.as_str()) {
                    return Some(name);
                }
            }
        }

        if let Some(sheet) = self.sheets.iter().find(|s| eq_ignore_case(&s.name, input)) {
            return Some(&sheet.name);
        }

        let needle = input.to_lowercase();
        self.sheets
            .iter()
            .find(|s| s.name.to_lowercase().contains(&needle))
            .map(|s| s.name.as_str())
    }

    /// Resolve a selector and return the sheet itself
    pub fn find_sheet(&self, input: &str) -> Option<&Sheet> {
        let name = self.resolve_sheet_name(input)?;
        self.sheets.iter().find(|s| s.name == name)
    }

    fn sheet_by_ordinal(&self, digits: &str) -> Option<&str> {
        let ordinal: usize = digits.parse().ok()?;
        let index = ordinal.checked_sub(1)?;
        self.sheets.get(index).map(|s| s.name.as_str())
    }
}

fn ordinal_phrase_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(?:page|សន្លឹក)\s*(\d+)").unwrap())
}

fn eq_ignore_case(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

/// Rectangular merged region, inclusive on both ends, 0-based
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeRegion {
    pub start_row: u32,
    pub start_col: u32,
    pub end_row: u32,
    pub end_col: u32,
}

impl MergeRegion {
    pub fn new(start_row: u32, start_col: u32, end_row: u32, end_col: u32) -> Self {
        Self {
            start_row: start_row.min(end_row),
            start_col: start_col.min(end_col),
            end_row: start_row.max(end_row),
            end_col: start_col.max(end_col),
        }
    }

    pub fn contains(&self, row: u32, col: u32) -> bool {
        row >= self.start_row && row <= self.end_row && col >= self.start_col && col <= self.end_col
    }

    /// Top-left cell, the only one holding data
    pub fn anchor(&self) -> (u32, u32) {
        (self.start_row, self.start_col)
    }
}

/// Represents a worksheet
#[derive(Debug, Clone, Default)]
pub struct Sheet {
    pub name: String,
    pub cells: HashMap<(u32, u32), Cell>,
    pub used_range: Option<(u32, u32)>, // (rows, cols)
    /// Merged cell ranges in file order
    pub merged_cells: Vec<MergeRegion>,
}

impl Sheet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Get a cell at the given position
    pub fn get_cell(&self, row: u32, col: u32) -> Option<&Cell> {
        self.cells.get(&(row, col))
    }

    /// Store a cell, growing the used range to cover it
    pub fn insert_cell(&mut self, cell: Cell) {
        let (rows, cols) = self.used_range.unwrap_or((0, 0));
        self.used_range = Some((rows.max(cell.row + 1), cols.max(cell.col + 1)));
        self.cells.insert((cell.row, cell.col), cell);
    }

    /// Builder-style helper used when assembling sheets in memory
    pub fn with_cell(mut self, row: u32, col: u32, value: CellValue) -> Self {
        self.insert_cell(Cell::new(row, col, value));
        self
    }

    /// Builder-style helper for merged regions
    pub fn with_merge(mut self, region: MergeRegion) -> Self {
        self.merged_cells.push(region);
        self
    }

    /// Exclusive (rows, cols) bound covering stored cells and merged regions
    pub fn extent(&self) -> (u32, u32) {
        let (mut rows, mut cols) = self.used_range.unwrap_or((0, 0));
        for region in &self.merged_cells {
            rows = rows.max(region.end_row + 1);
            cols = cols.max(region.end_col + 1);
        }
        (rows, cols)
    }
}

/// Represents a single cell
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub row: u32,
    pub col: u32,
    pub value: CellValue,
    /// Formatted text as shown by the spreadsheet, when available
    pub display: Option<String>,
}

impl Cell {
    pub fn new(row: u32, col: u32, value: CellValue) -> Self {
        Self {
            row,
            col,
            value,
            display: None,
        }
    }

    pub fn with_display(mut self, display: impl Into<String>) -> Self {
        self.display = Some(display.into());
        self
    }
}

/// Cell value types
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Number(f64),
    Text(String),
    Boolean(bool),
    Error(String),
    /// Formula source without the leading `=`
    Formula(String),
}

impl CellValue {
    /// Get the formula if this is a formula cell
    pub fn as_formula(&self) -> Option<&str> {
        match self {
            CellValue::Formula(f) => Some(f),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workbook(names: &[&str]) -> Workbook {
        Workbook::new(names.iter().map(|n| Sheet::new(*n)).collect())
    }

    #[test]
    fn test_resolve_by_ordinal_and_phrase() {
        let wb = workbook(&["Summary", "Page 2", "សន្លឹក 3"]);

        assert_eq!(wb.resolve_sheet_name("2"), Some("Page 2"));
        assert_eq!(wb.resolve_sheet_name("Page 2"), Some("Page 2"));
        assert_eq!(wb.resolve_sheet_name("page 2"), Some("Page 2"));
        assert_eq!(wb.resolve_sheet_name("PAGE2"), Some("Page 2"));
        assert_eq!(wb.resolve_sheet_name("សន្លឹក 3"), Some("សន្លឹក 3"));
        assert_eq!(wb.resolve_sheet_name("សន្លឹក1"), Some("Summary"));
    }

    #[test]
    fn test_resolve_by_name() {
        let wb = workbook(&["Summary", "Page 2", "Hospital Data"]);

        assert_eq!(wb.resolve_sheet_name("summary"), Some("Summary"));
        assert_eq!(wb.resolve_sheet_name("hospital"), Some("Hospital Data"));
        assert_eq!(wb.resolve_sheet_name("missing"), None);
        assert_eq!(wb.resolve_sheet_name("   "), None);
    }

    #[test]
    fn test_resolve_out_of_range_ordinal() {
        let wb = workbook(&["Summary"]);

        assert_eq!(wb.resolve_sheet_name("0"), None);
        assert_eq!(wb.resolve_sheet_name("5"), None);
    }

    #[test]
    fn test_get_sheet_case_insensitive() {
        let wb = workbook(&["Data"]);
        assert!(wb.get_sheet("DATA").is_some());
        assert!(wb.get_sheet("Other").is_none());
    }

    #[test]
    fn test_merge_region() {
        let region = MergeRegion::new(3, 2, 1, 0);
        assert_eq!(region.anchor(), (1, 0));
        assert!(region.contains(2, 1));
        assert!(!region.contains(4, 1));
    }

    #[test]
    fn test_extent_includes_merges() {
        let sheet = Sheet::new("S")
            .with_cell(0, 0, CellValue::Number(1.0))
            .with_merge(MergeRegion::new(0, 0, 9, 4));
        assert_eq!(sheet.used_range, Some((1, 1)));
        assert_eq!(sheet.extent(), (10, 5));
    }
}
