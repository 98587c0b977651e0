//! Spreadsheet decoding using calamine
//!
//! Decoding is all-or-nothing: a file either becomes a complete [`Workbook`]
//! or a [`DecodeError`]. Merged regions are a best-effort extra for XLSX
//! files; when they cannot be read the sheet is kept without them.

use calamine::{Data, Range, Reader, Sheets, open_workbook_auto_from_rs};
use log::{debug, warn};
use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;
use zip::ZipArchive;

use crate::error::DecodeError;

pub mod parser_utils;
pub mod workbook;
pub mod xml_parser;

pub use workbook::{Cell, CellValue, MergeRegion, Sheet, Workbook};

/// File extensions the calamine decoder understands
pub const SUPPORTED_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xlsb", "xls", "xla", "ods"];

/// Turns raw spreadsheet bytes into a [`Workbook`]
pub trait WorkbookDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<Workbook, DecodeError>;
}

/// Decoder backed by calamine
#[derive(Debug, Clone, Copy, Default)]
pub struct CalamineDecoder;

impl WorkbookDecoder for CalamineDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<Workbook, DecodeError> {
        let mut excel: Sheets<_> = open_workbook_auto_from_rs(Cursor::new(bytes))
            .map_err(|e| DecodeError::InvalidWorkbook(e.to_string()))?;

        // Merged regions are read from the raw XML of XLSX archives; the
        // sheet-to-part map is built once per archive
        let mut merge_source = if matches!(excel, Sheets::Xlsx(_)) {
            ZipArchive::new(Cursor::new(bytes))
                .ok()
                .and_then(|mut archive| match xml_parser::sheet_part_paths(&mut archive) {
                    Ok(parts) => Some((archive, parts)),
                    Err(e) => {
                        warn!("skipping merged cells: {}", e);
                        None
                    }
                })
        } else {
            None
        };

        let sheet_names = excel.sheet_names();
        let mut sheets = Vec::with_capacity(sheet_names.len());

        for sheet_name in &sheet_names {
            let range = excel
                .worksheet_range(sheet_name)
                .map_err(|e| DecodeError::InvalidWorkbook(format!("{}: {}", sheet_name, e)))?;

            // Formulas are optional extras: a sheet whose formulas cannot be read
            // still has its cached values
            let formula_range = match excel.worksheet_formula(sheet_name) {
                Ok(range) => Some(range),
                Err(e) => {
                    debug!("no formulas for sheet '{}': {}", sheet_name, e);
                    None
                }
            };

            let mut sheet = parse_sheet(sheet_name, Some(&range), formula_range.as_ref());

            if let Some((archive, parts)) = merge_source.as_mut() {
                match parts.get(sheet_name) {
                    Some(part) => match xml_parser::extract_merged_cells_from_xlsx(archive, part) {
                        Ok(merged) => sheet.merged_cells = merged,
                        Err(e) => warn!("skipping merged cells of sheet '{}': {}", sheet_name, e),
                    },
                    None => warn!("no worksheet part for sheet '{}'", sheet_name),
                }
            }

            sheets.push(sheet);
        }

        Ok(Workbook::new(sheets))
    }
}

/// Read a workbook from a file path
pub fn read_workbook<P: AsRef<Path>>(path: P) -> Result<Workbook, DecodeError> {
    read_workbook_with(&CalamineDecoder, path)
}

/// Read a workbook from a file path with a specific decoder
pub fn read_workbook_with<D: WorkbookDecoder, P: AsRef<Path>>(
    decoder: &D,
    path: P,
) -> Result<Workbook, DecodeError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(DecodeError::FileNotFound(path.to_path_buf()));
    }

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();
    if !SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(DecodeError::UnsupportedFormat(extension));
    }

    let bytes = std::fs::read(path)?;
    let mut workbook = decoder.decode(&bytes)?;
    workbook.path = Some(path.to_path_buf());
    Ok(workbook)
}

fn parse_sheet(
    name: &str,
    range: Option<&Range<Data>>,
    formula_range: Option<&Range<String>>,
) -> Sheet {
    let mut sheet = Sheet::new(name);
    let mut cells: HashMap<(u32, u32), CellValue> = HashMap::new();

    if let Some(r) = range {
        if let Some((start_row, start_col)) = r.start() {
            for (rel_row, rel_col, data) in r.cells() {
                if matches!(data, Data::Empty) {
                    continue;
                }
                let key = (start_row + rel_row as u32, start_col + rel_col as u32);
                cells.insert(key, parse_cell_value(data));
            }
        }
    }

    // A formula replaces the cached value of its cell
    if let Some(f) = formula_range {
        if let Some((start_row, start_col)) = f.start() {
            for (rel_row, rel_col, formula) in f.cells() {
                if formula.is_empty() {
                    continue;
                }
                let key = (start_row + rel_row as u32, start_col + rel_col as u32);
                cells.insert(key, CellValue::Formula(formula.clone()));
            }
        }
    }

    for ((row, col), value) in cells {
        sheet.insert_cell(Cell::new(row, col, value));
    }

    sheet
}

fn parse_cell_value(data: &Data) -> CellValue {
    match data {
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Float(f) => CellValue::Number(*f),
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Bool(b) => CellValue::Boolean(*b),
        Data::Error(e) => CellValue::Error(format!("{:?}", e)),
        Data::Empty => CellValue::Empty,
        Data::DateTime(dt) => CellValue::Number(dt.as_f64()),
        Data::DateTimeIso(s) => CellValue::Text(s.clone()),
        Data::DurationIso(s) => CellValue::Text(s.clone()),
    }
}
