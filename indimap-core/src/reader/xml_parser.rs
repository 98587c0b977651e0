//! XML parsing utilities for extracting merged regions from XLSX files
//!
//! calamine exposes cell values and formulas but not the `<mergeCells>`
//! block, so merged regions are read straight from the worksheet XML.
//! [`sheet_part_paths`] reads the workbook manifest once per archive; each
//! sheet's merges are then one pass over its own part.

use anyhow::{Context, Result, anyhow};
use quick_xml::Reader;
use quick_xml::events::Event;
use std::collections::HashMap;
use std::io::{BufReader, Read, Seek};
use zip::ZipArchive;

use super::parser_utils::parse_cell_range;
use super::workbook::MergeRegion;

const WORKBOOK_PART: &str = "xl/workbook.xml";
const WORKBOOK_RELS_PART: &str = "xl/_rels/workbook.xml.rels";

/// Map every sheet name to its worksheet part ("xl/worksheets/sheet1.xml")
pub fn sheet_part_paths<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
) -> Result<HashMap<String, String>> {
    let sheets = element_attributes(archive, WORKBOOK_PART, b"sheet", &[b"name", b"r:id"])?;
    let targets: HashMap<String, String> =
        element_attributes(archive, WORKBOOK_RELS_PART, b"Relationship", &[b"Id", b"Target"])?
            .into_iter()
            .filter_map(|attrs| match <[Option<String>; 2]>::try_from(attrs) {
                Ok([Some(id), Some(target)]) => Some((id, target)),
                _ => None,
            })
            .collect();

    // Sheets without a relationship are left out; the caller decodes them without merges
    Ok(sheets
        .into_iter()
        .filter_map(|attrs| match <[Option<String>; 2]>::try_from(attrs) {
            Ok([Some(name), Some(rid)]) => Some((name, rid)),
            _ => None,
        })
        .filter_map(|(name, rid)| targets.get(&rid).map(|target| (name, part_path(target))))
        .collect())
}

/// Extract merged cell ranges from a worksheet part, in file order
pub fn extract_merged_cells_from_xlsx<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    part: &str,
) -> Result<Vec<MergeRegion>> {
    let refs = element_attributes(archive, part, b"mergeCell", &[b"ref"])?;
    Ok(refs
        .into_iter()
        .flatten()
        .flatten()
        .filter_map(|range| parse_cell_range(&range))
        .map(|(start_row, start_col, end_row, end_col)| {
            MergeRegion::new(start_row, start_col, end_row, end_col)
        })
        .collect())
}

/// Relationship targets are relative to xl/ ("worksheets/sheet1.xml") or
/// absolute ("/xl/worksheets/sheet1.xml")
fn part_path(target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        absolute.to_string()
    } else if target.starts_with("xl/") {
        target.to_string()
    } else {
        format!("xl/{}", target)
    }
}

/// For every `tag` element of an archive part, the values of `keys` in order
fn element_attributes<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    part: &str,
    tag: &[u8],
    keys: &[&[u8]],
) -> Result<Vec<Vec<Option<String>>>> {
    let file = archive
        .by_name(part)
        .with_context(|| format!("Failed to find {}", part))?;
    let mut reader = Reader::from_reader(BufReader::new(file));
    reader.config_mut().trim_text(true);

    let mut found = Vec::new();
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.name().as_ref() == tag => {
                let mut values = vec![None; keys.len()];
                for attr in e.attributes().flatten() {
                    if let Some(idx) = keys.iter().position(|key| *key == attr.key.as_ref()) {
                        values[idx] = Some(attr.unescape_value()?.to_string());
                    }
                }
                found.push(values);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(anyhow!("XML parsing error in {}: {}", part, e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(found)
}
