//! Cell and range resolution over a decoded sheet
//!
//! Spreadsheet formats store a merged block's value only in its top-left
//! (anchor) cell, so every read first maps the requested coordinate to its
//! anchor. All lookups return `Option<f64>`: `None` means "no value" and is
//! never conflated with zero.
//!
//! Formula cells are evaluated with an explicit work stack and a per-read
//! memo, so long dependency chains (running totals down a column) cost one
//! evaluation per cell and never recurse.

use std::collections::{HashMap, HashSet};

use crate::formula::split_args_top_level;
use crate::number::{NumberParser, ParsedNumber};
use crate::reader::parser_utils::{parse_cell_range, parse_cell_ref};
use crate::reader::{Cell, Sheet};

type Coord = (u32, u32);
type Rect = (u32, u32, u32, u32);

/// Formula results computed during one read
type Memo = HashMap<Coord, Option<f64>>;

/// Map a coordinate to the anchor of the first merged region containing it
pub fn resolve_anchor(sheet: &Sheet, row: u32, col: u32) -> (u32, u32) {
    sheet
        .merged_cells
        .iter()
        .find(|region| region.contains(row, col))
        .map(|region| region.anchor())
        .unwrap_or((row, col))
}

/// Read one cell with the default number parser
pub fn read_cell(sheet: &Sheet, address: &str) -> Option<f64> {
    Resolver::default().read_cell(sheet, address)
}

/// Sum a range with the default number parser
pub fn sum_range(sheet: &Sheet, range: &str) -> Option<f64> {
    Resolver::default().sum_range(sheet, range)
}

/// Reads numbers out of a sheet using a configured [`NumberParser`]
#[derive(Debug, Clone, Copy, Default)]
pub struct Resolver {
    parser: NumberParser,
}

/// A formula cell waiting for its dependencies
struct Frame {
    cell: Coord,
    /// Signed anchor cells the formula adds up
    terms: Vec<(f64, Coord)>,
    next: usize,
}

impl Resolver {
    pub fn new(parser: NumberParser) -> Self {
        Self { parser }
    }

    pub fn parser(&self) -> &NumberParser {
        &self.parser
    }

    /// Read a cell ("B2") or sum a range ("B2:C5")
    pub fn read(&self, sheet: &Sheet, reference: &str) -> Option<f64> {
        if reference.contains(':') {
            self.sum_range(sheet, reference)
        } else {
            self.read_cell(sheet, reference)
        }
    }

    /// Read the numeric value of a single cell.
    ///
    /// Formula cells are evaluated with the in-sheet subset (`SUM(...)` over
    /// cells and ranges, or `±` chains of cells and ranges); anything else
    /// yields `None`.
    pub fn read_cell(&self, sheet: &Sheet, address: &str) -> Option<f64> {
        let (row, col) = parse_cell_ref(address)?;
        let anchor = resolve_anchor(sheet, row, col);
        self.cell_value(sheet, anchor, &mut Memo::new())
    }

    /// Sum every numeric cell of a range, counting each merged block once.
    ///
    /// Returns `None` when no cell in the range holds a number.
    pub fn sum_range(&self, sheet: &Sheet, range: &str) -> Option<f64> {
        let rect = parse_cell_range(range)?;
        let mut memo = Memo::new();
        sum_values(
            rect_anchors(sheet, rect)
                .into_iter()
                .map(|anchor| self.cell_value(sheet, anchor, &mut memo)),
        )
    }

    /// Value of an anchor cell, evaluating formulas through `memo`
    fn cell_value(&self, sheet: &Sheet, anchor: Coord, memo: &mut Memo) -> Option<f64> {
        let cell = sheet.get_cell(anchor.0, anchor.1)?;
        if cell.value.as_formula().is_none() {
            return self.stored_value(cell);
        }
        self.evaluate_formula_cell(sheet, anchor, memo);
        memo.get(&anchor).copied().flatten()
    }

    /// Evaluate `root` and every formula cell it depends on, depth first,
    /// without recursion. A dependency that is still being evaluated is a
    /// circular reference and contributes nothing.
    fn evaluate_formula_cell(&self, sheet: &Sheet, root: Coord, memo: &mut Memo) {
        if memo.contains_key(&root) {
            return;
        }

        let mut in_progress = HashSet::new();
        let mut stack = Vec::new();
        self.push_frame(sheet, root, &mut stack, &mut in_progress, memo);

        while let Some(frame) = stack.last_mut() {
            if frame.next < frame.terms.len() {
                let dep = frame.terms[frame.next].1;
                frame.next += 1;
                if !memo.contains_key(&dep) && !in_progress.contains(&dep) && is_formula(sheet, dep) {
                    self.push_frame(sheet, dep, &mut stack, &mut in_progress, memo);
                }
                continue;
            }

            let Some(frame) = stack.pop() else { break };
            in_progress.remove(&frame.cell);
            let value = sum_values(frame.terms.iter().map(|&(sign, dep)| {
                let value = if is_formula(sheet, dep) {
                    memo.get(&dep).copied().flatten()
                } else {
                    sheet.get_cell(dep.0, dep.1).and_then(|cell| self.stored_value(cell))
                };
                value.map(|v| sign * v)
            }));
            memo.insert(frame.cell, value);
        }
    }

    /// Start evaluating a formula cell; unsupported formulas resolve to `None`
    fn push_frame(
        &self,
        sheet: &Sheet,
        cell: Coord,
        stack: &mut Vec<Frame>,
        in_progress: &mut HashSet<Coord>,
        memo: &mut Memo,
    ) {
        let terms = sheet
            .get_cell(cell.0, cell.1)
            .and_then(|c| c.value.as_formula())
            .and_then(parse_sheet_formula)
            .map(|refs| {
                refs.into_iter()
                    .flat_map(|(sign, rect)| {
                        rect_anchors(sheet, rect)
                            .into_iter()
                            .map(move |anchor| (sign, anchor))
                    })
                    .collect::<Vec<_>>()
            });

        match terms {
            Some(terms) => {
                in_progress.insert(cell);
                stack.push(Frame {
                    cell,
                    terms,
                    next: 0,
                });
            }
            None => {
                memo.insert(cell, None);
            }
        }
    }

    /// Raw value first, then the display string
    fn stored_value(&self, cell: &Cell) -> Option<f64> {
        match self.parser.parse_value(&cell.value) {
            ParsedNumber::Number(n) => Some(n),
            ParsedNumber::Empty | ParsedNumber::Text(_) => cell
                .display
                .as_deref()
                .and_then(|display| self.parser.parse_str(display).as_number()),
        }
    }
}

fn is_formula(sheet: &Sheet, (row, col): Coord) -> bool {
    sheet
        .get_cell(row, col)
        .is_some_and(|cell| cell.value.as_formula().is_some())
}

/// Sum of the present values; `None` when there are none
fn sum_values(values: impl Iterator<Item = Option<f64>>) -> Option<f64> {
    values.flatten().fold(None, |total, value| Some(total.unwrap_or(0.0) + value))
}

/// Distinct anchors of a rectangle (corners in any order), clipped to the
/// sheet's data and merge extent
fn rect_anchors(sheet: &Sheet, (start_row, start_col, end_row, end_col): Rect) -> Vec<Coord> {
    let (rows, cols) = sheet.extent();
    let (top, bottom) = (start_row.min(end_row), start_row.max(end_row));
    let (left, right) = (start_col.min(end_col), start_col.max(end_col));

    if rows == 0 || cols == 0 || top >= rows || left >= cols {
        return Vec::new();
    }
    let bottom = bottom.min(rows - 1);
    let right = right.min(cols - 1);

    let mut seen = HashSet::new();
    let mut anchors = Vec::new();
    for row in top..=bottom {
        for col in left..=right {
            let anchor = resolve_anchor(sheet, row, col);
            if seen.insert(anchor) {
                anchors.push(anchor);
            }
        }
    }
    anchors
}

/// Split an in-sheet formula into signed references.
///
/// Supported shapes are `SUM(ref, ...)` and `±ref ±ref ...` where a ref is a
/// cell or range on the same sheet. Anything else gives `None`.
fn parse_sheet_formula(formula: &str) -> Option<Vec<(f64, Rect)>> {
    let source: String = formula
        .trim()
        .trim_start_matches('=')
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase();

    if let Some(inner) = source
        .strip_prefix("SUM(")
        .and_then(|rest| rest.strip_suffix(')'))
    {
        return split_args_top_level(inner)
            .into_iter()
            .map(|arg| reference_rect(arg).map(|rect| (1.0, rect)))
            .collect();
    }

    let mut terms = Vec::new();
    let mut rest = source.as_str();
    while !rest.is_empty() {
        let (sign, after) = if let Some(after) = rest.strip_prefix('+') {
            (1.0, after)
        } else if let Some(after) = rest.strip_prefix('-') {
            (-1.0, after)
        } else if terms.is_empty() {
            (1.0, rest)
        } else {
            return None;
        };

        let end = after.find(['+', '-']).unwrap_or(after.len());
        terms.push((sign, reference_rect(&after[..end])?));
        rest = &after[end..];
    }

    (!terms.is_empty()).then_some(terms)
}

fn reference_rect(term: &str) -> Option<Rect> {
    if term.contains('!') {
        return None;
    }
    parse_cell_range(term)
}
