//! A1-style address helpers shared by the reader, resolver and formula engine

/// Parse a cell reference like "A1" or "$B$12" into (row, col) as 0-based indices
pub fn parse_cell_ref(cell_ref: &str) -> Option<(u32, u32)> {
    let cell_ref = cell_ref.trim();
    let mut chars = cell_ref.chars().peekable();

    if chars.peek() == Some(&'$') {
        chars.next();
    }

    let mut col = 0u32;
    let mut col_len = 0;
    while let Some(&ch) = chars.peek() {
        if !ch.is_ascii_alphabetic() {
            break;
        }
        col = col
            .checked_mul(26)?
            .checked_add(ch.to_ascii_uppercase() as u32 - 'A' as u32 + 1)?;
        col_len += 1;
        chars.next();
    }

    if chars.peek() == Some(&'$') {
        chars.next();
    }

    let row_str: String = chars.collect();
    // Excel tops out at XFD, three letters
    if col_len == 0 || col_len > 3 || row_str.is_empty() {
        return None;
    }
    if !row_str.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let row = row_str.parse::<u32>().ok()?;
    if row == 0 {
        return None;
    }

    // Convert to 0-based
    Some((row - 1, col - 1))
}

/// Parse a cell range like "A1:B2" into (start_row, start_col, end_row, end_col).
///
/// A single address parses as a one-cell range.
pub fn parse_cell_range(range: &str) -> Option<(u32, u32, u32, u32)> {
    let parts: Vec<&str> = range.split(':').collect();
    match parts.as_slice() {
        [single] => {
            let (row, col) = parse_cell_ref(single)?;
            Some((row, col, row, col))
        }
        [start, end] => {
            let (start_row, start_col) = parse_cell_ref(start)?;
            let (end_row, end_col) = parse_cell_ref(end)?;
            Some((start_row, start_col, end_row, end_col))
        }
        _ => None,
    }
}

/// Split "Sheet!A1" into (Some("Sheet"), "A1").
///
/// The sheet part may be quoted ('My Sheet'!A1). Without a `!` the whole
/// input is the address.
pub fn split_sheet_ref(reference: &str) -> (Option<String>, &str) {
    let reference = reference.trim();
    match reference.rfind('!') {
        Some(idx) => {
            let sheet = reference[..idx].trim();
            let sheet = sheet
                .strip_prefix('\'')
                .and_then(|s| s.strip_suffix('\''))
                .map(|s| s.replace("''", "'"))
                .unwrap_or_else(|| sheet.to_string());
            (Some(sheet), reference[idx + 1..].trim())
        }
        None => (None, reference),
    }
}
