//! Output formatters for preview reports

use anyhow::Result;
use colored::*;
use indimap_core::{PreviewReport, PreviewRow};
use std::path::Path;

/// Print the report as a colored table followed by the warnings
pub fn print_human(hc_file: Option<&Path>, hosp_file: Option<&Path>, report: &PreviewReport) {
    println!("{} {}", "HC:".bold(), describe(hc_file));
    println!("{} {}", "HOSP:".bold(), describe(hosp_file));
    println!();

    if report.rows.is_empty() {
        println!("{}", "No active mapping rules".yellow().bold());
    } else {
        let id_width = column_width(report, "Indicator", |row| row.indicator_id.chars().count());
        let name_width = column_width(report, "Name", |row| row.name.chars().count());

        println!(
            "{}",
            format!(
                "{:<id_width$}  {:<name_width$}  {:>12}  {:>12}  {:>12}",
                "Indicator", "Name", "HC", "HOSP", "Total"
            )
            .bold()
            .underline()
        );
        for row in &report.rows {
            print_row(row, id_width, name_width);
        }
    }

    println!();
    println!("{}", format!("Preview {} rows", report.rows.len()).bold());

    let invalid = report.invalid_count();
    if invalid > 0 {
        println!(
            "{}",
            format!("✗ {} rows reference unknown indicators", invalid).red()
        );
    }

    if !report.warnings.is_empty() {
        println!(
            "{}",
            format!("⚠ {} warnings", report.warnings.len()).yellow().bold()
        );
        for warning in &report.warnings {
            println!("  {} {}", "WARN".yellow().bold(), warning);
        }
    }
}

fn print_row(row: &PreviewRow, id_width: usize, name_width: usize) {
    let line = format!(
        "{:<id_width$}  {:<name_width$}  {:>12}  {:>12}  {:>12}",
        row.indicator_id,
        row.name,
        format_value(row.hc),
        format_value(row.hosp),
        format_value(row.total)
    );

    if row.valid {
        println!("{}", line);
    } else {
        println!("{} {}", line.bright_black(), "(unknown indicator)".red());
    }
}

fn column_width(report: &PreviewReport, header: &str, width: impl Fn(&PreviewRow) -> usize) -> usize {
    report
        .rows
        .iter()
        .map(width)
        .max()
        .unwrap_or(0)
        .max(header.len())
}

fn describe(path: Option<&Path>) -> ColoredString {
    match path {
        Some(path) => path.display().to_string().cyan(),
        None => "(not provided)".bright_black(),
    }
}

/// Missing values print as a dash; integers without a fraction
fn format_value(value: Option<f64>) -> String {
    match value {
        Some(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", n as i64),
        Some(n) => format!("{}", n),
        None => "-".to_string(),
    }
}

/// Print the report in JSON format
pub fn print_json(
    hc_file: Option<&Path>,
    hosp_file: Option<&Path>,
    report: &PreviewReport,
) -> Result<()> {
    let output = serde_json::json!({
        "hc_file": hc_file.map(|p| p.display().to_string()),
        "hosp_file": hosp_file.map(|p| p.display().to_string()),
        "rows": report.rows,
        "warnings": report.warnings,
    });

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(Some(2000.0)), "2000");
        assert_eq!(format_value(Some(-3.0)), "-3");
        assert_eq!(format_value(Some(12.5)), "12.5");
        assert_eq!(format_value(None), "-");
    }
}
