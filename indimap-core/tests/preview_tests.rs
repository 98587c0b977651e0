use indimap_core::formula::ast::Source;
use indimap_core::{
    EvalContext, MappingRule, MappingSet, PreviewConfig, PreviewRow, Previewer, Resolver,
    read_workbook,
};
use pretty_assertions::assert_eq;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

// Helper to create a minimal XLSX file; each sheet is (name, worksheet body)
fn create_mock_xlsx(path: &Path, sheets: &[(&str, &str)]) -> anyhow::Result<()> {
    let file = File::create(path)?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);

    // 1. [Content_Types].xml
    zip.start_file("[Content_Types].xml", options)?;
    let mut content_types = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
<Default Extension="xml" ContentType="application/xml"/>
<Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>
"#,
    );
    for (i, _) in sheets.iter().enumerate() {
        content_types.push_str(&format!(
            r#"<Override PartName="/xl/worksheets/sheet{}.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#,
            i + 1
        ));
    }
    content_types.push_str("</Types>");
    zip.write_all(content_types.as_bytes())?;

    // 2. _rels/.rels
    zip.start_file("_rels/.rels", options)?;
    zip.write_all(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/>
</Relationships>"#.as_bytes())?;

    // 3. xl/workbook.xml
    zip.start_file("xl/workbook.xml", options)?;
    let mut workbook_xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
<sheets>
"#,
    );
    for (i, (name, _)) in sheets.iter().enumerate() {
        workbook_xml.push_str(&format!(
            r#"<sheet name="{}" sheetId="{}" r:id="rId{}"/>"#,
            name,
            i + 1,
            i + 1
        ));
    }
    workbook_xml.push_str("</sheets></workbook>");
    zip.write_all(workbook_xml.as_bytes())?;

    // 4. xl/_rels/workbook.xml.rels
    zip.start_file("xl/_rels/workbook.xml.rels", options)?;
    let mut rels_xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
"#,
    );
    for (i, _) in sheets.iter().enumerate() {
        rels_xml.push_str(&format!(
            r#"<Relationship Id="rId{}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet{}.xml"/>"#,
            i + 1, i + 1
        ));
    }
    rels_xml.push_str("</Relationships>");
    zip.write_all(rels_xml.as_bytes())?;

    // 5. sheets
    for (i, (_, body)) in sheets.iter().enumerate() {
        zip.start_file(format!("xl/worksheets/sheet{}.xml", i + 1), options)?;
        zip.write_all(
            format!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">{}</worksheet>"#,
                body
            )
            .as_bytes(),
        )?;
    }

    zip.finish()?;
    Ok(())
}

const HC_DATA: &str = r#"<sheetData>
<row r="2"><c r="B2" t="inlineStr"><is><t>1,234</t></is></c></row>
<row r="3"><c r="B3" t="inlineStr"><is><t>១០</t></is></c></row>
<row r="4"><c r="B4"><f>SUM(B2:B3)</f><v>0</v></c></row>
<row r="5"><c r="A5"><v>10</v></c></row>
</sheetData>
<mergeCells count="1"><mergeCell ref="A5:B6"/></mergeCells>"#;

const HOSP_DATA: &str = r#"<sheetData>
<row r="3"><c r="C3" t="inlineStr"><is><t>766</t></is></c></row>
<row r="4"><c r="C4" t="inlineStr"><is><t>(12%)</t></is></c></row>
</sheetData>"#;

const COVER: &str = r#"<sheetData>
<row r="1"><c r="A1" t="inlineStr"><is><t>Monthly report</t></is></c></row>
</sheetData>"#;

struct Fixture {
    dir: tempfile::TempDir,
    hc: std::path::PathBuf,
    hosp: std::path::PathBuf,
}

fn fixture() -> anyhow::Result<Fixture> {
    let dir = tempfile::tempdir()?;
    let hc = dir.path().join("hc.xlsx");
    let hosp = dir.path().join("hosp.xlsx");
    create_mock_xlsx(&hc, &[("Cover", COVER), ("Data", HC_DATA)])?;
    create_mock_xlsx(&hosp, &[("Data", HOSP_DATA)])?;
    Ok(Fixture {
        dir,
        hc,
        hosp,
    })
}

fn rule(id: &str, hc_cell: &str) -> MappingRule {
    MappingRule {
        hc_sheet: "Data".to_string(),
        hc_cell: hc_cell.to_string(),
        hosp_sheet: "Data".to_string(),
        hosp_cell: "C3".to_string(),
        ..MappingRule::new(id)
    }
}

#[test]
fn test_decodes_cells_merges_and_formulas() -> anyhow::Result<()> {
    let fx = fixture()?;
    let workbook = read_workbook(&fx.hc)?;

    assert_eq!(workbook.sheet_names(), vec!["Cover", "Data"]);
    assert_eq!(workbook.path.as_deref(), Some(fx.hc.as_path()));

    let data = workbook.get_sheet("data").expect("Data sheet");
    assert_eq!(data.merged_cells.len(), 1);

    let resolver = Resolver::default();
    assert_eq!(resolver.read(data, "B2"), Some(1234.0));
    assert_eq!(resolver.read(data, "B3"), Some(10.0));
    assert_eq!(resolver.read(data, "B4"), Some(1244.0));
    // Any cell of the merged block reads its anchor, and the block sums once
    assert_eq!(resolver.read(data, "B6"), Some(10.0));
    assert_eq!(resolver.read(data, "A5:B6"), Some(10.0));
    Ok(())
}

#[test]
fn test_end_to_end_preview_from_json_rules() -> anyhow::Result<()> {
    let fx = fixture()?;
    let rules_path = fx.dir.path().join("rules.json");
    std::fs::write(
        &rules_path,
        r#"{
            "indicators": [{"id": "opd", "name": "OPD visits"}],
            "rules": [{
                "indicator_id": "opd",
                "hc_sheet": "Data", "hc_cell": "B2",
                "hosp_sheet": "Data", "hosp_cell": "C3",
                "result_formula": "",
                "active": 1
            }]
        }"#,
    )?;

    let set = MappingSet::from_file(&rules_path)?;
    let report = Previewer::new().preview_files(Some(&fx.hc), Some(&fx.hosp), &set)?;

    assert_eq!(
        report.rows,
        vec![PreviewRow {
            indicator_id: "opd".to_string(),
            name: "OPD visits".to_string(),
            hc: Some(1234.0),
            hosp: Some(766.0),
            total: Some(2000.0),
            valid: true,
        }]
    );
    assert!(report.warnings.is_empty());
    Ok(())
}

#[test]
fn test_preview_is_idempotent() -> anyhow::Result<()> {
    let fx = fixture()?;
    let hc = read_workbook(&fx.hc)?;
    let hosp = read_workbook(&fx.hosp)?;
    let set = MappingSet {
        indicators: Vec::new(),
        rules: vec![
            rule("a", "B2"),
            rule("b", "A5:B6"),
            MappingRule {
                hc_formula: r#"HC("2!B4") - B2"#.to_string(),
                hosp_formula: r#"NUM("1 000") + HOSP("Data!C4")"#.to_string(),
                ..rule("c", "")
            },
        ],
    };

    let previewer = Previewer::new();
    let first = previewer.preview(Some(&hc), Some(&hosp), &set);
    let second = previewer.preview(Some(&hc), Some(&hosp), &set);
    assert_eq!(first, second);

    let values: Vec<_> = first.rows.iter().map(|row| (row.hc, row.hosp)).collect();
    assert_eq!(
        values,
        vec![
            (Some(1234.0), Some(766.0)),
            (Some(10.0), Some(766.0)),
            (Some(10.0), Some(999.88)),
        ]
    );
    assert!(first.rows.iter().all(|row| !row.valid));
    Ok(())
}

#[test]
fn test_sheet_selectors_and_warnings() -> anyhow::Result<()> {
    let fx = fixture()?;
    let hc = read_workbook(&fx.hc)?;
    let hosp = read_workbook(&fx.hosp)?;
    let set = MappingSet {
        indicators: Vec::new(),
        rules: vec![
            MappingRule {
                hc_sheet: "Page 2".to_string(),
                ..rule("ordinal", "B2")
            },
            MappingRule {
                hc_sheet: "សន្លឹក 2".to_string(),
                hosp_sheet: "1".to_string(),
                ..rule("khmer", "B2")
            },
            MappingRule {
                hosp_sheet: "IPD".to_string(),
                ..rule("missing", "B2")
            },
            MappingRule {
                hosp_sheet: "IPD".to_string(),
                ..rule("missing-again", "B2")
            },
        ],
    };

    let report = Previewer::new().preview(Some(&hc), Some(&hosp), &set);
    assert_eq!(report.rows[0].hc, Some(1234.0));
    assert_eq!(report.rows[1].hc, Some(1234.0));
    assert_eq!(report.rows[1].hosp, Some(766.0));
    assert_eq!(report.rows[2].hosp, None);
    assert_eq!(report.rows[2].total, Some(1234.0));
    assert_eq!(
        report.warnings,
        vec!["sheet 'IPD' not found in HOSP workbook".to_string()]
    );
    Ok(())
}

#[test]
fn test_only_one_workbook_uploaded() -> anyhow::Result<()> {
    let fx = fixture()?;
    let set = MappingSet {
        indicators: Vec::new(),
        rules: vec![rule("a", "B2")],
    };

    let report = Previewer::new().preview_files(None, Some(&fx.hosp), &set)?;
    let row = &report.rows[0];
    assert_eq!((row.hc, row.hosp, row.total), (None, Some(766.0), Some(766.0)));
    Ok(())
}

#[test]
fn test_missing_workbook_file_is_fatal() -> anyhow::Result<()> {
    let fx = fixture()?;
    let missing = fx.dir.path().join("nope.xlsx");
    let result = Previewer::new().preview_files(Some(&missing), Some(&fx.hosp), &MappingSet::default());
    assert!(result.is_err());
    Ok(())
}

#[test]
fn test_decimal_comma_policy() -> anyhow::Result<()> {
    let fx = fixture()?;
    let hc = read_workbook(&fx.hc)?;
    let config = PreviewConfig::from_toml("[number]\nseparator_policy = \"decimal-comma\"\n")?;
    let resolver = Resolver::new(config.number);

    let data = hc.find_sheet("Data").expect("Data sheet");
    assert_eq!(resolver.read(data, "B2"), Some(1.234));

    let context = EvalContext::new(resolver)
        .with_workbooks(Some(&hc), None)
        .with_local(Source::Hc, Some(data));
    assert_eq!(context.evaluate(r#"ROUND(B2 * 1000) + NUM("2,5")"#), Some(1236.5));
    Ok(())
}
