use anyhow::Context;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::api::FormInstance;
use crate::forms::value::FieldValue;

const SHEET_NAME: &str = "Instances";
const FIXED_COLUMNS: [&str; 3] = ["Instance ID", "Template ID", "Status"];

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/></Types>"#;

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;

const WORKBOOK_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#;

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub rows: usize,
    pub columns: usize,
}

/// Writes the instances as a single-sheet `.xlsx`: fixed columns first, then
/// one column per response key seen in any instance, sorted.
pub fn export_instances_xlsx(instances: &[FormInstance], out_path: &Path) -> anyhow::Result<ExportSummary> {
    let keys: BTreeSet<&str> = instances
        .iter()
        .flat_map(|i| i.responses.iter().map(|(k, _)| k.as_str()))
        .collect();

    let mut rows: Vec<Vec<Cell>> = Vec::with_capacity(instances.len() + 1);
    rows.push(
        FIXED_COLUMNS
            .iter()
            .map(|s| Cell::Text(s.to_string()))
            .chain(keys.iter().map(|k| Cell::Text(k.to_string())))
            .collect(),
    );
    for inst in instances {
        let mut row = vec![
            Cell::Text(inst.id.clone()),
            Cell::Text(inst.template_id.clone().unwrap_or_default()),
            Cell::Text(inst.approve_status().as_str().to_string()),
        ];
        for key in &keys {
            row.push(inst.responses.get(key).map(cell_for).unwrap_or(Cell::Empty));
        }
        rows.push(row);
    }
    let columns = FIXED_COLUMNS.len() + keys.len();

    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }
    let out_file = File::create(out_path)
        .with_context(|| format!("failed to create output file {}", out_path.to_string_lossy()))?;
    let mut zip = ZipWriter::new(out_file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let workbook = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="{}" sheetId="1" r:id="rId1"/></sheets></workbook>"#,
        SHEET_NAME
    );
    let parts: [(&str, String); 5] = [
        ("[Content_Types].xml", CONTENT_TYPES.to_string()),
        ("_rels/.rels", ROOT_RELS.to_string()),
        ("xl/workbook.xml", workbook),
        ("xl/_rels/workbook.xml.rels", WORKBOOK_RELS.to_string()),
        ("xl/worksheets/sheet1.xml", sheet_xml(&rows)),
    ];
    for (name, body) in &parts {
        zip.start_file(*name, opts)
            .with_context(|| format!("failed to start {} entry", name))?;
        zip.write_all(body.as_bytes())
            .with_context(|| format!("failed to write {} entry", name))?;
    }
    zip.finish().context("failed to finalize xlsx")?;

    Ok(ExportSummary {
        rows: instances.len(),
        columns,
    })
}

enum Cell {
    Empty,
    Text(String),
    Number(f64),
}

fn cell_for(value: &FieldValue) -> Cell {
    match value {
        FieldValue::Text(s) => Cell::Text(s.clone()),
        FieldValue::Number(n) => Cell::Number(*n),
        FieldValue::Bool(b) => Cell::Text(if *b { "TRUE" } else { "FALSE" }.to_string()),
        FieldValue::StringList(items) => Cell::Text(items.join(", ")),
        FieldValue::Signature(sig) => Cell::Text(sig.name.clone()),
    }
}

fn sheet_xml(rows: &[Vec<Cell>]) -> String {
    let mut out = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#,
    );
    for (r, row) in rows.iter().enumerate() {
        let row_no = r + 1;
        out.push_str(&format!(r#"<row r="{}">"#, row_no));
        for (c, cell) in row.iter().enumerate() {
            let cell_ref = format!("{}{}", column_name(c), row_no);
            match cell {
                Cell::Empty => {}
                Cell::Number(n) if n.is_finite() => {
                    out.push_str(&format!(r#"<c r="{}"><v>{}</v></c>"#, cell_ref, n));
                }
                Cell::Number(n) => {
                    out.push_str(&inline_str(&cell_ref, &n.to_string()));
                }
                Cell::Text(s) => out.push_str(&inline_str(&cell_ref, s)),
            }
        }
        out.push_str("</row>");
    }
    out.push_str("</sheetData></worksheet>");
    out
}

fn inline_str(cell_ref: &str, text: &str) -> String {
    format!(
        r#"<c r="{}" t="inlineStr"><is><t xml:space="preserve">{}</t></is></c>"#,
        cell_ref,
        xml_escape(text)
    )
}

/// 0 → A, 25 → Z, 26 → AA.
fn column_name(mut idx: usize) -> String {
    let mut name = Vec::new();
    loop {
        name.push(b'A' + (idx % 26) as u8);
        if idx < 26 {
            break;
        }
        idx = idx / 26 - 1;
    }
    name.reverse();
    String::from_utf8_lossy(&name).into_owned()
}

fn xml_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            // Not representable in XML 1.0.
            c if (c as u32) < 0x20 && !matches!(c, '\t' | '\n' | '\r') => {}
            c => out.push(c),
        }
    }
    out
}
