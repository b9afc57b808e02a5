// src/workbook/xlsx.rs
// =============================================================================
// Reads an .xlsx file (Office Open XML package) into the in-memory Workbook.
//
// An .xlsx file is a zip archive of XML parts:
// - xl/workbook.xml           sheet names in workbook order, each with a r:id
// - xl/_rels/workbook.xml.rels  r:id -> worksheet part path
// - xl/sharedStrings.xml      the string table cells point into (t="s")
// - xl/worksheets/sheetN.xml  <sheetData> cells and <hyperlinks>
// - xl/worksheets/_rels/sheetN.xml.rels  hyperlink r:id -> external URL
//
// We only read what the link audit needs: cell values, embedded hyperlinks
// and HYPERLINK("...") formulas. Styles, number formats and dates are ignored.
// =============================================================================

use super::model::{expand_range, format_reference, parse_reference, Cell, CellValue, Sheet, Workbook};
use roxmltree::{Document, Node};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;
use thiserror::Error;
use zip::ZipArchive;

const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

/// Errors from decoding a workbook file.
#[derive(Debug, Error)]
pub enum WorkbookError {
    #[error("failed to read workbook: {0}")]
    Io(#[from] std::io::Error),

    #[error("not a valid .xlsx package: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("malformed XML in {part}: {source}")]
    Xml {
        part: String,
        #[source]
        source: roxmltree::Error,
    },

    #[error("part {0} is not valid UTF-8")]
    Encoding(String),

    #[error("missing required part {0}")]
    MissingPart(String),
}

/// Opens and decodes an .xlsx file from disk.
pub fn load_workbook(path: &Path) -> Result<Workbook, WorkbookError> {
    let file = File::open(path)?;
    read_workbook(BufReader::new(file))
}

/// Decodes an .xlsx package from any seekable reader.
pub fn read_workbook<R: Read + Seek>(reader: R) -> Result<Workbook, WorkbookError> {
    let mut archive = ZipArchive::new(reader)?;

    let workbook_xml = read_part(&mut archive, "xl/workbook.xml")?
        .ok_or_else(|| WorkbookError::MissingPart("xl/workbook.xml".to_string()))?;
    let workbook_rels = read_part(&mut archive, "xl/_rels/workbook.xml.rels")?
        .map(|xml| parse_relationships("xl/_rels/workbook.xml.rels", &xml))
        .transpose()?
        .unwrap_or_default();

    let shared_strings = match read_part(&mut archive, "xl/sharedStrings.xml")? {
        Some(xml) => parse_shared_strings(&xml)?,
        None => Vec::new(),
    };

    let mut workbook = Workbook::default();
    for (name, rel_id) in parse_sheet_list(&workbook_xml)? {
        let Some(target) = workbook_rels.get(&rel_id) else {
            tracing::warn!("sheet '{}' has no relationship {}, skipping", name, rel_id);
            continue;
        };
        let part = resolve_part("xl", target);

        let Some(sheet_xml) = read_part(&mut archive, &part)? else {
            tracing::warn!("sheet '{}' points to missing part {}, skipping", name, part);
            continue;
        };
        let sheet_rels = match read_part(&mut archive, &rels_path_for(&part))? {
            Some(xml) => parse_relationships(&part, &xml)?,
            None => HashMap::new(),
        };

        let sheet = parse_sheet(&name, &part, &sheet_xml, &shared_strings, &sheet_rels)?;
        tracing::debug!("loaded sheet '{}' ({} rows)", sheet.name, sheet.rows.len());
        workbook.sheets.push(sheet);
    }

    Ok(workbook)
}

// Reads a zip entry as UTF-8 text. Ok(None) when the entry does not exist.
fn read_part<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<Option<String>, WorkbookError> {
    let mut entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let mut bytes = Vec::new();
    entry.read_to_end(&mut bytes)?;
    let text = String::from_utf8(bytes).map_err(|_| WorkbookError::Encoding(name.to_string()))?;
    Ok(Some(text))
}

fn parse_xml<'a>(part: &str, xml: &'a str) -> Result<Document<'a>, WorkbookError> {
    Document::parse(xml).map_err(|source| WorkbookError::Xml {
        part: part.to_string(),
        source,
    })
}

// (sheet name, relationship id) pairs in workbook order
fn parse_sheet_list(xml: &str) -> Result<Vec<(String, String)>, WorkbookError> {
    let doc = parse_xml("xl/workbook.xml", xml)?;
    let sheets = doc
        .descendants()
        .filter(|n| n.has_tag_name("sheet"))
        .filter_map(|n| {
            let name = n.attribute("name")?;
            let rel_id = n.attribute((REL_NS, "id"))?;
            Some((name.to_string(), rel_id.to_string()))
        })
        .collect();
    Ok(sheets)
}

// Relationship Id -> Target
fn parse_relationships(part: &str, xml: &str) -> Result<HashMap<String, String>, WorkbookError> {
    let doc = parse_xml(part, xml)?;
    let rels = doc
        .descendants()
        .filter(|n| n.has_tag_name("Relationship"))
        .filter_map(|n| Some((n.attribute("Id")?.to_string(), n.attribute("Target")?.to_string())))
        .collect();
    Ok(rels)
}

fn parse_shared_strings(xml: &str) -> Result<Vec<String>, WorkbookError> {
    let doc = parse_xml("xl/sharedStrings.xml", xml)?;
    let strings = doc
        .root_element()
        .children()
        .filter(|n| n.has_tag_name("si"))
        .map(rich_text)
        .collect();
    Ok(strings)
}

// Concatenates every <t> inside a string item (<si> or <is>), skipping the
// phonetic runs (<rPh>) that East Asian workbooks carry next to the text.
fn rich_text(node: Node<'_, '_>) -> String {
    node.descendants()
        .filter(|n| n.has_tag_name("t"))
        .filter(|t| !t.ancestors().any(|a| a.has_tag_name("rPh")))
        .filter_map(|t| t.text())
        .collect()
}

// "worksheets/sheet1.xml" relative to xl/, or "/xl/worksheets/sheet1.xml"
fn resolve_part(base_dir: &str, target: &str) -> String {
    match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("{}/{}", base_dir, target),
    }
}

// xl/worksheets/sheet1.xml -> xl/worksheets/_rels/sheet1.xml.rels
fn rels_path_for(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{}/_rels/{}.rels", dir, file),
        None => format!("_rels/{}.rels", part),
    }
}

fn parse_sheet(
    name: &str,
    part: &str,
    xml: &str,
    shared_strings: &[String],
    rels: &HashMap<String, String>,
) -> Result<Sheet, WorkbookError> {
    let doc = parse_xml(part, xml)?;
    let mut sheet = Sheet::new(name);

    let mut last_row = 0u32;
    for row in doc.descendants().filter(|n| n.has_tag_name("row")) {
        let row_index = row
            .attribute("r")
            .and_then(|r| r.parse().ok())
            .unwrap_or(last_row + 1);
        last_row = row_index;

        let mut last_col = 0u32;
        for c in row.children().filter(|n| n.has_tag_name("c")) {
            let col = c
                .attribute("r")
                .and_then(parse_reference)
                .map(|(col, _)| col)
                .unwrap_or(last_col + 1);
            last_col = col;

            let mut cell = Cell::new(format_reference(col, row_index), cell_value(c, shared_strings));
            cell.hyperlink = formula_hyperlink(c);
            if cell.value.is_some() || cell.hyperlink.is_some() {
                sheet.insert(cell);
            }
        }
    }

    // A ref may span a whole column; only the used area gets links
    let limit = used_area(&doc, &sheet);

    // <hyperlinks> sits after <sheetData>, so cells exist by now
    for link in doc.descendants().filter(|n| n.has_tag_name("hyperlink")) {
        let Some(range) = link.attribute("ref") else { continue };
        let target = link
            .attribute((REL_NS, "id"))
            .and_then(|id| rels.get(id))
            .filter(|t| !t.is_empty());
        // Location-only links jump inside the workbook; they are not URLs
        let Some(target) = target else { continue };

        for reference in expand_range(range, limit) {
            if let Some(cell) = sheet.cell_mut(&reference) {
                cell.hyperlink = Some(target.clone());
            }
        }
    }

    Ok(sheet)
}

// Bottom-right corner of the data cells and the declared <dimension>,
// whichever reaches further
fn used_area(doc: &Document<'_>, sheet: &Sheet) -> (u32, u32) {
    let declared = doc
        .descendants()
        .find(|n| n.has_tag_name("dimension"))
        .and_then(|n| n.attribute("ref"))
        .and_then(|r| parse_reference(r.rsplit(':').next().unwrap_or(r)));
    let data = sheet.extent();

    [declared, data]
        .into_iter()
        .flatten()
        .fold((0, 0), |(c, r), (dc, dr)| (c.max(dc), r.max(dr)))
}

fn cell_value(c: Node<'_, '_>, shared_strings: &[String]) -> Option<CellValue> {
    let cell_type = c.attribute("t").unwrap_or("n");
    let raw = c
        .children()
        .find(|n| n.has_tag_name("v"))
        .and_then(|v| v.text());

    match cell_type {
        "s" => {
            let index: usize = raw?.trim().parse().ok()?;
            shared_strings.get(index).cloned().map(CellValue::Text)
        }
        "inlineStr" => c
            .children()
            .find(|n| n.has_tag_name("is"))
            .map(|is| CellValue::Text(rich_text(is))),
        "str" | "d" => raw.map(|s| CellValue::Text(s.to_string())),
        "b" => raw.map(|s| CellValue::Bool(s.trim() == "1")),
        "e" => raw.map(|s| CellValue::Error(s.to_string())),
        _ => raw.and_then(|s| s.trim().parse().ok()).map(CellValue::Number),
    }
}

// =HYPERLINK("https://...", "label") with a literal target
fn formula_hyperlink(c: Node<'_, '_>) -> Option<String> {
    let formula = c.children().find(|n| n.has_tag_name("f"))?.text()?;
    let formula = formula.trim().trim_start_matches('=');
    let head = formula.get(..10)?;
    if !head.eq_ignore_ascii_case("HYPERLINK(") {
        return None;
    }

    let rest = formula[10..].trim_start();
    let rest = rest.strip_prefix('"')?;
    // "" escapes a quote inside a formula string literal
    let mut target = String::new();
    let mut chars = rest.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '"' {
            if chars.peek() == Some(&'"') {
                chars.next();
                target.push('"');
                continue;
            }
            return (!target.is_empty()).then_some(target);
        }
        target.push(ch);
    }
    None
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    const WORKBOOK_RELS_HEAD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#;

    /// Builds an .xlsx package in memory. Each sheet is (name, sheetData
    /// inner XML, hyperlinks inner XML, sheet rels inner XML).
    pub(crate) fn build_xlsx(shared: &[&str], sheets: &[(&str, &str, &str, &str)]) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let opts = SimpleFileOptions::default();

        let mut sheet_entries = String::new();
        let mut rel_entries = String::new();
        for (i, (name, _, _, _)) in sheets.iter().enumerate() {
            let n = i + 1;
            sheet_entries.push_str(&format!(
                r#"<sheet name="{}" sheetId="{}" r:id="rId{}"/>"#,
                name, n, n
            ));
            rel_entries.push_str(&format!(
                r#"<Relationship Id="rId{}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet{}.xml"/>"#,
                n, n
            ));
        }

        zip.start_file("xl/workbook.xml", opts).unwrap();
        write!(
            zip,
            r#"<?xml version="1.0" encoding="UTF-8"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="{}"><sheets>{}</sheets></workbook>"#,
            REL_NS, sheet_entries
        )
        .unwrap();

        zip.start_file("xl/_rels/workbook.xml.rels", opts).unwrap();
        write!(zip, "{}{}</Relationships>", WORKBOOK_RELS_HEAD, rel_entries).unwrap();

        if !shared.is_empty() {
            let items: String = shared.iter().map(|s| format!("<si><t>{}</t></si>", s)).collect();
            zip.start_file("xl/sharedStrings.xml", opts).unwrap();
            write!(
                zip,
                r#"<?xml version="1.0" encoding="UTF-8"?>
<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">{}</sst>"#,
                items
            )
            .unwrap();
        }

        for (i, (_, data, links, rels)) in sheets.iter().enumerate() {
            let n = i + 1;
            zip.start_file(format!("xl/worksheets/sheet{}.xml", n), opts).unwrap();
            let hyperlinks = if links.is_empty() {
                String::new()
            } else {
                format!("<hyperlinks>{}</hyperlinks>", links)
            };
            write!(
                zip,
                r#"<?xml version="1.0" encoding="UTF-8"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="{}"><sheetData>{}</sheetData>{}</worksheet>"#,
                REL_NS, data, hyperlinks
            )
            .unwrap();

            if !rels.is_empty() {
                zip.start_file(format!("xl/worksheets/_rels/sheet{}.xml.rels", n), opts)
                    .unwrap();
                write!(zip, "{}{}</Relationships>", WORKBOOK_RELS_HEAD, rels).unwrap();
            }
        }

        zip.finish().unwrap().into_inner()
    }

    #[test]
    fn test_reads_values_and_sheet_order() {
        let bytes = build_xlsx(
            &["https://example.org/a", "N/A"],
            &[
                (
                    "Fracción I",
                    r#"<row r="1"><c r="A1" t="s"><v>0</v></c><c r="B1"><v>42</v></c></row>
                       <row r="3"><c r="C3" t="s"><v>1</v></c></row>"#,
                    "",
                    "",
                ),
                (
                    "Second",
                    r#"<row r="2"><c r="B2" t="inlineStr"><is><t>https://example.org/b</t></is></c>
                       <c r="C2" t="b"><v>1</v></c></row>"#,
                    "",
                    "",
                ),
            ],
        );

        let wb = read_workbook(Cursor::new(bytes)).unwrap();
        let names: Vec<_> = wb.sheets.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Fracción I", "Second"]);

        let first = &wb.sheets[0];
        assert_eq!(first.get("A1").unwrap().text(), Some("https://example.org/a"));
        assert_eq!(first.get("B1").unwrap().value, Some(CellValue::Number(42.0)));
        assert_eq!(first.get("C3").unwrap().text(), Some("N/A"));

        let second = &wb.sheets[1];
        assert_eq!(second.get("B2").unwrap().text(), Some("https://example.org/b"));
        assert_eq!(second.get("C2").unwrap().value, Some(CellValue::Bool(true)));
    }

    #[test]
    fn test_reads_external_hyperlinks() {
        let bytes = build_xlsx(
            &["Ver documento"],
            &[(
                "Sheet1",
                r#"<row r="1"><c r="A1" t="s"><v>0</v></c></row>
                   <row r="4"><c r="D4"><v>7</v></c></row>"#,
                r#"<hyperlink ref="A1" r:id="rId1"/>
                   <hyperlink ref="B4:C4" r:id="rId2"/>
                   <hyperlink ref="D1" location="Sheet2!A1"/>"#,
                r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink" Target="https://example.org/report.pdf" TargetMode="External"/>
                   <Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink" Target="https://example.org/range" TargetMode="External"/>"#,
            )],
        );

        let wb = read_workbook(Cursor::new(bytes)).unwrap();
        let sheet = &wb.sheets[0];

        let a1 = sheet.get("A1").unwrap();
        assert_eq!(a1.text(), Some("Ver documento"));
        assert_eq!(a1.hyperlink.as_deref(), Some("https://example.org/report.pdf"));

        // Hyperlinks on empty cells still exist, once per cell of the range
        assert_eq!(sheet.get("B4").unwrap().hyperlink.as_deref(), Some("https://example.org/range"));
        assert_eq!(sheet.get("C4").unwrap().hyperlink.as_deref(), Some("https://example.org/range"));

        assert!(sheet.get("D1").is_none());
    }

    #[test]
    fn test_whole_column_hyperlink_stops_at_used_area() {
        let bytes = build_xlsx(
            &["Informe"],
            &[(
                "Sheet1",
                r#"<row r="1"><c r="A1" t="s"><v>0</v></c></row>
                   <row r="2"><c r="A2" t="s"><v>0</v></c></row>
                   <row r="3"><c r="B3"><v>1</v></c></row>"#,
                r#"<hyperlink ref="A1:A1048576" r:id="rId1"/>"#,
                r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink" Target="https://example.org/all" TargetMode="External"/>"#,
            )],
        );

        let wb = read_workbook(Cursor::new(bytes)).unwrap();
        let sheet = &wb.sheets[0];
        assert_eq!(sheet.rows.len(), 3);
        for reference in ["A1", "A2", "A3"] {
            assert_eq!(
                sheet.get(reference).unwrap().hyperlink.as_deref(),
                Some("https://example.org/all"),
                "{}",
                reference
            );
        }
        assert!(sheet.get("A4").is_none());
    }

    #[test]
    fn test_hyperlink_formula() {
        let bytes = build_xlsx(
            &[],
            &[(
                "Sheet1",
                r#"<row r="1"><c r="A1" t="str"><f>HYPERLINK("https://example.org/x?q=""a""","Ver")</f><v>Ver</v></c>
                   <c r="B1" t="str"><f>HYPERLINK(A2,"Ver")</f><v>Ver</v></c></row>"#,
                "",
                "",
            )],
        );

        let wb = read_workbook(Cursor::new(bytes)).unwrap();
        let sheet = &wb.sheets[0];
        assert_eq!(
            sheet.get("A1").unwrap().hyperlink.as_deref(),
            Some("https://example.org/x?q=\"a\"")
        );
        assert_eq!(sheet.get("B1").unwrap().hyperlink, None);
    }

    #[test]
    fn test_not_a_zip() {
        let result = read_workbook(Cursor::new(b"plain text".to_vec()));
        assert!(matches!(result, Err(WorkbookError::Zip(_))));
    }

    #[test]
    fn test_rels_path() {
        assert_eq!(rels_path_for("xl/worksheets/sheet1.xml"), "xl/worksheets/_rels/sheet1.xml.rels");
        assert_eq!(resolve_part("xl", "/xl/worksheets/sheet2.xml"), "xl/worksheets/sheet2.xml");
        assert_eq!(resolve_part("xl", "worksheets/sheet2.xml"), "xl/worksheets/sheet2.xml");
    }
}
