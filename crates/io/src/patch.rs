//! Apply [`CellCorrection`]s to an xlsx package.
//!
//! Only the `<c>` elements named by a correction are rewritten. Every ZIP
//! entry other than the affected worksheet parts is raw-copied, so styles,
//! shared strings and unrelated sheets come through byte-identical. A
//! corrected cell that held a formula loses it; when that happens the
//! calculation chain is dropped so Excel rebuilds it on open.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::{Cursor, Read, Seek, Write};
use std::path::Path;

use log::{debug, info, warn};
use ordercheck_recon::model::format_number;
use ordercheck_recon::CellCorrection;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use serde::Serialize;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::IoError;

const WORKBOOK_PART: &str = "xl/workbook.xml";
const WORKBOOK_RELS_PART: &str = "xl/_rels/workbook.xml.rels";
const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
const CALC_CHAIN_PART: &str = "xl/calcChain.xml";

#[derive(Debug, Clone, Serialize)]
pub struct SkippedCorrection {
    pub correction: CellCorrection,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PatchReport {
    pub applied: Vec<CellCorrection>,
    pub skipped: Vec<SkippedCorrection>,
    /// Corrected cells whose formula was replaced by the literal value.
    pub formulas_dropped: usize,
    pub calc_chain_removed: bool,
}

#[derive(Debug)]
pub struct PatchedWorkbook {
    pub bytes: Vec<u8>,
    pub report: PatchReport,
}

/// Patch `input` and write the result to `output`. The two paths may be the same.
pub fn patch_xlsx_file(
    input: &Path,
    output: &Path,
    corrections: &[CellCorrection],
) -> Result<PatchReport, IoError> {
    let bytes = std::fs::read(input).map_err(|e| IoError::at(input, e))?;
    let patched = patch_xlsx(&bytes, corrections)?;
    std::fs::write(output, &patched.bytes).map_err(|e| IoError::at(output, e))?;
    info!(
        "wrote {}: {} cells corrected, {} skipped",
        output.display(),
        patched.report.applied.len(),
        patched.report.skipped.len()
    );
    Ok(patched.report)
}

pub fn patch_xlsx(bytes: &[u8], corrections: &[CellCorrection]) -> Result<PatchedWorkbook, IoError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut report = PatchReport::default();

    let workbook_xml = read_zip_file(&mut archive, WORKBOOK_PART)?;
    let rels_xml = read_zip_file(&mut archive, WORKBOOK_RELS_PART)?;
    let sheet_parts = resolve_sheet_parts(&workbook_xml, &rels_xml)?;

    // Group corrections by worksheet part, one target per cell.
    let mut by_part: BTreeMap<String, BTreeMap<String, CellCorrection>> = BTreeMap::new();
    for c in corrections {
        let Some(part) = sheet_parts.get(&c.sheet) else {
            skip(&mut report, c, format!("sheet '{}' not in workbook", c.sheet));
            continue;
        };
        let cells = by_part.entry(part.clone()).or_default();
        let key = c.cell.to_string();
        if cells.contains_key(&key) {
            skip(&mut report, c, format!("duplicate correction for {}!{key}", c.sheet));
            continue;
        }
        cells.insert(key, c.clone());
    }

    let mut replaced: HashMap<String, Vec<u8>> = HashMap::new();
    for (part, cells) in &by_part {
        let xml = match read_zip_file(&mut archive, part) {
            Ok(xml) => xml,
            Err(e) => {
                for c in cells.values() {
                    skip(&mut report, c, e.to_string());
                }
                continue;
            }
        };
        let targets: BTreeMap<String, f64> =
            cells.iter().map(|(k, c)| (k.clone(), c.new_value)).collect();
        let rewrite = rewrite_cells(part, &xml, &targets)?;

        for (key, c) in cells {
            if rewrite.applied.contains(key) {
                report.applied.push(c.clone());
            } else if rewrite.shared_masters.contains(key) {
                skip(&mut report, c, "cell anchors a shared formula".to_string());
            } else {
                skip(&mut report, c, format!("cell {key} not present in worksheet"));
            }
        }
        report.formulas_dropped += rewrite.formulas_dropped;
        if !rewrite.applied.is_empty() {
            debug!("{part}: rewrote {} cells", rewrite.applied.len());
            replaced.insert(part.clone(), rewrite.xml);
        }
    }

    let mut removed: BTreeSet<String> = BTreeSet::new();
    if report.formulas_dropped > 0 && archive.index_for_name(CALC_CHAIN_PART).is_some() {
        let content_types = read_zip_file(&mut archive, CONTENT_TYPES_PART)?;
        replaced.insert(
            CONTENT_TYPES_PART.to_string(),
            drop_elements(CONTENT_TYPES_PART, &content_types, b"Override", |attr, value| {
                attr == b"PartName" && value == "/xl/calcChain.xml"
            })?,
        );
        replaced.insert(
            WORKBOOK_RELS_PART.to_string(),
            drop_elements(WORKBOOK_RELS_PART, &rels_xml, b"Relationship", |attr, value| {
                attr == b"Target" && value.ends_with("calcChain.xml")
            })?,
        );
        removed.insert(CALC_CHAIN_PART.to_string());
        report.calc_chain_removed = true;
    }

    for s in &report.skipped {
        warn!(
            "skipped correction {}!{} (order {}): {}",
            s.correction.sheet, s.correction.cell, s.correction.order, s.reason
        );
    }

    let bytes = write_package(&mut archive, &replaced, &removed)?;
    Ok(PatchedWorkbook { bytes, report })
}

fn skip(report: &mut PatchReport, correction: &CellCorrection, reason: String) {
    report.skipped.push(SkippedCorrection {
        correction: correction.clone(),
        reason,
    });
}

/// Copy every entry into a new package, substituting `replaced` parts and
/// leaving out `removed` ones.
fn write_package<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    replaced: &HashMap<String, Vec<u8>>,
    removed: &BTreeSet<String>,
) -> Result<Vec<u8>, IoError> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for i in 0..archive.len() {
        let entry = archive.by_index_raw(i)?;
        let name = entry.name().to_string();
        if removed.contains(&name) {
            continue;
        }
        match replaced.get(&name) {
            Some(data) => {
                drop(entry);
                writer.start_file(name, options)?;
                writer.write_all(data)?;
            }
            None => writer.raw_copy_file(entry)?,
        }
    }

    Ok(writer.finish()?.into_inner())
}

fn read_zip_file<R: Read + Seek>(archive: &mut ZipArchive<R>, path: &str) -> Result<String, IoError> {
    let mut file = archive
        .by_name(path)
        .map_err(|e| IoError::Zip(format!("'{path}' not found in package: {e}")))?;
    let mut content = String::new();
    file.read_to_string(&mut content)
        .map_err(|e| IoError::Zip(format!("cannot read '{path}': {e}")))?;
    Ok(content)
}

// ---------------------------------------------------------------------------
// Sheet name -> worksheet part
// ---------------------------------------------------------------------------

/// Map each sheet name in workbook.xml to its worksheet part path.
fn resolve_sheet_parts(workbook_xml: &str, rels_xml: &str) -> Result<HashMap<String, String>, IoError> {
    let mut sheets: Vec<(String, String)> = Vec::new();
    let mut reader = Reader::from_str(workbook_xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e)) if e.name().as_ref() == b"sheet" => {
                let mut name = None;
                let mut rid = None;
                for attr in e.attributes().flatten() {
                    match attr.key.as_ref() {
                        b"name" => name = Some(unescape_attr(&attr.value)),
                        b"r:id" => rid = Some(String::from_utf8_lossy(&attr.value).to_string()),
                        _ => {}
                    }
                }
                if let (Some(name), Some(rid)) = (name, rid) {
                    sheets.push((name, rid));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(IoError::xml(WORKBOOK_PART, e)),
            _ => {}
        }
        buf.clear();
    }

    let mut targets: HashMap<String, String> = HashMap::new();
    let mut reader = Reader::from_str(rels_xml);
    reader.config_mut().trim_text(true);
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e))
                if e.name().as_ref() == b"Relationship" =>
            {
                let mut id = None;
                let mut target = None;
                for attr in e.attributes().flatten() {
                    match attr.key.as_ref() {
                        b"Id" => id = Some(String::from_utf8_lossy(&attr.value).to_string()),
                        b"Target" => target = Some(unescape_attr(&attr.value)),
                        _ => {}
                    }
                }
                if let (Some(id), Some(target)) = (id, target) {
                    targets.insert(id, target);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(IoError::xml(WORKBOOK_RELS_PART, e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(sheets
        .into_iter()
        .filter_map(|(name, rid)| targets.get(&rid).map(|t| (name, part_path(t))))
        .collect())
}

/// Relationship targets are relative to `xl/` unless absolute.
fn part_path(target: &str) -> String {
    match target.strip_prefix('/') {
        Some(abs) => abs.to_string(),
        None => format!("xl/{target}"),
    }
}

fn unescape_attr(raw: &[u8]) -> String {
    let raw = String::from_utf8_lossy(raw);
    quick_xml::escape::unescape(&raw)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| raw.into_owned())
}

// ---------------------------------------------------------------------------
// Worksheet rewrite
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct SheetRewrite {
    xml: Vec<u8>,
    applied: BTreeSet<String>,
    /// Targeted cells left alone because other cells' formulas depend on them.
    shared_masters: BTreeSet<String>,
    formulas_dropped: usize,
}

/// Stream the worksheet XML, replacing each targeted `<c>` with a numeric
/// cell holding the new value. Every other event is written back unchanged.
fn rewrite_cells(part: &str, xml: &str, targets: &BTreeMap<String, f64>) -> Result<SheetRewrite, IoError> {
    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    let mut out = SheetRewrite::default();

    loop {
        let event = reader.read_event().map_err(|e| IoError::xml(part, e))?;
        match event {
            Event::Start(ref e) if e.name().as_ref() == b"c" => {
                let Some((key, value)) = target_for(e, targets) else {
                    write(&mut writer, part, Event::Start(e.clone()))?;
                    continue;
                };

                let mut children = Vec::new();
                let mut depth = 0usize;
                loop {
                    let child = reader.read_event().map_err(|e| IoError::xml(part, e))?;
                    match &child {
                        Event::Start(_) => depth += 1,
                        Event::End(_) if depth == 0 => break,
                        Event::End(_) => depth -= 1,
                        Event::Eof => {
                            return Err(IoError::xml(part, format!("unterminated cell {key}")))
                        }
                        _ => {}
                    }
                    children.push(child);
                }

                if children.iter().any(is_shared_formula_master) {
                    write(&mut writer, part, Event::Start(e.clone()))?;
                    for child in children {
                        write(&mut writer, part, child)?;
                    }
                    write(&mut writer, part, Event::End(e.to_end().into_owned()))?;
                    out.shared_masters.insert(key);
                    continue;
                }

                if children.iter().any(is_formula) {
                    out.formulas_dropped += 1;
                }
                write_numeric_cell(&mut writer, part, e, value)?;
                out.applied.insert(key);
            }
            Event::Empty(ref e) if e.name().as_ref() == b"c" => match target_for(e, targets) {
                Some((key, value)) => {
                    write_numeric_cell(&mut writer, part, e, value)?;
                    out.applied.insert(key);
                }
                None => write(&mut writer, part, Event::Empty(e.clone()))?,
            },
            Event::Eof => break,
            other => write(&mut writer, part, other)?,
        }
    }

    out.xml = writer.into_inner().into_inner();
    Ok(out)
}

fn target_for(cell: &BytesStart<'_>, targets: &BTreeMap<String, f64>) -> Option<(String, f64)> {
    let reference = cell
        .attributes()
        .flatten()
        .find(|a| a.key.as_ref() == b"r")
        .map(|a| String::from_utf8_lossy(&a.value).to_uppercase())?;
    targets.get(&reference).map(|v| (reference, *v))
}

fn is_formula(event: &Event<'_>) -> bool {
    matches!(event, Event::Start(e) | Event::Empty(e) if e.name().as_ref() == b"f")
}

/// `<f t="shared" ref="...">` is the master copy other cells point at.
fn is_shared_formula_master(event: &Event<'_>) -> bool {
    let (Event::Start(e) | Event::Empty(e)) = event else {
        return false;
    };
    if e.name().as_ref() != b"f" {
        return false;
    }
    let mut shared = false;
    let mut has_ref = false;
    for attr in e.attributes().flatten() {
        match attr.key.as_ref() {
            b"t" => shared = attr.value.as_ref() == b"shared",
            b"ref" => has_ref = true,
            _ => {}
        }
    }
    shared && has_ref
}

/// `<c r=.. s=..><v>value</v></c>`; the type attribute is dropped so the
/// cell reads as a number.
fn write_numeric_cell<W: Write>(
    writer: &mut Writer<W>,
    part: &str,
    original: &BytesStart<'_>,
    value: f64,
) -> Result<(), IoError> {
    let name = String::from_utf8_lossy(original.name().as_ref()).into_owned();
    let mut start = BytesStart::new(name.clone());
    for attr in original.attributes() {
        let attr = attr.map_err(|e| IoError::xml(part, e))?;
        if attr.key.as_ref() != b"t" {
            start.push_attribute(attr);
        }
    }
    let text = format_number(value);
    write(writer, part, Event::Start(start))?;
    write(writer, part, Event::Start(BytesStart::new("v")))?;
    write(writer, part, Event::Text(BytesText::new(&text)))?;
    write(writer, part, Event::End(BytesEnd::new("v")))?;
    write(writer, part, Event::End(BytesEnd::new(name)))
}

fn write<W: Write>(writer: &mut Writer<W>, part: &str, event: Event<'_>) -> Result<(), IoError> {
    writer.write_event(event).map_err(|e| IoError::xml(part, e))
}

/// Rewrite `xml` without the `element`s that have an attribute matching `pred`.
fn drop_elements(
    part: &str,
    xml: &str,
    element: &[u8],
    pred: impl Fn(&[u8], &str) -> bool,
) -> Result<Vec<u8>, IoError> {
    let matches = |e: &BytesStart<'_>| {
        e.name().as_ref() == element
            && e.attributes()
                .flatten()
                .any(|a| pred(a.key.as_ref(), &String::from_utf8_lossy(&a.value)))
    };

    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    let mut skipping = 0usize;

    loop {
        let event = reader.read_event().map_err(|e| IoError::xml(part, e))?;
        if matches!(event, Event::Eof) {
            break;
        }
        if skipping > 0 {
            match event {
                Event::Start(_) => skipping += 1,
                Event::End(_) => skipping -= 1,
                _ => {}
            }
            continue;
        }
        match event {
            Event::Empty(ref e) if matches(e) => {}
            Event::Start(ref e) if matches(e) => skipping = 1,
            other => write(&mut writer, part, other)?,
        }
    }

    Ok(writer.into_inner().into_inner())
}
