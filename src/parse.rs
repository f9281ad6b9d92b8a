//! Raw parsing of uploaded files into loosely-typed rows.
//!
//! Supports JSON arrays, CSV with a header row, and the first worksheet of
//! an XLSX or legacy XLS workbook. No semantic validation happens here:
//! column names and value types are whatever the file contains, with
//! numeric-looking CSV cells promoted to numbers.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use serde_json::{Number, Value};

use crate::error::ParseError;
use crate::models::RawRecord;

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;
/// Maximum cells read from the worksheet (avoids unbounded memory).
const XLSX_MAX_CELLS: usize = 1_000_000;
const XLSX_MAX_COLUMN_LETTERS: usize = 3;

/// Upload formats recognized by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Json,
    Csv,
    Xlsx,
    Xls,
}

impl SourceFormat {
    /// Resolve the format from a file name's extension (case-insensitive).
    pub fn from_file_name(file_name: &str) -> Result<Self, ParseError> {
        let ext = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "json" => Ok(SourceFormat::Json),
            "csv" => Ok(SourceFormat::Csv),
            "xlsx" => Ok(SourceFormat::Xlsx),
            "xls" => Ok(SourceFormat::Xls),
            _ => Err(ParseError::UnsupportedFormat(ext)),
        }
    }
}

/// Parse an uploaded file into raw rows.
///
/// The extension is checked before the content is looked at, so an
/// unsupported file fails without any decoding work.
pub fn parse_upload(file_name: &str, bytes: &[u8]) -> Result<Vec<RawRecord>, ParseError> {
    match SourceFormat::from_file_name(file_name)? {
        SourceFormat::Json => parse_json(bytes),
        SourceFormat::Csv => parse_csv(bytes),
        SourceFormat::Xlsx => parse_xlsx(bytes),
        SourceFormat::Xls => parse_xls(bytes),
    }
}

/// Read an upload from disk.
pub async fn read_upload(path: &Path) -> Result<Vec<u8>, ParseError> {
    tokio::fs::read(path)
        .await
        .map_err(|e| ParseError::Io(format!("{}: {}", path.display(), e)))
}

fn parse_json(bytes: &[u8]) -> Result<Vec<RawRecord>, ParseError> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(|e| ParseError::MalformedJson(e.to_string()))?;
    let items = match value {
        Value::Array(items) => items,
        other => {
            return Err(ParseError::InvalidShape(format!(
                "expected a top-level array, found {}",
                json_kind(&other)
            )))
        }
    };
    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::Object(map) => Ok(map),
            other => Err(ParseError::InvalidShape(format!(
                "element {} is {}, expected an object",
                i,
                json_kind(&other)
            ))),
        })
        .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn parse_csv(bytes: &[u8]) -> Result<Vec<RawRecord>, ParseError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| ParseError::CsvParseError(e.to_string()))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| ParseError::CsvParseError(e.to_string()))?;
        if record.iter().all(|f| f.is_empty()) && record.len() <= 1 {
            continue;
        }
        let mut row = RawRecord::new();
        for (i, field) in record.iter().enumerate() {
            if let Some(header) = headers.get(i) {
                row.insert(header.clone(), typed_cell(field));
            }
        }
        rows.push(row);
    }
    Ok(rows)
}

/// Opportunistic typing of a CSV cell: numbers, booleans, empty → null.
fn typed_cell(field: &str) -> Value {
    let trimmed = field.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    if trimmed.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if trimmed.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }
    if looks_numeric(trimmed) {
        if let Ok(i) = trimmed.parse::<i64>() {
            return Value::Number(i.into());
        }
        if let Some(n) = trimmed.parse::<f64>().ok().and_then(Number::from_f64) {
            return Value::Number(n);
        }
    }
    Value::String(field.to_string())
}

/// Plain decimal notation with optional sign and exponent. Thousands
/// separators and currency symbols do not count: `"1,000"` stays a string.
fn looks_numeric(s: &str) -> bool {
    let s = s.strip_prefix('-').unwrap_or(s);
    let (mantissa, exponent) = match s.find(&['e', 'E'][..]) {
        Some(pos) => (&s[..pos], Some(&s[pos + 1..])),
        None => (s, None),
    };
    let mut parts = mantissa.splitn(2, '.');
    let int_part = parts.next().unwrap_or("");
    let frac_part = parts.next();
    let digits_ok = |p: &str| p.chars().all(|c| c.is_ascii_digit());
    let mantissa_ok = match frac_part {
        Some(frac) => {
            digits_ok(int_part) && digits_ok(frac) && !(int_part.is_empty() && frac.is_empty())
        }
        None => !int_part.is_empty() && digits_ok(int_part),
    };
    let exponent_ok = match exponent {
        Some(exp) => {
            let exp = exp.strip_prefix(&['+', '-'][..]).unwrap_or(exp);
            !exp.is_empty() && digits_ok(exp)
        }
        None => true,
    };
    mantissa_ok && exponent_ok
}

// ============ Spreadsheets ============

/// Turn a grid (first row = headers) into records. Blank cells are omitted,
/// fully blank rows are skipped, and blank or repeated headers get a suffix.
fn grid_to_records(grid: Vec<Vec<Option<Value>>>) -> Vec<RawRecord> {
    let mut rows = grid.into_iter();
    let header_row = match rows.next() {
        Some(h) => h,
        None => return Vec::new(),
    };

    let mut seen: BTreeMap<String, usize> = BTreeMap::new();
    let headers: Vec<String> = header_row
        .iter()
        .map(|cell| {
            let base = cell
                .as_ref()
                .and_then(header_text)
                .unwrap_or_else(|| "__EMPTY".to_string());
            let count = seen.entry(base.clone()).or_insert(0);
            let name = if *count == 0 {
                base
            } else {
                format!("{}_{}", base, count)
            };
            *count += 1;
            name
        })
        .collect();

    rows.filter_map(|cells| {
        let mut record = RawRecord::new();
        for (i, cell) in cells.into_iter().enumerate() {
            if let (Some(value), Some(header)) = (cell, headers.get(i)) {
                record.insert(header.clone(), value);
            }
        }
        if record.is_empty() {
            None
        } else {
            Some(record)
        }
    })
    .collect()
}

fn header_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
            _ => n.to_string(),
        },
        Value::Bool(b) => b.to_string().to_uppercase(),
        _ => return None,
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn number_value(f: f64) -> Option<Value> {
    if f.fract() == 0.0 && f.abs() < 9.0e15 {
        return Some(Value::Number((f as i64).into()));
    }
    Number::from_f64(f).map(Value::Number)
}

fn parse_xls(bytes: &[u8]) -> Result<Vec<RawRecord>, ParseError> {
    use calamine::{Data, Reader, Xls};

    let mut workbook: Xls<_> = Xls::new(std::io::Cursor::new(bytes))
        .map_err(|e| ParseError::ExcelParseError(e.to_string()))?;
    let range = match workbook.worksheet_range_at(0) {
        Some(r) => r.map_err(|e| ParseError::ExcelParseError(e.to_string()))?,
        None => return Err(ParseError::ExcelParseError("workbook has no sheets".to_string())),
    };

    let grid = range
        .rows()
        .map(|row| {
            row.iter()
                .map(|cell| match cell {
                    Data::Empty => None,
                    Data::String(s) if s.is_empty() => None,
                    Data::String(s) => Some(Value::String(s.clone())),
                    Data::Int(i) => Some(Value::Number((*i).into())),
                    Data::Float(f) => number_value(*f),
                    Data::Bool(b) => Some(Value::Bool(*b)),
                    Data::DateTime(dt) => number_value(dt.as_f64()),
                    Data::DateTimeIso(s) | Data::DurationIso(s) => Some(Value::String(s.clone())),
                    Data::Error(e) => Some(Value::String(e.to_string())),
                })
                .collect()
        })
        .collect();
    Ok(grid_to_records(grid))
}

type Archive<'a> = zip::ZipArchive<std::io::Cursor<&'a [u8]>>;

fn excel_err(e: impl std::fmt::Display) -> ParseError {
    ParseError::ExcelParseError(e.to_string())
}

fn parse_xlsx(bytes: &[u8]) -> Result<Vec<RawRecord>, ParseError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(excel_err)?;
    let shared_strings = read_shared_strings(&mut archive)?;
    let sheet = first_worksheet_path(&mut archive)?;
    let sheet_xml = read_zip_entry_bounded(&mut archive, &sheet, MAX_XML_ENTRY_BYTES)?;
    let grid = read_sheet_grid(&sheet_xml, &shared_strings)?;
    Ok(grid_to_records(grid))
}

fn read_zip_entry_bounded(
    archive: &mut Archive<'_>,
    name: &str,
    max_bytes: u64,
) -> Result<Vec<u8>, ParseError> {
    let entry = archive.by_name(name).map_err(excel_err)?;
    let mut out = Vec::new();
    entry
        .take(max_bytes)
        .read_to_end(&mut out)
        .map_err(excel_err)?;
    if out.len() as u64 >= max_bytes {
        return Err(ParseError::ExcelParseError(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, max_bytes
        )));
    }
    Ok(out)
}

fn read_shared_strings(archive: &mut Archive<'_>) -> Result<Vec<String>, ParseError> {
    if archive.index_for_name("xl/sharedStrings.xml").is_none() {
        return Ok(Vec::new());
    }
    let xml = read_zip_entry_bounded(archive, "xl/sharedStrings.xml", MAX_XML_ENTRY_BYTES)?;
    let mut strings = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml.as_slice());
    let mut buf = Vec::new();
    let mut current: Option<String> = None;
    let mut in_t = false;
    // Phonetic runs (<rPh>) carry furigana that is not part of the cell text.
    let mut in_phonetic = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"rPh" => in_phonetic = true,
                b"t" => in_t = !in_phonetic,
                _ => {}
            },
            Ok(quick_xml::events::Event::Text(te)) if in_t => {
                if let Some(s) = current.as_mut() {
                    s.push_str(&te.unescape().map_err(excel_err)?);
                }
            }
            Ok(quick_xml::events::Event::End(e)) => match e.local_name().as_ref() {
                b"si" => strings.push(current.take().unwrap_or_default()),
                b"rPh" => in_phonetic = false,
                b"t" => in_t = false,
                _ => {}
            },
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(excel_err(e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

/// Path of the first worksheet in workbook order, resolved through the
/// workbook relationships. Falls back to the lowest-numbered sheet part.
fn first_worksheet_path(archive: &mut Archive<'_>) -> Result<String, ParseError> {
    if let Some(path) = first_sheet_from_workbook(archive)? {
        if archive.index_for_name(&path).is_some() {
            return Ok(path);
        }
    }
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with("xl/worksheets/sheet") && n.ends_with(".xml"))
        .map(|s| s.to_string())
        .collect();
    names.sort_by_key(|name| {
        name.trim_start_matches("xl/worksheets/sheet")
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });
    names
        .into_iter()
        .next()
        .ok_or_else(|| ParseError::ExcelParseError("workbook has no worksheets".to_string()))
}

fn first_sheet_from_workbook(archive: &mut Archive<'_>) -> Result<Option<String>, ParseError> {
    if archive.index_for_name("xl/workbook.xml").is_none()
        || archive.index_for_name("xl/_rels/workbook.xml.rels").is_none()
    {
        return Ok(None);
    }
    let workbook = read_zip_entry_bounded(archive, "xl/workbook.xml", MAX_XML_ENTRY_BYTES)?;
    let rel_id = match first_attr_value(&workbook, b"sheet", b"id")? {
        Some(id) => id,
        None => return Ok(None),
    };
    let rels = read_zip_entry_bounded(archive, "xl/_rels/workbook.xml.rels", MAX_XML_ENTRY_BYTES)?;
    let mut reader = quick_xml::Reader::from_reader(rels.as_slice());
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) | Ok(quick_xml::events::Event::Empty(e))
                if e.local_name().as_ref() == b"Relationship" =>
            {
                let mut id = None;
                let mut target = None;
                for attr in e.attributes().flatten() {
                    let value = attr.unescape_value().map_err(excel_err)?.into_owned();
                    match attr.key.local_name().as_ref() {
                        b"Id" => id = Some(value),
                        b"Target" => target = Some(value),
                        _ => {}
                    }
                }
                if id.as_deref() == Some(rel_id.as_str()) {
                    return Ok(target.map(|t| match t.strip_prefix('/') {
                        Some(absolute) => absolute.to_string(),
                        None => format!("xl/{}", t),
                    }));
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(excel_err(e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(None)
}

/// Value of the first `attr` (matched by local name) on the first `element`.
fn first_attr_value(xml: &[u8], element: &[u8], attr: &[u8]) -> Result<Option<String>, ParseError> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) | Ok(quick_xml::events::Event::Empty(e))
                if e.local_name().as_ref() == element =>
            {
                for a in e.attributes().flatten() {
                    if a.key.local_name().as_ref() == attr {
                        return Ok(Some(a.unescape_value().map_err(excel_err)?.into_owned()));
                    }
                }
                return Ok(None);
            }
            Ok(quick_xml::events::Event::Eof) => return Ok(None),
            Err(e) => return Err(excel_err(e)),
            _ => {}
        }
        buf.clear();
    }
}

/// Zero-based column index from a cell reference such as `"AB12"`.
///
/// `None` for references without letters or past three letters (`XFD` is
/// the last XLSX column).
fn column_index(cell_ref: &str) -> Option<usize> {
    let letters: Vec<u8> = cell_ref
        .bytes()
        .take_while(|b| b.is_ascii_alphabetic())
        .collect();
    if letters.is_empty() || letters.len() > XLSX_MAX_COLUMN_LETTERS {
        return None;
    }
    let index = letters.iter().try_fold(0usize, |acc, b| {
        acc.checked_mul(26)?
            .checked_add((b.to_ascii_uppercase() - b'A') as usize + 1)
    })?;
    Some(index - 1)
}

#[derive(Default)]
struct CellState {
    column: usize,
    kind: Option<String>,
    text: String,
}

fn read_sheet_grid(
    xml: &[u8],
    shared_strings: &[String],
) -> Result<Vec<Vec<Option<Value>>>, ParseError> {
    let mut rows: BTreeMap<usize, BTreeMap<usize, Value>> = BTreeMap::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut row_index = 0usize;
    let mut next_column = 0usize;
    let mut cell: Option<CellState> = None;
    let mut in_value = false;
    let mut cell_count = 0usize;

    loop {
        if cell_count >= XLSX_MAX_CELLS {
            break;
        }
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => match e.local_name().as_ref() {
                b"row" => {
                    row_index = e
                        .attributes()
                        .flatten()
                        .find(|a| a.key.local_name().as_ref() == b"r")
                        .and_then(|a| std::str::from_utf8(&a.value).ok()?.parse::<usize>().ok())
                        .map(|r| r.saturating_sub(1))
                        .unwrap_or(row_index);
                    next_column = 0;
                }
                b"c" => {
                    let mut state = CellState {
                        column: next_column,
                        ..Default::default()
                    };
                    for a in e.attributes().flatten() {
                        let value = String::from_utf8_lossy(&a.value).into_owned();
                        match a.key.local_name().as_ref() {
                            b"r" => state.column = column_index(&value).unwrap_or(next_column),
                            b"t" => state.kind = Some(value),
                            _ => {}
                        }
                    }
                    next_column = state.column + 1;
                    cell = Some(state);
                }
                b"v" | b"t" => in_value = cell.is_some(),
                _ => {}
            },
            Ok(quick_xml::events::Event::Empty(e)) => match e.local_name().as_ref() {
                b"c" => next_column += 1,
                b"row" => row_index += 1,
                _ => {}
            },
            Ok(quick_xml::events::Event::Text(te)) if in_value => {
                if let Some(state) = cell.as_mut() {
                    state.text.push_str(&te.unescape().map_err(excel_err)?);
                }
            }
            Ok(quick_xml::events::Event::End(e)) => match e.local_name().as_ref() {
                b"v" | b"t" => in_value = false,
                b"c" => {
                    if let Some(state) = cell.take() {
                        if let Some(value) = cell_value(&state, shared_strings) {
                            rows.entry(row_index).or_default().insert(state.column, value);
                            cell_count += 1;
                        }
                    }
                }
                b"row" => row_index += 1,
                _ => {}
            },
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(excel_err(e)),
            _ => {}
        }
        buf.clear();
    }

    let width = rows
        .values()
        .filter_map(|cells| cells.keys().next_back())
        .max()
        .map(|max| max + 1)
        .unwrap_or(0);
    Ok(rows
        .into_values()
        .map(|mut cells| (0..width).map(|c| cells.remove(&c)).collect())
        .collect())
}

fn cell_value(state: &CellState, shared_strings: &[String]) -> Option<Value> {
    let raw = state.text.as_str();
    match state.kind.as_deref() {
        Some("s") => {
            let idx = raw.trim().parse::<usize>().ok()?;
            let s = shared_strings.get(idx)?;
            if s.is_empty() {
                None
            } else {
                Some(Value::String(s.clone()))
            }
        }
        Some("b") => Some(Value::Bool(raw.trim() == "1")),
        Some("str") | Some("inlineStr") | Some("e") => {
            if raw.is_empty() {
                None
            } else {
                Some(Value::String(raw.to_string()))
            }
        }
        _ => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                return None;
            }
            match trimmed.parse::<f64>() {
                Ok(f) => number_value(f),
                Err(_) => Some(Value::String(trimmed.to_string())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unsupported_extension_is_rejected() {
        let err = parse_upload("data.txt", b"a,b\n1,2").unwrap_err();
        assert_eq!(err, ParseError::UnsupportedFormat("txt".to_string()));
        let err = parse_upload("noext", b"").unwrap_err();
        assert!(matches!(err, ParseError::UnsupportedFormat(_)));
    }

    #[test]
    fn extension_match_is_case_insensitive() {
        assert_eq!(SourceFormat::from_file_name("Q1.XLSX"), Ok(SourceFormat::Xlsx));
        assert_eq!(SourceFormat::from_file_name("a.b.Csv"), Ok(SourceFormat::Csv));
    }

    #[test]
    fn json_array_of_objects() {
        let body = r#"[{"month":"1월","amt":"1,000"}]"#;
        let rows = parse_upload("d.json", body.as_bytes()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["amt"], json!("1,000"));
    }

    #[test]
    fn json_non_array_is_invalid_shape() {
        let err = parse_upload("d.json", br#"{"rows": []}"#).unwrap_err();
        assert!(matches!(err, ParseError::InvalidShape(_)));
    }

    #[test]
    fn json_garbage_is_malformed() {
        let err = parse_upload("d.json", b"[{not json").unwrap_err();
        assert!(matches!(err, ParseError::MalformedJson(_)));
    }

    #[test]
    fn csv_types_cells_and_skips_blank_lines() {
        let csv = "month,target,actual,note,flag\n1월,100,90.5,,TRUE\n\n2월,1000,\"1,200\",late,false\n";
        let rows = parse_upload("s.csv", csv.as_bytes()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["target"], json!(100));
        assert_eq!(rows[0]["actual"], json!(90.5));
        assert_eq!(rows[0]["note"], Value::Null);
        assert_eq!(rows[0]["flag"], json!(true));
        assert_eq!(rows[1]["actual"], json!("1,200"));
        assert_eq!(rows[1]["flag"], json!(false));
    }

    #[test]
    fn csv_invalid_utf8_fails_whole_file() {
        let mut bytes = b"name,value\nok,1\n".to_vec();
        bytes.extend_from_slice(&[0xff, 0xfe, b',', b'2', b'\n']);
        let err = parse_upload("r.csv", &bytes).unwrap_err();
        assert!(matches!(err, ParseError::CsvParseError(_)));
    }

    #[test]
    fn numeric_detection() {
        assert!(looks_numeric("12"));
        assert!(looks_numeric("-0.5"));
        assert!(looks_numeric(".5"));
        assert!(looks_numeric("1e3"));
        assert!(!looks_numeric("1,000"));
        assert!(!looks_numeric("inf"));
        assert!(!looks_numeric("NaN"));
        assert!(!looks_numeric("."));
        assert!(!looks_numeric("1e"));
    }

    #[test]
    fn column_letters() {
        assert_eq!(column_index("A1"), Some(0));
        assert_eq!(column_index("Z9"), Some(25));
        assert_eq!(column_index("AB12"), Some(27));
        assert_eq!(column_index("12"), None);
        assert_eq!(column_index("XFD1048576"), Some(16383));
        assert_eq!(column_index("ZZZZZZZZZZZZZZZZ1"), None);
    }

    #[test]
    fn oversized_cell_reference_falls_back_to_position() {
        let xml = br#"<worksheet><sheetData><row r="1"><c r="A1" t="inlineStr"><is><t>week</t></is></c><c r="ZZZZZZZZZZZZZZZZ1" t="inlineStr"><is><t>sales</t></is></c></row></sheetData></worksheet>"#;
        let grid = read_sheet_grid(xml, &[]).unwrap();
        assert_eq!(grid, vec![vec![Some(json!("week")), Some(json!("sales"))]]);
    }

    #[test]
    fn grid_headers_are_deduplicated() {
        let grid = vec![
            vec![Some(json!("a")), None, Some(json!("a"))],
            vec![Some(json!(1)), Some(json!(2)), Some(json!(3))],
            vec![None, None, None],
        ];
        let rows = grid_to_records(grid);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["a"], json!(1));
        assert_eq!(rows[0]["__EMPTY"], json!(2));
        assert_eq!(rows[0]["a_1"], json!(3));
    }

    #[test]
    fn invalid_zip_is_excel_error() {
        let err = parse_upload("book.xlsx", b"not a zip").unwrap_err();
        assert!(matches!(err, ParseError::ExcelParseError(_)));
        let err = parse_upload("book.xls", b"not a workbook").unwrap_err();
        assert!(matches!(err, ParseError::ExcelParseError(_)));
    }
}
