//! Decoder for InfluxDB annotated CSV.
//!
//! A Flux response is a sequence of table sections. Each section starts with
//! optional `#datatype`, `#group` and `#default` annotation rows, then a
//! header row, then data rows. Sections are separated by a blank line. The
//! first column of every row is the annotation column and is always empty for
//! headers and data.
//!
//! Quoting follows RFC 4180, so `failure_stack` values may span lines.

use crate::error::{Result, StoreError};
use serde_json::{Map, Number, Value};

/// One result row: column name to value, in column order.
pub type ResultRow = Map<String, Value>;

/// Flux bookkeeping columns that carry no information for a reader.
pub const METADATA_COLUMNS: &[&str] = &["result", "table", "_start", "_stop"];

/// Decode an annotated CSV body into rows, dropping metadata columns.
///
/// An in-band error table (header `error,reference`) is returned as
/// [`StoreError::Query`].
pub fn decode_annotated_csv(body: &str) -> Result<Vec<ResultRow>> {
    let mut rows = Vec::new();
    let mut section = Section::default();

    for record in split_records(body)? {
        if record.iter().all(|field| field.is_empty()) {
            section = Section::default();
            continue;
        }

        if record[0].starts_with('#') {
            // Annotations after a header open the next table section.
            if section.header.is_some() {
                section = Section::default();
            }
            match record[0].as_str() {
                "#datatype" => section.datatypes = Some(record),
                "#default" => section.defaults = Some(record),
                _ => {}
            }
            continue;
        }

        match &section.header {
            None => section.header = Some(record),
            Some(header) => {
                if let Some(message) = in_band_error(header, &record) {
                    return Err(StoreError::Query(message));
                }
                rows.push(section.decode_row(header, &record));
            }
        }
    }

    Ok(rows)
}

#[derive(Default)]
struct Section {
    datatypes: Option<Vec<String>>,
    defaults: Option<Vec<String>>,
    header: Option<Vec<String>>,
}

impl Section {
    fn decode_row(&self, header: &[String], record: &[String]) -> ResultRow {
        let mut row = ResultRow::new();

        for (idx, name) in header.iter().enumerate() {
            if name.is_empty() || METADATA_COLUMNS.contains(&name.as_str()) {
                continue;
            }

            let raw = record.get(idx).map(String::as_str).unwrap_or("");
            let default = self
                .defaults
                .as_ref()
                .and_then(|d| d.get(idx))
                .map(String::as_str);
            let datatype = self
                .datatypes
                .as_ref()
                .and_then(|d| d.get(idx))
                .map(String::as_str);

            row.insert(name.clone(), convert_cell(raw, default, datatype));
        }

        row
    }
}

fn in_band_error(header: &[String], record: &[String]) -> Option<String> {
    let error_idx = header.iter().position(|h| h == "error")?;
    if !header.iter().any(|h| h == "reference") {
        return None;
    }
    record
        .get(error_idx)
        .filter(|message| !message.is_empty())
        .cloned()
}

fn convert_cell(raw: &str, default: Option<&str>, datatype: Option<&str>) -> Value {
    let raw = if raw.is_empty() {
        default.unwrap_or("")
    } else {
        raw
    };
    if raw.is_empty() {
        return Value::Null;
    }

    let number = match datatype {
        Some("long") => raw.parse::<i64>().ok().map(Number::from),
        Some("unsignedLong") => raw.parse::<u64>().ok().map(Number::from),
        Some("double") => raw.parse::<f64>().ok().and_then(Number::from_f64),
        _ => None,
    };

    number
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(raw.to_string()))
}

/// Split a CSV body into records. A blank line yields an empty record.
fn split_records(body: &str) -> Result<Vec<Vec<String>>> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut line_has_content = false;
    let mut chars = body.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    field.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                field.push(c);
            }
            continue;
        }

        match c {
            '"' => {
                in_quotes = true;
                line_has_content = true;
            }
            ',' => {
                record.push(std::mem::take(&mut field));
                line_has_content = true;
            }
            '\r' => {}
            '\n' => {
                if line_has_content {
                    record.push(std::mem::take(&mut field));
                }
                records.push(std::mem::take(&mut record));
                line_has_content = false;
            }
            _ => {
                field.push(c);
                line_has_content = true;
            }
        }
    }

    if in_quotes {
        return Err(StoreError::Decode("unterminated quoted field".to_string()));
    }
    if line_has_content {
        record.push(field);
        records.push(record);
    }

    Ok(records)
}
