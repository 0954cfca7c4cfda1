//! Format-specific parsing of uploaded files into record JSON.
//!
//! The upload transport supplies bytes plus a declared content type; this
//! module returns the `data_json` value stored on the record:
//!
//! | Content type      | Result                                   |
//! |-------------------|------------------------------------------|
//! | `text/csv`        | array of row objects keyed by the header |
//! | `application/pdf` | `{"text": "<extracted text>"}`           |
//!
//! Parsing is CPU-bound and synchronous; callers on the async runtime run it
//! through `spawn_blocking`.

use serde_json::{Map, Value};
use thiserror::Error;

pub const MIME_CSV: &str = "text/csv";
pub const MIME_PDF: &str = "application/pdf";

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported content-type: {0}")]
    UnsupportedContentType(String),
    #[error("CSV parsing failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
}

/// Strip parameters (`; charset=...`) and normalise case.
pub fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// True when [`parse_file`] accepts this content type.
pub fn is_supported(content_type: &str) -> bool {
    matches!(essence(content_type).as_str(), MIME_CSV | MIME_PDF)
}

/// Parse one uploaded file according to its declared content type.
pub fn parse_file(bytes: &[u8], content_type: &str) -> Result<Value, ExtractError> {
    match essence(content_type).as_str() {
        MIME_CSV => parse_csv(bytes),
        MIME_PDF => extract_pdf(bytes),
        _ => Err(ExtractError::UnsupportedContentType(
            content_type.to_string(),
        )),
    }
}

/// Parse CSV bytes into an array of row objects.
///
/// The first row is the header. Cells past the header width are keyed
/// `_<index>`; short rows simply omit the missing keys. Blank lines are
/// skipped and every value stays a string.
pub fn parse_csv(bytes: &[u8]) -> Result<Value, ExtractError> {
    let text = String::from_utf8_lossy(bytes);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut headers: Option<Vec<String>> = None;
    let mut rows = Vec::new();

    for result in reader.records() {
        let record = result?;
        if is_blank(&record) {
            continue;
        }

        let Some(keys) = &headers else {
            headers = Some(record.iter().map(|h| h.to_string()).collect());
            continue;
        };

        let mut row = Map::new();
        for (i, cell) in record.iter().enumerate() {
            let key = match keys.get(i) {
                Some(k) => k.clone(),
                None => format!("_{}", i),
            };
            row.insert(key, Value::String(cell.to_string()));
        }
        rows.push(Value::Object(row));
    }

    Ok(Value::Array(rows))
}

fn is_blank(record: &csv::StringRecord) -> bool {
    record.len() == 0 || (record.len() == 1 && record[0].trim().is_empty())
}

fn extract_pdf(bytes: &[u8]) -> Result<Value, ExtractError> {
    let text =
        pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))?;
    Ok(serde_json::json!({ "text": text }))
}
