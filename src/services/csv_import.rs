//! Decoding of uploaded CSV exports into generic rows.

use std::borrow::Cow;
use std::collections::BTreeMap;

use thiserror::Error;
use tracing::debug;

/// One data row keyed by column header. Empty cells are `None`.
pub type CsvRow = BTreeMap<String, Option<String>>;

#[derive(Debug, Error)]
pub enum CsvImportError {
    #[error("{0}")]
    Csv(#[from] csv::Error),

    #[error("file has no header row")]
    Empty,
}

/// Header and rows of a parsed CSV file.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCsv {
    pub columns: Vec<String>,
    pub rows: Vec<CsvRow>,
}

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Decodes bytes as UTF-8, falling back to Latin-1 which maps every byte.
pub fn decode_text(bytes: &[u8]) -> Cow<'_, str> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(text) => Cow::Borrowed(text),
        Err(_) => {
            debug!("CSV is not valid UTF-8, decoding as Latin-1");
            Cow::Owned(bytes.iter().map(|&b| char::from(b)).collect())
        }
    }
}

fn cell(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Parses a CSV export. The first record is the header.
pub fn parse_csv(bytes: &[u8]) -> Result<ParsedCsv, CsvImportError> {
    let text = decode_text(bytes);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(text.as_bytes());

    let columns: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    if columns.iter().all(String::is_empty) {
        return Err(CsvImportError::Empty);
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let row: CsvRow = columns
            .iter()
            .cloned()
            .zip(record.iter().map(cell))
            .collect();
        rows.push(row);
    }

    debug!(columns = columns.len(), rows = rows.len(), "parsed CSV");
    Ok(ParsedCsv { columns, rows })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn parses_header_and_rows() {
        let parsed = parse_csv(b"item_name,quantity,area\nLager,2,Bar\nFries, 1 ,\n").unwrap();
        assert_eq!(parsed.columns, vec!["item_name", "quantity", "area"]);
        assert_eq!(parsed.rows.len(), 2);
        assert_eq!(parsed.rows[0]["item_name"].as_deref(), Some("Lager"));
        assert_eq!(parsed.rows[1]["quantity"].as_deref(), Some("1"));
        assert_eq!(parsed.rows[1]["area"], None);
    }

    #[test]
    fn strips_utf8_bom() {
        let mut bytes = UTF8_BOM.to_vec();
        bytes.extend_from_slice(b"receipt_id\nR1\n");
        let parsed = parse_csv(&bytes).unwrap();
        assert_eq!(parsed.columns, vec!["receipt_id"]);
    }

    #[test]
    fn falls_back_to_latin1() {
        // "Café" with 0xE9 is not valid UTF-8
        let parsed = parse_csv(b"item_name\nCaf\xe9\n").unwrap();
        assert_eq!(parsed.rows[0]["item_name"].as_deref(), Some("Café"));
    }

    #[test]
    fn header_only_file_has_no_rows() {
        let parsed = parse_csv(b"a,b\n").unwrap();
        assert!(parsed.rows.is_empty());
        assert_eq!(parsed.columns.len(), 2);
    }

    #[test]
    fn empty_file_is_rejected() {
        assert_matches!(parse_csv(b""), Err(CsvImportError::Empty));
    }

    #[test]
    fn ragged_rows_are_rejected() {
        assert_matches!(parse_csv(b"a,b\n1,2,3\n"), Err(CsvImportError::Csv(_)));
    }
}
