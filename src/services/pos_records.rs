//! Conversion of generic CSV rows into typed records.

use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::warn;
use validator::Validate;

use super::csv_import::{parse_csv, CsvImportError, CsvRow};
use crate::models::{PosLine, PriceListItem};

/// Why a single row could not become a record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RowError {
    #[error("missing field `{0}`")]
    Missing(&'static str),

    #[error("invalid value for `{field}`: {value}")]
    Invalid { field: &'static str, value: String },

    #[error("validation failed: {0}")]
    Validation(String),
}

/// Records converted from a batch of rows plus the number of rows skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct Conversion<T> {
    pub records: Vec<T>,
    pub skipped: usize,
}

impl<T> Default for Conversion<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            skipped: 0,
        }
    }
}

#[derive(Debug, Error)]
pub enum PriceListError {
    #[error("failed to read price list: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid price list CSV: {0}")]
    Csv(#[from] CsvImportError),

    #[error("invalid price list JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid price list entry: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("{0} invalid price list row(s)")]
    InvalidRows(usize),
}

fn field<'a>(row: &'a CsvRow, name: &'static str) -> Result<&'a str, RowError> {
    row.get(name)
        .and_then(|v| v.as_deref())
        .ok_or(RowError::Missing(name))
}

fn invalid(field: &'static str, value: &str) -> RowError {
    RowError::Invalid {
        field,
        value: value.to_string(),
    }
}

fn parse_enum<T: FromStr>(row: &CsvRow, name: &'static str) -> Result<T, RowError> {
    let raw = field(row, name)?;
    raw.parse().map_err(|_| invalid(name, raw))
}

fn parse_decimal(row: &CsvRow, name: &'static str) -> Result<Decimal, RowError> {
    let raw = field(row, name)?;
    Decimal::from_str(raw).map_err(|_| invalid(name, raw))
}

/// Accepts `YYYY-MM-DD HH:MM:SS[.f]`, the ISO `T` form, or a bare date.
/// A trailing UTC offset (`Z`, `+01:00`, `+0100`) is dropped and the local
/// wall-clock time kept.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let normalized = raw.trim().replacen(' ', "T", 1);
    DateTime::parse_from_rfc3339(&normalized)
        .or_else(|_| DateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M:%S%.f%z"))
        .or_else(|_| DateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M%z"))
        .map(|dt| dt.naive_local())
        .or_else(|_| NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M:%S%.f"))
        .or_else(|_| NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Accepts integer text and integral decimals such as `2.0`.
fn parse_quantity(row: &CsvRow) -> Result<u32, RowError> {
    let raw = field(row, "quantity")?;
    if let Ok(q) = raw.parse::<u32>() {
        return Ok(q);
    }
    let value = Decimal::from_str(raw).map_err(|_| invalid("quantity", raw))?;
    if !value.fract().is_zero() {
        return Err(invalid("quantity", raw));
    }
    value.to_u32().ok_or_else(|| invalid("quantity", raw))
}

pub fn pos_line_from_row(row: &CsvRow) -> Result<PosLine, RowError> {
    let raw_ts = field(row, "timestamp")?;
    let line = PosLine {
        timestamp: parse_timestamp(raw_ts).ok_or_else(|| invalid("timestamp", raw_ts))?,
        item_type: parse_enum(row, "item_type")?,
        item_name: field(row, "item_name")?.to_string(),
        quantity: parse_quantity(row)?,
        price_per_item: parse_decimal(row, "price_per_item")?,
        total_price: parse_decimal(row, "total_price")?,
        payment_method: parse_enum(row, "payment_method")?,
        area: parse_enum(row, "area")?,
        receipt_id: field(row, "receipt_id")?.to_string(),
    };
    line.validate()
        .map_err(|e| RowError::Validation(e.to_string()))?;
    Ok(line)
}

pub fn price_list_item_from_row(row: &CsvRow) -> Result<PriceListItem, RowError> {
    let item = PriceListItem {
        item_name: field(row, "item_name")?.to_string(),
        theoretical_price: parse_decimal(row, "theoretical_price")?,
    };
    item.validate()
        .map_err(|e| RowError::Validation(e.to_string()))?;
    Ok(item)
}

fn convert_rows<'a, T>(
    rows: impl IntoIterator<Item = &'a CsvRow>,
    kind: &str,
    convert: impl Fn(&CsvRow) -> Result<T, RowError>,
) -> Conversion<T> {
    let mut out = Conversion::default();
    for (index, row) in rows.into_iter().enumerate() {
        match convert(row) {
            Ok(record) => out.records.push(record),
            Err(error) => {
                warn!(row = index, %error, "skipping invalid {} row", kind);
                out.skipped += 1;
            }
        }
    }
    out
}

pub fn pos_lines_from_rows<'a>(rows: impl IntoIterator<Item = &'a CsvRow>) -> Conversion<PosLine> {
    convert_rows(rows, "POS", pos_line_from_row)
}

pub fn price_list_from_rows<'a>(
    rows: impl IntoIterator<Item = &'a CsvRow>,
) -> Conversion<PriceListItem> {
    convert_rows(rows, "price list", price_list_item_from_row)
}

/// Loads a price list from a `.json` array of items or a CSV file with
/// `item_name` and `theoretical_price` columns. Any invalid entry fails the
/// whole load in both formats.
pub fn load_price_list_file(path: &Path) -> Result<Vec<PriceListItem>, PriceListError> {
    let bytes = std::fs::read(path)?;
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    if is_json {
        let items: Vec<PriceListItem> = serde_json::from_slice(&bytes)?;
        for item in &items {
            item.validate()?;
        }
        Ok(items)
    } else {
        let parsed = parse_csv(&bytes)?;
        let converted = price_list_from_rows(&parsed.rows);
        if converted.skipped > 0 {
            return Err(PriceListError::InvalidRows(converted.skipped));
        }
        Ok(converted.records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Area, ItemType, PaymentMethod};
    use rust_decimal_macros::dec;
    use std::io::Write;

    fn row(pairs: &[(&str, &str)]) -> CsvRow {
        pairs
            .iter()
            .map(|(k, v)| {
                let v = (!v.is_empty()).then(|| v.to_string());
                (k.to_string(), v)
            })
            .collect()
    }

    fn pos_row() -> CsvRow {
        row(&[
            ("timestamp", "2024-03-01 19:30:00"),
            ("item_type", "BEV"),
            ("item_name", "Lager"),
            ("quantity", "3"),
            ("price_per_item", "4.50"),
            ("total_price", "13.50"),
            ("payment_method", "CASH"),
            ("area", "Bar"),
            ("receipt_id", "R-2"),
        ])
    }

    #[test]
    fn converts_complete_row() {
        let line = pos_line_from_row(&pos_row()).unwrap();
        assert_eq!(line.item_type, ItemType::Bev);
        assert_eq!(line.payment_method, PaymentMethod::Cash);
        assert_eq!(line.area, Area::Bar);
        assert_eq!(line.quantity, 3);
        assert_eq!(line.total_price, dec!(13.50));
        assert_eq!(line.timestamp.to_string(), "2024-03-01 19:30:00");
    }

    #[test]
    fn timestamp_formats() {
        assert!(parse_timestamp("2024-03-01T19:30:00").is_some());
        assert!(parse_timestamp("2024-03-01 19:30:00.250").is_some());
        assert!(parse_timestamp("2024-03-01 19:30").is_some());
        assert_eq!(
            parse_timestamp("2024-03-01").map(|t| t.to_string()),
            Some("2024-03-01 00:00:00".to_string())
        );
        assert!(parse_timestamp("01/03/2024").is_none());
    }

    #[test]
    fn timestamps_with_offsets_keep_local_time() {
        let expected = Some("2024-03-01 19:30:00".to_string());
        for raw in [
            "2024-03-01T19:30:00+01:00",
            "2024-03-01T19:30:00Z",
            "2024-03-01 19:30:00+00:00",
            "2024-03-01T19:30:00-0500",
            "2024-03-01 19:30+02:00",
        ] {
            assert_eq!(parse_timestamp(raw).map(|t| t.to_string()), expected, "{}", raw);
        }
        assert_eq!(
            parse_timestamp("2024-03-01T19:30:00.500+01:00").map(|t| t.to_string()),
            Some("2024-03-01 19:30:00.500".to_string())
        );

        let mut r = pos_row();
        r.insert("timestamp".into(), Some("2024-03-01T19:30:00+01:00".into()));
        assert_eq!(
            pos_line_from_row(&r).unwrap().timestamp.to_string(),
            "2024-03-01 19:30:00"
        );
    }

    #[test]
    fn quantity_accepts_integral_decimals() {
        let mut r = pos_row();
        r.insert("quantity".into(), Some("2.0".into()));
        assert_eq!(pos_line_from_row(&r).unwrap().quantity, 2);

        r.insert("quantity".into(), Some("2.5".into()));
        assert!(matches!(
            pos_line_from_row(&r),
            Err(RowError::Invalid { field: "quantity", .. })
        ));
    }

    #[test]
    fn zero_quantity_fails_validation() {
        let mut r = pos_row();
        r.insert("quantity".into(), Some("0".into()));
        assert!(matches!(pos_line_from_row(&r), Err(RowError::Validation(_))));
    }

    #[test]
    fn missing_and_unknown_values() {
        let mut r = pos_row();
        r.insert("receipt_id".into(), None);
        assert_eq!(pos_line_from_row(&r), Err(RowError::Missing("receipt_id")));

        let mut r = pos_row();
        r.insert("area".into(), Some("Kitchen".into()));
        assert!(matches!(
            pos_line_from_row(&r),
            Err(RowError::Invalid { field: "area", .. })
        ));
    }

    #[test]
    fn batch_conversion_counts_skips() {
        let mut bad = pos_row();
        bad.remove("timestamp");
        let rows = vec![pos_row(), bad, pos_row()];
        let converted = pos_lines_from_rows(&rows);
        assert_eq!(converted.records.len(), 2);
        assert_eq!(converted.skipped, 1);
    }

    #[test]
    fn price_list_rows() {
        let rows = vec![
            row(&[("item_name", "Lager"), ("theoretical_price", "4.50")]),
            row(&[("item_name", "Fries"), ("theoretical_price", "abc")]),
        ];
        let converted = price_list_from_rows(&rows);
        assert_eq!(converted.records.len(), 1);
        assert_eq!(converted.records[0].theoretical_price, dec!(4.50));
        assert_eq!(converted.skipped, 1);
    }

    #[test]
    fn loads_price_list_files() {
        let dir = tempfile::tempdir().unwrap();

        let csv_path = dir.path().join("prices.csv");
        let mut f = std::fs::File::create(&csv_path).unwrap();
        writeln!(f, "item_name,theoretical_price\nBurger,12.50\nLager,4.50").unwrap();
        let items = load_price_list_file(&csv_path).unwrap();
        assert_eq!(items.len(), 2);

        let json_path = dir.path().join("prices.json");
        std::fs::write(
            &json_path,
            r#"[{"item_name": "Burger", "theoretical_price": "12.50"}]"#,
        )
        .unwrap();
        let items = load_price_list_file(&json_path).unwrap();
        assert_eq!(items[0].theoretical_price, dec!(12.50));

        let bad_path = dir.path().join("bad.json");
        std::fs::write(&bad_path, r#"[{"item_name": "", "theoretical_price": "1"}]"#).unwrap();
        assert!(matches!(
            load_price_list_file(&bad_path),
            Err(PriceListError::Validation(_))
        ));

        let bad_csv = dir.path().join("bad.csv");
        std::fs::write(
            &bad_csv,
            "item_name,theoretical_price\nBurger,12.50\nFries,abc\n,1.00\n",
        )
        .unwrap();
        assert!(matches!(
            load_price_list_file(&bad_csv),
            Err(PriceListError::InvalidRows(2))
        ));
    }
}
