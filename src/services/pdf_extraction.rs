//! Text extraction from uploaded PDF invoices.

use std::collections::BTreeMap;

use lopdf::{Document, Object};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use utoipa::ToSchema;

#[derive(Debug, Error)]
pub enum PdfExtractionError {
    #[error("{0}")]
    Load(#[from] lopdf::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PageText {
    pub page_number: u32,
    pub text: String,
}

/// Raw text and document metadata of a PDF.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, ToSchema)]
pub struct PdfContent {
    pub pages: Vec<PageText>,
    /// Every page's text followed by a newline.
    pub text_content: String,
    pub metadata: BTreeMap<String, String>,
}

/// Invoice fields recognised in the extracted text.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, ToSchema)]
pub struct InvoiceInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoice_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
}

static INVOICE_NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)(?:invoice|factur[ae]?|rechnung)\s*#?\s*:?\s*([A-Z0-9\-]+)")
        .expect("valid invoice number regex")
});

static INVOICE_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)(?:date|datum|fecha)\s*:?\s*(\d{1,2}[/\-.]\d{1,2}[/\-.]\d{2,4})")
        .expect("valid date regex")
});

static INVOICE_TOTAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)(?:total|gesamt|summe|montant)\s*:?\s*([€$£]?\s*\d+[,.]?\d*)")
        .expect("valid total regex")
});

static COMPANY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)(?:^|\n)([A-Z][A-Za-z\s&.,]+(?:GmbH|Ltd|Inc|Corp|SA|SL))")
        .expect("valid company regex")
});

fn first_capture(pattern: &Regex, text: &str) -> Option<String> {
    pattern
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

pub fn extract_invoice_info(text: &str) -> InvoiceInfo {
    InvoiceInfo {
        invoice_number: first_capture(&INVOICE_NUMBER, text),
        date: first_capture(&INVOICE_DATE, text),
        total: first_capture(&INVOICE_TOTAL, text),
        company: first_capture(&COMPANY, text),
    }
}

/// Decodes a PDF text string: UTF-16BE with BOM, otherwise byte-per-char.
fn decode_pdf_string(bytes: &[u8]) -> String {
    match bytes.strip_prefix(&[0xFE, 0xFF]) {
        Some(utf16) => {
            let units: Vec<u16> = utf16
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            String::from_utf16_lossy(&units)
        }
        None => bytes.iter().map(|&b| char::from(b)).collect(),
    }
}

/// `CreationDate` -> `creationDate`
fn metadata_key(raw: &[u8]) -> String {
    let key = String::from_utf8_lossy(raw);
    let mut chars = key.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn document_metadata(doc: &Document) -> BTreeMap<String, String> {
    let mut metadata = BTreeMap::new();
    metadata.insert("format".to_string(), format!("PDF {}", doc.version));

    let info = match doc.trailer.get(b"Info") {
        Ok(Object::Reference(id)) => doc.get_dictionary(*id).ok(),
        Ok(Object::Dictionary(dict)) => Some(dict),
        _ => None,
    };
    if let Some(info) = info {
        for (key, value) in info.iter() {
            if let Object::String(bytes, _) = value {
                let text = decode_pdf_string(bytes);
                if !text.trim().is_empty() {
                    metadata.insert(metadata_key(key), text);
                }
            }
        }
    }
    metadata
}

/// Loads a PDF from memory and extracts per-page text and metadata.
pub fn extract_pdf(bytes: &[u8]) -> Result<PdfContent, PdfExtractionError> {
    let doc = Document::load_mem(bytes)?;
    let mut content = PdfContent {
        metadata: document_metadata(&doc),
        ..PdfContent::default()
    };

    for &page_number in doc.get_pages().keys() {
        let text = doc.extract_text(&[page_number]).unwrap_or_else(|error| {
            warn!(page = page_number, %error, "could not extract page text");
            String::new()
        });
        content.text_content.push_str(&text);
        content.text_content.push('\n');
        content.pages.push(PageText { page_number, text });
    }

    debug!(pages = content.pages.len(), "extracted PDF text");
    Ok(content)
}


#[cfg(test)]
mod tests {
    use super::test_support::build_pdf;
    use super::*;

    #[test]
    fn invoice_fields_from_english_text() {
        let text = "ACME Supplies GmbH\nInvoice #: INV-2024-001\nDate: 12/03/2024\nTotal: €1234.50\n";
        let info = extract_invoice_info(text);
        assert_eq!(info.invoice_number.as_deref(), Some("INV-2024-001"));
        assert_eq!(info.date.as_deref(), Some("12/03/2024"));
        assert_eq!(info.total.as_deref(), Some("€1234.50"));
        assert_eq!(info.company.as_deref(), Some("ACME Supplies GmbH"));
    }

    #[test]
    fn invoice_fields_from_german_text() {
        let text = "Rechnung: R-77\nDatum: 01.02.24\nSumme 89,90\n";
        let info = extract_invoice_info(text);
        assert_eq!(info.invoice_number.as_deref(), Some("R-77"));
        assert_eq!(info.date.as_deref(), Some("01.02.24"));
        assert_eq!(info.total.as_deref(), Some("89,90"));
        assert_eq!(info.company, None);
    }

    #[test]
    fn missing_fields_are_omitted_from_json() {
        let info = extract_invoice_info("nothing to see here");
        assert_eq!(info, InvoiceInfo::default());
        assert_eq!(serde_json::to_value(&info).unwrap(), serde_json::json!({}));
    }

    #[test]
    fn pdf_metadata_keys() {
        assert_eq!(metadata_key(b"CreationDate"), "creationDate");
        assert_eq!(decode_pdf_string(&[0xFE, 0xFF, 0x00, 0x41, 0x00, 0xDF]), "Aß");
        assert_eq!(decode_pdf_string(b"plain"), "plain");
    }

    #[test]
    fn extracts_pages_and_metadata() {
        let bytes = build_pdf(&[
            &["ACME Supplies GmbH", "Invoice #: INV-2024-001"],
            &["Total: 1234.50"],
        ]);
        let content = extract_pdf(&bytes).unwrap();

        assert_eq!(content.pages.len(), 2);
        assert_eq!(content.pages[0].page_number, 1);
        assert_eq!(content.pages[1].page_number, 2);
        assert!(content.pages[0].text.contains("INV-2024-001"));
        assert!(content.pages[1].text.contains("1234.50"));
        assert!(content.text_content.ends_with('\n'));
        assert_eq!(
            content.metadata.get("title").map(String::as_str),
            Some("Supplier invoice")
        );
        assert_eq!(
            content.metadata.get("format").map(String::as_str),
            Some("PDF 1.5")
        );

        let info = extract_invoice_info(&content.text_content);
        assert_eq!(info.invoice_number.as_deref(), Some("INV-2024-001"));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(extract_pdf(b"not a pdf at all").is_err());
    }
}
