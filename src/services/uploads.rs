//! Upload dispatch: CSV exports and PDF invoices become stored documents.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{info, instrument, warn};

use super::csv_import::parse_csv;
use super::invoice_ai::{InvoiceInterpreter, StructuredInvoice};
use super::pdf_extraction::{extract_invoice_info, extract_pdf};
use super::storage::{CsvDocument, FileStore, PdfDocument, ProcessedFile};
use crate::errors::ServiceError;
use crate::metrics::INGEST_METRICS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    Csv,
    Pdf,
}

impl UploadKind {
    pub fn as_str(self) -> &'static str {
        match self {
            UploadKind::Csv => "csv",
            UploadKind::Pdf => "pdf",
        }
    }
}

/// Lower-cased text after the last `.` (the whole name when there is none).
pub fn file_extension(file_name: &str) -> String {
    file_name
        .rsplit('.')
        .next()
        .unwrap_or(file_name)
        .to_lowercase()
}

/// Resolves the upload kind from the client-supplied file name.
pub fn classify(file_name: Option<&str>) -> Result<UploadKind, ServiceError> {
    let name = file_name
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| ServiceError::BadRequest("No filename provided".to_string()))?;

    match file_extension(name).as_str() {
        "csv" => Ok(UploadKind::Csv),
        "pdf" => Ok(UploadKind::Pdf),
        other => Err(ServiceError::BadRequest(format!(
            "Unsupported file type: {}. Only CSV and PDF files are supported.",
            other
        ))),
    }
}

#[derive(Clone)]
pub struct UploadService {
    store: FileStore,
    interpreter: Option<Arc<dyn InvoiceInterpreter>>,
}

impl UploadService {
    pub fn new(store: FileStore, interpreter: Option<Arc<dyn InvoiceInterpreter>>) -> Self {
        Self { store, interpreter }
    }

    /// Processes and stores one upload, returning the stored document.
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub async fn process_file(
        &self,
        file_name: Option<&str>,
        bytes: Vec<u8>,
    ) -> Result<ProcessedFile, ServiceError> {
        let kind = classify(file_name).map_err(|e| {
            INGEST_METRICS.record_rejected_upload();
            e
        })?;
        // classify() guarantees a name
        let file_name = file_name.unwrap_or_default().trim().to_string();

        let started = Instant::now();
        let result = match kind {
            UploadKind::Csv => self.process_csv(file_name, bytes).await,
            UploadKind::Pdf => self.process_pdf(file_name, bytes).await,
        };

        let document = match result {
            Ok(document) => document,
            Err(error) => {
                INGEST_METRICS.record_upload_failure(kind.as_str());
                return Err(error);
            }
        };

        let path = self.store.save(&document).await.map_err(|e| {
            INGEST_METRICS.record_upload_failure(kind.as_str());
            ServiceError::from(e)
        })?;
        INGEST_METRICS.record_upload(kind.as_str(), started.elapsed());
        info!(
            file_type = kind.as_str(),
            records = document.records(),
            path = %path.display(),
            "upload processed"
        );
        Ok(document)
    }

    async fn process_csv(
        &self,
        file_name: String,
        bytes: Vec<u8>,
    ) -> Result<ProcessedFile, ServiceError> {
        let parsed = tokio::task::spawn_blocking(move || parse_csv(&bytes))
            .await
            .map_err(|e| {
                ServiceError::InternalError(format!("CSV parsing task failed: {}", e))
            })??;
        Ok(ProcessedFile::Csv(CsvDocument {
            file_name,
            processed_at: Utc::now(),
            total_records: parsed.rows.len(),
            columns: parsed.columns,
            data: parsed.rows,
        }))
    }

    async fn process_pdf(
        &self,
        file_name: String,
        bytes: Vec<u8>,
    ) -> Result<ProcessedFile, ServiceError> {
        let content = tokio::task::spawn_blocking(move || extract_pdf(&bytes))
            .await
            .map_err(|e| ServiceError::InternalError(format!("PDF extraction task failed: {}", e)))??;

        let invoice_info = extract_invoice_info(&content.text_content);
        let structured_invoice = self.interpret(&content.text_content).await;

        Ok(ProcessedFile::Pdf(PdfDocument {
            file_name,
            processed_at: Utc::now(),
            page_count: content.pages.len(),
            invoice_info,
            raw_data: content,
            structured_invoice,
        }))
    }

    /// Runs the optional AI pass. Failures are logged and yield `None`.
    async fn interpret(&self, text: &str) -> Option<StructuredInvoice> {
        let Some(interpreter) = &self.interpreter else {
            INGEST_METRICS.record_ai_disabled();
            return None;
        };
        match interpreter.interpret(text).await {
            Ok(invoice) => {
                INGEST_METRICS.record_ai_outcome(true);
                Some(invoice)
            }
            Err(error) => {
                INGEST_METRICS.record_ai_outcome(false);
                warn!(%error, "storing PDF without structured invoice");
                None
            }
        }
    }
}
