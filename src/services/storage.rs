//! Flat JSON document store for processed uploads.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use super::csv_import::CsvRow;
use super::invoice_ai::StructuredInvoice;
use super::pdf_extraction::{InvoiceInfo, PdfContent};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize document: {0}")]
    Serialize(#[from] serde_json::Error),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StorageError + '_ {
    move |source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CsvDocument {
    pub file_name: String,
    pub processed_at: DateTime<Utc>,
    pub total_records: usize,
    pub columns: Vec<String>,
    pub data: Vec<CsvRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PdfDocument {
    pub file_name: String,
    pub processed_at: DateTime<Utc>,
    pub page_count: usize,
    pub invoice_info: InvoiceInfo,
    pub raw_data: PdfContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_invoice: Option<StructuredInvoice>,
}

/// A stored upload, tagged by `file_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "file_type", rename_all = "lowercase")]
pub enum ProcessedFile {
    Csv(CsvDocument),
    Pdf(PdfDocument),
}

impl ProcessedFile {
    pub fn file_type(&self) -> &'static str {
        match self {
            ProcessedFile::Csv(_) => "csv",
            ProcessedFile::Pdf(_) => "pdf",
        }
    }

    pub fn file_name(&self) -> &str {
        match self {
            ProcessedFile::Csv(doc) => &doc.file_name,
            ProcessedFile::Pdf(doc) => &doc.file_name,
        }
    }

    pub fn processed_at(&self) -> DateTime<Utc> {
        match self {
            ProcessedFile::Csv(doc) => doc.processed_at,
            ProcessedFile::Pdf(doc) => doc.processed_at,
        }
    }

    /// Row count for CSV documents, page count for PDFs.
    pub fn records(&self) -> usize {
        match self {
            ProcessedFile::Csv(doc) => doc.total_records,
            ProcessedFile::Pdf(doc) => doc.page_count,
        }
    }
}

/// Stores each processed upload as one pretty-printed JSON file.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Opens the store, creating the directory if needed.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(io_error(&dir))?;
        info!(dir = %dir.display(), "file store ready");
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_name_for(document: &ProcessedFile) -> String {
        let suffix = Uuid::new_v4().simple().to_string();
        format!(
            "{}_{}_{}.json",
            document.file_type(),
            document.processed_at().format("%Y%m%d_%H%M%S"),
            &suffix[..8]
        )
    }

    pub async fn save(&self, document: &ProcessedFile) -> Result<PathBuf, StorageError> {
        let path = self.dir.join(Self::file_name_for(document));
        let json = serde_json::to_vec_pretty(document)?;
        tokio::fs::write(&path, json)
            .await
            .map_err(io_error(&path))?;
        debug!(path = %path.display(), "stored processed file");
        Ok(path)
    }

    /// Every stored document, newest first. Unreadable files are skipped.
    pub async fn list_all(&self) -> Result<Vec<ProcessedFile>, StorageError> {
        let mut documents = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(documents),
            Err(e) => return Err(io_error(&self.dir)(e)),
        };

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(io_error(&self.dir))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(error) => {
                    warn!(path = %path.display(), %error, "skipping unreadable stored file");
                    continue;
                }
            };
            match serde_json::from_slice::<ProcessedFile>(&bytes) {
                Ok(document) => documents.push(document),
                Err(error) => {
                    warn!(path = %path.display(), %error, "skipping invalid stored file");
                }
            }
        }

        documents.sort_by(|a, b| b.processed_at().cmp(&a.processed_at()));
        Ok(documents)
    }

    /// Writes and removes a probe file.
    pub async fn check_writable(&self) -> Result<(), StorageError> {
        let probe = self.dir.join(format!(".probe_{}", Uuid::new_v4().simple()));
        tokio::fs::write(&probe, b"ok")
            .await
            .map_err(io_error(&probe))?;
        tokio::fs::remove_file(&probe)
            .await
            .map_err(io_error(&probe))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn csv_doc(name: &str, hour: u32) -> ProcessedFile {
        ProcessedFile::Csv(CsvDocument {
            file_name: name.to_string(),
            processed_at: Utc.with_ymd_and_hms(2024, 3, 1, hour, 0, 0).unwrap(),
            total_records: 1,
            columns: vec!["item_name".into()],
            data: vec![CsvRow::from([("item_name".to_string(), Some("Lager".to_string()))])],
        })
    }

    fn pdf_doc(name: &str, hour: u32) -> ProcessedFile {
        ProcessedFile::Pdf(PdfDocument {
            file_name: name.to_string(),
            processed_at: Utc.with_ymd_and_hms(2024, 3, 1, hour, 0, 0).unwrap(),
            page_count: 2,
            invoice_info: InvoiceInfo::default(),
            raw_data: PdfContent::default(),
            structured_invoice: None,
        })
    }

    #[test]
    fn documents_are_tagged_by_file_type() {
        let value = serde_json::to_value(csv_doc("pos.csv", 9)).unwrap();
        assert_eq!(value["file_type"], "csv");
        assert_eq!(value["total_records"], 1);

        let value = serde_json::to_value(pdf_doc("inv.pdf", 9)).unwrap();
        assert_eq!(value["file_type"], "pdf");
        assert!(value.get("structured_invoice").is_none());
    }

    #[tokio::test]
    async fn saves_with_typed_timestamped_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();

        let path = store.save(&csv_doc("pos.csv", 9)).await.unwrap();
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("csv_20240301_090000_"), "{name}");
        assert!(name.ends_with(".json"));
        assert_eq!(name.len(), "csv_20240301_090000_".len() + 8 + ".json".len());
    }

    #[tokio::test]
    async fn same_second_saves_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();
        let a = store.save(&csv_doc("a.csv", 9)).await.unwrap();
        let b = store.save(&csv_doc("b.csv", 9)).await.unwrap();
        assert_ne!(a, b);
        assert_eq!(store.list_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn lists_newest_first_and_skips_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("uploads")).await.unwrap();

        store.save(&csv_doc("early.csv", 8)).await.unwrap();
        store.save(&pdf_doc("late.pdf", 18)).await.unwrap();
        store.save(&csv_doc("noon.csv", 12)).await.unwrap();
        std::fs::write(store.dir().join("broken.json"), b"{not json").unwrap();
        std::fs::write(store.dir().join("notes.txt"), b"ignored").unwrap();

        let files = store.list_all().await.unwrap();
        let names: Vec<&str> = files.iter().map(ProcessedFile::file_name).collect();
        assert_eq!(names, vec!["late.pdf", "noon.csv", "early.csv"]);
        assert_eq!(files[0].records(), 2);
    }

    #[tokio::test]
    async fn writable_check_leaves_no_probe() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();
        store.check_writable().await.unwrap();
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
