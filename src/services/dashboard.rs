use std::collections::{BTreeMap, HashMap};

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};
use utoipa::ToSchema;

use super::kpi::kpi_pos_only;
use super::pos_records::{pos_lines_from_rows, Conversion};
use super::storage::{FileStore, ProcessedFile};
use crate::errors::ServiceError;
use crate::metrics::INGEST_METRICS;
use crate::models::{Area, PaymentMethod, PosLine};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct FileTypeCounts {
    pub csv: usize,
    pub pdf: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct FileStatistics {
    pub total_csv_records: usize,
    pub total_invoices: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RecentFile {
    pub file_name: String,
    pub file_type: String,
    pub processed_at: String,
    /// Row count for CSV, page count for PDF
    pub records: usize,
}

/// Dashboard summary. KPI amounts are plain JSON numbers for the front end.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DashboardSummary {
    pub total_files: usize,
    pub file_types: FileTypeCounts,
    pub recent_files: Vec<RecentFile>,
    pub statistics: FileStatistics,
    pub revenue_total: f64,
    pub revenue_by_area: BTreeMap<Area, f64>,
    pub revenue_by_payment: BTreeMap<PaymentMethod, f64>,
    pub receipt_count: usize,
    pub average_receipt: f64,
    pub discount_rate: Option<f64>,
    /// CSV rows that could not be read as POS lines
    pub skipped_records: usize,
}

fn as_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

/// Builds the dashboard summary from stored documents (newest first).
pub fn summarize(
    files: &[ProcessedFile],
    price_list: Option<&HashMap<String, Decimal>>,
    recent_limit: usize,
) -> DashboardSummary {
    let mut summary = DashboardSummary {
        total_files: files.len(),
        ..DashboardSummary::default()
    };
    let mut pos: Conversion<PosLine> = Conversion::default();
    let mut running_total = Decimal::ZERO;

    for file in files {
        match file {
            ProcessedFile::Csv(doc) => {
                summary.file_types.csv += 1;
                summary.statistics.total_csv_records += doc.total_records;
                let converted = pos_lines_from_rows(&doc.data);
                pos.skipped += converted.skipped;
                for line in converted.records {
                    match running_total.checked_add(line.total_price) {
                        Some(total) => {
                            running_total = total;
                            pos.records.push(line);
                        }
                        None => {
                            warn!(
                                file = %doc.file_name,
                                receipt = %line.receipt_id,
                                "skipping POS row: revenue total out of range"
                            );
                            pos.skipped += 1;
                        }
                    }
                }
            }
            ProcessedFile::Pdf(_) => summary.file_types.pdf += 1,
        }
    }
    summary.statistics.total_invoices = summary.file_types.pdf;
    summary.skipped_records = pos.skipped;

    let kpis = if pos.records.is_empty() {
        None
    } else {
        kpi_pos_only(&pos.records, price_list)
            .map_err(|error| warn!(%error, "POS KPIs left empty"))
            .ok()
    };
    if let Some(kpis) = kpis {
        summary.revenue_total = as_f64(kpis.revenue_total);
        summary.revenue_by_area = kpis
            .revenue_by_area
            .into_iter()
            .map(|(k, v)| (k, as_f64(v)))
            .collect();
        summary.revenue_by_payment = kpis
            .revenue_by_payment
            .into_iter()
            .map(|(k, v)| (k, as_f64(v)))
            .collect();
        summary.receipt_count = kpis.receipt_count;
        summary.average_receipt = as_f64(kpis.average_receipt);
        summary.discount_rate = kpis.discount_rate.map(as_f64);
    }

    summary.recent_files = files
        .iter()
        .take(recent_limit)
        .map(|f| RecentFile {
            file_name: f.file_name().to_string(),
            file_type: f.file_type().to_string(),
            processed_at: f.processed_at().to_rfc3339(),
            records: f.records(),
        })
        .collect();

    summary
}

#[derive(Clone)]
pub struct DashboardService {
    store: FileStore,
    price_list: Option<HashMap<String, Decimal>>,
    recent_limit: usize,
}

impl DashboardService {
    pub fn new(
        store: FileStore,
        price_list: Option<HashMap<String, Decimal>>,
        recent_limit: usize,
    ) -> Self {
        Self {
            store,
            price_list,
            recent_limit,
        }
    }

    pub async fn all_files(&self) -> Result<Vec<ProcessedFile>, ServiceError> {
        Ok(self.store.list_all().await?)
    }

    /// Summary plus every stored document, read in one pass.
    #[instrument(skip(self))]
    pub async fn overview(&self) -> Result<(DashboardSummary, Vec<ProcessedFile>), ServiceError> {
        let files = self.all_files().await?;
        let summary = summarize(&files, self.price_list.as_ref(), self.recent_limit);
        if summary.skipped_records > 0 {
            INGEST_METRICS.record_skipped_rows(summary.skipped_records);
        }
        debug!(
            files = summary.total_files,
            skipped = summary.skipped_records,
            "computed dashboard summary"
        );
        Ok((summary, files))
    }
}
