// Core KPI arithmetic
pub mod kpi;
pub mod reports;

// Ingestion
pub mod csv_import;
pub mod invoice_ai;
pub mod pdf_extraction;
pub mod pos_records;

// Persistence and upload flow
pub mod dashboard;
pub mod storage;
pub mod uploads;
