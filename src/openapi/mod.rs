use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Oreka Backend",
        version = "1.0.0",
        description = r#"
# Oreka Backend API

Ingests restaurant point-of-sale exports (CSV) and supplier invoices (PDF),
stores every processed upload as a JSON document, and computes financial
KPIs over them.

## Uploads

`POST /upload` takes a multipart form with a single `file` field. CSV files
are stored row by row; PDF files are stored with their page text, regex
invoice fields and, when a model API key is configured, a structured
invoice.

## KPIs

Amounts are exact decimals serialized as strings and rounded half-up:
two places for money, four for ratios, one for coverage days. The dashboard
repeats the POS KPIs as plain numbers for charting.

## Error Handling

```json
{
  "error": "Bad Request",
  "message": "Bad request: No filename provided",
  "request_id": "req-abc123xyz",
  "timestamp": "2024-01-01T00:00:00Z"
}
```
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8000", description = "Local development")
    ),
    tags(
        (name = "System", description = "Service banner"),
        (name = "Health", description = "Liveness and readiness probes"),
        (name = "Uploads", description = "CSV and PDF ingestion"),
        (name = "Dashboard", description = "Summary over stored uploads"),
        (name = "KPI", description = "Financial KPI computation")
    ),
    paths(
        crate::handlers::root,
        crate::handlers::health::health_check,
        crate::handlers::health::liveness_check,
        crate::handlers::health::readiness_check,
        crate::handlers::uploads::upload_file,
        crate::handlers::dashboard::get_dashboard,
        crate::handlers::dashboard::list_files,
        crate::handlers::kpi::financial_report,
        crate::handlers::kpi::pos_kpis,
    ),
    components(
        schemas(
            // Records
            crate::models::Area,
            crate::models::ItemType,
            crate::models::PaymentMethod,
            crate::models::CostType,
            crate::models::PosLine,
            crate::models::SalesInvoice,
            crate::models::PurchaseInvoice,
            crate::models::LaborCost,
            crate::models::FixedCost,
            crate::models::InventorySnapshot,
            crate::models::CapitalSnapshot,
            crate::models::PriceListItem,

            // KPI types
            crate::services::kpi::PosKpis,
            crate::services::reports::KpiInputs,
            crate::services::reports::FinancialReport,
            crate::handlers::kpi::PosKpiRequest,

            // Stored documents
            crate::services::storage::ProcessedFile,
            crate::services::storage::CsvDocument,
            crate::services::storage::PdfDocument,
            crate::services::pdf_extraction::PdfContent,
            crate::services::pdf_extraction::PageText,
            crate::services::pdf_extraction::InvoiceInfo,
            crate::services::invoice_ai::StructuredInvoice,
            crate::services::invoice_ai::StructuredInvoiceLine,

            // Dashboard
            crate::services::dashboard::DashboardSummary,
            crate::services::dashboard::FileTypeCounts,
            crate::services::dashboard::FileStatistics,
            crate::services::dashboard::RecentFile,
            crate::handlers::dashboard::DashboardResponse,
            crate::handlers::dashboard::DashboardData,
            crate::handlers::dashboard::FilesResponse,
            crate::handlers::uploads::UploadResponse,
            crate::handlers::uploads::UploadForm,

            // Error types
            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDoc;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDoc::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}
