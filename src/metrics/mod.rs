/*!
 * # Metrics Module
 *
 * In-process counters and histograms for the ingestion pipeline, exported in
 * Prometheus text format at `/metrics`.
 *
 * - HTTP requests by status class and latency
 * - Uploads by file type, rejections and processing failures
 * - POS rows skipped during KPI aggregation
 * - AI invoice interpretation outcomes
 */

use axum::{
    extract::Request,
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Default)]
pub struct Counter {
    value: Arc<AtomicU64>,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, value: u64) {
        self.value.fetch_add(value, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Count and sum of observed durations. The sum is kept in microseconds.
#[derive(Debug, Clone, Default)]
pub struct Histogram {
    sum_micros: Arc<AtomicU64>,
    count: Arc<AtomicU64>,
}

impl Histogram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&self, duration: Duration) {
        let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
        self.sum_micros.fetch_add(micros, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn get_sum(&self) -> f64 {
        self.sum_micros.load(Ordering::Relaxed) as f64 / 1_000_000.0
    }
}

/// Splits `name{labels}` into the family name used for `# TYPE` lines.
fn family(name: &str) -> &str {
    name.split('{').next().unwrap_or(name)
}

/// Inserts `_count` / `_sum` before the label set of a histogram series.
fn series(name: &str, suffix: &str) -> String {
    match name.find('{') {
        Some(pos) => format!("{}{}{}", &name[..pos], suffix, &name[pos..]),
        None => format!("{}{}", name, suffix),
    }
}

#[derive(Debug, Default)]
pub struct MetricsRegistry {
    counters: DashMap<String, Counter>,
    histograms: DashMap<String, Histogram>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create_counter(&self, name: &str) -> Counter {
        self.counters
            .entry(name.to_string())
            .or_insert_with(Counter::new)
            .clone()
    }

    pub fn get_or_create_histogram(&self, name: &str) -> Histogram {
        self.histograms
            .entry(name.to_string())
            .or_insert_with(Histogram::new)
            .clone()
    }

    /// Prometheus text exposition, families sorted by name.
    pub fn export_metrics(&self) -> String {
        let counters: BTreeMap<String, u64> = self
            .counters
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().get()))
            .collect();
        let histograms: BTreeMap<String, (u64, f64)> = self
            .histograms
            .iter()
            .map(|entry| {
                let h = entry.value();
                (entry.key().clone(), (h.get_count(), h.get_sum()))
            })
            .collect();

        let mut output = String::new();
        let mut last_family = String::new();
        for (name, value) in &counters {
            if family(name) != last_family {
                last_family = family(name).to_string();
                let _ = writeln!(output, "# TYPE {} counter", last_family);
            }
            let _ = writeln!(output, "{} {}", name, value);
        }

        last_family.clear();
        for (name, (count, sum)) in &histograms {
            if family(name) != last_family {
                last_family = family(name).to_string();
                let _ = writeln!(output, "# TYPE {} summary", last_family);
            }
            let _ = writeln!(output, "{} {}", series(name, "_count"), count);
            let _ = writeln!(output, "{} {}", series(name, "_sum"), sum);
        }

        output
    }
}

// Global metrics registry
lazy_static::lazy_static! {
    pub static ref METRICS: MetricsRegistry = MetricsRegistry::new();
}

/// Ingestion pipeline metrics
pub struct IngestMetrics {
    pub uploads_csv: Counter,
    pub uploads_pdf: Counter,
    pub uploads_rejected: Counter,
    pub upload_failures_csv: Counter,
    pub upload_failures_pdf: Counter,
    pub processing_csv: Histogram,
    pub processing_pdf: Histogram,
    pub pos_rows_skipped: Counter,
    pub ai_success: Counter,
    pub ai_failure: Counter,
    pub ai_disabled: Counter,
}

impl IngestMetrics {
    pub fn new(registry: &MetricsRegistry) -> Self {
        Self {
            uploads_csv: registry.get_or_create_counter(r#"uploads_total{file_type="csv"}"#),
            uploads_pdf: registry.get_or_create_counter(r#"uploads_total{file_type="pdf"}"#),
            uploads_rejected: registry.get_or_create_counter("uploads_rejected_total"),
            upload_failures_csv: registry
                .get_or_create_counter(r#"upload_failures_total{file_type="csv"}"#),
            upload_failures_pdf: registry
                .get_or_create_counter(r#"upload_failures_total{file_type="pdf"}"#),
            processing_csv: registry
                .get_or_create_histogram(r#"upload_processing_seconds{file_type="csv"}"#),
            processing_pdf: registry
                .get_or_create_histogram(r#"upload_processing_seconds{file_type="pdf"}"#),
            pos_rows_skipped: registry.get_or_create_counter("pos_rows_skipped_total"),
            ai_success: registry
                .get_or_create_counter(r#"invoice_ai_requests_total{outcome="success"}"#),
            ai_failure: registry
                .get_or_create_counter(r#"invoice_ai_requests_total{outcome="failure"}"#),
            ai_disabled: registry
                .get_or_create_counter(r#"invoice_ai_requests_total{outcome="disabled"}"#),
        }
    }

    pub fn record_upload(&self, file_type: &str, duration: Duration) {
        match file_type {
            "csv" => {
                self.uploads_csv.inc();
                self.processing_csv.observe(duration);
            }
            "pdf" => {
                self.uploads_pdf.inc();
                self.processing_pdf.observe(duration);
            }
            _ => {}
        }
    }

    pub fn record_upload_failure(&self, file_type: &str) {
        match file_type {
            "csv" => self.upload_failures_csv.inc(),
            "pdf" => self.upload_failures_pdf.inc(),
            _ => {}
        }
    }

    pub fn record_rejected_upload(&self) {
        self.uploads_rejected.inc();
    }

    pub fn record_skipped_rows(&self, count: usize) {
        self.pos_rows_skipped.inc_by(count as u64);
    }

    pub fn record_ai_outcome(&self, success: bool) {
        if success {
            self.ai_success.inc();
        } else {
            self.ai_failure.inc();
        }
    }

    pub fn record_ai_disabled(&self) {
        self.ai_disabled.inc();
    }
}

// HTTP metrics by status class
pub struct EndpointMetrics {
    pub latency: Histogram,
    pub status_2xx: Counter,
    pub status_4xx: Counter,
    pub status_5xx: Counter,
}

impl EndpointMetrics {
    pub fn new(registry: &MetricsRegistry) -> Self {
        Self {
            latency: registry.get_or_create_histogram("http_request_duration_seconds"),
            status_2xx: registry.get_or_create_counter(r#"http_requests_total{class="2xx"}"#),
            status_4xx: registry.get_or_create_counter(r#"http_requests_total{class="4xx"}"#),
            status_5xx: registry.get_or_create_counter(r#"http_requests_total{class="5xx"}"#),
        }
    }

    pub fn record_request(&self, duration: Duration, status_code: u16) {
        self.latency.observe(duration);
        match status_code {
            200..=299 => self.status_2xx.inc(),
            400..=499 => self.status_4xx.inc(),
            500..=599 => self.status_5xx.inc(),
            _ => {}
        }
    }
}

// Global instances
lazy_static::lazy_static! {
    pub static ref INGEST_METRICS: IngestMetrics = IngestMetrics::new(&METRICS);
    pub static ref ENDPOINT_METRICS: EndpointMetrics = EndpointMetrics::new(&METRICS);
}

/// Records latency and status class of every request.
pub async fn track_http_metrics(request: Request, next: Next) -> Response {
    let started = Instant::now();
    let response = next.run(request).await;
    ENDPOINT_METRICS.record_request(started.elapsed(), response.status().as_u16());
    response
}

// HTTP endpoint handler for metrics
pub async fn metrics_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        METRICS.export_metrics(),
    )
}
