#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request},
    Router,
};
use lopdf::{
    content::{Content, Operation},
    dictionary, Document, Object, Stream,
};
use oreka_api::{app_router, config::AppConfig, AppState};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

pub const BOUNDARY: &str = "oreka-test-boundary";

pub const POS_CSV: &str = "\
timestamp,item_type,item_name,quantity,price_per_item,total_price,payment_method,area,receipt_id
2024-03-01 12:00:00,FOOD,Burger,2,12.00,24.00,CARD,Restaurant,R1
2024-03-01 12:00:00,FOOD,Fries,1,4.50,4.50,CARD,Restaurant,R1
2024-03-01 21:30:00,BEV,Lager,3,4.50,13.50,CASH,Bar,R2
2024-03-01 21:45:00,BEV,Mystery,1,2.00,2.00,CASH,Garden,R3
";

/// Router over a fresh upload directory that lives as long as the harness.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    pub async fn with_config(adjust: impl FnOnce(&mut AppConfig)) -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let mut cfg = AppConfig::new(dir.path().join("uploads"));
        adjust(&mut cfg);

        let state = AppState::initialize(cfg)
            .await
            .expect("failed to initialize app state");
        let router = app_router(state.clone());
        Self { router, state, dir }
    }

    pub fn dir(&self) -> &std::path::Path {
        self.dir.path()
    }

    pub async fn send(&self, request: Request<Body>) -> axum::response::Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Send a request with an optional JSON body.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };
        self.send(builder.body(body).expect("failed to build request"))
            .await
    }

    /// POST a single multipart field to `/upload`.
    pub async fn upload(
        &self,
        field_name: &str,
        file_name: Option<&str>,
        bytes: &[u8],
    ) -> axum::response::Response {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/upload")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(multipart_body(field_name, file_name, bytes)))
            .expect("failed to build upload request");
        self.send(request).await
    }
}

pub fn multipart_body(field_name: &str, file_name: Option<&str>, bytes: &[u8]) -> Vec<u8> {
    let mut disposition = format!("Content-Disposition: form-data; name=\"{}\"", field_name);
    if let Some(name) = file_name {
        disposition.push_str(&format!("; filename=\"{}\"", name));
    }

    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(disposition.as_bytes());
    body.extend_from_slice(b"\r\nContent-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub async fn response_json(response: axum::response::Response) -> Value {
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("failed to read response body");
    serde_json::from_slice(&body).expect("response is not JSON")
}

pub async fn response_text(response: axum::response::Response) -> String {
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("failed to read response body");
    String::from_utf8(body.to_vec()).expect("response is not UTF-8")
}

/// One-page PDF with each line drawn as its own text object.
pub fn invoice_pdf(lines: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut operations = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        operations.push(Operation::new("BT", vec![]));
        operations.push(Operation::new("Tf", vec!["F1".into(), 11.into()]));
        operations.push(Operation::new(
            "Td",
            vec![60.into(), (780 - 14 * i as i64).into()],
        ));
        operations.push(Operation::new("Tj", vec![Object::string_literal(*line)]));
        operations.push(Operation::new("ET", vec![]));
    }
    let content = Content { operations };
    let content_id = doc.add_object(Stream::new(
        dictionary! {},
        content.encode().expect("failed to encode content"),
    ));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::from(page_id)],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out).expect("failed to write PDF");
    out
}
