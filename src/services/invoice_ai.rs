//! Structuring of extracted invoice text with a hosted language model.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, instrument, warn};
use utoipa::ToSchema;

use crate::config::AiConfig;
use crate::middleware_helpers::{with_retry, RetryConfig};

#[derive(Debug, Error)]
pub enum InvoiceAiError {
    #[error("AI provider is at capacity: {0}")]
    Capacity(String),

    #[error("AI provider returned {status}: {body}")]
    Provider { status: u16, body: String },

    #[error("request to AI provider failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("AI reply contained no message")]
    EmptyReply,

    #[error("AI reply contained no JSON object")]
    MissingJson,

    #[error("AI reply JSON is invalid: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

impl InvoiceAiError {
    /// Capacity problems are the only failures worth retrying.
    pub fn is_capacity(&self) -> bool {
        matches!(self, InvoiceAiError::Capacity(_))
    }
}

/// Accepts strings, numbers and booleans; blank or null becomes `None`.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Some(other) => Some(other.to_string()),
    })
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, ToSchema)]
pub struct StructuredInvoiceLine {
    #[serde(default, deserialize_with = "lenient_string")]
    pub item: Option<String>,
    #[serde(default, alias = "unit price", deserialize_with = "lenient_string")]
    pub unit_price: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub quantity: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub total: Option<String>,
}

/// Invoice as interpreted by the model. Values are kept as the text the
/// model produced.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, ToSchema)]
pub struct StructuredInvoice {
    #[serde(default, alias = "invoice number", deserialize_with = "lenient_string")]
    pub invoice_number: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub date: Option<String>,
    #[serde(default)]
    pub items: Vec<StructuredInvoiceLine>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub subtotal: Option<String>,
    #[serde(
        default,
        alias = "tax (in percentage)",
        deserialize_with = "lenient_string"
    )]
    pub tax_percentage: Option<String>,
    #[serde(default, alias = "amount due", deserialize_with = "lenient_string")]
    pub amount_due: Option<String>,
}

static JSON_OBJECT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\{.*\}").expect("valid json object regex"));

/// Parses the first `{ ... }` span of a model reply.
pub fn parse_structured_reply(reply: &str) -> Result<StructuredInvoice, InvoiceAiError> {
    let json = JSON_OBJECT
        .find(reply)
        .ok_or(InvoiceAiError::MissingJson)?;
    Ok(serde_json::from_str(json.as_str())?)
}

pub fn build_prompt(text: &str) -> String {
    format!(
        r#"Interpret the following text extracted from a PDF invoice and return a JSON object with this structure, filled with every piece of information found in the text:
{{
    "invoice number": "",
    "date": "",
    "items": [
        {{
            "item": "",
            "unit price": "",
            "quantity": "",
            "total": ""
        }}
    ],
    "subtotal": "",
    "tax (in percentage)": "",
    "amount due": ""
}}
Fill the fields as accurately as possible. Reply with the JSON object only, without any other text.
The text is the following: {text}"#
    )
}

#[async_trait]
pub trait InvoiceInterpreter: Send + Sync {
    async fn interpret(&self, text: &str) -> Result<StructuredInvoice, InvoiceAiError>;
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// Chat-completions client for the Mistral API.
#[derive(Clone)]
pub struct MistralInvoiceClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    retry: RetryConfig,
}

impl MistralInvoiceClient {
    pub fn new(config: &AiConfig, api_key: impl Into<String>) -> Result<Self, InvoiceAiError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/v1/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: api_key.into(),
            model: config.model.clone(),
            retry: config.retry_config(),
        })
    }

    /// Builds a client when an API key is configured.
    pub fn from_config(config: &AiConfig) -> Result<Option<Self>, InvoiceAiError> {
        config
            .api_key()
            .map(|key| Self::new(config, key))
            .transpose()
    }

    async fn complete(&self, prompt: &str) -> Result<String, InvoiceAiError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            stream: false,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if status.as_u16() == 429
                || status.as_u16() == 503
                || body.to_lowercase().contains("capacity")
            {
                return Err(InvoiceAiError::Capacity(format!("{} {}", status, body)));
            }
            return Err(InvoiceAiError::Provider {
                status: status.as_u16(),
                body,
            });
        }

        let reply: ChatResponse = response.json().await?;
        reply
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(InvoiceAiError::EmptyReply)
    }
}

#[async_trait]
impl InvoiceInterpreter for MistralInvoiceClient {
    #[instrument(skip(self, text), fields(model = %self.model, chars = text.len()))]
    async fn interpret(&self, text: &str) -> Result<StructuredInvoice, InvoiceAiError> {
        let prompt = build_prompt(text);
        let prompt = prompt.as_str();
        let reply = with_retry(
            &self.retry,
            |e: &InvoiceAiError| e.is_capacity(),
            move || self.complete(prompt),
        )
        .await
        .map_err(|e| {
            warn!(error = %e, "invoice interpretation failed");
            e
        })?;

        debug!(reply_len = reply.len(), "received invoice interpretation");
        parse_structured_reply(&reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(base_url: &str) -> AiConfig {
        AiConfig {
            api_key: Some("test-key".into()),
            base_url: base_url.to_string(),
            max_attempts: 4,
            initial_backoff_ms: 1,
            timeout_secs: 5,
            ..AiConfig::default()
        }
    }

    fn completion(content: &str) -> serde_json::Value {
        json!({
            "id": "cmpl-1",
            "choices": [{ "index": 0, "message": { "role": "assistant", "content": content } }]
        })
    }

    const REPLY: &str = r#"Here you go:
{
    "invoice number": "INV-7",
    "date": "12/03/2024",
    "items": [
        { "item": "Flour 25kg", "unit price": "18.40", "quantity": 2, "total": "36.80" }
    ],
    "subtotal": 36.8,
    "tax (in percentage)": "7",
    "amount due": ""
}
Thanks"#;

    #[test]
    fn parses_reply_with_spaced_keys_and_mixed_values() {
        let invoice = parse_structured_reply(REPLY).unwrap();
        assert_eq!(invoice.invoice_number.as_deref(), Some("INV-7"));
        assert_eq!(invoice.items.len(), 1);
        assert_eq!(invoice.items[0].unit_price.as_deref(), Some("18.40"));
        assert_eq!(invoice.items[0].quantity.as_deref(), Some("2"));
        assert_eq!(invoice.subtotal.as_deref(), Some("36.8"));
        assert_eq!(invoice.tax_percentage.as_deref(), Some("7"));
        assert_eq!(invoice.amount_due, None);
    }

    #[test]
    fn reply_without_json_is_rejected() {
        assert_matches!(
            parse_structured_reply("sorry, no invoice here"),
            Err(InvoiceAiError::MissingJson)
        );
        assert_matches!(
            parse_structured_reply("{ not json }"),
            Err(InvoiceAiError::InvalidJson(_))
        );
    }

    #[test]
    fn prompt_embeds_text() {
        let prompt = build_prompt("ACME GmbH Total 10");
        assert!(prompt.contains("\"amount due\""));
        assert!(prompt.ends_with("ACME GmbH Total 10"));
    }

    #[test]
    fn no_client_without_api_key() {
        let config = AiConfig::default();
        assert!(MistralInvoiceClient::from_config(&config).unwrap().is_none());
    }

    #[tokio::test]
    async fn interprets_invoice_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(json!({
                "model": "mistral-large-latest",
                "stream": false
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(REPLY)))
            .expect(1)
            .mount(&server)
            .await;

        let client = MistralInvoiceClient::from_config(&test_config(&server.uri()))
            .unwrap()
            .unwrap();
        let invoice = client.interpret("Invoice INV-7").await.unwrap();
        assert_eq!(invoice.date.as_deref(), Some("12/03/2024"));
    }

    #[tokio::test]
    async fn retries_when_provider_is_at_capacity() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(503).set_body_string("service at capacity"))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(REPLY)))
            .expect(1)
            .mount(&server)
            .await;

        let client = MistralInvoiceClient::from_config(&test_config(&server.uri()))
            .unwrap()
            .unwrap();
        let invoice = client.interpret("Invoice INV-7").await.unwrap();
        assert_eq!(invoice.invoice_number.as_deref(), Some("INV-7"));
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .expect(4)
            .mount(&server)
            .await;

        let client = MistralInvoiceClient::from_config(&test_config(&server.uri()))
            .unwrap()
            .unwrap();
        assert_matches!(
            client.interpret("text").await,
            Err(InvoiceAiError::Capacity(_))
        );
    }

    #[tokio::test]
    async fn other_failures_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
            .expect(1)
            .mount(&server)
            .await;

        let client = MistralInvoiceClient::from_config(&test_config(&server.uri()))
            .unwrap()
            .unwrap();
        assert_matches!(
            client.interpret("text").await,
            Err(InvoiceAiError::Provider { status: 401, .. })
        );
    }
}
