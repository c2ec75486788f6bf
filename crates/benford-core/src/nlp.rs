//! Natural-language analysis service used by the sentiment, ner, and pii kinds.
//!
//! [`HttpNlpClient`] speaks a Comprehend-shaped JSON protocol: each operation
//! is a `POST` of `{"Text", "LanguageCode"}` to `<endpoint>/<operation>`.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NlpError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("NLP service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SentimentScore {
    pub positive: f64,
    pub negative: f64,
    pub neutral: f64,
    pub mixed: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SentimentResult {
    /// `POSITIVE`, `NEGATIVE`, `NEUTRAL`, or `MIXED`.
    pub sentiment: String,
    pub sentiment_score: SentimentScore,
}

/// A named entity, e.g. `PERSON` / `Ada Lovelace`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Entity {
    #[serde(rename = "Type")]
    pub kind: String,
    pub text: String,
    pub score: f64,
}

/// A personally identifiable entity. The service reports offsets, not text.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PiiEntity {
    #[serde(rename = "Type")]
    pub kind: String,
    pub score: f64,
    #[serde(default)]
    pub begin_offset: Option<usize>,
    #[serde(default)]
    pub end_offset: Option<usize>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EntitiesResponse<T> {
    entities: Vec<T>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct DetectRequest<'a> {
    text: &'a str,
    language_code: &'a str,
}

type NlpFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, NlpError>> + Send + 'a>>;

/// A text analysis service.
pub trait NlpService: Send + Sync {
    fn sentiment<'a>(&'a self, text: &'a str) -> NlpFuture<'a, SentimentResult>;

    fn entities<'a>(&'a self, text: &'a str) -> NlpFuture<'a, Vec<Entity>>;

    fn pii_entities<'a>(&'a self, text: &'a str) -> NlpFuture<'a, Vec<PiiEntity>>;
}

/// HTTP client for a Comprehend-compatible endpoint.
pub struct HttpNlpClient {
    endpoint: String,
    language_code: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl HttpNlpClient {
    pub fn new(endpoint: &str, language_code: &str, timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            language_code: language_code.to_string(),
            timeout,
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, operation: &str) -> String {
        format!("{}/{}", self.endpoint, operation)
    }

    async fn post<T: serde::de::DeserializeOwned>(
        &self,
        operation: &str,
        text: &str,
    ) -> Result<T, NlpError> {
        let resp = self
            .client
            .post(self.url(operation))
            .timeout(self.timeout)
            .json(&DetectRequest {
                text,
                language_code: &self.language_code,
            })
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(NlpError::Status {
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!(operation, "NLP response received");
        Ok(resp.json::<T>().await?)
    }
}

impl NlpService for HttpNlpClient {
    fn sentiment<'a>(&'a self, text: &'a str) -> NlpFuture<'a, SentimentResult> {
        Box::pin(self.post("detect-sentiment", text))
    }

    fn entities<'a>(&'a self, text: &'a str) -> NlpFuture<'a, Vec<Entity>> {
        Box::pin(async move {
            let resp: EntitiesResponse<Entity> = self.post("detect-entities", text).await?;
            Ok(resp.entities)
        })
    }

    fn pii_entities<'a>(&'a self, text: &'a str) -> NlpFuture<'a, Vec<PiiEntity>> {
        Box::pin(async move {
            let resp: EntitiesResponse<PiiEntity> =
                self.post("detect-pii-entities", text).await?;
            Ok(resp.entities)
        })
    }
}

/// Truncate `text` to at most `max_bytes` bytes on a char boundary.
pub fn truncate_to_bytes(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
