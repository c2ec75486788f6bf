//! HTTP client for the benford web service.

use anyhow::{Context, bail};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::StatusCode;
use serde::Serialize;

use benford_core::{AnalysisKind, Job, StatusBucket, User, UserId};

/// Shortest base URL accepted, e.g. `https://a.b.io:1`.
const MIN_BASE_URL_LEN: usize = 16;

/// Check a web service base URL and strip its trailing `/`.
///
/// Plain `http:` is refused unless `insecure` is set.
pub fn validate_base_url(url: &str, insecure: bool) -> anyhow::Result<String> {
    let url = url.trim();
    if url.len() < MIN_BASE_URL_LEN {
        bail!("web service URL '{}' is too short", url);
    }
    if url.starts_with("http:") && !insecure {
        bail!("web service URL '{}' is plain http; pass --insecure to allow it", url);
    }
    if !url.starts_with("http:") && !url.starts_with("https:") {
        bail!("web service URL '{}' must start with http: or https:", url);
    }
    Ok(url.strip_suffix('/').unwrap_or(url).to_string())
}

/// What `/results/{jobid}` reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultsReply {
    Ready(Vec<u8>),
    /// Still `uploaded` or `processing ...`; carries the status text.
    Pending(String),
    /// The job ended in `error`; carries the message.
    Failed(String),
}

#[derive(Serialize)]
struct UploadBody<'a> {
    filename: &'a str,
    data: String,
}

pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn users(&self) -> anyhow::Result<Vec<User>> {
        self.get_json("/users").await
    }

    pub async fn jobs(&self) -> anyhow::Result<Vec<Job>> {
        self.get_json("/jobs").await
    }

    pub async fn reset(&self) -> anyhow::Result<String> {
        let resp = self
            .http
            .delete(self.url("/reset"))
            .send()
            .await
            .context("calling /reset")?;
        let (status, message) = read_string(resp).await?;
        if status != StatusCode::OK {
            bail!("reset failed ({}): {}", status, message);
        }
        Ok(message)
    }

    /// Upload a document and return the new job id.
    pub async fn upload(
        &self,
        user: UserId,
        kind: AnalysisKind,
        filename: &str,
        data: &[u8],
    ) -> anyhow::Result<String> {
        let body = UploadBody {
            filename,
            data: BASE64.encode(data),
        };
        let resp = self
            .http
            .post(self.url(&format!("/pdf/{}/{}", user, kind)))
            .json(&body)
            .send()
            .await
            .context("uploading document")?;
        let (status, message) = read_string(resp).await?;
        if status != StatusCode::OK {
            bail!("upload rejected ({}): {}", status, message);
        }
        Ok(message)
    }

    pub async fn results(&self, job_id: &str) -> anyhow::Result<ResultsReply> {
        let resp = self
            .http
            .get(self.url(&format!("/results/{}", job_id)))
            .send()
            .await
            .context("querying results")?;
        let (status, message) = read_string(resp).await?;
        classify_results(status, message)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> anyhow::Result<T> {
        let resp = self
            .http
            .get(self.url(path))
            .send()
            .await
            .with_context(|| format!("calling {}", path))?;
        let status = resp.status();
        if status != StatusCode::OK {
            let text = resp.text().await.unwrap_or_default();
            bail!("{} failed ({}): {}", path, status, text);
        }
        resp.json::<T>()
            .await
            .with_context(|| format!("decoding {} response", path))
    }
}

/// Every endpoint but the listings answers with a JSON string.
async fn read_string(resp: reqwest::Response) -> anyhow::Result<(StatusCode, String)> {
    let status = resp.status();
    let bytes = resp.bytes().await.context("reading response body")?;
    let message = serde_json::from_slice::<String>(&bytes)
        .unwrap_or_else(|_| String::from_utf8_lossy(&bytes).into_owned());
    Ok((status, message))
}

fn classify_results(status: StatusCode, message: String) -> anyhow::Result<ResultsReply> {
    if status == StatusCode::OK {
        let artifact = BASE64
            .decode(message.as_bytes())
            .context("results were not valid base64")?;
        return Ok(ResultsReply::Ready(artifact));
    }
    if let Some(error) = message.strip_prefix("error: ") {
        return Ok(ResultsReply::Failed(error.to_string()));
    }
    match StatusBucket::classify(&message) {
        Some(StatusBucket::Uploaded | StatusBucket::Processing) => {
            Ok(ResultsReply::Pending(message))
        }
        _ => bail!("results request failed ({}): {}", status, message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_rules() {
        assert_eq!(
            validate_base_url("https://audit.example.com/", false).unwrap(),
            "https://audit.example.com"
        );
        assert!(validate_base_url("https://a.io", false).is_err());
        assert!(validate_base_url("http://localhost:5001", false).is_err());
        assert_eq!(
            validate_base_url("http://localhost:5001", true).unwrap(),
            "http://localhost:5001"
        );
        assert!(validate_base_url("ftp://files.example.com", true).is_err());
    }

    #[test]
    fn results_are_classified_by_status_text() {
        let encoded = BASE64.encode("1 pages\n");
        assert_eq!(
            classify_results(StatusCode::OK, encoded).unwrap(),
            ResultsReply::Ready(b"1 pages\n".to_vec())
        );
        assert_eq!(
            classify_results(StatusCode::BAD_REQUEST, "uploaded".into()).unwrap(),
            ResultsReply::Pending("uploaded".into())
        );
        assert_eq!(
            classify_results(
                StatusCode::BAD_REQUEST,
                "processing - page 2 of 5 completed".into()
            )
            .unwrap(),
            ResultsReply::Pending("processing - page 2 of 5 completed".into())
        );
        assert_eq!(
            classify_results(StatusCode::BAD_REQUEST, "error: document has no pages".into())
                .unwrap(),
            ResultsReply::Failed("document has no pages".into())
        );
        assert!(classify_results(StatusCode::BAD_REQUEST, "no such job: 9".into()).is_err());
        assert!(classify_results(StatusCode::OK, "***".into()).is_err());
    }
}
