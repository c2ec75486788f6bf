//! Document analysis core: leading-digit tabulation for Benford's Law, the
//! job lifecycle, and the worker/query/submit paths that drive it.
//!
//! Storage, PDF text extraction, and the NLP service are reached through the
//! traits in [`store`], [`backend`], and [`nlp`]; concrete implementations live
//! in sibling crates (or in [`memory`] for tests and offline use).

use std::time::Duration;

use thiserror::Error;

pub mod analysis;
pub mod backend;
pub mod config_file;
pub mod digits;
pub mod job;
pub mod memory;
pub mod nlp;
pub mod query;
pub mod store;
pub mod submit;
pub mod tracker;
pub mod worker;

// Re-export for convenience
pub use backend::{BackendError, PageSource, PdfBackend, PlainTextBackend};
pub use digits::{BenfordReport, DigitHistogram, leading_digit, tally_page, tally_pages};
pub use job::{AnalysisKind, Job, JobId, JobStatus, NewJob, StatusBucket, User, UserId};
pub use nlp::{HttpNlpClient, NlpError, NlpService};
pub use query::{ResultsResponse, query_results};
pub use store::{JobStore, ObjectStore, StoreError};
pub use submit::{Submission, submit_document};
pub use tracker::JobTracker;
pub use worker::{Worker, WorkerOutcome, results_key_for};

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("no such user: {0}")]
    UserNotFound(UserId),
    #[error("no such job: {0}")]
    JobNotFound(JobId),
    #[error("no job for document '{0}'")]
    DataKeyNotFound(String),
    #[error("job {job_id} was already picked up (status '{status}')")]
    AlreadyProcessed { job_id: JobId, status: String },
    #[error("job {job_id}: illegal status change '{from}' -> '{to}'")]
    InvalidTransition {
        job_id: JobId,
        from: String,
        to: String,
    },
    #[error("unexpected job status of '{0}'")]
    UnexpectedStatus(String),
    #[error("malformed report: {0}")]
    MalformedReport(String),
    #[error("document has no pages")]
    EmptyDocument,
    #[error("document has too many pages ({0})")]
    TooManyPages(usize),
    #[error("no NLP service configured for {0} jobs")]
    NlpUnavailable(AnalysisKind),
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
    #[error("PDF error: {0}")]
    Backend(#[from] BackendError),
    #[error("NLP error: {0}")]
    Nlp(#[from] NlpError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Caller mistakes (bad input, unknown ids) as opposed to processing faults.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            CoreError::InvalidInput(_)
                | CoreError::UserNotFound(_)
                | CoreError::JobNotFound(_)
                | CoreError::DataKeyNotFound(_)
                | CoreError::AlreadyProcessed { .. }
        )
    }
}

/// Default prefix for every object key written by the service.
pub const DEFAULT_KEY_PREFIX: &str = "benfordapp";

/// Resolved configuration for the core, injected into the worker and the
/// submit path. Built from [`config_file::ConfigFile`] plus environment overrides.
#[derive(Debug, Clone)]
pub struct Config {
    /// First path segment of every stored document key.
    pub key_prefix: String,
    /// Base URL of the NLP service. `None` disables the sentiment/ner/pii kinds.
    pub nlp_endpoint: Option<String>,
    pub nlp_language_code: String,
    /// Upper bound on the text sent to the NLP service per document.
    pub nlp_max_text_bytes: usize,
    pub nlp_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            nlp_endpoint: None,
            nlp_language_code: "en".to_string(),
            nlp_max_text_bytes: 5000,
            nlp_timeout_secs: 30,
        }
    }
}

impl Config {
    pub fn nlp_timeout(&self) -> Duration {
        Duration::from_secs(self.nlp_timeout_secs)
    }

    /// Build the HTTP NLP client if an endpoint is configured.
    pub fn nlp_client(&self) -> Option<HttpNlpClient> {
        self.nlp_endpoint.as_deref().map(|endpoint| {
            HttpNlpClient::new(endpoint, &self.nlp_language_code, self.nlp_timeout())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_no_nlp() {
        let config = Config::default();
        assert_eq!(config.key_prefix, "benfordapp");
        assert!(config.nlp_client().is_none());
    }

    #[test]
    fn client_errors_are_distinguished() {
        assert!(CoreError::JobNotFound(JobId(1)).is_client_error());
        assert!(!CoreError::EmptyDocument.is_client_error());
        assert!(!CoreError::UnexpectedStatus("x".into()).is_client_error());
    }
}
