//! The read path: report a job's current state and, when finished, its artifact.
//!
//! Nothing here computes or mutates anything. It reads the last committed
//! status string, classifies it, and fetches the artifact for terminal states.

use crate::job::{JobId, StatusBucket};
use crate::store::{JobStore, ObjectStore, StoreError};
use crate::CoreError;

/// Message used when a failed job left no error artifact.
pub const UNKNOWN_ERROR: &str = "unknown";

/// Message used when the error artifact exists but is empty.
pub const EMPTY_ERROR_ARTIFACT: &str = "unknown, results file was empty";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultsResponse {
    Uploaded { status: String },
    /// Any `processing ...` status, reported verbatim.
    Processing { status: String },
    Completed { results_key: String, contents: Vec<u8> },
    Error { message: String },
}

impl ResultsResponse {
    pub fn bucket(&self) -> StatusBucket {
        match self {
            ResultsResponse::Uploaded { .. } => StatusBucket::Uploaded,
            ResultsResponse::Processing { .. } => StatusBucket::Processing,
            ResultsResponse::Completed { .. } => StatusBucket::Completed,
            ResultsResponse::Error { .. } => StatusBucket::Error,
        }
    }

    pub fn results_key(&self) -> Option<&str> {
        match self {
            ResultsResponse::Completed { results_key, .. } => Some(results_key),
            _ => None,
        }
    }

    /// The status text shown to a polling client.
    pub fn status_text(&self) -> String {
        match self {
            ResultsResponse::Uploaded { status } | ResultsResponse::Processing { status } => {
                status.clone()
            }
            ResultsResponse::Completed { .. } => "completed".to_string(),
            ResultsResponse::Error { message } => format!("error: {}", message),
        }
    }
}

/// Look up `job_id` and describe where it stands.
pub fn query_results(
    jobs: &dyn JobStore,
    objects: &dyn ObjectStore,
    job_id: JobId,
) -> Result<ResultsResponse, CoreError> {
    let job = jobs.job(job_id)?.ok_or(CoreError::JobNotFound(job_id))?;

    let Some(bucket) = StatusBucket::classify(&job.status) else {
        tracing::warn!(%job_id, status = %job.status, "job has an unexpected status");
        return Ok(ResultsResponse::Error {
            message: CoreError::UnexpectedStatus(job.status).to_string(),
        });
    };

    match bucket {
        StatusBucket::Uploaded => Ok(ResultsResponse::Uploaded { status: job.status }),
        StatusBucket::Processing => Ok(ResultsResponse::Processing { status: job.status }),
        StatusBucket::Completed => {
            let contents = objects.get(&job.results_key)?;
            Ok(ResultsResponse::Completed {
                results_key: job.results_key,
                contents,
            })
        }
        StatusBucket::Error => Ok(ResultsResponse::Error {
            message: error_message(objects, &job.results_key),
        }),
    }
}

fn error_message(objects: &dyn ObjectStore, results_key: &str) -> String {
    if results_key.is_empty() {
        return UNKNOWN_ERROR.to_string();
    }
    match objects.get(results_key) {
        Ok(bytes) => {
            let text = String::from_utf8_lossy(&bytes);
            match text.lines().next() {
                Some(line) if !line.is_empty() => line.to_string(),
                _ => EMPTY_ERROR_ARTIFACT.to_string(),
            }
        }
        Err(StoreError::NoSuchObject(_)) => UNKNOWN_ERROR.to_string(),
        Err(e) => {
            tracing::warn!(results_key, error = %e, "could not read error artifact");
            UNKNOWN_ERROR.to_string()
        }
    }
}
