//! Persistence seams: the job table and the object (document/artifact) store.
//!
//! Every method is a single atomic operation from the caller's point of view;
//! in particular a status update is never observable half-written.

use thiserror::Error;

use crate::job::{Job, JobId, NewJob, User, UserId};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("no job with id {0}")]
    NoSuchJob(JobId),
    #[error("no object at key '{0}'")]
    NoSuchObject(String),
    #[error("invalid object key '{0}'")]
    InvalidKey(String),
    #[error("corrupt row: {0}")]
    Corrupt(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    /// Wrap a backend-specific error (SQLite, network, ...).
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        StoreError::Backend(Box::new(err))
    }
}

/// The relational side: users and jobs.
pub trait JobStore: Send + Sync {
    fn users(&self) -> Result<Vec<User>, StoreError>;

    fn user(&self, id: UserId) -> Result<Option<User>, StoreError>;

    /// All jobs, ordered by id.
    fn jobs(&self) -> Result<Vec<Job>, StoreError>;

    fn job(&self, id: JobId) -> Result<Option<Job>, StoreError>;

    fn job_by_data_key(&self, data_key: &str) -> Result<Option<Job>, StoreError>;

    /// Insert a job in state `uploaded` with an empty results key.
    fn create_job(&self, job: &NewJob) -> Result<JobId, StoreError>;

    fn update_status(&self, id: JobId, status: &str) -> Result<(), StoreError>;

    fn set_results_key(&self, id: JobId, results_key: &str) -> Result<(), StoreError>;

    /// Remove one job row. Removing a missing row is not an error.
    fn delete_job(&self, id: JobId) -> Result<(), StoreError>;

    /// Delete every job. Users are kept.
    fn reset(&self) -> Result<(), StoreError>;
}

/// Key/value blob storage for source documents and results artifacts.
pub trait ObjectStore: Send + Sync {
    fn put(&self, key: &str, data: &[u8]) -> Result<(), StoreError>;

    fn get(&self, key: &str) -> Result<Vec<u8>, StoreError>;

    fn exists(&self, key: &str) -> Result<bool, StoreError>;

    fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Remove every object whose key starts with `prefix`.
    fn delete_prefix(&self, prefix: &str) -> Result<usize, StoreError>;
}
