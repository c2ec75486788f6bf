//! In-memory [`JobStore`] and [`ObjectStore`] implementations.
//!
//! Used by the CLI's offline `analyze` command and throughout the tests.

use std::collections::BTreeMap;
use std::sync::Mutex;

use dashmap::DashMap;

use crate::job::{Job, JobId, JobStatus, NewJob, User, UserId};
use crate::store::{JobStore, ObjectStore, StoreError};

#[derive(Default)]
struct Tables {
    users: BTreeMap<UserId, User>,
    jobs: BTreeMap<JobId, Job>,
    next_job_id: i64,
}

/// A [`JobStore`] held entirely in memory.
#[derive(Default)]
pub struct MemoryJobStore {
    tables: Mutex<Tables>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user (replacing any user with the same id).
    pub fn add_user(&self, id: UserId, username: &str) {
        let mut tables = self.lock();
        tables.users.insert(
            id,
            User {
                id,
                username: username.to_string(),
                pwdhash: String::new(),
            },
        );
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Tables> {
        // Each critical section is a single map operation; poisoning is ignored.
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn with_job<T>(&self, id: JobId, f: impl FnOnce(&mut Job) -> T) -> Result<T, StoreError> {
        let mut tables = self.lock();
        let job = tables.jobs.get_mut(&id).ok_or(StoreError::NoSuchJob(id))?;
        Ok(f(job))
    }
}

impl JobStore for MemoryJobStore {
    fn users(&self) -> Result<Vec<User>, StoreError> {
        Ok(self.lock().users.values().cloned().collect())
    }

    fn user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self.lock().users.get(&id).cloned())
    }

    fn jobs(&self) -> Result<Vec<Job>, StoreError> {
        Ok(self.lock().jobs.values().cloned().collect())
    }

    fn job(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        Ok(self.lock().jobs.get(&id).cloned())
    }

    fn job_by_data_key(&self, data_key: &str) -> Result<Option<Job>, StoreError> {
        Ok(self
            .lock()
            .jobs
            .values()
            .find(|j| j.data_key == data_key)
            .cloned())
    }

    fn create_job(&self, job: &NewJob) -> Result<JobId, StoreError> {
        let mut tables = self.lock();
        tables.next_job_id += 1;
        let id = JobId(tables.next_job_id);
        tables.jobs.insert(
            id,
            Job {
                id,
                user_id: job.user_id,
                status: JobStatus::Uploaded.to_string(),
                kind: job.kind,
                original_file: job.original_file.clone(),
                data_key: job.data_key.clone(),
                results_key: String::new(),
            },
        );
        Ok(id)
    }

    fn update_status(&self, id: JobId, status: &str) -> Result<(), StoreError> {
        self.with_job(id, |job| job.status = status.to_string())
    }

    fn set_results_key(&self, id: JobId, results_key: &str) -> Result<(), StoreError> {
        self.with_job(id, |job| job.results_key = results_key.to_string())
    }

    fn delete_job(&self, id: JobId) -> Result<(), StoreError> {
        self.lock().jobs.remove(&id);
        Ok(())
    }

    fn reset(&self) -> Result<(), StoreError> {
        self.lock().jobs.clear();
        Ok(())
    }
}

/// An [`ObjectStore`] backed by a concurrent map.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: DashMap<String, Vec<u8>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl ObjectStore for MemoryObjectStore {
    fn put(&self, key: &str, data: &[u8]) -> Result<(), StoreError> {
        if key.is_empty() {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        self.objects.insert(key.to_string(), data.to_vec());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.objects
            .get(key)
            .map(|v| v.value().clone())
            .ok_or_else(|| StoreError::NoSuchObject(key.to_string()))
    }

    fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.objects.contains_key(key))
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.objects.remove(key);
        Ok(())
    }

    fn delete_prefix(&self, prefix: &str) -> Result<usize, StoreError> {
        let mut removed = 0;
        self.objects.retain(|k, _| {
            let matched = k.starts_with(prefix);
            removed += usize::from(matched);
            !matched
        });
        Ok(removed)
    }
}
