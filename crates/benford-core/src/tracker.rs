use std::sync::Arc;

use crate::job::{Job, JobId, JobStatus};
use crate::store::JobStore;
use crate::CoreError;

/// The job lifecycle bound to its persisted row.
///
/// Every transition is validated against [`JobStatus::can_advance_to`] before
/// anything is written; an illegal transition leaves the row untouched. The
/// in-memory state only moves after the store accepted the write.
pub struct JobTracker {
    store: Arc<dyn JobStore>,
    job_id: JobId,
    status: JobStatus,
}

impl JobTracker {
    /// Track a job whose status is already known.
    pub fn new(store: Arc<dyn JobStore>, job_id: JobId, status: JobStatus) -> Self {
        Self {
            store,
            job_id,
            status,
        }
    }

    /// Track a job from its persisted row.
    pub fn load(store: Arc<dyn JobStore>, job: &Job) -> Result<Self, CoreError> {
        let status = job.status.parse::<JobStatus>()?;
        Ok(Self::new(store, job.id, status))
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    /// `uploaded -> processing - starting`
    pub fn start(&mut self) -> Result<(), CoreError> {
        self.advance(JobStatus::Starting)
    }

    /// Record that page `page` (1-based) of `total` has been consumed.
    pub fn page_completed(&mut self, page: u32, total: u32) -> Result<(), CoreError> {
        self.advance(JobStatus::PageCompleted { page, total })
    }

    /// `processing - page n of n completed -> completed`
    pub fn complete(&mut self) -> Result<(), CoreError> {
        self.advance(JobStatus::Completed)
    }

    /// Any non-terminal state `-> error`.
    pub fn fail(&mut self) -> Result<(), CoreError> {
        self.advance(JobStatus::Error)
    }

    fn advance(&mut self, next: JobStatus) -> Result<(), CoreError> {
        if !self.status.can_advance_to(&next) {
            return Err(CoreError::InvalidTransition {
                job_id: self.job_id,
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.store.update_status(self.job_id, &next.to_string())?;
        tracing::debug!(job_id = %self.job_id, status = %next, "job status updated");
        self.status = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{AnalysisKind, NewJob, UserId};
    use crate::memory::MemoryJobStore;

    fn store_with_job() -> (Arc<MemoryJobStore>, JobId) {
        let store = Arc::new(MemoryJobStore::new());
        let id = store
            .create_job(&NewJob {
                user_id: UserId(1),
                kind: AnalysisKind::Benford,
                original_file: "a.pdf".into(),
                data_key: "k/a.pdf".into(),
            })
            .unwrap();
        (store, id)
    }

    fn persisted(store: &MemoryJobStore, id: JobId) -> String {
        store.job(id).unwrap().unwrap().status
    }

    #[test]
    fn each_transition_is_written_through() {
        let (store, id) = store_with_job();
        let job = store.job(id).unwrap().unwrap();
        let mut tracker = JobTracker::load(store.clone(), &job).unwrap();

        tracker.start().unwrap();
        assert_eq!(persisted(&store, id), "processing - starting");
        tracker.page_completed(1, 2).unwrap();
        assert_eq!(persisted(&store, id), "processing - page 1 of 2 completed");
        tracker.page_completed(2, 2).unwrap();
        tracker.complete().unwrap();
        assert_eq!(persisted(&store, id), "completed");
        assert_eq!(tracker.status(), JobStatus::Completed);
    }

    #[test]
    fn illegal_transition_writes_nothing() {
        let (store, id) = store_with_job();
        let mut tracker = JobTracker::new(store.clone(), id, JobStatus::Uploaded);
        tracker.start().unwrap();

        let err = tracker.page_completed(2, 3).unwrap_err();
        assert!(matches!(err, CoreError::InvalidTransition { .. }));
        assert_eq!(persisted(&store, id), "processing - starting");
        assert_eq!(tracker.status(), JobStatus::Starting);
    }

    #[test]
    fn terminal_state_is_sticky() {
        let (store, id) = store_with_job();
        let mut tracker = JobTracker::new(store.clone(), id, JobStatus::Uploaded);
        tracker.fail().unwrap();
        assert_eq!(persisted(&store, id), "error");
        assert!(tracker.start().is_err());
        assert!(tracker.fail().is_err());
        assert_eq!(persisted(&store, id), "error");
    }

    #[test]
    fn store_failure_keeps_previous_state() {
        let store = Arc::new(MemoryJobStore::new());
        // No such row: the store rejects the write.
        let mut tracker = JobTracker::new(store, JobId(99), JobStatus::Uploaded);
        assert!(matches!(tracker.start(), Err(CoreError::Store(_))));
        assert_eq!(tracker.status(), JobStatus::Uploaded);
    }

    #[test]
    fn load_rejects_unknown_status() {
        let (store, id) = store_with_job();
        store.update_status(id, "halfway").unwrap();
        let job = store.job(id).unwrap().unwrap();
        assert!(matches!(
            JobTracker::load(store.clone(), &job),
            Err(CoreError::UnexpectedStatus(_))
        ));
    }
}
