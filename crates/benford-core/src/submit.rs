use std::path::Path;

use uuid::Uuid;

use crate::job::{AnalysisKind, JobId, NewJob, UserId};
use crate::store::{JobStore, ObjectStore};
use crate::{Config, CoreError};

/// A document handed in for analysis.
#[derive(Debug, Clone)]
pub struct Submission {
    pub user_id: UserId,
    pub kind: AnalysisKind,
    /// Name of the file on the client side; only its stem and extension are used.
    pub filename: String,
    pub data: Vec<u8>,
}

/// Accept a document: create its job row in `uploaded`, then store the
/// document under a fresh unique key.
///
/// The row is written before the document so that a worker triggered by the
/// document's arrival always finds its job. Input is validated before either
/// write happens, and the row is removed again if the document cannot be
/// stored. Returns the new job id and the document's data key.
pub fn submit_document(
    jobs: &dyn JobStore,
    objects: &dyn ObjectStore,
    config: &Config,
    submission: &Submission,
) -> Result<(JobId, String), CoreError> {
    let path = Path::new(&submission.filename);
    let is_pdf = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));
    if !is_pdf {
        return Err(CoreError::InvalidInput(
            "expecting filename to have .pdf extension".into(),
        ));
    }
    if submission.data.is_empty() {
        return Err(CoreError::InvalidInput("document is empty".into()));
    }

    let user = jobs
        .user(submission.user_id)?
        .ok_or(CoreError::UserNotFound(submission.user_id))?;

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .map(sanitize_segment)
        .unwrap_or_default();
    let data_key = format!(
        "{}/{}/{}-{}.pdf",
        config.key_prefix,
        sanitize_segment(&user.username),
        stem,
        Uuid::new_v4()
    );

    let job_id = jobs.create_job(&NewJob {
        user_id: user.id,
        kind: submission.kind,
        original_file: submission.filename.clone(),
        data_key: data_key.clone(),
    })?;

    if let Err(e) = objects.put(&data_key, &submission.data) {
        tracing::warn!(%job_id, data_key, error = %e, "document not stored, removing job");
        if let Err(cleanup) = jobs.delete_job(job_id) {
            tracing::error!(%job_id, error = %cleanup, "could not remove job for unstored document");
        }
        return Err(e.into());
    }

    tracing::info!(%job_id, user = %user.username, kind = %submission.kind, data_key, "document submitted");
    Ok((job_id, data_key))
}

/// Keep a key segment free of path separators and traversal.
fn sanitize_segment(segment: &str) -> String {
    segment
        .chars()
        .map(|c| match c {
            '/' | '\\' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect::<String>()
        .trim_start_matches('.')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryJobStore, MemoryObjectStore};
    use crate::store::StoreError;

    fn submission(filename: &str, user: i64) -> Submission {
        Submission {
            user_id: UserId(user),
            kind: AnalysisKind::Benford,
            filename: filename.to_string(),
            data: b"%PDF-1.4 fake".to_vec(),
        }
    }

    fn stores() -> (MemoryJobStore, MemoryObjectStore) {
        let jobs = MemoryJobStore::new();
        jobs.add_user(UserId(80001), "p_sarkar");
        (jobs, MemoryObjectStore::new())
    }

    #[test]
    fn creates_one_uploaded_job_and_stores_document() {
        let (jobs, objects) = stores();
        let (id, key) = submit_document(
            &jobs,
            &objects,
            &Config::default(),
            &submission("annual-report.pdf", 80001),
        )
        .unwrap();

        let all = jobs.jobs().unwrap();
        assert_eq!(all.len(), 1);
        let job = &all[0];
        assert_eq!(job.id, id);
        assert_eq!(job.status, "uploaded");
        assert_eq!(job.original_file, "annual-report.pdf");
        assert_eq!(job.data_key, key);
        assert!(job.results_key.is_empty());

        assert!(key.starts_with("benfordapp/p_sarkar/annual-report-"));
        assert!(key.ends_with(".pdf"));
        assert_eq!(objects.get(&key).unwrap(), b"%PDF-1.4 fake");
    }

    #[test]
    fn keys_are_unique_per_submission() {
        let (jobs, objects) = stores();
        let config = Config::default();
        let (_, a) = submit_document(&jobs, &objects, &config, &submission("x.pdf", 80001)).unwrap();
        let (_, b) = submit_document(&jobs, &objects, &config, &submission("x.pdf", 80001)).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn wrong_extension_is_rejected_without_mutation() {
        let (jobs, objects) = stores();
        let err = submit_document(&jobs, &objects, &Config::default(), &submission("notes.docx", 80001))
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(_)));
        assert!(jobs.jobs().unwrap().is_empty());
        assert!(objects.is_empty());
    }

    #[test]
    fn unknown_user_is_rejected_without_mutation() {
        let (jobs, objects) = stores();
        let err = submit_document(&jobs, &objects, &Config::default(), &submission("a.pdf", 1))
            .unwrap_err();
        assert!(matches!(err, CoreError::UserNotFound(UserId(1))));
        assert!(jobs.jobs().unwrap().is_empty());
        assert!(objects.is_empty());
    }

    /// Object store that refuses every write.
    struct ReadOnlyObjects;

    impl ObjectStore for ReadOnlyObjects {
        fn put(&self, _key: &str, _data: &[u8]) -> Result<(), StoreError> {
            Err(StoreError::Io(std::io::Error::other("bucket is read-only")))
        }
        fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
            Err(StoreError::NoSuchObject(key.to_string()))
        }
        fn exists(&self, _key: &str) -> Result<bool, StoreError> {
            Ok(false)
        }
        fn delete(&self, _key: &str) -> Result<(), StoreError> {
            Ok(())
        }
        fn delete_prefix(&self, _prefix: &str) -> Result<usize, StoreError> {
            Ok(0)
        }
    }

    #[test]
    fn failed_document_write_leaves_no_job() {
        let (jobs, _) = stores();
        let err = submit_document(&jobs, &ReadOnlyObjects, &Config::default(), &submission("a.pdf", 80001))
            .unwrap_err();
        assert!(matches!(err, CoreError::Store(StoreError::Io(_))), "{err:?}");
        assert!(jobs.jobs().unwrap().is_empty());
    }

    #[test]
    fn uppercase_extension_and_path_components() {
        let (jobs, objects) = stores();
        let (_, key) = submit_document(
            &jobs,
            &objects,
            &Config::default(),
            &submission("/home/me/Q3.PDF", 80001),
        )
        .unwrap();
        assert!(key.starts_with("benfordapp/p_sarkar/Q3-"));
        assert!(key.ends_with(".pdf"));
    }

    #[test]
    fn segments_cannot_escape_their_directory() {
        assert_eq!(sanitize_segment("../etc"), "_etc");
        assert_eq!(sanitize_segment("a/b"), "a_b");
        assert_eq!(sanitize_segment(".hidden"), "hidden");
    }
}
