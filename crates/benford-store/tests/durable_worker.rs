//! The worker and read path running against the on-disk stores.

use std::sync::Arc;

use benford_core::query::UNKNOWN_ERROR;
use benford_core::worker::INTERRUPTED;
use benford_core::{
    AnalysisKind, Config, JobId, JobStore, ObjectStore, PlainTextBackend, ResultsResponse,
    Submission, UserId, Worker, query_results, submit_document,
};
use benford_store::{FsObjectStore, SqliteJobStore};

fn submit(
    jobs: &SqliteJobStore,
    objects: &FsObjectStore,
    user: UserId,
    name: &str,
) -> (JobId, String) {
    submit_document(
        jobs,
        objects,
        &Config::default(),
        &Submission {
            user_id: user,
            kind: AnalysisKind::Benford,
            filename: name.into(),
            data: b"31 47\x0C59".to_vec(),
        },
    )
    .unwrap()
}

#[tokio::test]
async fn completed_job_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("db").join("jobs.sqlite");
    let data_dir = dir.path().join("objects");

    let job_id = {
        let jobs = Arc::new(SqliteJobStore::open(&db_path).unwrap());
        let objects = Arc::new(FsObjectStore::open(&data_dir).unwrap());
        let user = jobs.add_user("p_sarkar", "").unwrap();
        let config = Arc::new(Config::default());

        let (job_id, data_key) = submit_document(
            jobs.as_ref(),
            objects.as_ref(),
            &config,
            &Submission {
                user_id: user,
                kind: AnalysisKind::Benford,
                filename: "q3.pdf".into(),
                data: b"Revenue was 4021 and costs 512, with 99 units.\x0C1 1 1".to_vec(),
            },
        )
        .unwrap();

        let worker = Worker::new(
            jobs.clone(),
            objects.clone(),
            Arc::new(PlainTextBackend),
            config,
        );
        let outcome = worker.process(&data_key).await.unwrap();
        assert!(outcome.error.is_none(), "{:?}", outcome.error);
        job_id
    };

    let jobs = SqliteJobStore::open(&db_path).unwrap();
    let objects = FsObjectStore::open(&data_dir).unwrap();
    let job = jobs.job(job_id).unwrap().unwrap();
    assert_eq!(job.status, "completed");
    assert!(objects.exists(&job.results_key).unwrap());

    match query_results(&jobs, &objects, job_id).unwrap() {
        ResultsResponse::Completed { contents, .. } => assert_eq!(
            String::from_utf8(contents).unwrap(),
            "2 pages\n0 0\n1 3\n2 0\n3 0\n4 1\n5 1\n6 0\n7 0\n8 0\n9 1\n"
        ),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn reset_empties_both_stores() {
    let dir = tempfile::tempdir().unwrap();
    let jobs = SqliteJobStore::open(&dir.path().join("jobs.sqlite")).unwrap();
    let objects = FsObjectStore::open(dir.path().join("objects")).unwrap();
    let user = jobs.add_user("p_sarkar", "").unwrap();
    let config = Config::default();

    for name in ["a.pdf", "b.pdf"] {
        submit_document(
            &jobs,
            &objects,
            &config,
            &Submission {
                user_id: user,
                kind: AnalysisKind::Benford,
                filename: name.into(),
                data: b"12".to_vec(),
            },
        )
        .unwrap();
    }
    assert_eq!(jobs.jobs().unwrap().len(), 2);

    jobs.reset().unwrap();
    let removed = objects.delete_prefix(&format!("{}/", config.key_prefix)).unwrap();
    assert_eq!(removed, 2);
    assert!(jobs.jobs().unwrap().is_empty());
    assert!(objects.keys().unwrap().is_empty());
    assert_eq!(jobs.users().unwrap().len(), 1);
}

#[tokio::test]
async fn restart_requeues_uploaded_and_fails_interrupted_runs() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("jobs.sqlite");
    let data_dir = dir.path().join("objects");

    let (queued, starting, midway) = {
        let jobs = SqliteJobStore::open(&db_path).unwrap();
        let objects = FsObjectStore::open(&data_dir).unwrap();
        let user = jobs.add_user("p_sarkar", "").unwrap();
        let queued = submit(&jobs, &objects, user, "queued.pdf");
        let (starting, _) = submit(&jobs, &objects, user, "starting.pdf");
        let (midway, _) = submit(&jobs, &objects, user, "midway.pdf");
        jobs.update_status(starting, "processing - starting").unwrap();
        jobs.update_status(midway, "processing - page 1 of 2 completed")
            .unwrap();
        (queued, starting, midway)
    };

    let jobs = Arc::new(SqliteJobStore::open(&db_path).unwrap());
    let objects = Arc::new(FsObjectStore::open(&data_dir).unwrap());
    let worker = Worker::new(
        jobs.clone(),
        objects.clone(),
        Arc::new(PlainTextBackend),
        Arc::new(Config::default()),
    );

    let pending = worker.recover().unwrap();
    assert_eq!(pending, vec![queued.1.clone()]);

    assert_eq!(jobs.job(starting).unwrap().unwrap().status, "error");
    assert_eq!(
        query_results(jobs.as_ref(), objects.as_ref(), starting).unwrap(),
        ResultsResponse::Error {
            message: UNKNOWN_ERROR.into()
        }
    );
    assert_eq!(jobs.job(midway).unwrap().unwrap().status, "error");
    assert_eq!(
        query_results(jobs.as_ref(), objects.as_ref(), midway).unwrap(),
        ResultsResponse::Error {
            message: INTERRUPTED.into()
        }
    );

    let outcome = worker.process(&pending[0]).await.unwrap();
    assert_eq!(outcome.job_id, queued.0);
    assert!(outcome.error.is_none(), "{:?}", outcome.error);
    assert!(worker.recover().unwrap().is_empty());
}
