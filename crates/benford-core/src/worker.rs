//! The analysis worker: one invocation per uploaded document.
//!
//! The worker drives a [`JobTracker`] through the lifecycle while the document
//! is read page by page. PDF access happens on a blocking thread that streams
//! page text back over a channel; folding, status writes, and the final NLP
//! call stay on the async side, strictly in page order.

use std::io::Write as _;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::analysis::Analysis;
use crate::backend::{BackendError, PdfBackend};
use crate::job::{Job, JobId, JobStatus};
use crate::nlp::NlpService;
use crate::store::{JobStore, ObjectStore};
use crate::tracker::JobTracker;
use crate::{Config, CoreError};

/// Result of one worker invocation that reached a terminal state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerOutcome {
    pub job_id: JobId,
    /// `Completed` or `Error`.
    pub status: JobStatus,
    /// Key recorded against the job, if any.
    pub results_key: Option<String>,
    /// The fault message when `status` is `Error`.
    pub error: Option<String>,
}

/// Fault recorded for a run that was still going when its process stopped.
pub const INTERRUPTED: &str = "processing was interrupted before completion";

/// Where the results artifact for a document is stored: the data key with
/// its `.pdf` extension replaced by `.txt`.
pub fn results_key_for(data_key: &str) -> String {
    let stem = data_key.strip_suffix(".pdf").unwrap_or(data_key);
    format!("{}.txt", stem)
}

enum PageEvent {
    Opened { total: usize },
    Page { index: usize, text: String },
}

type PageMessage = Result<PageEvent, BackendError>;

/// Processes uploaded documents end to end.
///
/// Each call to [`process`](Worker::process) owns its own analysis state;
/// concurrent calls for different documents share nothing but the stores.
#[derive(Clone)]
pub struct Worker {
    jobs: Arc<dyn JobStore>,
    objects: Arc<dyn ObjectStore>,
    pdf: Arc<dyn PdfBackend>,
    nlp: Option<Arc<dyn NlpService>>,
    config: Arc<Config>,
}

impl Worker {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        objects: Arc<dyn ObjectStore>,
        pdf: Arc<dyn PdfBackend>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            jobs,
            objects,
            pdf,
            nlp: None,
            config,
        }
    }

    pub fn with_nlp(mut self, nlp: Arc<dyn NlpService>) -> Self {
        self.nlp = Some(nlp);
        self
    }

    /// Analyze the document stored under `data_key`.
    ///
    /// Returns `Err` only when no work was started: the key has no job, or the
    /// job already left `uploaded`. Every fault after that is recorded on the
    /// job (status `error`) and reported through the returned outcome.
    pub async fn process(&self, data_key: &str) -> Result<WorkerOutcome, CoreError> {
        let job = self
            .jobs
            .job_by_data_key(data_key)?
            .ok_or_else(|| CoreError::DataKeyNotFound(data_key.to_string()))?;

        let mut tracker = JobTracker::load(Arc::clone(&self.jobs), &job)?;
        if tracker.status() != JobStatus::Uploaded {
            return Err(CoreError::AlreadyProcessed {
                job_id: job.id,
                status: job.status.clone(),
            });
        }

        tracing::info!(job_id = %job.id, kind = %job.kind, data_key, "processing document");

        let mut results_key = None;
        match self.run(&job, &mut tracker, &mut results_key).await {
            Ok(key) => {
                tracing::info!(job_id = %job.id, results_key = %key, "job completed");
                Ok(WorkerOutcome {
                    job_id: job.id,
                    status: tracker.status(),
                    results_key: Some(key),
                    error: None,
                })
            }
            Err(err) => {
                let message = single_line(&err.to_string());
                tracing::warn!(job_id = %job.id, error = %message, "job failed");
                let recorded = self.record_failure(&mut tracker, results_key.as_deref(), &message);
                Ok(WorkerOutcome {
                    job_id: job.id,
                    status: tracker.status(),
                    results_key: recorded,
                    error: Some(message),
                })
            }
        }
    }

    /// Settle jobs left behind by a previous process.
    ///
    /// Runs caught part way (`processing ...`) are moved to `error` with an
    /// [`INTERRUPTED`] artifact once their results key was bound. Returns the
    /// data keys of jobs still `uploaded`, in id order, so they can be queued
    /// again. Call before any run starts.
    pub fn recover(&self) -> Result<Vec<String>, CoreError> {
        let mut pending = Vec::new();
        for job in self.jobs.jobs()? {
            let status = match job.status.parse::<JobStatus>() {
                Ok(status) => status,
                Err(e) => {
                    tracing::warn!(job_id = %job.id, error = %e, "skipping job with unreadable status");
                    continue;
                }
            };
            match status {
                JobStatus::Uploaded => pending.push(job.data_key),
                JobStatus::Starting | JobStatus::PageCompleted { .. } => {
                    tracing::warn!(job_id = %job.id, status = %job.status, "marking interrupted job as failed");
                    let results_key = matches!(status, JobStatus::PageCompleted { .. })
                        .then(|| results_key_for(&job.data_key));
                    let mut tracker = JobTracker::new(Arc::clone(&self.jobs), job.id, status);
                    self.record_failure(&mut tracker, results_key.as_deref(), INTERRUPTED);
                }
                JobStatus::Completed | JobStatus::Error => {}
            }
        }
        Ok(pending)
    }

    async fn run(
        &self,
        job: &Job,
        tracker: &mut JobTracker,
        results_key: &mut Option<String>,
    ) -> Result<String, CoreError> {
        if Path::new(&job.data_key).extension().and_then(|e| e.to_str()) != Some("pdf") {
            return Err(CoreError::InvalidInput(
                "expecting document to have .pdf extension".into(),
            ));
        }

        tracker.start()?;

        let data = self.objects.get(&job.data_key)?;
        let (tx, mut rx) = mpsc::channel::<PageMessage>(1);
        let pdf = Arc::clone(&self.pdf);
        let reader = tokio::task::spawn_blocking(move || read_pages(pdf.as_ref(), &data, &tx));

        let total = match rx.recv().await {
            Some(Ok(PageEvent::Opened { total })) => total,
            Some(Ok(PageEvent::Page { .. })) => {
                return Err(CoreError::Internal("page received before open".into()));
            }
            Some(Err(e)) => return Err(e.into()),
            None => return Err(reader_stopped(reader).await),
        };
        if total == 0 {
            return Err(CoreError::EmptyDocument);
        }
        let total_u32 = u32::try_from(total).map_err(|_| CoreError::TooManyPages(total))?;

        let mut analysis = Analysis::new(job.kind);
        for expected in 0..total {
            let text = match rx.recv().await {
                Some(Ok(PageEvent::Page { index, text })) if index == expected => text,
                Some(Ok(_)) => {
                    return Err(CoreError::Internal(format!(
                        "page {} arrived out of order",
                        expected + 1
                    )));
                }
                Some(Err(e)) => return Err(e.into()),
                None => return Err(reader_stopped(reader).await),
            };

            analysis.fold_page(&text);
            tracing::debug!(
                job_id = %job.id,
                page = expected + 1,
                total,
                text_len = text.len(),
                "page processed"
            );

            if results_key.is_none() {
                *results_key = Some(results_key_for(&job.data_key));
            }
            // `expected < total <= u32::MAX`, so the cast is lossless.
            tracker.page_completed(expected as u32 + 1, total_u32)?;
        }

        reader
            .await
            .map_err(|e| CoreError::Internal(format!("page reader failed: {}", e)))?;

        let artifact = analysis
            .finish(total, self.nlp.as_deref(), self.config.nlp_max_text_bytes)
            .await?;

        let key = results_key_for(&job.data_key);
        self.objects.put(&key, artifact.as_bytes())?;
        self.jobs.set_results_key(job.id, &key)?;
        tracker.complete()?;
        Ok(key)
    }

    /// Best-effort error recording: write the message to the results location
    /// (when one was bound), record that key, then move the job to `error`.
    /// Returns the results key recorded against the job, if any.
    fn record_failure(
        &self,
        tracker: &mut JobTracker,
        results_key: Option<&str>,
        message: &str,
    ) -> Option<String> {
        let job_id = tracker.job_id();
        let mut recorded = None;

        if let Some(key) = results_key {
            let artifact = format!("{}\n", message);
            let written = self
                .objects
                .put(key, artifact.as_bytes())
                .and_then(|()| self.jobs.set_results_key(job_id, key));
            match written {
                Ok(()) => recorded = Some(key.to_string()),
                Err(e) => {
                    tracing::warn!(%job_id, error = %e, "could not write error artifact");
                    // A key set by a half-finished success path would point at a
                    // stale report; clear it.
                    if let Err(e) = self.jobs.set_results_key(job_id, "") {
                        tracing::warn!(%job_id, error = %e, "could not clear results key");
                    }
                }
            }
        }

        if let Err(e) = tracker.fail() {
            tracing::error!(%job_id, error = %e, "could not mark job as failed");
        }
        recorded
    }
}

/// Blocking half of the page pipeline. Stops early if the receiver is gone.
fn read_pages(pdf: &dyn PdfBackend, data: &[u8], tx: &mpsc::Sender<PageMessage>) {
    let result = (|| -> Result<(), BackendError> {
        let mut staged = tempfile::Builder::new().suffix(".pdf").tempfile()?;
        staged.write_all(data)?;
        staged.flush()?;

        let mut source = pdf.open(staged.path())?;
        let total = source.page_count();
        if tx.blocking_send(Ok(PageEvent::Opened { total })).is_err() {
            return Ok(());
        }
        for index in 0..total {
            let text = source.page_text(index)?;
            if tx.blocking_send(Ok(PageEvent::Page { index, text })).is_err() {
                return Ok(());
            }
        }
        Ok(())
    })();

    if let Err(e) = result {
        let _ = tx.blocking_send(Err(e));
    }
}

/// Fault text as one line; the read path only reports an artifact's first line.
fn single_line(message: &str) -> String {
    message
        .split(['\r', '\n'])
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

async fn reader_stopped(reader: tokio::task::JoinHandle<()>) -> CoreError {
    match reader.await {
        Ok(()) => CoreError::Internal("page reader stopped early".into()),
        Err(e) => CoreError::Internal(format!("page reader failed: {}", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn results_key_replaces_pdf_extension() {
        assert_eq!(
            results_key_for("benfordapp/alice/report-1234.pdf"),
            "benfordapp/alice/report-1234.txt"
        );
        assert_eq!(results_key_for("plain"), "plain.txt");
    }

    #[test]
    fn fault_text_is_folded_onto_one_line() {
        assert_eq!(single_line("disk full"), "disk full");
        assert_eq!(single_line("HTTP 500: <p>\r\n  down\n\n</p>"), "HTTP 500: <p> down </p>");
    }
}
