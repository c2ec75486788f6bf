//! Worker pool fed by data keys.
//!
//! Each stored document's key is sent over an `async_channel`; a fixed number
//! of runner tasks pull keys and call [`Worker::process`]. Runs share nothing
//! but the stores, so the pool size only bounds how many documents are read at
//! once.

use benford_core::{CoreError, Worker};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct WorkerPool {
    key_tx: async_channel::Sender<String>,
    pool_handle: JoinHandle<()>,
}

impl WorkerPool {
    /// Create a pool with `num_workers` runner tasks.
    pub fn new(worker: Worker, cancel: CancellationToken, num_workers: usize) -> Self {
        let (key_tx, key_rx) = async_channel::unbounded::<String>();

        let pool_handle = tokio::spawn(async move {
            let mut handles = Vec::with_capacity(num_workers.max(1));
            for runner in 0..num_workers.max(1) {
                handles.push(tokio::spawn(runner_loop(
                    runner,
                    key_rx.clone(),
                    worker.clone(),
                    cancel.clone(),
                )));
            }
            drop(key_rx);

            for h in handles {
                let _ = h.await;
            }
        });

        Self {
            key_tx,
            pool_handle,
        }
    }

    /// Get a cloneable sender for dispatching data keys.
    pub fn sender(&self) -> async_channel::Sender<String> {
        self.key_tx.clone()
    }

    /// Close the queue and wait for in-flight and queued documents to finish.
    pub async fn shutdown(self) {
        self.key_tx.close();
        let _ = self.pool_handle.await;
    }
}

async fn runner_loop(
    runner: usize,
    keys: async_channel::Receiver<String>,
    worker: Worker,
    cancel: CancellationToken,
) {
    loop {
        let key = tokio::select! {
            _ = cancel.cancelled() => break,
            key = keys.recv() => match key {
                Ok(key) => key,
                Err(_) => break,
            },
        };

        match worker.process(&key).await {
            Ok(outcome) => {
                tracing::debug!(runner, job_id = %outcome.job_id, status = %outcome.status, "document finished");
            }
            Err(e @ (CoreError::AlreadyProcessed { .. } | CoreError::DataKeyNotFound(_))) => {
                tracing::warn!(runner, data_key = %key, error = %e, "document skipped");
            }
            Err(e) => {
                tracing::error!(runner, data_key = %key, error = %e, "document could not be processed");
            }
        }
    }
    tracing::debug!(runner, "runner stopped");
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use benford_core::memory::{MemoryJobStore, MemoryObjectStore};
    use benford_core::{
        AnalysisKind, Config, JobStore, PlainTextBackend, Submission, UserId, submit_document,
    };

    use super::*;

    #[tokio::test]
    async fn queued_documents_are_processed_before_shutdown() {
        let jobs = Arc::new(MemoryJobStore::new());
        jobs.add_user(UserId(1), "auditor");
        let objects = Arc::new(MemoryObjectStore::new());
        let config = Arc::new(Config::default());
        let worker = Worker::new(
            jobs.clone(),
            objects.clone(),
            Arc::new(PlainTextBackend),
            config.clone(),
        );
        let pool = WorkerPool::new(worker, CancellationToken::new(), 2);

        for i in 0..5 {
            let (_, key) = submit_document(
                jobs.as_ref(),
                objects.as_ref(),
                &config,
                &Submission {
                    user_id: UserId(1),
                    kind: AnalysisKind::Benford,
                    filename: format!("doc{i}.pdf"),
                    data: format!("{i}1 {i}2").into_bytes(),
                },
            )
            .unwrap();
            pool.sender().send(key).await.unwrap();
        }
        pool.shutdown().await;

        let all = jobs.jobs().unwrap();
        assert_eq!(all.len(), 5);
        assert!(all.iter().all(|j| j.status == "completed"), "{all:?}");
    }
}
