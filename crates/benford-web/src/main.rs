use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use benford_core::config_file::{self, ConfigFile};
use benford_core::{JobStore, NlpService, ObjectStore, Worker};
use benford_pdf_mupdf::MupdfBackend;
use benford_store::{FsObjectStore, SqliteJobStore};
use benford_web::AppState;
use benford_web::dispatch::WorkerPool;

const DEFAULT_BIND: &str = "0.0.0.0:5001";
const DEFAULT_WORKERS: usize = 4;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let file: ConfigFile = config_file::load_config().apply_env();
    let config = Arc::new(file.core_config());
    let server = file.server.clone().unwrap_or_default();

    let db_path = file.db_path();
    let jobs = Arc::new(
        SqliteJobStore::open(&db_path)
            .with_context(|| format!("opening job database {}", db_path.display()))?,
    );
    for username in server.seed_users.iter().flatten() {
        let id = jobs.add_user(username, "")?;
        tracing::info!(%id, username, "user registered");
    }

    let object_dir = file.object_dir();
    let objects = Arc::new(
        FsObjectStore::open(&object_dir)
            .with_context(|| format!("opening object store {}", object_dir.display()))?,
    );

    let jobs: Arc<dyn JobStore> = jobs;
    let objects: Arc<dyn ObjectStore> = objects;

    let mut worker = Worker::new(
        Arc::clone(&jobs),
        Arc::clone(&objects),
        Arc::new(MupdfBackend::new()),
        Arc::clone(&config),
    );
    match config.nlp_client() {
        Some(client) => {
            tracing::info!(endpoint = ?config.nlp_endpoint, "NLP service configured");
            worker = worker.with_nlp(Arc::new(client) as Arc<dyn NlpService>);
        }
        None => tracing::warn!("no NLP endpoint configured; sentiment, ner and pii jobs will fail"),
    }

    let leftover = worker
        .recover()
        .context("recovering jobs from the previous run")?;

    let cancel = CancellationToken::new();
    let num_workers = server.max_concurrent_jobs.unwrap_or(DEFAULT_WORKERS);
    let pool = WorkerPool::new(worker, cancel.clone(), num_workers);
    if !leftover.is_empty() {
        tracing::info!(count = leftover.len(), "requeueing documents from the previous run");
    }
    for data_key in leftover {
        pool.sender()
            .send(data_key)
            .await
            .context("requeueing document")?;
    }

    let state = Arc::new(AppState {
        jobs,
        objects,
        config,
        dispatch: pool.sender(),
    });
    let app = benford_web::router(state);

    let bind = server.bind.as_deref().unwrap_or(DEFAULT_BIND);
    let addr: SocketAddr = bind
        .parse()
        .with_context(|| format!("invalid bind address '{}'", bind))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, db = %db_path.display(), objects = %object_dir.display(), num_workers, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
        })
        .await?;

    tracing::info!("draining queued documents");
    let drain = pool.shutdown();
    tokio::pin!(drain);
    tokio::select! {
        _ = &mut drain => {}
        _ = tokio::signal::ctrl_c() => {
            // Queued documents stay `uploaded` and are requeued on the next start.
            tracing::warn!("second interrupt, abandoning queued documents");
            cancel.cancel();
            drain.await;
        }
    }
    Ok(())
}
