use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, anyhow, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use benford_core::config_file::{self, ConfigFile};
use benford_core::memory::{MemoryJobStore, MemoryObjectStore};
use benford_core::{
    AnalysisKind, BenfordReport, NlpService, PdfBackend, PlainTextBackend, ResultsResponse,
    Submission, UserId, Worker, query_results, submit_document,
};
use benford_pdf_mupdf::MupdfBackend;

mod client;
mod output;

use client::{ApiClient, ResultsReply};
use output::ColorMode;

const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Owner of documents analyzed locally.
const LOCAL_USER: UserId = UserId(1);

/// Benford's Law auditor - tabulate leading digits of the numbers in a PDF
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Base URL of the web service (overrides config and BENFORD_WEBSERVICE)
    #[arg(long, global = true)]
    webservice: Option<String>,

    /// Allow a plain http web service URL
    #[arg(long, global = true)]
    insecure: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze a document locally, without the web service
    Analyze {
        /// Path to the PDF to analyze
        file_path: PathBuf,

        /// Analysis to run: benford, sentiment, ner or pii
        #[arg(long, default_value = "benford")]
        kind: String,

        /// Treat the input as plain text, with form feeds separating pages
        #[arg(long)]
        text: bool,

        /// Fraction of page height to ignore at the top and bottom (0.0-0.5)
        #[arg(long)]
        exclude_margins: Option<f32>,

        /// Print the results artifact as stored instead of a table
        #[arg(long)]
        raw: bool,
    },

    #[command(flatten)]
    Remote(RemoteCommand),
}

/// Subcommands that talk to the web service.
#[derive(Subcommand, Debug)]
enum RemoteCommand {
    /// List registered users
    Users,

    /// List all jobs
    Jobs,

    /// Remove every job and stored document
    Reset,

    /// Upload a PDF and print the new job id
    Upload {
        file_path: PathBuf,

        #[arg(long)]
        user: i64,

        #[arg(long, default_value = "benford")]
        kind: String,
    },

    /// Show the status or results of a job
    Results {
        job_id: String,

        /// Print the results artifact as stored instead of a table
        #[arg(long)]
        raw: bool,
    },

    /// Upload a PDF and wait for its results
    Poll {
        file_path: PathBuf,

        #[arg(long)]
        user: i64,

        #[arg(long, default_value = "benford")]
        kind: String,

        /// Print the results artifact as stored instead of a table
        #[arg(long)]
        raw: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();
    let file = config_file::load_config().apply_env();
    let color = ColorMode(!cli.no_color);

    match cli.command {
        Command::Analyze {
            file_path,
            kind,
            text,
            exclude_margins,
            raw,
        } => analyze(&file, &file_path, kind.parse()?, text, exclude_margins, raw, color).await,
        Command::Remote(command) => {
            let client = connect(&file, cli.webservice, cli.insecure)?;
            remote(&file, &client, command, color).await
        }
    }
}

async fn analyze(
    file: &ConfigFile,
    file_path: &Path,
    kind: AnalysisKind,
    text: bool,
    exclude_margins: Option<f32>,
    raw: bool,
    color: ColorMode,
) -> anyhow::Result<()> {
    let mut out = std::io::stdout();
    let (file_name, data) = read_document(file_path)?;

    // Submission keys documents by a .pdf name.
    let submitted_name = if text {
        let stem = file_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        format!("{}.pdf", stem)
    } else {
        file_name.clone()
    };

    let config = Arc::new(file.core_config());
    if kind.needs_nlp() && config.nlp_endpoint.is_none() {
        bail!(
            "{} analysis needs an NLP service; set {} or [nlp] endpoint",
            kind,
            config_file::ENV_NLP_ENDPOINT
        );
    }
    let jobs = Arc::new(MemoryJobStore::new());
    jobs.add_user(LOCAL_USER, "local");
    let objects = Arc::new(MemoryObjectStore::new());

    let (job_id, data_key) = submit_document(
        jobs.as_ref(),
        objects.as_ref(),
        &config,
        &Submission {
            user_id: LOCAL_USER,
            kind,
            filename: submitted_name,
            data,
        },
    )?;

    let backend: Arc<dyn PdfBackend> = if text {
        Arc::new(PlainTextBackend)
    } else {
        let ratio = exclude_margins.unwrap_or(0.0).clamp(0.0, 0.5);
        Arc::new(
            MupdfBackend::new()
                .with_footer_exclusion(ratio)
                .with_header_exclusion(ratio),
        )
    };
    let mut worker = Worker::new(jobs.clone(), objects.clone(), backend, config.clone());
    if let Some(nlp) = config.nlp_client() {
        worker = worker.with_nlp(Arc::new(nlp) as Arc<dyn NlpService>);
    }

    writeln!(out, "Analyzing {} ({})...", file_name, kind.label())?;
    worker.process(&data_key).await?;

    match query_results(jobs.as_ref(), objects.as_ref(), job_id)? {
        ResultsResponse::Completed { contents, .. } => {
            print_artifact(&mut out, &contents, raw, color)?;
            Ok(())
        }
        ResultsResponse::Error { message } => {
            output::print_error(&mut std::io::stderr(), &message, color)?;
            bail!("analysis of {} failed", file_name)
        }
        other => bail!(
            "analysis of {} stopped at '{}'",
            file_name,
            other.status_text()
        ),
    }
}

fn connect(file: &ConfigFile, flag: Option<String>, insecure: bool) -> anyhow::Result<ApiClient> {
    let url = flag
        .or_else(|| file.client.as_ref().and_then(|c| c.webservice.clone()))
        .ok_or_else(|| {
            anyhow!(
                "no web service URL; pass --webservice or set {}",
                config_file::ENV_WEBSERVICE
            )
        })?;
    let base_url = client::validate_base_url(&url, insecure)?;
    tracing::debug!(%base_url, "using web service");
    Ok(ApiClient::new(base_url))
}

async fn remote(
    file: &ConfigFile,
    client: &ApiClient,
    command: RemoteCommand,
    color: ColorMode,
) -> anyhow::Result<()> {
    let mut out = std::io::stdout();
    match command {
        RemoteCommand::Users => output::print_users(&mut out, &client.users().await?, color)?,
        RemoteCommand::Jobs => output::print_jobs(&mut out, &client.jobs().await?, color)?,
        RemoteCommand::Reset => writeln!(out, "{}", client.reset().await?)?,
        RemoteCommand::Upload {
            file_path,
            user,
            kind,
        } => {
            let job_id = upload(client, &file_path, user, &kind).await?;
            writeln!(out, "{}", job_id)?;
        }
        RemoteCommand::Results { job_id, raw } => match client.results(&job_id).await? {
            ResultsReply::Ready(contents) => print_artifact(&mut out, &contents, raw, color)?,
            ResultsReply::Pending(status) => output::print_status(&mut out, &status, color)?,
            ResultsReply::Failed(message) => {
                output::print_error(&mut std::io::stderr(), &message, color)?;
                bail!("job {} failed", job_id);
            }
        },
        RemoteCommand::Poll {
            file_path,
            user,
            kind,
            raw,
        } => {
            let job_id = upload(client, &file_path, user, &kind).await?;
            writeln!(out, "job {}", job_id)?;
            let interval = Duration::from_millis(
                file.client
                    .as_ref()
                    .and_then(|c| c.poll_interval_ms)
                    .unwrap_or(DEFAULT_POLL_INTERVAL_MS),
            );
            poll(client, &job_id, interval, raw, color).await?;
        }
    }
    Ok(())
}

async fn upload(
    client: &ApiClient,
    file_path: &Path,
    user: i64,
    kind: &str,
) -> anyhow::Result<String> {
    let kind: AnalysisKind = kind.parse()?;
    let (file_name, data) = read_document(file_path)?;
    client.upload(UserId(user), kind, &file_name, &data).await
}

/// Re-query until the job leaves `uploaded`/`processing`, printing each new status.
async fn poll(
    client: &ApiClient,
    job_id: &str,
    interval: Duration,
    raw: bool,
    color: ColorMode,
) -> anyhow::Result<()> {
    let mut out = std::io::stdout();
    let mut last_status = String::new();
    loop {
        match client.results(job_id).await? {
            ResultsReply::Ready(contents) => {
                output::print_status(&mut out, "completed", color)?;
                return Ok(print_artifact(&mut out, &contents, raw, color)?);
            }
            ResultsReply::Failed(message) => {
                output::print_error(&mut std::io::stderr(), &message, color)?;
                bail!("job {} failed", job_id);
            }
            ResultsReply::Pending(status) => {
                if status != last_status {
                    output::print_status(&mut out, &status, color)?;
                    last_status = status;
                }
            }
        }
        tokio::time::sleep(interval).await;
    }
}

fn read_document(file_path: &Path) -> anyhow::Result<(String, Vec<u8>)> {
    if !file_path.exists() {
        bail!("File not found: {}", file_path.display());
    }
    let data = std::fs::read(file_path)
        .with_context(|| format!("reading {}", file_path.display()))?;
    let file_name = file_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| file_path.display().to_string());
    Ok((file_name, data))
}

/// Benford artifacts are shown as a table unless `raw`; anything else verbatim.
fn print_artifact(
    w: &mut dyn Write,
    contents: &[u8],
    raw: bool,
    color: ColorMode,
) -> std::io::Result<()> {
    let text = String::from_utf8_lossy(contents);
    match BenfordReport::parse(&text) {
        Ok(report) if !raw => output::print_benford_report(w, &report, color),
        _ => write!(w, "{}", text),
    }
}
