use disk_assistant::config::Config;
use disk_assistant::dispatch::Dispatcher;
use disk_assistant::envelope::Envelope;
use disk_assistant::jobs::runner::wait_for_terminal;
use disk_assistant::tools::builtins::jobs::format_job_status;

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How long shutdown waits for running jobs.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);
/// Poll interval for `call --wait`.
const WAIT_POLL: Duration = Duration::from_millis(250);
/// Upper bound for `call --wait`.
const WAIT_TIMEOUT: Duration = Duration::from_secs(3600);

#[derive(Parser, Debug)]
#[command(
    name = "disk-assistant",
    version,
    about = "Disk maintenance tools with background migration jobs"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve newline-delimited JSON requests on stdin/stdout
    Serve,
    /// Print the tool catalogue
    Tools,
    /// Dispatch a single tool call and print the envelope
    Call {
        /// Tool name
        tool: String,
        /// Arguments as a JSON object
        #[arg(long)]
        args: Option<String>,
        /// For background jobs, wait until the job finishes
        #[arg(long)]
        wait: bool,
    },
    /// Inspect background jobs
    Jobs {
        #[command(subcommand)]
        action: JobsAction,
    },
    /// Write the default configuration file
    Init,
}

#[derive(Subcommand, Debug)]
enum JobsAction {
    /// Print a stored job record
    Show {
        /// Job identifier
        id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| disk_assistant::assistant_home().join("config.yaml"));

    // An explicit --config must exist; the default location may be absent.
    let optional = cli.config.is_none();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Init => init_config(&config_path).await,
        Command::Serve => serve(&open(&config_path, optional).await?).await,
        Command::Tools => {
            let dispatcher = open(&config_path, optional).await?;
            let tools = dispatcher.registry().list();
            println!("{}", serde_json::to_string_pretty(&tools)?);
            Ok(())
        }
        Command::Call { tool, args, wait } => {
            let dispatcher = open(&config_path, optional).await?;
            call(&dispatcher, &tool, args.as_deref(), wait).await
        }
        Command::Jobs {
            action: JobsAction::Show { id },
        } => {
            let dispatcher = open(&config_path, optional).await?;
            let job = dispatcher
                .store()
                .get(&id)
                .await
                .with_context(|| format!("failed to load job {id}"))?;
            println!("{}", format_job_status(&job));
            Ok(())
        }
    }
}

/// Load the configuration, start logging, and build the dispatcher.
async fn open(config_path: &Path, optional: bool) -> anyhow::Result<Dispatcher> {
    let cfg = Config::load(config_path, optional).await?;
    init_tracing(&cfg);
    info!(path = %config_path.display(), "configuration loaded");
    Ok(Dispatcher::from_config(&cfg))
}

/// Console logs go to stderr (stdout carries the protocol); a JSON copy
/// goes to the operator log file.
fn init_tracing(cfg: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_path = cfg.logs_dir.join("disk-assistant.log");
    let (file_layer, file_err) = match disk_assistant::logs::JsonFileLayer::open(&log_path) {
        Ok(layer) => (Some(layer), None),
        Err(e) => (None, Some(e)),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(file_layer)
        .init();

    if let Some(e) = file_err {
        warn!(path = %log_path.display(), error = %e, "operator log file disabled");
    }
}

async fn serve(dispatcher: &Dispatcher) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("received Ctrl-C, shutting down…");
                cancel.cancel();
            }
        });
    }

    info!(tools = dispatcher.registry().len(), "disk assistant ready");
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let handled =
        disk_assistant::server::serve(dispatcher, stdin, tokio::io::stdout(), cancel).await?;
    info!(handled, "request loop finished");

    let running = dispatcher.runner().active_jobs();
    if running > 0 {
        info!(running, "waiting for running jobs to finish…");
    }
    if !dispatcher.runner().drain(DRAIN_TIMEOUT).await {
        warn!(
            running = dispatcher.runner().active_jobs(),
            "jobs still running at shutdown"
        );
    }

    info!("shutdown complete");
    Ok(())
}

async fn call(
    dispatcher: &Dispatcher,
    tool: &str,
    args: Option<&str>,
    wait: bool,
) -> anyhow::Result<()> {
    let args = match args {
        Some(raw) => serde_json::from_str(raw).context("--args must be a JSON object")?,
        None => serde_json::json!({}),
    };

    let envelope = dispatcher.dispatch(tool, args).await;
    println!("{}", serde_json::to_string_pretty(&envelope)?);

    match (&envelope, wait) {
        (Envelope::JobAccepted(id), true) => {
            let job = wait_for_terminal(dispatcher.store().as_ref(), id, WAIT_POLL, WAIT_TIMEOUT)
                .await
                .with_context(|| format!("failed to poll job {id}"))?;
            println!("{}", format_job_status(&job));
        }
        (Envelope::JobAccepted(_), false) => {
            // The process is about to exit; let the job finish first.
            dispatcher.runner().drain(DRAIN_TIMEOUT).await;
        }
        _ => {}
    }

    if envelope.is_ok() {
        Ok(())
    } else {
        anyhow::bail!("{}", envelope.to_text())
    }
}

async fn init_config(path: &Path) -> anyhow::Result<()> {
    if tokio::fs::try_exists(path).await.unwrap_or(false) {
        println!("Config already exists at {}", path.display());
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    Config::default().save(path).await?;
    println!("Wrote default config to {}", path.display());
    Ok(())
}
