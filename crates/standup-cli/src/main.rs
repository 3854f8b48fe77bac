use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use narrative::fallback::FallbackStrategy;
use narrative::pipeline::DEFAULT_WORKERS;
use narrative::remote::probe_endpoint;
use narrative::{OllamaClient, StandupPipeline, SummaryStyle, TracingObserver};
use standup_cli::{load_snapshot, render_report, resolve_config, Overrides};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug-level logging (RUST_LOG still wins when set)
    #[arg(long, global = true, default_value_t = false)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a standup narrative from a tracker export
    Run(RunArgs),
    /// Check that the generation endpoint is reachable
    Health(EndpointArgs),
}

#[derive(Args, Debug)]
struct EndpointArgs {
    /// Generation endpoint base URL (overrides STANDUP_LLM_URL)
    #[arg(long)]
    llm_url: Option<String>,

    /// Model name (overrides STANDUP_LLM_MODEL)
    #[arg(long)]
    model: Option<String>,

    /// Request timeout in seconds (overrides STANDUP_LLM_TIMEOUT_SECS)
    #[arg(long)]
    timeout_secs: Option<u64>,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Tracker export: a snapshot object or an array of issues (JSON)
    #[arg(long, short)]
    input: PathBuf,

    /// technical, business or brief
    #[arg(long)]
    style: Option<SummaryStyle>,

    /// Maximum narrative length in characters
    #[arg(long)]
    max_length: Option<usize>,

    /// strict, minimal or graceful
    #[arg(long)]
    fallback: Option<FallbackStrategy>,

    /// Generate through the remote endpoint instead of local rules
    #[arg(long, default_value_t = false)]
    remote: bool,

    /// Retries after the first remote attempt (overrides STANDUP_LLM_MAX_RETRIES)
    #[arg(long)]
    max_retries: Option<u32>,

    #[command(flatten)]
    endpoint: EndpointArgs,

    /// Concurrent per-issue analyses
    #[arg(long, default_value_t = DEFAULT_WORKERS)]
    workers: usize,

    /// Print the full report as JSON
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let default_level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_level.into()),
        )
        .init();

    match cli.command {
        Command::Run(args) => run(cli.config, args).await,
        Command::Health(args) => health(cli.config, args).await,
    }
}

async fn run(config_path: Option<PathBuf>, args: RunArgs) -> Result<()> {
    let overrides = Overrides {
        style: args.style,
        max_length: args.max_length,
        fallback: args.fallback,
        llm_url: args.endpoint.llm_url,
        model: args.endpoint.model,
        timeout_secs: args.endpoint.timeout_secs,
        max_retries: args.max_retries,
    };
    let config = resolve_config(config_path.as_deref(), &overrides)?;
    let snapshot = load_snapshot(&args.input)?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling run");
            on_signal.cancel();
        }
    });

    let pipeline = if args.remote {
        let client = OllamaClient::new(&config.remote)?;
        info!(url = %config.remote.base_url, model = %config.remote.model, "Using remote generation");
        StandupPipeline::remote(config.synthesis.clone(), Arc::new(client), config.remote.clone())
    } else {
        StandupPipeline::rule_based(config.synthesis.clone())
    };
    let pipeline = pipeline
        .with_workers(args.workers)
        .with_observer(Arc::new(TracingObserver))
        .with_cancellation(cancel);

    let report = pipeline.run(&snapshot).await?;
    print!("{}", render_report(&report, args.json)?);
    if args.json {
        println!();
    }
    Ok(())
}

async fn health(config_path: Option<PathBuf>, args: EndpointArgs) -> Result<()> {
    let overrides = Overrides {
        llm_url: args.llm_url,
        model: args.model,
        timeout_secs: args.timeout_secs,
        ..Default::default()
    };
    let config = resolve_config(config_path.as_deref(), &overrides)?;
    let client = OllamaClient::new(&config.remote)?;
    probe_endpoint(&client).await?;
    println!(
        "ok: {} reachable (model {})",
        config.remote.base_url, config.remote.model
    );
    Ok(())
}
