use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use cacheburn_benchmark::{discover_model, list_models, OpenAiBackend, WorkloadGenerator};
use cacheburn_core::{
    normalize_endpoint, CacheBurnError, CapacityTable, ReportConfig, ReportFormat, RunConfig,
    WorkloadConfig, DEFAULT_REPORT_INTERVAL_SECS,
};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cacheburn")]
#[command(about = "CacheBurn - KV cache offload soak test for OpenAI-compatible servers", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct EndpointArgs {
    /// Server endpoint, e.g. localhost:8000 or http://host:8000/v1/completions
    #[arg(short, long)]
    endpoint: String,

    /// API key sent as a bearer token
    #[arg(short, long, env = "OPENAI_API_KEY")]
    api_key: String,
}

#[derive(Args)]
struct WorkloadArgs {
    #[command(flatten)]
    endpoint: EndpointArgs,

    /// Model to size the workload for (default: first model the server lists)
    #[arg(short, long)]
    model: Option<String>,

    /// Capacity table to use instead of the built-in one
    #[arg(long)]
    model_configs: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Drive the endpoint indefinitely and report statistics
    Benchmark {
        #[command(flatten)]
        workload: WorkloadArgs,

        /// Seconds between statistics reports
        #[arg(long, default_value_t = DEFAULT_REPORT_INTERVAL_SECS)]
        report_interval: u64,

        /// Report format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print the workload that would be generated, without sending load
    Workload {
        #[command(flatten)]
        workload: WorkloadArgs,
    },

    /// List models served by the endpoint
    Models {
        #[command(flatten)]
        endpoint: EndpointArgs,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("cacheburn=info,cacheburn_benchmark=info,cacheburn_core=info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Benchmark {
            workload,
            report_interval,
            format,
        } => cmd_benchmark(workload, report_interval, &format).await,
        Commands::Workload { workload } => cmd_workload(workload).await,
        Commands::Models { endpoint } => cmd_models(endpoint).await,
    }
}

fn run_config(args: &EndpointArgs) -> Result<RunConfig> {
    info!("endpoint: {}", args.endpoint);
    let endpoint = normalize_endpoint(&args.endpoint)
        .with_context(|| format!("Invalid endpoint: {}", args.endpoint))?;
    info!("normalized endpoint: {}", endpoint);
    Ok(RunConfig::new(endpoint, args.api_key.clone()))
}

async fn resolve_model(config: &RunConfig, model: Option<String>) -> Result<String> {
    if let Some(model) = model {
        return Ok(model);
    }
    match discover_model(&config.endpoint, &config.api_key).await {
        Ok(model) => Ok(model),
        Err(CacheBurnError::Connection(e)) => {
            error!("Could not connect to endpoint: {}", e);
            eprintln!();
            eprintln!("[ERROR] Could not connect to endpoint: {}", config.endpoint);
            eprintln!("Make sure a model server is running and accessible.");
            eprintln!("Try: curl {}models", config.endpoint);
            eprintln!();
            std::process::exit(1);
        }
        Err(e) => {
            Err(e).with_context(|| format!("Failed to query models from {}", config.endpoint))
        }
    }
}

async fn resolve_workload(config: &RunConfig, args: &WorkloadArgs) -> Result<WorkloadConfig> {
    let model = resolve_model(config, args.model.clone()).await?;

    let table = match &args.model_configs {
        Some(path) => CapacityTable::from_path(path)
            .with_context(|| format!("Failed to load capacity table from {:?}", path))?,
        None => CapacityTable::builtin().context("Built-in capacity table is invalid")?,
    };

    let record = table.lookup(&model)?;
    let workload = WorkloadConfig::from_capacity(record, &config.sizing)?;
    Ok(workload)
}

async fn cmd_workload(args: WorkloadArgs) -> Result<()> {
    let config = run_config(&args.endpoint)?;
    let workload = resolve_workload(&config, &args).await?;

    println!("{}", workload);
    if let Err(e) = workload.validate() {
        println!("Not runnable: {}", e);
    }
    Ok(())
}

async fn cmd_benchmark(args: WorkloadArgs, report_interval: u64, format: &str) -> Result<()> {
    let format = ReportFormat::parse(format)
        .with_context(|| format!("Unknown report format: {} (expected text or json)", format))?;

    let mut config = run_config(&args.endpoint)?;
    config.report = ReportConfig {
        interval_secs: report_interval,
        format,
    };

    let workload = resolve_workload(&config, &args).await?;
    match config.report.format {
        ReportFormat::Json => println!("{}", serde_json::to_string(&workload)?),
        ReportFormat::Text => println!("{}", workload),
    }

    let backend = Arc::new(OpenAiBackend::new(&config.endpoint, &config.api_key));
    let generator = WorkloadGenerator::new(workload, backend)?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, shutting down");
            on_signal.cancel();
        }
    });

    let stats = generator.run(&config.report, cancel).await?;
    info!(
        requests = stats.num_requests(),
        failed = stats.total_failed(),
        "Benchmark stopped"
    );
    Ok(())
}

async fn cmd_models(args: EndpointArgs) -> Result<()> {
    let config = run_config(&args)?;
    let models = list_models(&config.endpoint, &config.api_key)
        .await
        .with_context(|| format!("Failed to query models from {}", config.endpoint))?;

    println!();
    println!("Available Models:");
    println!("{:-<65}", "");
    for (i, id) in models.iter().enumerate() {
        println!("  {:<4} {}", i + 1, id);
    }
    println!();
    Ok(())
}
