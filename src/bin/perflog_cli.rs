use clap::{Parser, Subcommand};
use log::info;
use perflog::ingestion::{IngestRequest, IngestionError, IngestionService, QueryRequest};
use perflog::{
    GroupBy, LogFormat, LogId, LogState, PerfLogConfig, PerfLogError, PerfLogResult,
    SledLogStore,
};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Overrides the configured storage directory
    #[arg(long)]
    storage: Option<PathBuf>,

    /// Overrides the configured log level
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a log file and wait until it is ready or failed
    Ingest {
        /// Path to the log file
        path: PathBuf,
        /// Display name; defaults to the file name
        #[arg(long)]
        name: Option<String>,
        /// Label as key=value, repeatable
        #[arg(short, long = "label", value_parser = parse_label)]
        labels: Vec<(String, String)>,
        /// jtl, csv or tsv; sniffed when omitted
        #[arg(long)]
        format: Option<LogFormat>,
        /// Parse timeout in seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
    /// Show the status of one log
    Status {
        id: LogId,
    },
    /// List logs, optionally filtered by a label selector
    List {
        #[arg(short, long)]
        selector: Option<String>,
    },
    /// Windowed stats for every ready log matching a selector
    Query {
        selector: String,
        #[arg(short, long, default_value_t = 60_000)]
        window_ms: u64,
        /// none, label or code
        #[arg(short, long, default_value = "none")]
        group_by: GroupBy,
        /// Only aggregate samples matching this selector over
        /// `label`, `success` and `code`
        #[arg(long)]
        samples: Option<String>,
    },
    /// Whole-log stats for one ready log
    Summary {
        id: LogId,
        #[arg(short, long, default_value = "none")]
        group_by: GroupBy,
    },
    /// Latency histogram and percentile curve for one ready log
    Histogram {
        id: LogId,
        #[arg(short, long, default_value = "none")]
        group_by: GroupBy,
    },
    /// Delete a log and everything derived from it
    Delete {
        id: LogId,
    },
}

fn parse_label(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("expected key=value, got '{}'", raw)),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> PerfLogResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn handle_ingest(
    service: &IngestionService,
    path: PathBuf,
    name: Option<String>,
    labels: Vec<(String, String)>,
    format: Option<LogFormat>,
    timeout_secs: Option<u64>,
) -> PerfLogResult<()> {
    let content = fs::read(&path)?;
    let name = name.unwrap_or_else(|| {
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string())
    });

    let mut request = IngestRequest::new(name, content).with_labels(labels.into_iter().collect());
    if let Some(format) = format {
        request = request.with_format(format);
    }
    if let Some(secs) = timeout_secs {
        request = request.with_parse_timeout(std::time::Duration::from_secs(secs));
    }

    let id = service.ingest(request).await?;
    let status = service.wait(id).await?;
    print_json(&status)?;
    match status.state {
        LogState::Ready => Ok(()),
        state => Err(PerfLogError::Ingestion(IngestionError::invalid_state(
            id,
            state,
            format!("ingest ({})", status.failure.as_deref().unwrap_or("unknown failure")),
        ))),
    }
}

async fn run(cli: Cli) -> PerfLogResult<()> {
    let mut config = PerfLogConfig::load(cli.config.as_deref())?;
    if let Some(storage) = cli.storage {
        config.storage_path = storage;
    }
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }
    perflog::logging::init(&config.log_level)?;

    info!("Opening store at {}", config.storage_path.display());
    let store = SledLogStore::open(&config.storage_path)?;
    let service = IngestionService::new(Arc::new(store), config.ingestion.clone())?;

    let recovered = service.recover_interrupted().await?;
    if !recovered.is_empty() {
        info!("Marked {} interrupted logs as failed", recovered.len());
    }

    match cli.command {
        Commands::Ingest {
            path,
            name,
            labels,
            format,
            timeout_secs,
        } => handle_ingest(&service, path, name, labels, format, timeout_secs).await?,
        Commands::Status { id } => print_json(&service.get_status(id).await?)?,
        Commands::List { selector } => {
            print_json(&service.list_logs(selector.as_deref()).await?)?
        }
        Commands::Query {
            selector,
            window_ms,
            group_by,
            samples,
        } => {
            let mut request = QueryRequest::new(selector, window_ms).group_by(group_by);
            if let Some(samples) = samples {
                request = request.filter_samples(samples);
            }
            print_json(&service.query_with(request).await?)?
        }
        Commands::Summary { id, group_by } => print_json(&service.summary(id, group_by).await?)?,
        Commands::Histogram { id, group_by } => {
            print_json(&service.distribution(id, group_by).await?)?
        }
        Commands::Delete { id } => {
            service.delete(id).await?;
            println!("Deleted {}", id);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    run(cli).await?;
    Ok(())
}
