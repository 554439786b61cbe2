//! Vantage command line
//!
//! Runs captured HTTP transactions through the response-processor pipeline
//! and writes the resulting alerts as JSON lines.

use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use vantage::app::Config;
use vantage::http::{read_transactions, Transaction};
use vantage::scanner::sink::forward_alerts;
use vantage::scanner::{
    AlertSink, ChannelSink, DedupeSink, Dispatcher, JsonLinesSink, ModuleRegistry, ScanEngine,
    ScanState,
};

/// Response-processing pipeline for web security scanning
#[derive(Parser, Debug)]
#[command(name = "vantage")]
#[command(
    author,
    version,
    about = "Response-processing pipeline for web security scanning",
    long_about = None
)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "VANTAGE_CONFIG")]
    config: Option<String>,

    /// Captured transactions, one JSON object per line ("-" for stdin)
    #[arg(short, long, default_value = "-")]
    input: String,

    /// Alert output file (overrides [sink] output)
    #[arg(short, long)]
    output: Option<String>,

    /// List registered modules and exit
    #[arg(long)]
    list_modules: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "VANTAGE_LOG_LEVEL")]
    log_level: String,

    /// Log file path (enables file logging)
    #[arg(long, env = "VANTAGE_LOG_FILE")]
    log_file: Option<String>,

    /// Enable JSON structured logging
    #[arg(long, env = "VANTAGE_LOG_JSON")]
    log_json: bool,

    /// Generate default configuration and exit
    #[arg(long)]
    generate_config: bool,

    /// Validate configuration and exit
    #[arg(long)]
    validate_config: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %format!("{:#}", e), "Vantage failed");
            eprintln!("Error: {}", vantage::user_message(&e));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    if cli.generate_config {
        return generate_default_config();
    }

    init_logging(&cli)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting Vantage");

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(output) = &cli.output {
        config.sink.output = Some(output.into());
    }
    config.validate()?;

    if cli.validate_config {
        tracing::info!("Configuration is valid");
        return Ok(());
    }

    let registry = ModuleRegistry::with_defaults(&config.modules)?;

    if cli.list_modules {
        for (descriptor, enabled) in registry.descriptors() {
            println!(
                "{:<24} {:<20} {:<8} {}",
                descriptor.name,
                descriptor.kind.as_str(),
                if enabled { "enabled" } else { "disabled" },
                descriptor.title
            );
        }
        return Ok(());
    }

    run_pipeline(&cli, config, registry).await
}

/// Initialize the logging system
///
/// Console output goes to stderr; stdout is reserved for alerts.
fn init_logging(cli: &Cli) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let subscriber = tracing_subscriber::registry().with(env_filter);

    if let Some(log_path) = &cli.log_file {
        let path = std::path::Path::new(log_path);
        let has_dir = path.parent().map(|p| !p.as_os_str().is_empty()).unwrap_or(false);
        let file_appender = if has_dir {
            let dir = path.parent().unwrap_or(std::path::Path::new("."));
            let filename = path
                .file_name()
                .and_then(|s| s.to_str())
                .unwrap_or("vantage.log");
            RollingFileAppender::new(Rotation::DAILY, dir, filename)
        } else {
            let log_dir = Config::data_dir()
                .map(|d| d.join("logs"))
                .unwrap_or_else(|_| std::path::PathBuf::from("."));
            std::fs::create_dir_all(&log_dir)
                .with_context(|| format!("Failed to create log directory {:?}", log_dir))?;
            RollingFileAppender::new(Rotation::DAILY, log_dir, log_path)
        };

        if cli.log_json {
            let file_layer = fmt::layer()
                .json()
                .with_writer(file_appender)
                .with_ansi(false);

            subscriber.with(file_layer).init();
        } else {
            let file_layer = fmt::layer()
                .with_writer(file_appender)
                .with_ansi(false);

            subscriber.with(file_layer).init();
        }
    } else if cli.log_json {
        subscriber.with(fmt::layer().json().with_writer(io::stderr)).init();
    } else {
        subscriber.with(fmt::layer().with_writer(io::stderr)).init();
    }

    Ok(())
}

/// Generate default configuration file
fn generate_default_config() -> Result<()> {
    let config = Config::default();
    let toml = toml::to_string_pretty(&config)
        .context("Failed to serialize configuration")?;

    println!("{}", toml);
    Ok(())
}

fn load_input(input: &str) -> Result<Vec<Transaction>> {
    let transactions = if input == "-" {
        read_transactions(io::stdin().lock())
    } else {
        let file =
            File::open(input).with_context(|| format!("Failed to open capture file {}", input))?;
        read_transactions(BufReader::new(file))
    };

    transactions.context("Failed to read captured transactions")
}

async fn run_pipeline(cli: &Cli, config: Config, registry: ModuleRegistry) -> Result<()> {
    let transactions = load_input(&cli.input)?;
    tracing::info!(count = transactions.len(), "Loaded captured transactions");

    let output: Arc<dyn AlertSink> = match &config.sink.output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create alert output {:?}", path))?;
            Arc::new(JsonLinesSink::new(BufWriter::new(file)))
        }
        None => Arc::new(JsonLinesSink::new(io::stdout())),
    };

    // Keyed alerts are deduplicated in front of the writer, across all workers
    let writer = Arc::new(DedupeSink::new(output));
    let forward_target: Arc<dyn AlertSink> = writer.clone();

    let (channel_sink, alert_rx) =
        ChannelSink::new(config.sink.capacity, config.sink.send_timeout());
    let forwarder = tokio::spawn(forward_alerts(alert_rx, forward_target));

    let dispatcher = Dispatcher::new(Arc::new(RwLock::new(registry)), Arc::new(channel_sink))
        .with_module_budget(config.pipeline.module_budget());
    let engine = Arc::new(ScanEngine::new(dispatcher, config.pipeline.max_workers));

    // Ctrl-C stops intake; transactions already dispatched still finish
    let signal_engine = Arc::downgrade(&engine);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            if let Some(engine) = signal_engine.upgrade() {
                tracing::info!("Received Ctrl+C, stopping scan");
                engine.stop();
            }
        }
    });

    let (tx, rx) = mpsc::channel(config.pipeline.queue_capacity);
    let feeder_engine = Arc::clone(&engine);
    let feeder = tokio::spawn(async move {
        for transaction in transactions {
            if feeder_engine.state() == ScanState::Stopping {
                break;
            }
            if tx.send(transaction).await.is_err() {
                break;
            }
        }
    });

    let progress = engine.run(rx).await;
    feeder.await.context("Transaction feeder failed")?;

    // Dropping the engine drops the last channel sink so the forwarder can finish
    drop(engine);
    let written = forwarder.await.context("Alert forwarder failed")?;

    tracing::info!(
        processed = progress.processed,
        alerts = written - writer.duplicates(),
        duplicates = writer.duplicates(),
        module_failures = progress.module_failures,
        "Scan complete"
    );

    Ok(())
}
