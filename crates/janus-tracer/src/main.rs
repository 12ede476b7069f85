//! Janus Tracer - distributed traces from the Janus event handler stream
//!
//! Reads newline-delimited Janus events, passes them through to stdout and
//! exports the spans synthesized from them to a Zipkin-compatible backend.

mod metrics_server;

use anyhow::Context;
use clap::{Parser, Subcommand};
use janus_tracer_core::config::{ConfigLoader, TracerConfig};
use janus_tracer_core::events::classify_line;
use janus_tracer_core::pipeline::Pipeline;
use janus_tracer_core::{create_metrics, TraceEngine};
use janus_tracer_export::{to_wire, ZipkinExporter, ZipkinExporterConfig};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, BufReader};
use tracing::{debug, info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "janus-tracer")]
#[command(author = "QXIP BV")]
#[command(version)]
#[command(about = "Distributed tracing for the Janus media gateway", long_about = None)]
struct Cli {
    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Log output format (text, json)
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Path to configuration file
    #[arg(short, long, global = true, env = "JANUS_TRACER_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Trace events from stdin (or a file), passing every line through to stdout
    Run {
        /// Read events from this file instead of stdin
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Trace backend URL ("" to only log spans)
        #[arg(long)]
        endpoint: Option<String>,

        /// Do not echo input lines to stdout
        #[arg(long)]
        no_bypass: bool,

        /// Serve Prometheus metrics
        #[arg(long)]
        metrics: bool,

        /// Metrics port
        #[arg(long)]
        port: Option<u16>,
    },

    /// Replay an event log offline and print the resulting spans as wire JSON
    Check {
        /// Event log (newline-delimited JSON)
        input: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let loaded = ConfigLoader::new().with_cli_path(cli.config.clone()).load();
    let (mut config, load_error) = match loaded {
        Ok(config) => (config, None),
        Err(e) => (TracerConfig::default(), Some(e)),
    };

    if let Commands::Run {
        endpoint,
        no_bypass,
        metrics,
        port,
        ..
    } = &cli.command
    {
        apply_run_flags(&mut config, endpoint.clone(), *no_bypass, *metrics, *port);
        ConfigLoader::new()
            .validate(&config)
            .context("Invalid command line options")?;
    }

    init_logging(cli.verbose, &cli.log_format, &config)?;

    match load_error {
        Some(e) => warn!("Failed to load configuration: {}, using defaults", e),
        None => debug!("Configuration loaded successfully"),
    }

    match cli.command {
        Commands::Run { input, .. } => run_command(config, input).await,
        Commands::Check { input } => check_command(&config, &input).await,
    }
}

/// CLI flags take precedence over file and environment settings
fn apply_run_flags(
    config: &mut TracerConfig,
    endpoint: Option<String>,
    no_bypass: bool,
    metrics: bool,
    port: Option<u16>,
) {
    if let Some(endpoint) = endpoint {
        config.endpoint = endpoint;
    }
    if no_bypass {
        config.bypass = false;
    }
    if metrics {
        config.metrics = true;
    }
    if let Some(port) = port {
        config.port = port;
    }
}

/// Log level: `-v` count first, then the debug flag, then the configured level
fn log_level(verbose: u8, config: &TracerConfig) -> Level {
    match verbose {
        0 if config.debug => Level::DEBUG,
        0 => match config.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        },
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Logs go to stderr; stdout carries the bypass stream
fn init_logging(verbose: u8, format: &str, config: &TracerConfig) -> anyhow::Result<()> {
    let level = log_level(verbose, config);
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    match format {
        "json" => tracing::subscriber::set_global_default(builder.json().finish())?,
        _ => tracing::subscriber::set_global_default(builder.finish())?,
    }
    Ok(())
}

async fn run_command(config: TracerConfig, input: Option<PathBuf>) -> anyhow::Result<()> {
    let metrics = create_metrics(&config.service_name);

    let exporter = ZipkinExporter::connect(ZipkinExporterConfig {
        endpoint: config.endpoint().map(str::to_string),
        timeout: config.timeout(),
        debug: config.debug,
        ..Default::default()
    })?;
    info!(
        "Janus tracer v{} exporting to {}",
        env!("CARGO_PKG_VERSION"),
        config.endpoint().unwrap_or("<none, logging only>")
    );

    if config.metrics {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind metrics port {}", config.port))?;
        let server_metrics = metrics.clone();
        tokio::spawn(async move {
            if let Err(e) = metrics_server::serve(listener, server_metrics).await {
                warn!("Metrics server stopped: {}", e);
            }
        });
        tokio::spawn(metrics_server::log_snapshots(
            metrics.clone(),
            config.interval(),
        ));
    }

    let reader: Box<dyn AsyncBufRead + Unpin + Send> = match &input {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Failed to open {}", path.display()))?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(BufReader::new(tokio::io::stdin())),
    };

    let engine = TraceEngine::new(config.engine_config());
    let mut pipeline =
        Pipeline::new(config.pipeline_config(), engine, Arc::new(exporter)).with_metrics(metrics);
    let mut stdout = tokio::io::stdout();

    let stats = pipeline
        .run_until(reader, &mut stdout, interrupted())
        .await?;
    info!(
        "Pipeline stopped: {} events traced, {} dropped, {} spans exported, {} failed, {} discarded",
        stats.events_traced,
        stats.events_dropped,
        stats.spans_exported,
        stats.spans_failed,
        stats.spans_discarded
    );

    Ok(())
}

/// Resolves on Ctrl-C; never, if the handler cannot be installed
async fn interrupted() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Interrupted, shutting down"),
        Err(e) => {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await
        }
    }
}

/// Offline replay: nothing is sent, spans are printed one wire payload per line
async fn check_command(config: &TracerConfig, input: &Path) -> anyhow::Result<()> {
    let content = tokio::fs::read_to_string(input)
        .await
        .with_context(|| format!("Failed to read {}", input.display()))?;

    for payload in replay(config, &content)? {
        println!("{}", payload);
    }
    Ok(())
}

fn replay(config: &TracerConfig, content: &str) -> anyhow::Result<Vec<String>> {
    let mut engine = TraceEngine::new(config.engine_config());
    let mut payloads = Vec::new();
    let mut dropped = 0usize;

    for (lineno, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match classify_line(line) {
            Ok(Some(event)) => {
                for span in engine.handle(&event) {
                    payloads.push(serde_json::to_string(&to_wire(&span))?);
                }
            }
            Ok(None) => {}
            Err(e) => {
                dropped += 1;
                warn!("Line {}: {}", lineno + 1, e);
            }
        }
    }

    info!("{} spans synthesized, {} lines dropped", payloads.len(), dropped);
    Ok(payloads)
}
