//! querylane Server Binary
//!
//! Starts the statement protocol HTTP server backed by DataFusion.
//!
//! ## Usage
//!
//! ```bash
//! # Start server with default settings (config.toml, config.local.toml, env)
//! cargo run --bin querylane-server
//!
//! # Custom bind address and config file
//! cargo run --bin querylane-server -- --host 0.0.0.0 --port 9090 --config prod.toml
//! ```
//!
//! Logging goes to stdout unless `[logging] file` is set. `RUST_LOG` takes
//! precedence over `[logging] level`.

use std::sync::{Arc, OnceLock};

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use querylane::config::LoggingConfig;
use querylane::protocol::{rest, Handler};
use querylane::Config;

static TRACE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

#[derive(Debug, Parser)]
#[command(name = "querylane-server", version, about = "Asynchronous SQL statement server")]
struct Args {
    /// Configuration file (defaults to config.toml + config.local.toml)
    #[arg(long)]
    config: Option<String>,

    /// Override the bind host
    #[arg(long)]
    host: Option<String>,

    /// Override the bind port
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("failed to load configuration from {path}"))?,
        None => Config::load().context("failed to load configuration")?,
    };

    if let Some(host) = args.host {
        config.http.host = host;
    }
    if let Some(port) = args.port {
        config.http.port = port;
    }

    init_tracing(&config.logging)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        address = %config.http.bind_address(),
        max_queries = config.query.max_queries,
        page_rows = config.pagination.max_rows,
        "querylane_starting"
    );

    let handler = Arc::new(Handler::from_config(&config));
    rest::start_http_server(handler, &config.http, &config.query)
        .await
        .map_err(|e| anyhow::anyhow!(e))
        .context("http server failed")?;

    tracing::info!("querylane_stopped");
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let json = logging.format == "json";

    let (writer, guard) = match &logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("unable to open log file '{path}'"))?;
            tracing_appender::non_blocking(file)
        }
        None => tracing_appender::non_blocking(std::io::stdout()),
    };
    let _ = TRACE_GUARD.set(guard);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(logging.file.is_none())
        .with_thread_names(true)
        .with_writer(writer);

    let subscriber: Box<dyn tracing::Subscriber + Send + Sync> = if json {
        Box::new(builder.json().finish())
    } else {
        Box::new(builder.compact().finish())
    };

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to install tracing subscriber")?;
    Ok(())
}
