//! # kvault-server binary
//!
//! Loads configuration, builds the `Store`, replays the append-only log
//! (if any) through the same command dispatcher a live connection uses,
//! then accepts TCP connections until asked to shut down.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use kvault_common::{Config, FsyncPolicy};
use kvault_engine::Store;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use kvault_server::aof::{self, AofWriter};
use kvault_server::commands;
use kvault_server::metrics::Metrics;
use kvault_server::monitor::MonitorBroadcaster;
use kvault_server::server::{self, ServerShared};
use kvault_server::session::Session;
use kvault_server::slowlog::SlowLog;

/// Default shard count per database when the config file does not size
/// one explicitly; rounded up to the next power of two by `Store::new`.
const DEFAULT_SHARDS_PER_DATABASE: usize = 16;

#[derive(Parser, Debug)]
#[command(name = "kvault-server", version, about = "A RESP2 in-memory key-value store")]
struct Cli {
    /// Path to a kvault configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Overrides `port` from the config file.
    #[arg(long)]
    port: Option<u16>,

    /// Overrides `bind` from the config file.
    #[arg(long)]
    bind: Option<String>,

    /// Overrides `loglevel` from the config file.
    #[arg(long)]
    loglevel: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_from_file(path).with_context(|| format!("loading config file {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(bind) = cli.bind.clone() {
        config.bind = bind;
    }
    if let Some(loglevel) = &cli.loglevel {
        config.loglevel = loglevel.parse().map_err(|_| anyhow::anyhow!("invalid --loglevel '{loglevel}'"))?;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.loglevel.as_filter_str()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let store = Store::new(config.databases, DEFAULT_SHARDS_PER_DATABASE, config.maxmemory_policy);
    store.set_maxmemory(config.maxmemory);

    let aof_writer = if config.appendonly {
        let writer = Arc::new(
            AofWriter::open(&config.appendfilename, config.appendfsync)
                .with_context(|| format!("opening append-only file {}", config.appendfilename))?,
        );
        Some(writer)
    } else {
        None
    };

    let shared = Arc::new(ServerShared {
        store: Arc::clone(&store),
        aof: aof_writer.clone(),
        monitor: Arc::new(MonitorBroadcaster::new()),
        slowlog: Arc::new(SlowLog::new()),
        metrics: Arc::new(Metrics::new()),
        requirepass: config.requirepass.clone(),
        start_time: Instant::now(),
        port: config.port,
        maxclients: config.maxclients,
        timeout_secs: config.timeout_secs,
        connected_clients: std::sync::atomic::AtomicUsize::new(0),
    });

    if let Some(writer) = &aof_writer {
        replay_aof(&shared, &config.appendfilename)?;
        store.set_aof_sink(writer.clone());
    }

    let shutdown_flag = Arc::new(AtomicBool::new(false));
    if let Some(writer) = aof_writer.clone() {
        if config.appendfsync == FsyncPolicy::EverySec {
            tokio::spawn(server::run_everysec_fsync_task(writer, Arc::clone(&shutdown_flag)));
        }
    }

    let listener = TcpListener::bind((config.bind.as_str(), config.port))
        .await
        .with_context(|| format!("binding {}:{}", config.bind, config.port))?;
    tracing::info!(bind = %config.bind, port = config.port, "kvault-server listening");

    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .context("installing SIGTERM handler")?;

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = accepted.context("accepting connection")?;
                let _ = stream.set_nodelay(true);
                tracing::debug!(%peer, "accepted connection");
                let shared = Arc::clone(&shared);
                tokio::spawn(server::accept_connection(shared, stream));
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("SIGINT received, shutting down");
                break;
            }
            _ = sigterm.recv() => {
                tracing::info!("SIGTERM received, shutting down");
                break;
            }
        }
    }

    shutdown_flag.store(true, Ordering::Relaxed);
    store.shutdown();
    if let Some(writer) = &aof_writer {
        if let Err(err) = writer.flush_and_sync() {
            tracing::error!(error = %err, "failed to flush append-only file on shutdown");
        }
    }
    Ok(())
}

/// Replays every command already in the append-only log through the
/// ordinary dispatcher before the store starts recording new writes,
/// using a pre-authenticated, throwaway session.
fn replay_aof(shared: &Arc<ServerShared>, path: &str) -> Result<()> {
    let commands = aof::read_commands(path).with_context(|| format!("reading append-only file {path}"))?;
    if commands.is_empty() {
        return Ok(());
    }
    tracing::info!(count = commands.len(), "replaying append-only file");
    let mut session = Session::new(false);
    for argv in commands {
        let mut out = Vec::new();
        commands::dispatch(shared, &mut session, argv, &mut out);
    }
    Ok(())
}
