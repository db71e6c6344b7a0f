//! # TCP Server
//!
//! Accept RESP2 connections, parse commands, and dispatch them through
//! `commands::dispatch`, tapping metrics and the slow log around each
//! call and handing a connection off to `MONITOR` streaming when asked.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::BytesMut;
use kvault_common::PasswordHash;
use kvault_engine::Store;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::aof::AofWriter;
use crate::commands;
use crate::metrics::Metrics;
use crate::monitor::{format_monitor_line, MonitorBroadcaster};
use crate::resp::{resp_error, resp_simple, RespError, RespParser};
use crate::session::Session;
use crate::slowlog::SlowLog;

const READ_BUF_SIZE: usize = 16 * 1024;

/// Everything every connection task shares: the keyspace, the AOF sink,
/// and the peripheral `MONITOR`/`SLOWLOG`/metrics components.
pub struct ServerShared {
    pub store: Arc<Store>,
    pub aof: Option<Arc<AofWriter>>,
    pub monitor: Arc<MonitorBroadcaster>,
    pub slowlog: Arc<SlowLog>,
    pub metrics: Arc<Metrics>,
    pub requirepass: Option<PasswordHash>,
    pub start_time: Instant,
    pub port: u16,
    /// `maxclients` config key: rejects new connections once this many are
    /// already open (distilled spec §6).
    pub maxclients: usize,
    /// `timeout` config key, seconds; 0 disables idle-session eviction
    /// (distilled spec §6).
    pub timeout_secs: u64,
    pub connected_clients: AtomicUsize,
}

/// Accepts a connection, enforcing `maxclients` before handing it to
/// [`handle_connection`]; always decrements the shared counter on return.
pub async fn accept_connection(shared: Arc<ServerShared>, mut stream: TcpStream) {
    let previous = shared.connected_clients.fetch_add(1, Ordering::SeqCst);
    if shared.maxclients != 0 && previous >= shared.maxclients {
        let mut out = Vec::new();
        resp_error(&mut out, "ERR max number of clients reached");
        let _ = stream.write_all(&out).await;
        shared.connected_clients.fetch_sub(1, Ordering::SeqCst);
        return;
    }

    handle_connection(Arc::clone(&shared), stream).await;
    shared.connected_clients.fetch_sub(1, Ordering::SeqCst);
}

/// Drives a single accepted connection until it closes or issues `QUIT`.
///
/// If `timeout_secs` is non-zero, a connection that sits idle (no complete
/// command framed) for that long is closed, matching the `timeout` config
/// key's "idle-session timeout" effect (distilled spec §6).
pub async fn handle_connection(shared: Arc<ServerShared>, mut stream: TcpStream) {
    let mut session = Session::new(shared.requirepass.is_some());
    let mut buf = BytesMut::with_capacity(READ_BUF_SIZE);
    let mut read_buf = [0u8; READ_BUF_SIZE];
    let idle_timeout = (shared.timeout_secs > 0).then(|| Duration::from_secs(shared.timeout_secs));

    loop {
        match RespParser::parse(&mut buf) {
            Ok(Some(argv)) => {
                if argv.is_empty() {
                    continue;
                }
                let mut out = Vec::new();
                shared.metrics.record_request_start();
                let started = Instant::now();
                let outcome = commands::dispatch(&shared, &mut session, argv.clone(), &mut out);
                let elapsed = started.elapsed();
                shared.metrics.record_request_end(elapsed);
                if out.first() == Some(&b'-') {
                    shared.metrics.record_error();
                }
                shared
                    .slowlog
                    .maybe_record(&argv, elapsed, commands::admin::now_unix_secs());

                if stream.write_all(&out).await.is_err() {
                    return;
                }

                if outcome.enter_monitor {
                    run_monitor_stream(&shared, &mut stream).await;
                    return;
                }
                if outcome.should_close {
                    let _ = stream.shutdown().await;
                    return;
                }
            }
            Ok(None) => {
                let read = match idle_timeout {
                    Some(limit) => match tokio::time::timeout(limit, stream.read(&mut read_buf)).await {
                        Ok(result) => result,
                        Err(_) => {
                            tracing::debug!("closing idle connection");
                            return;
                        }
                    },
                    None => stream.read(&mut read_buf).await,
                };
                match read {
                    Ok(0) => return,
                    Ok(n) => buf.extend_from_slice(&read_buf[..n]),
                    Err(_) => return,
                }
            }
            Err(RespError::Protocol) => {
                let mut out = Vec::new();
                resp_error(&mut out, "ERR Protocol error");
                let _ = stream.write_all(&out).await;
                return;
            }
        }
    }
}

/// Once a connection issues `MONITOR` it stops processing further
/// commands and only streams every subsequently dispatched command,
/// matching Redis's own `MONITOR` behavior.
async fn run_monitor_stream(shared: &ServerShared, stream: &mut TcpStream) {
    let mut rx = shared.monitor.subscribe();
    loop {
        match rx.recv().await {
            Ok(event) => {
                let mut out = Vec::new();
                resp_simple(&mut out, &format_monitor_line(&event));
                if stream.write_all(&out).await.is_err() {
                    return;
                }
            }
            Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
            Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
        }
    }
}

/// Background task for `appendfsync everysec`: fsyncs the AOF file once a
/// second if a write landed since the last sync.
pub async fn run_everysec_fsync_task(aof: Arc<AofWriter>, shutdown: Arc<AtomicBool>) {
    let mut interval = tokio::time::interval(Duration::from_secs(1));
    loop {
        interval.tick().await;
        if shutdown.load(Ordering::Relaxed) {
            return;
        }
        aof.sync_if_dirty();
    }
}
