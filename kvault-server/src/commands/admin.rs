//! `CONFIG`, `INFO`, `SLOWLOG` — peripheral administrative commands per
//! distilled spec §1 ("documented as peripheral, not part of the hot
//! path's core contract"). `MONITOR` itself is handled in
//! `commands::route` since it changes the connection's mode rather than
//! returning a single reply.

use std::time::{SystemTime, UNIX_EPOCH};

use kvault_common::{FsyncPolicy, KvError, KvResult, MaxMemoryPolicy};

use crate::commands::DispatchOutcome;
use crate::resp::{resp_array_header, resp_bulk, resp_error, resp_integer, resp_simple};
use crate::server::ServerShared;
use crate::session::Session;

/// Allow-listed `CONFIG GET`/`SET` keys (distilled spec §6 names these as
/// the runtime-mutable subset).
const ALLOWED_KEYS: &[&str] = &["maxmemory", "maxmemory-policy", "appendfsync"];

pub fn config(shared: &ServerShared, argv: &[Vec<u8>], out: &mut Vec<u8>) -> KvResult<DispatchOutcome> {
    let sub = String::from_utf8_lossy(&argv[1]).to_ascii_uppercase();
    let key = String::from_utf8_lossy(&argv[2]).to_ascii_lowercase();

    if !ALLOWED_KEYS.contains(&key.as_str()) {
        resp_error(out, &KvError::Generic(format!("Unknown CONFIG parameter '{key}'")).reply_text("CONFIG"));
        return Ok(DispatchOutcome { should_close: false, enter_monitor: false });
    }

    match sub.as_str() {
        "GET" => {
            let value = match key.as_str() {
                "maxmemory" => shared.store.maxmemory().to_string(),
                "maxmemory-policy" => shared.store.maxmemory_policy().to_string(),
                "appendfsync" => format_fsync_policy(shared.aof.as_ref().map(|a| a.policy()).unwrap_or(FsyncPolicy::No)),
                _ => unreachable!("checked against ALLOWED_KEYS above"),
            };
            resp_array_header(out, 2);
            resp_bulk(out, key.as_bytes());
            resp_bulk(out, value.as_bytes());
        }
        "SET" => {
            let value = match argv.get(3) {
                Some(v) => String::from_utf8_lossy(v).to_string(),
                None => {
                    resp_error(out, &KvError::Arity("CONFIG".to_string()).reply_text("CONFIG"));
                    return Ok(DispatchOutcome { should_close: false, enter_monitor: false });
                }
            };
            let applied = match key.as_str() {
                "maxmemory" => value.parse::<u64>().map(|bytes| shared.store.set_maxmemory(bytes)).is_ok(),
                "maxmemory-policy" => match value.parse::<MaxMemoryPolicy>() {
                    Ok(policy) => {
                        shared.store.set_maxmemory_policy(policy);
                        true
                    }
                    Err(_) => false,
                },
                "appendfsync" => match (value.parse::<FsyncPolicy>(), &shared.aof) {
                    (Ok(policy), Some(aof)) => {
                        aof.set_policy(policy);
                        true
                    }
                    _ => false,
                },
                _ => unreachable!("checked against ALLOWED_KEYS above"),
            };
            if applied {
                resp_simple(out, "OK");
            } else {
                resp_error(out, &KvError::Generic(format!("Invalid argument '{value}' for CONFIG SET '{key}'")).reply_text("CONFIG"));
            }
        }
        _ => {
            resp_error(out, &KvError::Generic(format!("Unknown CONFIG subcommand '{sub}'")).reply_text("CONFIG"));
        }
    }
    Ok(DispatchOutcome { should_close: false, enter_monitor: false })
}

pub fn info(shared: &ServerShared, session: &Session, argv: &[Vec<u8>], out: &mut Vec<u8>) {
    let section = argv.get(1).map(|s| String::from_utf8_lossy(s).to_ascii_lowercase());
    let want = |name: &str| section.as_deref().map(|s| s == name).unwrap_or(true);

    let mut body = String::new();
    if want("server") {
        body.push_str("# Server\r\n");
        body.push_str("kvault_version:1.0.0\r\n");
        body.push_str(&format!("uptime_in_seconds:{}\r\n", shared.start_time.elapsed().as_secs()));
        body.push_str(&format!("tcp_port:{}\r\n", shared.port));
        body.push('\r');
        body.push('\n');
    }
    if want("memory") {
        body.push_str("# Memory\r\n");
        body.push_str(&format!("used_memory:{}\r\n", shared.store.used_bytes()));
        body.push_str(&format!("maxmemory:{}\r\n", shared.store.maxmemory()));
        body.push_str(&format!("maxmemory_policy:{}\r\n", shared.store.maxmemory_policy()));
        body.push_str("\r\n");
    }
    if want("keyspace") {
        body.push_str("# Keyspace\r\n");
        for idx in 0..shared.store.database_count() {
            if let Ok(size) = shared.store.dbsize(idx) {
                if size > 0 {
                    body.push_str(&format!("db{idx}:keys={size}\r\n"));
                }
            }
        }
    }
    let _ = session;
    resp_bulk(out, body.as_bytes());
}

pub fn slowlog(shared: &ServerShared, argv: &[Vec<u8>], out: &mut Vec<u8>) -> KvResult<DispatchOutcome> {
    let sub = String::from_utf8_lossy(&argv[1]).to_ascii_uppercase();
    match sub.as_str() {
        "GET" => {
            let count = match argv.get(2) {
                Some(raw) => crate::commands::parse_i64(raw)?.max(0) as usize,
                None => 10,
            };
            let entries = shared.slowlog.recent(count);
            resp_array_header(out, entries.len());
            for entry in entries {
                resp_array_header(out, 4);
                resp_integer(out, entry.id as i64);
                resp_integer(out, entry.timestamp_unix_secs as i64);
                resp_integer(out, entry.duration.as_micros() as i64);
                crate::resp::resp_array_of_bulks(out, &entry.argv);
            }
        }
        "RESET" => {
            shared.slowlog.reset();
            resp_simple(out, "OK");
        }
        "LEN" => resp_integer(out, shared.slowlog.len() as i64),
        _ => resp_error(out, &KvError::Generic(format!("Unknown SLOWLOG subcommand '{sub}'")).reply_text("SLOWLOG")),
    }
    Ok(DispatchOutcome { should_close: false, enter_monitor: false })
}

fn format_fsync_policy(policy: FsyncPolicy) -> String {
    match policy {
        FsyncPolicy::Always => "always",
        FsyncPolicy::EverySec => "everysec",
        FsyncPolicy::No => "no",
    }
    .to_string()
}

pub fn now_unix_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}
