//! `PING`, `ECHO`, `AUTH`, `SELECT`, `QUIT`, `HELLO` — per-connection
//! commands that never touch the keyspace.

use kvault_common::{KvError, KvResult};
use kvault_engine::Store;

use crate::commands::DispatchOutcome;
use crate::resp::{resp_bulk, resp_error, resp_integer, resp_simple};
use crate::server::ServerShared;
use crate::session::Session;

pub fn ping(argv: &[Vec<u8>], out: &mut Vec<u8>) {
    match argv.len() {
        1 => resp_simple(out, "PONG"),
        _ => resp_bulk(out, &argv[1]),
    }
}

pub fn echo(argv: &[Vec<u8>], out: &mut Vec<u8>) {
    resp_bulk(out, &argv[1]);
}

pub fn auth(
    shared: &ServerShared,
    session: &mut Session,
    argv: &[Vec<u8>],
    out: &mut Vec<u8>,
) -> KvResult<DispatchOutcome> {
    let err = match &shared.requirepass {
        None => Some(KvError::AuthNotSet),
        Some(hash) => {
            let candidate = String::from_utf8_lossy(&argv[1]);
            if hash.matches(&candidate) {
                session.authenticated = true;
                None
            } else {
                Some(KvError::WrongPass)
            }
        }
    };
    match err {
        Some(err) => resp_error(out, &err.reply_text("AUTH")),
        None => resp_simple(out, "OK"),
    }
    Ok(DispatchOutcome { should_close: false, enter_monitor: false })
}

pub fn select(store: &Store, session: &mut Session, argv: &[Vec<u8>], out: &mut Vec<u8>) -> KvResult<DispatchOutcome> {
    let index = crate::commands::parse_i64(&argv[1])?;
    if index < 0 || index as u16 >= store.database_count() {
        resp_error(out, &KvError::Generic("DB index is out of range".to_string()).reply_text("SELECT"));
    } else {
        session.db_index = index as u16;
        resp_simple(out, "OK");
    }
    Ok(DispatchOutcome { should_close: false, enter_monitor: false })
}

/// `HELLO` is RESP2-only here: it always replies as though protover 2
/// was requested, never upgrading to RESP3 (distilled spec's command
/// surface documents this as a stub present for client compatibility).
pub fn hello(argv: &[Vec<u8>], out: &mut Vec<u8>) {
    let _ = argv;
    let fields: &[(&str, i64)] = &[("proto", 2)];
    crate::resp::resp_array_header(out, 2 + fields.len() * 2);
    resp_bulk(out, b"server");
    resp_bulk(out, b"kvault");
    for (key, value) in fields {
        resp_bulk(out, key.as_bytes());
        resp_integer(out, *value);
    }
}
