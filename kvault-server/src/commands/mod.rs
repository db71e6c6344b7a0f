//! # Command Dispatcher
//!
//! Purpose: The single entry point every parsed argv passes through —
//! auth gate, transaction queue-vs-execute routing, the actual command
//! implementation, AOF recording, eviction, and the `MONITOR`/`SLOWLOG`
//! taps — per distilled spec §4.8's dispatcher pipeline ("name lookup,
//! arity check, type check against the target key, auth gate, queue vs.
//! execute decision, the operation itself, then AOF record on success").
//!
//! Individual commands live one value-kind per module (`string`, `hash`,
//! `list`, `set`, `zset`, `generic`, `connection`, `tx`, `admin`); this
//! module only routes and enforces the cross-cutting rules that apply to
//! every command regardless of kind.

pub mod admin;
pub mod connection;
pub mod generic;
pub mod hash;
pub mod list;
pub mod set;
pub mod string;
pub mod tx;
pub mod zset;

use kvault_common::{KvError, KvResult};
use kvault_engine::Store;

use crate::resp::{resp_error, resp_simple};
use crate::server::ServerShared;
use crate::session::Session;

/// Where a command's implementation lives, and how it interacts with
/// `MULTI` queueing, AOF replication, and OOM rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// Mutates the keyspace; replicated to AOF and subject to OOM/eviction.
    Write,
    /// Only reads the keyspace.
    Read,
    /// `MULTI`/`EXEC`/`DISCARD`/`WATCH`/`UNWATCH` — controls queueing
    /// itself, so it is never queued.
    TxControl,
    /// `PING`/`ECHO`/`AUTH`/`SELECT`/`QUIT`/`HELLO`.
    Connection,
    /// `CONFIG`/`INFO`/`MONITOR`/`SLOWLOG` — peripheral, per distilled
    /// spec §1.
    Admin,
}

/// `(min_argc, max_argc)`. `max_argc < 0` means unbounded. `argc` counts
/// the command name itself (`argv[0]`).
type Arity = (i64, i64);

/// Looks up a command by its upper-cased name, returning its kind and
/// arity bounds, or `None` for an unrecognized command.
fn lookup(name: &str) -> Option<(CommandKind, Arity)> {
    use CommandKind::*;
    Some(match name {
        "PING" => (Connection, (1, 2)),
        "ECHO" => (Connection, (2, 2)),
        "AUTH" => (Connection, (2, 2)),
        "SELECT" => (Connection, (2, 2)),
        "QUIT" => (Connection, (1, 1)),
        "HELLO" => (Connection, (1, 2)),

        "DEL" => (Write, (2, -1)),
        "EXISTS" => (Read, (2, -1)),
        "EXPIRE" => (Write, (3, 3)),
        "PEXPIRE" => (Write, (3, 3)),
        "TTL" => (Read, (2, 2)),
        "PTTL" => (Read, (2, 2)),
        "PERSIST" => (Write, (2, 2)),
        "TYPE" => (Read, (2, 2)),
        "KEYS" => (Read, (2, 2)),
        "RANDOMKEY" => (Read, (1, 1)),
        "FLUSHDB" => (Write, (1, 1)),
        "FLUSHALL" => (Write, (1, 1)),
        "DBSIZE" => (Read, (1, 1)),

        "SET" => (Write, (3, 6)),
        "GET" => (Read, (2, 2)),
        "GETSET" => (Write, (3, 3)),
        "APPEND" => (Write, (3, 3)),
        "STRLEN" => (Read, (2, 2)),
        "INCR" => (Write, (2, 2)),
        "DECR" => (Write, (2, 2)),
        "INCRBY" => (Write, (3, 3)),
        "DECRBY" => (Write, (3, 3)),
        "GETRANGE" => (Read, (4, 4)),
        "SETRANGE" => (Write, (4, 4)),
        "MGET" => (Read, (2, -1)),
        "MSET" => (Write, (3, -1)),

        "HSET" => (Write, (4, -1)),
        "HGET" => (Read, (3, 3)),
        "HDEL" => (Write, (3, -1)),
        "HEXISTS" => (Read, (3, 3)),
        "HGETALL" => (Read, (2, 2)),
        "HKEYS" => (Read, (2, 2)),
        "HVALS" => (Read, (2, 2)),
        "HLEN" => (Read, (2, 2)),
        "HINCRBY" => (Write, (4, 4)),

        "LPUSH" => (Write, (3, -1)),
        "RPUSH" => (Write, (3, -1)),
        "LPOP" => (Write, (2, 3)),
        "RPOP" => (Write, (2, 3)),
        "LLEN" => (Read, (2, 2)),
        "LRANGE" => (Read, (4, 4)),
        "LINDEX" => (Read, (3, 3)),
        "LTRIM" => (Write, (4, 4)),

        "SADD" => (Write, (3, -1)),
        "SREM" => (Write, (3, -1)),
        "SISMEMBER" => (Read, (3, 3)),
        "SMEMBERS" => (Read, (2, 2)),
        "SCARD" => (Read, (2, 2)),

        "ZADD" => (Write, (4, -1)),
        "ZSCORE" => (Read, (3, 3)),
        "ZREM" => (Write, (3, -1)),
        "ZCARD" => (Read, (2, 2)),
        "ZRANGE" => (Read, (4, 5)),
        "ZRANGEBYSCORE" => (Read, (4, 5)),
        "ZINCRBY" => (Write, (4, 4)),

        "MULTI" => (TxControl, (1, 1)),
        "EXEC" => (TxControl, (1, 1)),
        "DISCARD" => (TxControl, (1, 1)),
        "WATCH" => (TxControl, (2, -1)),
        "UNWATCH" => (TxControl, (1, 1)),

        "CONFIG" => (Admin, (3, 4)),
        "INFO" => (Admin, (1, 2)),
        "MONITOR" => (Admin, (1, 1)),
        "SLOWLOG" => (Admin, (2, 3)),

        _ => return None,
    })
}

fn check_arity(bounds: Arity, argc: usize) -> bool {
    let (min, max) = bounds;
    let argc = argc as i64;
    argc >= min && (max < 0 || argc <= max)
}

/// ASCII-only uppercase, per distilled spec §4.6 ("command names are
/// matched case-insensitively via ASCII-only uppercasing").
fn upper_name(argv0: &[u8]) -> String {
    String::from_utf8_lossy(argv0).to_ascii_uppercase()
}

/// Outcome of a single dispatch call, telling the connection loop what
/// to do after writing `out`.
pub struct DispatchOutcome {
    pub should_close: bool,
    pub enter_monitor: bool,
}

impl DispatchOutcome {
    fn normal() -> Self {
        DispatchOutcome { should_close: false, enter_monitor: false }
    }
}

/// Parses a `Vec<u8>` as a base-10 `i64`, matching distilled spec §7's
/// `NotAnInteger` error for anything else (leading/trailing whitespace,
/// empty input, or overflow are all rejected).
pub fn parse_i64(bytes: &[u8]) -> KvResult<i64> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or(KvError::NotAnInteger)
}

/// Parses a `Vec<u8>` as an `f64`, matching distilled spec §7's
/// `NotAFloat` error. NaN is rejected since `SortedSet` requires finite
/// scores (distilled spec §9 design note).
pub fn parse_f64(bytes: &[u8]) -> KvResult<f64> {
    let value = std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.parse::<f64>().ok())
        .ok_or(KvError::NotAFloat)?;
    if value.is_nan() {
        return Err(KvError::NotAFloat);
    }
    Ok(value)
}

/// Clamps a Redis-style `[start, end]` index range (negative indices
/// count from the end) to `[0, len-1]` inclusive bounds. Shared by
/// `GETRANGE`, `LRANGE`, and `LTRIM`; `SortedSet::range_by_rank` applies
/// the same convention internally for `ZRANGE`.
pub fn clamp_index_range(start: i64, end: i64, len: i64) -> Option<(usize, usize)> {
    if len == 0 {
        return None;
    }
    let norm = |idx: i64| -> i64 {
        if idx < 0 {
            (len + idx).max(0)
        } else {
            idx
        }
    };
    let lo = norm(start).min(len - 1);
    let hi = norm(end).min(len - 1);
    if lo > hi || lo >= len {
        None
    } else {
        Some((lo as usize, hi as usize))
    }
}

/// Top-level entry point: one call per parsed command array.
pub fn dispatch(shared: &ServerShared, session: &mut Session, argv: Vec<Vec<u8>>, out: &mut Vec<u8>) -> DispatchOutcome {
    if argv.is_empty() {
        return DispatchOutcome::normal();
    }
    let name = upper_name(&argv[0]);

    let (kind, bounds) = match lookup(&name) {
        Some(found) => found,
        None => {
            resp_error(out, &format!("ERR unknown command '{name}'"));
            if session.tx.is_active() {
                session.tx.mark_dirty();
            }
            return DispatchOutcome::normal();
        }
    };

    if !check_arity(bounds, argv.len()) {
        resp_error(out, &KvError::Arity(name.clone()).reply_text(&name));
        if session.tx.is_active() {
            session.tx.mark_dirty();
        }
        return DispatchOutcome::normal();
    }

    let needs_auth = shared.requirepass.is_some()
        && !session.authenticated
        && !matches!(name.as_str(), "AUTH" | "HELLO" | "QUIT");
    if needs_auth {
        resp_error(out, &KvError::AuthRequired.reply_text(&name));
        return DispatchOutcome::normal();
    }

    shared.monitor.publish(session.db_index, &argv);

    if kind == CommandKind::TxControl {
        tx::dispatch_tx_control(shared, session, &name, &argv, out);
        return DispatchOutcome::normal();
    }

    if session.tx.is_active() {
        session.tx.queue_command(argv);
        resp_simple(out, "QUEUED");
        return DispatchOutcome::normal();
    }

    execute(shared, session, kind, &name, &argv, out)
}

/// Executes one already-validated command immediately (bypassing the
/// `MULTI` queue check) — used both for top-level `Normal`-state
/// dispatch and for replaying a queue at `EXEC` time.
pub fn execute(
    shared: &ServerShared,
    session: &mut Session,
    kind: CommandKind,
    name: &str,
    argv: &[Vec<u8>],
    out: &mut Vec<u8>,
) -> DispatchOutcome {
    if kind == CommandKind::Write && would_reject_for_oom(&shared.store) {
        resp_error(out, &KvError::OutOfMemory.reply_text(name));
        return DispatchOutcome::normal();
    }

    let result = route(shared, session, name, argv, out);

    match result {
        Ok(outcome) => {
            if kind == CommandKind::Write {
                shared.store.record_aof(session.db_index, argv);
                run_eviction_sweep(shared);
            }
            outcome
        }
        Err(err) => {
            resp_error(out, &err.reply_text(name));
            DispatchOutcome::normal()
        }
    }
}

/// Rejects a write whenever the store is over `maxmemory` and the last
/// eviction sweep could not free enough room to get back under budget —
/// true for `noeviction` immediately, and true for any scoped policy once
/// its tracker runs out of victims while still over budget (distilled
/// spec §4.4, §8 testable property).
fn would_reject_for_oom(store: &Store) -> bool {
    let budget = store.maxmemory();
    if budget == 0 {
        return false;
    }
    store.used_bytes() as u64 > budget && store.is_over_budget_exhausted()
}

/// After a successful write, evicts down to budget (if `maxmemory` is
/// set and the policy allows it) and replicates each implicit delete to
/// the AOF, per distilled spec §4.4 ("eviction runs after a write that
/// pushes usage over budget; each evicted key is recorded to the AOF as
/// a synthesized DEL").
fn run_eviction_sweep(shared: &ServerShared) {
    if shared.store.maxmemory() == 0 {
        return;
    }
    for (db_index, key) in shared.store.evict_to_budget() {
        shared.store.record_aof(db_index, &[b"DEL".to_vec(), key]);
    }
}

fn route(
    shared: &ServerShared,
    session: &mut Session,
    name: &str,
    argv: &[Vec<u8>],
    out: &mut Vec<u8>,
) -> KvResult<DispatchOutcome> {
    let store = &shared.store;
    let db = session.db_index;

    match name {
        "PING" => connection::ping(argv, out),
        "ECHO" => connection::echo(argv, out),
        "AUTH" => return connection::auth(shared, session, argv, out),
        "SELECT" => return connection::select(store, session, argv, out),
        "QUIT" => return Ok(DispatchOutcome { should_close: true, enter_monitor: false }),
        "HELLO" => connection::hello(argv, out),

        "DEL" => generic::del(store, db, argv, out)?,
        "EXISTS" => generic::exists(store, db, argv, out)?,
        "EXPIRE" => generic::expire(store, db, argv, out)?,
        "PEXPIRE" => generic::pexpire(store, db, argv, out)?,
        "TTL" => generic::ttl(store, db, argv, out)?,
        "PTTL" => generic::pttl(store, db, argv, out)?,
        "PERSIST" => generic::persist(store, db, argv, out)?,
        "TYPE" => generic::type_cmd(store, db, argv, out)?,
        "KEYS" => generic::keys(store, db, argv, out)?,
        "RANDOMKEY" => generic::randomkey(store, db, out)?,
        "FLUSHDB" => generic::flushdb(store, db, out)?,
        "FLUSHALL" => generic::flushall(store, out),
        "DBSIZE" => generic::dbsize(store, db, out)?,

        "SET" => string::set(store, db, argv, out)?,
        "GET" => string::get(store, db, argv, out)?,
        "GETSET" => string::getset(store, db, argv, out)?,
        "APPEND" => string::append(store, db, argv, out)?,
        "STRLEN" => string::strlen(store, db, argv, out)?,
        "INCR" => string::incrby(store, db, &[argv[0].clone(), argv[1].clone(), b"1".to_vec()], out)?,
        "DECR" => string::incrby(store, db, &[argv[0].clone(), argv[1].clone(), b"-1".to_vec()], out)?,
        "INCRBY" => string::incrby(store, db, argv, out)?,
        "DECRBY" => string::decrby(store, db, argv, out)?,
        "GETRANGE" => string::getrange(store, db, argv, out)?,
        "SETRANGE" => string::setrange(store, db, argv, out)?,
        "MGET" => string::mget(store, db, argv, out)?,
        "MSET" => string::mset(store, db, argv, out)?,

        "HSET" => hash::hset(store, db, argv, out)?,
        "HGET" => hash::hget(store, db, argv, out)?,
        "HDEL" => hash::hdel(store, db, argv, out)?,
        "HEXISTS" => hash::hexists(store, db, argv, out)?,
        "HGETALL" => hash::hgetall(store, db, argv, out)?,
        "HKEYS" => hash::hkeys(store, db, argv, out)?,
        "HVALS" => hash::hvals(store, db, argv, out)?,
        "HLEN" => hash::hlen(store, db, argv, out)?,
        "HINCRBY" => hash::hincrby(store, db, argv, out)?,

        "LPUSH" => list::lpush(store, db, argv, out)?,
        "RPUSH" => list::rpush(store, db, argv, out)?,
        "LPOP" => list::lpop(store, db, argv, out)?,
        "RPOP" => list::rpop(store, db, argv, out)?,
        "LLEN" => list::llen(store, db, argv, out)?,
        "LRANGE" => list::lrange(store, db, argv, out)?,
        "LINDEX" => list::lindex(store, db, argv, out)?,
        "LTRIM" => list::ltrim(store, db, argv, out)?,

        "SADD" => set::sadd(store, db, argv, out)?,
        "SREM" => set::srem(store, db, argv, out)?,
        "SISMEMBER" => set::sismember(store, db, argv, out)?,
        "SMEMBERS" => set::smembers(store, db, argv, out)?,
        "SCARD" => set::scard(store, db, argv, out)?,

        "ZADD" => zset::zadd(store, db, argv, out)?,
        "ZSCORE" => zset::zscore(store, db, argv, out)?,
        "ZREM" => zset::zrem(store, db, argv, out)?,
        "ZCARD" => zset::zcard(store, db, argv, out)?,
        "ZRANGE" => zset::zrange(store, db, argv, out)?,
        "ZRANGEBYSCORE" => zset::zrangebyscore(store, db, argv, out)?,
        "ZINCRBY" => zset::zincrby(store, db, argv, out)?,

        "CONFIG" => return admin::config(shared, argv, out),
        "INFO" => admin::info(shared, session, argv, out),
        "MONITOR" => {
            resp_simple(out, "OK");
            return Ok(DispatchOutcome { should_close: false, enter_monitor: true });
        }
        "SLOWLOG" => return admin::slowlog(shared, argv, out),

        _ => unreachable!("lookup() and route() must name the same commands"),
    }

    Ok(DispatchOutcome::normal())
}
