//! Key-space commands that apply regardless of the value kind stored:
//! `DEL`, `EXISTS`, `EXPIRE`, `TTL`, `PERSIST`, `TYPE`, `KEYS`,
//! `RANDOMKEY`, `FLUSHDB`, `FLUSHALL`, `DBSIZE`.

use std::time::Duration;

use kvault_common::KvResult;
use kvault_engine::{Store, TtlStatus};

use crate::commands::parse_i64;
use crate::resp::{resp_array_of_bulks, resp_bulk, resp_integer, resp_null, resp_simple};

pub fn del(store: &Store, db: u16, argv: &[Vec<u8>], out: &mut Vec<u8>) -> KvResult<()> {
    let mut removed = 0i64;
    for key in &argv[1..] {
        if store.remove(db, key)? {
            removed += 1;
        }
    }
    resp_integer(out, removed);
    Ok(())
}

pub fn exists(store: &Store, db: u16, argv: &[Vec<u8>], out: &mut Vec<u8>) -> KvResult<()> {
    let mut count = 0i64;
    for key in &argv[1..] {
        if store.get(db, key)?.is_some() {
            count += 1;
        }
    }
    resp_integer(out, count);
    Ok(())
}

pub fn expire(store: &Store, db: u16, argv: &[Vec<u8>], out: &mut Vec<u8>) -> KvResult<()> {
    let seconds = parse_i64(&argv[2])?;
    let applied = if seconds < 0 {
        store.remove(db, &argv[1])?
    } else {
        store.expire(db, &argv[1], Duration::from_secs(seconds as u64))?
    };
    resp_integer(out, applied as i64);
    Ok(())
}

pub fn pexpire(store: &Store, db: u16, argv: &[Vec<u8>], out: &mut Vec<u8>) -> KvResult<()> {
    let millis = parse_i64(&argv[2])?;
    let applied = if millis < 0 {
        store.remove(db, &argv[1])?
    } else {
        store.expire(db, &argv[1], Duration::from_millis(millis as u64))?
    };
    resp_integer(out, applied as i64);
    Ok(())
}

pub fn ttl(store: &Store, db: u16, argv: &[Vec<u8>], out: &mut Vec<u8>) -> KvResult<()> {
    reply_ttl(store.ttl(db, &argv[1])?, out, |d| d.as_secs() as i64);
    Ok(())
}

pub fn pttl(store: &Store, db: u16, argv: &[Vec<u8>], out: &mut Vec<u8>) -> KvResult<()> {
    reply_ttl(store.ttl(db, &argv[1])?, out, |d| d.as_millis() as i64);
    Ok(())
}

fn reply_ttl(status: TtlStatus, out: &mut Vec<u8>, to_units: impl Fn(Duration) -> i64) {
    let value = match status {
        TtlStatus::Missing => -2,
        TtlStatus::NoExpiry => -1,
        TtlStatus::ExpiresIn(d) => to_units(d),
    };
    resp_integer(out, value);
}

pub fn persist(store: &Store, db: u16, argv: &[Vec<u8>], out: &mut Vec<u8>) -> KvResult<()> {
    let applied = store.persist(db, &argv[1])?;
    resp_integer(out, applied as i64);
    Ok(())
}

pub fn type_cmd(store: &Store, db: u16, argv: &[Vec<u8>], out: &mut Vec<u8>) -> KvResult<()> {
    match store.get(db, &argv[1])? {
        Some(entry) => resp_simple(out, entry.value.kind().as_str()),
        None => resp_simple(out, "none"),
    }
    Ok(())
}

/// Full scan of the keyspace, matching distilled spec §4.8's documented
/// caveat that `KEYS` is O(n) with no index and unsuitable for large
/// keyspaces in production use. The pattern argument is accepted but not
/// matched against — every key is returned.
pub fn keys(store: &Store, db: u16, argv: &[Vec<u8>], out: &mut Vec<u8>) -> KvResult<()> {
    let _ = &argv[1];
    let keys = store.all_keys(db)?;
    resp_array_of_bulks(out, &keys);
    Ok(())
}

pub fn randomkey(store: &Store, db: u16, out: &mut Vec<u8>) -> KvResult<()> {
    match store.random_key(db)? {
        Some(key) => resp_bulk(out, &key),
        None => resp_null(out),
    }
    Ok(())
}

pub fn flushdb(store: &Store, db: u16, out: &mut Vec<u8>) -> KvResult<()> {
    store.flushdb(db)?;
    resp_simple(out, "OK");
    Ok(())
}

pub fn flushall(store: &Store, out: &mut Vec<u8>) {
    store.flushall();
    resp_simple(out, "OK");
}

pub fn dbsize(store: &Store, db: u16, out: &mut Vec<u8>) -> KvResult<()> {
    resp_integer(out, store.dbsize(db)? as i64);
    Ok(())
}
