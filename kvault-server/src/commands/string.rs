//! String-valued key commands: `SET`, `GET`, `GETSET`, `APPEND`,
//! `STRLEN`, `INCR`/`DECR`/`INCRBY`/`DECRBY`, `GETRANGE`, `SETRANGE`,
//! `MGET`, `MSET`.

use std::time::Duration;

use kvault_common::{KvError, KvResult};
use kvault_engine::{Store, Value};

use crate::commands::{clamp_index_range, parse_i64};
use crate::resp::{resp_array_header, resp_bulk, resp_integer, resp_null, resp_simple};

enum Expiry {
    None,
    Seconds(u64),
    Millis(u64),
}

enum Presence {
    Either,
    MustNotExist,
    MustExist,
}

/// `SET key value [EX seconds | PX millis] [NX | XX]`.
pub fn set(store: &Store, db: u16, argv: &[Vec<u8>], out: &mut Vec<u8>) -> KvResult<()> {
    let key = argv[1].clone();
    let value = argv[2].clone();
    let mut expiry = Expiry::None;
    let mut presence = Presence::Either;

    let mut idx = 3;
    while idx < argv.len() {
        let opt = String::from_utf8_lossy(&argv[idx]).to_ascii_uppercase();
        match opt.as_str() {
            "EX" => {
                idx += 1;
                let secs = argv.get(idx).ok_or_else(|| KvError::Generic("syntax error".to_string()))?;
                expiry = Expiry::Seconds(parse_i64(secs)?.max(0) as u64);
            }
            "PX" => {
                idx += 1;
                let millis = argv.get(idx).ok_or_else(|| KvError::Generic("syntax error".to_string()))?;
                expiry = Expiry::Millis(parse_i64(millis)?.max(0) as u64);
            }
            "NX" => presence = Presence::MustNotExist,
            "XX" => presence = Presence::MustExist,
            _ => return Err(KvError::Generic("syntax error".to_string())),
        }
        idx += 1;
    }

    let exists = store.get(db, &key)?.is_some();
    let allowed = match presence {
        Presence::Either => true,
        Presence::MustNotExist => !exists,
        Presence::MustExist => exists,
    };
    if !allowed {
        resp_null(out);
        return Ok(());
    }

    match expiry {
        Expiry::None => store.set(db, key, Value::Str(value))?,
        Expiry::Seconds(s) => store.set_with_ttl(db, key, Value::Str(value), Duration::from_secs(s))?,
        Expiry::Millis(m) => store.set_with_ttl(db, key, Value::Str(value), Duration::from_millis(m))?,
    }
    resp_simple(out, "OK");
    Ok(())
}

pub fn get(store: &Store, db: u16, argv: &[Vec<u8>], out: &mut Vec<u8>) -> KvResult<()> {
    match store.get(db, &argv[1])? {
        Some(entry) => resp_bulk(out, entry.value.as_str()?),
        None => resp_null(out),
    }
    Ok(())
}

pub fn getset(store: &Store, db: u16, argv: &[Vec<u8>], out: &mut Vec<u8>) -> KvResult<()> {
    let old = match store.get(db, &argv[1])? {
        Some(entry) => Some(entry.value.as_str()?.clone()),
        None => None,
    };
    store.set(db, argv[1].clone(), Value::Str(argv[2].clone()))?;
    match old {
        Some(bytes) => resp_bulk(out, &bytes),
        None => resp_null(out),
    }
    Ok(())
}

pub fn append(store: &Store, db: u16, argv: &[Vec<u8>], out: &mut Vec<u8>) -> KvResult<()> {
    if let Some(entry) = store.get(db, &argv[1])? {
        entry.value.as_str()?;
    }
    let suffix = argv[2].clone();
    let len = store.mutate_or_insert(
        db,
        &argv[1],
        || Value::Str(Vec::new()),
        |value| -> KvResult<i64> {
            let bytes = value.as_str_mut()?;
            bytes.extend_from_slice(&suffix);
            Ok(bytes.len() as i64)
        },
    )??;
    resp_integer(out, len);
    Ok(())
}

pub fn strlen(store: &Store, db: u16, argv: &[Vec<u8>], out: &mut Vec<u8>) -> KvResult<()> {
    let len = match store.get(db, &argv[1])? {
        Some(entry) => entry.value.as_str()?.len(),
        None => 0,
    };
    resp_integer(out, len as i64);
    Ok(())
}

fn incr_by(store: &Store, db: u16, key: &[u8], delta: i64, out: &mut Vec<u8>) -> KvResult<()> {
    let current: i64 = match store.get(db, key)? {
        Some(entry) => parse_i64(entry.value.as_str()?)?,
        None => 0,
    };
    let new_value = current.checked_add(delta).ok_or(KvError::Overflow)?;
    let encoded = new_value.to_string().into_bytes();
    store.mutate_or_insert(db, key, || Value::Str(Vec::new()), |value| *value = Value::Str(encoded))?;
    resp_integer(out, new_value);
    Ok(())
}

pub fn incrby(store: &Store, db: u16, argv: &[Vec<u8>], out: &mut Vec<u8>) -> KvResult<()> {
    let delta = parse_i64(&argv[2])?;
    incr_by(store, db, &argv[1], delta, out)
}

pub fn decrby(store: &Store, db: u16, argv: &[Vec<u8>], out: &mut Vec<u8>) -> KvResult<()> {
    let delta = parse_i64(&argv[2])?.checked_neg().ok_or(KvError::Overflow)?;
    incr_by(store, db, &argv[1], delta, out)
}

pub fn getrange(store: &Store, db: u16, argv: &[Vec<u8>], out: &mut Vec<u8>) -> KvResult<()> {
    let start = parse_i64(&argv[2])?;
    let end = parse_i64(&argv[3])?;
    let bytes = match store.get(db, &argv[1])? {
        Some(entry) => entry.value.as_str()?.clone(),
        None => Vec::new(),
    };
    match clamp_index_range(start, end, bytes.len() as i64) {
        Some((lo, hi)) => resp_bulk(out, &bytes[lo..=hi]),
        None => resp_bulk(out, b""),
    }
    Ok(())
}

pub fn setrange(store: &Store, db: u16, argv: &[Vec<u8>], out: &mut Vec<u8>) -> KvResult<()> {
    let offset = parse_i64(&argv[2])?;
    if offset < 0 {
        return Err(KvError::Generic("offset is out of range".to_string()));
    }
    if let Some(entry) = store.get(db, &argv[1])? {
        entry.value.as_str()?;
    }
    let offset = offset as usize;
    let patch = argv[3].clone();
    let len = store.mutate_or_insert(
        db,
        &argv[1],
        || Value::Str(Vec::new()),
        move |value| -> KvResult<i64> {
            let bytes = value.as_str_mut()?;
            if bytes.len() < offset + patch.len() {
                bytes.resize(offset + patch.len(), 0);
            }
            bytes[offset..offset + patch.len()].copy_from_slice(&patch);
            Ok(bytes.len() as i64)
        },
    )??;
    resp_integer(out, len);
    Ok(())
}

pub fn mget(store: &Store, db: u16, argv: &[Vec<u8>], out: &mut Vec<u8>) -> KvResult<()> {
    resp_array_header(out, argv.len() - 1);
    for key in &argv[1..] {
        let reply = store.get(db, key)?.and_then(|entry| entry.value.as_str().ok().cloned());
        match reply {
            Some(bytes) => resp_bulk(out, &bytes),
            None => resp_null(out),
        }
    }
    Ok(())
}

pub fn mset(store: &Store, db: u16, argv: &[Vec<u8>], out: &mut Vec<u8>) -> KvResult<()> {
    if (argv.len() - 1) % 2 != 0 {
        return Err(KvError::Arity("MSET".to_string()));
    }
    for pair in argv[1..].chunks(2) {
        store.set(db, pair[0].clone(), Value::Str(pair[1].clone()))?;
    }
    resp_simple(out, "OK");
    Ok(())
}
