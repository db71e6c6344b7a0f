//! Hash-valued key commands: `HSET`, `HGET`, `HDEL`, `HEXISTS`,
//! `HGETALL`, `HKEYS`, `HVALS`, `HLEN`, `HINCRBY`.

use kvault_common::{KvError, KvResult};
use kvault_engine::{Store, Value};

use crate::commands::parse_i64;
use crate::resp::{resp_array_header, resp_bulk, resp_integer};

/// `HSET key field value [field value ...]`.
pub fn hset(store: &Store, db: u16, argv: &[Vec<u8>], out: &mut Vec<u8>) -> KvResult<()> {
    if (argv.len() - 2) % 2 != 0 {
        return Err(KvError::Arity("HSET".to_string()));
    }
    if let Some(entry) = store.get(db, &argv[1])? {
        entry.value.as_hash()?;
    }
    let pairs: Vec<(Vec<u8>, Vec<u8>)> =
        argv[2..].chunks(2).map(|c| (c[0].clone(), c[1].clone())).collect();
    let added = store.mutate_or_insert(
        db,
        &argv[1],
        || Value::Hash(Default::default()),
        move |value| -> KvResult<i64> {
            let map = value.as_hash_mut()?;
            let mut added = 0i64;
            for (field, val) in pairs {
                if map.insert(field, val).is_none() {
                    added += 1;
                }
            }
            Ok(added)
        },
    )??;
    resp_integer(out, added);
    Ok(())
}

pub fn hget(store: &Store, db: u16, argv: &[Vec<u8>], out: &mut Vec<u8>) -> KvResult<()> {
    let value = store
        .get(db, &argv[1])?
        .map(|entry| entry.value.as_hash().map(|h| h.get(argv[2].as_slice()).cloned()))
        .transpose()?
        .flatten();
    match value {
        Some(bytes) => resp_bulk(out, &bytes),
        None => crate::resp::resp_null(out),
    }
    Ok(())
}

pub fn hdel(store: &Store, db: u16, argv: &[Vec<u8>], out: &mut Vec<u8>) -> KvResult<()> {
    if let Some(entry) = store.get(db, &argv[1])? {
        entry.value.as_hash()?;
    } else {
        resp_integer(out, 0);
        return Ok(());
    }
    let fields: Vec<Vec<u8>> = argv[2..].to_vec();
    let removed = store.mutate_or_insert(
        db,
        &argv[1],
        || Value::Hash(Default::default()),
        move |value| -> KvResult<i64> {
            let map = value.as_hash_mut()?;
            let mut removed = 0i64;
            for field in fields {
                if map.remove(&field).is_some() {
                    removed += 1;
                }
            }
            Ok(removed)
        },
    )??;
    store.delete_if_empty(db, &argv[1])?;
    resp_integer(out, removed);
    Ok(())
}

pub fn hexists(store: &Store, db: u16, argv: &[Vec<u8>], out: &mut Vec<u8>) -> KvResult<()> {
    let exists = match store.get(db, &argv[1])? {
        Some(entry) => entry.value.as_hash()?.contains_key(argv[2].as_slice()),
        None => false,
    };
    resp_integer(out, exists as i64);
    Ok(())
}

pub fn hgetall(store: &Store, db: u16, argv: &[Vec<u8>], out: &mut Vec<u8>) -> KvResult<()> {
    let pairs: Vec<(Vec<u8>, Vec<u8>)> = match store.get(db, &argv[1])? {
        Some(entry) => entry.value.as_hash()?.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        None => Vec::new(),
    };
    resp_array_header(out, pairs.len() * 2);
    for (field, value) in pairs {
        resp_bulk(out, &field);
        resp_bulk(out, &value);
    }
    Ok(())
}

pub fn hkeys(store: &Store, db: u16, argv: &[Vec<u8>], out: &mut Vec<u8>) -> KvResult<()> {
    let keys: Vec<Vec<u8>> = match store.get(db, &argv[1])? {
        Some(entry) => entry.value.as_hash()?.keys().cloned().collect(),
        None => Vec::new(),
    };
    crate::resp::resp_array_of_bulks(out, &keys);
    Ok(())
}

pub fn hvals(store: &Store, db: u16, argv: &[Vec<u8>], out: &mut Vec<u8>) -> KvResult<()> {
    let vals: Vec<Vec<u8>> = match store.get(db, &argv[1])? {
        Some(entry) => entry.value.as_hash()?.values().cloned().collect(),
        None => Vec::new(),
    };
    crate::resp::resp_array_of_bulks(out, &vals);
    Ok(())
}

pub fn hlen(store: &Store, db: u16, argv: &[Vec<u8>], out: &mut Vec<u8>) -> KvResult<()> {
    let len = match store.get(db, &argv[1])? {
        Some(entry) => entry.value.as_hash()?.len(),
        None => 0,
    };
    resp_integer(out, len as i64);
    Ok(())
}

pub fn hincrby(store: &Store, db: u16, argv: &[Vec<u8>], out: &mut Vec<u8>) -> KvResult<()> {
    let delta = parse_i64(&argv[3])?;
    if let Some(entry) = store.get(db, &argv[1])? {
        entry.value.as_hash()?;
    }
    let field = argv[2].clone();
    let new_value = store.mutate_or_insert(
        db,
        &argv[1],
        || Value::Hash(Default::default()),
        move |value| -> KvResult<i64> {
            let map = value.as_hash_mut()?;
            let current = match map.get(&field) {
                Some(bytes) => parse_i64(bytes)?,
                None => 0,
            };
            let new_value = current.checked_add(delta).ok_or(KvError::Overflow)?;
            map.insert(field, new_value.to_string().into_bytes());
            Ok(new_value)
        },
    )??;
    resp_integer(out, new_value);
    Ok(())
}
