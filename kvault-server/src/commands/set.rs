//! Set-valued key commands: `SADD`, `SREM`, `SISMEMBER`, `SMEMBERS`,
//! `SCARD`.

use std::collections::HashSet;

use kvault_common::KvResult;
use kvault_engine::{Store, Value};

use crate::resp::{resp_array_of_bulks, resp_integer};

pub fn sadd(store: &Store, db: u16, argv: &[Vec<u8>], out: &mut Vec<u8>) -> KvResult<()> {
    if let Some(entry) = store.get(db, &argv[1])? {
        entry.value.as_set()?;
    }
    let members: Vec<Vec<u8>> = argv[2..].to_vec();
    let added = store.mutate_or_insert(
        db,
        &argv[1],
        || Value::Set(HashSet::new()),
        move |value| -> KvResult<i64> {
            let set = value.as_set_mut()?;
            let mut added = 0i64;
            for member in members {
                if set.insert(member) {
                    added += 1;
                }
            }
            Ok(added)
        },
    )??;
    resp_integer(out, added);
    Ok(())
}

pub fn srem(store: &Store, db: u16, argv: &[Vec<u8>], out: &mut Vec<u8>) -> KvResult<()> {
    if let Some(entry) = store.get(db, &argv[1])? {
        entry.value.as_set()?;
    } else {
        resp_integer(out, 0);
        return Ok(());
    }
    let members: Vec<Vec<u8>> = argv[2..].to_vec();
    let removed = store.mutate_or_insert(
        db,
        &argv[1],
        || Value::Set(HashSet::new()),
        move |value| -> KvResult<i64> {
            let set = value.as_set_mut()?;
            let mut removed = 0i64;
            for member in members {
                if set.remove(&member) {
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

pub fn sismember(store: &Store, db: u16, argv: &[Vec<u8>], out: &mut Vec<u8>) -> KvResult<()> {
    let is_member = match store.get(db, &argv[1])? {
        Some(entry) => entry.value.as_set()?.contains(argv[2].as_slice()),
        None => false,
    };
    resp_integer(out, is_member as i64);
    Ok(())
}

pub fn smembers(store: &Store, db: u16, argv: &[Vec<u8>], out: &mut Vec<u8>) -> KvResult<()> {
    let members: Vec<Vec<u8>> = match store.get(db, &argv[1])? {
        Some(entry) => entry.value.as_set()?.iter().cloned().collect(),
        None => Vec::new(),
    };
    resp_array_of_bulks(out, &members);
    Ok(())
}

pub fn scard(store: &Store, db: u16, argv: &[Vec<u8>], out: &mut Vec<u8>) -> KvResult<()> {
    let len = match store.get(db, &argv[1])? {
        Some(entry) => entry.value.as_set()?.len(),
        None => 0,
    };
    resp_integer(out, len as i64);
    Ok(())
}
