//! List-valued key commands: `LPUSH`, `RPUSH`, `LPOP`, `RPOP`, `LLEN`,
//! `LRANGE`, `LINDEX`, `LTRIM`.

use std::collections::VecDeque;

use kvault_common::KvResult;
use kvault_engine::{Store, Value};

use crate::commands::{clamp_index_range, parse_i64};
use crate::resp::{resp_array_of_bulks, resp_bulk, resp_integer, resp_null, resp_null_array};

pub fn lpush(store: &Store, db: u16, argv: &[Vec<u8>], out: &mut Vec<u8>) -> KvResult<()> {
    if let Some(entry) = store.get(db, &argv[1])? {
        entry.value.as_list()?;
    }
    let values: Vec<Vec<u8>> = argv[2..].to_vec();
    let len = store.mutate_or_insert(
        db,
        &argv[1],
        || Value::List(VecDeque::new()),
        move |value| -> KvResult<i64> {
            let list = value.as_list_mut()?;
            for v in values {
                list.push_front(v);
            }
            Ok(list.len() as i64)
        },
    )??;
    resp_integer(out, len);
    Ok(())
}

pub fn rpush(store: &Store, db: u16, argv: &[Vec<u8>], out: &mut Vec<u8>) -> KvResult<()> {
    if let Some(entry) = store.get(db, &argv[1])? {
        entry.value.as_list()?;
    }
    let values: Vec<Vec<u8>> = argv[2..].to_vec();
    let len = store.mutate_or_insert(
        db,
        &argv[1],
        || Value::List(VecDeque::new()),
        move |value| -> KvResult<i64> {
            let list = value.as_list_mut()?;
            for v in values {
                list.push_back(v);
            }
            Ok(list.len() as i64)
        },
    )??;
    resp_integer(out, len);
    Ok(())
}

fn pop(store: &Store, db: u16, argv: &[Vec<u8>], out: &mut Vec<u8>, from_front: bool) -> KvResult<()> {
    let count = if argv.len() == 3 { Some(parse_i64(&argv[2])?.max(0) as usize) } else { None };

    let entry = match store.get(db, &argv[1])? {
        Some(entry) => entry,
        None => {
            match count {
                Some(_) => resp_null_array(out),
                None => resp_null(out),
            }
            return Ok(());
        }
    };
    entry.value.as_list()?;

    let n = count.unwrap_or(1);
    let popped = store.mutate_or_insert(
        db,
        &argv[1],
        || Value::List(VecDeque::new()),
        move |value| -> KvResult<Vec<Vec<u8>>> {
            let list = value.as_list_mut()?;
            let mut popped = Vec::with_capacity(n.min(list.len()));
            for _ in 0..n {
                let item = if from_front { list.pop_front() } else { list.pop_back() };
                match item {
                    Some(v) => popped.push(v),
                    None => break,
                }
            }
            Ok(popped)
        },
    )??;
    store.delete_if_empty(db, &argv[1])?;

    match count {
        None => match popped.into_iter().next() {
            Some(v) => resp_bulk(out, &v),
            None => resp_null(out),
        },
        Some(_) => resp_array_of_bulks(out, &popped),
    }
    Ok(())
}

pub fn lpop(store: &Store, db: u16, argv: &[Vec<u8>], out: &mut Vec<u8>) -> KvResult<()> {
    pop(store, db, argv, out, true)
}

pub fn rpop(store: &Store, db: u16, argv: &[Vec<u8>], out: &mut Vec<u8>) -> KvResult<()> {
    pop(store, db, argv, out, false)
}

pub fn llen(store: &Store, db: u16, argv: &[Vec<u8>], out: &mut Vec<u8>) -> KvResult<()> {
    let len = match store.get(db, &argv[1])? {
        Some(entry) => entry.value.as_list()?.len(),
        None => 0,
    };
    resp_integer(out, len as i64);
    Ok(())
}

pub fn lrange(store: &Store, db: u16, argv: &[Vec<u8>], out: &mut Vec<u8>) -> KvResult<()> {
    let start = parse_i64(&argv[2])?;
    let stop = parse_i64(&argv[3])?;
    let items: Vec<Vec<u8>> = match store.get(db, &argv[1])? {
        Some(entry) => entry.value.as_list()?.iter().cloned().collect(),
        None => Vec::new(),
    };
    match clamp_index_range(start, stop, items.len() as i64) {
        Some((lo, hi)) => resp_array_of_bulks(out, &items[lo..=hi]),
        None => resp_array_of_bulks(out, &[]),
    }
    Ok(())
}

pub fn lindex(store: &Store, db: u16, argv: &[Vec<u8>], out: &mut Vec<u8>) -> KvResult<()> {
    let index = parse_i64(&argv[2])?;
    let item = match store.get(db, &argv[1])? {
        Some(entry) => {
            let list = entry.value.as_list()?;
            let len = list.len() as i64;
            let resolved = if index < 0 { len + index } else { index };
            if resolved < 0 || resolved >= len {
                None
            } else {
                list.get(resolved as usize).cloned()
            }
        }
        None => None,
    };
    match item {
        Some(bytes) => resp_bulk(out, &bytes),
        None => resp_null(out),
    }
    Ok(())
}

pub fn ltrim(store: &Store, db: u16, argv: &[Vec<u8>], out: &mut Vec<u8>) -> KvResult<()> {
    let start = parse_i64(&argv[2])?;
    let stop = parse_i64(&argv[3])?;
    if let Some(entry) = store.get(db, &argv[1])? {
        entry.value.as_list()?;
    } else {
        crate::resp::resp_simple(out, "OK");
        return Ok(());
    }
    store.mutate_or_insert(
        db,
        &argv[1],
        || Value::List(VecDeque::new()),
        move |value| -> KvResult<()> {
            let list = value.as_list_mut()?;
            let len = list.len() as i64;
            match clamp_index_range(start, stop, len) {
                Some((lo, hi)) => {
                    let trimmed: VecDeque<Vec<u8>> = list.iter().skip(lo).take(hi - lo + 1).cloned().collect();
                    *list = trimmed;
                }
                None => list.clear(),
            }
            Ok(())
        },
    )??;
    store.delete_if_empty(db, &argv[1])?;
    crate::resp::resp_simple(out, "OK");
    Ok(())
}
