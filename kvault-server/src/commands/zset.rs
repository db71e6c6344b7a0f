//! Sorted-set-valued key commands: `ZADD`, `ZSCORE`, `ZREM`, `ZCARD`,
//! `ZRANGE`, `ZRANGEBYSCORE`, `ZINCRBY`.

use kvault_common::{KvError, KvResult};
use kvault_engine::{SortedSet, Store, Value};

use crate::commands::parse_f64;
use crate::resp::{resp_array_header, resp_bulk, resp_integer, resp_null};

/// `ZADD key score member [score member ...]`.
pub fn zadd(store: &Store, db: u16, argv: &[Vec<u8>], out: &mut Vec<u8>) -> KvResult<()> {
    if (argv.len() - 2) % 2 != 0 {
        return Err(KvError::Arity("ZADD".to_string()));
    }
    if let Some(entry) = store.get(db, &argv[1])? {
        entry.value.as_zset()?;
    }
    let mut pairs = Vec::with_capacity((argv.len() - 2) / 2);
    for chunk in argv[2..].chunks(2) {
        pairs.push((chunk[1].clone(), parse_f64(&chunk[0])?));
    }
    let added = store.mutate_or_insert(
        db,
        &argv[1],
        || Value::ZSet(SortedSet::new()),
        move |value| -> KvResult<i64> {
            let zset = value.as_zset_mut()?;
            let mut added = 0i64;
            for (member, score) in pairs {
                if zset.insert(member, score) {
                    added += 1;
                }
            }
            Ok(added)
        },
    )??;
    resp_integer(out, added);
    Ok(())
}

pub fn zscore(store: &Store, db: u16, argv: &[Vec<u8>], out: &mut Vec<u8>) -> KvResult<()> {
    let score = match store.get(db, &argv[1])? {
        Some(entry) => entry.value.as_zset()?.score(&argv[2]),
        None => None,
    };
    match score {
        Some(s) => resp_bulk(out, format_score(s).as_bytes()),
        None => resp_null(out),
    }
    Ok(())
}

pub fn zrem(store: &Store, db: u16, argv: &[Vec<u8>], out: &mut Vec<u8>) -> KvResult<()> {
    if let Some(entry) = store.get(db, &argv[1])? {
        entry.value.as_zset()?;
    } else {
        resp_integer(out, 0);
        return Ok(());
    }
    let members: Vec<Vec<u8>> = argv[2..].to_vec();
    let removed = store.mutate_or_insert(
        db,
        &argv[1],
        || Value::ZSet(SortedSet::new()),
        move |value| -> KvResult<i64> {
            let zset = value.as_zset_mut()?;
            let mut removed = 0i64;
            for member in members {
                if zset.remove(&member) {
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

pub fn zcard(store: &Store, db: u16, argv: &[Vec<u8>], out: &mut Vec<u8>) -> KvResult<()> {
    let len = match store.get(db, &argv[1])? {
        Some(entry) => entry.value.as_zset()?.len(),
        None => 0,
    };
    resp_integer(out, len as i64);
    Ok(())
}

fn with_scores_flag(argv: &[Vec<u8>], idx: usize) -> KvResult<bool> {
    match argv.get(idx) {
        None => Ok(false),
        Some(flag) if flag.eq_ignore_ascii_case(b"WITHSCORES") => Ok(true),
        Some(_) => Err(KvError::Generic("syntax error".to_string())),
    }
}

fn reply_members(out: &mut Vec<u8>, members: Vec<(Vec<u8>, f64)>, with_scores: bool) {
    let per_item = if with_scores { 2 } else { 1 };
    resp_array_header(out, members.len() * per_item);
    for (member, score) in members {
        resp_bulk(out, &member);
        if with_scores {
            resp_bulk(out, format_score(score).as_bytes());
        }
    }
}

pub fn zrange(store: &Store, db: u16, argv: &[Vec<u8>], out: &mut Vec<u8>) -> KvResult<()> {
    let start = crate::commands::parse_i64(&argv[2])?;
    let stop = crate::commands::parse_i64(&argv[3])?;
    let with_scores = with_scores_flag(argv, 4)?;
    let members = match store.get(db, &argv[1])? {
        Some(entry) => entry.value.as_zset()?.range_by_rank(start, stop),
        None => Vec::new(),
    };
    reply_members(out, members, with_scores);
    Ok(())
}

pub fn zrangebyscore(store: &Store, db: u16, argv: &[Vec<u8>], out: &mut Vec<u8>) -> KvResult<()> {
    let min = parse_f64(&argv[2])?;
    let max = parse_f64(&argv[3])?;
    let with_scores = with_scores_flag(argv, 4)?;
    let members = match store.get(db, &argv[1])? {
        Some(entry) => entry.value.as_zset()?.range_by_score(min, max),
        None => Vec::new(),
    };
    reply_members(out, members, with_scores);
    Ok(())
}

pub fn zincrby(store: &Store, db: u16, argv: &[Vec<u8>], out: &mut Vec<u8>) -> KvResult<()> {
    let delta = parse_f64(&argv[2])?;
    let member = argv[3].clone();
    if let Some(entry) = store.get(db, &argv[1])? {
        entry.value.as_zset()?;
    }
    let new_score = store.mutate_or_insert(
        db,
        &argv[1],
        || Value::ZSet(SortedSet::new()),
        move |value| -> KvResult<f64> {
            let zset = value.as_zset_mut()?;
            let current = zset.score(&member).unwrap_or(0.0);
            let new_score = current + delta;
            if new_score.is_nan() {
                return Err(KvError::NotAFloat);
            }
            zset.insert(member, new_score);
            Ok(new_score)
        },
    )??;
    resp_bulk(out, format_score(new_score).as_bytes());
    Ok(())
}

/// Matches Redis's float formatting for scores: integral values print
/// without a decimal point.
fn format_score(score: f64) -> String {
    if score.fract() == 0.0 && score.is_finite() {
        format!("{}", score as i64)
    } else {
        format!("{score}")
    }
}
