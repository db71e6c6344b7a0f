//! `MULTI`, `EXEC`, `DISCARD`, `WATCH`, `UNWATCH` — the commands that
//! drive the per-session `{Normal, Queueing, Dirty}` state machine
//! itself, per distilled spec §4.5's state table. These never go through
//! the ordinary queue-vs-execute routing since they *are* that routing.

use kvault_common::KvError;
use kvault_engine::{SessionState, WatchOutcome};

use crate::resp::{resp_array_header, resp_error, resp_null_array, resp_simple};
use crate::server::ServerShared;
use crate::session::Session;

pub fn dispatch_tx_control(shared: &ServerShared, session: &mut Session, name: &str, argv: &[Vec<u8>], out: &mut Vec<u8>) {
    match name {
        "MULTI" => multi(session, out),
        "EXEC" => exec(shared, session, out),
        "DISCARD" => discard(session, out),
        "WATCH" => watch(shared, session, argv, out),
        "UNWATCH" => unwatch(session, out),
        _ => unreachable!("dispatch_tx_control only called for TxControl commands"),
    }
}

fn multi(session: &mut Session, out: &mut Vec<u8>) {
    if session.tx.is_active() {
        resp_error(out, "ERR MULTI calls can not be nested");
        return;
    }
    session.tx.begin();
    resp_simple(out, "OK");
}

fn discard(session: &mut Session, out: &mut Vec<u8>) {
    if !session.tx.is_active() {
        resp_error(out, "ERR DISCARD without MULTI");
        return;
    }
    session.tx.reset();
    resp_simple(out, "OK");
}

fn watch(shared: &ServerShared, session: &mut Session, argv: &[Vec<u8>], out: &mut Vec<u8>) {
    if session.tx.is_active() {
        resp_error(out, "ERR WATCH inside MULTI is not allowed");
        return;
    }
    let db = session.db_index;
    for key in &argv[1..] {
        session.tx.watch(&shared.store, db, key);
    }
    resp_simple(out, "OK");
}

fn unwatch(session: &mut Session, out: &mut Vec<u8>) {
    session.tx.unwatch();
    resp_simple(out, "OK");
}

fn exec(shared: &ServerShared, session: &mut Session, out: &mut Vec<u8>) {
    if !session.tx.is_active() {
        resp_error(out, "ERR EXEC without MULTI");
        return;
    }
    if session.tx.state() == SessionState::Dirty {
        session.tx.reset();
        resp_error(out, &KvError::DirtyTransaction.reply_text("EXEC"));
        return;
    }

    let outcome = session.tx.check_watches(&shared.store);
    let queued = session.tx.reset();

    if outcome == WatchOutcome::Aborted {
        resp_null_array(out);
        return;
    }

    resp_array_header(out, queued.len());
    for argv in queued {
        let name = argv[0].clone();
        let name = String::from_utf8_lossy(&name).to_ascii_uppercase();
        // Arity was already validated at queue time; a command only
        // reaches the queue once `lookup` has recognized it.
        if let Some((kind, _)) = super::lookup(&name) {
            super::execute(shared, session, kind, &name, &argv, out);
        }
    }
}
