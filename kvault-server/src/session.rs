//! # Connection Session State
//!
//! Purpose: Everything one connected client carries across commands that
//! is not part of the shared `Store` — which database it has `SELECT`ed,
//! whether it has passed `AUTH`, and its in-progress transaction, per
//! distilled spec §4.8 ("per-connection session: auth flag, selected db
//! index, Transaction").

use kvault_engine::Transaction;

pub struct Session {
    pub db_index: u16,
    pub authenticated: bool,
    pub tx: Transaction,
    pub name: Option<String>,
}

impl Session {
    pub fn new(requires_auth: bool) -> Self {
        Session {
            db_index: 0,
            authenticated: !requires_auth,
            tx: Transaction::new(),
            name: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_password_configured_starts_authenticated() {
        let session = Session::new(false);
        assert!(session.authenticated);
    }

    #[test]
    fn password_configured_starts_unauthenticated() {
        let session = Session::new(true);
        assert!(!session.authenticated);
    }

    #[test]
    fn new_session_selects_database_zero() {
        let session = Session::new(false);
        assert_eq!(session.db_index, 0);
    }
}
