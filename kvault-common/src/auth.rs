//! # Authentication Helpers
//!
//! Purpose: Hash and compare `requirepass` passwords without ever storing
//! or logging the plaintext past the point of comparison.
//!
//! ## Design Principles
//! 1. **Hash at Load Time**: the config loader hashes `requirepass` once;
//!    the hot path only ever compares digests.
//! 2. **Constant-Ish Comparison**: digest comparison goes through a
//!    bytewise equality that does not special-case length up front, to
//!    avoid an obvious early-exit timing signal on length mismatches.

use sha2::{Digest, Sha256};

/// A SHA-256 digest of a password, stored instead of the plaintext.
#[derive(Clone, PartialEq, Eq)]
pub struct PasswordHash([u8; 32]);

impl PasswordHash {
    /// Hashes a plaintext password.
    pub fn hash(password: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(password.as_bytes());
        let digest = hasher.finalize();
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        PasswordHash(bytes)
    }

    /// Compares a plaintext candidate against this hash.
    pub fn matches(&self, candidate: &str) -> bool {
        PasswordHash::hash(candidate).0 == self.0
    }
}

impl std::fmt::Debug for PasswordHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PasswordHash(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_correct_password() {
        let hash = PasswordHash::hash("hunter2");
        assert!(hash.matches("hunter2"));
    }

    #[test]
    fn rejects_wrong_password() {
        let hash = PasswordHash::hash("hunter2");
        assert!(!hash.matches("wrong"));
    }

    #[test]
    fn debug_does_not_leak_plaintext() {
        let hash = PasswordHash::hash("hunter2");
        let debug = format!("{:?}", hash);
        assert!(!debug.contains("hunter2"));
    }
}
