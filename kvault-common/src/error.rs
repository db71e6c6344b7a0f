//! # Error Kinds
//!
//! Purpose: Define the closed set of errors a command can fail with, and
//! the RESP error-reply text each one maps to.
//!
//! ## Design Principles
//! 1. **Closed Enum**: the set of error kinds is fixed; new failure modes
//!    must be expressed as one of these, not as ad-hoc strings.
//! 2. **Reply-Ready**: each variant knows its own RESP error prefix so the
//!    dispatcher never has to duplicate wire-format knowledge.
//! 3. **Command-Local**: an error here never corrupts shared state; it is
//!    always returned to the issuing session only.

use thiserror::Error;

/// Errors surfaced while executing a single command.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KvError {
    /// Malformed RESP framing; the connection must be closed after this.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Wrong number of arguments for a command.
    #[error("wrong number of arguments for '{0}'")]
    Arity(String),

    /// Command applied to a key holding the wrong value kind.
    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,

    /// INCR/ZADD/etc. on a value that is not a valid integer.
    #[error("value is not an integer or out of range")]
    NotAnInteger,

    /// INCRBYFLOAT/ZADD/etc. on a value that is not a valid float.
    #[error("value is not a valid float")]
    NotAFloat,

    /// Arithmetic would overflow a signed 64-bit integer.
    #[error("increment or decrement would overflow")]
    Overflow,

    /// AUTH is required but missing, or a command requires it.
    #[error("NOAUTH Authentication required.")]
    AuthRequired,

    /// AUTH was attempted with the wrong password.
    #[error("WRONGPASS invalid username-password pair or user is disabled.")]
    WrongPass,

    /// `requirepass` is not set, so `AUTH` makes no sense.
    #[error("ERR Client sent AUTH, but no password is set.")]
    AuthNotSet,

    /// Memory is over budget and the policy cannot free enough room.
    #[error("OOM command not allowed when used memory > 'maxmemory'.")]
    OutOfMemory,

    /// `EXEC` after a queueing-time syntactic error.
    #[error("EXECABORT Transaction discarded because of previous errors.")]
    DirtyTransaction,

    /// Command is valid but a precondition on the target database failed
    /// (e.g. `SELECT` out of range, or a config/admin failure).
    #[error("ERR {0}")]
    Generic(String),
}

impl KvError {
    /// Returns the RESP error-reply text (without the leading `-` or
    /// trailing `\r\n`, which the framer adds).
    pub fn reply_text(&self, command_name: &str) -> String {
        match self {
            KvError::Protocol(msg) => format!("ERR Protocol error: {msg}"),
            KvError::Arity(_) => {
                format!("ERR wrong number of arguments for '{}'", command_name.to_ascii_lowercase())
            }
            KvError::WrongType => {
                "WRONGTYPE Operation against a key holding the wrong kind of value".to_string()
            }
            KvError::NotAnInteger => "ERR value is not an integer or out of range".to_string(),
            KvError::NotAFloat => "ERR value is not a valid float".to_string(),
            KvError::Overflow => "ERR increment or decrement would overflow".to_string(),
            KvError::AuthRequired => "NOAUTH Authentication required.".to_string(),
            KvError::WrongPass => {
                "WRONGPASS invalid username-password pair or user is disabled.".to_string()
            }
            KvError::AuthNotSet => "ERR Client sent AUTH, but no password is set.".to_string(),
            KvError::OutOfMemory => {
                "OOM command not allowed when used memory > 'maxmemory'.".to_string()
            }
            KvError::DirtyTransaction => {
                "EXECABORT Transaction discarded because of previous errors.".to_string()
            }
            KvError::Generic(msg) => format!("ERR {msg}"),
        }
    }
}

/// Result alias used across the store.
pub type KvResult<T> = Result<T, KvError>;

/// Errors surfaced while loading or validating a configuration file.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("could not read config file {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("unknown configuration key '{0}'")]
    UnknownKey(String),

    #[error("invalid value for '{key}': {value}")]
    InvalidValue { key: String, value: String },

    #[error("malformed line {line_no}: {line}")]
    MalformedLine { line_no: usize, line: String },
}

/// Errors surfaced by the append-only log writer. These are logged by the
/// caller and never surfaced to the client (distilled spec §7, IOError).
#[derive(Debug, Error)]
pub enum AofError {
    #[error("aof io error: {0}")]
    Io(#[from] std::io::Error),
}
