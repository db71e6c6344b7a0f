//! # Configuration Loading
//!
//! Purpose: Parse the text configuration file format into an immutable,
//! process-wide `Config` record, constructed once at startup and handed
//! by reference into every component — never touched as an ambient
//! global.
//!
//! ## Format
//!
//! One `key value` pair per line. `#` starts a comment that runs to the
//! end of the line (unless inside a double-quoted value). Values may be
//! wrapped in double quotes to include leading/trailing whitespace.
//!
//! ## Design Principles
//! 1. **Fail Loud at Load Time**: unknown keys and invalid values are a
//!    load-time error, never a silently-ignored default.
//! 2. **Immutable Record**: once loaded, `Config` is read-only; runtime
//!    overrides (`CONFIG SET`) operate on a separate, explicitly mutable
//!    handle in the server crate, not on this struct.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::auth::PasswordHash;
use crate::error::ConfigError;

/// `appendfsync` policy (distilled spec §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsyncPolicy {
    Always,
    EverySec,
    No,
}

impl FromStr for FsyncPolicy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "always" => Ok(FsyncPolicy::Always),
            "everysec" => Ok(FsyncPolicy::EverySec),
            "no" => Ok(FsyncPolicy::No),
            _ => Err(()),
        }
    }
}

/// Logging verbosity (distilled spec §6, `loglevel`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Maps to a `tracing` level filter string.
    pub fn as_filter_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(()),
        }
    }
}

/// Eviction policy scope: which keys a tracker considers (distilled §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionScope {
    AllKeys,
    Volatile,
}

/// Eviction tracker kind (distilled §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionKind {
    Lru,
    Lfu,
    Random,
    Ttl,
}

/// `maxmemory-policy` — one of eight scoped policies, or `noeviction`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaxMemoryPolicy {
    NoEviction,
    Scoped(EvictionScope, EvictionKind),
}

impl FromStr for MaxMemoryPolicy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use EvictionKind::*;
        use EvictionScope::*;
        match s {
            "noeviction" => Ok(MaxMemoryPolicy::NoEviction),
            "allkeys-lru" => Ok(MaxMemoryPolicy::Scoped(AllKeys, Lru)),
            "allkeys-lfu" => Ok(MaxMemoryPolicy::Scoped(AllKeys, Lfu)),
            "allkeys-random" => Ok(MaxMemoryPolicy::Scoped(AllKeys, Random)),
            "volatile-lru" => Ok(MaxMemoryPolicy::Scoped(Volatile, Lru)),
            "volatile-lfu" => Ok(MaxMemoryPolicy::Scoped(Volatile, Lfu)),
            "volatile-random" => Ok(MaxMemoryPolicy::Scoped(Volatile, Random)),
            "volatile-ttl" => Ok(MaxMemoryPolicy::Scoped(Volatile, Ttl)),
            _ => Err(()),
        }
    }
}

impl fmt::Display for MaxMemoryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use EvictionKind::*;
        use EvictionScope::*;
        let s = match self {
            MaxMemoryPolicy::NoEviction => "noeviction",
            MaxMemoryPolicy::Scoped(AllKeys, Lru) => "allkeys-lru",
            MaxMemoryPolicy::Scoped(AllKeys, Lfu) => "allkeys-lfu",
            MaxMemoryPolicy::Scoped(AllKeys, Random) => "allkeys-random",
            MaxMemoryPolicy::Scoped(AllKeys, Ttl) => "allkeys-ttl",
            MaxMemoryPolicy::Scoped(Volatile, Lru) => "volatile-lru",
            MaxMemoryPolicy::Scoped(Volatile, Lfu) => "volatile-lfu",
            MaxMemoryPolicy::Scoped(Volatile, Random) => "volatile-random",
            MaxMemoryPolicy::Scoped(Volatile, Ttl) => "volatile-ttl",
        };
        write!(f, "{s}")
    }
}

/// Immutable, process-wide configuration record.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub databases: u16,
    pub maxclients: usize,
    pub timeout_secs: u64,
    pub appendonly: bool,
    pub appendfilename: String,
    pub appendfsync: FsyncPolicy,
    pub dbfilename: String,
    pub loglevel: LogLevel,
    pub logfile: Option<String>,
    pub requirepass: Option<PasswordHash>,
    pub maxmemory: u64,
    pub maxmemory_policy: MaxMemoryPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind: "127.0.0.1".to_string(),
            port: 6379,
            databases: 16,
            maxclients: 10_000,
            timeout_secs: 0,
            appendonly: false,
            appendfilename: "appendonly.aof".to_string(),
            appendfsync: FsyncPolicy::EverySec,
            dbfilename: "dump.rdb".to_string(),
            loglevel: LogLevel::Info,
            logfile: None,
            requirepass: None,
            maxmemory: 0,
            maxmemory_policy: MaxMemoryPolicy::NoEviction,
        }
    }
}

/// Recognized top-level configuration keys (distilled spec §6 table).
const KNOWN_KEYS: &[&str] = &[
    "bind",
    "port",
    "databases",
    "maxclients",
    "timeout",
    "appendonly",
    "appendfilename",
    "appendfsync",
    "dbfilename",
    "loglevel",
    "logfile",
    "requirepass",
    "maxmemory",
    "maxmemory-policy",
];

impl Config {
    /// Loads and validates a configuration file, returning a ready-to-use
    /// immutable record.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|err| ConfigError::Read {
            path: path.display().to_string(),
            reason: err.to_string(),
        })?;
        Config::parse(&contents)
    }

    /// Parses configuration file contents directly (used by tests and by
    /// `load_from_file`).
    pub fn parse(contents: &str) -> Result<Config, ConfigError> {
        let mut config = Config::default();
        let known: HashSet<&str> = KNOWN_KEYS.iter().copied().collect();

        for (idx, raw_line) in contents.lines().enumerate() {
            let line_no = idx + 1;
            let line = strip_comment(raw_line).trim();
            if line.is_empty() {
                continue;
            }

            let (key, value) = split_key_value(line).ok_or_else(|| ConfigError::MalformedLine {
                line_no,
                line: raw_line.to_string(),
            })?;

            if !known.contains(key) {
                return Err(ConfigError::UnknownKey(key.to_string()));
            }

            apply_key(&mut config, key, &value)?;
        }

        Ok(config)
    }
}

fn strip_comment(line: &str) -> &str {
    let mut in_quotes = false;
    for (idx, ch) in line.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            '#' if !in_quotes => return &line[..idx],
            _ => {}
        }
    }
    line
}

fn split_key_value(line: &str) -> Option<(&str, String)> {
    let mut parts = line.splitn(2, char::is_whitespace);
    let key = parts.next()?.trim();
    let rest = parts.next().unwrap_or("").trim();
    if key.is_empty() {
        return None;
    }
    Some((key, unquote(rest)))
}

fn unquote(value: &str) -> String {
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        value[1..value.len() - 1].to_string()
    } else {
        value.to_string()
    }
}

fn apply_key(config: &mut Config, key: &str, value: &str) -> Result<(), ConfigError> {
    let invalid = || ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    };

    match key {
        "bind" => config.bind = value.to_string(),
        "port" => {
            let port: u32 = value.parse().map_err(|_| invalid())?;
            if port == 0 || port > 65535 {
                return Err(invalid());
            }
            config.port = port as u16;
        }
        "databases" => {
            let count: u32 = value.parse().map_err(|_| invalid())?;
            if count == 0 || count > 256 {
                return Err(invalid());
            }
            config.databases = count as u16;
        }
        "maxclients" => {
            config.maxclients = value.parse().map_err(|_| invalid())?;
        }
        "timeout" => {
            config.timeout_secs = value.parse().map_err(|_| invalid())?;
        }
        "appendonly" => {
            config.appendonly = parse_bool(value).ok_or_else(invalid)?;
        }
        "appendfilename" => config.appendfilename = value.to_string(),
        "appendfsync" => {
            config.appendfsync = value.parse().map_err(|_| invalid())?;
        }
        "dbfilename" => config.dbfilename = value.to_string(),
        "loglevel" => {
            config.loglevel = value.parse().map_err(|_| invalid())?;
        }
        "logfile" => {
            config.logfile = if value.is_empty() { None } else { Some(value.to_string()) };
        }
        "requirepass" => {
            config.requirepass = if value.is_empty() {
                None
            } else {
                Some(PasswordHash::hash(value))
            };
        }
        "maxmemory" => {
            config.maxmemory = parse_memory(value).ok_or_else(invalid)?;
        }
        "maxmemory-policy" => {
            config.maxmemory_policy = value.parse().map_err(|_| invalid())?;
        }
        _ => return Err(ConfigError::UnknownKey(key.to_string())),
    }

    Ok(())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "yes" => Some(true),
        "no" => Some(false),
        _ => None,
    }
}

/// Parses a byte count with optional `k/kb/m/mb/g/gb/t/tb` suffix
/// (distilled spec §6, `maxmemory`). `0` means unlimited.
fn parse_memory(value: &str) -> Option<u64> {
    let lower = value.to_ascii_lowercase();
    let (digits, multiplier): (&str, u64) = if let Some(stripped) = lower.strip_suffix("kb") {
        (stripped, 1024)
    } else if let Some(stripped) = lower.strip_suffix("mb") {
        (stripped, 1024 * 1024)
    } else if let Some(stripped) = lower.strip_suffix("gb") {
        (stripped, 1024 * 1024 * 1024)
    } else if let Some(stripped) = lower.strip_suffix("tb") {
        (stripped, 1024 * 1024 * 1024 * 1024)
    } else if let Some(stripped) = lower.strip_suffix('k') {
        (stripped, 1024)
    } else if let Some(stripped) = lower.strip_suffix('m') {
        (stripped, 1024 * 1024)
    } else if let Some(stripped) = lower.strip_suffix('g') {
        (stripped, 1024 * 1024 * 1024)
    } else if let Some(stripped) = lower.strip_suffix('t') {
        (stripped, 1024 * 1024 * 1024 * 1024)
    } else {
        (lower.as_str(), 1)
    };

    let base: u64 = digits.trim().parse().ok()?;
    base.checked_mul(multiplier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_file() {
        let cfg = Config::parse("port 6380\ndatabases 4\n").unwrap();
        assert_eq!(cfg.port, 6380);
        assert_eq!(cfg.databases, 4);
    }

    #[test]
    fn comments_and_quotes() {
        let cfg = Config::parse("# a comment\nlogfile \"/var/log/kvault.log\" # trailing\n").unwrap();
        assert_eq!(cfg.logfile.as_deref(), Some("/var/log/kvault.log"));
    }

    #[test]
    fn rejects_unknown_key() {
        let err = Config::parse("frobnicate yes\n").unwrap_err();
        assert_eq!(err, ConfigError::UnknownKey("frobnicate".to_string()));
    }

    #[test]
    fn rejects_invalid_port() {
        let err = Config::parse("port 99999\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn rejects_invalid_policy() {
        let err = Config::parse("maxmemory-policy bogus\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn parses_memory_suffixes() {
        let cfg = Config::parse("maxmemory 1k\n").unwrap();
        assert_eq!(cfg.maxmemory, 1024);
        let cfg = Config::parse("maxmemory 2mb\n").unwrap();
        assert_eq!(cfg.maxmemory, 2 * 1024 * 1024);
        let cfg = Config::parse("maxmemory 0\n").unwrap();
        assert_eq!(cfg.maxmemory, 0);
    }

    #[test]
    fn requirepass_is_hashed_not_stored_plaintext() {
        let cfg = Config::parse("requirepass secret\n").unwrap();
        let hash = cfg.requirepass.expect("hash present");
        assert!(hash.matches("secret"));
        assert!(!hash.matches("wrong"));
    }
}
