// kvault-common - Shared types used across the store: the closed error
// enum, the version counter, password hashing, and configuration loading.

pub mod auth;
pub mod config;
pub mod error;
pub mod version;

pub use auth::PasswordHash;
pub use config::{Config, EvictionKind, EvictionScope, FsyncPolicy, LogLevel, MaxMemoryPolicy};
pub use error::{AofError, ConfigError, KvError, KvResult};
pub use version::Version;
