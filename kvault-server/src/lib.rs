//! kvault-server - RESP framer, command dispatcher, AOF writer, connection
//! server, and the peripheral MONITOR/SLOWLOG/metrics components that sit
//! around the storage core in `kvault-engine`.

pub mod aof;
pub mod commands;
pub mod metrics;
pub mod monitor;
pub mod resp;
pub mod server;
pub mod session;
pub mod slowlog;

pub use server::{accept_connection, handle_connection, ServerShared};
pub use session::Session;
