//! kvault-engine - the in-memory storage core: sharded dictionary, value
//! types, time-wheel expiration, eviction policies, and the multi-database
//! `Store` a connection session operates against.

pub mod db;
pub mod dict;
pub mod entry;
pub mod eviction;
pub mod store;
pub mod timewheel;
pub mod tx;
pub mod value;
pub mod zset;

pub use db::{Database, TtlStatus};
pub use dict::{PutOutcome, ShardedDict};
pub use entry::Entry;
pub use store::{AofSink, NullAofSink, Store};
pub use timewheel::{TimeWheel, TimeWheelHandle};
pub use tx::{SessionState, Transaction, WatchOutcome};
pub use value::{Bytes, Value, ValueKind};
pub use zset::SortedSet;
