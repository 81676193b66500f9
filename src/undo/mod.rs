//! Reversible commands, transactions, bounded history and snapshots.

mod command;
mod history;
mod snapshot;
mod transaction;

pub use command::{Command, CommandKind, CompositeCommand};
pub use history::{
    HistoryManager, DEFAULT_MAX_HISTORY_SIZE, DEFAULT_MAX_MEMORY_USAGE,
    DEFAULT_SNAPSHOT_INTERVAL,
};
pub use snapshot::StateSnapshot;
pub use transaction::Transaction;
