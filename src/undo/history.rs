//! Bounded undo/redo history with memory caps and snapshot checkpoints.

use super::command::Command;
use super::snapshot::StateSnapshot;
use super::transaction::Transaction;
use crate::core::{
    EventDispatcher, MemoryPressureEvent, UndoRedoEvent, UndoRedoEventKind, VoxelEngine,
};
use log::{debug, warn};
use parking_lot::Mutex;
use std::sync::Arc;

pub const DEFAULT_MAX_HISTORY_SIZE: usize = 50;
pub const DEFAULT_MAX_MEMORY_USAGE: usize = 64 * 1024 * 1024;
/// A checkpoint snapshot is captured every this many commands; 0 disables
/// checkpoints.
pub const DEFAULT_SNAPSHOT_INTERVAL: usize = 10;

struct HistoryInner {
    undo_stack: Vec<Command>,
    redo_stack: Vec<Command>,
    snapshots: Vec<StateSnapshot>,
    transaction: Option<Transaction>,
    max_history_size: usize,
    max_memory_usage: usize,
    current_memory: usize,
    snapshot_interval: usize,
}

impl HistoryInner {
    fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty() && self.transaction.is_none()
    }

    fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty() && self.transaction.is_none()
    }

    fn recompute_memory(&mut self) {
        self.current_memory = self
            .undo_stack
            .iter()
            .chain(self.redo_stack.iter())
            .map(Command::memory_usage)
            .sum::<usize>()
            + self
                .snapshots
                .iter()
                .map(StateSnapshot::memory_usage)
                .sum::<usize>();
    }

    /// Drop the oldest undo entry and its checkpoint, if any.
    fn evict_oldest(&mut self) {
        if self.undo_stack.is_empty() {
            return;
        }
        self.undo_stack.remove(0);
        if !self.snapshots.is_empty() {
            self.snapshots.remove(0);
        }
    }
}

/// Owns command lifetimes and enforces count and memory caps.
///
/// New commands clear the redo stack; overflow evicts the *oldest* undo
/// entries. Redo entries are never evicted by the caps.
pub struct HistoryManager {
    engine: Arc<VoxelEngine>,
    dispatcher: Arc<EventDispatcher>,
    inner: Mutex<HistoryInner>,
}

impl HistoryManager {
    pub fn new(engine: Arc<VoxelEngine>) -> Self {
        let dispatcher = engine.dispatcher().clone();
        Self::with_dispatcher(engine, dispatcher)
    }

    pub fn with_dispatcher(engine: Arc<VoxelEngine>, dispatcher: Arc<EventDispatcher>) -> Self {
        Self {
            engine,
            dispatcher,
            inner: Mutex::new(HistoryInner {
                undo_stack: Vec::new(),
                redo_stack: Vec::new(),
                snapshots: Vec::new(),
                transaction: None,
                max_history_size: DEFAULT_MAX_HISTORY_SIZE,
                max_memory_usage: DEFAULT_MAX_MEMORY_USAGE,
                current_memory: 0,
                snapshot_interval: DEFAULT_SNAPSHOT_INTERVAL,
            }),
        }
    }

    fn notify(&self, inner: &HistoryInner, kind: UndoRedoEventKind, command_name: String) {
        self.dispatcher.dispatch_undo_redo(&UndoRedoEvent {
            kind,
            command_name,
            history_size: inner.undo_stack.len(),
            memory_usage: inner.current_memory,
            can_undo: inner.can_undo(),
            can_redo: inner.can_redo(),
        });
    }

    /// Execute a command and take ownership of it.
    ///
    /// Inside a transaction the command executes immediately but is held
    /// by the transaction instead of the stacks. A command whose
    /// execution fails is dropped entirely; the redo stack survives.
    pub fn execute(&self, mut command: Command) -> bool {
        let mut inner = self.inner.lock();

        if let Some(transaction) = inner.transaction.as_mut() {
            return transaction.add(command);
        }

        if !command.is_valid() {
            warn!("command '{}' failed validation", command.name());
            return false;
        }
        if !command.execute() {
            debug!("command '{}' did not execute", command.name());
            return false;
        }

        let name = command.name();
        inner.redo_stack.clear();
        inner.undo_stack.push(command);
        inner.recompute_memory();
        self.enforce_limits(&mut inner);

        if inner.snapshot_interval > 0 && inner.undo_stack.len() % inner.snapshot_interval == 0 {
            let mut snapshot = StateSnapshot::of_voxels(&self.engine, "history checkpoint");
            snapshot.compress();
            inner.snapshots.push(snapshot);
            inner.recompute_memory();
        }

        self.notify(&inner, UndoRedoEventKind::CommandExecuted, name);
        true
    }

    fn enforce_limits(&self, inner: &mut HistoryInner) {
        while inner.undo_stack.len() > inner.max_history_size {
            inner.evict_oldest();
        }
        inner.recompute_memory();
        while inner.current_memory > inner.max_memory_usage && !inner.undo_stack.is_empty() {
            self.dispatcher.dispatch_memory_pressure(&MemoryPressureEvent {
                current: inner.current_memory,
                limit: inner.max_memory_usage,
            });
            inner.evict_oldest();
            inner.recompute_memory();
        }
    }

    /// Undo the most recent command. On success the command moves to the
    /// redo stack; on failure it returns to the top of the undo stack.
    pub fn undo(&self) -> bool {
        let mut inner = self.inner.lock();
        if !inner.can_undo() {
            return false;
        }
        let Some(mut command) = inner.undo_stack.pop() else {
            return false;
        };
        if !command.undo() {
            warn!("undo failed for '{}'", command.name());
            inner.undo_stack.push(command);
            return false;
        }
        let name = command.name();
        inner.redo_stack.push(command);
        inner.recompute_memory();
        self.notify(&inner, UndoRedoEventKind::CommandUndone, name);
        true
    }

    /// Re-execute the most recently undone command.
    pub fn redo(&self) -> bool {
        let mut inner = self.inner.lock();
        if !inner.can_redo() {
            return false;
        }
        let Some(mut command) = inner.redo_stack.pop() else {
            return false;
        };
        if !command.execute() {
            warn!("redo failed for '{}'", command.name());
            inner.redo_stack.push(command);
            return false;
        }
        let name = command.name();
        inner.undo_stack.push(command);
        inner.recompute_memory();
        self.notify(&inner, UndoRedoEventKind::CommandRedone, name);
        true
    }

    pub fn can_undo(&self) -> bool {
        self.inner.lock().can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.inner.lock().can_redo()
    }

    pub fn history_size(&self) -> usize {
        self.inner.lock().undo_stack.len()
    }

    pub fn redo_size(&self) -> usize {
        self.inner.lock().redo_stack.len()
    }

    pub fn memory_usage(&self) -> usize {
        self.inner.lock().current_memory
    }

    pub fn snapshot_count(&self) -> usize {
        self.inner.lock().snapshots.len()
    }

    /// Command names, newest first.
    pub fn undo_names(&self) -> Vec<String> {
        self.inner
            .lock()
            .undo_stack
            .iter()
            .rev()
            .map(Command::name)
            .collect()
    }

    /// Command names, newest first.
    pub fn redo_names(&self) -> Vec<String> {
        self.inner
            .lock()
            .redo_stack
            .iter()
            .rev()
            .map(Command::name)
            .collect()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.undo_stack.clear();
        inner.redo_stack.clear();
        inner.snapshots.clear();
        inner.current_memory = 0;
        self.notify(&inner, UndoRedoEventKind::HistoryCleared, String::new());
    }

    pub fn set_max_history_size(&self, size: usize) {
        let mut inner = self.inner.lock();
        inner.max_history_size = size;
        self.enforce_limits(&mut inner);
    }

    pub fn set_max_memory_usage(&self, bytes: usize) {
        let mut inner = self.inner.lock();
        inner.max_memory_usage = bytes;
        self.enforce_limits(&mut inner);
    }

    /// Checkpoint frequency in commands; 0 disables checkpoints.
    pub fn set_snapshot_interval(&self, interval: usize) {
        self.inner.lock().snapshot_interval = interval;
    }

    /// Open a transaction. Commands executed while it is open are held
    /// aside and committed as one composite. Nested transactions are not
    /// supported.
    pub fn begin_transaction(&self, name: impl Into<String>) -> bool {
        let mut inner = self.inner.lock();
        if inner.transaction.is_some() {
            warn!("transaction already in progress");
            return false;
        }
        let name = name.into();
        inner.transaction = Some(Transaction::new(name.clone()));
        self.notify(&inner, UndoRedoEventKind::TransactionStarted, name);
        true
    }

    pub fn in_transaction(&self) -> bool {
        self.inner.lock().transaction.is_some()
    }

    /// Commit the open transaction as a single composite on the undo
    /// stack.
    pub fn end_transaction(&self) -> bool {
        let mut inner = self.inner.lock();
        let Some(transaction) = inner.transaction.take() else {
            warn!("no transaction to end");
            return false;
        };
        let composite = transaction.commit();
        let name = composite.name().to_string();
        if !composite.is_empty() {
            inner.redo_stack.clear();
            inner.undo_stack.push(Command::Composite(composite));
            inner.recompute_memory();
            self.enforce_limits(&mut inner);
        }
        self.notify(&inner, UndoRedoEventKind::TransactionCommitted, name);
        true
    }

    /// Roll back and discard the open transaction.
    pub fn cancel_transaction(&self) -> bool {
        let mut inner = self.inner.lock();
        let Some(mut transaction) = inner.transaction.take() else {
            warn!("no transaction to cancel");
            return false;
        };
        let name = transaction.name().to_string();
        transaction.rollback();
        self.notify(&inner, UndoRedoEventKind::TransactionRolledBack, name);
        true
    }
}
