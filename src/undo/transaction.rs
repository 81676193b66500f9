//! Scoped command accumulation.
//!
//! A transaction executes commands eagerly (so their effects are visible
//! while it is open) and either commits them as one composite or rolls
//! them back in reverse order. Dropping an open transaction rolls back.

use super::command::{Command, CompositeCommand};
use log::{error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransactionState {
    Open,
    Committed,
    RolledBack,
}

pub struct Transaction {
    name: String,
    executed: Vec<Command>,
    state: TransactionState,
}

impl Transaction {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            executed: Vec::new(),
            state: TransactionState::Open,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.executed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executed.is_empty()
    }

    /// Execute a command immediately and retain it for commit/rollback.
    /// A command that fails to execute is discarded.
    pub fn add(&mut self, mut command: Command) -> bool {
        if self.state != TransactionState::Open {
            error!(
                "transaction '{}' is closed, dropping command '{}'",
                self.name,
                command.name()
            );
            return false;
        }
        if command.execute() {
            self.executed.push(command);
            true
        } else {
            warn!(
                "transaction '{}': command '{}' failed to execute",
                self.name,
                command.name()
            );
            false
        }
    }

    /// Close the transaction, yielding its commands as a composite whose
    /// effects are already applied.
    pub fn commit(mut self) -> CompositeCommand {
        debug_assert_eq!(self.state, TransactionState::Open);
        self.state = TransactionState::Committed;
        let commands = std::mem::take(&mut self.executed);
        CompositeCommand::from_executed(self.name.clone(), commands)
    }

    /// Undo every executed command in reverse order and close the
    /// transaction.
    pub fn rollback(&mut self) {
        if self.state != TransactionState::Open {
            warn!("transaction '{}' already closed", self.name);
            return;
        }
        self.state = TransactionState::RolledBack;
        for command in self.executed.iter_mut().rev() {
            if !command.undo() {
                error!(
                    "transaction '{}': rollback failed for '{}'",
                    self.name,
                    command.name()
                );
            }
        }
        self.executed.clear();
    }

    pub fn memory_usage(&self) -> usize {
        self.name.capacity()
            + self
                .executed
                .iter()
                .map(Command::memory_usage)
                .sum::<usize>()
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.state == TransactionState::Open {
            self.rollback();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{IncrementCoordinates, VoxelEngine, VoxelResolution};
    use std::sync::Arc;

    fn inc(x: i32, y: i32, z: i32) -> IncrementCoordinates {
        IncrementCoordinates::new(x, y, z)
    }

    #[test]
    fn test_effects_visible_while_open() {
        let engine = Arc::new(VoxelEngine::new());
        let mut tx = Transaction::new("Paint");
        assert!(tx.add(Command::place_voxel(
            engine.clone(),
            inc(0, 0, 0),
            VoxelResolution::Size1cm
        )));
        assert!(engine.get(inc(0, 0, 0), VoxelResolution::Size1cm));
        tx.rollback();
        assert!(!engine.get(inc(0, 0, 0), VoxelResolution::Size1cm));
    }

    #[test]
    fn test_commit_yields_undoable_composite() {
        let engine = Arc::new(VoxelEngine::new());
        let mut tx = Transaction::new("Row");
        for i in 0..3 {
            tx.add(Command::place_voxel(
                engine.clone(),
                inc(i, 0, 0),
                VoxelResolution::Size1cm,
            ));
        }
        let mut composite = tx.commit();
        assert_eq!(composite.len(), 3);
        assert_eq!(engine.total_count(), 3);
        // The composite is already applied and can be undone directly.
        assert!(composite.undo());
        assert_eq!(engine.total_count(), 0);
    }

    #[test]
    fn test_failed_command_not_retained() {
        let engine = Arc::new(VoxelEngine::new());
        let mut tx = Transaction::new("Mixed");
        assert!(!tx.add(Command::place_voxel(
            engine.clone(),
            inc(0, -1, 0),
            VoxelResolution::Size1cm
        )));
        assert!(tx.is_empty());
    }

    #[test]
    fn test_drop_rolls_back() {
        let engine = Arc::new(VoxelEngine::new());
        {
            let mut tx = Transaction::new("Scoped");
            tx.add(Command::place_voxel(
                engine.clone(),
                inc(5, 0, 5),
                VoxelResolution::Size1cm,
            ));
            assert_eq!(engine.total_count(), 1);
        }
        assert_eq!(engine.total_count(), 0);
    }
}
