//! Reversible commands over the voxel engine.
//!
//! `Command` is a closed sum of the operations the editor can reverse:
//! single-voxel edits, atomic batches, composites and snapshot restores.
//! Each variant carries everything needed to execute and invert itself
//! against a shared engine handle, which keeps the history manager's
//! memory accounting exact.

use crate::core::{IncrementCoordinates, VoxelChange, VoxelEngine, VoxelResolution};
use crate::undo::snapshot::StateSnapshot;
use log::warn;
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

/// Coarse classification tag carried by every command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    VoxelEdit,
    Batch,
    Composite,
    Snapshot,
}

/// A single-voxel place or remove.
pub struct VoxelEdit {
    engine: Arc<VoxelEngine>,
    pub position: IncrementCoordinates,
    pub resolution: VoxelResolution,
    created: SystemTime,
}

/// An atomic multi-voxel mutation.
pub struct BatchEdit {
    engine: Arc<VoxelEngine>,
    name: String,
    changes: Vec<VoxelChange>,
    created: SystemTime,
}

/// Restores one captured state, remembering the state it replaced.
pub struct SnapshotRestore {
    engine: Arc<VoxelEngine>,
    name: String,
    before: StateSnapshot,
    after: StateSnapshot,
    created: SystemTime,
}

/// A reversible operation with `execute` and `undo`.
pub enum Command {
    PlaceVoxel(VoxelEdit),
    RemoveVoxel(VoxelEdit),
    Batch(BatchEdit),
    Composite(CompositeCommand),
    RestoreSnapshot(SnapshotRestore),
}

impl Command {
    pub fn place_voxel(
        engine: Arc<VoxelEngine>,
        position: IncrementCoordinates,
        resolution: VoxelResolution,
    ) -> Self {
        Command::PlaceVoxel(VoxelEdit {
            engine,
            position,
            resolution,
            created: SystemTime::now(),
        })
    }

    pub fn remove_voxel(
        engine: Arc<VoxelEngine>,
        position: IncrementCoordinates,
        resolution: VoxelResolution,
    ) -> Self {
        Command::RemoveVoxel(VoxelEdit {
            engine,
            position,
            resolution,
            created: SystemTime::now(),
        })
    }

    pub fn batch(
        engine: Arc<VoxelEngine>,
        name: impl Into<String>,
        changes: Vec<VoxelChange>,
    ) -> Self {
        Command::Batch(BatchEdit {
            engine,
            name: name.into(),
            changes,
            created: SystemTime::now(),
        })
    }

    pub fn restore_snapshot(
        engine: Arc<VoxelEngine>,
        name: impl Into<String>,
        before: StateSnapshot,
        after: StateSnapshot,
    ) -> Self {
        Command::RestoreSnapshot(SnapshotRestore {
            engine,
            name: name.into(),
            before,
            after,
            created: SystemTime::now(),
        })
    }

    /// Apply the command. Returns false when nothing changed (a no-op
    /// attempt) or the operation was rejected.
    pub fn execute(&mut self) -> bool {
        match self {
            Command::PlaceVoxel(edit) => edit.engine.set(edit.position, edit.resolution, true),
            Command::RemoveVoxel(edit) => edit.engine.set(edit.position, edit.resolution, false),
            Command::Batch(batch) => batch.engine.batch_set(&batch.changes).success,
            Command::Composite(composite) => composite.execute(),
            Command::RestoreSnapshot(restore) => {
                restore.after.restore_voxels(&restore.engine).is_ok()
            }
        }
    }

    /// Reverse the command.
    pub fn undo(&mut self) -> bool {
        match self {
            Command::PlaceVoxel(edit) => edit.engine.set(edit.position, edit.resolution, false),
            Command::RemoveVoxel(edit) => edit.engine.set(edit.position, edit.resolution, true),
            Command::Batch(batch) => {
                let inverted: Vec<VoxelChange> =
                    batch.changes.iter().rev().map(|c| c.inverted()).collect();
                batch.engine.batch_set(&inverted).success
            }
            Command::Composite(composite) => composite.undo(),
            Command::RestoreSnapshot(restore) => {
                restore.before.restore_voxels(&restore.engine).is_ok()
            }
        }
    }

    pub fn name(&self) -> String {
        match self {
            Command::PlaceVoxel(edit) => format!(
                "Place {} voxel at ({}, {}, {})",
                edit.resolution, edit.position.x, edit.position.y, edit.position.z
            ),
            Command::RemoveVoxel(edit) => format!(
                "Remove {} voxel at ({}, {}, {})",
                edit.resolution, edit.position.x, edit.position.y, edit.position.z
            ),
            Command::Batch(batch) => batch.name.clone(),
            Command::Composite(composite) => composite.name().to_string(),
            Command::RestoreSnapshot(restore) => restore.name.clone(),
        }
    }

    pub fn kind(&self) -> CommandKind {
        match self {
            Command::PlaceVoxel(_) | Command::RemoveVoxel(_) => CommandKind::VoxelEdit,
            Command::Batch(_) => CommandKind::Batch,
            Command::Composite(_) => CommandKind::Composite,
            Command::RestoreSnapshot(_) => CommandKind::Snapshot,
        }
    }

    /// Whether the command could apply against current engine state.
    pub fn is_valid(&self) -> bool {
        match self {
            Command::PlaceVoxel(edit) => edit
                .engine
                .validate(edit.position, edit.resolution, true)
                .valid,
            Command::RemoveVoxel(edit) => edit.engine.get(edit.position, edit.resolution),
            Command::Batch(batch) => !batch.changes.is_empty(),
            Command::Composite(composite) => !composite.is_empty(),
            Command::RestoreSnapshot(_) => true,
        }
    }

    /// Approximate heap footprint, used for history memory caps.
    pub fn memory_usage(&self) -> usize {
        let base = std::mem::size_of::<Command>();
        match self {
            Command::PlaceVoxel(_) | Command::RemoveVoxel(_) => base,
            Command::Batch(batch) => {
                base + batch.name.capacity()
                    + batch.changes.capacity() * std::mem::size_of::<VoxelChange>()
            }
            Command::Composite(composite) => base + composite.memory_usage(),
            Command::RestoreSnapshot(restore) => {
                base + restore.name.capacity()
                    + restore.before.memory_usage()
                    + restore.after.memory_usage()
            }
        }
    }

    pub fn timestamp(&self) -> SystemTime {
        match self {
            Command::PlaceVoxel(edit) | Command::RemoveVoxel(edit) => edit.created,
            Command::Batch(batch) => batch.created,
            Command::Composite(composite) => composite.created,
            Command::RestoreSnapshot(restore) => restore.created,
        }
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name())
            .field("kind", &self.kind())
            .finish()
    }
}

/// An ordered sequence of commands treated as one reversible unit.
///
/// Children execute in order; if any child fails, the already-executed
/// prefix is undone in reverse before the composite reports failure.
pub struct CompositeCommand {
    name: String,
    commands: Vec<Command>,
    executed: bool,
    created: SystemTime,
}

impl CompositeCommand {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            commands: Vec::new(),
            executed: false,
            created: SystemTime::now(),
        }
    }

    /// Wrap commands whose effects are already applied (transaction
    /// commit path); the composite starts in the executed state.
    pub(crate) fn from_executed(name: impl Into<String>, commands: Vec<Command>) -> Self {
        Self {
            name: name.into(),
            commands,
            executed: true,
            created: SystemTime::now(),
        }
    }

    pub fn push(&mut self, command: Command) {
        debug_assert!(!self.executed, "cannot grow an executed composite");
        self.commands.push(command);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn execute(&mut self) -> bool {
        for index in 0..self.commands.len() {
            if !self.commands[index].execute() {
                warn!(
                    "composite '{}' failed at child {} ({}), rolling back",
                    self.name,
                    index,
                    self.commands[index].name()
                );
                for prior in self.commands[..index].iter_mut().rev() {
                    if !prior.undo() {
                        warn!(
                            "composite '{}' rollback failed for '{}'",
                            self.name,
                            prior.name()
                        );
                    }
                }
                return false;
            }
        }
        self.executed = true;
        true
    }

    pub fn undo(&mut self) -> bool {
        if !self.executed {
            return false;
        }
        let mut all_ok = true;
        for command in self.commands.iter_mut().rev() {
            if !command.undo() {
                warn!(
                    "composite '{}' failed to undo child '{}'",
                    self.name,
                    command.name()
                );
                all_ok = false;
            }
        }
        self.executed = false;
        all_ok
    }

    pub fn memory_usage(&self) -> usize {
        self.name.capacity()
            + self
                .commands
                .iter()
                .map(Command::memory_usage)
                .sum::<usize>()
    }
}

impl From<CompositeCommand> for Command {
    fn from(composite: CompositeCommand) -> Self {
        Command::Composite(composite)
    }
}
