//! Typed publish/subscribe bus for core mutations.
//!
//! One channel per event type: publishers call the matching
//! `dispatch_*`, subscribers register fan-out callbacks with `on_*`.
//! Dispatch is synchronous on the publishing thread and may run while the
//! engine lock is held, so handlers must not re-enter the engine.

use super::coords::IncrementCoordinates;
use super::resolution::VoxelResolution;
use glam::Vec3;
use parking_lot::Mutex;

/// A voxel occupancy bit changed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoxelChanged {
    pub increment: IncrementCoordinates,
    pub resolution: VoxelResolution,
    pub old_value: bool,
    pub new_value: bool,
}

/// The active resolution changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolutionChanged {
    pub old: VoxelResolution,
    pub new: VoxelResolution,
}

/// The workspace was resized.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorkspaceResized {
    pub old_size: Vec3,
    pub new_size: Vec3,
}

/// The kind of history transition an [`UndoRedoEvent`] reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UndoRedoEventKind {
    CommandExecuted,
    CommandUndone,
    CommandRedone,
    HistoryCleared,
    TransactionStarted,
    TransactionCommitted,
    TransactionRolledBack,
}

/// A history manager transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndoRedoEvent {
    pub kind: UndoRedoEventKind,
    pub command_name: String,
    pub history_size: usize,
    pub memory_usage: usize,
    pub can_undo: bool,
    pub can_redo: bool,
}

/// History memory crossed its configured cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryPressureEvent {
    pub current: usize,
    pub limit: usize,
}

type Handlers<E> = Mutex<Vec<Box<dyn FnMut(&E) + Send>>>;

fn dispatch_to<E>(handlers: &Handlers<E>, event: &E) {
    for handler in handlers.lock().iter_mut() {
        handler(event);
    }
}

/// Fan-out dispatcher with one subscriber list per event type.
#[derive(Default)]
pub struct EventDispatcher {
    voxel_changed: Handlers<VoxelChanged>,
    resolution_changed: Handlers<ResolutionChanged>,
    workspace_resized: Handlers<WorkspaceResized>,
    undo_redo: Handlers<UndoRedoEvent>,
    memory_pressure: Handlers<MemoryPressureEvent>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_voxel_changed(&self, handler: impl FnMut(&VoxelChanged) + Send + 'static) {
        self.voxel_changed.lock().push(Box::new(handler));
    }

    pub fn on_resolution_changed(&self, handler: impl FnMut(&ResolutionChanged) + Send + 'static) {
        self.resolution_changed.lock().push(Box::new(handler));
    }

    pub fn on_workspace_resized(&self, handler: impl FnMut(&WorkspaceResized) + Send + 'static) {
        self.workspace_resized.lock().push(Box::new(handler));
    }

    pub fn on_undo_redo(&self, handler: impl FnMut(&UndoRedoEvent) + Send + 'static) {
        self.undo_redo.lock().push(Box::new(handler));
    }

    pub fn on_memory_pressure(&self, handler: impl FnMut(&MemoryPressureEvent) + Send + 'static) {
        self.memory_pressure.lock().push(Box::new(handler));
    }

    pub fn dispatch_voxel_changed(&self, event: &VoxelChanged) {
        dispatch_to(&self.voxel_changed, event);
    }

    pub fn dispatch_resolution_changed(&self, event: &ResolutionChanged) {
        dispatch_to(&self.resolution_changed, event);
    }

    pub fn dispatch_workspace_resized(&self, event: &WorkspaceResized) {
        dispatch_to(&self.workspace_resized, event);
    }

    pub fn dispatch_undo_redo(&self, event: &UndoRedoEvent) {
        dispatch_to(&self.undo_redo, event);
    }

    pub fn dispatch_memory_pressure(&self, event: &MemoryPressureEvent) {
        dispatch_to(&self.memory_pressure, event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_fan_out() {
        let dispatcher = EventDispatcher::new();
        let hits = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let hits = hits.clone();
            dispatcher.on_resolution_changed(move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            });
        }
        dispatcher.dispatch_resolution_changed(&ResolutionChanged {
            old: VoxelResolution::Size1cm,
            new: VoxelResolution::Size4cm,
        });
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_channels_are_independent() {
        let dispatcher = EventDispatcher::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        dispatcher.on_voxel_changed(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        dispatcher.dispatch_workspace_resized(&WorkspaceResized {
            old_size: Vec3::splat(5.0),
            new_size: Vec3::splat(4.0),
        });
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_event_payload_delivered() {
        let dispatcher = EventDispatcher::new();
        let seen = Arc::new(Mutex::new(None));
        let s = seen.clone();
        dispatcher.on_voxel_changed(move |e| {
            *s.lock() = Some(*e);
        });
        let event = VoxelChanged {
            increment: IncrementCoordinates::new(1, 2, 3),
            resolution: VoxelResolution::Size8cm,
            old_value: false,
            new_value: true,
        };
        dispatcher.dispatch_voxel_changed(&event);
        assert_eq!(*seen.lock(), Some(event));
    }
}
