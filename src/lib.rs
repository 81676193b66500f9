//! Voxelcore - multi-resolution sparse voxel editing core
//!
//! This library provides core functionality for:
//! - Sparse multi-resolution voxel storage with strict placement rules
//! - Transactional undo/redo with bounded history and snapshots
//! - A versioned chunked project container
//! - STL export of finished triangle meshes
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │         Persistence & Export            │
//! │             (io module)                 │
//! ├─────────────────────────────────────────┤
//! │        Reversible Editing               │
//! │           (undo module)                 │
//! ├─────────────────────────────────────────┤
//! │        Voxel Data Engine                │
//! │         (core, mesh)                    │
//! └─────────────────────────────────────────┘
//! ```
//!
//! The CLI shell, rendering, meshing and input handling are external
//! collaborators; they drive this crate through the [`core::VoxelEngine`]
//! and [`io`] surfaces.

pub mod core;
pub mod io;
pub mod mesh;
pub mod undo;

// Re-export commonly used types
pub use core::{
    EventDispatcher, IncrementCoordinates, VoxelEngine, VoxelPosition, VoxelResolution,
    WorldCoordinates, Workspace,
};
pub use io::{Project, ProjectStore, StlExporter};
pub use mesh::{Mesh, Vertex};
pub use undo::{Command, HistoryManager, StateSnapshot, Transaction};
