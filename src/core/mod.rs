//! Core voxel data engine: coordinates, octrees, workspace, events.

mod bounds;
mod coords;
mod engine;
mod events;
mod octree;
mod pool;
mod resolution;
mod voxel;
mod workspace;

pub use bounds::Aabb;
pub use coords::{
    FaceDirection, GridCoordinates, IncrementCoordinates, WorldCoordinates, GRID_EPSILON,
    INCREMENTS_PER_METER, METERS_PER_INCREMENT,
};
pub use engine::{
    BatchResult, FillResult, PerformanceMetrics, PositionValidation, VoxelChange, VoxelEngine,
};
pub use events::{
    EventDispatcher, MemoryPressureEvent, ResolutionChanged, UndoRedoEvent, UndoRedoEventKind,
    VoxelChanged, WorkspaceResized,
};
pub use octree::SparseOctree;
pub use pool::{NodePool, OctreeNode, PoolStats, DEFAULT_POOL_CAPACITY};
pub use resolution::VoxelResolution;
pub use voxel::{placements_overlap, VoxelPosition, COLLISION_EPSILON};
pub use workspace::{
    Workspace, DEFAULT_WORKSPACE_SIZE, MAX_WORKSPACE_SIZE, MIN_WORKSPACE_SIZE,
};
