//! The voxel data engine: authoritative owner of all occupancy state.
//!
//! Ten sparse octrees (one per resolution) live behind a single coarse
//! mutex, which makes every externally visible operation linearizable.
//! Mutation events are published after the state change and before the
//! lock is released, so an observed event implies the observed state.

use super::bounds::Aabb;
use super::coords::{IncrementCoordinates, FaceDirection, WorldCoordinates};
use super::events::{EventDispatcher, ResolutionChanged, VoxelChanged, WorkspaceResized};
use super::octree::SparseOctree;
use super::pool::{NodePool, PoolStats};
use super::resolution::VoxelResolution;
use super::voxel::{placements_overlap, VoxelPosition};
use super::workspace::Workspace;
use glam::Vec3;
use log::{debug, warn};
use parking_lot::Mutex;
use std::sync::Arc;

/// Slack applied to extent-vs-workspace comparisons so that voxels flush
/// against a wall survive float rounding in the cm-to-m conversion.
const BOUNDS_EPSILON: f32 = 1e-5;

/// Outcome of the four placement predicates, evaluated in a fixed order:
/// ground plane, position bounds, extent bounds, overlap. The first
/// failing predicate populates `message`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionValidation {
    pub valid: bool,
    pub above_ground: bool,
    pub within_bounds: bool,
    pub extent_within_bounds: bool,
    /// Always true: the placement grid is 1 cm for every resolution.
    pub aligned_to_grid: bool,
    pub no_overlap: bool,
    pub message: String,
}

impl Default for PositionValidation {
    fn default() -> Self {
        Self {
            valid: false,
            above_ground: false,
            within_bounds: false,
            extent_within_bounds: false,
            aligned_to_grid: true,
            no_overlap: true,
            message: String::new(),
        }
    }
}

/// Per-category outcome of a region fill.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FillResult {
    /// True iff no cell failed validation (redundant cells only skip).
    pub success: bool,
    pub voxels_filled: usize,
    pub voxels_skipped: usize,
    pub total_positions: usize,
    pub failed_below_ground: usize,
    pub failed_out_of_bounds: usize,
    pub failed_overlap: usize,
    pub failed_not_aligned: usize,
    pub message: String,
}

/// One entry of a batch mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoxelChange {
    pub position: IncrementCoordinates,
    pub resolution: VoxelResolution,
    pub old_value: bool,
    pub new_value: bool,
}

impl VoxelChange {
    pub fn new(
        position: IncrementCoordinates,
        resolution: VoxelResolution,
        old_value: bool,
        new_value: bool,
    ) -> Self {
        Self {
            position,
            resolution,
            old_value,
            new_value,
        }
    }

    /// The change that undoes this one.
    pub fn inverted(self) -> Self {
        Self {
            old_value: self.new_value,
            new_value: self.old_value,
            ..self
        }
    }
}

/// Outcome of an atomic batch mutation. No partial batch is ever
/// observable: on any failure every applied change is rolled back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchResult {
    pub success: bool,
    pub total_operations: usize,
    pub successful_operations: usize,
    pub failed_operations: usize,
    /// `(index, reason)` for each failed entry.
    pub failures: Vec<(usize, String)>,
    pub message: String,
}

/// Occupancy and memory telemetry across all resolutions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PerformanceMetrics {
    pub total_voxels: usize,
    pub total_memory: usize,
    /// Ratio of theoretical minimum storage to actual storage.
    pub memory_efficiency: f32,
    pub voxels_by_resolution: [usize; VoxelResolution::COUNT],
    pub memory_by_resolution: [usize; VoxelResolution::COUNT],
}

struct EngineState {
    grids: Vec<SparseOctree>,
    active_resolution: VoxelResolution,
    workspace: Workspace,
}

impl EngineState {
    #[inline]
    fn grid(&self, resolution: VoxelResolution) -> &SparseOctree {
        &self.grids[resolution.index() as usize]
    }

    #[inline]
    fn grid_mut(&mut self, resolution: VoxelResolution) -> &mut SparseOctree {
        &mut self.grids[resolution.index() as usize]
    }
}

/// Multi-resolution sparse voxel store with strict placement semantics.
pub struct VoxelEngine {
    state: Mutex<EngineState>,
    dispatcher: Arc<EventDispatcher>,
    pool: Arc<NodePool>,
}

impl std::fmt::Debug for VoxelEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoxelEngine").finish_non_exhaustive()
    }
}

impl VoxelEngine {
    pub fn new() -> Self {
        Self::with_dispatcher(Arc::new(EventDispatcher::new()))
    }

    pub fn with_dispatcher(dispatcher: Arc<EventDispatcher>) -> Self {
        let pool = Arc::new(NodePool::new());
        let workspace = Workspace::new();
        let grids = VoxelResolution::ALL
            .iter()
            .map(|&res| SparseOctree::new(res, workspace.size(), pool.clone()))
            .collect();
        Self {
            state: Mutex::new(EngineState {
                grids,
                active_resolution: VoxelResolution::Size1cm,
                workspace,
            }),
            dispatcher,
            pool,
        }
    }

    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.dispatcher
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Set or clear a voxel. Returns true only on an actual state change;
    /// redundant writes, invalid placements and collisions all return
    /// false without emitting an event.
    pub fn set(&self, pos: IncrementCoordinates, resolution: VoxelResolution, value: bool) -> bool {
        let mut state = self.state.lock();
        self.set_locked(&mut state, pos, resolution, value)
    }

    fn set_locked(
        &self,
        state: &mut EngineState,
        pos: IncrementCoordinates,
        resolution: VoxelResolution,
        value: bool,
    ) -> bool {
        let current = state.grid(resolution).get(pos);
        if current == value {
            debug!(
                "redundant voxel write at ({}, {}, {}) {}",
                pos.x, pos.y, pos.z, resolution
            );
            return false;
        }

        let validation = Self::validate_locked(state, pos, resolution, value);
        if !validation.valid {
            debug!(
                "rejected voxel write at ({}, {}, {}) {}: {}",
                pos.x, pos.y, pos.z, resolution, validation.message
            );
            return false;
        }

        if !state.grid_mut(resolution).set(pos, value) {
            return false;
        }
        self.dispatcher.dispatch_voxel_changed(&VoxelChanged {
            increment: pos,
            resolution,
            old_value: current,
            new_value: value,
        });
        true
    }

    /// Read a voxel. Absent cells read as false.
    pub fn get(&self, pos: IncrementCoordinates, resolution: VoxelResolution) -> bool {
        self.state.lock().grid(resolution).get(pos)
    }

    /// Set or clear a voxel addressed in world space. The world position
    /// must sit on the 1 cm increment grid.
    pub fn set_at_world(
        &self,
        world: WorldCoordinates,
        resolution: VoxelResolution,
        value: bool,
    ) -> bool {
        if !world.is_on_increment_grid() {
            debug!(
                "world position ({}, {}, {}) is not on the increment grid",
                world.0.x, world.0.y, world.0.z
            );
            return false;
        }
        self.set(world.to_increment(), resolution, value)
    }

    pub fn get_at_world(&self, world: WorldCoordinates, resolution: VoxelResolution) -> bool {
        self.get(world.to_increment(), resolution)
    }

    /// Switch the active resolution, publishing an event on actual change.
    pub fn set_active_resolution(&self, resolution: VoxelResolution) {
        let mut state = self.state.lock();
        let old = state.active_resolution;
        if old == resolution {
            return;
        }
        state.active_resolution = resolution;
        self.dispatcher.dispatch_resolution_changed(&ResolutionChanged {
            old,
            new: resolution,
        });
    }

    pub fn active_resolution(&self) -> VoxelResolution {
        self.state.lock().active_resolution
    }

    /// Resize the workspace. Fails if the size is out of range or any
    /// stored voxel would fall outside the new bounds (no octree is
    /// mutated on failure).
    pub fn resize_workspace(&self, new_size: Vec3) -> bool {
        let mut state = self.state.lock();
        if !Workspace::is_valid_size(new_size) {
            warn!(
                "workspace resize to ({}, {}, {}) rejected: size out of range",
                new_size.x, new_size.y, new_size.z
            );
            return false;
        }
        if !state.grids.iter().all(|g| g.can_resize(new_size)) {
            warn!("workspace resize rejected: stored voxels would be lost");
            return false;
        }
        let old_size = state.workspace.size();
        for grid in &mut state.grids {
            grid.resize(new_size);
        }
        let resized = state.workspace.set_size_with(new_size, |_, _| true);
        debug_assert!(resized);
        self.dispatcher.dispatch_workspace_resized(&WorkspaceResized {
            old_size,
            new_size,
        });
        true
    }

    pub fn workspace_size(&self) -> Vec3 {
        self.state.lock().workspace.size()
    }

    pub fn workspace(&self) -> Workspace {
        self.state.lock().workspace
    }

    /// Evaluate the placement predicates for a prospective voxel.
    pub fn validate(
        &self,
        pos: IncrementCoordinates,
        resolution: VoxelResolution,
        check_overlap: bool,
    ) -> PositionValidation {
        let state = self.state.lock();
        Self::validate_locked(&state, pos, resolution, check_overlap)
    }

    fn validate_locked(
        state: &EngineState,
        pos: IncrementCoordinates,
        resolution: VoxelResolution,
        check_overlap: bool,
    ) -> PositionValidation {
        let mut result = PositionValidation::default();

        result.above_ground = pos.is_above_ground();
        if !result.above_ground {
            result.message = "position is below ground (Y must be >= 0)".to_string();
            return result;
        }

        result.within_bounds = state
            .workspace
            .is_position_valid(pos.to_world().value());
        if !result.within_bounds {
            result.message = "position is outside workspace bounds".to_string();
            return result;
        }

        result.extent_within_bounds = Self::extent_within_bounds(state, pos, resolution);
        if !result.extent_within_bounds {
            result.message = "voxel would extend outside workspace bounds".to_string();
            return result;
        }

        if check_overlap {
            result.no_overlap = !Self::would_overlap_locked(state, pos, resolution);
            if !result.no_overlap {
                result.message = "position would overlap an existing voxel".to_string();
                return result;
            }
        }

        result.valid = true;
        result
    }

    fn extent_within_bounds(
        state: &EngineState,
        pos: IncrementCoordinates,
        resolution: VoxelResolution,
    ) -> bool {
        let bounds = VoxelPosition::new(pos, resolution).world_bounds();
        let min = state.workspace.min_bounds();
        let max = state.workspace.max_bounds();
        bounds.min.x >= min.x - BOUNDS_EPSILON
            && bounds.max.x <= max.x + BOUNDS_EPSILON
            && bounds.min.y >= min.y - BOUNDS_EPSILON
            && bounds.max.y <= max.y + BOUNDS_EPSILON
            && bounds.min.z >= min.z - BOUNDS_EPSILON
            && bounds.max.z <= max.z + BOUNDS_EPSILON
    }

    /// Whether placing at `pos` would collide with any stored voxel.
    pub fn would_overlap(&self, pos: IncrementCoordinates, resolution: VoxelResolution) -> bool {
        let state = self.state.lock();
        Self::would_overlap_locked(&state, pos, resolution)
    }

    fn would_overlap_locked(
        state: &EngineState,
        pos: IncrementCoordinates,
        resolution: VoxelResolution,
    ) -> bool {
        let prospective = VoxelPosition::new(pos, resolution);
        let bounds = prospective.world_bounds();
        for grid in &state.grids {
            if grid.count() == 0 {
                continue;
            }
            let existing_res = grid.resolution();
            // Strictly larger stored voxels can never collide: the
            // detail-work exception admits the smaller prospective.
            if existing_res.size_cm() > resolution.size_cm() {
                continue;
            }
            // Conservative bottom-center search box; candidates still go
            // through the exact overlap predicate.
            let half_cm = existing_res.size_cm() as f32 * 0.5;
            let size_cm = existing_res.size_cm() as f32;
            let lo = IncrementCoordinates::new(
                (bounds.min.x * 100.0 - half_cm).floor() as i32 - 1,
                (bounds.min.y * 100.0 - size_cm).floor() as i32 - 1,
                (bounds.min.z * 100.0 - half_cm).floor() as i32 - 1,
            );
            let hi = IncrementCoordinates::new(
                (bounds.max.x * 100.0 + half_cm).ceil() as i32 + 1,
                (bounds.max.y * 100.0).ceil() as i32 + 1,
                (bounds.max.z * 100.0 + half_cm).ceil() as i32 + 1,
            );
            for existing in grid.voxels_in_box(lo, hi) {
                if placements_overlap(&prospective, &VoxelPosition::new(existing, existing_res)) {
                    return true;
                }
            }
        }
        false
    }

    /// Position adjacent to a source voxel across one of its faces. The
    /// offset is the source voxel's edge length; `target_res` is accepted
    /// for API symmetry and does not affect the result.
    pub fn adjacent_position(
        &self,
        pos: IncrementCoordinates,
        face: FaceDirection,
        source_res: VoxelResolution,
        _target_res: VoxelResolution,
    ) -> IncrementCoordinates {
        pos + face.normal() * source_res.size_cm()
    }

    /// Fill (or clear) every cell of `region` at the given resolution.
    /// The region is snapped up to the resolution's edge length and only
    /// voxels that fit entirely inside the region are visited. Per-cell
    /// failures are counted, not fatal.
    pub fn fill_region(&self, region: &Aabb, resolution: VoxelResolution, value: bool) -> FillResult {
        let mut state = self.state.lock();
        let mut result = FillResult::default();

        let step = resolution.size_cm();
        let min_inc = WorldCoordinates(region.min).to_increment();
        let max_inc = WorldCoordinates(region.max).to_increment();

        let snap_up = |v: i32| -> i32 {
            let aligned = v.div_euclid(step) * step;
            if aligned < v {
                aligned + step
            } else {
                aligned
            }
        };
        let start_x = snap_up(min_inc.x);
        let start_y = snap_up(min_inc.y);
        let start_z = snap_up(min_inc.z);

        let mut x = start_x;
        while x + step <= max_inc.x {
            let mut y = start_y;
            while y + step <= max_inc.y {
                let mut z = start_z;
                while z + step <= max_inc.z {
                    result.total_positions += 1;
                    let pos = IncrementCoordinates::new(x, y, z);

                    // Redundant cells skip before any validation, exactly
                    // like the single-voxel path.
                    let current = state.grid(resolution).get(pos);
                    if current == value {
                        result.voxels_skipped += 1;
                        z += step;
                        continue;
                    }

                    let validation = Self::validate_locked(&state, pos, resolution, value);
                    if !validation.valid {
                        if !validation.above_ground {
                            result.failed_below_ground += 1;
                        } else if !validation.within_bounds || !validation.extent_within_bounds {
                            result.failed_out_of_bounds += 1;
                        } else if !validation.aligned_to_grid {
                            result.failed_not_aligned += 1;
                        } else {
                            result.failed_overlap += 1;
                        }
                        z += step;
                        continue;
                    }

                    if state.grid_mut(resolution).set(pos, value) {
                        result.voxels_filled += 1;
                        self.dispatcher.dispatch_voxel_changed(&VoxelChanged {
                            increment: pos,
                            resolution,
                            old_value: current,
                            new_value: value,
                        });
                    } else {
                        result.voxels_skipped += 1;
                    }
                    z += step;
                }
                y += step;
            }
            x += step;
        }

        let failed = result.failed_below_ground
            + result.failed_out_of_bounds
            + result.failed_overlap
            + result.failed_not_aligned;
        result.success = failed == 0;
        if !result.success {
            result.message = format!(
                "fill failed for {} of {} positions ({} below ground, {} out of bounds, {} overlap, {} not aligned)",
                failed,
                result.total_positions,
                result.failed_below_ground,
                result.failed_out_of_bounds,
                result.failed_overlap,
                result.failed_not_aligned,
            );
            debug!("{}", result.message);
        }
        result
    }

    /// Apply a batch of changes atomically. All entries are validated
    /// first; any validation failure aborts the batch before mutation.
    /// If an apply unexpectedly fails mid-way, every applied change is
    /// rolled back (with reverse events) before the failure is reported.
    pub fn batch_set(&self, changes: &[VoxelChange]) -> BatchResult {
        let mut state = self.state.lock();
        let mut result = BatchResult {
            total_operations: changes.len(),
            ..BatchResult::default()
        };

        for (index, change) in changes.iter().enumerate() {
            let validation = Self::validate_locked(
                &state,
                change.position,
                change.resolution,
                change.new_value,
            );
            if !validation.valid {
                result.failures.push((index, validation.message));
            }
        }
        if !result.failures.is_empty() {
            result.failed_operations = result.failures.len();
            result.message = format!(
                "batch validation failed for {} of {} operations",
                result.failed_operations, result.total_operations
            );
            debug!("{}", result.message);
            return result;
        }

        let mut applied: Vec<VoxelChange> = Vec::with_capacity(changes.len());
        for (index, change) in changes.iter().enumerate() {
            let current = state.grid(change.resolution).get(change.position);
            if current == change.new_value {
                // Already in the requested state; a successful no-op.
                result.successful_operations += 1;
                continue;
            }
            if state.grid_mut(change.resolution).set(change.position, change.new_value) {
                result.successful_operations += 1;
                applied.push(VoxelChange::new(
                    change.position,
                    change.resolution,
                    current,
                    change.new_value,
                ));
                self.dispatcher.dispatch_voxel_changed(&VoxelChanged {
                    increment: change.position,
                    resolution: change.resolution,
                    old_value: current,
                    new_value: change.new_value,
                });
            } else {
                result.failed_operations += 1;
                result
                    .failures
                    .push((index, "unexpected storage failure".to_string()));
                for undo in applied.iter().rev() {
                    state.grid_mut(undo.resolution).set(undo.position, undo.old_value);
                    self.dispatcher.dispatch_voxel_changed(&VoxelChanged {
                        increment: undo.position,
                        resolution: undo.resolution,
                        old_value: undo.new_value,
                        new_value: undo.old_value,
                    });
                }
                result.successful_operations = 0;
                result.message =
                    format!("batch aborted at operation {index}, all changes rolled back");
                warn!("{}", result.message);
                return result;
            }
        }

        result.success = true;
        result
    }

    /// Build batch entries for a set of positions, capturing current
    /// values for later inversion.
    pub fn create_batch_changes(
        &self,
        positions: &[IncrementCoordinates],
        resolution: VoxelResolution,
        new_value: bool,
    ) -> Vec<VoxelChange> {
        let state = self.state.lock();
        positions
            .iter()
            .map(|&pos| {
                let current = state.grid(resolution).get(pos);
                VoxelChange::new(pos, resolution, current, new_value)
            })
            .collect()
    }

    /// Remove every voxel at every resolution. No per-voxel events.
    pub fn clear_all(&self) {
        let mut state = self.state.lock();
        for grid in &mut state.grids {
            grid.clear();
        }
    }

    /// Remove every voxel at one resolution. No per-voxel events.
    pub fn clear_resolution(&self, resolution: VoxelResolution) {
        self.state.lock().grid_mut(resolution).clear();
    }

    /// All voxels stored at one resolution.
    pub fn all_voxels(&self, resolution: VoxelResolution) -> Vec<VoxelPosition> {
        let state = self.state.lock();
        state
            .grid(resolution)
            .all_voxels()
            .into_iter()
            .map(|inc| VoxelPosition::new(inc, resolution))
            .collect()
    }

    /// All voxels, every resolution.
    pub fn all_voxels_everywhere(&self) -> Vec<VoxelPosition> {
        let state = self.state.lock();
        let mut out = Vec::new();
        for grid in &state.grids {
            let res = grid.resolution();
            out.extend(grid.all_voxels().into_iter().map(|inc| VoxelPosition::new(inc, res)));
        }
        out
    }

    /// Voxels (any resolution) whose world bounds intersect the region.
    pub fn query_region(&self, region: &Aabb) -> Vec<VoxelPosition> {
        let state = self.state.lock();
        let mut out = Vec::new();
        for grid in &state.grids {
            if grid.count() == 0 {
                continue;
            }
            let res = grid.resolution();
            for inc in grid.all_voxels() {
                let voxel = VoxelPosition::new(inc, res);
                if voxel.world_bounds().intersects(region) {
                    out.push(voxel);
                }
            }
        }
        out
    }

    pub fn is_region_empty(&self, region: &Aabb) -> bool {
        self.query_region(region).is_empty()
    }

    pub fn count(&self, resolution: VoxelResolution) -> usize {
        self.state.lock().grid(resolution).count()
    }

    pub fn total_count(&self) -> usize {
        self.state.lock().grids.iter().map(|g| g.count()).sum()
    }

    pub fn memory_usage(&self) -> usize {
        self.state.lock().grids.iter().map(|g| g.memory_bytes()).sum()
    }

    pub fn memory_usage_for(&self, resolution: VoxelResolution) -> usize {
        self.state.lock().grid(resolution).memory_bytes()
    }

    /// Collapse empty subtrees in every octree.
    pub fn optimize_memory(&self) {
        let mut state = self.state.lock();
        for grid in &mut state.grids {
            grid.optimize();
        }
    }

    /// Clamp an increment position onto the workspace bounds.
    pub fn clamp_to_workspace(&self, pos: IncrementCoordinates) -> IncrementCoordinates {
        let state = self.state.lock();
        let clamped = state.workspace.clamp_position(pos.to_world().value());
        WorldCoordinates(clamped).to_increment()
    }

    pub fn metrics(&self) -> PerformanceMetrics {
        let state = self.state.lock();
        let mut metrics = PerformanceMetrics::default();
        for (i, grid) in state.grids.iter().enumerate() {
            metrics.voxels_by_resolution[i] = grid.count();
            metrics.memory_by_resolution[i] = grid.memory_bytes();
            metrics.total_voxels += grid.count();
            metrics.total_memory += grid.memory_bytes();
        }
        metrics.memory_efficiency = if metrics.total_memory > 0 {
            metrics.total_voxels as f32 / metrics.total_memory as f32
        } else {
            1.0
        };
        metrics
    }
}

impl Default for VoxelEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn inc(x: i32, y: i32, z: i32) -> IncrementCoordinates {
        IncrementCoordinates::new(x, y, z)
    }

    #[test]
    fn test_basic_placement() {
        let engine = VoxelEngine::new();
        assert!(engine.set(inc(0, 0, 0), VoxelResolution::Size1cm, true));
        assert!(engine.get(inc(0, 0, 0), VoxelResolution::Size1cm));
        // Redundant write fails.
        assert!(!engine.set(inc(0, 0, 0), VoxelResolution::Size1cm, true));
    }

    #[test]
    fn test_below_ground_rejected() {
        let engine = VoxelEngine::new();
        assert!(!engine.set(inc(0, -1, 0), VoxelResolution::Size1cm, true));
        let v = engine.validate(inc(0, -1, 0), VoxelResolution::Size1cm, true);
        assert!(!v.valid);
        assert!(!v.above_ground);
        assert!(v.message.contains("below ground"));
    }

    #[test]
    fn test_cross_resolution_overlap() {
        let engine = VoxelEngine::new();
        assert!(engine.set(inc(0, 0, 0), VoxelResolution::Size4cm, true));
        // Detail-work exception: a smaller voxel may share the cell.
        assert!(engine.set(inc(0, 0, 0), VoxelResolution::Size1cm, true));
        // Face-adjacent same-size voxel is fine.
        assert!(engine.set(inc(4, 0, 4), VoxelResolution::Size4cm, true));
        // Intruding same-size voxel collides with the first one.
        assert!(!engine.set(inc(2, 0, 2), VoxelResolution::Size4cm, true));
    }

    #[test]
    fn test_would_overlap_matches_set() {
        let engine = VoxelEngine::new();
        engine.set(inc(0, 0, 0), VoxelResolution::Size4cm, true);
        for (pos, res) in [
            (inc(2, 0, 2), VoxelResolution::Size4cm),
            (inc(4, 0, 4), VoxelResolution::Size4cm),
            (inc(1, 0, 1), VoxelResolution::Size1cm),
            (inc(0, 0, 0), VoxelResolution::Size8cm),
        ] {
            let overlap = engine.would_overlap(pos, res);
            let placed = engine.set(pos, res, true);
            assert_eq!(
                overlap, !placed,
                "would_overlap and set disagree at ({}, {}, {}) {}",
                pos.x, pos.y, pos.z, res
            );
            if placed {
                engine.set(pos, res, false);
            }
        }
    }

    #[test]
    fn test_extent_outside_workspace() {
        let engine = VoxelEngine::new();
        // Position inside, but a 256 cm voxel pokes through the ceiling of
        // the default 5 m workspace when placed at y = 3 m.
        let v = engine.validate(inc(0, 300, 0), VoxelResolution::Size256cm, true);
        assert!(!v.valid);
        assert!(v.above_ground);
        assert!(v.within_bounds);
        assert!(!v.extent_within_bounds);
    }

    #[test]
    fn test_set_at_world_requires_grid_alignment() {
        let engine = VoxelEngine::new();
        assert!(!engine.set_at_world(
            WorldCoordinates::new(0.013_5, 0.0, 0.0),
            VoxelResolution::Size1cm,
            true
        ));
        assert!(engine.set_at_world(
            WorldCoordinates::new(0.01, 0.0, 0.02),
            VoxelResolution::Size1cm,
            true
        ));
        assert!(engine.get(inc(1, 0, 2), VoxelResolution::Size1cm));
    }

    #[test]
    fn test_fill_region_counts() {
        let engine = VoxelEngine::new();
        let region = Aabb::new(Vec3::ZERO, Vec3::splat(0.05));
        let result = engine.fill_region(&region, VoxelResolution::Size1cm, true);
        assert!(result.success);
        assert_eq!(result.voxels_filled, 125);
        assert_eq!(result.voxels_skipped, 0);

        let again = engine.fill_region(&region, VoxelResolution::Size1cm, true);
        assert!(again.success);
        assert_eq!(again.voxels_filled, 0);
        assert_eq!(again.voxels_skipped, 125);
    }

    #[test]
    fn test_fill_region_clear() {
        let engine = VoxelEngine::new();
        let region = Aabb::new(Vec3::ZERO, Vec3::splat(0.04));
        engine.fill_region(&region, VoxelResolution::Size2cm, true);
        assert_eq!(engine.count(VoxelResolution::Size2cm), 8);
        let cleared = engine.fill_region(&region, VoxelResolution::Size2cm, false);
        assert!(cleared.success);
        assert_eq!(cleared.voxels_filled, 8);
        assert_eq!(engine.count(VoxelResolution::Size2cm), 0);
    }

    #[test]
    fn test_batch_set_atomic_on_validation_failure() {
        let engine = VoxelEngine::new();
        let changes = vec![
            VoxelChange::new(inc(0, 0, 0), VoxelResolution::Size1cm, false, true),
            VoxelChange::new(inc(0, -5, 0), VoxelResolution::Size1cm, false, true),
        ];
        let result = engine.batch_set(&changes);
        assert!(!result.success);
        assert_eq!(result.failed_operations, 1);
        assert_eq!(result.failures[0].0, 1);
        // Nothing was applied.
        assert!(!engine.get(inc(0, 0, 0), VoxelResolution::Size1cm));
    }

    #[test]
    fn test_batch_set_applies_all() {
        let engine = VoxelEngine::new();
        let positions: Vec<_> = (0..5).map(|i| inc(i * 2, 0, 0)).collect();
        let changes = engine.create_batch_changes(&positions, VoxelResolution::Size2cm, true);
        let result = engine.batch_set(&changes);
        assert!(result.success);
        assert_eq!(result.successful_operations, 5);
        assert_eq!(engine.count(VoxelResolution::Size2cm), 5);
    }

    #[test]
    fn test_resize_workspace_guards_voxels() {
        let engine = VoxelEngine::new();
        assert!(engine.set(inc(240, 0, 0), VoxelResolution::Size1cm, true));
        assert!(!engine.resize_workspace(Vec3::splat(2.0)));
        assert_eq!(engine.workspace_size(), Vec3::splat(5.0));
        assert!(engine.resize_workspace(Vec3::splat(8.0)));
        assert!(engine.get(inc(240, 0, 0), VoxelResolution::Size1cm));
        // Out-of-range sizes are rejected outright.
        assert!(!engine.resize_workspace(Vec3::splat(9.0)));
    }

    #[test]
    fn test_events_fire_once_per_transition() {
        let engine = VoxelEngine::new();
        static HITS: AtomicUsize = AtomicUsize::new(0);
        HITS.store(0, Ordering::SeqCst);
        engine.dispatcher().on_voxel_changed(|_| {
            HITS.fetch_add(1, Ordering::SeqCst);
        });
        engine.set(inc(0, 0, 0), VoxelResolution::Size1cm, true);
        engine.set(inc(0, 0, 0), VoxelResolution::Size1cm, true); // redundant
        engine.set(inc(0, 0, 0), VoxelResolution::Size1cm, false);
        assert_eq!(HITS.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_resolution_change_event_only_on_change() {
        let engine = VoxelEngine::new();
        static HITS: AtomicUsize = AtomicUsize::new(0);
        HITS.store(0, Ordering::SeqCst);
        engine.dispatcher().on_resolution_changed(|_| {
            HITS.fetch_add(1, Ordering::SeqCst);
        });
        engine.set_active_resolution(VoxelResolution::Size1cm); // no change
        engine.set_active_resolution(VoxelResolution::Size8cm);
        assert_eq!(HITS.load(Ordering::SeqCst), 1);
        assert_eq!(engine.active_resolution(), VoxelResolution::Size8cm);
    }

    #[test]
    fn test_query_region() {
        let engine = VoxelEngine::new();
        engine.set(inc(0, 0, 0), VoxelResolution::Size1cm, true);
        engine.set(inc(100, 0, 100), VoxelResolution::Size4cm, true);
        let near_origin = Aabb::new(Vec3::splat(-0.05), Vec3::splat(0.05));
        let found = engine.query_region(&near_origin);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].increment, inc(0, 0, 0));
        assert!(!engine.is_region_empty(&near_origin));
    }

    #[test]
    fn test_adjacent_position() {
        let engine = VoxelEngine::new();
        let p = inc(8, 0, 0);
        let adj = engine.adjacent_position(
            p,
            FaceDirection::PosX,
            VoxelResolution::Size8cm,
            VoxelResolution::Size1cm,
        );
        assert_eq!(adj, inc(16, 0, 0));
        let below = engine.adjacent_position(
            p,
            FaceDirection::NegY,
            VoxelResolution::Size8cm,
            VoxelResolution::Size8cm,
        );
        assert_eq!(below, inc(8, -8, 0));
    }

    #[test]
    fn test_metrics() {
        let engine = VoxelEngine::new();
        engine.set(inc(0, 0, 0), VoxelResolution::Size1cm, true);
        engine.set(inc(16, 0, 0), VoxelResolution::Size16cm, true);
        let metrics = engine.metrics();
        assert_eq!(metrics.total_voxels, 2);
        assert_eq!(metrics.voxels_by_resolution[0], 1);
        assert_eq!(metrics.voxels_by_resolution[4], 1);
        assert!(metrics.total_memory > 0);
    }
}
