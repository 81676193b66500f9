//! End-to-end engine behavior: placement rules, fills, undo chains.

use std::sync::Arc;

use glam::Vec3;
use voxelcore::core::{Aabb, IncrementCoordinates, VoxelResolution};
use voxelcore::undo::{Command, HistoryManager, StateSnapshot};
use voxelcore::{VoxelEngine, WorldCoordinates};

fn inc(x: i32, y: i32, z: i32) -> IncrementCoordinates {
    IncrementCoordinates::new(x, y, z)
}

#[test]
fn basic_placement() {
    let engine = VoxelEngine::new();
    assert!(engine.set(inc(0, 0, 0), VoxelResolution::Size1cm, true));
    assert!(engine.get(inc(0, 0, 0), VoxelResolution::Size1cm));
    assert!(!engine.set(inc(0, 0, 0), VoxelResolution::Size1cm, true));
}

#[test]
fn below_ground_placement_fails_with_reason() {
    let engine = VoxelEngine::new();
    assert!(!engine.set(inc(0, -1, 0), VoxelResolution::Size1cm, true));
    let validation = engine.validate(inc(0, -1, 0), VoxelResolution::Size1cm, true);
    assert!(!validation.valid);
    assert!(validation.message.contains("below ground"));
}

#[test]
fn cross_resolution_overlap_rules() {
    let engine = VoxelEngine::new();
    assert!(engine.set(inc(0, 0, 0), VoxelResolution::Size4cm, true));
    assert!(engine.set(inc(0, 0, 0), VoxelResolution::Size1cm, true));
    assert!(engine.set(inc(4, 0, 4), VoxelResolution::Size4cm, true));
    assert!(!engine.set(inc(2, 0, 2), VoxelResolution::Size4cm, true));
}

#[test]
fn detail_voxel_inside_every_larger_size() {
    // A 1 cm voxel may sit at the cell of any larger voxel.
    for large in &VoxelResolution::ALL[1..5] {
        let engine = VoxelEngine::new();
        assert!(engine.set(inc(0, 0, 0), *large, true), "{large} placement");
        assert!(
            engine.set(inc(0, 0, 0), VoxelResolution::Size1cm, true),
            "1cm detail inside {large}"
        );
    }
}

#[test]
fn same_size_adjacent_voxels_coexist() {
    for res in [
        VoxelResolution::Size1cm,
        VoxelResolution::Size4cm,
        VoxelResolution::Size32cm,
    ] {
        let engine = VoxelEngine::new();
        let s = res.size_cm();
        assert!(engine.set(inc(0, 0, 0), res, true));
        for neighbor in [inc(s, 0, 0), inc(-s, 0, 0), inc(0, s, 0), inc(0, 0, s)] {
            assert!(
                engine.set(neighbor, res, true),
                "face-adjacent {res} at ({}, {}, {})",
                neighbor.x,
                neighbor.y,
                neighbor.z
            );
        }
    }
}

#[test]
fn would_overlap_agrees_with_set() {
    let engine = VoxelEngine::new();
    engine.set(inc(0, 0, 0), VoxelResolution::Size8cm, true);
    engine.set(inc(20, 0, 0), VoxelResolution::Size2cm, true);

    for (pos, res) in [
        (inc(4, 0, 0), VoxelResolution::Size8cm),
        (inc(8, 0, 0), VoxelResolution::Size8cm),
        (inc(0, 0, 0), VoxelResolution::Size1cm),
        (inc(20, 0, 0), VoxelResolution::Size4cm),
        (inc(40, 0, 40), VoxelResolution::Size4cm),
    ] {
        let predicted = engine.would_overlap(pos, res);
        let placed = engine.set(pos, res, true);
        assert_eq!(predicted, !placed);
        if placed {
            engine.set(pos, res, false);
        }
    }
}

#[test]
fn set_then_get_reads_back() {
    let engine = VoxelEngine::new();
    let positions = [inc(0, 0, 0), inc(-100, 7, 93), inc(13, 250, -13)];
    for (i, &pos) in positions.iter().enumerate() {
        let res = VoxelResolution::ALL[i % 3];
        if engine.set(pos, res, true) {
            assert!(engine.get(pos, res));
        }
    }
}

#[test]
fn fill_region_five_centimeter_cube() {
    let engine = VoxelEngine::new();
    let region = Aabb::new(Vec3::ZERO, Vec3::splat(0.05));

    let first = engine.fill_region(&region, VoxelResolution::Size1cm, true);
    assert!(first.success);
    assert_eq!(first.voxels_filled, 125);
    assert_eq!(first.voxels_skipped, 0);

    let second = engine.fill_region(&region, VoxelResolution::Size1cm, true);
    assert!(second.success);
    assert_eq!(second.voxels_filled, 0);
    assert_eq!(second.voxels_skipped, 125);
}

#[test]
fn fill_region_counts_out_of_bounds() {
    let engine = VoxelEngine::new();
    // A slab straddling the +X wall of the 5 m workspace.
    let region = Aabb::new(Vec3::new(2.40, 0.0, 0.0), Vec3::new(2.60, 0.01, 0.02));
    let result = engine.fill_region(&region, VoxelResolution::Size1cm, true);
    assert!(!result.success);
    assert!(result.failed_out_of_bounds > 0);
    assert!(result.voxels_filled > 0);
}

#[test]
fn undo_redo_chain() {
    let engine = Arc::new(VoxelEngine::new());
    let history = HistoryManager::new(engine.clone());

    for pos in [inc(1, 0, 1), inc(2, 0, 1), inc(3, 0, 1)] {
        assert!(history.execute(Command::place_voxel(
            engine.clone(),
            pos,
            VoxelResolution::Size1cm
        )));
    }
    assert_eq!(engine.total_count(), 3);

    for _ in 0..3 {
        assert!(history.undo());
    }
    assert_eq!(engine.total_count(), 0);

    assert!(history.redo());
    assert!(history.redo());
    assert_eq!(engine.total_count(), 2);
    assert!(engine.get(inc(2, 0, 1), VoxelResolution::Size1cm));
    assert!(!engine.get(inc(3, 0, 1), VoxelResolution::Size1cm));
}

#[test]
fn execute_undo_restores_state_exactly() {
    let engine = Arc::new(VoxelEngine::new());
    let history = HistoryManager::new(engine.clone());
    engine.set(inc(10, 0, 10), VoxelResolution::Size8cm, true);

    let before = StateSnapshot::of_voxels(&engine, "baseline");

    let region_positions: Vec<_> = (0..6).map(|i| inc(40 + i, 0, 40)).collect();
    let changes = engine.create_batch_changes(&region_positions, VoxelResolution::Size1cm, true);
    history.execute(Command::batch(engine.clone(), "Stamp row", changes));
    history.execute(Command::place_voxel(
        engine.clone(),
        inc(60, 0, 60),
        VoxelResolution::Size2cm,
    ));
    history.execute(Command::remove_voxel(
        engine.clone(),
        inc(10, 0, 10),
        VoxelResolution::Size8cm,
    ));

    while history.undo() {}

    let after = StateSnapshot::of_voxels(&engine, "restored");
    assert_eq!(before, after);
}

#[test]
fn world_coordinates_must_sit_on_grid() {
    let engine = VoxelEngine::new();
    assert!(engine.set_at_world(
        WorldCoordinates::new(0.05, 0.0, -0.10),
        VoxelResolution::Size1cm,
        true
    ));
    assert!(!engine.set_at_world(
        WorldCoordinates::new(0.055, 0.0, 0.0),
        VoxelResolution::Size1cm,
        true
    ));
    assert!(engine.get_at_world(
        WorldCoordinates::new(0.05, 0.0, -0.10),
        VoxelResolution::Size1cm
    ));
}

#[test]
fn sparse_bulk_placement_stays_fast() {
    use std::time::Instant;
    let engine = VoxelEngine::new();
    let started = Instant::now();
    let mut placed = 0;
    for x in 0..25 {
        for y in 0..16 {
            for z in 0..25 {
                if engine.set(inc(x * 2, y * 2, z * 2), VoxelResolution::Size1cm, true) {
                    placed += 1;
                }
            }
        }
    }
    assert_eq!(placed, 10_000);
    assert!(
        started.elapsed().as_secs_f32() < 1.0,
        "placing 10k voxels took {:?}",
        started.elapsed()
    );
}
