//! Project file round-trips, backups and export against real files.

use std::fs;
use std::sync::Arc;

use glam::Vec3;
use voxelcore::core::{IncrementCoordinates, VoxelResolution};
use voxelcore::io::{
    FileError, LoadOptions, ProjectStore, SaveOptions, StlExportOptions,
};
use voxelcore::mesh::{Mesh, Vertex};
use voxelcore::{Project, StlExporter, VoxelEngine};

fn inc(x: i32, y: i32, z: i32) -> IncrementCoordinates {
    IncrementCoordinates::new(x, y, z)
}

fn sample_project() -> Project {
    let engine = Arc::new(VoxelEngine::new());
    engine.resize_workspace(Vec3::splat(8.0));
    engine.set(inc(0, 0, 0), VoxelResolution::Size8cm, true);
    let mut project = Project::with_engine(engine);
    project.metadata.name = "T".to_string();
    project
}

#[test]
fn binary_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("t.cvef");
    let store = ProjectStore::new();

    let project = sample_project();
    let options = SaveOptions {
        compress: false,
        ..SaveOptions::default()
    };
    store.save(&path, &project, &options).unwrap();

    // The file starts with the container magic.
    let bytes = fs::read(&path).unwrap();
    assert_eq!(&bytes[..4], &[0x43, 0x56, 0x45, 0x46]);

    let loaded = store.load(&path, &LoadOptions::default()).unwrap();
    assert_eq!(loaded.metadata.name, "T");
    assert_eq!(loaded.engine.workspace_size(), Vec3::splat(8.0));
    assert!(loaded.engine.get(inc(0, 0, 0), VoxelResolution::Size8cm));
}

#[test]
fn round_trip_preserves_everything() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("full.cvef");
    let store = ProjectStore::new();

    let mut project = sample_project();
    project.metadata.description = "round trip".to_string();
    project.metadata.author = "tester".to_string();
    project.set_custom_property("stage", "draft");
    project.set_custom_data("thumbnail", vec![9u8; 100]);
    project.named_selections.push(("walls".to_string(), vec![1, 2, 3]));
    project.camera = Some(vec![7u8; 40]);
    project.groups = Some(vec![5u8; 12]);
    project.workspace.grid_visible = false;
    project.workspace.background_color = [0.0, 0.5, 1.0, 1.0];

    // Voxels across several resolutions.
    project.engine.set(inc(50, 0, 50), VoxelResolution::Size1cm, true);
    project.engine.set(inc(-100, 0, -100), VoxelResolution::Size16cm, true);
    project.engine.set_active_resolution(VoxelResolution::Size16cm);

    for options in [SaveOptions::default(), SaveOptions::fast(), SaveOptions::compact()] {
        store.save(&path, &project, &options).unwrap();
        let loaded = store.load(&path, &LoadOptions::default()).unwrap();

        assert_eq!(loaded.metadata.name, project.metadata.name);
        assert_eq!(loaded.metadata.description, "round trip");
        assert_eq!(loaded.custom_property("stage"), Some("draft"));
        assert_eq!(loaded.custom_data("thumbnail"), project.custom_data("thumbnail"));
        assert_eq!(loaded.named_selections, project.named_selections);
        assert_eq!(loaded.camera, project.camera);
        assert_eq!(loaded.groups, project.groups);
        assert!(!loaded.workspace.grid_visible);
        assert_eq!(loaded.workspace.background_color, [0.0, 0.5, 1.0, 1.0]);
        assert_eq!(
            loaded.engine.active_resolution(),
            VoxelResolution::Size16cm
        );

        // Occupancy matches across every resolution.
        for res in VoxelResolution::ALL {
            let mut original: Vec<_> = project
                .engine
                .all_voxels(res)
                .into_iter()
                .map(|v| v.increment)
                .collect();
            let mut reloaded: Vec<_> = loaded
                .engine
                .all_voxels(res)
                .into_iter()
                .map(|v| v.increment)
                .collect();
            original.sort_by_key(|p| (p.x, p.y, p.z));
            reloaded.sort_by_key(|p| (p.x, p.y, p.z));
            assert_eq!(original, reloaded, "occupancy differs at {res}");
        }
    }
}

#[test]
fn corrupted_chunk_fails_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("corrupt.cvef");
    let store = ProjectStore::new();
    store
        .save(&path, &sample_project(), &SaveOptions::fast())
        .unwrap();

    let mut bytes = fs::read(&path).unwrap();
    // Flip a byte inside the first chunk payload (past header + chunk
    // header) and clear the whole-file checksum so the chunk CRC is the
    // line of defense under test.
    bytes[28..36].copy_from_slice(&[0u8; 8]);
    bytes[280] ^= 0xFF;
    fs::write(&path, &bytes).unwrap();

    let err = store.load(&path, &LoadOptions::default()).unwrap_err();
    assert!(matches!(err, FileError::CorruptedData(_)), "got {err:?}");
}

#[test]
fn file_checksum_detects_tampering() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sum.cvef");
    let store = ProjectStore::new();
    store
        .save(&path, &sample_project(), &SaveOptions::fast())
        .unwrap();

    let mut bytes = fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0x01;
    fs::write(&path, &bytes).unwrap();

    let err = store.load(&path, &LoadOptions::default()).unwrap_err();
    assert!(matches!(err, FileError::CorruptedData(_)));
}

#[test]
fn version_mismatch_refused_unless_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.cvef");
    let store = ProjectStore::new();
    store
        .save(&path, &sample_project(), &SaveOptions::fast())
        .unwrap();

    // Bump the minor version beyond the reader's and fix up nothing else;
    // the checksum field ignores the header so it stays valid.
    let mut bytes = fs::read(&path).unwrap();
    bytes[6] = 99;
    fs::write(&path, &bytes).unwrap();

    let err = store.load(&path, &LoadOptions::safe()).unwrap_err();
    assert!(matches!(err, FileError::VersionMismatch { .. }));

    let lenient = LoadOptions {
        ignore_version_mismatch: true,
        ..LoadOptions::default()
    };
    let loaded = store.load(&path, &lenient).unwrap();
    assert_eq!(loaded.metadata.name, "T");
}

#[test]
fn backups_rotate_oldest_out() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rotating.cvef");
    let mut store = ProjectStore::new();
    store.set_max_backups(2);

    let project = sample_project();
    for _ in 0..4 {
        store.save(&path, &project, &SaveOptions::default()).unwrap();
        // Backup filenames carry millisecond timestamps.
        std::thread::sleep(std::time::Duration::from_millis(5));
    }

    let backups = store.backup_files(&path);
    assert_eq!(backups.len(), 2);
    for backup in &backups {
        let name = backup.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("rotating_"));
        assert!(name.ends_with(".bak.cvef"));
    }
}

#[test]
fn failed_save_leaves_existing_file_intact() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("keep.cvef");
    let store = ProjectStore::new();
    store
        .save(&path, &sample_project(), &SaveOptions::fast())
        .unwrap();
    let before = fs::read(&path).unwrap();

    // A project that fails pre-save validation must not touch the file.
    let mut broken = Project::new();
    broken.metadata.name = String::new();
    assert!(store.save(&path, &broken, &SaveOptions::default()).is_err());
    assert_eq!(fs::read(&path).unwrap(), before);
}

#[test]
fn stl_single_triangle_binary() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tri.stl");

    let mut mesh = Mesh::new();
    mesh.add_triangle([
        Vertex::at([0.0, 0.0, 0.0]),
        Vertex::at([0.01, 0.0, 0.0]),
        Vertex::at([0.0, 0.01, 0.0]),
    ]);

    let stats = StlExporter::new()
        .export_mesh(&path, &mesh, &StlExportOptions::default())
        .unwrap();

    let bytes = fs::read(&path).unwrap();
    assert_eq!(bytes.len(), 134);
    assert_eq!(u32::from_le_bytes(bytes[80..84].try_into().unwrap()), 1);
    assert_eq!(stats.file_size, 134);
    assert_eq!(stats.triangle_count, 1);
}

#[test]
fn snapshot_file_round_trip() {
    use voxelcore::StateSnapshot;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("checkpoint.snap");

    let engine = VoxelEngine::new();
    engine.set(inc(0, 0, 0), VoxelResolution::Size4cm, true);
    engine.set(inc(12, 0, -12), VoxelResolution::Size1cm, true);

    let mut snapshot = StateSnapshot::of_voxels(&engine, "milestone");
    snapshot.compress();
    snapshot.save_to_file(&path).unwrap();

    let bytes = fs::read(&path).unwrap();
    assert_eq!(&bytes[..4], b"SNAP");

    let loaded = StateSnapshot::load_from_file(&path).unwrap();
    assert_eq!(loaded, snapshot);

    let replica = VoxelEngine::new();
    loaded.restore_voxels(&replica).unwrap();
    assert!(replica.get(inc(0, 0, 0), VoxelResolution::Size4cm));
    assert!(replica.get(inc(12, 0, -12), VoxelResolution::Size1cm));
    assert_eq!(replica.total_count(), 2);
}

#[test]
fn auto_save_writes_sibling_file() {
    use parking_lot::Mutex;
    use std::time::Duration;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("work.cvef");

    let project = Arc::new(Mutex::new(sample_project()));
    let mut store = ProjectStore::new();
    store.register_auto_save(&path, &project);
    store.set_auto_save_enabled(true, Duration::from_millis(1));
    store.mark_dirty(&path);

    let autosave = dir.path().join("work.autosave.cvef");
    let deadline = std::time::Instant::now() + Duration::from_secs(10);
    while !autosave.exists() && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(50));
    }
    store.set_auto_save_enabled(false, Duration::from_millis(1));

    assert!(autosave.exists(), "auto-save file was not produced");
    let loaded = ProjectStore::new()
        .load(&autosave, &LoadOptions::default())
        .unwrap();
    assert_eq!(loaded.metadata.name, "T");
}
