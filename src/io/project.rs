//! Project aggregate, file save/load, backups and auto-save.
//!
//! Saving goes through a temporary sibling file that is fsynced and
//! renamed over the target, so a failed save never clobbers an existing
//! project. File writes populate the header's `file_size` and `checksum`
//! fields; stream writes leave them at the zero sentinel.

use super::binary::{BinaryReader, BinaryWriter};
use super::format::{self, checksum64, COMPRESSION_FLAG_CHUNKS};
use super::types::{
    constants, FileError, FileVersion, LoadOptions, ProjectMetadata, SaveOptions,
    WorkspaceSettings,
};
use crate::core::{VoxelEngine, Workspace};
use log::{info, warn};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Everything a project file carries.
#[derive(Debug)]
pub struct Project {
    pub metadata: ProjectMetadata,
    /// The voxel store this project reflects.
    pub engine: Arc<VoxelEngine>,
    /// Presentation settings; `size` mirrors the engine workspace on save.
    pub workspace: WorkspaceSettings,
    /// Ordered `(name, selection blob)` pairs; blobs are opaque here.
    pub named_selections: Vec<(String, Vec<u8>)>,
    /// Opaque camera state owned by the view layer.
    pub camera: Option<Vec<u8>>,
    /// Opaque group data owned by the grouping layer.
    pub groups: Option<Vec<u8>>,
    pub custom_data: BTreeMap<String, Vec<u8>>,
}

impl Project {
    pub fn new() -> Self {
        Self::with_engine(Arc::new(VoxelEngine::new()))
    }

    pub fn with_engine(engine: Arc<VoxelEngine>) -> Self {
        Self {
            metadata: ProjectMetadata::default(),
            engine,
            workspace: WorkspaceSettings::default(),
            named_selections: Vec::new(),
            camera: None,
            groups: None,
            custom_data: BTreeMap::new(),
        }
    }

    /// Settings as they should be persisted: the engine's workspace size
    /// is authoritative.
    pub fn effective_settings(&self) -> WorkspaceSettings {
        let mut settings = self.workspace.clone();
        settings.size = self.engine.workspace_size().to_array();
        settings
    }

    pub fn touch(&mut self) {
        self.metadata.touch();
    }

    pub fn set_custom_property(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata.properties.insert(key.into(), value.into());
    }

    pub fn custom_property(&self, key: &str) -> Option<&str> {
        self.metadata.properties.get(key).map(String::as_str)
    }

    pub fn set_custom_data(&mut self, key: impl Into<String>, data: Vec<u8>) {
        self.custom_data.insert(key.into(), data);
    }

    pub fn custom_data(&self, key: &str) -> Option<&[u8]> {
        self.custom_data.get(key).map(Vec::as_slice)
    }

    pub fn remove_custom_data(&mut self, key: &str) -> Option<Vec<u8>> {
        self.custom_data.remove(key)
    }

    pub fn voxel_count(&self) -> usize {
        self.engine.total_count()
    }

    /// Structural sanity used by save/load validation.
    pub fn is_valid(&self) -> bool {
        !self.metadata.name.is_empty() && Workspace::is_valid_size(self.engine.workspace_size())
    }

    /// Serialize to a stream (header sentinels stay zero).
    pub fn save_to<W: Write>(&self, writer: W, options: &SaveOptions) -> Result<(), FileError> {
        let mut writer = BinaryWriter::new(writer);
        format::write_project(&mut writer, self, options)
    }

    /// Deserialize from a stream.
    pub fn load_from<R: Read>(reader: R, options: &LoadOptions) -> Result<Self, FileError> {
        let mut reader = BinaryReader::new(reader);
        let (project, _header) = format::read_project(&mut reader, options)?;
        Ok(project)
    }
}

impl Default for Project {
    fn default() -> Self {
        Self::new()
    }
}

/// Write a project file atomically, populating the header's size and
/// checksum fields. No backup handling here; that belongs to the caller.
pub fn save_project_file(
    path: &Path,
    project: &Project,
    options: &SaveOptions,
) -> Result<(), FileError> {
    let mut body = Vec::new();
    format::write_chunks(&mut BinaryWriter::new(&mut body), project, options)?;

    let flags = if options.compress {
        COMPRESSION_FLAG_CHUNKS
    } else {
        0
    };
    let header = format::FileHeader {
        version: FileVersion::current(),
        file_size: (constants::HEADER_SIZE + body.len()) as u64,
        compression_flags: flags,
        checksum: checksum64(&body),
    };

    let temp_path = sibling_with_suffix(path, ".tmp");
    let write_result = (|| -> Result<(), FileError> {
        let file = fs::File::create(&temp_path).map_err(FileError::from_write)?;
        let mut writer = BinaryWriter::new(BufWriter::new(file));
        format::write_header(&mut writer, &header)?;
        writer.write_bytes(&body)?;
        let file = writer
            .into_inner()
            .into_inner()
            .map_err(|e| FileError::from_write(e.into_error()))?;
        file.sync_all().map_err(FileError::from_write)?;
        fs::rename(&temp_path, path).map_err(FileError::from_write)
    })();

    if write_result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    write_result
}

/// Read a project file, verifying the header's size and checksum fields
/// when they are nonzero.
pub fn load_project_file(path: &Path, options: &LoadOptions) -> Result<Project, FileError> {
    if !path.exists() {
        return Err(FileError::FileNotFound(path.display().to_string()));
    }
    let bytes = fs::read(path).map_err(FileError::from_read)?;
    if bytes.len() < constants::HEADER_SIZE {
        return Err(FileError::InvalidFormat("truncated file header".to_string()));
    }

    let header = format::read_header(&mut BinaryReader::new(&bytes[..constants::HEADER_SIZE]))?;
    if header.file_size != 0 && header.file_size != bytes.len() as u64 {
        return Err(FileError::CorruptedData(format!(
            "header says {} bytes, file is {}",
            header.file_size,
            bytes.len()
        )));
    }
    if header.checksum != 0 && header.checksum != checksum64(&bytes[constants::HEADER_SIZE..]) {
        return Err(FileError::CorruptedData(
            "file checksum mismatch".to_string(),
        ));
    }

    let mut reader = BinaryReader::new(bytes.as_slice());
    let (project, _header) = format::read_project(&mut reader, options)?;

    if options.validate_after_load && !project.is_valid() {
        return Err(FileError::CorruptedData(
            "loaded project failed validation".to_string(),
        ));
    }
    Ok(project)
}

fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.push_str(suffix);
    path.with_file_name(name)
}

/// `<stem>_<unix_millis>.bak<.ext>` next to the original.
fn backup_path(path: &Path, unix_millis: u128) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!(
            "{stem}_{unix_millis}{}.{}",
            constants::BACKUP_SUFFIX,
            ext.to_string_lossy()
        ),
        None => format!("{stem}_{unix_millis}{}", constants::BACKUP_SUFFIX),
    };
    path.with_file_name(name)
}

/// `<stem>.autosave<.ext>` next to the original.
pub fn auto_save_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!(
            "{stem}{}.{}",
            constants::AUTOSAVE_SUFFIX,
            ext.to_string_lossy()
        ),
        None => format!("{stem}{}", constants::AUTOSAVE_SUFFIX),
    };
    path.with_file_name(name)
}

struct AutoSaveEntry {
    path: PathBuf,
    project: Weak<Mutex<Project>>,
    dirty: bool,
    last_saved: Instant,
}

struct AutoSaveShared {
    running: AtomicBool,
    interval: Mutex<Duration>,
    entries: Mutex<Vec<AutoSaveEntry>>,
}

/// Save/load front end with backup rotation and background auto-save.
pub struct ProjectStore {
    backups_enabled: bool,
    max_backups: usize,
    shared: Arc<AutoSaveShared>,
    auto_save_thread: Option<JoinHandle<()>>,
}

impl ProjectStore {
    pub const DEFAULT_MAX_BACKUPS: usize = 5;

    pub fn new() -> Self {
        Self {
            backups_enabled: true,
            max_backups: Self::DEFAULT_MAX_BACKUPS,
            shared: Arc::new(AutoSaveShared {
                running: AtomicBool::new(false),
                interval: Mutex::new(Duration::from_secs(300)),
                entries: Mutex::new(Vec::new()),
            }),
            auto_save_thread: None,
        }
    }

    pub fn set_backups_enabled(&mut self, enabled: bool) {
        self.backups_enabled = enabled;
    }

    pub fn set_max_backups(&mut self, count: usize) {
        self.max_backups = count;
    }

    /// Save, creating a timestamped backup of any existing target first
    /// and pruning old backups past the configured maximum.
    pub fn save(
        &self,
        path: &Path,
        project: &Project,
        options: &SaveOptions,
    ) -> Result<(), FileError> {
        if options.validate_before_save && !project.is_valid() {
            return Err(FileError::InvalidFormat(
                "project failed validation before save".to_string(),
            ));
        }
        if options.create_backup && self.backups_enabled && path.exists() {
            if let Err(e) = self.create_backup(path) {
                warn!("backup of {} failed: {e}", path.display());
            }
        }
        save_project_file(path, project, options)?;
        info!("saved project to {}", path.display());
        Ok(())
    }

    pub fn load(&self, path: &Path, options: &LoadOptions) -> Result<Project, FileError> {
        let project = load_project_file(path, options)?;
        info!("loaded project from {}", path.display());
        Ok(project)
    }

    fn create_backup(&self, path: &Path) -> Result<PathBuf, FileError> {
        let millis = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        let backup = backup_path(path, millis);
        fs::copy(path, &backup).map_err(FileError::from_write)?;
        self.cleanup_old_backups(path);
        Ok(backup)
    }

    fn cleanup_old_backups(&self, path: &Path) {
        let mut backups = self.backup_files(path);
        if backups.len() <= self.max_backups {
            return;
        }
        backups.sort_by_key(|p| {
            fs::metadata(p)
                .and_then(|m| m.modified())
                .unwrap_or(std::time::SystemTime::UNIX_EPOCH)
        });
        let excess = backups.len() - self.max_backups;
        for old in backups.into_iter().take(excess) {
            if let Err(e) = fs::remove_file(&old) {
                warn!("could not remove old backup {}: {e}", old.display());
            }
        }
    }

    /// Backups previously created for `path`, in directory order.
    pub fn backup_files(&self, path: &Path) -> Vec<PathBuf> {
        let Some(dir) = path.parent() else {
            return Vec::new();
        };
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let prefix = format!("{stem}_");
        let Ok(entries) = fs::read_dir(dir) else {
            return Vec::new();
        };
        entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .is_some_and(|n| n.starts_with(&prefix) && n.contains(constants::BACKUP_SUFFIX))
            })
            .collect()
    }

    pub fn restore_from_backup(&self, backup: &Path, target: &Path) -> Result<(), FileError> {
        fs::copy(backup, target).map_err(FileError::from_write)?;
        Ok(())
    }

    /// Start or stop the auto-save thread. While enabled, it wakes once
    /// per second and saves each dirty registered project whose last save
    /// is older than `interval`, using Fast options, to a sibling
    /// `<stem>.autosave<ext>` path. Failures are logged and otherwise
    /// silent.
    pub fn set_auto_save_enabled(&mut self, enabled: bool, interval: Duration) {
        *self.shared.interval.lock() = interval;
        if enabled {
            if self.auto_save_thread.is_none() {
                self.shared.running.store(true, Ordering::Release);
                let shared = self.shared.clone();
                self.auto_save_thread = Some(std::thread::spawn(move || auto_save_loop(&shared)));
            }
        } else {
            self.stop_auto_save();
        }
    }

    pub fn register_auto_save(&self, path: &Path, project: &Arc<Mutex<Project>>) {
        let mut entries = self.shared.entries.lock();
        if let Some(entry) = entries.iter_mut().find(|e| e.path == path) {
            entry.project = Arc::downgrade(project);
            return;
        }
        entries.push(AutoSaveEntry {
            path: path.to_path_buf(),
            project: Arc::downgrade(project),
            dirty: false,
            last_saved: Instant::now(),
        });
    }

    pub fn unregister_auto_save(&self, path: &Path) {
        self.shared.entries.lock().retain(|e| e.path != path);
    }

    /// Flag a registered project as needing an auto-save.
    pub fn mark_dirty(&self, path: &Path) {
        let mut entries = self.shared.entries.lock();
        if let Some(entry) = entries.iter_mut().find(|e| e.path == path) {
            entry.dirty = true;
        }
    }

    fn stop_auto_save(&mut self) {
        self.shared.running.store(false, Ordering::Release);
        if let Some(handle) = self.auto_save_thread.take() {
            let _ = handle.join();
        }
    }
}

impl Default for ProjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ProjectStore {
    fn drop(&mut self) {
        self.stop_auto_save();
    }
}

fn auto_save_loop(shared: &AutoSaveShared) {
    while shared.running.load(Ordering::Acquire) {
        std::thread::sleep(Duration::from_secs(1));
        let interval = *shared.interval.lock();
        let mut entries = shared.entries.lock();
        for entry in entries.iter_mut() {
            if !entry.dirty || entry.last_saved.elapsed() < interval {
                continue;
            }
            let Some(project) = entry.project.upgrade() else {
                continue;
            };
            let target = auto_save_path(&entry.path);
            let project = project.lock();
            match save_project_file(&target, &project, &SaveOptions::fast()) {
                Ok(()) => {
                    entry.dirty = false;
                    entry.last_saved = Instant::now();
                    info!("auto-saved {}", target.display());
                }
                Err(e) => warn!("auto-save of {} failed: {e}", target.display()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{IncrementCoordinates, VoxelResolution};

    #[test]
    fn test_custom_data_accessors() {
        let mut project = Project::new();
        project.set_custom_data("notes", b"hello".to_vec());
        assert_eq!(project.custom_data("notes"), Some(&b"hello"[..]));
        assert_eq!(project.remove_custom_data("notes"), Some(b"hello".to_vec()));
        assert_eq!(project.custom_data("notes"), None);
    }

    #[test]
    fn test_effective_settings_track_engine() {
        let project = Project::new();
        project.engine.resize_workspace(glam::Vec3::splat(6.0));
        assert_eq!(project.effective_settings().size, [6.0, 6.0, 6.0]);
    }

    #[test]
    fn test_backup_path_shape() {
        let p = backup_path(Path::new("/work/tower.cvef"), 1234);
        assert_eq!(p, Path::new("/work/tower_1234.bak.cvef"));
        let q = backup_path(Path::new("noext"), 9);
        assert_eq!(q, Path::new("noext_9.bak"));
    }

    #[test]
    fn test_auto_save_path_shape() {
        let p = auto_save_path(Path::new("/work/tower.cvef"));
        assert_eq!(p, Path::new("/work/tower.autosave.cvef"));
    }

    #[test]
    fn test_stream_roundtrip() {
        let mut project = Project::new();
        project.metadata.name = "Stream".to_string();
        project.engine.set(
            IncrementCoordinates::new(3, 0, 3),
            VoxelResolution::Size2cm,
            true,
        );
        project.set_custom_data("k", vec![1, 2, 3]);

        let mut buffer = Vec::new();
        project.save_to(&mut buffer, &SaveOptions::fast()).unwrap();
        let loaded = Project::load_from(buffer.as_slice(), &LoadOptions::default()).unwrap();

        assert_eq!(loaded.metadata.name, "Stream");
        assert!(loaded
            .engine
            .get(IncrementCoordinates::new(3, 0, 3), VoxelResolution::Size2cm));
        assert_eq!(loaded.custom_data("k"), Some(&[1u8, 2, 3][..]));
    }

    #[test]
    fn test_validation_blocks_bad_save() {
        let store = ProjectStore::new();
        let mut project = Project::new();
        project.metadata.name = String::new();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.cvef");
        let err = store
            .save(&path, &project, &SaveOptions::default())
            .unwrap_err();
        assert!(matches!(err, FileError::InvalidFormat(_)));
        assert!(!path.exists());
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let store = ProjectStore::new();
        let err = store
            .load(Path::new("/no/such/file.cvef"), &LoadOptions::default())
            .unwrap_err();
        assert!(matches!(err, FileError::FileNotFound(_)));
    }
}
