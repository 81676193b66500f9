//! File version comparison and the migration registry.
//!
//! Migrations are registered as `(from, to)` edges over project state;
//! `can_upgrade` searches for a path of registered edges. The shipped
//! crate registers none; the registry is scaffolding for future format
//! revisions. The reader refuses files whose major differs from the
//! current version regardless of this registry.

use super::binary::BinaryReader;
use super::format::read_header;
use super::project::{load_project_file, save_project_file, Project};
use super::types::{FileError, FileVersion, LoadOptions, SaveOptions};
use log::{info, warn};
use std::collections::{HashMap, VecDeque};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Transforms project state from one format version to the next.
pub type MigrationFn = Box<dyn Fn(&mut Project) -> Result<(), FileError> + Send + Sync>;

/// Registry of format migrations, warnings and changelogs.
pub struct FileVersioning {
    migrations: HashMap<(FileVersion, FileVersion), MigrationFn>,
    warnings: HashMap<(FileVersion, FileVersion), Vec<String>>,
    changelog: BTreeMap<FileVersion, String>,
}

impl FileVersioning {
    pub fn new() -> Self {
        let mut versioning = Self {
            migrations: HashMap::new(),
            warnings: HashMap::new(),
            changelog: BTreeMap::new(),
        };
        versioning
            .changelog
            .insert(FileVersion::new(1, 0, 0, 0), "Initial version".to_string());
        // No migrations yet; register them here as formats evolve.
        versioning
    }

    pub fn current_version(&self) -> FileVersion {
        FileVersion::current()
    }

    pub fn is_compatible(&self, version: FileVersion) -> bool {
        version.is_compatible(&FileVersion::current())
    }

    pub fn needs_upgrade(&self, version: FileVersion) -> bool {
        version < FileVersion::current()
    }

    pub fn register_migration(
        &mut self,
        from: FileVersion,
        to: FileVersion,
        migration: MigrationFn,
    ) {
        self.migrations.insert((from, to), migration);
    }

    pub fn register_warnings(&mut self, from: FileVersion, to: FileVersion, notes: Vec<String>) {
        self.warnings.insert((from, to), notes);
    }

    pub fn set_changelog(&mut self, version: FileVersion, notes: impl Into<String>) {
        self.changelog.insert(version, notes.into());
    }

    pub fn changelog(&self, version: FileVersion) -> Option<&str> {
        self.changelog.get(&version).map(String::as_str)
    }

    /// Versions with a changelog entry, oldest first.
    pub fn version_history(&self) -> Vec<FileVersion> {
        self.changelog.keys().copied().collect()
    }

    /// Whether a chain of registered migrations leads from `from` to
    /// `to`. Trivially true when they are equal.
    pub fn can_upgrade(&self, from: FileVersion, to: FileVersion) -> bool {
        self.upgrade_path(from, to).is_some()
    }

    /// Breadth-first search over registered migration edges.
    pub fn upgrade_path(
        &self,
        from: FileVersion,
        to: FileVersion,
    ) -> Option<Vec<(FileVersion, FileVersion)>> {
        if from == to {
            return Some(Vec::new());
        }
        let mut predecessors: HashMap<FileVersion, (FileVersion, FileVersion)> = HashMap::new();
        let mut queue = VecDeque::from([from]);
        while let Some(version) = queue.pop_front() {
            for &(edge_from, edge_to) in self.migrations.keys() {
                if edge_from != version || predecessors.contains_key(&edge_to) || edge_to == from {
                    continue;
                }
                predecessors.insert(edge_to, (edge_from, edge_to));
                if edge_to == to {
                    let mut path = Vec::new();
                    let mut cursor = to;
                    while cursor != from {
                        let edge = predecessors[&cursor];
                        path.push(edge);
                        cursor = edge.0;
                    }
                    path.reverse();
                    return Some(path);
                }
                queue.push_back(edge_to);
            }
        }
        None
    }

    /// Warnings accumulated along the upgrade path.
    pub fn upgrade_warnings(&self, from: FileVersion, to: FileVersion) -> Vec<String> {
        let Some(path) = self.upgrade_path(from, to) else {
            return Vec::new();
        };
        path.iter()
            .filter_map(|edge| self.warnings.get(edge))
            .flatten()
            .cloned()
            .collect()
    }

    /// Read the format version out of a project file header.
    pub fn detect_version(&self, path: &Path) -> Result<FileVersion, FileError> {
        let file = File::open(path).map_err(FileError::from_read)?;
        let header = read_header(&mut BinaryReader::new(BufReader::new(file)))?;
        Ok(header.version)
    }

    /// Load `input` at its recorded version, run the migration path, and
    /// write `output` at `target`.
    pub fn upgrade_file(
        &self,
        input: &Path,
        output: &Path,
        target: FileVersion,
    ) -> Result<(), FileError> {
        let from = self.detect_version(input)?;
        let path = self.upgrade_path(from, target).ok_or(FileError::VersionMismatch {
            file: from,
            reader: target,
        })?;

        let load_options = LoadOptions {
            ignore_version_mismatch: true,
            ..LoadOptions::default()
        };
        let mut project = load_project_file(input, &load_options)?;

        for edge in &path {
            for warning in self.warnings.get(edge).into_iter().flatten() {
                warn!("migration {} -> {}: {warning}", edge.0, edge.1);
            }
            let migration = &self.migrations[edge];
            migration(&mut project)?;
        }
        info!(
            "upgraded {} from {} to {} in {} steps",
            input.display(),
            from,
            target,
            path.len()
        );
        save_project_file(output, &project, &SaveOptions::default())
    }
}

impl Default for FileVersioning {
    fn default() -> Self {
        Self::new()
    }
}
