//! Persistence: the chunked project container, STL export, versioning
//! and compression.

pub mod binary;
pub mod compression;
pub mod format;
mod project;
mod stl;
mod types;
mod version;

pub use format::{FileHeader, COMPRESSION_FLAG_CHUNKS};
pub use project::{
    auto_save_path, load_project_file, save_project_file, Project, ProjectStore,
};
pub use stl::StlExporter;
pub use types::{
    constants, ChunkType, FileError, FileVersion, LoadOptions, ProjectMetadata, SaveOptions,
    StlExportOptions, StlExportStats, StlFormat, StlUnits, WorkspaceSettings,
};
pub use version::{FileVersioning, MigrationFn};
