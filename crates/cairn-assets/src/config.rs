//! Startup configuration for an [`AssetManager`](crate::AssetManager).

use std::path::PathBuf;

use crate::manager::ArchivePriority;

/// An archive to mount at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveMount {
    /// File name, resolved against the search paths.
    pub name: String,
    /// Priority tier to mount it at.
    pub priority: ArchivePriority,
    /// Whether a failed mount aborts startup.
    pub required: bool,
}

/// Configuration for the asset manager.
///
/// Search path order is lookup order; an empty path means the working
/// directory. Archives are mounted in list order.
#[derive(Debug, Clone, Default)]
pub struct AssetConfig {
    pub search_paths: Vec<PathBuf>,
    pub archives: Vec<ArchiveMount>,
}

impl AssetConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a loose-file search path.
    pub fn search_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.search_paths.push(path.into());
        self
    }

    /// Mount `name` at `priority`, logging and skipping it if it fails.
    pub fn archive(mut self, name: impl Into<String>, priority: ArchivePriority) -> Self {
        self.archives.push(ArchiveMount {
            name: name.into(),
            priority,
            required: false,
        });
        self
    }

    /// Mount `name` at `priority`, failing startup if it cannot be mounted.
    pub fn required_archive(mut self, name: impl Into<String>, priority: ArchivePriority) -> Self {
        self.archives.push(ArchiveMount {
            name: name.into(),
            priority,
            required: true,
        });
        self
    }
}
