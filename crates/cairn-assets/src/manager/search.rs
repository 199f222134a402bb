//! Loose-file lookup over an ordered list of directories.

use std::path::{Path, PathBuf};

use crate::error::{AssetError, AssetResult};

/// Ordered loose-file search directories.
///
/// An empty path stands for the working directory.
#[derive(Debug, Clone, Default)]
pub(crate) struct SearchPaths {
    dirs: Vec<PathBuf>,
}

impl SearchPaths {
    pub(crate) fn new(dirs: Vec<PathBuf>) -> Self {
        Self { dirs }
    }

    pub(crate) fn push(&mut self, dir: PathBuf) {
        self.dirs.push(dir);
    }

    pub(crate) fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    /// First regular file matching `name` in directory order.
    pub(crate) fn find(&self, name: &str) -> Option<PathBuf> {
        self.candidates(name).next()
    }

    /// Every regular file matching `name`, at most one per directory, in directory order.
    ///
    /// Each directory is tried with `name` as given, then lower-cased.
    pub(crate) fn candidates<'a>(&'a self, name: &'a str) -> impl Iterator<Item = PathBuf> + 'a {
        let lower = name.to_ascii_lowercase();
        self.dirs.iter().filter_map(move |dir| {
            let exact = dir.join(name);
            if exact.is_file() {
                return Some(exact);
            }
            let folded = dir.join(&lower);
            folded.is_file().then_some(folded)
        })
    }
}

/// Read a located file.
pub(crate) fn read_file(path: &Path) -> AssetResult<Vec<u8>> {
    std::fs::read(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            AssetError::NotFound {
                path: path.display().to_string(),
            }
        } else {
            AssetError::IoError {
                path: path.to_path_buf(),
                source: e,
            }
        }
    })
}
