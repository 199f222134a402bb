//! Error types for the asset system.

use std::fmt;
use std::path::PathBuf;

/// Errors that can occur during asset operations.
#[derive(Debug)]
pub enum AssetError {
    /// The name is not present in any loose search path or mounted archive.
    NotFound {
        /// The path or canonical name that was looked up.
        path: String,
    },

    /// Failed to open or read a file.
    IoError {
        /// The path that failed to load.
        path: PathBuf,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// An archive header, chunk or directory entry could not be parsed.
    InvalidFormat {
        /// The archive being parsed.
        path: String,
        /// What was wrong with it.
        message: String,
    },

    /// A pointer entry names an archive that is not mounted.
    UnresolvedPointer {
        /// The asset name being resolved.
        name: String,
        /// The archive holding the pointer entry.
        archive: String,
        /// The archive the pointer refers to.
        target: String,
    },

    /// A compressed payload could not be decoded.
    Decompression {
        /// The asset name being extracted.
        name: String,
        /// Decoder error message.
        message: String,
    },

    /// No loader registered for this asset type and cache id.
    NoLoader {
        /// Human-readable type name.
        type_name: &'static str,
        /// The cache id the load was issued for.
        cache_id: String,
    },

    /// The loader or construction callback failed to build the asset.
    LoaderError {
        /// The canonical name being loaded.
        path: String,
        /// Description of the error.
        message: String,
    },

    /// An archive marked as required at startup could not be mounted.
    RequiredArchive {
        /// The archive name from the configuration.
        name: String,
        /// Why mounting failed.
        source: Box<AssetError>,
    },

    /// Generic error with a message.
    Other {
        /// Error message.
        message: String,
    },
}

impl AssetError {
    /// Build an [`AssetError::InvalidFormat`].
    pub fn invalid_format(path: impl Into<String>, message: impl Into<String>) -> Self {
        AssetError::InvalidFormat {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Whether this is an ordinary "asset missing" condition.
    ///
    /// Unresolved pointers count as missing for callers; they are only
    /// distinguished in diagnostics.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            AssetError::NotFound { .. } | AssetError::UnresolvedPointer { .. }
        )
    }
}

impl fmt::Display for AssetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetError::NotFound { path } => {
                write!(f, "Asset not found: {}", path)
            }
            AssetError::IoError { path, source } => {
                write!(f, "IO error loading '{}': {}", path.display(), source)
            }
            AssetError::InvalidFormat { path, message } => {
                write!(f, "Invalid archive '{}': {}", path, message)
            }
            AssetError::UnresolvedPointer {
                name,
                archive,
                target,
            } => {
                write!(
                    f,
                    "'{}' in archive '{}' points to '{}', which is not loaded",
                    name, archive, target
                )
            }
            AssetError::Decompression { name, message } => {
                write!(f, "Failed to decompress '{}': {}", name, message)
            }
            AssetError::NoLoader { type_name, cache_id } => {
                if cache_id.is_empty() {
                    write!(f, "No loader registered for asset type: {}", type_name)
                } else {
                    write!(
                        f,
                        "No loader registered for asset type: {} (cache '{}')",
                        type_name, cache_id
                    )
                }
            }
            AssetError::LoaderError { path, message } => {
                write!(f, "Failed to load '{}': {}", path, message)
            }
            AssetError::RequiredArchive { name, source } => {
                write!(f, "Required archive '{}' failed to load: {}", name, source)
            }
            AssetError::Other { message } => {
                write!(f, "Asset error: {}", message)
            }
        }
    }
}

impl std::error::Error for AssetError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AssetError::IoError { source, .. } => Some(source),
            AssetError::RequiredArchive { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

/// Result type alias for asset operations.
pub type AssetResult<T> = Result<T, AssetError>;
