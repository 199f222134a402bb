//! Cairn Assets - archive-backed asset storage for the Cairn runtime.
//!
//! This crate provides:
//! - A reader for the read-only archive container format, with LZ4 and zlib payloads
//! - Typed cache partitions keyed by asset type and cache id
//! - Scope-based lifetimes (`Global`, `Scene`, `Manual`) with one-way promotion
//! - Name resolution over loose-file search paths and prioritized archives,
//!   including cross-archive pointer entries
//! - Synchronous and spawner-driven asynchronous loading
//!
//! # Example
//!
//! ```ignore
//! use cairn_assets::prelude::*;
//!
//! let manager = AssetManager::with_search_paths(["mods", "data"]);
//! manager.register_loader("", TextLoader);
//! manager.load_archive("core.arc", ArchivePriority::LOW);
//!
//! let motd = manager.load::<String>("motd", AssetScope::Scene, "").unwrap();
//! assert_eq!(motd.name(), "MOTD.TXT");
//! ```

pub mod archive;
pub mod cache;
pub mod config;
pub mod error;
pub mod event;
pub mod handle;
pub mod loader;
pub mod manager;
pub mod scope;

pub use archive::{Archive, ArchiveEntry, Compression};
pub use cache::{CachePartition, CacheRegistry, ErasedPartition};
pub use config::{ArchiveMount, AssetConfig};
pub use error::{AssetError, AssetResult};
pub use event::{AssetEvent, AssetEventBuffer};
pub use handle::{Handle, WeakHandle};
pub use loader::{AssetLoader, BytesLoader, LoadContext, LoaderRegistry, TextLoader};
pub use manager::{ArchivePriority, AssetManager, Spawner, ThreadSpawner, canonicalize};
#[cfg(feature = "task-pool")]
pub use manager::PoolSpawner;
pub use scope::AssetScope;

/// Marker trait for types that can be loaded and cached.
///
/// Assets are shared between threads through [`Handle`], so they must be
/// `Send + Sync`.
pub trait Asset: Send + Sync + 'static {
    /// Name used in log messages and errors.
    fn type_name() -> &'static str {
        std::any::type_name::<Self>()
    }
}

impl Asset for String {
    fn type_name() -> &'static str {
        "String"
    }
}

impl Asset for Vec<u8> {
    fn type_name() -> &'static str {
        "Bytes"
    }
}

pub mod prelude {
    pub use crate::{
        ArchivePriority, Asset, AssetConfig, AssetError, AssetEvent, AssetLoader, AssetManager,
        AssetResult, AssetScope, BytesLoader, Handle, LoadContext, Spawner, TextLoader,
    };
}
