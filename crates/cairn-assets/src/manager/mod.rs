//! Asset manager - resolves names to bytes and bytes to cached assets.

mod mounts;
mod search;
mod spawn;

use std::any::TypeId;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;

use parking_lot::{Mutex, RwLock};

use crate::Asset;
use crate::archive::Archive;
use crate::archive::format::fold_name;
use crate::cache::{CacheRegistry, SetOutcome};
use crate::config::AssetConfig;
use crate::error::{AssetError, AssetResult};
use crate::event::{AssetEvent, AssetEventBuffer};
use crate::handle::Handle;
use crate::loader::{AssetLoader, LoadContext, LoaderRegistry, construct_with};
use crate::scope::AssetScope;

pub use mounts::{ArchivePriority, MAX_POINTER_HOPS};
use mounts::MountTable;
use search::{SearchPaths, read_file};
#[cfg(feature = "task-pool")]
pub use spawn::PoolSpawner;
pub use spawn::{Spawner, ThreadSpawner};

/// Upper-case `name` and append `.EXT` when it has no three-letter extension.
///
/// Applying it to its own output is a no-op.
pub fn canonicalize(name: &str, default_extension: Option<&str>) -> String {
    let mut canonical = name.to_ascii_uppercase();
    let bytes = canonical.as_bytes();
    let has_extension = bytes.len() >= 4 && bytes[bytes.len() - 4] == b'.';

    if !has_extension && let Some(ext) = default_extension {
        canonical.push('.');
        canonical.push_str(&ext.to_ascii_uppercase());
    }
    canonical
}

/// Locates, decompresses, caches and lifetime-manages assets.
///
/// Bytes come from loose files in the search paths first, then from the
/// mounted archives by priority tier. Loaded assets are cached per type and
/// cache id; see [`AssetScope`] for how long they stay.
///
/// Every method takes `&self`, so a manager is usually shared as
/// `Arc<AssetManager>` between the main thread and loader threads.
///
/// # Example
///
/// ```ignore
/// let manager = AssetManager::with_search_paths(["assets"]);
/// manager.register_loader("", TextLoader);
/// manager.load_archive("core.arc", ArchivePriority::LOW);
/// manager.load_archive("patch.arc", ArchivePriority::HIGH);
///
/// let greeting = manager.load::<String>("hello", AssetScope::Global, "").unwrap();
/// println!("{}", *greeting);
///
/// // Leaving the level
/// manager.unload_assets(AssetScope::Scene);
/// ```
pub struct AssetManager {
    search_paths: RwLock<SearchPaths>,
    mounts: RwLock<MountTable>,
    caches: CacheRegistry,
    loaders: RwLock<LoaderRegistry>,
    events: Mutex<AssetEventBuffer>,
    outstanding: AtomicUsize,
}

impl Default for AssetManager {
    fn default() -> Self {
        Self::new()
    }
}

impl AssetManager {
    /// Create a manager that searches the working directory.
    pub fn new() -> Self {
        Self::with_search_paths([PathBuf::new()])
    }

    /// Create a manager with ordered loose-file search paths.
    pub fn with_search_paths<P: Into<PathBuf>>(paths: impl IntoIterator<Item = P>) -> Self {
        Self {
            search_paths: RwLock::new(SearchPaths::new(paths.into_iter().map(Into::into).collect())),
            mounts: RwLock::new(MountTable::default()),
            caches: CacheRegistry::new(),
            loaders: RwLock::new(LoaderRegistry::new()),
            events: Mutex::new(AssetEventBuffer::new()),
            outstanding: AtomicUsize::new(0),
        }
    }

    /// Create a manager from startup configuration and mount its archives.
    ///
    /// An empty search path list means the working directory. A failed
    /// optional archive is logged and skipped; a failed required one is
    /// returned as [`AssetError::RequiredArchive`].
    pub fn from_config(config: &AssetConfig) -> AssetResult<Self> {
        let manager = if config.search_paths.is_empty() {
            Self::new()
        } else {
            Self::with_search_paths(config.search_paths.iter().cloned())
        };

        for mount in &config.archives {
            match manager.try_load_archive(&mount.name, mount.priority) {
                Ok(()) => {}
                Err(err) if mount.required => {
                    tracing::error!("Required archive '{}' failed to load: {}", mount.name, err);
                    return Err(AssetError::RequiredArchive {
                        name: mount.name.clone(),
                        source: Box::new(err),
                    });
                }
                Err(err) => {
                    tracing::warn!("Skipping archive '{}': {}", mount.name, err);
                }
            }
        }

        Ok(manager)
    }

    /// Append a loose-file search path.
    pub fn add_search_path(&self, path: impl Into<PathBuf>) {
        self.search_paths.write().push(path.into());
    }

    /// The loose-file search paths, in lookup order.
    pub fn search_paths(&self) -> Vec<PathBuf> {
        self.search_paths.read().dirs().to_vec()
    }

    // --- Archives ---

    /// Locate `name` in the search paths and mount it at `priority`.
    ///
    /// Succeeds without doing anything if an archive of that name is
    /// already mounted.
    pub fn try_load_archive(&self, name: &str, priority: ArchivePriority) -> AssetResult<()> {
        let key = fold_name(name);
        if self.mounts.read().contains(&key) {
            tracing::debug!("Archive '{}' already loaded", key);
            return Ok(());
        }

        let path = self
            .search_paths
            .read()
            .find(name)
            .ok_or_else(|| AssetError::NotFound {
                path: name.to_string(),
            })?;

        let archive = Archive::open(&path)?;
        self.mount(key, archive, priority);
        Ok(())
    }

    /// Like [`try_load_archive`](Self::try_load_archive), logging failures.
    pub fn load_archive(&self, name: &str, priority: ArchivePriority) -> bool {
        match self.try_load_archive(name, priority) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!("Failed to load archive '{}': {}", name, err);
                false
            }
        }
    }

    /// Mount an already-opened archive under `name`.
    ///
    /// Returns `false` if an archive of that name is already mounted.
    pub fn mount_archive(&self, name: &str, archive: Archive, priority: ArchivePriority) -> bool {
        self.mount(fold_name(name), archive, priority)
    }

    fn mount(&self, key: String, archive: Archive, priority: ArchivePriority) -> bool {
        let label = archive.label().to_string();
        let entries = archive.len();
        if !self.mounts.write().insert(key.clone(), Arc::new(archive), priority) {
            tracing::debug!("Archive '{}' already loaded", key);
            return false;
        }

        tracing::info!(
            "Mounted archive '{}' from {} ({} entries, {} priority)",
            key,
            label,
            entries,
            priority
        );
        self.events.lock().push(AssetEvent::ArchiveMounted {
            name: key,
            priority: priority.get(),
        });
        true
    }

    /// Unmount an archive. Cached assets built from it stay cached.
    pub fn unload_archive(&self, name: &str) -> bool {
        let key = fold_name(name);
        let removed = self.mounts.write().remove(&key);
        if removed.is_none() {
            return false;
        }

        tracing::info!("Unmounted archive '{}'", key);
        self.events.lock().push(AssetEvent::ArchiveUnmounted { name: key });
        true
    }

    /// Check whether an archive of this name is mounted.
    pub fn is_archive_loaded(&self, name: &str) -> bool {
        self.mounts.read().contains(&fold_name(name))
    }

    /// Mounted archive names, upper-cased, in mount order.
    pub fn archive_names(&self) -> Vec<String> {
        self.mounts.read().names()
    }

    /// The highest priority tier ever mounted.
    pub fn max_priority(&self) -> ArchivePriority {
        self.mounts.read().max_priority()
    }

    // --- Resolution ---

    /// Fetch the bytes for `name` from loose files or the mounted archives.
    ///
    /// A loose file that cannot be read is skipped in favour of the next
    /// source. Its [`AssetError::IoError`] is returned only when no later
    /// source has the name.
    pub fn resolve_bytes(&self, name: &str) -> AssetResult<Vec<u8>> {
        let loose: Vec<PathBuf> = self.search_paths.read().candidates(name).collect();
        let mut unreadable = None;
        for path in loose {
            match read_file(&path) {
                Ok(bytes) => {
                    tracing::trace!("Resolved '{}' to loose file {}", name, path.display());
                    return Ok(bytes);
                }
                Err(err) => {
                    tracing::warn!("Skipping loose file {}: {}", path.display(), err);
                    if matches!(err, AssetError::IoError { .. }) && unreadable.is_none() {
                        unreadable = Some(err);
                    }
                }
            }
        }

        let located = self.mounts.read().locate(name)?;
        match located {
            Some(hit) => {
                tracing::trace!("Resolved '{}' in archive '{}'", name, hit.archive_name);
                hit.archive.extract(&hit.entry)
            }
            None => Err(unreadable.unwrap_or_else(|| AssetError::NotFound {
                path: name.to_string(),
            })),
        }
    }

    /// Check whether `name` resolves, without reading it.
    pub fn exists(&self, name: &str) -> bool {
        if self.search_paths.read().find(name).is_some() {
            return true;
        }
        matches!(self.mounts.read().locate(name), Ok(Some(_)))
    }

    /// The cache key `name` maps to for `(T, cache_id)`.
    pub fn canonical_name<T: Asset>(&self, name: &str, cache_id: &str) -> String {
        let loaders = self.loaders.read();
        canonicalize(name, loaders.extension::<T>(cache_id))
    }

    // --- Loaders ---

    /// Register a loader for `(L::Asset, cache_id)`, along with its default extension.
    pub fn register_loader<L: AssetLoader>(&self, cache_id: &str, loader: L) {
        self.loaders.write().register(cache_id, loader);
    }

    /// Register the extension appended to extensionless names of `(T, cache_id)`.
    pub fn register_extension<T: Asset>(&self, cache_id: &str, extension: &str) {
        self.loaders.write().register_extension::<T>(cache_id, extension);
    }

    /// Check if [`load`](Self::load) can build `T` for `cache_id`.
    pub fn has_loader<T: Asset>(&self, cache_id: &str) -> bool {
        self.loaders.read().has_loader::<T>(cache_id)
    }

    // --- Loading ---

    /// Load `name`, building it with `construct` on a cache miss.
    ///
    /// Returns `None` on failure; see [`try_load_with`](Self::try_load_with).
    pub fn load_with<T: Asset>(
        &self,
        name: &str,
        scope: AssetScope,
        cache_id: &str,
        construct: impl FnOnce(LoadContext<'_>) -> AssetResult<T>,
    ) -> Option<Handle<T>> {
        self.try_load_with(name, scope, cache_id, construct).ok()
    }

    /// Load `name`, building it with `construct` on a cache miss.
    ///
    /// A cached `Scene` asset requested at `Global` is promoted in place.
    /// `Manual` loads bypass the cache entirely.
    pub fn try_load_with<T: Asset>(
        &self,
        name: &str,
        scope: AssetScope,
        cache_id: &str,
        construct: impl FnOnce(LoadContext<'_>) -> AssetResult<T>,
    ) -> AssetResult<Handle<T>> {
        let canonical = self.canonical_name::<T>(name, cache_id);
        let partition = scope.is_cached().then(|| self.caches.partition::<T>(cache_id));

        if let Some(partition) = &partition
            && let Some((handle, promoted)) = partition.get_promoted(&canonical, scope)
        {
            if promoted {
                self.promoted::<T>(&canonical, cache_id);
            }
            return Ok(handle);
        }

        let bytes = self
            .resolve_bytes(&canonical)
            .map_err(|err| self.failed::<T>(&canonical, err))?;
        let value = construct(LoadContext::new(&canonical, scope, &bytes, cache_id))
            .map_err(|err| self.failed::<T>(&canonical, err))?;
        let handle = Handle::new(canonical.clone(), scope, value);

        let Some(partition) = partition else {
            tracing::debug!("Loaded {} '{}' (manual)", T::type_name(), canonical);
            return Ok(handle);
        };

        let (stored, outcome) = partition.set_tracked(canonical.clone(), handle);
        match outcome {
            SetOutcome::Inserted => {
                tracing::debug!("Loaded {} '{}' ({})", T::type_name(), canonical, scope);
                self.events.lock().push(AssetEvent::Created {
                    name: canonical,
                    type_id: TypeId::of::<T>(),
                    cache_id: cache_id.to_string(),
                    scope,
                });
            }
            SetOutcome::Existing { promoted } => {
                tracing::debug!(
                    "{} '{}' was cached by a concurrent load, keeping that instance",
                    T::type_name(),
                    canonical
                );
                if promoted {
                    self.promoted::<T>(&canonical, cache_id);
                }
            }
        }
        Ok(stored)
    }

    /// Load `name` with the loader registered for `(T, cache_id)`.
    ///
    /// Returns `None` on failure; see [`try_load`](Self::try_load).
    pub fn load<T: Asset>(&self, name: &str, scope: AssetScope, cache_id: &str) -> Option<Handle<T>> {
        self.try_load(name, scope, cache_id).ok()
    }

    /// Load `name` with the loader registered for `(T, cache_id)`.
    ///
    /// Named caches without their own loader use the default cache's loader.
    pub fn try_load<T: Asset>(&self, name: &str, scope: AssetScope, cache_id: &str) -> AssetResult<Handle<T>> {
        let loader = self.loaders.read().loader::<T>(cache_id);
        let Some(loader) = loader else {
            let canonical = self.canonical_name::<T>(name, cache_id);
            if scope.is_cached()
                && let Some(partition) = self.caches.existing::<T>(cache_id)
                && let Some((cached, promoted)) = partition.get_promoted(&canonical, scope)
            {
                if promoted {
                    self.promoted::<T>(&canonical, cache_id);
                }
                return Ok(cached);
            }
            return Err(self.failed::<T>(
                &canonical,
                AssetError::NoLoader {
                    type_name: T::type_name(),
                    cache_id: cache_id.to_string(),
                },
            ));
        };

        self.try_load_with(name, scope, cache_id, |ctx| construct_with(loader.as_ref(), ctx))
    }

    /// Peek at the cache without loading.
    pub fn get<T: Asset>(&self, name: &str, cache_id: &str) -> Option<Handle<T>> {
        let canonical = self.canonical_name::<T>(name, cache_id);
        self.caches.existing::<T>(cache_id)?.get(&canonical)
    }

    /// Drop cached assets for `scope` across every type and cache id.
    ///
    /// `Global` clears everything; `Scene` removes only scene-scoped assets.
    /// Returns the number of cache entries removed.
    pub fn unload_assets(&self, scope: AssetScope) -> usize {
        let count = self.caches.unload(scope);
        tracing::debug!("Unloaded {} {} asset(s)", count, scope);
        self.events.lock().push(AssetEvent::Unloaded { scope, count });
        count
    }

    /// The cache registry backing this manager.
    pub fn caches(&self) -> &CacheRegistry {
        &self.caches
    }

    /// Drain buffered events.
    pub fn drain_events(&self) -> Vec<AssetEvent> {
        self.events.lock().drain().collect()
    }

    fn promoted<T: Asset>(&self, name: &str, cache_id: &str) {
        tracing::debug!("Promoted {} '{}' to global", T::type_name(), name);
        self.events.lock().push(AssetEvent::Promoted {
            name: name.to_string(),
            type_id: TypeId::of::<T>(),
            cache_id: cache_id.to_string(),
        });
    }

    fn failed<T: Asset>(&self, name: &str, err: AssetError) -> AssetError {
        match &err {
            AssetError::NotFound { .. } => {
                tracing::debug!("{} '{}' not found", T::type_name(), name);
            }
            AssetError::UnresolvedPointer { .. } => {
                tracing::error!("Failed to load {} '{}': {}", T::type_name(), name, err);
            }
            _ => {
                tracing::warn!("Failed to load {} '{}': {}", T::type_name(), name, err);
            }
        }
        self.events.lock().push(AssetEvent::LoadFailed {
            name: name.to_string(),
            type_id: TypeId::of::<T>(),
            error: err.to_string(),
        });
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    use cairn_test_utils::{ArchiveBuilder, TestTree};

    use crate::loader::TextLoader;

    #[derive(Debug)]
    struct Texture(usize);

    impl Asset for Texture {
        fn type_name() -> &'static str {
            "Texture"
        }
    }

    fn mem_archive(builder: ArchiveBuilder) -> Archive {
        Archive::from_reader("mem", Cursor::new(builder.build())).unwrap()
    }

    #[test]
    fn test_canonicalize() {
        assert_eq!(canonicalize("foo", Some("txt")), "FOO.TXT");
        assert_eq!(canonicalize("foo.txt", Some("bin")), "FOO.TXT");
        assert_eq!(canonicalize("foo", None), "FOO");
        assert_eq!(canonicalize("maps/e1m1", Some("MAP")), "MAPS/E1M1.MAP");
        assert_eq!(canonicalize("a.b", Some("TXT")), "A.B.TXT");

        let once = canonicalize("Textures/grass", Some("png"));
        assert_eq!(canonicalize(&once, Some("png")), once);
    }

    #[test]
    fn test_canonical_name_uses_registered_extension() {
        let manager = AssetManager::new();
        manager.register_extension::<Texture>("", "png");
        manager.register_extension::<Texture>("ui", "tga");

        assert_eq!(manager.canonical_name::<Texture>("grass", ""), "GRASS.PNG");
        assert_eq!(manager.canonical_name::<Texture>("grass", "ui"), "GRASS.TGA");
        assert_eq!(manager.canonical_name::<Texture>("grass", "lod"), "GRASS.PNG");
        assert_eq!(manager.canonical_name::<String>("grass", ""), "GRASS");
    }

    #[test]
    fn test_mount_and_unmount_events() {
        let manager = AssetManager::with_search_paths(Vec::<PathBuf>::new());
        assert!(manager.mount_archive("core.arc", mem_archive(ArchiveBuilder::new()), ArchivePriority::LOW));
        assert!(!manager.mount_archive("CORE.ARC", mem_archive(ArchiveBuilder::new()), ArchivePriority::HIGH));
        assert!(manager.is_archive_loaded("Core.Arc"));
        assert!(manager.unload_archive("core.arc"));
        assert!(!manager.unload_archive("core.arc"));

        let events = manager.drain_events();
        assert_eq!(
            events,
            vec![
                AssetEvent::ArchiveMounted {
                    name: "CORE.ARC".into(),
                    priority: 0
                },
                AssetEvent::ArchiveUnmounted {
                    name: "CORE.ARC".into()
                },
            ]
        );
    }

    #[test]
    fn test_load_archive_from_search_path() {
        let tree = TestTree::new();
        tree.archive("core.arc", ArchiveBuilder::new().file("hello.txt", b"a"));
        tree.file("broken.arc", b"not an archive");

        let manager = AssetManager::with_search_paths([tree.path()]);
        assert!(manager.load_archive("CORE.ARC", ArchivePriority::LOW));
        assert!(manager.load_archive("core.arc", ArchivePriority::LOW));
        assert!(!manager.load_archive("missing.arc", ArchivePriority::LOW));
        assert!(!manager.load_archive("broken.arc", ArchivePriority::LOW));

        assert_eq!(manager.archive_names(), vec!["CORE.ARC".to_string()]);
        assert_eq!(manager.resolve_bytes("HELLO.TXT").unwrap(), b"a");
    }

    #[test]
    fn test_manual_loads_bypass_cache() {
        let manager = AssetManager::with_search_paths(Vec::<PathBuf>::new());
        manager.mount_archive("core.arc", mem_archive(ArchiveBuilder::new().file("a.tex", b"1234")), ArchivePriority::LOW);

        let build = |ctx: LoadContext<'_>| Ok::<_, AssetError>(Texture(ctx.bytes.len()));
        let a = manager.load_with("a.tex", AssetScope::Manual, "", build).unwrap();
        let b = manager.load_with("a.tex", AssetScope::Manual, "", build).unwrap();

        assert!(!a.ptr_eq(&b));
        assert_eq!(a.0, 4);
        assert!(manager.get::<Texture>("a.tex", "").is_none());
        assert_eq!(manager.caches().cached_count(), 0);
    }

    #[test]
    fn test_load_without_loader() {
        let manager = AssetManager::with_search_paths(Vec::<PathBuf>::new());
        manager.mount_archive("core.arc", mem_archive(ArchiveBuilder::new().file("a.tex", b"x")), ArchivePriority::LOW);

        let err = manager.try_load::<Texture>("a.tex", AssetScope::Global, "").unwrap_err();
        assert!(matches!(err, AssetError::NoLoader { type_name: "Texture", .. }));

        // Already cached instances are still served.
        let built = manager
            .load_with("a.tex", AssetScope::Global, "", |_| Ok(Texture(1)))
            .unwrap();
        let again = manager.load::<Texture>("a.tex", AssetScope::Global, "").unwrap();
        assert!(built.ptr_eq(&again));
    }

    #[test]
    fn test_failed_construction_is_not_cached() {
        let manager = AssetManager::with_search_paths(Vec::<PathBuf>::new());
        manager.register_loader("", TextLoader);
        manager.mount_archive("core.arc", mem_archive(ArchiveBuilder::new().file("bad.txt", &[0xff])), ArchivePriority::LOW);

        let err = manager.try_load::<String>("bad", AssetScope::Global, "").unwrap_err();
        assert!(matches!(err, AssetError::LoaderError { .. }));
        assert!(manager.get::<String>("bad", "").is_none());
        assert!(manager.drain_events().iter().any(|e| e.is_failed() && e.name() == Some("BAD.TXT")));
    }
}
