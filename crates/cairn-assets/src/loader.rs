//! Asset loader traits and infrastructure.

use std::any::{Any, TypeId};
use std::sync::Arc;

use cairn_core::alloc::HashMap;

use crate::Asset;
use crate::error::{AssetError, AssetResult};
use crate::scope::AssetScope;

/// Context provided to loaders and construction callbacks.
#[derive(Debug, Clone, Copy)]
pub struct LoadContext<'a> {
    /// The canonical name being loaded.
    pub name: &'a str,
    /// The scope the asset was requested at.
    pub scope: AssetScope,
    /// The resolved, decompressed bytes.
    pub bytes: &'a [u8],
    /// The cache id the load was issued for.
    pub cache_id: &'a str,
}

impl<'a> LoadContext<'a> {
    /// Create a new load context.
    pub fn new(name: &'a str, scope: AssetScope, bytes: &'a [u8], cache_id: &'a str) -> Self {
        Self {
            name,
            scope,
            bytes,
            cache_id,
        }
    }

    /// The extension of the canonical name, without the dot.
    pub fn extension(&self) -> Option<&'a str> {
        self.name.rsplit_once('.').map(|(_, ext)| ext)
    }

    /// Build a [`AssetError::LoaderError`] for this asset.
    pub fn error(&self, message: impl Into<String>) -> AssetError {
        AssetError::LoaderError {
            path: self.name.to_string(),
            message: message.into(),
        }
    }
}

/// Trait for building assets from bytes.
///
/// # Example
///
/// ```ignore
/// struct MeshLoader;
///
/// impl AssetLoader for MeshLoader {
///     type Asset = Mesh;
///
///     fn default_extension(&self) -> Option<&str> {
///         Some("MSH")
///     }
///
///     fn load(&self, ctx: LoadContext<'_>) -> AssetResult<Self::Asset> {
///         Mesh::parse(ctx.bytes).map_err(|e| ctx.error(e.to_string()))
///     }
/// }
/// ```
pub trait AssetLoader: Send + Sync + 'static {
    /// The asset type this loader produces.
    type Asset: Asset;

    /// Extension appended to names given without one (without the dot).
    fn default_extension(&self) -> Option<&str> {
        None
    }

    /// Build the asset.
    fn load(&self, ctx: LoadContext<'_>) -> AssetResult<Self::Asset>;
}

/// Type-erased asset loader for dynamic dispatch.
pub trait ErasedAssetLoader: Send + Sync {
    /// Get a human-readable name for the asset type.
    fn asset_type_name(&self) -> &'static str;

    /// Load an asset and return it as a boxed Any.
    fn load_erased(&self, ctx: LoadContext<'_>) -> AssetResult<Box<dyn Any + Send + Sync>>;
}

impl<L: AssetLoader> ErasedAssetLoader for L {
    fn asset_type_name(&self) -> &'static str {
        <L::Asset as Asset>::type_name()
    }

    fn load_erased(&self, ctx: LoadContext<'_>) -> AssetResult<Box<dyn Any + Send + Sync>> {
        let asset = self.load(ctx)?;
        Ok(Box::new(asset))
    }
}

/// Key for indexing loaders by type and cache id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct LoaderKey {
    type_id: TypeId,
    cache_id: String,
}

impl LoaderKey {
    fn of<T: 'static>(cache_id: &str) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            cache_id: cache_id.to_string(),
        }
    }
}

#[derive(Default, Clone)]
struct LoaderEntry {
    loader: Option<Arc<dyn ErasedAssetLoader>>,
    extension: Option<String>,
}

/// Registry of loaders and default extensions, per asset type and cache id.
///
/// Lookups for a named cache fall back to the type's default (empty id)
/// cache when nothing is registered for the named one.
#[derive(Default)]
pub struct LoaderRegistry {
    entries: HashMap<LoaderKey, LoaderEntry>,
}

impl LoaderRegistry {
    /// Create a new empty loader registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `loader` for `(L::Asset, cache_id)`.
    ///
    /// Replaces any earlier loader. If the loader declares a default
    /// extension it is registered too.
    pub fn register<L: AssetLoader>(&mut self, cache_id: &str, loader: L) {
        let extension = loader.default_extension().map(normalize_extension);
        let entry = self
            .entries
            .entry(LoaderKey::of::<L::Asset>(cache_id))
            .or_default();

        if entry.loader.is_some() {
            tracing::debug!(
                "Replacing {} loader for cache '{}'",
                <L::Asset as Asset>::type_name(),
                cache_id
            );
        }
        entry.loader = Some(Arc::new(loader));
        if extension.is_some() {
            entry.extension = extension;
        }
    }

    /// Register the default extension for `(T, cache_id)`.
    pub fn register_extension<T: Asset>(&mut self, cache_id: &str, extension: &str) {
        self.entries
            .entry(LoaderKey::of::<T>(cache_id))
            .or_default()
            .extension = Some(normalize_extension(extension));
    }

    fn lookup<T: Asset, R>(&self, cache_id: &str, f: impl Fn(&LoaderEntry) -> Option<R>) -> Option<R> {
        let exact = self.entries.get(&LoaderKey::of::<T>(cache_id)).and_then(&f);
        if exact.is_some() || cache_id.is_empty() {
            return exact;
        }
        self.entries.get(&LoaderKey::of::<T>("")).and_then(f)
    }

    /// The loader for `(T, cache_id)`, falling back to the default cache.
    pub fn loader<T: Asset>(&self, cache_id: &str) -> Option<Arc<dyn ErasedAssetLoader>> {
        self.lookup::<T, _>(cache_id, |e| e.loader.clone())
    }

    /// The default extension for `(T, cache_id)`, falling back to the default cache.
    pub fn extension<T: Asset>(&self, cache_id: &str) -> Option<&str> {
        let exact = self
            .entries
            .get(&LoaderKey::of::<T>(cache_id))
            .and_then(|e| e.extension.as_deref());
        if exact.is_some() || cache_id.is_empty() {
            return exact;
        }
        self.entries
            .get(&LoaderKey::of::<T>(""))
            .and_then(|e| e.extension.as_deref())
    }

    /// Check if a loader is available for `(T, cache_id)`.
    pub fn has_loader<T: Asset>(&self, cache_id: &str) -> bool {
        self.lookup::<T, _>(cache_id, |e| e.loader.as_ref().map(|_| ()))
            .is_some()
    }
}

/// Run an erased loader and recover the concrete asset.
pub(crate) fn construct_with<T: Asset>(
    loader: &dyn ErasedAssetLoader,
    ctx: LoadContext<'_>,
) -> AssetResult<T> {
    let boxed = loader.load_erased(ctx)?;

    // Looked up by TypeId, so this only fails on a registry bug.
    boxed.downcast::<T>().map(|b| *b).map_err(|_| AssetError::Other {
        message: format!(
            "loader for {} produced {}",
            T::type_name(),
            loader.asset_type_name()
        ),
    })
}

fn normalize_extension(ext: &str) -> String {
    ext.trim_start_matches('.').to_ascii_uppercase()
}

/// A simple text loader that loads UTF-8 strings.
pub struct TextLoader;

impl AssetLoader for TextLoader {
    type Asset = String;

    fn default_extension(&self) -> Option<&str> {
        Some("TXT")
    }

    fn load(&self, ctx: LoadContext<'_>) -> AssetResult<Self::Asset> {
        String::from_utf8(ctx.bytes.to_vec()).map_err(|e| ctx.error(format!("Invalid UTF-8: {}", e)))
    }
}

/// A simple binary loader that loads raw bytes.
pub struct BytesLoader;

impl AssetLoader for BytesLoader {
    type Asset = Vec<u8>;

    fn default_extension(&self) -> Option<&str> {
        Some("BIN")
    }

    fn load(&self, ctx: LoadContext<'_>) -> AssetResult<Self::Asset> {
        Ok(ctx.bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct TestData {
        value: i32,
    }

    impl Asset for TestData {
        fn type_name() -> &'static str {
            "TestData"
        }
    }

    struct FixedLoader(i32);

    impl AssetLoader for FixedLoader {
        type Asset = TestData;

        fn load(&self, _ctx: LoadContext<'_>) -> AssetResult<Self::Asset> {
            Ok(TestData { value: self.0 })
        }
    }

    fn ctx<'a>(name: &'a str, bytes: &'a [u8], cache_id: &'a str) -> LoadContext<'a> {
        LoadContext::new(name, AssetScope::Global, bytes, cache_id)
    }

    fn load(registry: &LoaderRegistry, ctx: LoadContext<'_>) -> AssetResult<TestData> {
        let loader = registry.loader::<TestData>(ctx.cache_id).unwrap();
        construct_with(loader.as_ref(), ctx)
    }

    #[test]
    fn test_text_loader() {
        let result = TextLoader.load(ctx("TEST.TXT", b"Hello, World!", "")).unwrap();
        assert_eq!(result, "Hello, World!");

        let err = TextLoader.load(ctx("BAD.TXT", &[0xff, 0xfe], "")).unwrap_err();
        assert!(matches!(err, AssetError::LoaderError { ref path, .. } if path == "BAD.TXT"));
    }

    #[test]
    fn test_bytes_loader() {
        let result = BytesLoader.load(ctx("TEST.BIN", &[0, 1, 2, 3, 4], "")).unwrap();
        assert_eq!(result, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_context_extension() {
        assert_eq!(ctx("MAPS/LEVEL.DAT", b"", "").extension(), Some("DAT"));
        assert_eq!(ctx("README", b"", "").extension(), None);
    }

    #[test]
    fn test_registry_by_type_and_cache() {
        let mut registry = LoaderRegistry::new();
        registry.register("", TextLoader);
        registry.register("", BytesLoader);

        assert!(registry.has_loader::<String>(""));
        assert!(registry.has_loader::<Vec<u8>>(""));
        assert!(!registry.has_loader::<TestData>(""));

        assert_eq!(registry.extension::<String>(""), Some("TXT"));
        assert_eq!(registry.extension::<Vec<u8>>(""), Some("BIN"));
    }

    #[test]
    fn test_named_cache_falls_back_to_default() {
        let mut registry = LoaderRegistry::new();
        registry.register("", FixedLoader(1));
        registry.register_extension::<TestData>("", ".dat");

        assert!(registry.has_loader::<TestData>("hires"));
        assert_eq!(registry.extension::<TestData>("hires"), Some("DAT"));

        let value: TestData = load(&registry, ctx("A.DAT", b"", "hires")).unwrap();
        assert_eq!(value.value, 1);

        registry.register("hires", FixedLoader(2));
        registry.register_extension::<TestData>("hires", "hdt");
        let value: TestData = load(&registry, ctx("A.HDT", b"", "hires")).unwrap();
        assert_eq!(value.value, 2);
        assert_eq!(registry.extension::<TestData>("hires"), Some("HDT"));
        assert_eq!(registry.extension::<TestData>(""), Some("DAT"));
    }

    #[test]
    fn test_extension_only_entry_has_no_loader() {
        let mut registry = LoaderRegistry::new();
        registry.register_extension::<TestData>("", "dat");

        assert!(!registry.has_loader::<TestData>(""));
        assert!(registry.loader::<TestData>("").is_none());
        assert_eq!(registry.extension::<TestData>(""), Some("DAT"));
    }

    #[test]
    fn test_register_keeps_explicit_extension() {
        let mut registry = LoaderRegistry::new();
        registry.register_extension::<TestData>("", "dat");
        registry.register("", FixedLoader(3));

        assert_eq!(registry.extension::<TestData>(""), Some("DAT"));
    }
}
