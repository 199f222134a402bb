//! Typed cache partitions and the registry that owns them.

use std::any::{Any, TypeId};
use std::sync::Arc;

use cairn_core::alloc::HashMap;
use parking_lot::Mutex;

use crate::Asset;
use crate::handle::Handle;
use crate::scope::AssetScope;

/// What [`CachePartition::set`] did with the offered handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SetOutcome {
    /// The handle was stored.
    Inserted,
    /// Another handle was already cached under the name and was kept.
    Existing {
        /// Whether the kept handle was widened to the offered scope.
        promoted: bool,
    },
}

/// Name to handle map for one asset type and one cache id.
///
/// Each partition has its own lock, held only for the map operation itself.
pub struct CachePartition<T: Asset> {
    id: String,
    entries: Mutex<HashMap<String, Handle<T>>>,
}

impl<T: Asset> CachePartition<T> {
    /// Create an empty partition.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// The cache id. Empty for the default partition.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Look up a cached handle.
    pub fn get(&self, name: &str) -> Option<Handle<T>> {
        self.entries.lock().get(name).cloned()
    }

    /// Look up a cached handle and widen it to `requested` in one step.
    ///
    /// Runs under the partition lock, so a concurrent sweep either removes
    /// the entry first or sees it already promoted. The flag is `true` if
    /// this call did the promotion.
    pub(crate) fn get_promoted(&self, name: &str, requested: AssetScope) -> Option<(Handle<T>, bool)> {
        let entries = self.entries.lock();
        let handle = entries.get(name)?.clone();
        let promoted = handle.promote(requested);
        Some((handle, promoted))
    }

    /// Store `handle` under `name` unless something is already cached there.
    ///
    /// Returns the handle that ends up cached. When an earlier handle wins, it
    /// is widened to `handle`'s scope if that is wider.
    pub fn set(&self, name: impl Into<String>, handle: Handle<T>) -> Handle<T> {
        self.set_tracked(name.into(), handle).0
    }

    pub(crate) fn set_tracked(&self, name: String, handle: Handle<T>) -> (Handle<T>, SetOutcome) {
        let mut entries = self.entries.lock();
        if let Some(existing) = entries.get(&name) {
            let promoted = existing.promote(handle.scope());
            return (existing.clone(), SetOutcome::Existing { promoted });
        }
        entries.insert(name, handle.clone());
        (handle, SetOutcome::Inserted)
    }

    /// Remove entries affected by a sweep of `scope`.
    ///
    /// `Global` clears the partition. `Scene` removes only scene-scoped
    /// entries. Returns the number removed.
    pub fn unload(&self, scope: AssetScope) -> usize {
        let removed: Vec<Handle<T>> = {
            let mut entries = self.entries.lock();
            match scope {
                AssetScope::Global => entries.drain().map(|(_, handle)| handle).collect(),
                AssetScope::Scene => {
                    let names: Vec<String> = entries
                        .iter()
                        .filter(|(_, handle)| handle.scope() == AssetScope::Scene)
                        .map(|(name, _)| name.clone())
                        .collect();
                    names
                        .iter()
                        .filter_map(|name| entries.remove(name))
                        .collect()
                }
                AssetScope::Manual => Vec::new(),
            }
        };

        if !removed.is_empty() {
            tracing::trace!(
                "Swept {} {} asset(s) from {} cache '{}'",
                removed.len(),
                scope,
                T::type_name(),
                self.id
            );
        }
        // Handles drop here, outside the lock.
        removed.len()
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Check if the partition is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Check whether `name` is cached.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.lock().contains_key(name)
    }

    /// Snapshot of the cached names, in no particular order.
    pub fn names(&self) -> Vec<String> {
        self.entries.lock().keys().cloned().collect()
    }
}

/// Type-erased partition for heterogeneous storage in the registry.
pub trait ErasedPartition: Send + Sync {
    /// The partition's cache id.
    fn id(&self) -> &str;

    /// Human-readable name of the cached asset type.
    fn asset_type_name(&self) -> &'static str;

    /// Sweep entries for `scope`. See [`CachePartition::unload`].
    fn unload(&self, scope: AssetScope) -> usize;

    /// Number of cached entries.
    fn len(&self) -> usize;

    /// Check if the partition is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get as Any for downcasting.
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Asset> ErasedPartition for CachePartition<T> {
    fn id(&self) -> &str {
        &self.id
    }

    fn asset_type_name(&self) -> &'static str {
        T::type_name()
    }

    fn unload(&self, scope: AssetScope) -> usize {
        CachePartition::unload(self, scope)
    }

    fn len(&self) -> usize {
        CachePartition::len(self)
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

type Partitions = HashMap<String, Arc<dyn ErasedPartition>>;

/// Directory of every cache partition, keyed by asset type then cache id.
///
/// The registry lock is held only to look up or create a partition and to
/// collect partitions for a sweep.
#[derive(Default)]
pub struct CacheRegistry {
    kinds: Mutex<HashMap<TypeId, Partitions>>,
}

impl CacheRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the partition for `(T, cache_id)`.
    ///
    /// The first request for a type also creates its default partition.
    pub fn partition<T: Asset>(&self, cache_id: &str) -> Arc<CachePartition<T>> {
        let erased = {
            let mut kinds = self.kinds.lock();
            let partitions = kinds.entry(TypeId::of::<T>()).or_insert_with(|| {
                let mut partitions = Partitions::default();
                partitions.insert(
                    String::new(),
                    Arc::new(CachePartition::<T>::new("")) as Arc<dyn ErasedPartition>,
                );
                partitions
            });
            Arc::clone(partitions.entry(cache_id.to_string()).or_insert_with(|| {
                tracing::debug!(
                    "Creating {} cache partition '{}'",
                    T::type_name(),
                    cache_id
                );
                Arc::new(CachePartition::<T>::new(cache_id)) as Arc<dyn ErasedPartition>
            }))
        };

        downcast(erased)
    }

    /// Get the partition for `(T, cache_id)` without creating it.
    pub fn existing<T: Asset>(&self, cache_id: &str) -> Option<Arc<CachePartition<T>>> {
        let erased = {
            let kinds = self.kinds.lock();
            Arc::clone(kinds.get(&TypeId::of::<T>())?.get(cache_id)?)
        };
        Some(downcast(erased))
    }

    /// Sweep every partition of every type. Returns the number of entries removed.
    pub fn unload(&self, scope: AssetScope) -> usize {
        let partitions: Vec<Arc<dyn ErasedPartition>> = self
            .kinds
            .lock()
            .values()
            .flat_map(|partitions| partitions.values().cloned())
            .collect();

        partitions.iter().map(|p| p.unload(scope)).sum()
    }

    /// Number of partitions across all types.
    pub fn partition_count(&self) -> usize {
        self.kinds.lock().values().map(|p| p.len()).sum()
    }

    /// Number of cached entries across all partitions.
    pub fn cached_count(&self) -> usize {
        let partitions: Vec<Arc<dyn ErasedPartition>> = self
            .kinds
            .lock()
            .values()
            .flat_map(|partitions| partitions.values().cloned())
            .collect();

        partitions.iter().map(|p| p.len()).sum()
    }
}

fn downcast<T: Asset>(erased: Arc<dyn ErasedPartition>) -> Arc<CachePartition<T>> {
    // Partitions are only ever inserted under their own TypeId.
    erased
        .into_any()
        .downcast::<CachePartition<T>>()
        .expect("type mismatch in cache registry")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Mesh(u32);

    impl Asset for Mesh {
        fn type_name() -> &'static str {
            "Mesh"
        }
    }

    fn handle(name: &str, scope: AssetScope, value: u32) -> Handle<Mesh> {
        Handle::new(name.to_string(), scope, Mesh(value))
    }

    #[test]
    fn test_set_is_insert_if_absent() {
        let partition = CachePartition::<Mesh>::new("");
        let first = partition.set("A.MSH", handle("A.MSH", AssetScope::Global, 1));
        let second = partition.set("A.MSH", handle("A.MSH", AssetScope::Global, 2));

        assert!(first.ptr_eq(&second));
        assert_eq!(second.0, 1);
        assert_eq!(partition.len(), 1);
    }

    #[test]
    fn test_set_widens_existing_scope() {
        let partition = CachePartition::<Mesh>::new("");
        let scene = partition.set("A.MSH", handle("A.MSH", AssetScope::Scene, 1));

        let (kept, outcome) =
            partition.set_tracked("A.MSH".into(), handle("A.MSH", AssetScope::Global, 2));
        assert!(kept.ptr_eq(&scene));
        assert_eq!(outcome, SetOutcome::Existing { promoted: true });
        assert_eq!(scene.scope(), AssetScope::Global);
    }

    #[test]
    fn test_get_promoted() {
        let partition = CachePartition::<Mesh>::new("");
        partition.set("A.MSH", handle("A.MSH", AssetScope::Scene, 1));

        let (same, promoted) = partition.get_promoted("A.MSH", AssetScope::Scene).unwrap();
        assert!(!promoted);
        assert_eq!(same.scope(), AssetScope::Scene);

        let (widened, promoted) = partition.get_promoted("A.MSH", AssetScope::Global).unwrap();
        assert!(promoted);
        assert!(widened.ptr_eq(&same));
        assert!(partition.get_promoted("B.MSH", AssetScope::Global).is_none());

        assert_eq!(partition.unload(AssetScope::Scene), 0);
        assert!(partition.contains("A.MSH"));
    }

    #[test]
    fn test_promoted_handle_outlives_racing_sweep() {
        let partition = Arc::new(CachePartition::<Mesh>::new(""));

        for i in 0..200 {
            partition.unload(AssetScope::Global);
            partition.set("A.MSH", handle("A.MSH", AssetScope::Scene, i));

            let sweeper = {
                let partition = Arc::clone(&partition);
                std::thread::spawn(move || partition.unload(AssetScope::Scene))
            };
            let hit = partition.get_promoted("A.MSH", AssetScope::Global);
            sweeper.join().unwrap();

            // A handle handed out as global must still be the cached one.
            if let Some((handle, _)) = hit {
                assert_eq!(handle.scope(), AssetScope::Global);
                assert!(partition.get("A.MSH").is_some_and(|cached| cached.ptr_eq(&handle)));
            }
        }
    }

    #[test]
    fn test_scene_sweep_is_selective() {
        let partition = CachePartition::<Mesh>::new("");
        partition.set("G.MSH", handle("G.MSH", AssetScope::Global, 1));
        partition.set("S1.MSH", handle("S1.MSH", AssetScope::Scene, 2));
        partition.set("S2.MSH", handle("S2.MSH", AssetScope::Scene, 3));

        assert_eq!(partition.unload(AssetScope::Scene), 2);
        assert_eq!(partition.names(), vec!["G.MSH".to_string()]);

        assert_eq!(partition.unload(AssetScope::Global), 1);
        assert!(partition.is_empty());
    }

    #[test]
    fn test_swept_handles_outlive_cache() {
        let partition = CachePartition::<Mesh>::new("");
        let held = partition.set("A.MSH", handle("A.MSH", AssetScope::Scene, 9));
        let weak = held.downgrade();

        partition.unload(AssetScope::Scene);
        assert!(!partition.contains("A.MSH"));
        assert_eq!(held.0, 9);

        drop(held);
        assert!(!weak.is_alive());
    }

    #[test]
    fn test_registry_creates_default_partition() {
        let registry = CacheRegistry::new();
        assert!(registry.existing::<Mesh>("").is_none());

        let lod = registry.partition::<Mesh>("lod1");
        assert_eq!(lod.id(), "lod1");
        assert_eq!(registry.partition_count(), 2);
        assert!(registry.existing::<Mesh>("").is_some());

        let again = registry.partition::<Mesh>("lod1");
        assert!(Arc::ptr_eq(&lod, &again));
    }

    #[test]
    fn test_registry_keeps_types_apart() {
        let registry = CacheRegistry::new();
        registry
            .partition::<Mesh>("")
            .set("A", handle("A", AssetScope::Global, 1));
        registry
            .partition::<String>("")
            .set("A", Handle::new("A".into(), AssetScope::Scene, "text".to_string()));

        assert_eq!(registry.cached_count(), 2);
        assert_eq!(registry.unload(AssetScope::Scene), 1);
        assert!(registry.partition::<Mesh>("").contains("A"));
        assert_eq!(registry.unload(AssetScope::Global), 1);
        assert_eq!(registry.cached_count(), 0);
    }
}
