//! Asset handles - shared references to loaded assets.
//!
//! A [`Handle`] owns the constructed value together with its canonical name
//! and its current [`AssetScope`]. The cache keeps one clone per cached asset;
//! a scope sweep drops that clone, and the value is destroyed once the last
//! outside clone goes away as well.

use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, Weak};

use crate::Asset;
use crate::scope::{AssetScope, ScopeCell};

struct HandleInner<T> {
    name: String,
    scope: ScopeCell,
    value: T,
}

/// A shared, reference-counted handle to a loaded asset.
///
/// # Example
///
/// ```ignore
/// let text = manager.load::<Text>("hello", AssetScope::Global, "").unwrap();
/// assert_eq!(text.name(), "HELLO.TXT");
/// println!("{}", text.content);
/// ```
pub struct Handle<T: Asset> {
    inner: Arc<HandleInner<T>>,
}

impl<T: Asset> Handle<T> {
    pub(crate) fn new(name: String, scope: AssetScope, value: T) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                name,
                scope: ScopeCell::new(scope),
                value,
            }),
        }
    }

    /// The canonical name the asset was loaded under.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The asset's current scope.
    pub fn scope(&self) -> AssetScope {
        self.inner.scope.get()
    }

    /// Widen a `Scene` asset to `Global`. Returns `true` if the scope changed.
    pub(crate) fn promote(&self, requested: AssetScope) -> bool {
        self.inner.scope.promote(requested)
    }

    /// Borrow the constructed value.
    pub fn get(&self) -> &T {
        &self.inner.value
    }

    /// Whether both handles refer to the same loaded instance.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Number of live handles to this instance, including the cache's own.
    pub fn strong_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Create a weak handle that does not keep the asset alive.
    pub fn downgrade(&self) -> WeakHandle<T> {
        WeakHandle {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Get the type name of the asset.
    pub fn type_name(&self) -> &'static str {
        T::type_name()
    }
}

impl<T: Asset> Clone for Handle<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Asset> Deref for Handle<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner.value
    }
}

impl<T: Asset> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("type", &T::type_name())
            .field("name", &self.inner.name)
            .field("scope", &self.scope())
            .finish()
    }
}

/// A weak handle that doesn't keep the asset alive.
pub struct WeakHandle<T: Asset> {
    inner: Weak<HandleInner<T>>,
}

impl<T: Asset> WeakHandle<T> {
    /// Try to upgrade to a strong handle.
    ///
    /// Returns `None` once the cache and every caller have dropped their handles.
    pub fn upgrade(&self) -> Option<Handle<T>> {
        self.inner.upgrade().map(|inner| Handle { inner })
    }

    /// Check if the asset is still alive.
    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }
}

impl<T: Asset> Clone for WeakHandle<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct TestAsset(u32);

    impl Asset for TestAsset {
        fn type_name() -> &'static str {
            "TestAsset"
        }
    }

    #[test]
    fn test_handle_identity() {
        let a = Handle::new("A.BIN".to_string(), AssetScope::Global, TestAsset(1));
        let b = a.clone();
        let c = Handle::new("A.BIN".to_string(), AssetScope::Global, TestAsset(1));

        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&c));
        assert_eq!(a.strong_count(), 2);
        assert_eq!(b.0, 1);
        assert_eq!(a.name(), "A.BIN");
    }

    #[test]
    fn test_promotion_visible_through_clones() {
        let a = Handle::new("A.BIN".to_string(), AssetScope::Scene, TestAsset(1));
        let b = a.clone();

        assert!(a.promote(AssetScope::Global));
        assert_eq!(b.scope(), AssetScope::Global);
    }

    #[test]
    fn test_weak_handle_lifecycle() {
        let strong = Handle::new("A.BIN".to_string(), AssetScope::Scene, TestAsset(7));
        let weak = strong.downgrade();

        assert!(weak.is_alive());
        let upgraded = weak.upgrade().unwrap();
        assert!(upgraded.ptr_eq(&strong));

        drop(upgraded);
        drop(strong);
        assert!(!weak.is_alive());
        assert!(weak.upgrade().is_none());
    }
}
