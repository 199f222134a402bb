//! Asset lifetime scopes.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifetime policy attached to a loaded asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetScope {
    /// Cached until an explicit global unload.
    Global,
    /// Cached until the active scene changes.
    Scene,
    /// Never cached; the caller owns the returned handle outright.
    Manual,
}

impl AssetScope {
    /// Whether assets loaded at this scope go into the cache.
    pub fn is_cached(self) -> bool {
        !matches!(self, AssetScope::Manual)
    }

    /// Whether an asset currently at `self` should be promoted when requested at `requested`.
    ///
    /// Only `Scene -> Global` widens. Nothing narrows.
    pub fn should_promote_to(self, requested: AssetScope) -> bool {
        self == AssetScope::Scene && requested == AssetScope::Global
    }

    fn to_bits(self) -> u8 {
        match self {
            AssetScope::Global => 0,
            AssetScope::Scene => 1,
            AssetScope::Manual => 2,
        }
    }

    fn from_bits(bits: u8) -> Self {
        match bits {
            0 => AssetScope::Global,
            1 => AssetScope::Scene,
            _ => AssetScope::Manual,
        }
    }
}

impl fmt::Display for AssetScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AssetScope::Global => "global",
            AssetScope::Scene => "scene",
            AssetScope::Manual => "manual",
        };
        f.write_str(name)
    }
}

/// Atomically updatable scope stored on a loaded asset.
#[derive(Debug)]
pub(crate) struct ScopeCell(AtomicU8);

impl ScopeCell {
    pub(crate) fn new(scope: AssetScope) -> Self {
        Self(AtomicU8::new(scope.to_bits()))
    }

    pub(crate) fn get(&self) -> AssetScope {
        AssetScope::from_bits(self.0.load(Ordering::Acquire))
    }

    /// Widen `Scene` to `Global` if `requested` asks for it.
    ///
    /// Returns `true` if this call performed the promotion.
    pub(crate) fn promote(&self, requested: AssetScope) -> bool {
        let current = self.get();
        if !current.should_promote_to(requested) {
            return false;
        }
        self.0
            .compare_exchange(
                current.to_bits(),
                requested.to_bits(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}
