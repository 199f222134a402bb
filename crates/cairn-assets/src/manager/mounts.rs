//! Mounted archives and archive-side resolution.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::archive::{Archive, ArchiveEntry};
use crate::error::{AssetError, AssetResult};

/// Maximum number of pointer entries followed for one lookup.
pub const MAX_POINTER_HOPS: usize = 8;

/// Search priority tier of a mounted archive. Higher tiers are searched first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ArchivePriority(u8);

impl ArchivePriority {
    /// Base game content.
    pub const LOW: Self = Self(0);
    /// Patches and overrides.
    pub const HIGH: Self = Self(1);

    pub const fn new(tier: u8) -> Self {
        Self(tier)
    }

    pub const fn get(self) -> u8 {
        self.0
    }
}

impl fmt::Display for ArchivePriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::LOW => f.write_str("low"),
            Self::HIGH => f.write_str("high"),
            Self(n) => write!(f, "tier {}", n),
        }
    }
}

struct Mount {
    archive: Arc<Archive>,
    priority: ArchivePriority,
}

/// An archive entry located for a name, with pointers already followed.
pub(crate) struct Located {
    pub(crate) archive_name: String,
    pub(crate) archive: Arc<Archive>,
    pub(crate) entry: ArchiveEntry,
}

/// Archives keyed by upper-cased name, in mount order.
#[derive(Default)]
pub(crate) struct MountTable {
    mounts: IndexMap<String, Mount>,
    max_priority: ArchivePriority,
}

impl MountTable {
    pub(crate) fn contains(&self, key: &str) -> bool {
        self.mounts.contains_key(key)
    }

    /// Register an archive. Returns `false` if `key` is already mounted.
    pub(crate) fn insert(&mut self, key: String, archive: Arc<Archive>, priority: ArchivePriority) -> bool {
        if self.mounts.contains_key(&key) {
            return false;
        }
        self.max_priority = self.max_priority.max(priority);
        self.mounts.insert(key, Mount { archive, priority });
        true
    }

    pub(crate) fn remove(&mut self, key: &str) -> Option<Arc<Archive>> {
        self.mounts.shift_remove(key).map(|mount| mount.archive)
    }

    pub(crate) fn names(&self) -> Vec<String> {
        self.mounts.keys().cloned().collect()
    }

    /// Highest tier ever mounted. Not lowered by unmounting.
    pub(crate) fn max_priority(&self) -> ArchivePriority {
        self.max_priority
    }

    /// Find the archive entry that serves `name`.
    ///
    /// Tiers are scanned from the highest recorded down to zero, and mount
    /// order decides within a tier. `Ok(None)` means no mounted archive lists
    /// the name.
    pub(crate) fn locate(&self, name: &str) -> AssetResult<Option<Located>> {
        for tier in (0..=self.max_priority.get()).rev() {
            let hit = self
                .mounts
                .iter()
                .filter(|(_, mount)| mount.priority.get() == tier)
                .find_map(|(key, mount)| mount.archive.entry(name).map(|entry| (key, mount, entry)));

            if let Some((key, mount, entry)) = hit {
                return self
                    .follow(key, &mount.archive, entry, name)
                    .map(Some);
            }
        }
        Ok(None)
    }

    fn follow(&self, key: &str, archive: &Arc<Archive>, entry: &ArchiveEntry, name: &str) -> AssetResult<Located> {
        let mut current = Located {
            archive_name: key.to_string(),
            archive: Arc::clone(archive),
            entry: entry.clone(),
        };

        for _ in 0..MAX_POINTER_HOPS {
            let Some(target) = current.entry.pointer_target.clone() else {
                return Ok(current);
            };

            let Some(mount) = self.mounts.get(&target) else {
                tracing::error!(
                    "'{}' in archive '{}' points to '{}', which is not loaded",
                    name,
                    current.archive_name,
                    target
                );
                return Err(AssetError::UnresolvedPointer {
                    name: name.to_string(),
                    archive: current.archive_name,
                    target,
                });
            };

            let Some(next) = mount.archive.entry(name) else {
                tracing::error!(
                    "'{}' in archive '{}' points to '{}', which has no such entry",
                    name,
                    current.archive_name,
                    target
                );
                return Err(AssetError::NotFound {
                    path: format!("{}:{}", target, name),
                });
            };

            current = Located {
                entry: next.clone(),
                archive: Arc::clone(&mount.archive),
                archive_name: target,
            };
        }

        match current.entry.pointer_target {
            None => Ok(current),
            Some(target) => {
                tracing::error!(
                    "Pointer chain for '{}' exceeds {} hops at archive '{}'",
                    name,
                    MAX_POINTER_HOPS,
                    current.archive_name
                );
                Err(AssetError::UnresolvedPointer {
                    name: name.to_string(),
                    archive: current.archive_name,
                    target,
                })
            }
        }
    }
}
