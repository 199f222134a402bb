//! Asset events for change detection.

use std::any::TypeId;

use crate::scope::AssetScope;

/// Events emitted by the asset system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetEvent {
    /// An asset was constructed and cached.
    Created {
        /// The canonical name.
        name: String,
        /// The type of the asset.
        type_id: TypeId,
        /// The cache id it was stored under.
        cache_id: String,
        /// The scope it was cached at.
        scope: AssetScope,
    },

    /// A cached `Scene` asset was widened to `Global`.
    Promoted {
        /// The canonical name.
        name: String,
        /// The type of the asset.
        type_id: TypeId,
        /// The cache id it is stored under.
        cache_id: String,
    },

    /// A scope sweep removed cached assets.
    Unloaded {
        /// The swept scope.
        scope: AssetScope,
        /// Number of cache entries removed.
        count: usize,
    },

    /// An asset failed to resolve or construct.
    LoadFailed {
        /// The canonical name.
        name: String,
        /// The type of the asset.
        type_id: TypeId,
        /// Error message.
        error: String,
    },

    /// An archive was mounted.
    ArchiveMounted {
        /// The upper-cased archive name.
        name: String,
        /// The priority tier it was mounted at.
        priority: u8,
    },

    /// An archive was unmounted.
    ArchiveUnmounted {
        /// The upper-cased archive name.
        name: String,
    },
}

impl AssetEvent {
    /// Get the type ID of the asset this event relates to, if any.
    pub fn type_id(&self) -> Option<TypeId> {
        match self {
            AssetEvent::Created { type_id, .. }
            | AssetEvent::Promoted { type_id, .. }
            | AssetEvent::LoadFailed { type_id, .. } => Some(*type_id),
            _ => None,
        }
    }

    /// The asset or archive name, if the event concerns a single one.
    pub fn name(&self) -> Option<&str> {
        match self {
            AssetEvent::Created { name, .. }
            | AssetEvent::Promoted { name, .. }
            | AssetEvent::LoadFailed { name, .. }
            | AssetEvent::ArchiveMounted { name, .. }
            | AssetEvent::ArchiveUnmounted { name } => Some(name),
            AssetEvent::Unloaded { .. } => None,
        }
    }

    /// Check if this is a creation event.
    pub fn is_created(&self) -> bool {
        matches!(self, AssetEvent::Created { .. })
    }

    /// Check if this is a promotion event.
    pub fn is_promoted(&self) -> bool {
        matches!(self, AssetEvent::Promoted { .. })
    }

    /// Check if this is a failure event.
    pub fn is_failed(&self) -> bool {
        matches!(self, AssetEvent::LoadFailed { .. })
    }
}

/// A buffer of asset events that can be drained each frame.
#[derive(Debug, Default)]
pub struct AssetEventBuffer {
    events: Vec<AssetEvent>,
}

impl AssetEventBuffer {
    /// Create a new empty event buffer.
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Push an event to the buffer.
    pub fn push(&mut self, event: AssetEvent) {
        self.events.push(event);
    }

    /// Drain all events from the buffer.
    pub fn drain(&mut self) -> impl Iterator<Item = AssetEvent> + '_ {
        self.events.drain(..)
    }

    /// Get an iterator over events without draining.
    pub fn iter(&self) -> impl Iterator<Item = &AssetEvent> {
        self.events.iter()
    }

    /// Check if there are any events.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Get the number of events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Clear all events.
    pub fn clear(&mut self) {
        self.events.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_drain() {
        let mut buffer = AssetEventBuffer::new();
        buffer.push(AssetEvent::ArchiveMounted {
            name: "CORE.ARC".into(),
            priority: 0,
        });
        buffer.push(AssetEvent::Created {
            name: "HELLO.TXT".into(),
            type_id: TypeId::of::<String>(),
            cache_id: String::new(),
            scope: AssetScope::Global,
        });
        assert_eq!(buffer.len(), 2);

        let drained: Vec<_> = buffer.drain().collect();
        assert!(buffer.is_empty());
        assert_eq!(drained[0].name(), Some("CORE.ARC"));
        assert_eq!(drained[0].type_id(), None);
        assert!(drained[1].is_created());
        assert_eq!(drained[1].type_id(), Some(TypeId::of::<String>()));
    }
}
