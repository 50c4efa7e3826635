//! Events emitted by store changes.

use crate::resource::Eip;

/// Events emitted when stored objects change.
///
/// These events are dispatched via broadcast channels to subscribers.
#[derive(Debug, Clone)]
pub enum StoreEvent {
    /// A new object was created.
    Created(Eip),
    /// An object was updated (metadata, spec or status).
    Updated { name: String, old: Eip, new: Eip },
    /// An object was purged.
    Deleted { name: String },
}

impl StoreEvent {
    /// Get the object name for this event.
    pub fn name(&self) -> &str {
        match self {
            StoreEvent::Created(eip) => eip.name(),
            StoreEvent::Updated { name, .. } => name,
            StoreEvent::Deleted { name } => name,
        }
    }

    /// Whether the change is one the reconciler has to act on.
    ///
    /// Status-only writes (made by the reconciler itself) are ignored;
    /// spec, deletion marker and finalizer changes are not.
    pub fn needs_reconcile(&self) -> bool {
        match self {
            StoreEvent::Created(_) => true,
            StoreEvent::Updated { old, new, .. } => {
                old.metadata.generation != new.metadata.generation
                    || old.metadata.deletion_timestamp != new.metadata.deletion_timestamp
                    || old.metadata.finalizers != new.metadata.finalizers
            }
            StoreEvent::Deleted { .. } => false,
        }
    }
}
