//! Persisted EIP objects.
//!
//! The store holds the declared spec and the reconciler-owned status of every
//! EIP, and notifies subscribers on change. Writes are guarded by the
//! object's `resource_version`: a write carrying a stale version fails with
//! [`StoreError::VersionMismatch`] and must be retried on a fresh read.

pub mod error;
pub mod event;
pub mod memory;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::resource::Eip;

pub use error::{Result, StoreError};
pub use event::StoreEvent;
pub use memory::InMemoryStore;

/// Store trait for EIP objects.
#[async_trait]
pub trait EipStore: Send + Sync {
    /// Get an object by name.
    async fn get(&self, name: &str) -> Result<Option<Eip>>;

    /// List all objects.
    async fn list(&self) -> Result<Vec<Eip>>;

    /// Create a new object. The spec is validated first.
    async fn create(&self, eip: Eip) -> Result<Eip>;

    /// Write metadata (finalizers) and spec. Status is ignored.
    ///
    /// Returns `None` when the write removed the last finalizer of an object
    /// marked for deletion, which purges it.
    async fn update(&self, eip: &Eip) -> Result<Option<Eip>>;

    /// Write status only.
    async fn update_status(&self, eip: &Eip) -> Result<Eip>;

    /// Request deletion.
    ///
    /// Objects without finalizers are purged right away; otherwise the
    /// deletion marker is set and purging waits for the finalizers.
    async fn delete(&self, name: &str) -> Result<()>;

    /// Subscribe to change events.
    fn subscribe(&self) -> broadcast::Receiver<StoreEvent>;
}
