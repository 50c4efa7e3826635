//! eip-operator: reconciles declared Elastic IP reservations with the cloud provider.
//!
//! The crate is split along the seams of the control loop:
//! - `resource` / `validation`: the declared object and its admission gate
//! - `store`: persisted desired state + status, with a change watch
//! - `gateway`: the remote EIP API surface
//! - `reconciler`: the per-object convergence engine and finalizer handling
//! - `controller`: work queue and workers driving the engine

pub mod condition;
pub mod config;
pub mod controller;
pub mod events;
pub mod gateway;
pub mod reconciler;
pub mod resource;
pub mod status;
pub mod store;
pub mod validation;

pub use config::{OperatorConfig, RequeueConfig};
pub use controller::Controller;
pub use events::{EventRecorder, EventType};
pub use gateway::{EipGateway, GatewayError, InMemoryGateway};
pub use reconciler::{Action, EipReconciler, ReconcileError, Reconciler};
pub use resource::{Eip, EipSpec, EipStatus, FINALIZER, ObjectMeta, ReleaseStrategy};
pub use store::{EipStore, InMemoryStore, StoreError, StoreEvent};
