use std::time::Duration;

use thiserror::Error;

use crate::config::RequeueConfig;
use crate::gateway::GatewayError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("{operation} failed: {source}")]
    Gateway {
        operation: &'static str,
        #[source]
        source: GatewayError,
    },

    /// Describe must match exactly one EIP for an allocation ID.
    #[error("describe returned {count} EIPs for allocation ID {allocation_id}, expected exactly one")]
    Inconsistent { allocation_id: String, count: usize },
}

impl ReconcileError {
    pub fn gateway(operation: &'static str, source: GatewayError) -> Self {
        ReconcileError::Gateway { operation, source }
    }

    /// Requeue tier for a failed cycle.
    pub fn requeue_after(&self, requeue: &RequeueConfig) -> Duration {
        match self {
            ReconcileError::Gateway { source, .. } if source.is_throttled() => requeue.throttled(),
            ReconcileError::Inconsistent { .. } => requeue.steady(),
            _ => requeue.short(),
        }
    }
}
