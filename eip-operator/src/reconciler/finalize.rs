//! Deletion-time cleanup of the remote EIP.

use tracing::{error, info, warn};

use super::{EipReconciler, ReconcileError, mark};
use crate::condition::{self, ConditionStatus, TYPE_PROGRESSING, TYPE_READY};
use crate::events;
use crate::resource::{Eip, ReleaseStrategy};

impl EipReconciler {
    /// Release the remote EIP if the release strategy asks for it.
    ///
    /// Returning `Ok` allows the finalizer to be removed. Any error keeps the
    /// finalizer in place so the whole step runs again on the next cycle.
    pub(super) async fn finalize(&self, eip: &mut Eip) -> Result<(), ReconcileError> {
        let name = eip.name().to_string();
        mark(
            eip,
            TYPE_PROGRESSING,
            ConditionStatus::True,
            condition::REASON_DELETING,
            "Deleting EIP",
        );
        if let Err(e) = self.write_status(eip).await {
            warn!(%name, error = %e, "Failed to persist deleting status");
        }

        let allocation_id = eip.status.allocation_id.clone();
        if eip.spec.release_strategy != ReleaseStrategy::OnDelete || allocation_id.is_empty() {
            info!(%name, release_strategy = %eip.spec.release_strategy, "Skipping EIP release");
            self.recorder.normal(
                &name,
                events::REASON_SKIPPED,
                format!(
                    "Skipped EIP release (releaseStrategy={})",
                    eip.spec.release_strategy
                ),
            );
            mark(
                eip,
                TYPE_PROGRESSING,
                ConditionStatus::False,
                condition::REASON_DELETED,
                "EIP deleted",
            );
            return Ok(());
        }

        info!(%name, %allocation_id, "Releasing EIP");

        let package_id = eip.status.bandwidth_package_id.clone();
        if !package_id.is_empty() {
            let removed = self
                .call(
                    "RemoveCommonBandwidthPackageIp",
                    self.gateway
                        .remove_from_bandwidth_package(&allocation_id, &package_id),
                )
                .await;
            match removed {
                Ok(()) => {
                    info!(%name, %allocation_id, %package_id, "EIP removed from bandwidth package")
                }
                Err(e) if e.is_not_found() => {}
                // Release is still attempted
                Err(e) => {
                    error!(
                        %name,
                        %allocation_id,
                        %package_id,
                        error = %e,
                        "Failed to remove EIP from bandwidth package"
                    )
                }
            }
        }

        match self
            .call("ReleaseEipAddress", self.gateway.release(&allocation_id))
            .await
        {
            Ok(()) => {
                info!(%name, %allocation_id, "EIP released");
                self.recorder.normal(
                    &name,
                    events::REASON_RELEASED,
                    format!("Released EIP {allocation_id}"),
                );
            }
            Err(e) if e.is_not_found() => {
                info!(%name, %allocation_id, "EIP not found, assuming already released");
                self.recorder.normal(
                    &name,
                    events::REASON_ALREADY_RELEASED,
                    format!("EIP {allocation_id} not found (already released)"),
                );
            }
            Err(e) => {
                error!(%name, %allocation_id, error = %e, "Failed to release EIP");
                let message = format!("Failed to release EIP {allocation_id}: {e}");
                self.recorder.warning(&name, events::REASON_RELEASE_FAILED, message.clone());
                mark(
                    eip,
                    TYPE_READY,
                    ConditionStatus::False,
                    condition::REASON_RELEASE_FAILED,
                    message,
                );
                if let Err(write_err) = self.write_status(eip).await {
                    warn!(%name, error = %write_err, "Failed to persist release failure");
                }
                return Err(ReconcileError::gateway("ReleaseEipAddress", e));
            }
        }

        mark(
            eip,
            TYPE_PROGRESSING,
            ConditionStatus::False,
            condition::REASON_DELETED,
            "EIP deleted",
        );
        Ok(())
    }
}
