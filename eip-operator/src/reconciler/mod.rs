//! EIP reconciliation engine.
//!
//! One cycle loads the object, then either runs the finalization protocol
//! (deletion marker present) or converges the remote EIP towards its
//! `EipSpec`: adopt or allocate, describe, bandwidth, bandwidth package,
//! describe again. Status and conditions are written back after every step so an
//! interrupted cycle leaves an accurate record behind.
//!
//! The engine assumes the caller never runs two cycles for the same name at
//! once; [`crate::controller::Controller`] provides that guarantee.

mod error;
mod finalize;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::condition::{self, ConditionStatus, TYPE_PROGRESSING, TYPE_READY, TYPE_SYNCED};
use crate::config::OperatorConfig;
use crate::events::{self, EventRecorder};
use crate::gateway::{
    self, AllocateRequest, DescribeFilter, EipGateway, GatewayError, RESOURCE_KIND_EIP,
};
use crate::resource::{Eip, EipSpec, FINALIZER};
use crate::status;
use crate::store::{EipStore, StoreError};

pub use error::ReconcileError;

/// What the scheduler should do after a successful cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Run again after the given delay.
    Requeue(Duration),
    /// Nothing left to do until the object changes.
    Done,
}

impl Action {
    pub fn requeue(after: Duration) -> Self {
        Action::Requeue(after)
    }
}

/// Trait for object reconcilers driven by the controller.
#[async_trait]
pub trait Reconciler: Send + Sync {
    /// Run one convergence cycle for the named object.
    async fn reconcile(&self, name: &str) -> Result<Action, ReconcileError>;

    /// Delay before retrying a failed cycle.
    fn error_policy(&self, name: &str, err: &ReconcileError) -> Duration;
}

/// Reconciles EIP objects against the provider.
pub struct EipReconciler {
    store: Arc<dyn EipStore>,
    gateway: Arc<dyn EipGateway>,
    recorder: Arc<EventRecorder>,
    config: OperatorConfig,
}

/// Upsert a condition stamped with the object's current generation.
fn mark(
    eip: &mut Eip,
    type_: &str,
    status: ConditionStatus,
    reason: &str,
    message: impl Into<String>,
) {
    let generation = eip.metadata.generation;
    condition::set_condition(
        &mut eip.status.conditions,
        type_,
        status,
        reason,
        message,
        generation,
        Utc::now(),
    );
}

impl EipReconciler {
    pub fn new(
        store: Arc<dyn EipStore>,
        gateway: Arc<dyn EipGateway>,
        recorder: Arc<EventRecorder>,
        config: OperatorConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            recorder,
            config,
        }
    }

    /// Bound a gateway call by the configured deadline.
    async fn call<T: Send>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = gateway::Result<T>> + Send,
    ) -> gateway::Result<T> {
        match tokio::time::timeout(self.config.call_timeout(), fut).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout {
                operation,
                secs: self.config.call_timeout_secs,
            }),
        }
    }

    async fn fetch(&self, name: &str) -> Result<Eip, StoreError> {
        self.store
            .get(name)
            .await?
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    /// Persist `eip.status`, retrying version conflicts on a fresh read.
    async fn write_status(&self, eip: &mut Eip) -> Result<(), StoreError> {
        let mut attempt = 1;
        loop {
            match self.store.update_status(eip).await {
                Ok(updated) => {
                    *eip = updated;
                    return Ok(());
                }
                Err(e)
                    if e.is_version_mismatch() && attempt < self.config.status_update_attempts =>
                {
                    debug!(name = %eip.name(), attempt, "Status write conflicted, retrying");
                    let name = eip.name().to_string();
                    let status = std::mem::take(&mut eip.status);
                    *eip = self.fetch(&name).await?;
                    eip.status = status;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Apply `mutate` to metadata/spec and persist it, reapplying the
    /// mutation on a fresh read after a version conflict.
    ///
    /// The local, possibly unpersisted status is kept. Returns false when the
    /// write purged the object.
    async fn write_object<F>(&self, eip: &mut Eip, mutate: F) -> Result<bool, StoreError>
    where
        F: Fn(&mut Eip) + Send + Sync,
    {
        mutate(eip);
        let mut attempt = 1;
        loop {
            match self.store.update(eip).await {
                Ok(Some(updated)) => {
                    let status = std::mem::take(&mut eip.status);
                    *eip = updated;
                    eip.status = status;
                    return Ok(true);
                }
                Ok(None) => return Ok(false),
                Err(e)
                    if e.is_version_mismatch() && attempt < self.config.status_update_attempts =>
                {
                    debug!(name = %eip.name(), attempt, "Object write conflicted, retrying");
                    let name = eip.name().to_string();
                    let status = std::mem::take(&mut eip.status);
                    *eip = self.fetch(&name).await?;
                    eip.status = status;
                    mutate(eip);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Record a failed mutation on Ready/Synced and build the error to return.
    async fn sync_failed(
        &self,
        eip: &mut Eip,
        operation: &'static str,
        message: String,
        source: GatewayError,
    ) -> ReconcileError {
        warn!(name = %eip.name(), operation, error = %source, "{}", message);
        mark(
            eip,
            TYPE_READY,
            ConditionStatus::False,
            condition::REASON_SYNC_FAILED,
            message.clone(),
        );
        mark(eip, TYPE_SYNCED, ConditionStatus::False, condition::REASON_SYNC_FAILED, message);
        if let Err(e) = self.write_status(eip).await {
            warn!(name = %eip.name(), error = %e, "Failed to persist sync failure");
        }
        ReconcileError::gateway(operation, source)
    }

    fn throttled(&self, eip: &Eip, operation: &'static str, err: &GatewayError) -> Action {
        let delay = self.config.requeue.throttled();
        warn!(name = %eip.name(), operation, error = %err, ?delay, "Provider throttled request");
        self.recorder.warning(
            eip.name(),
            events::REASON_THROTTLED,
            format!("{operation} throttled, retrying in {}s", delay.as_secs()),
        );
        Action::requeue(delay)
    }

    fn allocate_request(&self, spec: &EipSpec) -> AllocateRequest {
        let description = if spec.description.is_empty() {
            self.config.default_description.clone()
        } else {
            spec.description.clone()
        };
        AllocateRequest {
            internet_charge_type: spec.internet_charge_type.to_string(),
            bandwidth: spec.bandwidth.clone(),
            isp: spec.isp.clone(),
            instance_charge_type: spec.instance_charge_type.to_string(),
            public_ip_address_pool_id: spec.public_ip_address_pool_id.clone(),
            resource_group_id: spec.resource_group_id.clone(),
            name: spec.name.clone(),
            description,
            security_protection_types: spec.security_protection_types.clone(),
        }
    }

    /// Forward convergence for an object carrying the finalizer.
    async fn converge(&self, eip: &mut Eip) -> Result<Action, ReconcileError> {
        let name = eip.name().to_string();

        // A previous cycle may have allocated and recorded the id in status only
        if eip.spec.allocation_id.is_empty() && !eip.status.allocation_id.is_empty() {
            let allocation_id = eip.status.allocation_id.clone();
            info!(%name, %allocation_id, "Adopting allocation ID from status");
            let adopted = allocation_id.clone();
            if !self
                .write_object(eip, move |e| e.spec.allocation_id = adopted.clone())
                .await?
            {
                return Ok(Action::Done);
            }
        }

        if eip.spec.allocation_id.is_empty() {
            if let Some(action) = self.allocate(eip).await? {
                return Ok(action);
            }
        }

        if let Some(action) = self.describe_and_project(eip).await? {
            return Ok(action);
        }

        let allocation_id = eip.spec.allocation_id.clone();

        // Package membership governs bandwidth
        if !eip.spec.bandwidth.is_empty()
            && eip.spec.bandwidth != eip.status.bandwidth
            && eip.status.bandwidth_package_id.is_empty()
        {
            let from = eip.status.bandwidth.clone();
            let to = eip.spec.bandwidth.clone();
            mark(
                eip,
                TYPE_PROGRESSING,
                ConditionStatus::True,
                condition::REASON_UPDATING,
                format!("Changing bandwidth to {to}"),
            );
            self.write_status(eip).await?;

            if let Err(e) = self
                .call(
                    "ModifyEipAddressAttribute",
                    self.gateway.modify_bandwidth(&allocation_id, &to),
                )
                .await
            {
                let message = format!("Failed to change bandwidth to {to}: {e}");
                return Err(self
                    .sync_failed(eip, "ModifyEipAddressAttribute", message, e)
                    .await);
            }

            info!(%name, %allocation_id, %from, %to, "EIP bandwidth changed");
            self.recorder.normal(
                &name,
                events::REASON_UPDATED,
                format!("Bandwidth changed from {from} to {to}"),
            );
            mark(
                eip,
                TYPE_PROGRESSING,
                ConditionStatus::False,
                condition::REASON_UPDATED,
                "Bandwidth updated",
            );
        }

        let desired = eip.spec.bandwidth_package_id.clone();
        let observed = eip.status.bandwidth_package_id.clone();
        if !desired.is_empty() && desired != observed {
            mark(
                eip,
                TYPE_PROGRESSING,
                ConditionStatus::True,
                condition::REASON_UPDATING,
                format!("Joining bandwidth package {desired}"),
            );
            self.write_status(eip).await?;

            if !observed.is_empty() {
                // Must not block joining the new package
                if let Err(e) = self
                    .call(
                        "RemoveCommonBandwidthPackageIp",
                        self.gateway
                            .remove_from_bandwidth_package(&allocation_id, &observed),
                    )
                    .await
                {
                    warn!(
                        %name,
                        %allocation_id,
                        package_id = %observed,
                        error = %e,
                        "Failed to remove EIP from previous bandwidth package"
                    );
                }
            }

            if let Err(e) = self
                .call(
                    "AddCommonBandwidthPackageIp",
                    self.gateway.add_to_bandwidth_package(&allocation_id, &desired),
                )
                .await
            {
                let message = format!("Failed to add EIP to bandwidth package {desired}: {e}");
                return Err(self
                    .sync_failed(eip, "AddCommonBandwidthPackageIp", message, e)
                    .await);
            }

            info!(%name, %allocation_id, package_id = %desired, "EIP added to bandwidth package");
            self.recorder.normal(
                &name,
                events::REASON_UPDATED,
                format!("Added to bandwidth package {desired}"),
            );
            mark(
                eip,
                TYPE_PROGRESSING,
                ConditionStatus::False,
                condition::REASON_UPDATED,
                "Bandwidth package updated",
            );
        } else if desired.is_empty() && !observed.is_empty() {
            match self
                .call(
                    "RemoveCommonBandwidthPackageIp",
                    self.gateway
                        .remove_from_bandwidth_package(&allocation_id, &observed),
                )
                .await
            {
                Ok(()) => {
                    info!(
                        %name,
                        %allocation_id,
                        package_id = %observed,
                        "EIP removed from bandwidth package"
                    );
                    self.recorder.normal(
                        &name,
                        events::REASON_UPDATED,
                        format!("Removed from bandwidth package {observed}"),
                    );
                }
                Err(e) => {
                    warn!(
                        %name,
                        %allocation_id,
                        package_id = %observed,
                        error = %e,
                        "Failed to remove EIP from bandwidth package"
                    );
                }
            }
        }

        if let Some(action) = self.describe_and_project(eip).await? {
            return Ok(action);
        }

        mark(
            eip,
            TYPE_READY,
            ConditionStatus::True,
            condition::REASON_AVAILABLE,
            "EIP is available",
        );
        mark(eip, TYPE_SYNCED, ConditionStatus::True, condition::REASON_SYNCED, "EIP is synced");
        self.write_status(eip).await?;

        debug!(%name, %allocation_id, "EIP converged");
        Ok(Action::requeue(self.config.requeue.steady()))
    }

    /// Allocate a new EIP. Returns an action when the cycle must stop early.
    async fn allocate(&self, eip: &mut Eip) -> Result<Option<Action>, ReconcileError> {
        let name = eip.name().to_string();
        mark(
            eip,
            TYPE_PROGRESSING,
            ConditionStatus::True,
            condition::REASON_CREATING,
            "Allocating EIP",
        );
        self.write_status(eip).await?;

        let req = self.allocate_request(&eip.spec);
        let allocated = match self
            .call("AllocateEipAddress", self.gateway.allocate(&req))
            .await
        {
            Ok(allocated) => allocated,
            Err(e) if e.is_throttled() => {
                mark(
                    eip,
                    TYPE_READY,
                    ConditionStatus::False,
                    condition::REASON_THROTTLED,
                    e.to_string(),
                );
                let action = self.throttled(eip, "AllocateEipAddress", &e);
                if let Err(write_err) = self.write_status(eip).await {
                    warn!(%name, error = %write_err, "Failed to persist throttled status");
                }
                return Ok(Some(action));
            }
            Err(e) => {
                let message = format!("Failed to create EIP: {e}");
                return Err(self.sync_failed(eip, "AllocateEipAddress", message, e).await);
            }
        };

        let allocation_id = allocated.allocation_id;
        info!(%name, %allocation_id, ip_address = %allocated.ip_address, "EIP allocated");

        if !eip.spec.tags.is_empty() {
            let ids = [allocation_id.clone()];
            if let Err(e) = self
                .call(
                    "TagResources",
                    self.gateway
                        .tag_resources(RESOURCE_KIND_EIP, &ids, &eip.spec.tags),
                )
                .await
            {
                warn!(%name, %allocation_id, error = %e, "Failed to tag EIP");
            }
        }

        // Status first: a crash before the object write is recovered by adoption
        eip.status.allocation_id = allocation_id.clone();
        eip.status.eip_address = allocated.ip_address.clone();
        mark(
            eip,
            TYPE_PROGRESSING,
            ConditionStatus::False,
            condition::REASON_CREATED,
            format!("EIP {allocation_id} created"),
        );
        if let Err(e) = self.write_status(eip).await {
            // The next cycle cannot adopt what was never persisted
            error!(
                %name,
                %allocation_id,
                ip_address = %allocated.ip_address,
                error = %e,
                "Allocated EIP could not be recorded"
            );
            self.recorder.warning(
                &name,
                events::REASON_ALLOCATION_NOT_RECORDED,
                format!(
                    "EIP {allocation_id} ({}) was allocated but not recorded: {e}",
                    allocated.ip_address
                ),
            );
            return Err(e.into());
        }

        let id = allocation_id.clone();
        if !self
            .write_object(eip, move |e| e.spec.allocation_id = id.clone())
            .await?
        {
            return Ok(Some(Action::Done));
        }

        self.recorder.normal(
            &name,
            events::REASON_CREATED,
            format!("Created EIP {allocation_id} ({})", allocated.ip_address),
        );
        Ok(None)
    }

    /// Describe the EIP and project it into status.
    async fn describe_and_project(&self, eip: &mut Eip) -> Result<Option<Action>, ReconcileError> {
        let allocation_id = eip.spec.allocation_id.clone();
        let filter = DescribeFilter::by_allocation_id(&allocation_id);

        match self
            .call("DescribeEipAddresses", self.gateway.describe(&filter))
            .await
        {
            Ok(mut found) if found.len() == 1 => {
                if let Some(snapshot) = found.pop() {
                    status::project(&snapshot, &mut eip.status, Utc::now());
                }
                self.write_status(eip).await?;
                Ok(None)
            }
            Ok(found) => {
                let err = ReconcileError::Inconsistent {
                    allocation_id,
                    count: found.len(),
                };
                let message = err.to_string();
                mark(
                    eip,
                    TYPE_READY,
                    ConditionStatus::False,
                    condition::REASON_SYNC_FAILED,
                    message.clone(),
                );
                mark(
                    eip,
                    TYPE_SYNCED,
                    ConditionStatus::False,
                    condition::REASON_SYNC_FAILED,
                    message,
                );
                if let Err(e) = self.write_status(eip).await {
                    warn!(name = %eip.name(), error = %e, "Failed to persist sync failure");
                }
                Err(err)
            }
            // Not observing is not a failed mutation: no condition change
            Err(e) if e.is_throttled() => Ok(Some(self.throttled(eip, "DescribeEipAddresses", &e))),
            Err(e) => {
                let message = format!("Failed to describe EIP {allocation_id}: {e}");
                Err(self.sync_failed(eip, "DescribeEipAddresses", message, e).await)
            }
        }
    }
}

#[async_trait]
impl Reconciler for EipReconciler {
    async fn reconcile(&self, name: &str) -> Result<Action, ReconcileError> {
        let Some(mut eip) = self.store.get(name).await? else {
            debug!(%name, "EIP object gone, nothing to do");
            return Ok(Action::Done);
        };

        if eip.metadata.is_deleting() {
            if !eip.metadata.has_finalizer(FINALIZER) {
                return Ok(Action::Done);
            }
            self.finalize(&mut eip).await?;
            self.write_object(&mut eip, |e| {
                e.metadata.remove_finalizer(FINALIZER);
            })
            .await?;
            info!(%name, "Finalizer removed");
            return Ok(Action::Done);
        }

        // Durable before any remote side effect
        if !eip.metadata.has_finalizer(FINALIZER) {
            self.write_object(&mut eip, |e| {
                e.metadata.add_finalizer(FINALIZER);
            })
            .await?;
            debug!(%name, "Finalizer added");
            return Ok(Action::requeue(Duration::ZERO));
        }

        match self.converge(&mut eip).await {
            Ok(action) => Ok(action),
            Err(e) => {
                self.recorder
                    .warning(name, events::REASON_RECONCILE_FAILED, e.to_string());
                Err(e)
            }
        }
    }

    fn error_policy(&self, name: &str, err: &ReconcileError) -> Duration {
        let delay = err.requeue_after(&self.config.requeue);
        warn!(%name, error = %err, ?delay, "Reconcile failed");
        delay
    }
}
