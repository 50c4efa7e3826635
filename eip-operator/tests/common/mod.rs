//! Shared test utilities for eip-operator integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

use eip_operator::condition::{Condition, TYPE_READY, find_condition};
use eip_operator::gateway::{
    self, AllocateRequest, AllocatedEip, DescribeFilter, EipSnapshot, Operation,
};
use eip_operator::store;
use eip_operator::{
    Action, Eip, EipGateway, EipReconciler, EipSpec, EipStore, EventRecorder, InMemoryGateway,
    InMemoryStore, OperatorConfig, ReconcileError, Reconciler, StoreEvent,
};

pub const REGION: &str = "cn-hangzhou";

pub fn config() -> OperatorConfig {
    OperatorConfig::for_region(REGION)
}

pub fn spec(bandwidth: &str) -> EipSpec {
    EipSpec {
        bandwidth: bandwidth.to_string(),
        ..Default::default()
    }
}

/// Store, gateway and recorder wired to one reconciler.
pub struct TestEnv {
    pub store: Arc<InMemoryStore>,
    pub gateway: Arc<InMemoryGateway>,
    pub recorder: Arc<EventRecorder>,
    pub config: OperatorConfig,
    pub reconciler: EipReconciler,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::with_config(config())
    }

    pub fn with_config(config: OperatorConfig) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let gateway = Arc::new(InMemoryGateway::new(config.region_id.clone()));
        let recorder = Arc::new(EventRecorder::new());
        let reconciler = EipReconciler::new(
            store.clone(),
            gateway.clone(),
            recorder.clone(),
            config.clone(),
        );
        Self {
            store,
            gateway,
            recorder,
            config,
            reconciler,
        }
    }

    /// A reconciler sharing this env's gateway and recorder but using `store`.
    pub fn reconciler_with_store(&self, store: Arc<dyn EipStore>) -> EipReconciler {
        EipReconciler::new(
            store,
            self.gateway.clone(),
            self.recorder.clone(),
            self.config.clone(),
        )
    }

    /// A reconciler sharing this env's store and recorder but using `gateway`.
    pub fn reconciler_with_gateway(&self, gateway: Arc<dyn EipGateway>) -> EipReconciler {
        EipReconciler::new(
            self.store.clone(),
            gateway,
            self.recorder.clone(),
            self.config.clone(),
        )
    }

    pub async fn create(&self, name: &str, spec: EipSpec) -> Eip {
        self.store
            .create(Eip::new(name, spec))
            .await
            .expect("Failed to create EIP object")
    }

    pub async fn get(&self, name: &str) -> Option<Eip> {
        self.store.get(name).await.unwrap()
    }

    pub async fn reconcile(&self, name: &str) -> Result<Action, ReconcileError> {
        self.reconciler.reconcile(name).await
    }

    /// Reconcile until the cycle stops asking for an immediate rerun.
    pub async fn converge(&self, name: &str) -> Eip {
        for _ in 0..4 {
            match self.reconcile(name).await {
                Ok(Action::Requeue(delay)) if delay.is_zero() => continue,
                Ok(_) => break,
                Err(e) => panic!("reconcile of {name} failed: {e}"),
            }
        }
        self.get(name).await.expect("EIP object disappeared")
    }

    /// Change the spec through the store, as a user edit would.
    pub async fn edit(&self, name: &str, f: impl FnOnce(&mut EipSpec)) -> Eip {
        let mut eip = self.get(name).await.expect("EIP object missing");
        f(&mut eip.spec);
        self.store.update(&eip).await.unwrap().expect("EIP object purged")
    }
}

pub fn condition(eip: &Eip, type_: &str) -> Option<Condition> {
    find_condition(&eip.status.conditions, type_).cloned()
}

pub fn is_ready(eip: &Eip) -> bool {
    condition(eip, TYPE_READY).is_some_and(|c| c.is_true())
}

pub async fn wait_for<F, Fut>(timeout: Duration, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within {timeout:?}");
}

/// Store wrapper that makes the next status writes lose a race against a
/// concurrent writer.
pub struct ConflictingStore {
    inner: Arc<InMemoryStore>,
    /// Status writes let through before conflicts start.
    skip: AtomicUsize,
    conflicts: AtomicUsize,
}

impl ConflictingStore {
    pub fn new(inner: Arc<InMemoryStore>, conflicts: usize) -> Self {
        Self::after(inner, 0, conflicts)
    }

    pub fn after(inner: Arc<InMemoryStore>, skip: usize, conflicts: usize) -> Self {
        Self {
            inner,
            skip: AtomicUsize::new(skip),
            conflicts: AtomicUsize::new(conflicts),
        }
    }

    pub fn remaining(&self) -> usize {
        self.conflicts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EipStore for ConflictingStore {
    async fn get(&self, name: &str) -> store::Result<Option<Eip>> {
        self.inner.get(name).await
    }

    async fn list(&self) -> store::Result<Vec<Eip>> {
        self.inner.list().await
    }

    async fn create(&self, eip: Eip) -> store::Result<Eip> {
        self.inner.create(eip).await
    }

    async fn update(&self, eip: &Eip) -> store::Result<Option<Eip>> {
        self.inner.update(eip).await
    }

    async fn update_status(&self, eip: &Eip) -> store::Result<Eip> {
        let skipped = self
            .skip
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if skipped {
            return self.inner.update_status(eip).await;
        }
        let inject = self
            .conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if inject {
            // Someone else writes first
            if let Some(current) = self.inner.get(eip.name()).await? {
                self.inner.update_status(&current).await?;
            }
        }
        self.inner.update_status(eip).await
    }

    async fn delete(&self, name: &str) -> store::Result<()> {
        self.inner.delete(name).await
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.inner.subscribe()
    }
}

/// Gateway wrapper whose calls of one operation never complete.
pub struct HangingGateway {
    inner: Arc<InMemoryGateway>,
    hang: Operation,
}

impl HangingGateway {
    pub fn new(inner: Arc<InMemoryGateway>, hang: Operation) -> Self {
        Self { inner, hang }
    }

    async fn pass<T>(
        &self,
        op: Operation,
        call: impl Future<Output = gateway::Result<T>>,
    ) -> gateway::Result<T> {
        if op == self.hang {
            return std::future::pending().await;
        }
        call.await
    }
}

#[async_trait]
impl EipGateway for HangingGateway {
    async fn allocate(&self, req: &AllocateRequest) -> gateway::Result<AllocatedEip> {
        self.pass(Operation::Allocate, self.inner.allocate(req)).await
    }

    async fn describe(&self, filter: &DescribeFilter) -> gateway::Result<Vec<EipSnapshot>> {
        self.pass(Operation::Describe, self.inner.describe(filter)).await
    }

    async fn release(&self, allocation_id: &str) -> gateway::Result<()> {
        self.pass(Operation::Release, self.inner.release(allocation_id)).await
    }

    async fn modify_bandwidth(&self, allocation_id: &str, bandwidth: &str) -> gateway::Result<()> {
        self.pass(
            Operation::ModifyBandwidth,
            self.inner.modify_bandwidth(allocation_id, bandwidth),
        )
        .await
    }

    async fn add_to_bandwidth_package(
        &self,
        allocation_id: &str,
        package_id: &str,
    ) -> gateway::Result<()> {
        self.pass(
            Operation::AddToBandwidthPackage,
            self.inner.add_to_bandwidth_package(allocation_id, package_id),
        )
        .await
    }

    async fn remove_from_bandwidth_package(
        &self,
        allocation_id: &str,
        package_id: &str,
    ) -> gateway::Result<()> {
        self.pass(
            Operation::RemoveFromBandwidthPackage,
            self.inner.remove_from_bandwidth_package(allocation_id, package_id),
        )
        .await
    }

    async fn tag_resources(
        &self,
        resource_kind: &str,
        resource_ids: &[String],
        tags: &BTreeMap<String, String>,
    ) -> gateway::Result<()> {
        self.pass(
            Operation::TagResources,
            self.inner.tag_resources(resource_kind, resource_ids, tags),
        )
        .await
    }
}
