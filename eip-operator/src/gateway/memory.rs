//! In-memory EIP provider.
//!
//! Behaves like a single region of the real API: allocations get fresh ids and
//! addresses, missing EIPs produce `NotFound`. Every call is recorded, and
//! failures can be injected per operation for exercising the error paths.

use std::collections::{BTreeMap, HashMap, VecDeque};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use super::{
    AllocateRequest, AllocatedEip, DescribeFilter, EipGateway, EipSnapshot, GatewayError,
    Result, STATUS_AVAILABLE,
};

/// Bandwidth assigned when an allocation does not ask for one.
const DEFAULT_BANDWIDTH: &str = "5";
const DEFAULT_ISP: &str = "BGP";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Allocate,
    Describe,
    Release,
    ModifyBandwidth,
    AddToBandwidthPackage,
    RemoveFromBandwidthPackage,
    TagResources,
}

/// A recorded gateway call with its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    Allocate(AllocateRequest),
    Describe(DescribeFilter),
    Release {
        allocation_id: String,
    },
    ModifyBandwidth {
        allocation_id: String,
        bandwidth: String,
    },
    AddToBandwidthPackage {
        allocation_id: String,
        package_id: String,
    },
    RemoveFromBandwidthPackage {
        allocation_id: String,
        package_id: String,
    },
    TagResources {
        resource_kind: String,
        resource_ids: Vec<String>,
        tags: BTreeMap<String, String>,
    },
}

impl GatewayCall {
    pub fn operation(&self) -> Operation {
        match self {
            GatewayCall::Allocate(_) => Operation::Allocate,
            GatewayCall::Describe(_) => Operation::Describe,
            GatewayCall::Release { .. } => Operation::Release,
            GatewayCall::ModifyBandwidth { .. } => Operation::ModifyBandwidth,
            GatewayCall::AddToBandwidthPackage { .. } => Operation::AddToBandwidthPackage,
            GatewayCall::RemoveFromBandwidthPackage { .. } => {
                Operation::RemoveFromBandwidthPackage
            }
            GatewayCall::TagResources { .. } => Operation::TagResources,
        }
    }

    /// True for calls that change remote state.
    pub fn is_mutation(&self) -> bool {
        !matches!(self, GatewayCall::Describe(_))
    }
}

#[derive(Default)]
struct State {
    eips: BTreeMap<String, EipSnapshot>,
    calls: Vec<GatewayCall>,
    faults: HashMap<Operation, VecDeque<GatewayError>>,
    next_address: u32,
}

impl State {
    fn record(&mut self, call: GatewayCall) -> Result<()> {
        let op = call.operation();
        self.calls.push(call);
        match self.faults.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(err) => {
                debug!(?op, error = %err, "Injected gateway failure");
                Err(err)
            }
            None => Ok(()),
        }
    }

    fn get_mut(&mut self, allocation_id: &str) -> Result<&mut EipSnapshot> {
        self.eips
            .get_mut(allocation_id)
            .ok_or_else(|| not_found(allocation_id))
    }
}

fn not_found(allocation_id: &str) -> GatewayError {
    GatewayError::NotFound(format!(
        "Specified allocation ID is not found: {}",
        allocation_id
    ))
}

fn or_default(value: &str, default: &str) -> String {
    if value.is_empty() {
        default.to_string()
    } else {
        value.to_string()
    }
}

/// Simulated provider for one region.
pub struct InMemoryGateway {
    region_id: String,
    state: Mutex<State>,
}

impl InMemoryGateway {
    pub fn new(region_id: impl Into<String>) -> Self {
        Self {
            region_id: region_id.into(),
            state: Mutex::new(State::default()),
        }
    }

    pub fn region_id(&self) -> &str {
        &self.region_id
    }

    /// Make the next call of `op` fail with `err`. Queued failures are consumed in order.
    pub async fn fail_next(&self, op: Operation, err: GatewayError) {
        let mut state = self.state.lock().await;
        state.faults.entry(op).or_default().push_back(err);
    }

    /// Insert or overwrite an EIP, bypassing the API (out-of-band change).
    pub async fn insert(&self, eip: EipSnapshot) {
        let mut state = self.state.lock().await;
        state.eips.insert(eip.allocation_id.clone(), eip);
    }

    /// Remove an EIP, bypassing the API.
    pub async fn remove(&self, allocation_id: &str) -> Option<EipSnapshot> {
        self.state.lock().await.eips.remove(allocation_id)
    }

    pub async fn get(&self, allocation_id: &str) -> Option<EipSnapshot> {
        self.state.lock().await.eips.get(allocation_id).cloned()
    }

    pub async fn snapshots(&self) -> Vec<EipSnapshot> {
        self.state.lock().await.eips.values().cloned().collect()
    }

    pub async fn calls(&self) -> Vec<GatewayCall> {
        self.state.lock().await.calls.clone()
    }

    pub async fn count(&self, op: Operation) -> usize {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter(|c| c.operation() == op)
            .count()
    }

    pub async fn clear_calls(&self) {
        self.state.lock().await.calls.clear();
    }
}

#[async_trait]
impl EipGateway for InMemoryGateway {
    async fn allocate(&self, req: &AllocateRequest) -> Result<AllocatedEip> {
        let mut state = self.state.lock().await;
        state.record(GatewayCall::Allocate(req.clone()))?;

        let allocation_id = format!("eip-{}", Uuid::new_v4().simple());
        state.next_address += 1;
        let n = state.next_address;
        let ip_address = format!("47.{}.{}.{}", 100 + (n >> 16) % 100, (n >> 8) & 0xff, n & 0xff);

        let snapshot = EipSnapshot {
            allocation_id: allocation_id.clone(),
            status: STATUS_AVAILABLE.to_string(),
            charge_type: or_default(&req.instance_charge_type, "PostPaid"),
            bandwidth: or_default(&req.bandwidth, DEFAULT_BANDWIDTH),
            ip_address: ip_address.clone(),
            internet_charge_type: or_default(&req.internet_charge_type, "PayByTraffic"),
            public_ip_address_pool_id: req.public_ip_address_pool_id.clone(),
            isp: or_default(&req.isp, DEFAULT_ISP),
            name: req.name.clone(),
            resource_group_id: req.resource_group_id.clone(),
            description: req.description.clone(),
            ..Default::default()
        };
        debug!(region = %self.region_id, %allocation_id, %ip_address, "Allocated EIP");
        state.eips.insert(allocation_id.clone(), snapshot);

        Ok(AllocatedEip {
            allocation_id,
            ip_address,
        })
    }

    async fn describe(&self, filter: &DescribeFilter) -> Result<Vec<EipSnapshot>> {
        let mut state = self.state.lock().await;
        state.record(GatewayCall::Describe(filter.clone()))?;
        Ok(state
            .eips
            .values()
            .filter(|eip| filter.matches(eip))
            .cloned()
            .collect())
    }

    async fn release(&self, allocation_id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.record(GatewayCall::Release {
            allocation_id: allocation_id.to_string(),
        })?;
        state
            .eips
            .remove(allocation_id)
            .map(|_| ())
            .ok_or_else(|| not_found(allocation_id))
    }

    async fn modify_bandwidth(&self, allocation_id: &str, bandwidth: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.record(GatewayCall::ModifyBandwidth {
            allocation_id: allocation_id.to_string(),
            bandwidth: bandwidth.to_string(),
        })?;
        state.get_mut(allocation_id)?.bandwidth = bandwidth.to_string();
        Ok(())
    }

    async fn add_to_bandwidth_package(&self, allocation_id: &str, package_id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.record(GatewayCall::AddToBandwidthPackage {
            allocation_id: allocation_id.to_string(),
            package_id: package_id.to_string(),
        })?;
        let eip = state.get_mut(allocation_id)?;
        if !eip.bandwidth_package_id.is_empty() && eip.bandwidth_package_id != package_id {
            return Err(GatewayError::api(
                "OperationFailed.IpInOtherBandwidthPackage",
                format!(
                    "EIP {} already belongs to bandwidth package {}",
                    allocation_id, eip.bandwidth_package_id
                ),
            ));
        }
        eip.bandwidth_package_id = package_id.to_string();
        Ok(())
    }

    async fn remove_from_bandwidth_package(
        &self,
        allocation_id: &str,
        package_id: &str,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        state.record(GatewayCall::RemoveFromBandwidthPackage {
            allocation_id: allocation_id.to_string(),
            package_id: package_id.to_string(),
        })?;
        let eip = state.get_mut(allocation_id)?;
        if eip.bandwidth_package_id != package_id {
            return Err(GatewayError::api(
                "InvalidIpInstanceId.NotInBandwidthPackage",
                format!(
                    "EIP {} is not in bandwidth package {}",
                    allocation_id, package_id
                ),
            ));
        }
        eip.bandwidth_package_id.clear();
        Ok(())
    }

    async fn tag_resources(
        &self,
        resource_kind: &str,
        resource_ids: &[String],
        tags: &BTreeMap<String, String>,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        state.record(GatewayCall::TagResources {
            resource_kind: resource_kind.to_string(),
            resource_ids: resource_ids.to_vec(),
            tags: tags.clone(),
        })?;
        if resource_ids.is_empty() || tags.is_empty() {
            return Ok(());
        }
        for id in resource_ids {
            let eip = state.get_mut(id)?;
            eip.tags
                .extend(tags.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        Ok(())
    }
}
