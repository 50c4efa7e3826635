//! EIP resource types: declared spec, observed status and object metadata.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::condition::Condition;

/// Finalizer attached before any remote allocation happens.
pub const FINALIZER: &str = "eip.alibabacloud.com/finalizer";

/// How the EIP is billed for traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum InternetChargeType {
    PayByBandwidth,
    #[default]
    PayByTraffic,
}

impl InternetChargeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InternetChargeType::PayByBandwidth => "PayByBandwidth",
            InternetChargeType::PayByTraffic => "PayByTraffic",
        }
    }
}

impl fmt::Display for InternetChargeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the EIP instance itself is billed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum InstanceChargeType {
    PrePaid,
    #[default]
    PostPaid,
}

impl InstanceChargeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceChargeType::PrePaid => "PrePaid",
            InstanceChargeType::PostPaid => "PostPaid",
        }
    }
}

impl fmt::Display for InstanceChargeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happens to the remote EIP when the object is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReleaseStrategy {
    /// Keep the remote EIP.
    Never,
    /// Release the remote EIP.
    #[default]
    OnDelete,
}

impl fmt::Display for ReleaseStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReleaseStrategy::Never => f.write_str("Never"),
            ReleaseStrategy::OnDelete => f.write_str("OnDelete"),
        }
    }
}

/// Desired state of an EIP.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EipSpec {
    /// Existing EIP to adopt instead of allocating a new one.
    #[serde(rename = "allocationID")]
    pub allocation_id: String,
    /// Bandwidth in Mbps.
    pub bandwidth: String,
    pub internet_charge_type: InternetChargeType,
    pub instance_charge_type: InstanceChargeType,
    /// Line type (BGP, BGP_PRO, ChinaTelecom, ...).
    pub isp: String,
    #[serde(rename = "publicIPAddressPoolID")]
    pub public_ip_address_pool_id: String,
    #[serde(rename = "resourceGroupID")]
    pub resource_group_id: String,
    pub name: String,
    pub description: String,
    pub security_protection_types: Vec<String>,
    pub tags: BTreeMap<String, String>,
    /// Shared bandwidth package the EIP should belong to.
    #[serde(rename = "bandwidthPackageID")]
    pub bandwidth_package_id: String,
    pub release_strategy: ReleaseStrategy,
}

/// Observed state of an EIP, owned by the reconciler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EipStatus {
    #[serde(rename = "allocationID")]
    pub allocation_id: String,
    pub eip_address: String,
    pub status: String,
    pub isp: String,
    pub internet_charge_type: String,
    pub instance_charge_type: String,
    pub bandwidth: String,
    #[serde(rename = "bandwidthPackageID")]
    pub bandwidth_package_id: String,
    #[serde(rename = "resourceGroupID")]
    pub resource_group_id: String,
    pub name: String,
    #[serde(rename = "publicIPAddressPoolID")]
    pub public_ip_address_pool_id: String,
    pub description: String,
    pub conditions: Vec<Condition>,
    pub last_sync_time: Option<DateTime<Utc>>,
}

/// Store-managed metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,
    /// Bumped by the store whenever the spec changes.
    #[serde(default)]
    pub generation: i64,
    /// Optimistic concurrency token, bumped on every write.
    #[serde(default)]
    pub resource_version: u64,
    #[serde(default = "Utc::now")]
    pub creation_timestamp: DateTime<Utc>,
    #[serde(default)]
    pub deletion_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finalizers: Vec<String>,
}

impl ObjectMeta {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            generation: 0,
            resource_version: 0,
            creation_timestamp: Utc::now(),
            deletion_timestamp: None,
            finalizers: Vec::new(),
        }
    }

    pub fn is_deleting(&self) -> bool {
        self.deletion_timestamp.is_some()
    }

    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.finalizers.iter().any(|f| f == finalizer)
    }

    /// Returns true if the finalizer was added.
    pub fn add_finalizer(&mut self, finalizer: &str) -> bool {
        if self.has_finalizer(finalizer) {
            return false;
        }
        self.finalizers.push(finalizer.to_string());
        true
    }

    /// Returns true if the finalizer was present.
    pub fn remove_finalizer(&mut self, finalizer: &str) -> bool {
        let before = self.finalizers.len();
        self.finalizers.retain(|f| f != finalizer);
        self.finalizers.len() != before
    }
}

/// A declared EIP object as persisted by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Eip {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: EipSpec,
    #[serde(default)]
    pub status: EipStatus,
}

impl Eip {
    pub fn new(name: impl Into<String>, spec: EipSpec) -> Self {
        Self {
            metadata: ObjectMeta::new(name),
            spec,
            status: EipStatus::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }
}
