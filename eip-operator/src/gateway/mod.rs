//! Remote EIP API surface.
//!
//! The reconciler talks to the provider only through [`EipGateway`]. Calls are
//! stateless; failures come back as a structured [`GatewayError`] so callers
//! never need to inspect error text.

pub mod error;
pub mod memory;

use std::collections::BTreeMap;

use async_trait::async_trait;

pub use error::{GatewayError, classify_error};
pub use memory::{GatewayCall, InMemoryGateway, Operation};

/// Resource kind used when tagging EIPs.
pub const RESOURCE_KIND_EIP: &str = "EIP";

/// Remote lifecycle state of an unbound EIP.
pub const STATUS_AVAILABLE: &str = "Available";

pub type Result<T> = std::result::Result<T, GatewayError>;

/// Parameters for allocating a new EIP.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllocateRequest {
    pub internet_charge_type: String,
    pub bandwidth: String,
    pub isp: String,
    pub instance_charge_type: String,
    pub public_ip_address_pool_id: String,
    pub resource_group_id: String,
    pub name: String,
    pub description: String,
    pub security_protection_types: Vec<String>,
}

/// Result of a successful allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocatedEip {
    pub allocation_id: String,
    pub ip_address: String,
}

/// Describe filter; empty fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DescribeFilter {
    pub allocation_id: String,
    pub ip_address: String,
    pub associated_instance_id: String,
    pub associated_instance_type: String,
}

impl DescribeFilter {
    pub fn by_allocation_id(id: impl Into<String>) -> Self {
        Self {
            allocation_id: id.into(),
            ..Default::default()
        }
    }

    pub fn matches(&self, eip: &EipSnapshot) -> bool {
        (self.allocation_id.is_empty() || self.allocation_id == eip.allocation_id)
            && (self.ip_address.is_empty() || self.ip_address == eip.ip_address)
            && (self.associated_instance_id.is_empty()
                || self.associated_instance_id == eip.instance_id)
            && (self.associated_instance_type.is_empty()
                || self.associated_instance_type == eip.instance_type)
    }
}

/// Remote view of one EIP.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EipSnapshot {
    pub allocation_id: String,
    pub status: String,
    /// Instance billing mode (PrePaid / PostPaid).
    pub charge_type: String,
    pub bandwidth_package_id: String,
    pub bandwidth: String,
    pub ip_address: String,
    pub instance_id: String,
    pub instance_type: String,
    pub internet_charge_type: String,
    pub public_ip_address_pool_id: String,
    pub isp: String,
    pub name: String,
    pub resource_group_id: String,
    pub private_ip_address: String,
    pub description: String,
    pub tags: BTreeMap<String, String>,
}

/// Operations against the provider's EIP API.
#[async_trait]
pub trait EipGateway: Send + Sync {
    /// Allocate a new EIP.
    async fn allocate(&self, req: &AllocateRequest) -> Result<AllocatedEip>;

    /// List EIPs matching the filter.
    async fn describe(&self, filter: &DescribeFilter) -> Result<Vec<EipSnapshot>>;

    /// Release an EIP.
    async fn release(&self, allocation_id: &str) -> Result<()>;

    /// Change the bandwidth of an EIP.
    async fn modify_bandwidth(&self, allocation_id: &str, bandwidth: &str) -> Result<()>;

    /// Add an EIP to a shared bandwidth package.
    async fn add_to_bandwidth_package(&self, allocation_id: &str, package_id: &str) -> Result<()>;

    /// Remove an EIP from a shared bandwidth package.
    async fn remove_from_bandwidth_package(
        &self,
        allocation_id: &str,
        package_id: &str,
    ) -> Result<()>;

    /// Attach tags to resources.
    async fn tag_resources(
        &self,
        resource_kind: &str,
        resource_ids: &[String],
        tags: &BTreeMap<String, String>,
    ) -> Result<()>;
}
