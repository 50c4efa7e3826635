//! Projection of a remote EIP snapshot onto the persisted status.

use chrono::{DateTime, Utc};

use crate::gateway::EipSnapshot;
use crate::resource::EipStatus;

/// Copy every remote field into `status` and stamp the sync time.
///
/// Conditions are left untouched; they are owned by the reconciler.
pub fn project(snapshot: &EipSnapshot, status: &mut EipStatus, now: DateTime<Utc>) {
    status.allocation_id = snapshot.allocation_id.clone();
    status.eip_address = snapshot.ip_address.clone();
    status.status = snapshot.status.clone();
    status.isp = snapshot.isp.clone();
    status.internet_charge_type = snapshot.internet_charge_type.clone();
    status.instance_charge_type = snapshot.charge_type.clone();
    status.bandwidth = snapshot.bandwidth.clone();
    status.bandwidth_package_id = snapshot.bandwidth_package_id.clone();
    status.resource_group_id = snapshot.resource_group_id.clone();
    status.name = snapshot.name.clone();
    status.public_ip_address_pool_id = snapshot.public_ip_address_pool_id.clone();
    status.description = snapshot.description.clone();
    status.last_sync_time = Some(now);
}
