//! Admission checks for EIP specs.
//!
//! The store runs these before persisting a spec, so the reconciler can assume
//! every spec it sees is consistent.

use thiserror::Error;

use crate::resource::{EipSpec, InstanceChargeType, InternetChargeType};

/// ISPs that only offer single-line connectivity.
pub const SINGLE_LINE_ISPS: &[&str] = &["ChinaTelecom", "ChinaUnicom", "ChinaMobile"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("spec.instanceChargeType: single-line ISP {0} does not support PrePaid, use PostPaid")]
    SingleLineIspPrePaid(String),

    #[error("spec.internetChargeType: single-line ISP {isp} only supports PayByBandwidth, got {charge_type}")]
    SingleLineIspChargeType {
        isp: String,
        charge_type: InternetChargeType,
    },

    #[error("spec.internetChargeType: PrePaid instances require PayByBandwidth, got {0}")]
    PrePaidRequiresPayByBandwidth(InternetChargeType),

    #[error("spec.bandwidth: required when internetChargeType is PayByBandwidth")]
    BandwidthRequired,
}

/// Every rule a spec violated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid EIP spec: {}", .0.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
pub struct ValidationErrors(pub Vec<ValidationError>);

pub fn is_single_line_isp(isp: &str) -> bool {
    SINGLE_LINE_ISPS.contains(&isp)
}

/// Validate a spec, collecting every violated rule.
pub fn validate_spec(spec: &EipSpec) -> Result<(), ValidationErrors> {
    let mut errors = Vec::new();

    if is_single_line_isp(&spec.isp) {
        if spec.instance_charge_type == InstanceChargeType::PrePaid {
            errors.push(ValidationError::SingleLineIspPrePaid(spec.isp.clone()));
        } else if spec.internet_charge_type != InternetChargeType::PayByBandwidth {
            errors.push(ValidationError::SingleLineIspChargeType {
                isp: spec.isp.clone(),
                charge_type: spec.internet_charge_type,
            });
        }
    }

    if spec.instance_charge_type == InstanceChargeType::PrePaid
        && spec.internet_charge_type != InternetChargeType::PayByBandwidth
    {
        errors.push(ValidationError::PrePaidRequiresPayByBandwidth(
            spec.internet_charge_type,
        ));
    }

    if spec.internet_charge_type == InternetChargeType::PayByBandwidth
        && spec.bandwidth.trim().is_empty()
    {
        errors.push(ValidationError::BandwidthRequired);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationErrors(errors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> EipSpec {
        EipSpec {
            bandwidth: "5".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_default_spec_is_valid() {
        assert!(validate_spec(&spec()).is_ok());
    }

    #[test]
    fn test_single_line_isp_rejects_prepaid() {
        let s = EipSpec {
            isp: "ChinaTelecom".to_string(),
            instance_charge_type: InstanceChargeType::PrePaid,
            ..spec()
        };
        let err = validate_spec(&s).unwrap_err();
        assert!(err.0.contains(&ValidationError::SingleLineIspPrePaid("ChinaTelecom".to_string())));
        // PrePaid + PayByTraffic is also caught by the generic rule
        assert!(err.0.contains(&ValidationError::PrePaidRequiresPayByBandwidth(
            InternetChargeType::PayByTraffic
        )));
    }

    #[test]
    fn test_single_line_isp_requires_pay_by_bandwidth() {
        let s = EipSpec {
            isp: "ChinaMobile".to_string(),
            ..spec()
        };
        let err = validate_spec(&s).unwrap_err();
        assert_eq!(err.0.len(), 1);
        assert!(matches!(err.0[0], ValidationError::SingleLineIspChargeType { .. }));

        let ok = EipSpec {
            isp: "ChinaMobile".to_string(),
            internet_charge_type: InternetChargeType::PayByBandwidth,
            ..spec()
        };
        assert!(validate_spec(&ok).is_ok());
    }

    #[test]
    fn test_bgp_allows_traffic_billing() {
        let s = EipSpec {
            isp: "BGP".to_string(),
            ..spec()
        };
        assert!(validate_spec(&s).is_ok());
    }

    #[test]
    fn test_pay_by_bandwidth_requires_bandwidth() {
        let s = EipSpec {
            internet_charge_type: InternetChargeType::PayByBandwidth,
            bandwidth: String::new(),
            ..Default::default()
        };
        let err = validate_spec(&s).unwrap_err();
        assert_eq!(err.0, vec![ValidationError::BandwidthRequired]);
        assert!(err.to_string().contains("spec.bandwidth"));
    }

    #[test]
    fn test_prepaid_with_bandwidth_billing_is_valid() {
        let s = EipSpec {
            instance_charge_type: InstanceChargeType::PrePaid,
            internet_charge_type: InternetChargeType::PayByBandwidth,
            ..spec()
        };
        assert!(validate_spec(&s).is_ok());
    }
}
