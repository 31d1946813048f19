use lazy_static::lazy_static;
use prometheus::{labels, register_gauge, Gauge};

use crate::inspect::{InspectionResult, OverallStatus};
use crate::revocation::RevocationStatus;

lazy_static! {
    static ref CERTWATCH_DAYS_BEFORE_EXPIRED: Gauge =
        register_gauge!("certwatch_days_before_expired", "days before expiration").unwrap();
    static ref CERTWATCH_REVOCATION_STATUS: Gauge = register_gauge!(
        "certwatch_revocation_status",
        "leaf certificate revocation status"
    )
    .unwrap();
    static ref CERTWATCH_INSPECTION_STATUS: Gauge = register_gauge!(
        "certwatch_inspection_status",
        "overall inspection status"
    )
    .unwrap();
}

/// Pushes one gauge set per inspected host to a Prometheus Push Gateway.
/// # Arguments
/// * `results` - Completed inspection results
/// * `prometheus_address` - Push gateway base address
pub fn prometheus_metrics(results: &[InspectionResult], prometheus_address: &str) {
    for result in results {
        let leaf_days = result
            .chain
            .leaf()
            .map(|leaf| f64::from(leaf.validity_days))
            .unwrap_or(0.0);
        CERTWATCH_DAYS_BEFORE_EXPIRED.set(leaf_days);

        // 0 = No verdict, 1 = Good, 2 = Unknown, 3 = Revoked, 4 = Check failed
        let revocation_value = match result.leaf_verdict().map(|v| &v.status) {
            None => 0.0,
            Some(RevocationStatus::Good) => 1.0,
            Some(RevocationStatus::Unknown) => 2.0,
            Some(RevocationStatus::Revoked { .. }) => 3.0,
            Some(RevocationStatus::CheckFailed { .. }) => 4.0,
        };
        CERTWATCH_REVOCATION_STATUS.set(revocation_value);

        let status_value = match result.status {
            OverallStatus::Success => 0.0,
            OverallStatus::PartialFailure => 1.0,
            OverallStatus::Failure => 2.0,
        };
        CERTWATCH_INSPECTION_STATUS.set(status_value);

        let issuer = result
            .chain
            .leaf()
            .map(|leaf| leaf.issuer.organization.clone())
            .unwrap_or_default();

        let metric_families = prometheus::gather();
        let push_result = prometheus::push_metrics(
            "certwatch",
            labels! {
                "instance".to_owned() => "certwatch".to_owned(),
                "job".to_owned() => "certwatch".to_owned(),
                "host".to_owned() => result.hostname.to_owned(),
                "cipher".to_owned() => result.connection.cipher.to_owned(),
                "cipher_protocol_version".to_owned() => result.connection.protocol.to_owned(),
                "issuer".to_owned() => issuer,
                "expired".to_owned() => result.any_expired().to_string(),
                "revoked".to_owned() => result.any_revoked().to_string(),
            },
            &format!("{}/metrics/job", prometheus_address),
            metric_families,
            None,
        );

        if let Err(e) = push_result {
            log::warn!("failed to push metrics to prometheus: {}", e);
        }
    }
}
