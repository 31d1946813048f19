//! Structural and temporal chain validation.
//!
//! The validator reasons over already-parsed fields: validity windows
//! against the wall clock, issuer-to-subject linkage along the chain, and
//! hostname matching for the leaf. Each failure is a recorded flag, never an
//! abort; callers want full diagnostic detail even for an invalid chain.
//! Cryptographic signature-chain verification is delegated to the underlying
//! library and is out of scope here.

use serde::{Deserialize, Serialize};

use crate::cert::Certificate;
use crate::chain::Chain;

/// Non-fatal findings for one certificate in the chain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateFlags {
    pub expired: bool,
    pub not_yet_valid: bool,
    /// Issuer DN does not match the subject DN of the next chain element
    pub issuer_mismatch: bool,
}

impl CertificateFlags {
    pub fn is_clean(&self) -> bool {
        !self.expired && !self.not_yet_valid && !self.issuer_mismatch
    }
}

/// Validation summary for a fetched chain, ordered leaf to root.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Leaf SAN/CN matches the requested hostname
    pub hostname_matches: bool,
    /// Every issuer link along the chain holds
    pub linkage_intact: bool,
    pub certificates: Vec<CertificateFlags>,
}

impl ValidationReport {
    pub fn all_clean(&self) -> bool {
        self.hostname_matches
            && self.linkage_intact
            && self.certificates.iter().all(CertificateFlags::is_clean)
    }
}

/// Validates a chain against the requested hostname and the current time.
pub fn validate_chain(chain: &Chain, hostname: &str) -> ValidationReport {
    let certificates: Vec<CertificateFlags> = chain
        .certificates
        .iter()
        .enumerate()
        .map(|(index, cert)| CertificateFlags {
            expired: cert.is_expired,
            not_yet_valid: cert.is_not_yet_valid,
            issuer_mismatch: match chain.issuer_of(index) {
                Some(next) => cert.issuer != next.subject,
                // Nothing to compare for the last element
                None => false,
            },
        })
        .collect();

    let hostname_matches = chain
        .leaf()
        .map(|leaf| leaf_matches_hostname(leaf, hostname))
        .unwrap_or(false);

    let linkage_intact = certificates.iter().all(|flags| !flags.issuer_mismatch);

    ValidationReport {
        hostname_matches,
        linkage_intact,
        certificates,
    }
}

/// Checks the leaf's SANs first, then the subject CN.
pub fn leaf_matches_hostname(leaf: &Certificate, hostname: &str) -> bool {
    if leaf
        .sans
        .iter()
        .any(|san| hostname_matches(san, hostname))
    {
        return true;
    }
    !leaf.subject.common_name.is_empty() && hostname_matches(&leaf.subject.common_name, hostname)
}

/// Standard left-most-label wildcard rules: `*.example.com` matches
/// `a.example.com` but not `example.com` or `a.b.example.com`.
pub fn hostname_matches(pattern: &str, hostname: &str) -> bool {
    let pattern = pattern.trim_end_matches('.').to_ascii_lowercase();
    let hostname = hostname.trim_end_matches('.').to_ascii_lowercase();

    if let Some(suffix) = pattern.strip_prefix("*.") {
        match hostname.split_once('.') {
            Some((label, rest)) => !label.is_empty() && rest == suffix,
            None => false,
        }
    } else {
        pattern == hostname
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert::Name;

    fn cert(subject_cn: &str, issuer_cn: &str) -> Certificate {
        Certificate {
            subject: Name {
                common_name: subject_cn.to_string(),
                ..Name::default()
            },
            issuer: Name {
                common_name: issuer_cn.to_string(),
                ..Name::default()
            },
            ..Certificate::default()
        }
    }

    #[test]
    fn test_wildcard_matches_single_label() {
        assert!(hostname_matches("*.example.com", "mail.example.com"));
        assert!(hostname_matches("*.example.com", "a.example.com"));
    }

    #[test]
    fn test_wildcard_does_not_match_apex() {
        assert!(!hostname_matches("*.example.com", "example.com"));
    }

    #[test]
    fn test_wildcard_does_not_cross_labels() {
        assert!(!hostname_matches("*.example.com", "a.mail.example.com"));
    }

    #[test]
    fn test_exact_match_case_insensitive() {
        assert!(hostname_matches("Example.COM", "example.com"));
        assert!(!hostname_matches("example.com", "www.example.com"));
    }

    #[test]
    fn test_leaf_prefers_sans_over_cn() {
        let mut leaf = cert("wrong.example.net", "CA");
        leaf.sans = vec!["*.example.com".to_string()];
        assert!(leaf_matches_hostname(&leaf, "www.example.com"));
        assert!(!leaf_matches_hostname(&leaf, "example.com"));
    }

    #[test]
    fn test_leaf_falls_back_to_cn() {
        let leaf = cert("www.example.com", "CA");
        assert!(leaf_matches_hostname(&leaf, "www.example.com"));
    }

    #[test]
    fn test_linkage_intact() {
        let chain = Chain {
            certificates: vec![
                cert("www.example.com", "Intermediate"),
                cert("Intermediate", "Root"),
                cert("Root", "Root"),
            ],
        };
        let report = validate_chain(&chain, "www.example.com");
        assert!(report.linkage_intact);
        assert!(report.certificates.iter().all(|f| !f.issuer_mismatch));
        assert!(report.hostname_matches);
    }

    #[test]
    fn test_broken_linkage_flagged_not_fatal() {
        let chain = Chain {
            certificates: vec![
                cert("www.example.com", "Intermediate"),
                cert("SomeOtherCA", "Root"),
            ],
        };
        let report = validate_chain(&chain, "www.example.com");
        assert!(!report.linkage_intact);
        assert!(report.certificates[0].issuer_mismatch);
        assert!(!report.certificates[1].issuer_mismatch);
        // Validation still produced a full per-certificate report
        assert_eq!(report.certificates.len(), 2);
    }

    #[test]
    fn test_expired_certificate_flagged() {
        let mut leaf = cert("www.example.com", "Root");
        leaf.is_expired = true;
        let chain = Chain {
            certificates: vec![leaf],
        };
        let report = validate_chain(&chain, "www.example.com");
        assert!(report.certificates[0].expired);
        assert!(!report.all_clean());
    }
}
