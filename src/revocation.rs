//! Per-certificate revocation checking.
//!
//! For each non-root certificate the checker produces exactly one verdict.
//! OCSP is attempted first when enabled and the certificate names a
//! responder; on transport failure, timeout, or a malformed or non-successful
//! response it falls back to the CRL named in the certificate. An unreachable
//! channel never becomes `Good`: exhausting the channels without an answer
//! yields `Unknown`, and an error on the last enabled channel yields
//! `CheckFailed` with the cause. Verdicts are immutable once assigned.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use openssl::hash::MessageDigest;
use openssl::ocsp::{
    OcspCertId, OcspCertStatus, OcspRequest, OcspResponse, OcspResponseStatus, OcspRevokedStatus,
};
use openssl::x509::X509;
use serde::{Deserialize, Serialize};
use strum_macros::Display;
use x509_parser::prelude::*;

use crate::cert::Certificate;
use crate::config::GetterOptions;
use crate::crl_cache::{CrlCache, DEFAULT_CRL_CACHE};
use crate::error::InspectionError;

/// Which channel produced a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum RevocationChannel {
    /// Verdict came from the OCSP responder
    #[strum(serialize = "OCSP")]
    Ocsp,
    /// Verdict came from a downloaded CRL
    #[strum(serialize = "CRL")]
    Crl,
    /// No channel was available for this certificate
    #[strum(serialize = "no channel available")]
    Unavailable,
}

/// Terminal revocation state for one certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RevocationStatus {
    /// The channel affirmatively reported the certificate as not revoked
    Good,
    /// The channel reported the certificate revoked
    Revoked {
        reason: String,
        /// Revocation instant as reported by the channel, when present
        revoked_at: Option<String>,
    },
    /// No channel could say either way; never to be confused with Good
    Unknown,
    /// A channel was available but the check errored
    CheckFailed { cause: String },
}

/// One immutable verdict, tagged with its producing channel and the instant
/// the check completed (seconds since the Unix epoch).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevocationVerdict {
    pub status: RevocationStatus,
    pub channel: RevocationChannel,
    pub checked_at: u64,
}

impl RevocationVerdict {
    fn now(status: RevocationStatus, channel: RevocationChannel) -> RevocationVerdict {
        RevocationVerdict {
            status,
            channel,
            checked_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
        }
    }

    pub fn is_definitive(&self) -> bool {
        matches!(
            self.status,
            RevocationStatus::Good | RevocationStatus::Revoked { .. }
        )
    }
}

/// Runs the OCSP-then-CRL state machine for individual certificates.
///
/// Cloneable so per-certificate checks can fan out across threads; clones
/// share the HTTP client and the CRL cache.
#[derive(Clone)]
pub struct RevocationChecker {
    check_ocsp: bool,
    check_crl: bool,
    timeout: Duration,
    client: reqwest::blocking::Client,
    cache: Arc<CrlCache>,
}

impl RevocationChecker {
    /// Builds a checker backed by the process-wide CRL cache.
    pub fn new(options: &GetterOptions) -> Result<RevocationChecker, InspectionError> {
        Self::with_cache(options, Arc::clone(&DEFAULT_CRL_CACHE))
    }

    /// Builds a checker around an injected cache (tests substitute a fresh
    /// instance to keep runs deterministic).
    pub fn with_cache(
        options: &GetterOptions,
        cache: Arc<CrlCache>,
    ) -> Result<RevocationChecker, InspectionError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(options.timeout())
            .build()?;
        Ok(RevocationChecker {
            check_ocsp: options.check_ocsp,
            check_crl: options.check_crl,
            timeout: options.timeout(),
            client,
            cache,
        })
    }

    /// Produces the single verdict for `cert`.
    ///
    /// `issuer` is the next certificate in the chain when the server sent
    /// it; OCSP needs it for the issuer name/key hashes, so a leaf-only
    /// chain skips straight to the CRL path.
    pub fn check(&self, cert: &Certificate, issuer: Option<&Certificate>) -> RevocationVerdict {
        let mut ocsp_failure: Option<String> = None;

        if self.check_ocsp {
            if let (Some(url), Some(issuer)) = (&cert.ocsp_responder, issuer) {
                match self.query_ocsp(cert, issuer, url) {
                    Ok(status) => {
                        return RevocationVerdict::now(status, RevocationChannel::Ocsp);
                    }
                    Err(e) => {
                        log::debug!(
                            "OCSP check via {} failed ({}), falling back to CRL",
                            url,
                            e
                        );
                        ocsp_failure = Some(e.to_string());
                    }
                }
            }
        }

        if self.check_crl {
            if let Some(url) = &cert.crl_distribution_point {
                return match self.query_crl(cert, url) {
                    Ok(status) => RevocationVerdict::now(status, RevocationChannel::Crl),
                    Err(e) => RevocationVerdict::now(
                        RevocationStatus::CheckFailed {
                            cause: e.to_string(),
                        },
                        RevocationChannel::Crl,
                    ),
                };
            }
        }

        // A failed OCSP attempt is a failed check only when it was the sole
        // enabled channel. With CRL checking on but no distribution point to
        // fall back to, no usable channel remained, which is merely unknown.
        match ocsp_failure {
            Some(cause) if !self.check_crl => RevocationVerdict::now(
                RevocationStatus::CheckFailed { cause },
                RevocationChannel::Ocsp,
            ),
            _ => RevocationVerdict::now(
                RevocationStatus::Unknown,
                RevocationChannel::Unavailable,
            ),
        }
    }

    /// Builds an OCSP request (issuer name hash, issuer key hash, serial),
    /// POSTs it to the responder, and maps the response.
    fn query_ocsp(
        &self,
        cert: &Certificate,
        issuer: &Certificate,
        url: &str,
    ) -> Result<RevocationStatus, InspectionError> {
        let subject = X509::from_der(&cert.der)?;
        let issuer = X509::from_der(&issuer.der)?;

        let cert_id = OcspCertId::from_cert(MessageDigest::sha1(), &subject, &issuer)?;
        let mut request = OcspRequest::new()?;
        request.add_id(cert_id)?;
        let body = request.to_der()?;

        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/ocsp-request")
            .body(body)
            .send()?;
        if !response.status().is_success() {
            return Err(InspectionError::connection(format!(
                "OCSP responder {} returned HTTP {}",
                url,
                response.status()
            )));
        }
        let bytes = response.bytes()?;

        let ocsp_response = OcspResponse::from_der(&bytes)?;
        let response_status = ocsp_response.status();
        if response_status != OcspResponseStatus::SUCCESSFUL {
            return Err(InspectionError::crypto(format!(
                "OCSP responder status: {}",
                describe_response_status(response_status)
            )));
        }

        let basic = ocsp_response.basic()?;
        // find_status needs its own id; the first one moved into the request
        let lookup_id = OcspCertId::from_cert(MessageDigest::sha1(), &subject, &issuer)?;
        let status = basic.find_status(&lookup_id).ok_or_else(|| {
            InspectionError::crypto("OCSP response carries no status for this certificate")
        })?;

        if status.status == OcspCertStatus::GOOD {
            Ok(RevocationStatus::Good)
        } else if status.status == OcspCertStatus::REVOKED {
            Ok(RevocationStatus::Revoked {
                reason: describe_revocation_reason(status.reason),
                revoked_at: status.revocation_time.map(|t| t.to_string()),
            })
        } else {
            Ok(RevocationStatus::Unknown)
        }
    }

    /// Fetches the CRL through the coalescing cache and scans its revoked
    /// entries for the certificate's serial number.
    fn query_crl(&self, cert: &Certificate, url: &str) -> Result<RevocationStatus, InspectionError> {
        let bytes = self
            .cache
            .lookup_or_fetch(url, || self.fetch_crl(url))?;

        let (_, crl) = CertificateRevocationList::from_der(&bytes)
            .map_err(|e| InspectionError::crypto(format!("CRL parse failed: {:?}", e)))?;

        let (_, parsed) = X509Certificate::from_der(&cert.der)
            .map_err(|e| InspectionError::crypto(format!("certificate parse failed: {:?}", e)))?;
        let serial = &parsed.serial;

        for revoked in crl.iter_revoked_certificates() {
            if &revoked.user_certificate == serial {
                let reason = revoked
                    .reason_code()
                    .map(|(_, code)| code.to_string())
                    .unwrap_or_else(|| "unspecified".to_string());
                return Ok(RevocationStatus::Revoked {
                    reason,
                    revoked_at: Some(revoked.revocation_date.to_string()),
                });
            }
        }

        Ok(RevocationStatus::Good)
    }

    /// HTTP GET of the CRL plus its expiry instant for the cache.
    fn fetch_crl(
        &self,
        url: &str,
    ) -> Result<(Vec<u8>, Option<SystemTime>), InspectionError> {
        let response = self.client.get(url).send()?;
        if !response.status().is_success() {
            return Err(InspectionError::connection(format!(
                "CRL fetch from {} returned HTTP {}",
                url,
                response.status()
            )));
        }
        let bytes = response.bytes()?.to_vec();

        // Never cache past the CRL's own nextUpdate
        let (_, crl) = CertificateRevocationList::from_der(&bytes)
            .map_err(|e| InspectionError::crypto(format!("CRL parse failed: {:?}", e)))?;
        let expires_at = crl
            .next_update()
            .map(|t| UNIX_EPOCH + Duration::from_secs(t.timestamp().max(0) as u64))
            .or_else(|| {
                // Responder gave no nextUpdate; apply a conservative bound
                Some(SystemTime::now() + self.timeout.max(Duration::from_secs(3600)))
            });

        Ok((bytes, expires_at))
    }
}

fn describe_response_status(status: OcspResponseStatus) -> &'static str {
    // RFC 6960 §4.2.1 OCSPResponseStatus
    if status == OcspResponseStatus::SUCCESSFUL {
        "successful"
    } else if status == OcspResponseStatus::MALFORMED_REQUEST {
        "malformedRequest"
    } else if status == OcspResponseStatus::INTERNAL_ERROR {
        "internalError"
    } else if status == OcspResponseStatus::TRY_LATER {
        "tryLater"
    } else if status == OcspResponseStatus::SIG_REQUIRED {
        "sigRequired"
    } else if status == OcspResponseStatus::UNAUTHORIZED {
        "unauthorized"
    } else {
        "unrecognized"
    }
}

fn describe_revocation_reason(reason: OcspRevokedStatus) -> String {
    // RFC 5280 §5.3.1 CRLReason
    let text = if reason == OcspRevokedStatus::UNSPECIFIED {
        "unspecified"
    } else if reason == OcspRevokedStatus::KEY_COMPROMISE {
        "keyCompromise"
    } else if reason == OcspRevokedStatus::CA_COMPROMISE {
        "cACompromise"
    } else if reason == OcspRevokedStatus::AFFILIATION_CHANGED {
        "affiliationChanged"
    } else if reason == OcspRevokedStatus::STATUS_SUPERSEDED {
        "superseded"
    } else if reason == OcspRevokedStatus::STATUS_CESSATION_OF_OPERATION {
        "cessationOfOperation"
    } else if reason == OcspRevokedStatus::STATUS_CERTIFICATE_HOLD {
        "certificateHold"
    } else if reason == OcspRevokedStatus::REMOVE_FROM_CRL {
        "removeFromCRL"
    } else {
        "noStatus"
    };
    text.to_string()
}
