//! Inspection orchestration.
//!
//! One inspection run: validate parameters, perform the handshake, validate
//! the chain, fan revocation checks out across threads (one per
//! certificate), and fold everything into a single immutable
//! [`InspectionResult`]. Server-info collection runs concurrently with the
//! revocation fan-out and never blocks it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use strum_macros::Display;

use crate::chain::{validate_target, Chain, ChainFetcher, ConnectionInfo, FetchedChain, TlsEngine};
use crate::config::GetterOptions;
use crate::crl_cache::{CrlCache, DEFAULT_CRL_CACHE};
use crate::error::{ErrorKind, InspectionError};
use crate::revocation::{RevocationChannel, RevocationChecker, RevocationStatus, RevocationVerdict};
use crate::server_info::{self, ServerInfo};
use crate::validate::{validate_chain, ValidationReport};

/// Caller-initiated cancellation for an in-flight inspection.
///
/// Cancellation is observed between network phases; every individual network
/// call is already bounded by the configured timeout, so a cancelled run
/// settles promptly. A cancelled run reports [`InspectionOutcome::Cancelled`]
/// and never a partial result.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> CancelToken {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Terminal state of one inspection run.
#[derive(Debug)]
pub enum InspectionOutcome {
    Completed(InspectionResult),
    /// The caller cancelled the run; no partial result exists
    Cancelled,
}

impl InspectionOutcome {
    pub fn completed(self) -> Option<InspectionResult> {
        match self {
            InspectionOutcome::Completed(result) => Some(result),
            InspectionOutcome::Cancelled => None,
        }
    }
}

/// Overall classification of a completed inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum OverallStatus {
    /// Chain fetched and every enabled check produced a definitive verdict
    Success,
    /// Chain fetched but at least one check failed or came back Unknown
    PartialFailure,
    /// The chain could not be fetched at all
    Failure,
}

/// A revocation verdict pinned to its certificate's position in the chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateVerdict {
    /// Index into the chain, leaf = 0
    pub index: usize,
    /// Serial of the checked certificate
    pub serial: String,
    pub verdict: RevocationVerdict,
}

/// Immutable point-in-time snapshot of one inspection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InspectionResult {
    pub hostname: String,
    pub port: u16,
    pub chain: Chain,
    pub validation: ValidationReport,
    /// Ordered leaf-to-root; trust anchors carry no verdict
    pub verdicts: Vec<CertificateVerdict>,
    pub connection: ConnectionInfo,
    pub server_info: Option<ServerInfo>,
    pub status: OverallStatus,
    /// Set when status is not Success and a specific kind is known
    pub error: Option<ErrorKind>,
}

impl Default for OverallStatus {
    fn default() -> Self {
        OverallStatus::Failure
    }
}

impl InspectionResult {
    fn aggregate(
        hostname: &str,
        port: u16,
        fetched: FetchedChain,
        validation: ValidationReport,
        verdicts: Vec<CertificateVerdict>,
        server_info: Option<ServerInfo>,
    ) -> InspectionResult {
        let status = if verdicts.iter().all(|v| v.verdict.is_definitive()) {
            OverallStatus::Success
        } else {
            OverallStatus::PartialFailure
        };

        InspectionResult {
            hostname: hostname.to_string(),
            port,
            chain: fetched.chain,
            validation,
            verdicts,
            connection: fetched.connection,
            server_info,
            status,
            error: None,
        }
    }

    /// A snapshot for a run where no chain could be fetched, carrying the
    /// specific error kind. Used by callers that render failures alongside
    /// completed results.
    pub fn failed(hostname: &str, port: u16, kind: ErrorKind) -> InspectionResult {
        InspectionResult {
            hostname: hostname.to_string(),
            port,
            status: OverallStatus::Failure,
            error: Some(kind),
            ..InspectionResult::default()
        }
    }

    /// The leaf certificate's verdict, when one was produced.
    pub fn leaf_verdict(&self) -> Option<&RevocationVerdict> {
        self.verdicts
            .iter()
            .find(|v| v.index == 0)
            .map(|v| &v.verdict)
    }

    /// True when any certificate in the chain was reported revoked.
    pub fn any_revoked(&self) -> bool {
        self.verdicts
            .iter()
            .any(|v| matches!(v.verdict.status, RevocationStatus::Revoked { .. }))
    }

    /// True when any certificate in the chain is outside its validity window.
    pub fn any_expired(&self) -> bool {
        self.chain
            .certificates
            .iter()
            .any(|c| c.is_expired || c.is_not_yet_valid)
    }
}

/// Entry point for inspection runs: owns the options, the engine-backed
/// fetcher, and the CRL cache shared by all runs.
pub struct Inspector {
    options: GetterOptions,
    fetcher: ChainFetcher,
    cache: Arc<CrlCache>,
}

impl Inspector {
    /// Builds an inspector using the engine selected in `options` and the
    /// process-wide CRL cache.
    pub fn new(options: GetterOptions) -> Inspector {
        let fetcher = ChainFetcher::new(options.engine);
        Inspector {
            options,
            fetcher,
            cache: Arc::clone(&DEFAULT_CRL_CACHE),
        }
    }

    /// Builds an inspector around an injected engine; tests use this to run
    /// without a network.
    pub fn with_engine(options: GetterOptions, engine: Box<dyn TlsEngine>) -> Inspector {
        Inspector {
            options,
            fetcher: ChainFetcher::with_engine(engine),
            cache: Arc::clone(&DEFAULT_CRL_CACHE),
        }
    }

    /// Substitutes the CRL cache, detaching this inspector from the
    /// process-wide instance.
    pub fn with_cache(mut self, cache: Arc<CrlCache>) -> Inspector {
        self.cache = cache;
        self
    }

    /// Runs one inspection to completion.
    pub fn inspect(&self, host: &str, port: u16) -> Result<InspectionOutcome, InspectionError> {
        self.inspect_with_token(host, port, &CancelToken::new())
    }

    /// Runs one inspection, checking `token` between phases.
    pub fn inspect_with_token(
        &self,
        host: &str,
        port: u16,
        token: &CancelToken,
    ) -> Result<InspectionOutcome, InspectionError> {
        validate_target(host, port)?;
        if token.is_cancelled() {
            return Ok(InspectionOutcome::Cancelled);
        }

        // Server info is independent of the chain work; start it first so it
        // overlaps the handshake and the revocation fan-out
        let server_info_handle = if self.options.query_server_info {
            let host = host.to_string();
            let timeout = self.options.timeout();
            Some(thread::spawn(move || {
                server_info::collect(&host, port, timeout)
            }))
        } else {
            None
        };

        let fetched = self.fetcher.fetch(host, port, &self.options)?;
        log::debug!(
            "fetched {} certificate(s) from {}:{} over {}",
            fetched.chain.len(),
            host,
            port,
            fetched.connection.protocol
        );
        if token.is_cancelled() {
            return Ok(InspectionOutcome::Cancelled);
        }

        let validation = validate_chain(&fetched.chain, host);

        let checker = RevocationChecker::with_cache(&self.options, Arc::clone(&self.cache))?;
        let verdicts = self.run_revocation_checks(&fetched.chain, checker);

        if token.is_cancelled() {
            return Ok(InspectionOutcome::Cancelled);
        }

        let server_info = server_info_handle.and_then(|handle| handle.join().unwrap_or(None));

        Ok(InspectionOutcome::Completed(InspectionResult::aggregate(
            host,
            port,
            fetched,
            validation,
            verdicts,
            server_info,
        )))
    }

    /// Fans per-certificate checks out on threads and fans the verdicts back
    /// in over a channel. One deadline governs the whole fan-out; checks
    /// that miss it are recorded as failed rather than stalling the run.
    fn run_revocation_checks(
        &self,
        chain: &Chain,
        checker: RevocationChecker,
    ) -> Vec<CertificateVerdict> {
        // Roots are trust anchors and carry no verdict
        let targets: Vec<(usize, String)> = chain
            .certificates
            .iter()
            .enumerate()
            .filter(|(_, cert)| !cert.is_self_signed())
            .map(|(index, cert)| (index, cert.serial.clone()))
            .collect();

        let (sender, receiver) = mpsc::channel();
        for (index, _) in &targets {
            let index = *index;
            let sender = sender.clone();
            let checker = checker.clone();
            let cert = chain.certificates[index].clone();
            let issuer = chain.issuer_of(index).cloned();
            thread::spawn(move || {
                let verdict = checker.check(&cert, issuer.as_ref());
                // Receiver may have given up on the deadline already
                let _ = sender.send((index, verdict));
            });
        }
        drop(sender);

        let deadline = Instant::now() + self.options.timeout() + Duration::from_secs(2);
        let mut collected: HashMap<usize, RevocationVerdict> = HashMap::new();
        while collected.len() < targets.len() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match receiver.recv_timeout(remaining) {
                Ok((index, verdict)) => {
                    collected.insert(index, verdict);
                }
                Err(_) => break,
            }
        }

        // Leaf-to-root order regardless of completion order
        targets
            .into_iter()
            .map(|(index, serial)| {
                let verdict = collected.remove(&index).unwrap_or_else(|| RevocationVerdict {
                    status: RevocationStatus::CheckFailed {
                        cause: "revocation check missed the inspection deadline".to_string(),
                    },
                    channel: RevocationChannel::Unavailable,
                    checked_at: 0,
                });
                CertificateVerdict {
                    index,
                    serial,
                    verdict,
                }
            })
            .collect()
    }
}
