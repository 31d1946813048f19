//! certwatch inspects the TLS identity of a remote host.
//!
//! It connects to a server, extracts the presented certificate chain,
//! classifies trust and expiry, and determines whether any certificate in
//! the chain has been revoked via OCSP (preferred) or CRL (fallback). It can
//! optionally gather coarse HTTP server metadata alongside.
//!
//! # Example
//!
//! ```no_run
//! use certwatch::{GetterOptions, InspectionOutcome, Inspector};
//!
//! # fn main() -> Result<(), certwatch::InspectionError> {
//! let inspector = Inspector::new(GetterOptions::default());
//! if let InspectionOutcome::Completed(result) = inspector.inspect("example.com", 443)? {
//!     println!("{}: {}", result.hostname, result.status);
//!     for entry in &result.verdicts {
//!         println!("  #{} {:?} via {}", entry.index, entry.verdict.status, entry.verdict.channel);
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Guarantees
//!
//! The checker never treats an unreachable revocation channel as "good": an
//! unreachable OCSP responder with no CRL fallback yields `Unknown`, and a
//! channel that errored yields `CheckFailed`, so callers can always
//! distinguish "could not verify" from "verified good".

pub mod cert;
pub mod chain;
pub mod config;
pub mod crl_cache;
pub mod error;
pub mod inspect;
pub mod metrics;
pub mod revocation;
pub mod server_info;
pub mod validate;

pub use cert::{Certificate, Name, PublicKey};
pub use chain::{Chain, ChainFetcher, ConnectionInfo, FetchedChain, OpensslEngine, TlsEngine};
pub use config::{Config, EngineKind, GetterOptions};
pub use crl_cache::CrlCache;
pub use error::{ErrorKind, InspectionError};
pub use inspect::{
    CancelToken, CertificateVerdict, InspectionOutcome, InspectionResult, Inspector, OverallStatus,
};
pub use revocation::{RevocationChannel, RevocationChecker, RevocationStatus, RevocationVerdict};
pub use server_info::ServerInfo;
pub use validate::{hostname_matches, validate_chain, CertificateFlags, ValidationReport};
