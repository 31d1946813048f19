//! Error types for TLS inspection.
//!
//! Exactly three error kinds cross the crate boundary: connection problems,
//! cryptographic/parsing problems, and invalid caller input. Everything else
//! is recovered internally into per-certificate verdicts.

use std::fmt;
use std::io;

use serde::{Deserialize, Serialize};
use strum_macros::Display;

/// Coarse classification of an [`InspectionError`], suitable for
/// serialization into an inspection result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum ErrorKind {
    /// DNS, socket, or TLS handshake failure; also a peer that completes a
    /// handshake without presenting any certificate.
    Connection,
    /// Failure inside the cryptographic/DER layer (openssl or x509-parser).
    Crypto,
    /// Malformed hostname, out-of-range port, or unparsable cipher string.
    /// Detected before any network I/O.
    InvalidParameter,
}

/// Error type for TLS inspection failures.
///
/// Parameter and connection errors are fatal to an inspection run and
/// surface immediately. Crypto errors abort the run only when the chain
/// itself cannot be parsed; inside a revocation check they degrade to that
/// certificate's `CheckFailed` verdict instead.
#[derive(Debug)]
pub enum InspectionError {
    /// DNS resolution, TCP connect, or TLS handshake failed, or the peer
    /// presented no certificate.
    Connection {
        /// What failed, including the address where relevant
        details: String,
    },

    /// The cryptographic library rejected an artifact (certificate, OCSP
    /// response, or CRL).
    Crypto {
        /// Description of the parse or library failure
        details: String,
    },

    /// Invalid input provided to the API.
    InvalidParameter {
        /// Which field/parameter was invalid
        field: String,
        /// Why it was invalid
        reason: String,
    },
}

impl InspectionError {
    /// Classifies this error into its public [`ErrorKind`].
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Connection { .. } => ErrorKind::Connection,
            Self::Crypto { .. } => ErrorKind::Crypto,
            Self::InvalidParameter { .. } => ErrorKind::InvalidParameter,
        }
    }

    pub(crate) fn connection(details: impl Into<String>) -> Self {
        Self::Connection {
            details: details.into(),
        }
    }

    pub(crate) fn crypto(details: impl Into<String>) -> Self {
        Self::Crypto {
            details: details.into(),
        }
    }

    pub(crate) fn invalid_parameter(
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidParameter {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for InspectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection { details } => {
                write!(f, "Connection failed: {}", details)
            }
            Self::Crypto { details } => {
                write!(f, "Crypto error: {}", details)
            }
            Self::InvalidParameter { field, reason } => {
                write!(f, "Invalid parameter '{}': {}", field, reason)
            }
        }
    }
}

impl std::error::Error for InspectionError {}

impl From<io::Error> for InspectionError {
    fn from(e: io::Error) -> Self {
        Self::Connection {
            details: e.to_string(),
        }
    }
}

impl From<openssl::error::ErrorStack> for InspectionError {
    fn from(e: openssl::error::ErrorStack) -> Self {
        Self::Crypto {
            details: e.to_string(),
        }
    }
}

impl From<reqwest::Error> for InspectionError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Connection {
                details: format!("request timed out: {}", e),
            }
        } else {
            Self::Connection {
                details: e.to_string(),
            }
        }
    }
}

impl<S: std::fmt::Debug> From<openssl::ssl::HandshakeError<S>> for InspectionError {
    fn from(e: openssl::ssl::HandshakeError<S>) -> Self {
        Self::Connection {
            details: format!("TLS handshake failed: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = InspectionError::invalid_parameter("hostname", "cannot be empty");
        assert_eq!(
            err.to_string(),
            "Invalid parameter 'hostname': cannot be empty"
        );
    }

    #[test]
    fn test_error_kind_mapping() {
        assert_eq!(
            InspectionError::connection("refused").kind(),
            ErrorKind::Connection
        );
        assert_eq!(
            InspectionError::crypto("bad ASN.1").kind(),
            ErrorKind::Crypto
        );
        assert_eq!(
            InspectionError::invalid_parameter("port", "0").kind(),
            ErrorKind::InvalidParameter
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::ConnectionRefused, "refused");
        let err: InspectionError = io_err.into();
        assert_eq!(err.kind(), ErrorKind::Connection);
    }

    #[test]
    fn test_error_kind_display() {
        assert_eq!(ErrorKind::InvalidParameter.to_string(), "InvalidParameter");
    }
}
