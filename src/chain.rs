//! Certificate chain acquisition.
//!
//! The fetcher's job is acquisition, not judgment: it performs a TLS
//! handshake with verification disabled so that self-signed or expired
//! chains still come back for inspection. Trust evaluation belongs to
//! [`crate::validate`].

use std::net::{TcpStream, ToSocketAddrs};

use openssl::ssl::{Ssl, SslContext, SslMethod, SslVerifyMode};
use serde::{Deserialize, Serialize};

use crate::cert::Certificate;
use crate::config::{EngineKind, GetterOptions};
use crate::error::InspectionError;

/// Ordered certificate sequence, leaf first, root (or deepest intermediate
/// the server sent) last. May be incomplete if the server omits
/// intermediates; the validator flags broken linkage rather than failing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Chain {
    pub certificates: Vec<Certificate>,
}

impl Chain {
    pub fn leaf(&self) -> Option<&Certificate> {
        self.certificates.first()
    }

    pub fn len(&self) -> usize {
        self.certificates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.certificates.is_empty()
    }

    /// The issuer of the certificate at `index`, when the server sent it.
    pub fn issuer_of(&self, index: usize) -> Option<&Certificate> {
        self.certificates.get(index + 1)
    }
}

/// Connection metadata captured once at handshake completion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionInfo {
    /// Negotiated protocol version, e.g. "TLSv1.3"
    pub protocol: String,
    /// Negotiated cipher suite name
    pub cipher: String,
    /// Peer socket address in human-readable form (IPv4 or IPv6)
    pub peer_address: String,
}

/// What an engine hands back after a successful handshake.
#[derive(Debug, Clone)]
pub struct FetchedChain {
    pub chain: Chain,
    pub connection: ConnectionInfo,
}

/// Handshake backend seam. Selected at configuration time via
/// [`EngineKind`]; tests inject deterministic fakes through the same trait.
pub trait TlsEngine: Send + Sync {
    fn fetch(
        &self,
        host: &str,
        port: u16,
        options: &GetterOptions,
    ) -> Result<FetchedChain, InspectionError>;
}

/// The OpenSSL-backed production engine.
pub struct OpensslEngine;

impl TlsEngine for OpensslEngine {
    fn fetch(
        &self,
        host: &str,
        port: u16,
        options: &GetterOptions,
    ) -> Result<FetchedChain, InspectionError> {
        let timeout = options.timeout();

        let mut builder = SslContext::builder(SslMethod::tls())?;
        builder.set_verify(SslVerifyMode::NONE);
        if let Some(ciphers) = &options.ciphers {
            builder.set_cipher_list(ciphers).map_err(|e| {
                InspectionError::invalid_parameter("ciphers", e.to_string())
            })?;
        }
        let context = builder.build();

        let mut ssl = Ssl::new(&context)?;
        ssl.set_hostname(host)?;

        // IPv6 literals need brackets for socket-address resolution
        let remote = if host.contains(':') {
            format!("[{}]:{}", host, port)
        } else {
            format!("{}:{}", host, port)
        };
        let socket_addr = remote
            .to_socket_addrs()
            .map_err(|e| {
                InspectionError::connection(format!("failed to resolve {}: {}", host, e))
            })?
            .next()
            .ok_or_else(|| {
                InspectionError::connection(format!("no addresses found for {}", host))
            })?;

        let tcp_stream = TcpStream::connect_timeout(&socket_addr, timeout).map_err(|e| {
            InspectionError::connection(format!("connect to {} failed: {}", remote, e))
        })?;
        tcp_stream.set_read_timeout(Some(timeout))?;
        tcp_stream.set_write_timeout(Some(timeout))?;

        let peer_address = peer_address(&tcp_stream)?;

        let stream = ssl.connect(tcp_stream)?;
        let ssl_ref = stream.ssl();

        let connection = ConnectionInfo {
            protocol: ssl_ref.version_str().to_string(),
            cipher: ssl_ref
                .current_cipher()
                .map(|c| c.name().to_string())
                .unwrap_or_default(),
            peer_address,
        };

        let peer_chain = ssl_ref.peer_cert_chain().ok_or_else(|| {
            InspectionError::connection(format!("{} presented no certificate chain", host))
        })?;

        let mut certificates = Vec::with_capacity(peer_chain.len());
        for x509 in peer_chain {
            certificates.push(Certificate::from_x509(x509)?);
        }

        // A completed handshake with zero certificates is malformed server
        // behavior, not an empty result.
        if certificates.is_empty() {
            return Err(InspectionError::connection(format!(
                "{} completed handshake without presenting certificates",
                host
            )));
        }

        Ok(FetchedChain {
            chain: Chain { certificates },
            connection,
        })
    }
}

/// Validates parameters, then delegates acquisition to the selected engine.
pub struct ChainFetcher {
    engine: Box<dyn TlsEngine>,
}

impl ChainFetcher {
    pub fn new(kind: EngineKind) -> ChainFetcher {
        match kind {
            EngineKind::OpenSsl => ChainFetcher {
                engine: Box::new(OpensslEngine),
            },
        }
    }

    /// Builds a fetcher around an arbitrary engine (tests use this to avoid
    /// the network).
    pub fn with_engine(engine: Box<dyn TlsEngine>) -> ChainFetcher {
        ChainFetcher { engine }
    }

    /// Fetches the chain for `host:port`, failing fast with
    /// `InvalidParameter` before any network I/O when inputs are malformed.
    pub fn fetch(
        &self,
        host: &str,
        port: u16,
        options: &GetterOptions,
    ) -> Result<FetchedChain, InspectionError> {
        validate_target(host, port)?;
        self.engine.fetch(host, port, options)
    }
}

pub(crate) fn validate_target(host: &str, port: u16) -> Result<(), InspectionError> {
    if host.trim().is_empty() {
        return Err(InspectionError::invalid_parameter(
            "hostname",
            "cannot be empty",
        ));
    }
    if host.contains(' ') || host.contains('/') {
        return Err(InspectionError::invalid_parameter(
            "hostname",
            "must be a bare host name",
        ));
    }
    if port == 0 {
        return Err(InspectionError::invalid_parameter(
            "port",
            "must be in range 1-65535",
        ));
    }
    Ok(())
}

/// Resolves the peer's human-readable network address for a live socket.
/// Address-family aware: IPv6 peers render in bracketed `[addr]:port` form
/// via the standard library's `SocketAddr` display.
pub fn peer_address(stream: &TcpStream) -> Result<String, InspectionError> {
    let addr = stream.peer_addr().map_err(|e| {
        InspectionError::connection(format!("peer address unavailable: {}", e))
    })?;
    Ok(addr.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_hostname_rejected() {
        let err = validate_target("", 443).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidParameter);

        let err = validate_target("   ", 443).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidParameter);
    }

    #[test]
    fn test_port_zero_rejected() {
        let err = validate_target("example.com", 0).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidParameter);
    }

    #[test]
    fn test_hostname_with_path_rejected() {
        assert!(validate_target("example.com/path", 443).is_err());
        assert!(validate_target("bad host", 443).is_err());
    }

    #[test]
    fn test_valid_target_accepted() {
        assert!(validate_target("example.com", 443).is_ok());
        assert!(validate_target("example.com", 65535).is_ok());
    }

    #[test]
    fn test_chain_accessors() {
        let chain = Chain {
            certificates: vec![Certificate::default(), Certificate::default()],
        };
        assert_eq!(chain.len(), 2);
        assert!(chain.leaf().is_some());
        assert!(chain.issuer_of(0).is_some());
        assert!(chain.issuer_of(1).is_none());
    }
}
