//! Configuration management for certwatch.
//!
//! This module carries two things: the per-inspection [`GetterOptions`]
//! consumed by the core engine, and the [`Config`] file/CLI layer used by the
//! command-line binary. Settings merge with clear precedence rules.
//!
//! # Configuration Precedence
//!
//! 1. Default values (lowest priority)
//! 2. Configuration file (certwatch.toml or specified with --config)
//! 3. Command-line arguments (highest priority)
//!
//! # Example Configuration File
//!
//! ```toml
//! hosts = ["example.com", "example.com:8443"]
//! output = "summary"
//! exit_code = 1
//! check_ocsp = true
//! check_crl = true
//! query_server_info = false
//! timeout_secs = 10
//!
//! [prometheus]
//! enabled = true
//! address = "http://localhost:9091"
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Which TLS backend performs the handshake.
///
/// Selection happens at configuration time; the engine is injected into the
/// chain fetcher behind the [`crate::chain::TlsEngine`] trait, never picked
/// by runtime type inspection. OpenSSL is the only production backend.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    #[default]
    OpenSsl,
}

/// Read-only options consumed at the start of an inspection run.
///
/// The core never alters these during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetterOptions {
    /// Collect HTTP server metadata (banner, headers) alongside the chain
    pub query_server_info: bool,
    /// Query the OCSP responder named in each certificate
    pub check_ocsp: bool,
    /// Download and consult CRLs as the revocation fallback
    pub check_crl: bool,
    /// Handshake backend selector
    pub engine: EngineKind,
    /// Optional OpenSSL cipher-list override string
    pub ciphers: Option<String>,
    /// Bound on each network operation (handshake, OCSP, CRL fetch), seconds
    pub timeout_secs: u64,
}

impl Default for GetterOptions {
    fn default() -> Self {
        GetterOptions {
            query_server_info: false,
            check_ocsp: true,
            check_crl: true,
            engine: EngineKind::OpenSsl,
            ciphers: None,
            timeout_secs: 10,
        }
    }
}

impl GetterOptions {
    /// Per-operation network deadline.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Main configuration structure for the certwatch binary.
///
/// All fields are optional to support partial configuration and merging.
/// Missing values will be filled in by defaults or overridden by CLI
/// arguments.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// List of hosts to check
    pub hosts: Option<Vec<String>>,
    /// Output format: json, text, summary
    pub output: Option<String>,
    /// Exit code to use when certificates are expired/revoked
    pub exit_code: Option<i32>,
    /// Query the OCSP responder for each certificate
    pub check_ocsp: Option<bool>,
    /// Download and consult CRLs
    pub check_crl: Option<bool>,
    /// Collect HTTP server metadata
    pub query_server_info: Option<bool>,
    /// OpenSSL cipher-list override
    pub ciphers: Option<String>,
    /// Network timeout in seconds
    pub timeout_secs: Option<u64>,
    /// Prometheus configuration
    pub prometheus: Option<PrometheusConfig>,
}

/// Prometheus integration configuration.
///
/// Controls whether metrics are pushed to a Prometheus Push Gateway
/// and specifies the gateway address.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PrometheusConfig {
    /// Enable prometheus metrics pushing
    pub enabled: Option<bool>,
    /// Prometheus push gateway address (e.g., "http://localhost:9091")
    pub address: Option<String>,
}

impl Config {
    /// Loads configuration from a TOML file.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the TOML configuration file
    ///
    /// # Returns
    ///
    /// * `Ok(Config)` - Successfully parsed configuration
    /// * `Err(ConfigError::Io)` - File could not be read
    /// * `Err(ConfigError::Parse)` - File contains invalid TOML
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content =
            fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io(e.to_string()))?;

        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;

        Ok(config)
    }

    /// Creates a default configuration with sensible defaults.
    ///
    /// # Default Values
    ///
    /// - `hosts`: None (must be provided)
    /// - `output`: "summary"
    /// - `exit_code`: 0 (don't fail on expired certificates)
    /// - `check_ocsp` / `check_crl`: true
    /// - `query_server_info`: false
    /// - `timeout_secs`: 10
    /// - `prometheus.enabled`: false
    pub fn default() -> Self {
        let opts = GetterOptions::default();
        Config {
            hosts: None,
            output: Some("summary".to_string()),
            exit_code: Some(0),
            check_ocsp: Some(opts.check_ocsp),
            check_crl: Some(opts.check_crl),
            query_server_info: Some(opts.query_server_info),
            ciphers: None,
            timeout_secs: Some(opts.timeout_secs),
            prometheus: Some(PrometheusConfig {
                enabled: Some(false),
                address: Some("http://localhost:9091".to_string()),
            }),
        }
    }

    /// Merges this configuration with another, prioritizing the other's values.
    ///
    /// For each field, if the `other` config has a value (Some), it overrides
    /// this config's value. If the `other` value is None, keeps the current value.
    pub fn merge_with(mut self, other: Config) -> Self {
        if other.hosts.is_some() {
            self.hosts = other.hosts;
        }
        if other.output.is_some() {
            self.output = other.output;
        }
        if other.exit_code.is_some() {
            self.exit_code = other.exit_code;
        }
        if other.check_ocsp.is_some() {
            self.check_ocsp = other.check_ocsp;
        }
        if other.check_crl.is_some() {
            self.check_crl = other.check_crl;
        }
        if other.query_server_info.is_some() {
            self.query_server_info = other.query_server_info;
        }
        if other.ciphers.is_some() {
            self.ciphers = other.ciphers;
        }
        if other.timeout_secs.is_some() {
            self.timeout_secs = other.timeout_secs;
        }
        if let Some(other_prom) = other.prometheus {
            if let Some(ref mut self_prom) = self.prometheus {
                if other_prom.enabled.is_some() {
                    self_prom.enabled = other_prom.enabled;
                }
                if other_prom.address.is_some() {
                    self_prom.address = other_prom.address;
                }
            } else {
                self.prometheus = Some(other_prom);
            }
        }
        self
    }

    /// Projects the merged configuration into the read-only options the
    /// inspection core consumes.
    pub fn getter_options(&self) -> GetterOptions {
        let defaults = GetterOptions::default();
        GetterOptions {
            query_server_info: self
                .query_server_info
                .unwrap_or(defaults.query_server_info),
            check_ocsp: self.check_ocsp.unwrap_or(defaults.check_ocsp),
            check_crl: self.check_crl.unwrap_or(defaults.check_crl),
            engine: EngineKind::OpenSsl,
            ciphers: self.ciphers.clone(),
            timeout_secs: self.timeout_secs.unwrap_or(defaults.timeout_secs),
        }
    }

    /// Generates an example configuration file in TOML format.
    ///
    /// Creates a sample configuration with all available options set to
    /// example values. Useful for bootstrapping a new configuration file.
    pub fn example_toml() -> String {
        let example = Config {
            hosts: Some(vec![
                "example.com".to_string(),
                "example.com:8443".to_string(),
                "https://secure.example.com:9443".to_string(),
                "revoked.badssl.com".to_string(),
            ]),
            output: Some("summary".to_string()),
            exit_code: Some(1),
            check_ocsp: Some(true),
            check_crl: Some(true),
            query_server_info: Some(true),
            ciphers: None,
            timeout_secs: Some(10),
            prometheus: Some(PrometheusConfig {
                enabled: Some(true),
                address: Some("http://localhost:9091".to_string()),
            }),
        };

        toml::to_string_pretty(&example)
            .unwrap_or_else(|_| "# Error generating example".to_string())
    }
}

/// Errors that can occur during configuration loading and parsing.
#[derive(Debug)]
pub enum ConfigError {
    /// I/O error (file not found, permission denied, etc.)
    Io(String),
    /// TOML parsing error (invalid syntax, type mismatch, etc.)
    Parse(String),
    /// Validation error (missing required fields, invalid values, etc.)
    Validation(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(msg) => write!(f, "IO Error: {}", msg),
            ConfigError::Parse(msg) => write!(f, "Parse Error: {}", msg),
            ConfigError::Validation(msg) => write!(f, "Validation Error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}
