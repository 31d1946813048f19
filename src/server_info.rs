//! Coarse HTTP server metadata.
//!
//! A peripheral convenience: banner and response headers collected with an
//! ordinary HTTPS request. Any failure degrades silently to "unavailable"
//! and never affects the inspection's overall status. Proxy detection is an
//! annotation only; it never alters checker behavior.

use std::collections::HashMap;
use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// HTTP metadata for the inspected host.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerInfo {
    /// Contents of the Server header, when sent
    pub server: Option<String>,
    /// HTTP status of the probe response
    pub status: u16,
    /// All response headers (lossy UTF-8)
    pub headers: HashMap<String, String>,
    /// Whether an HTTP proxy is configured in the environment
    pub proxy_configured: bool,
}

/// Probes `https://host:port/` and returns what the server said, or `None`
/// when anything at all goes wrong.
pub fn collect(host: &str, port: u16, timeout: Duration) -> Option<ServerInfo> {
    let client = reqwest::blocking::Client::builder()
        .timeout(timeout)
        // Acquisition mirrors the chain fetcher: invalid chains still have
        // banners worth reporting
        .danger_accept_invalid_certs(true)
        .build()
        .ok()?;

    let url = format!("https://{}:{}/", host, port);
    let response = match client.head(&url).send() {
        Ok(r) => r,
        // Some servers reject HEAD outright; retry as GET
        Err(_) => match client.get(&url).send() {
            Ok(r) => r,
            Err(e) => {
                log::debug!("server info probe for {} failed: {}", url, e);
                return None;
            }
        },
    };

    let headers: HashMap<String, String> = response
        .headers()
        .iter()
        .map(|(name, value)| {
            (
                name.to_string(),
                String::from_utf8_lossy(value.as_bytes()).to_string(),
            )
        })
        .collect();

    Some(ServerInfo {
        server: headers.get("server").cloned(),
        status: response.status().as_u16(),
        headers,
        proxy_configured: proxy_configured(),
    })
}

/// Answers "is an HTTP proxy configured" from the process environment.
pub fn proxy_configured() -> bool {
    ["HTTPS_PROXY", "https_proxy", "HTTP_PROXY", "http_proxy", "ALL_PROXY", "all_proxy"]
        .iter()
        .any(|var| env::var(var).map(|v| !v.is_empty()).unwrap_or(false))
}
