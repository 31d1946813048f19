//! Metrics export.
//!
//! Pushes per-host inspection gauges (expiry, revocation, overall status)
//! to a Prometheus Push Gateway when enabled in the configuration.

pub mod prom;
