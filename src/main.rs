use std::path::PathBuf;
use std::process::exit;
use std::sync::mpsc;
use std::thread;

use clap::Parser;
use comfy_table::Table;
use url::Url;

use certwatch::config::PrometheusConfig;
use certwatch::{
    Config, InspectionError, InspectionOutcome, InspectionResult, Inspector, OverallStatus,
    RevocationStatus,
};

#[derive(Parser, Debug)]
#[command(
    name = "certwatch",
    version,
    about = "Inspects the TLS identity of remote hosts: certificate chains, expiry and OCSP/CRL revocation"
)]
struct Cli {
    /// Hosts to inspect: host, host:port, or https://host:port
    hosts: Vec<String>,

    /// Output format: json, text, summary
    #[arg(short, long)]
    output: Option<String>,

    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print an example configuration file and exit
    #[arg(long)]
    example_config: bool,

    /// Exit code to use when a certificate is expired or revoked
    #[arg(long)]
    exit_code: Option<i32>,

    /// Collect HTTP server metadata for each host
    #[arg(long)]
    server_info: bool,

    /// Skip the OCSP responder check
    #[arg(long)]
    no_ocsp: bool,

    /// Skip the CRL fallback check
    #[arg(long)]
    no_crl: bool,

    /// OpenSSL cipher-list override
    #[arg(long)]
    ciphers: Option<String>,

    /// Network timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Push metrics to a Prometheus push gateway
    #[arg(long)]
    prometheus: bool,

    /// Prometheus push gateway address
    #[arg(long)]
    prometheus_address: Option<String>,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if cli.example_config {
        println!("{}", Config::example_toml());
        exit(0);
    }

    let mut config = Config::default();
    if let Some(path) = &cli.config {
        match Config::from_file(path) {
            Ok(file_config) => config = config.merge_with(file_config),
            Err(e) => {
                eprintln!("Failed to load config {}: {}", path.display(), e);
                exit(2);
            }
        }
    }
    config = config.merge_with(cli_overrides(&cli));

    let hosts = match &config.hosts {
        Some(hosts) if !hosts.is_empty() => hosts.clone(),
        _ => {
            eprintln!("No hosts to check. Pass hosts as arguments or set them in the config file.");
            exit(2);
        }
    };

    let options = config.getter_options();
    let results = inspect_all(hosts, &options);

    match config.output.as_deref().unwrap_or("summary") {
        "json" => match serde_json::to_string_pretty(&results) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Failed to serialize results: {}", e);
                exit(2);
            }
        },
        "text" => print_text(&results),
        _ => print_summary(&results),
    }

    let prometheus_enabled = config
        .prometheus
        .as_ref()
        .and_then(|p| p.enabled)
        .unwrap_or(false);
    if prometheus_enabled {
        let address = config
            .prometheus
            .as_ref()
            .and_then(|p| p.address.clone())
            .unwrap_or_else(|| "http://localhost:9091".to_string());
        certwatch::metrics::prom::prometheus_metrics(&results, &address);
    }

    let trouble = results.iter().any(|r| {
        r.status == OverallStatus::Failure || r.any_expired() || r.any_revoked()
    });
    if trouble {
        exit(config.exit_code.unwrap_or(0));
    }
    exit(0);
}

fn cli_overrides(cli: &Cli) -> Config {
    Config {
        hosts: if cli.hosts.is_empty() {
            None
        } else {
            Some(cli.hosts.clone())
        },
        output: cli.output.clone(),
        exit_code: cli.exit_code,
        check_ocsp: if cli.no_ocsp { Some(false) } else { None },
        check_crl: if cli.no_crl { Some(false) } else { None },
        query_server_info: if cli.server_info { Some(true) } else { None },
        ciphers: cli.ciphers.clone(),
        timeout_secs: cli.timeout,
        prometheus: Some(PrometheusConfig {
            enabled: if cli.prometheus { Some(true) } else { None },
            address: cli.prometheus_address.clone(),
        }),
    }
}

/// Checks every host on its own thread and collects results as they finish.
fn inspect_all(hosts: Vec<String>, options: &certwatch::GetterOptions) -> Vec<InspectionResult> {
    let (sender, receiver) = mpsc::channel();
    for spec in hosts {
        let sender = sender.clone();
        let options = options.clone();
        thread::spawn(move || {
            let result = match parse_host_spec(&spec) {
                Ok((host, port)) => {
                    let inspector = Inspector::new(options);
                    match inspector.inspect(&host, port) {
                        Ok(InspectionOutcome::Completed(result)) => result,
                        // The CLI never cancels; nothing to report
                        Ok(InspectionOutcome::Cancelled) => return,
                        Err(e) => {
                            eprintln!("Failed to check {}: {}", host, e);
                            InspectionResult::failed(&host, port, e.kind())
                        }
                    }
                }
                Err(e) => {
                    eprintln!("Skipping {}: {}", spec, e);
                    InspectionResult::failed(&spec, 0, e.kind())
                }
            };
            let _ = sender.send(result);
        });
    }
    drop(sender);

    let mut results: Vec<InspectionResult> = receiver.iter().collect();
    results.sort_by(|a, b| a.hostname.cmp(&b.hostname));
    results
}

/// Accepts "host", "host:port", "scheme://host:port", and bracketed IPv6
/// forms like "[::1]:443".
fn parse_host_spec(spec: &str) -> Result<(String, u16), InspectionError> {
    if spec.contains("://") {
        let url = Url::parse(spec).map_err(|e| InspectionError::InvalidParameter {
            field: "host".to_string(),
            reason: e.to_string(),
        })?;
        let host = url
            .host_str()
            .ok_or_else(|| InspectionError::InvalidParameter {
                field: "host".to_string(),
                reason: "URL has no host".to_string(),
            })?
            // Url keeps the brackets around IPv6 hosts
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();
        return Ok((host, url.port().unwrap_or(443)));
    }

    if let Some(rest) = spec.strip_prefix('[') {
        let (host, tail) = rest.split_once(']').ok_or_else(|| {
            InspectionError::InvalidParameter {
                field: "host".to_string(),
                reason: format!("'{}' has no closing bracket", spec),
            }
        })?;
        let port = match tail.strip_prefix(':') {
            Some(port) => port.parse::<u16>().map_err(|_| {
                InspectionError::InvalidParameter {
                    field: "port".to_string(),
                    reason: format!("'{}' is not a valid port", port),
                }
            })?,
            None if tail.is_empty() => 443,
            None => {
                return Err(InspectionError::InvalidParameter {
                    field: "host".to_string(),
                    reason: format!("unexpected trailing '{}'", tail),
                })
            }
        };
        return Ok((host.to_string(), port));
    }

    match spec.rsplit_once(':') {
        // Avoid mangling bare IPv6 addresses
        Some((host, port)) if !host.contains(':') => {
            let port = port.parse::<u16>().map_err(|_| {
                InspectionError::InvalidParameter {
                    field: "port".to_string(),
                    reason: format!("'{}' is not a valid port", port),
                }
            })?;
            Ok((host.to_string(), port))
        }
        _ => Ok((spec.to_string(), 443)),
    }
}

fn print_text(results: &[InspectionResult]) {
    for result in results {
        println!("--------------------------------------");
        println!("Hostname: {}", result.hostname);
        println!("Status: {}", result.status);
        if let Some(kind) = result.error {
            println!("Error: {}", kind);
            continue;
        }
        println!("Peer address: {}", result.connection.peer_address);
        println!("Protocol: {}", result.connection.protocol);
        println!("Cipher: {}", result.connection.cipher);
        println!("Hostname match: {}", result.validation.hostname_matches);
        println!("Chain linkage intact: {}", result.validation.linkage_intact);
        for (index, cert) in result.chain.certificates.iter().enumerate() {
            println!("Certificate #{}:", index);
            println!("\tSubject: {}", cert.subject.common_name);
            println!("\tIssuer: {}", cert.issuer.common_name);
            println!("\tSerial: {}", cert.serial);
            println!("\tValid from: {}", cert.not_before);
            println!("\tValid to: {}", cert.not_after);
            println!("\tDays left: {}", cert.validity_days);
            println!("\tExpired: {}", cert.is_expired);
            println!(
                "\tPublic key: {} {} bits",
                cert.public_key.algorithm, cert.public_key.size_bits
            );
            println!("\tSignature algorithm: {}", cert.signature_algorithm);
            for san in &cert.sans {
                println!("\tDNS Name: {}", san);
            }
            if let Some(verdict) = result.verdicts.iter().find(|v| v.index == index) {
                println!(
                    "\tRevocation: {} (via {})",
                    describe_status(&verdict.verdict.status),
                    verdict.verdict.channel
                );
            } else {
                println!("\tRevocation: not checked (trust anchor)");
            }
        }
        if let Some(info) = &result.server_info {
            println!("Server software: {}", info.server.as_deref().unwrap_or("-"));
            println!("HTTP status: {}", info.status);
            println!("Proxy configured: {}", info.proxy_configured);
        }
    }
}

fn print_summary(results: &[InspectionResult]) {
    let mut table = Table::new();
    table.set_header(vec![
        "Host",
        "Status",
        "Protocol",
        "Days left",
        "Hostname match",
        "Leaf revocation",
    ]);
    for result in results {
        let days = result
            .chain
            .leaf()
            .map(|leaf| leaf.validity_days.to_string())
            .unwrap_or_else(|| "-".to_string());
        let revocation = result
            .leaf_verdict()
            .map(|v| format!("{} (via {})", describe_status(&v.status), v.channel))
            .unwrap_or_else(|| "-".to_string());
        table.add_row(vec![
            result.hostname.clone(),
            result.status.to_string(),
            result.connection.protocol.clone(),
            days,
            result.validation.hostname_matches.to_string(),
            revocation,
        ]);
    }
    println!("{table}");
}

fn describe_status(status: &RevocationStatus) -> String {
    match status {
        RevocationStatus::Good => "good".to_string(),
        RevocationStatus::Revoked { reason, .. } => format!("REVOKED: {}", reason),
        RevocationStatus::Unknown => "unknown".to_string(),
        RevocationStatus::CheckFailed { cause } => format!("check failed: {}", cause),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_host_spec_forms() {
        assert_eq!(
            parse_host_spec("example.com").unwrap(),
            ("example.com".to_string(), 443)
        );
        assert_eq!(
            parse_host_spec("example.com:8443").unwrap(),
            ("example.com".to_string(), 8443)
        );
        assert_eq!(
            parse_host_spec("https://secure.example.com:9443").unwrap(),
            ("secure.example.com".to_string(), 9443)
        );
    }

    #[test]
    fn test_parse_host_spec_bracketed_ipv6() {
        assert_eq!(parse_host_spec("[::1]:443").unwrap(), ("::1".to_string(), 443));
        assert_eq!(
            parse_host_spec("[2001:db8::1]").unwrap(),
            ("2001:db8::1".to_string(), 443)
        );
        assert_eq!(
            parse_host_spec("https://[2001:db8::1]:8443").unwrap(),
            ("2001:db8::1".to_string(), 8443)
        );
        // Bare IPv6 keeps the whole address and the default port
        assert_eq!(
            parse_host_spec("2001:db8::1").unwrap(),
            ("2001:db8::1".to_string(), 443)
        );
        assert!(parse_host_spec("[::1]:bad").is_err());
        assert!(parse_host_spec("[::1").is_err());
        assert!(parse_host_spec("[::1]x").is_err());
    }

    #[test]
    fn test_parse_host_spec_bad_port() {
        assert!(parse_host_spec("example.com:notaport").is_err());
        assert!(parse_host_spec("example.com:70000").is_err());
    }
}
