// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Hostname and URL syntax validators.
//!
//! Three different trust levels share these checks:
//! - routed hostnames must be RFC 1123 clean before they enter the registry
//! - webhook URLs must not point inside the deployment (SSRF)
//! - health and proxy-target URLs may hit private ranges (they address
//!   containers) but never non-HTTP schemes or cloud metadata endpoints

use std::net::{IpAddr, Ipv6Addr};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SecurityError {
    #[error("hostname is empty")]
    EmptyHostname,
    #[error("hostname exceeds 253 characters")]
    HostnameTooLong,
    #[error("hostname contains empty label")]
    EmptyLabel,
    #[error("hostname label {0:?} exceeds 63 characters")]
    LabelTooLong(String),
    #[error("hostname label {0:?} contains invalid characters")]
    InvalidLabel(String),
    #[error("malformed URL: {0}")]
    MalformedUrl(#[from] url::ParseError),
    #[error("scheme {0:?} not allowed, must be http or https")]
    SchemeNotAllowed(String),
    #[error("empty host")]
    EmptyHost,
    #[error("loopback address {0} not allowed")]
    Loopback(IpAddr),
    #[error("link-local address {0} not allowed")]
    LinkLocal(IpAddr),
    #[error("private IP {0} not allowed")]
    PrivateIp(IpAddr),
    #[error("target host {0:?} is blocked")]
    BlockedHost(String),
}

/// Validates a hostname against RFC 1123.
pub fn validate_hostname(hostname: &str) -> Result<(), SecurityError> {
    if hostname.is_empty() {
        return Err(SecurityError::EmptyHostname);
    }
    if hostname.len() > 253 {
        return Err(SecurityError::HostnameTooLong);
    }

    for label in hostname.split('.') {
        if label.is_empty() {
            return Err(SecurityError::EmptyLabel);
        }
        if label.len() > 63 {
            return Err(SecurityError::LabelTooLong(label.to_string()));
        }
        if !valid_label(label) {
            return Err(SecurityError::InvalidLabel(label.to_string()));
        }
    }
    Ok(())
}

fn valid_label(label: &str) -> bool {
    let bytes = label.as_bytes();
    let alnum = |b: u8| b.is_ascii_alphanumeric();
    alnum(bytes[0])
        && alnum(bytes[bytes.len() - 1])
        && bytes.iter().all(|&b| alnum(b) || b == b'-')
}

/// Validates a webhook URL, rejecting private/internal IP literals (SSRF
/// protection). Hostnames are not resolved here; delivery to a host that
/// resolves privately fails at POST time instead.
pub fn validate_webhook_url(raw: &str) -> Result<(), SecurityError> {
    let url = parse_http_url(raw)?;
    let host = url.host_str().ok_or(SecurityError::EmptyHost)?;

    if let Ok(ip) = host.trim_matches(['[', ']']).parse::<IpAddr>() {
        reject_private_ip(ip)?;
    }
    Ok(())
}

/// Validates a health check URL. Private IPs are allowed since health checks
/// target containers.
pub fn validate_health_url(raw: &str) -> Result<(), SecurityError> {
    let url = parse_http_url(raw)?;
    if url.host_str().is_none() {
        return Err(SecurityError::EmptyHost);
    }
    Ok(())
}

/// Validates a reverse-proxy backend target. Private ranges are fine (that is
/// where the containers live) but cloud metadata endpoints are blocked.
pub fn validate_target_url(raw: &str) -> Result<url::Url, SecurityError> {
    let url = parse_http_url(raw)?;
    let host = url.host_str().ok_or(SecurityError::EmptyHost)?;

    if host == "metadata.google.internal" || host == "metadata.goog" {
        return Err(SecurityError::BlockedHost(host.to_string()));
    }
    if let Ok(ip) = host.trim_matches(['[', ']']).parse::<IpAddr>() {
        if is_link_local(ip) {
            return Err(SecurityError::BlockedHost(host.to_string()));
        }
    }
    Ok(url)
}

fn parse_http_url(raw: &str) -> Result<url::Url, SecurityError> {
    let url = url::Url::parse(raw)?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(SecurityError::SchemeNotAllowed(other.to_string())),
    }
}

fn reject_private_ip(ip: IpAddr) -> Result<(), SecurityError> {
    if ip.is_loopback() {
        return Err(SecurityError::Loopback(ip));
    }
    if is_link_local(ip) {
        return Err(SecurityError::LinkLocal(ip));
    }
    match ip {
        IpAddr::V4(v4) if v4.is_private() => Err(SecurityError::PrivateIp(ip)),
        IpAddr::V6(v6) if is_unique_local_v6(v6) => Err(SecurityError::PrivateIp(ip)),
        _ => Ok(()),
    }
}

fn is_link_local(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_link_local(),
        // fe80::/10
        IpAddr::V6(v6) => (v6.segments()[0] & 0xffc0) == 0xfe80,
    }
}

// fc00::/7
fn is_unique_local_v6(v6: Ipv6Addr) -> bool {
    (v6.segments()[0] & 0xfe00) == 0xfc00
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_hostname_valid() {
        for host in [
            "example.com",
            "a.b.c.d.e",
            "my-host",
            "a",
            "foo-bar.baz",
            "123.456",
            "a1.b2.c3",
            &format!("{}.com", "a".repeat(63)),
        ] {
            assert!(validate_hostname(host).is_ok(), "{host} should be valid");
        }
    }

    #[test]
    fn test_validate_hostname_invalid() {
        let cases = [
            ("", "empty"),
            ("host name.com", "invalid characters"),
            ("-bad.com", "invalid characters"),
            ("bad-.com", "invalid characters"),
            (&format!("{}.com", "a".repeat(64)), "exceeds 63"),
            (&"a".repeat(254), "exceeds 253"),
            ("foo..bar", "empty label"),
            ("under_score.com", "invalid characters"),
            (".leading.dot", "empty label"),
            ("trailing.dot.", "empty label"),
            ("ex!ample.com", "invalid characters"),
            ("ex@mple.com", "invalid characters"),
        ];
        for (host, want) in cases {
            let err = validate_hostname(host)
                .expect_err(&format!("{host:?} should be rejected"))
                .to_string();
            assert!(err.contains(want), "{host:?}: {err} should contain {want:?}");
        }
    }

    #[test]
    fn test_validate_webhook_url_public_ok() {
        for u in [
            "https://hooks.slack.com/services/T00/B00/xxx",
            "http://example.com/webhook",
            "https://1.2.3.4:8443/hook",
        ] {
            assert!(validate_webhook_url(u).is_ok(), "{u} should pass");
        }
    }

    #[test]
    fn test_validate_webhook_url_private_rejected() {
        for u in [
            "http://127.0.0.1/hook",
            "http://127.0.0.2/x",
            "http://10.0.0.1/hook",
            "http://10.255.255.255/x",
            "http://192.168.1.1/hook",
            "http://172.16.0.1/hook",
            "http://172.31.255.255/hook",
            "http://169.254.169.254/latest/meta-data",
            "http://[::1]/hook",
        ] {
            assert!(validate_webhook_url(u).is_err(), "{u} should be rejected");
        }
    }

    #[test]
    fn test_validate_webhook_url_loopback_message() {
        let err = validate_webhook_url("http://127.0.0.1/x").unwrap_err().to_string();
        assert!(err.contains("loopback"), "{err}");
    }

    #[test]
    fn test_validate_webhook_url_schemes_rejected() {
        for u in ["file:///etc/passwd", "ftp://example.com/file", "gopher://evil.com"] {
            let err = validate_webhook_url(u).unwrap_err().to_string();
            assert!(err.contains("scheme"), "{u}: {err}");
        }
    }

    #[test]
    fn test_validate_health_url_private_allowed() {
        for u in [
            "http://10.0.0.1:8080/health",
            "http://192.168.1.1:8080/health",
            "http://127.0.0.1:8080/health",
            "http://localhost:8080/health",
            "https://my-container:443/health",
        ] {
            assert!(validate_health_url(u).is_ok(), "{u} should pass");
        }
    }

    #[test]
    fn test_validate_health_url_bad_schemes_rejected() {
        for u in ["ftp://10.0.0.1/health", "file:///etc/passwd", "gopher://x/health"] {
            let err = validate_health_url(u).unwrap_err().to_string();
            assert!(err.contains("scheme"), "{u}: {err}");
        }
    }

    #[test]
    fn test_validate_target_url() {
        assert!(validate_target_url("http://10.0.0.5:3000").is_ok());
        assert!(validate_target_url("http://localhost:3000").is_ok());

        let err = validate_target_url("file:///etc/passwd").unwrap_err().to_string();
        assert!(err.contains("scheme"), "{err}");
        let err = validate_target_url("unix:///var/run/docker.sock")
            .unwrap_err()
            .to_string();
        assert!(err.contains("scheme"), "{err}");

        let err = validate_target_url("http://169.254.169.254/latest")
            .unwrap_err()
            .to_string();
        assert!(err.contains("blocked"), "{err}");
        let err = validate_target_url("http://metadata.google.internal/v1")
            .unwrap_err()
            .to_string();
        assert!(err.contains("blocked"), "{err}");
    }
}
