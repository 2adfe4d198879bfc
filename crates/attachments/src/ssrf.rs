//! SSRF defense for attachment URLs.
//!
//! Checks run in a fixed order: URL shape, scheme, hostname denylist,
//! private-range IP literals, cloud metadata endpoints, then DNS
//! resolution of the hostname against the same ranges. A DNS lookup
//! *failure* is not fatal: the provider reports unreachability later, and
//! a transient resolver blip must not turn into silent message loss.

use std::{
    net::{IpAddr, Ipv4Addr},
    time::Duration,
};

use {
    ipnet::Ipv4Net,
    tracing::debug,
    url::{Host, Url},
};

use crate::error::{AttachmentError, Result};

const DNS_TIMEOUT: Duration = Duration::from_secs(5);

const BLOCKED_HOSTS: &[&str] = &["localhost", "127.0.0.1", "0.0.0.0", "::1", "[::1]"];

const METADATA_HOSTS: &[&str] = &[
    "169.254.169.254",
    "metadata.google.internal",
    "100.100.100.200",
];

/// Private, loopback, and link-local ranges an attachment may never reach.
const BLOCKED_RANGES: [Ipv4Net; 5] = [
    Ipv4Net::new_assert(Ipv4Addr::new(10, 0, 0, 0), 8),
    Ipv4Net::new_assert(Ipv4Addr::new(192, 168, 0, 0), 16),
    Ipv4Net::new_assert(Ipv4Addr::new(172, 16, 0, 0), 12),
    Ipv4Net::new_assert(Ipv4Addr::new(169, 254, 0, 0), 16),
    Ipv4Net::new_assert(Ipv4Addr::new(127, 0, 0, 0), 8),
];

fn ip_is_blocked(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_unspecified() || BLOCKED_RANGES.iter().any(|net| net.contains(&v4))
        },
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unspecified()
                || v6
                    .to_ipv4_mapped()
                    .is_some_and(|v4| BLOCKED_RANGES.iter().any(|net| net.contains(&v4)))
        },
    }
}

/// Validate an attachment URL against the SSRF policy and return the
/// parsed form.
pub async fn validate_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw).map_err(|e| AttachmentError::InvalidUrl(e.to_string()))?;

    match url.scheme() {
        "http" | "https" => {},
        other => return Err(AttachmentError::UnsupportedScheme(other.to_string())),
    }

    let host = url
        .host()
        .ok_or_else(|| AttachmentError::InvalidUrl("missing host".into()))?;

    match host {
        Host::Domain(domain) => {
            let lowered = domain.to_ascii_lowercase();
            if BLOCKED_HOSTS.contains(&lowered.as_str())
                || lowered.ends_with(".localhost")
                || lowered.starts_with("127.")
            {
                return Err(AttachmentError::BlockedHost(lowered));
            }
            if METADATA_HOSTS.contains(&lowered.as_str()) {
                return Err(AttachmentError::BlockedHost(format!(
                    "{lowered} is a cloud metadata endpoint"
                )));
            }
            resolve_and_check(&lowered, url.port_or_known_default().unwrap_or(443)).await?;
        },
        Host::Ipv4(v4) => {
            if METADATA_HOSTS.contains(&v4.to_string().as_str()) {
                return Err(AttachmentError::BlockedHost(format!(
                    "{v4} is a cloud metadata endpoint"
                )));
            }
            if ip_is_blocked(IpAddr::V4(v4)) {
                return Err(AttachmentError::BlockedHost(v4.to_string()));
            }
        },
        Host::Ipv6(v6) => {
            if ip_is_blocked(IpAddr::V6(v6)) {
                return Err(AttachmentError::BlockedHost(v6.to_string()));
            }
        },
    }

    Ok(url)
}

/// DNS-resolve `host` and reject when any resolved address falls into a
/// blocked range. Lookup errors and timeouts pass.
async fn resolve_and_check(host: &str, port: u16) -> Result<()> {
    let lookup = tokio::net::lookup_host((host, port));
    match tokio::time::timeout(DNS_TIMEOUT, lookup).await {
        Ok(Ok(addrs)) => {
            for addr in addrs {
                if ip_is_blocked(addr.ip()) {
                    return Err(AttachmentError::BlockedHost(format!(
                        "{host} resolves to blocked address {}",
                        addr.ip()
                    )));
                }
            }
            Ok(())
        },
        Ok(Err(err)) => {
            debug!(host, error = %err, "attachment host did not resolve, deferring to fetch");
            Ok(())
        },
        Err(_) => {
            debug!(host, "attachment dns lookup timed out, deferring to fetch");
            Ok(())
        },
    }
}
