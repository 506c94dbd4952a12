//! Turns the operator's target string into a probe address.
use crate::error::{Error, Result};
use std::net::IpAddr;
use std::str::FromStr;

/// Parses `target` as an IP literal, or resolves it as a hostname.
///
/// Only the first address the system resolver returns is used; RTSP
/// validation is aimed at one physical device.
///
/// ```rust
/// # use fleetscout::target::resolve_target;
/// let rt = tokio::runtime::Runtime::new().unwrap();
/// let ip = rt.block_on(resolve_target("192.168.1.20")).unwrap();
/// assert_eq!(ip.to_string(), "192.168.1.20");
/// ```
pub async fn resolve_target(target: &str) -> Result<IpAddr> {
    let target = target.trim();
    if target.is_empty() {
        return Err(Error::InvalidTarget("empty target".to_owned()));
    }
    if let Ok(ip) = IpAddr::from_str(target) {
        return Ok(ip);
    }

    let mut addrs = tokio::net::lookup_host((target, 0))
        .await
        .map_err(|e| Error::InvalidTarget(format!("{target}: {e}")))?;

    addrs
        .next()
        .map(|addr| addr.ip())
        .ok_or_else(|| Error::InvalidTarget(format!("{target} did not resolve")))
}
