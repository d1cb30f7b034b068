//! Utility functions for Peerlink
//!
//! Host/port helpers shared by the providers and the engine.

use if_addrs::IfAddr;

/// Combine a host and a port into a `host:port` address
///
/// IPv6 hosts are wrapped in brackets.
///
/// # Examples
///
/// ```
/// use peerlink_common::join_host_port;
///
/// assert_eq!(join_host_port("127.0.0.1", 9001), "127.0.0.1:9001");
/// assert_eq!(join_host_port("::1", 9001), "[::1]:9001");
/// ```
pub fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

/// Split a `host:port` address into its host and port parts
///
/// The port is returned unparsed so callers can report their own error.
pub fn split_host_port(address: &str) -> Result<(String, String), String> {
    if let Some(rest) = address.strip_prefix('[') {
        let (host, tail) = rest
            .split_once(']')
            .ok_or_else(|| "missing ']' in address".to_string())?;
        let port = tail
            .strip_prefix(':')
            .ok_or_else(|| "missing port in address".to_string())?;
        return Ok((host.to_string(), port.to_string()));
    }

    let (host, port) = address
        .rsplit_once(':')
        .ok_or_else(|| "missing port in address".to_string())?;
    if host.contains(':') {
        return Err("too many colons in address".to_string());
    }
    Ok((host.to_string(), port.to_string()))
}

/// Get the local IP address
///
/// Returns the first non-loopback IPv4 address found,
/// or "127.0.0.1" as fallback.
pub fn local_ip() -> String {
    if_addrs::get_if_addrs()
        .ok()
        .and_then(|addrs| {
            addrs
                .into_iter()
                .find(|iface| !iface.is_loopback() && matches!(iface.addr, IfAddr::V4(_)))
                .and_then(|iface| match iface.addr {
                    IfAddr::V4(addr) => Some(addr.ip.to_string()),
                    _ => None,
                })
        })
        .unwrap_or_else(|| "127.0.0.1".to_string())
}
