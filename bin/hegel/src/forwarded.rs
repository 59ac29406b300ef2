//! Caller address resolution
//!
//! Instances are identified by the address they call from. Behind a load
//! balancer that address is the proxy's, so `X-Forwarded-For` is consulted,
//! but only when the direct peer is a configured trusted proxy.

use axum::http::HeaderMap;
use hegel_common::TrustedProxies;
use std::net::{IpAddr, SocketAddr};

const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Address of the instance a request originates from
///
/// When `peer` is trusted, the right-most `X-Forwarded-For` entry that is not
/// itself a trusted proxy wins. Walking stops at the first unparsable entry,
/// falling back to `peer`.
#[must_use]
pub fn client_ip(peer: SocketAddr, headers: &HeaderMap, trusted: &TrustedProxies) -> IpAddr {
    let peer_ip = peer.ip().to_canonical();
    if trusted.is_empty() || !trusted.contains(&peer_ip) {
        return peer_ip;
    }

    let entries: Vec<&str> = headers
        .get_all(X_FORWARDED_FOR)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .collect();

    for entry in entries.iter().rev() {
        let Some(ip) = parse_entry(entry) else {
            break;
        };
        if !trusted.contains(&ip) {
            return ip;
        }
    }
    peer_ip
}

fn parse_entry(entry: &str) -> Option<IpAddr> {
    entry
        .parse::<IpAddr>()
        .or_else(|_| entry.parse::<SocketAddr>().map(|sa| sa.ip()))
        .ok()
        .map(|ip| ip.to_canonical())
}
