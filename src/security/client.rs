//! Client identity.
//!
//! # Responsibilities
//! - Derive the client identifier every per-client store is keyed by
//! - Define the authenticated-identity interface consumed from the auth layer
//!
//! # Design Decisions
//! - The forwarded header is read only when the transport peer is a trusted
//!   proxy; any other peer is identified by its own address
//! - Within the header, the rightmost hop that is not itself a trusted proxy
//!   is the client. Entries that do not parse as IPs are skipped
//! - Missing peer info (e.g. in-process tests without ConnectInfo) maps to
//!   a single "unknown" client rather than bypassing tracking

use std::net::{IpAddr, SocketAddr};

use axum::{
    extract::ConnectInfo,
    http::{HeaderMap, HeaderName, Request},
};
use ipnet::IpNet;

use crate::config::schema::parse_network;
use crate::config::ClientIpConfig;

pub const UNKNOWN_CLIENT: &str = "unknown";

/// Identifier of the originating client.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientId(String);

impl ClientId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The currently authenticated user, as reported by the auth subsystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser(pub String);

/// Read-only view onto the session/auth subsystem.
pub trait IdentityProvider: Send + Sync {
    fn identify(&self, headers: &HeaderMap) -> Option<AuthenticatedUser>;
}

/// Used when no auth subsystem is wired in.
#[derive(Debug, Default, Clone, Copy)]
pub struct Anonymous;

impl IdentityProvider for Anonymous {
    fn identify(&self, _headers: &HeaderMap) -> Option<AuthenticatedUser> {
        None
    }
}

#[derive(Debug, Clone)]
pub struct ClientResolver {
    forwarded_header: Option<HeaderName>,
    trusted_proxies: Vec<IpNet>,
}

impl ClientResolver {
    pub fn from_config(config: &ClientIpConfig) -> Self {
        let forwarded_header = config.forwarded_header.as_deref().and_then(|name| {
            match HeaderName::from_bytes(name.trim().to_lowercase().as_bytes()) {
                Ok(header) => Some(header),
                Err(_) => {
                    tracing::warn!(header = %name, "Ignoring invalid forwarded header name");
                    None
                }
            }
        });
        let trusted_proxies = config
            .trusted_proxies
            .iter()
            .filter_map(|entry| {
                let net = parse_network(entry);
                if net.is_none() {
                    tracing::warn!(proxy = %entry, "Ignoring unparseable trusted proxy");
                }
                net
            })
            .collect();
        Self {
            forwarded_header,
            trusted_proxies,
        }
    }

    /// Resolve the client behind `request`.
    ///
    /// An already-resolved [`ClientId`] extension is reused.
    pub fn resolve<B>(&self, request: &Request<B>) -> ClientId {
        if let Some(client) = request.extensions().get::<ClientId>() {
            return client.clone();
        }
        let Some(peer) = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip())
        else {
            return ClientId(UNKNOWN_CLIENT.to_string());
        };
        if self.is_trusted(&peer) {
            if let Some(ip) = self.forwarded_ip(request.headers()) {
                return ClientId(ip.to_string());
            }
        }
        ClientId(peer.to_string())
    }

    fn is_trusted(&self, ip: &IpAddr) -> bool {
        self.trusted_proxies.iter().any(|net| net.contains(ip))
    }

    fn forwarded_ip(&self, headers: &HeaderMap) -> Option<IpAddr> {
        let header = self.forwarded_header.as_ref()?;
        let value = headers.get(header)?.to_str().ok()?;
        let hops: Vec<IpAddr> = value
            .split(',')
            .filter_map(|hop| hop.trim().parse().ok())
            .collect();
        // Every hop trusted: the leftmost is as close to the client as we get.
        hops.iter()
            .rev()
            .find(|ip| !self.is_trusted(ip))
            .or_else(|| hops.first())
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn behind_proxy() -> ClientResolver {
        ClientResolver::from_config(&ClientIpConfig {
            trusted_proxies: vec!["10.0.0.0/8".into()],
            ..ClientIpConfig::default()
        })
    }

    fn forwarded(value: &str, peer: &str) -> Request<Body> {
        let request = Request::builder()
            .header("X-Forwarded-For", value)
            .body(Body::empty())
            .unwrap();
        with_peer(request, peer)
    }

    fn with_peer(mut request: Request<Body>, addr: &str) -> Request<Body> {
        let addr: SocketAddr = addr.parse().unwrap();
        request.extensions_mut().insert(ConnectInfo(addr));
        request
    }

    #[test]
    fn test_trusted_proxy_header_is_used() {
        let request = forwarded("203.0.113.9, 10.0.0.1", "10.0.0.2:5000");
        assert_eq!(behind_proxy().resolve(&request).as_str(), "203.0.113.9");
    }

    #[test]
    fn test_header_from_untrusted_peer_ignored() {
        let request = forwarded("9.9.9.9", "6.6.6.6:5000");
        assert_eq!(behind_proxy().resolve(&request).as_str(), "6.6.6.6");

        let default = ClientResolver::from_config(&ClientIpConfig::default());
        assert_eq!(default.resolve(&request).as_str(), "6.6.6.6");
    }

    #[test]
    fn test_rightmost_untrusted_hop_wins() {
        // The client prepended a spoofed hop; the proxy appended the real one.
        let request = forwarded("1.2.3.4, 198.51.100.7", "10.0.0.2:5000");
        assert_eq!(behind_proxy().resolve(&request).as_str(), "198.51.100.7");
    }

    #[test]
    fn test_falls_back_to_peer() {
        let request = with_peer(Request::new(Body::empty()), "198.51.100.7:443");
        assert_eq!(behind_proxy().resolve(&request).as_str(), "198.51.100.7");
    }

    #[test]
    fn test_garbage_header_falls_back_to_peer() {
        let request = forwarded("<script>", "10.0.0.2:443");
        assert_eq!(behind_proxy().resolve(&request).as_str(), "10.0.0.2");
    }

    #[test]
    fn test_header_disabled() {
        let resolver = ClientResolver::from_config(&ClientIpConfig {
            forwarded_header: None,
            trusted_proxies: vec!["10.0.0.0/8".into()],
        });
        let request = forwarded("203.0.113.9", "10.0.0.1:5000");
        assert_eq!(resolver.resolve(&request).as_str(), "10.0.0.1");
    }

    #[test]
    fn test_unknown_without_peer() {
        let request = Request::builder()
            .header("x-forwarded-for", "203.0.113.9")
            .body(Body::empty())
            .unwrap();
        assert_eq!(behind_proxy().resolve(&request).as_str(), UNKNOWN_CLIENT);
    }

    #[test]
    fn test_existing_extension_reused() {
        let mut request = Request::new(Body::empty());
        request.extensions_mut().insert(ClientId::new("cached"));
        assert_eq!(behind_proxy().resolve(&request).as_str(), "cached");
    }
}
