//! Client identity extraction.
//!
//! The identity is the peer IP with the port stripped. It keys every piece of
//! per-client state (rate buckets, auth failures, blocks), so two connections
//! from the same host always land on the same entry.

use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// Stable per-client key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientIdentity(String);

impl ClientIdentity {
    /// Identity of a connected peer.
    pub fn from_peer(addr: SocketAddr) -> Self {
        Self::from_ip(addr.ip())
    }

    /// Identity of a bare IP. IPv4-mapped IPv6 addresses fold to IPv4.
    pub fn from_ip(ip: IpAddr) -> Self {
        let ip = match ip {
            IpAddr::V6(v6) => v6
                .to_ipv4_mapped()
                .map(IpAddr::V4)
                .unwrap_or(IpAddr::V6(v6)),
            v4 => v4,
        };
        Self(ip.to_string())
    }

    /// Identity from a textual remote address ("ip:port", "[v6]:port" or "ip").
    ///
    /// Anything that does not parse is kept verbatim.
    pub fn parse(remote: &str) -> Self {
        if let Ok(addr) = remote.parse::<SocketAddr>() {
            return Self::from_peer(addr);
        }
        if let Ok(ip) = remote.trim_matches(['[', ']']).parse::<IpAddr>() {
            return Self::from_ip(ip);
        }
        Self(remote.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClientIdentity {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_port() {
        let id = ClientIdentity::from_peer("192.168.1.7:54321".parse().unwrap());
        assert_eq!(id.as_str(), "192.168.1.7");
    }

    #[test]
    fn same_host_different_ports_share_identity() {
        let a = ClientIdentity::parse("10.0.0.1:1000");
        let b = ClientIdentity::parse("10.0.0.1:2000");
        assert_eq!(a, b);
    }

    #[test]
    fn folds_ipv4_mapped_ipv6() {
        let id = ClientIdentity::parse("[::ffff:10.1.2.3]:443");
        assert_eq!(id.as_str(), "10.1.2.3");
    }

    #[test]
    fn keeps_plain_ipv6() {
        assert_eq!(ClientIdentity::parse("[2001:db8::1]:80").as_str(), "2001:db8::1");
        assert_eq!(ClientIdentity::parse("2001:db8::1").as_str(), "2001:db8::1");
    }

    #[test]
    fn unparseable_kept_verbatim() {
        assert_eq!(ClientIdentity::parse("unix-socket").as_str(), "unix-socket");
    }
}
