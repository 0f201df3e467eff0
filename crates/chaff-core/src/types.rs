use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ChaffError;

/// A peer reachable over the control or data channel.
///
/// There is no session state: every exchange opens a fresh connection to
/// `host:port`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PeerEndpoint {
    pub host: String,
    pub port: u16,
}

impl PeerEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// `host:port` form accepted by `TcpStream::connect`.
    pub fn authority(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Display for PeerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.authority())
    }
}

impl FromStr for PeerEndpoint {
    type Err = ChaffError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| ChaffError::Config(format!("peer endpoint '{s}' is not host:port")))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(ChaffError::Config(format!("peer endpoint '{s}' has no host")));
        }
        let port = port
            .parse::<u16>()
            .map_err(|e| ChaffError::Config(format!("peer endpoint '{s}': bad port: {e}")))?;
        Ok(PeerEndpoint::new(host, port))
    }
}

impl TryFrom<String> for PeerEndpoint {
    type Error = ChaffError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PeerEndpoint> for String {
    fn from(value: PeerEndpoint) -> Self {
        value.authority()
    }
}

impl From<std::net::SocketAddr> for PeerEndpoint {
    fn from(addr: std::net::SocketAddr) -> Self {
        PeerEndpoint::new(addr.ip().to_string(), addr.port())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_host_port() {
        let p: PeerEndpoint = "10.0.0.2:5001".parse().unwrap();
        assert_eq!(p.host, "10.0.0.2");
        assert_eq!(p.port, 5001);
        assert_eq!(p.to_string(), "10.0.0.2:5001");
    }

    #[test]
    fn parse_bracketed_ipv6() {
        let p: PeerEndpoint = "[::1]:5000".parse().unwrap();
        assert_eq!(p.host, "::1");
        assert_eq!(p.authority(), "[::1]:5000");
    }

    #[test]
    fn reject_malformed() {
        assert!("no-port".parse::<PeerEndpoint>().is_err());
        assert!(":5000".parse::<PeerEndpoint>().is_err());
        assert!("host:99999".parse::<PeerEndpoint>().is_err());
    }

    #[test]
    fn from_socket_addr() {
        let addr: std::net::SocketAddr = "127.0.0.1:4242".parse().unwrap();
        let p = PeerEndpoint::from(addr);
        assert_eq!(p.authority(), "127.0.0.1:4242");
    }
}
