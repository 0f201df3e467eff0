//! Ordered list of peers queried on a local miss

use chaff_core::config::PeersConfig;
use chaff_core::{ChaffResult, PeerEndpoint};

/// Read-only for the duration of a resolution pass; peers are tried in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerDirectory {
    peers: Vec<PeerEndpoint>,
}

impl PeerDirectory {
    pub fn new(peers: Vec<PeerEndpoint>) -> Self {
        Self { peers }
    }

    pub fn from_config(cfg: &PeersConfig) -> ChaffResult<Self> {
        Ok(Self::new(cfg.parse_endpoints()?))
    }

    pub fn iter(&self) -> impl Iterator<Item = &PeerEndpoint> {
        self.peers.iter()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

impl FromIterator<PeerEndpoint> for PeerDirectory {
    fn from_iter<I: IntoIterator<Item = PeerEndpoint>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_keeps_order() {
        let cfg = PeersConfig {
            endpoints: vec!["b.example:5001".into(), "a.example:5001".into()],
        };
        let dir = PeerDirectory::from_config(&cfg).unwrap();
        let hosts: Vec<_> = dir.iter().map(|p| p.host.as_str()).collect();
        assert_eq!(hosts, ["b.example", "a.example"]);
    }

    #[test]
    fn test_from_config_rejects_garbage() {
        let cfg = PeersConfig {
            endpoints: vec!["nope".into()],
        };
        assert!(PeerDirectory::from_config(&cfg).is_err());
    }

    #[test]
    fn test_empty() {
        let dir: PeerDirectory = std::iter::empty().collect();
        assert!(dir.is_empty());
        assert_eq!(dir.len(), 0);
    }
}
