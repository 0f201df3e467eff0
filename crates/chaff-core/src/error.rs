use std::path::PathBuf;

use thiserror::Error;

pub type ChaffResult<T> = Result<T, ChaffError>;

#[derive(Debug, Error)]
pub enum ChaffError {
    /// The source file could not be read during encode.
    #[error("encoding error: cannot read {}: {source}", path.display())]
    Encoding {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// AEAD tag verification failed (tampered data, wrong key or nonce).
    #[error("integrity check failed for chunk {address}")]
    Integrity { address: String },

    /// Address found neither in the local store nor on any peer.
    #[error("chunk {address} unresolved (local store and {peers_tried} peer(s) exhausted)")]
    ChunkUnresolved { address: String, peers_tried: usize },

    /// Asymmetric unwrap failed its padding/integrity checks.
    #[error("key unwrap failed: wrong keypair or corrupted wrapped key")]
    KeyMismatch,

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("network error talking to {peer}: {source}")]
    Network {
        peer: String,
        #[source]
        source: std::io::Error,
    },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ChaffError {
    pub fn network(peer: impl ToString, source: std::io::Error) -> Self {
        ChaffError::Network {
            peer: peer.to_string(),
            source,
        }
    }

    pub fn timeout(peer: impl ToString) -> Self {
        ChaffError::Network {
            peer: peer.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::TimedOut, "peer query timed out"),
        }
    }

    /// Errors that must abort a whole decode rather than be retried elsewhere.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ChaffError::Integrity { .. } | ChaffError::KeyMismatch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_address() {
        let err = ChaffError::ChunkUnresolved {
            address: "ab12".into(),
            peers_tried: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("ab12"));
        assert!(msg.contains('3'));

        let err = ChaffError::Integrity {
            address: "cd34".into(),
        };
        assert!(err.to_string().contains("cd34"));
    }

    #[test]
    fn only_integrity_and_key_errors_are_fatal() {
        assert!(ChaffError::KeyMismatch.is_fatal());
        assert!(ChaffError::Integrity { address: "x".into() }.is_fatal());
        assert!(!ChaffError::timeout("127.0.0.1:5001").is_fatal());
        assert!(!ChaffError::Protocol("bad".into()).is_fatal());
    }

    #[test]
    fn timeout_is_a_network_error() {
        match ChaffError::timeout("peer:1") {
            ChaffError::Network { peer, source } => {
                assert_eq!(peer, "peer:1");
                assert_eq!(source.kind(), std::io::ErrorKind::TimedOut);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
