//! rustls configuration for both channels
//!
//! The ring provider is selected explicitly so no process-wide default
//! provider has to be installed.

use anyhow::{Context, Result};
use chaff_core::config::TlsConfig;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::{ClientConfig, RootCertStore, ServerConfig};
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::{TlsAcceptor, TlsConnector};

fn provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

pub fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let certs = CertificateDer::pem_file_iter(path)
        .with_context(|| format!("opening certificate file {}", path.display()))?
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("parsing certificates in {}", path.display()))?;
    if certs.is_empty() {
        anyhow::bail!("no certificates found in {}", path.display());
    }
    Ok(certs)
}

pub fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    PrivateKeyDer::from_pem_file(path)
        .with_context(|| format!("loading private key {}", path.display()))
}

pub fn acceptor(
    cert_chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
) -> Result<TlsAcceptor> {
    let config = ServerConfig::builder_with_provider(provider())
        .with_safe_default_protocol_versions()
        .context("selecting TLS protocol versions")?
        .with_no_client_auth()
        .with_single_cert(cert_chain, key)
        .context("building TLS server config")?;
    Ok(TlsAcceptor::from(Arc::new(config)))
}

/// Dials peers and validates their certificate against fixed CA roots.
#[derive(Clone)]
pub struct TlsClient {
    connector: TlsConnector,
    server_name: ServerName<'static>,
}

impl TlsClient {
    pub fn new(roots: Vec<CertificateDer<'static>>, server_name: &str) -> Result<Self> {
        let mut store = RootCertStore::empty();
        for cert in roots {
            store.add(cert).context("adding CA certificate")?;
        }
        let config = ClientConfig::builder_with_provider(provider())
            .with_safe_default_protocol_versions()
            .context("selecting TLS protocol versions")?
            .with_root_certificates(store)
            .with_no_client_auth();
        let server_name = ServerName::try_from(server_name.to_string())
            .with_context(|| format!("invalid TLS server name {server_name:?}"))?;
        Ok(Self {
            connector: TlsConnector::from(Arc::new(config)),
            server_name,
        })
    }

    pub async fn connect(&self, stream: TcpStream) -> std::io::Result<TlsStream<TcpStream>> {
        self.connector
            .connect(self.server_name.clone(), stream)
            .await
    }
}

impl std::fmt::Debug for TlsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsClient")
            .field("server_name", &self.server_name)
            .finish()
    }
}

/// Server side from `[tls]`: needs `cert` and `key`.
pub fn acceptor_from_config(cfg: &TlsConfig) -> Result<TlsAcceptor> {
    let cert = cfg
        .cert
        .as_deref()
        .context("tls.cert is required to serve the control channel")?;
    let key = cfg
        .key
        .as_deref()
        .context("tls.key is required to serve the control channel")?;
    acceptor(load_certs(cert)?, load_private_key(key)?)
}

/// Client side from `[tls]`: needs `ca_cert`.
pub fn client_from_config(cfg: &TlsConfig) -> Result<TlsClient> {
    let ca = cfg
        .ca_cert
        .as_deref()
        .context("tls.ca_cert is required to dial peers over TLS")?;
    TlsClient::new(load_certs(ca)?, &cfg.server_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_self_signed(dir: &Path) -> (std::path::PathBuf, std::path::PathBuf) {
        let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let cert_path = dir.join("node.pem");
        let key_path = dir.join("node.key");
        std::fs::write(&cert_path, certified.cert.pem()).unwrap();
        std::fs::write(&key_path, certified.key_pair.serialize_pem()).unwrap();
        (cert_path, key_path)
    }

    #[test]
    fn test_configs_from_pem_files() {
        let tmp = tempfile::tempdir().unwrap();
        let (cert, key) = write_self_signed(tmp.path());
        let cfg = TlsConfig {
            cert: Some(cert.clone()),
            key: Some(key),
            ca_cert: Some(cert),
            ..Default::default()
        };
        acceptor_from_config(&cfg).unwrap();
        client_from_config(&cfg).unwrap();
    }

    #[test]
    fn test_missing_paths_rejected() {
        let cfg = TlsConfig::default();
        assert!(acceptor_from_config(&cfg).is_err());
        assert!(client_from_config(&cfg).is_err());
    }

    #[test]
    fn test_garbage_pem_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("junk.pem");
        std::fs::write(&path, "not a certificate").unwrap();
        assert!(load_certs(&path).is_err());
        assert!(load_private_key(&path).is_err());
    }
}
