//! Control channel: fetch a manifest by filename, or the node's public key
//!
//! One TLS connection per request. Request and response are single JSON
//! documents, each terminated by the sender closing its write half:
//!
//! ```text
//! → {"action":"get_manifest","filename":"report.pdf"}
//! ← {"status":"OK","data":"<manifest JSON>"} | {"status":"NOT_FOUND"}
//!
//! → {"action":"get_key"}
//! ← {"status":"OK","data":"<public key PEM>"} | {"status":"NOT_FOUND"}
//! ```
//!
//! A request that does not parse gets no response; the server closes the
//! connection.

use anyhow::Context;
use chaff_core::{ChaffError, ChaffResult, PeerEndpoint};
use chaff_crypto::{public_key_from_pem, Manifest, RsaPublicKey};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, info, warn};

use crate::tls::TlsClient;
use crate::wire::{
    read_to_end_bounded, write_and_close, DEFAULT_REQUEST_DEADLINE, MAX_CONTROL_MESSAGE,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ControlRequest {
    GetManifest { filename: String },
    GetKey,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum ControlResponse {
    #[serde(rename = "OK")]
    Ok { data: String },
    #[serde(rename = "NOT_FOUND")]
    NotFound,
}

const MANIFEST_SUFFIX: &str = "_manifest.json";

/// Directory of `<filename>_manifest.json` files plus one public key PEM.
#[derive(Debug, Clone)]
pub struct ManifestShelf {
    manifest_dir: PathBuf,
    public_key: PathBuf,
}

impl ManifestShelf {
    pub fn new(manifest_dir: impl Into<PathBuf>, public_key: impl Into<PathBuf>) -> Self {
        Self {
            manifest_dir: manifest_dir.into(),
            public_key: public_key.into(),
        }
    }

    pub fn from_config(cfg: &chaff_core::config::ShelfConfig) -> Self {
        Self::new(&cfg.manifest_dir, &cfg.public_key)
    }

    /// Path for `filename`, or `None` when the name could escape the directory.
    fn manifest_path(&self, filename: &str) -> Option<PathBuf> {
        let unsafe_name = filename.is_empty()
            || filename.contains(['/', '\\', '\0'])
            || filename.contains("..");
        if unsafe_name {
            return None;
        }
        Some(
            self.manifest_dir
                .join(format!("{filename}{MANIFEST_SUFFIX}")),
        )
    }

    pub async fn manifest_text(&self, filename: &str) -> io::Result<Option<String>> {
        match self.manifest_path(filename) {
            Some(path) => read_optional(&path).await,
            None => Ok(None),
        }
    }

    pub async fn public_key_text(&self) -> io::Result<Option<String>> {
        read_optional(&self.public_key).await
    }

    /// Write `manifest` to the shelf under its filename.
    pub async fn put_manifest(&self, manifest: &Manifest) -> ChaffResult<PathBuf> {
        let path = self.manifest_path(manifest.filename()).ok_or_else(|| {
            ChaffError::Protocol(format!(
                "manifest filename {:?} cannot be shelved",
                manifest.filename()
            ))
        })?;
        tokio::fs::create_dir_all(&self.manifest_dir).await?;
        tokio::fs::write(&path, manifest.to_json()?).await?;
        Ok(path)
    }

    pub async fn put_public_key(&self, pem: &str) -> io::Result<()> {
        if let Some(parent) = self.public_key.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.public_key, pem).await
    }

    async fn answer(&self, request: &ControlRequest) -> io::Result<ControlResponse> {
        let text = match request {
            ControlRequest::GetManifest { filename } => self.manifest_text(filename).await?,
            ControlRequest::GetKey => self.public_key_text().await?,
        };
        Ok(match text {
            Some(data) => ControlResponse::Ok { data },
            None => ControlResponse::NotFound,
        })
    }
}

async fn read_optional(path: &Path) -> io::Result<Option<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// TLS server answering control requests from a `ManifestShelf`.
#[derive(Clone)]
pub struct ControlServer {
    acceptor: TlsAcceptor,
    shelf: Arc<ManifestShelf>,
    deadline: Duration,
}

impl ControlServer {
    pub fn new(acceptor: TlsAcceptor, shelf: ManifestShelf) -> Self {
        Self {
            acceptor,
            shelf: Arc::new(shelf),
            deadline: DEFAULT_REQUEST_DEADLINE,
        }
    }

    /// Close any connection that has not been answered within `deadline`,
    /// TLS handshake included.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Accept until `shutdown` flips to `true` (or its sender is dropped).
    pub async fn serve(
        self,
        listener: TcpListener,
        mut shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<()> {
        let local = listener.local_addr().context("control listener address")?;
        info!(addr = %local, "control channel listening (TLS)");
        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            warn!("control accept failed: {e}");
                            continue;
                        }
                    };
                    let server = self.clone();
                    tokio::spawn(async move {
                        match tokio::time::timeout(server.deadline, server.handle(stream)).await {
                            Ok(Ok(())) => {}
                            Ok(Err(e)) => debug!(peer = %peer, "control connection ended: {e}"),
                            Err(_) => debug!(peer = %peer, "control connection hit its deadline; closing"),
                        }
                    });
                }
            }
        }
        info!(addr = %local, "control channel stopped");
        Ok(())
    }

    async fn handle(&self, stream: TcpStream) -> io::Result<()> {
        let mut tls = self.acceptor.accept(stream).await?;
        respond(&mut tls, &self.shelf).await
    }
}

async fn respond<S>(stream: &mut S, shelf: &ManifestShelf) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let raw = read_to_end_bounded(stream, MAX_CONTROL_MESSAGE).await?;
    let request: ControlRequest = match serde_json::from_slice(&raw) {
        Ok(req) => req,
        Err(e) => {
            debug!("dropping malformed control request: {e}");
            return write_and_close(stream, b"").await;
        }
    };

    let response = shelf.answer(&request).await?;
    debug!(?request, found = matches!(response, ControlResponse::Ok { .. }), "control request");
    let body = serde_json::to_vec(&response).map_err(io::Error::other)?;
    write_and_close(stream, &body).await
}

/// Issues control requests over TLS, one connection each.
#[derive(Debug, Clone)]
pub struct ControlClient {
    tls: TlsClient,
    timeout: Duration,
}

impl ControlClient {
    pub fn new(tls: TlsClient, timeout: Duration) -> Self {
        Self { tls, timeout }
    }

    /// Fetch and validate a manifest. `Ok(None)` when the peer has none.
    pub async fn get_manifest(
        &self,
        peer: &PeerEndpoint,
        filename: &str,
    ) -> ChaffResult<Option<Manifest>> {
        let request = ControlRequest::GetManifest {
            filename: filename.to_string(),
        };
        match self.exchange(peer, &request).await? {
            ControlResponse::Ok { data } => Manifest::from_json(&data).map(Some),
            ControlResponse::NotFound => Ok(None),
        }
    }

    /// Fetch the peer's public key. `Ok(None)` when the peer has none.
    pub async fn get_key(&self, peer: &PeerEndpoint) -> ChaffResult<Option<RsaPublicKey>> {
        match self.exchange(peer, &ControlRequest::GetKey).await? {
            ControlResponse::Ok { data } => public_key_from_pem(&data).map(Some),
            ControlResponse::NotFound => Ok(None),
        }
    }

    async fn exchange(
        &self,
        peer: &PeerEndpoint,
        request: &ControlRequest,
    ) -> ChaffResult<ControlResponse> {
        tokio::time::timeout(self.timeout, self.exchange_inner(peer, request))
            .await
            .map_err(|_| ChaffError::timeout(peer))?
    }

    async fn exchange_inner(
        &self,
        peer: &PeerEndpoint,
        request: &ControlRequest,
    ) -> ChaffResult<ControlResponse> {
        let net = |e: io::Error| ChaffError::network(peer, e);

        let tcp = TcpStream::connect(peer.authority()).await.map_err(net)?;
        let mut tls = self.tls.connect(tcp).await.map_err(net)?;

        let body = serde_json::to_vec(request)
            .map_err(|e| ChaffError::Protocol(format!("encoding control request: {e}")))?;
        write_and_close(&mut tls, &body).await.map_err(net)?;

        let raw = read_to_end_bounded(&mut tls, MAX_CONTROL_MESSAGE)
            .await
            .map_err(|e| match e.kind() {
                io::ErrorKind::InvalidData => ChaffError::Protocol(e.to_string()),
                _ => net(e),
            })?;
        if raw.is_empty() {
            return Err(ChaffError::Protocol(format!(
                "{peer} closed the control connection without answering"
            )));
        }
        serde_json::from_slice(&raw)
            .map_err(|e| ChaffError::Protocol(format!("malformed control response: {e}")))
    }
}
