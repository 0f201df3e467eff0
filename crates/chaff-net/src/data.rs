//! Data channel: fetch one stored entry by content address
//!
//! ```text
//! → <64 ASCII hex characters>            (then write-half shutdown)
//! ← <raw ciphertext bytes> | <nothing>   (then close)
//! ```
//!
//! An empty response means "not held here". Requests that are not a valid
//! address get the same empty response. Cleartext TCP unless a TLS
//! acceptor/client is supplied.

use anyhow::Context;
use async_trait::async_trait;
use chaff_chunks::ContentAddress;
use chaff_core::{ChaffError, ChaffResult, PeerEndpoint};
use chaff_engine::PeerFetcher;
use chaff_store::ChunkStore;
use std::io;
use std::sync::{Arc, Once};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, info, warn};

use crate::tls::TlsClient;
use crate::wire::{
    read_to_end_bounded, write_and_close, DEFAULT_REQUEST_DEADLINE, MAX_DATA_REQUEST,
    MAX_DATA_RESPONSE,
};

/// Serves entries from a local chunk store.
#[derive(Clone)]
pub struct DataServer {
    store: Arc<dyn ChunkStore>,
    tls: Option<TlsAcceptor>,
    deadline: Duration,
}

impl DataServer {
    pub fn new(store: Arc<dyn ChunkStore>) -> Self {
        Self {
            store,
            tls: None,
            deadline: DEFAULT_REQUEST_DEADLINE,
        }
    }

    pub fn with_tls(mut self, acceptor: TlsAcceptor) -> Self {
        self.tls = Some(acceptor);
        self
    }

    /// Close any connection that has not been answered within `deadline`.
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
        let local = listener.local_addr().context("data listener address")?;
        if self.tls.is_some() {
            info!(addr = %local, "data channel listening (TLS)");
        } else {
            warn!(addr = %local, "data channel listening in cleartext; use only on trusted networks");
        }
        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            warn!("data accept failed: {e}");
                            continue;
                        }
                    };
                    let server = self.clone();
                    tokio::spawn(async move {
                        match tokio::time::timeout(server.deadline, server.handle(stream)).await {
                            Ok(Ok(())) => {}
                            Ok(Err(e)) => debug!(peer = %peer, "data connection ended: {e}"),
                            Err(_) => debug!(peer = %peer, "data connection hit its deadline; closing"),
                        }
                    });
                }
            }
        }
        info!(addr = %local, "data channel stopped");
        Ok(())
    }

    async fn handle(&self, stream: TcpStream) -> io::Result<()> {
        match &self.tls {
            Some(acceptor) => {
                let mut tls = acceptor.accept(stream).await?;
                serve_one(&mut tls, self.store.as_ref()).await
            }
            None => {
                let mut stream = stream;
                serve_one(&mut stream, self.store.as_ref()).await
            }
        }
    }
}

async fn serve_one<S>(stream: &mut S, store: &dyn ChunkStore) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let request = match read_to_end_bounded(stream, MAX_DATA_REQUEST).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::InvalidData => {
            debug!("oversized data request");
            return write_and_close(stream, b"").await;
        }
        Err(e) => return Err(e),
    };

    let address = std::str::from_utf8(&request)
        .ok()
        .and_then(|s| s.trim().parse::<ContentAddress>().ok());
    let Some(address) = address else {
        debug!(len = request.len(), "data request is not an address");
        return write_and_close(stream, b"").await;
    };

    let entry = match store.get(&address).await {
        Ok(entry) => entry,
        Err(e) => {
            warn!(address = %address, "store lookup failed: {e}");
            None
        }
    };
    debug!(address = %address, hit = entry.is_some(), "data request");
    write_and_close(stream, entry.as_deref().unwrap_or_default()).await
}

static CLEARTEXT_WARNING: Once = Once::new();

/// Fetches entries from peers' data channels.
#[derive(Debug, Clone)]
pub struct DataChannelClient {
    tls: Option<TlsClient>,
}

impl DataChannelClient {
    pub fn cleartext() -> Self {
        CLEARTEXT_WARNING.call_once(|| {
            warn!("data channel client running in cleartext: chunk requests and responses are visible on the wire");
        });
        Self { tls: None }
    }

    pub fn with_tls(tls: TlsClient) -> Self {
        Self { tls: Some(tls) }
    }

    pub async fn fetch_from(
        &self,
        peer: &PeerEndpoint,
        address: &ContentAddress,
    ) -> ChaffResult<Option<Vec<u8>>> {
        let net = |e: io::Error| ChaffError::network(peer, e);
        let tcp = TcpStream::connect(peer.authority()).await.map_err(net)?;
        let request = address.to_hex();

        let response = match &self.tls {
            Some(tls) => {
                let mut stream = tls.connect(tcp).await.map_err(net)?;
                exchange(&mut stream, request.as_bytes()).await
            }
            None => {
                let mut stream = tcp;
                exchange(&mut stream, request.as_bytes()).await
            }
        };
        let bytes = response.map_err(|e| match e.kind() {
            io::ErrorKind::InvalidData => ChaffError::Protocol(format!("{peer}: {e}")),
            _ => net(e),
        })?;

        Ok(if bytes.is_empty() { None } else { Some(bytes) })
    }
}

async fn exchange<S>(stream: &mut S, request: &[u8]) -> io::Result<Vec<u8>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    write_and_close(stream, request).await?;
    read_to_end_bounded(stream, MAX_DATA_RESPONSE).await
}

#[async_trait]
impl PeerFetcher for DataChannelClient {
    async fn fetch(
        &self,
        peer: &PeerEndpoint,
        address: &ContentAddress,
    ) -> ChaffResult<Option<Vec<u8>>> {
        self.fetch_from(peer, address).await
    }
}
