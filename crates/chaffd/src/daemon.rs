//! Daemon lifecycle: store, shelf, TLS, both listeners, shutdown on ctrl-c

use anyhow::{Context, Result};
use chaff_core::config::ChaffConfig;
use chaff_net::{acceptor_from_config, ControlServer, DataServer, ManifestShelf};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

pub async fn run(config: ChaffConfig) -> Result<()> {
    info!("daemon starting");

    let control = TcpListener::bind(&config.node.control_listen)
        .await
        .with_context(|| format!("binding control channel {}", config.node.control_listen))?;
    let data = TcpListener::bind(&config.node.data_listen)
        .await
        .with_context(|| format!("binding data channel {}", config.node.data_listen))?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("interrupt received, shutting down"),
            Err(e) => error!("listening for ctrl-c failed: {e}"),
        }
        let _ = shutdown_tx.send(true);
    });

    serve(&config, control, data, shutdown_rx).await
}

/// Run both servers on already-bound listeners until `shutdown` fires.
pub async fn serve(
    config: &ChaffConfig,
    control: TcpListener,
    data: TcpListener,
    shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let store = chaff_store::build_store(&config.store)?;
    info!(
        backend = ?config.store.backend,
        partitions = config.store.partitions,
        "chunk store ready"
    );

    let shelf = ManifestShelf::from_config(&config.shelf);
    let acceptor = acceptor_from_config(&config.tls)?;

    let deadline = config.node.request_timeout();
    let mut data_server = DataServer::new(store).with_deadline(deadline);
    if config.tls.data_channel {
        data_server = data_server.with_tls(acceptor.clone());
    }
    let control_server = ControlServer::new(acceptor, shelf).with_deadline(deadline);

    let (control_done, data_done) = tokio::join!(
        control_server.serve(control, shutdown.clone()),
        data_server.serve(data, shutdown),
    );
    control_done.context("control channel")?;
    data_done.context("data channel")?;

    info!("daemon stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::write_tls;
    use chaff_chunks::ContentAddress;
    use chaff_core::config::StoreBackend;
    use chaff_core::PeerEndpoint;
    use chaff_net::{client_from_config, ControlClient, DataChannelClient};
    use std::time::Duration;

    #[tokio::test]
    async fn test_serves_both_channels_until_shutdown() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = ChaffConfig::default();
        config.store.backend = StoreBackend::Fs;
        config.store.root = tmp.path().join("chunks");
        config.shelf.manifest_dir = tmp.path().join("manifest");
        config.shelf.public_key = tmp.path().join("pub.pem");
        config.tls.data_channel = true;
        write_tls(&mut config, tmp.path());
        std::fs::write(&config.shelf.public_key, "not really a key").unwrap();

        let control = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let data = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let control_peer = PeerEndpoint::from(control.local_addr().unwrap());
        let data_peer = PeerEndpoint::from(data.local_addr().unwrap());

        let (tx, rx) = watch::channel(false);
        let cfg = config.clone();
        let daemon = tokio::spawn(async move { serve(&cfg, control, data, rx).await });

        let tls = client_from_config(&config.tls).unwrap();
        let control_client = ControlClient::new(tls.clone(), Duration::from_secs(5));
        assert!(control_client
            .get_manifest(&control_peer, "nothing.bin")
            .await
            .unwrap()
            .is_none());
        // the shelved key is not a valid PEM
        assert!(control_client.get_key(&control_peer).await.is_err());

        let data_client = DataChannelClient::with_tls(tls);
        let addr: ContentAddress = "0".repeat(64).parse().unwrap();
        assert!(data_client.fetch_from(&data_peer, &addr).await.unwrap().is_none());

        tx.send(true).unwrap();
        daemon.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_request_timeout_closes_idle_data_connection() {
        use tokio::io::AsyncReadExt;

        let tmp = tempfile::tempdir().unwrap();
        let mut config = ChaffConfig::default();
        config.shelf.manifest_dir = tmp.path().join("manifest");
        config.node.request_timeout_ms = 100;
        write_tls(&mut config, tmp.path());

        let control = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let data = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let data_addr = data.local_addr().unwrap();
        let (tx, rx) = watch::channel(false);
        let cfg = config.clone();
        let daemon = tokio::spawn(async move { serve(&cfg, control, data, rx).await });

        let mut idle = tokio::net::TcpStream::connect(data_addr).await.unwrap();
        let mut buf = [0u8; 8];
        let read = tokio::time::timeout(Duration::from_secs(3), idle.read(&mut buf))
            .await
            .expect("idle connection was not closed");
        assert!(matches!(read, Ok(0) | Err(_)));

        tx.send(true).unwrap();
        daemon.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_missing_tls_material_fails_startup() {
        let control = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let data = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (_tx, rx) = watch::channel(false);
        let result = serve(&ChaffConfig::default(), control, data, rx).await;
        assert!(result.is_err());
    }
}
