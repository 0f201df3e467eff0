//! One-shot subcommands: keygen, publish, fetch

use anyhow::{Context, Result};
use chaff_core::config::{ChaffConfig, StoreBackend};
use chaff_core::PeerEndpoint;
use chaff_crypto::{public_key_from_pem, Keypair};
use chaff_engine::{
    publish_file, reconstruct_to_dir, EncodeOptions, PeerDirectory, PeerFetcher, RetrievalEngine,
};
use chaff_net::{client_from_config, ControlClient, DataChannelClient, ManifestShelf};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

pub const PRIVATE_KEY_FILE: &str = "priv.pem";
pub const PUBLIC_KEY_FILE: &str = "pub.pem";

/// Write a fresh keypair to `<out>/priv.pem` and `<out>/pub.pem`.
pub async fn keygen(out: &Path) -> Result<(PathBuf, PathBuf)> {
    let keypair = tokio::task::spawn_blocking(Keypair::generate)
        .await
        .context("key generation task")??;

    tokio::fs::create_dir_all(out)
        .await
        .with_context(|| format!("creating {}", out.display()))?;
    let private = out.join(PRIVATE_KEY_FILE);
    let public = out.join(PUBLIC_KEY_FILE);
    let private_pem = keypair.private_key_pem()?;
    tokio::fs::write(&private, private_pem.as_bytes())
        .await
        .with_context(|| format!("writing {}", private.display()))?;
    restrict_permissions(&private).await?;
    tokio::fs::write(&public, keypair.public_key_pem()?)
        .await
        .with_context(|| format!("writing {}", public.display()))?;

    info!(private = %private.display(), public = %public.display(), "keypair written");
    Ok((private, public))
}

#[cfg(unix)]
async fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .await
        .with_context(|| format!("restricting permissions on {}", path.display()))
}

#[cfg(not(unix))]
async fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

/// Encode `file` for `recipient` into the configured store and shelve the
/// manifest so the control channel can serve it. Returns the manifest path.
pub async fn publish(
    config: &ChaffConfig,
    file: &Path,
    recipient: Option<&Path>,
    opts: &EncodeOptions,
) -> Result<PathBuf> {
    let recipient = recipient.unwrap_or(config.shelf.public_key.as_path());
    let pem = tokio::fs::read_to_string(recipient)
        .await
        .with_context(|| format!("reading recipient key {}", recipient.display()))?;
    let public = public_key_from_pem(&pem)?;

    if config.store.backend == StoreBackend::Memory {
        warn!("store backend is memory: published entries vanish when this process exits");
    }
    let store = chaff_store::build_store(&config.store)?;
    let manifest = publish_file(file, &public, store.as_ref(), opts).await?;

    let shelf = ManifestShelf::from_config(&config.shelf);
    let path = shelf.put_manifest(&manifest).await?;
    info!(
        file = %file.display(),
        manifest = %path.display(),
        chunks = manifest.chunks().len(),
        decoys = manifest.decoy_hashes().len(),
        "published"
    );
    Ok(path)
}

/// Ask `peer`'s control channel for `filename`'s manifest, then resolve and
/// decode it into `<out>/RECEIVED_<filename>`.
pub async fn fetch(
    config: &ChaffConfig,
    peer: &str,
    filename: &str,
    private_key: &Path,
    out: &Path,
) -> Result<PathBuf> {
    let peer: PeerEndpoint = peer.parse()?;
    let tls = client_from_config(&config.tls)?;
    let control = ControlClient::new(tls.clone(), config.retrieval.peer_timeout());
    let manifest = control
        .get_manifest(&peer, filename)
        .await?
        .with_context(|| format!("{peer} has no manifest for {filename:?}"))?;

    let pem = tokio::fs::read_to_string(private_key)
        .await
        .with_context(|| format!("reading private key {}", private_key.display()))?;
    let keypair = Keypair::from_private_key_pem(&pem)?;

    let fetcher: Arc<dyn PeerFetcher> = if config.tls.data_channel {
        Arc::new(DataChannelClient::with_tls(tls))
    } else {
        Arc::new(DataChannelClient::cleartext())
    };
    let engine = RetrievalEngine::new(
        chaff_store::build_store(&config.store)?,
        PeerDirectory::from_config(&config.peers)?,
        fetcher,
        config.retrieval.clone(),
    );

    let path = reconstruct_to_dir(&manifest, &keypair, &engine, out).await?;
    info!(peer = %peer, output = %path.display(), "fetched");
    Ok(path)
}
