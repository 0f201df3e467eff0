//! Publish a file into a chunk store; reconstruct it from a manifest

use chaff_chunks::ContentAddress;
use chaff_core::{ChaffError, ChaffResult};
use chaff_crypto::{unwrap_key, wrap_key, Keypair, Manifest, RsaPublicKey};
use chaff_store::ChunkStore;
use rand::seq::SliceRandom;
use rand::Rng;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::codec::{decode, encode, EncodeOptions, EncodedFile};
use crate::retrieval::RetrievalEngine;

/// Prefix given to reconstructed files
pub const RECEIVED_PREFIX: &str = "RECEIVED_";

/// Encode `data`, wrap its key for `recipient`, and write every real and
/// decoy entry to `store` in a random order, spaced by `opts.write_jitter`
/// when set.
pub async fn publish(
    filename: &str,
    data: &[u8],
    recipient: &RsaPublicKey,
    store: &dyn ChunkStore,
    opts: &EncodeOptions,
) -> ChaffResult<Manifest> {
    let EncodedFile {
        key,
        mut manifest,
        entries,
        decoys,
    } = encode(filename, data, opts)?;
    manifest.set_wrapped_key(wrap_key(recipient, &key)?);
    drop(key);

    let mut writes: Vec<(&ContentAddress, &[u8])> = entries
        .iter()
        .chain(decoys.iter())
        .map(|e| (&e.address, e.ciphertext.as_slice()))
        .collect();
    writes.shuffle(&mut rand::thread_rng());
    match opts.write_jitter {
        None => store.put_entries(&writes).await?,
        Some((min, max)) => {
            for (i, (address, bytes)) in writes.iter().enumerate() {
                if i > 0 {
                    tokio::time::sleep(jitter(min, max)).await;
                }
                store.put(address, bytes).await?;
            }
        }
    }

    info!(
        filename,
        entries = entries.len(),
        decoys = decoys.len(),
        "published"
    );
    Ok(manifest)
}

fn jitter(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    rand::thread_rng().gen_range(min..=max)
}

/// Read `path` and publish it under its final path component.
pub async fn publish_file(
    path: &Path,
    recipient: &RsaPublicKey,
    store: &dyn ChunkStore,
    opts: &EncodeOptions,
) -> ChaffResult<Manifest> {
    let encoding_error = |source: std::io::Error| ChaffError::Encoding {
        path: path.to_path_buf(),
        source,
    };
    let data = tokio::fs::read(path).await.map_err(encoding_error)?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| {
            encoding_error(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "path has no file name",
            ))
        })?;
    publish(&filename, &data, recipient, store, opts).await
}

/// Unwrap the file key, resolve every real entry, and decode in manifest order.
///
/// A manifest carrying every real entry in `chunk_data` decodes without
/// touching the store or peers.
pub async fn reconstruct(
    manifest: &Manifest,
    keypair: &Keypair,
    engine: &RetrievalEngine,
) -> ChaffResult<Vec<u8>> {
    let key = unwrap_key(keypair.private_key(), manifest.wrapped_key().as_bytes())?;

    let embedded = manifest.chunk_source();
    if manifest.has_embedded_ciphertext()
        && manifest.chunks().iter().all(|a| embedded.get(a).is_some())
    {
        return decode(manifest, &key, |a| embedded.get(a));
    }

    let found = engine.resolve(manifest).await.into_result()?;
    decode(manifest, &key, |a| found.get(a).map(Vec::as_slice))
}

/// Reconstruct into `dir/RECEIVED_<filename>`. The file appears only once
/// complete; on any error nothing is left at the output path. Each call
/// stages into its own temp file, so concurrent reconstructions of the same
/// name do not clobber each other.
pub async fn reconstruct_to_dir(
    manifest: &Manifest,
    keypair: &Keypair,
    engine: &RetrievalEngine,
    dir: &Path,
) -> ChaffResult<PathBuf> {
    let name = Path::new(manifest.filename())
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| {
            ChaffError::Protocol(format!(
                "manifest filename {:?} has no usable final component",
                manifest.filename()
            ))
        })?;

    let data = reconstruct(manifest, keypair, engine).await?;

    tokio::fs::create_dir_all(dir).await?;
    let out = dir.join(format!("{RECEIVED_PREFIX}{name}"));
    let bytes = data.len();
    let staging_dir = dir.to_path_buf();
    let target = out.clone();
    let prefix = format!(".{RECEIVED_PREFIX}{name}.");
    tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        // dropping the NamedTempFile on any error removes it
        let mut tmp = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(".chaff_tmp")
            .tempfile_in(&staging_dir)?;
        tmp.write_all(&data)?;
        debug!(tmp = %tmp.path().display(), "staged");
        tmp.persist(&target).map_err(|e| {
            warn!(tmp = %e.file.path().display(), "rename failed: {}", e.error);
            e.error
        })?;
        Ok(())
    })
    .await
    .map_err(|e| ChaffError::Io(std::io::Error::other(e)))??;

    info!(output = %out.display(), bytes, "reconstructed");
    Ok(out)
}
