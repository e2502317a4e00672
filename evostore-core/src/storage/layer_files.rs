use crate::error::{EvoError, Result};
use crate::types::LayerKey;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// LayerFileStore keeps one file per stored layer:
/// `layers/{owner}/layer.{layer_id}`.
pub struct LayerFileStore {
    base_path: PathBuf,
}

impl LayerFileStore {
    pub fn new(base_path: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(base_path.join("layers"))?;
        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub async fn put_layer(&self, key: LayerKey, data: &Bytes) -> Result<PathBuf> {
        let layer_path = self.layer_path(key);
        if let Some(parent) = layer_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let tmp_path = layer_path.with_extension(format!("{}.tmp", ulid::Ulid::new()));
        let mut file = fs::File::create(&tmp_path).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&tmp_path, &layer_path).await?;
        Ok(layer_path)
    }

    pub async fn delete_layer(&self, key: LayerKey) -> Result<()> {
        match fs::remove_file(self.layer_path(key)).await {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(error.into()),
        }
    }

    /// Reads back every complete layer file; leftover temp files are removed.
    pub async fn scan(&self) -> Result<Vec<(LayerKey, Bytes)>> {
        let mut found = Vec::new();
        let mut owners = fs::read_dir(self.base_path.join("layers")).await?;

        while let Some(owner_dir) = owners.next_entry().await? {
            let Some(owner) = owner_dir
                .file_name()
                .to_str()
                .and_then(|name| name.parse::<u64>().ok())
            else {
                continue;
            };

            let mut files = fs::read_dir(owner_dir.path()).await?;
            while let Some(entry) = files.next_entry().await? {
                let name = entry.file_name();
                let Some(name) = name.to_str() else {
                    continue;
                };

                if name.ends_with(".tmp") {
                    tracing::warn!("Removing incomplete layer file {}", entry.path().display());
                    fs::remove_file(entry.path()).await?;
                    continue;
                }

                let Some(layer_id) = parse_layer_file_name(name) else {
                    continue;
                };

                let bytes = fs::read(entry.path()).await?;
                found.push((LayerKey::new(owner, layer_id), Bytes::from(bytes)));
            }
        }

        found.sort_by_key(|(key, _)| *key);
        Ok(found)
    }

    pub fn layer_path(&self, key: LayerKey) -> PathBuf {
        self.base_path
            .join("layers")
            .join(key.owner.to_string())
            .join(Self::layer_file_name(key.layer_id))
    }

    pub fn layer_file_name(layer_id: u64) -> String {
        format!("layer.{}", layer_id)
    }
}

fn parse_layer_file_name(name: &str) -> Option<u64> {
    name.strip_prefix("layer.")?.parse().ok()
}

pub fn compute_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

pub fn verify_hash(data: &[u8], expected_hash: &str) -> Result<()> {
    let actual = compute_hash(data);
    if !actual.eq_ignore_ascii_case(expected_hash.trim()) {
        return Err(EvoError::HashMismatch {
            expected: expected_hash.to_string(),
            actual,
        });
    }
    Ok(())
}
