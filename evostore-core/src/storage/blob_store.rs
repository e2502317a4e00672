use crate::error::{EvoError, Result};
use crate::storage::{BufferPool, LayerFileStore, PoolLease, compute_hash};
use crate::types::{LayerId, LayerKey, OwnerId};
use bytes::Bytes;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Bytes of one layer resident on this node.
#[derive(Debug)]
pub struct StoredLayer {
    pub bytes: Bytes,
    pub sha256: String,
    pub ref_count: i64,
    _lease: PoolLease,
}

#[derive(Debug, Clone)]
pub struct PutLayerResult {
    pub sha256: String,
    pub replaced: bool,
}

type LayerSlot = Arc<Mutex<Option<StoredLayer>>>;

/// Maps `(owner, layer_id)` to resident bytes.
///
/// The map lock is held only to find or create a slot; the per-slot mutex
/// serializes writers of one key while other keys proceed independently.
/// Every resident layer holds a lease on the node's buffer pool.
pub struct BlobStore {
    pool: Arc<BufferPool>,
    files: Option<LayerFileStore>,
    slots: RwLock<HashMap<LayerKey, LayerSlot>>,
}

impl BlobStore {
    pub fn new(pool: Arc<BufferPool>) -> Self {
        Self {
            pool,
            files: None,
            slots: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_files(pool: Arc<BufferPool>, files: LayerFileStore) -> Self {
        Self {
            pool,
            files: Some(files),
            slots: RwLock::new(HashMap::new()),
        }
    }

    pub fn pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }

    async fn slot(&self, key: LayerKey) -> LayerSlot {
        if let Some(slot) = self.slots.read().await.get(&key) {
            return slot.clone();
        }
        self.slots.write().await.entry(key).or_default().clone()
    }

    async fn existing_slot(&self, key: LayerKey) -> Option<LayerSlot> {
        self.slots.read().await.get(&key).cloned()
    }

    /// Drops the map entry of an empty slot. Callers must have released
    /// the slot's lock and hold no other clone of it.
    ///
    /// Slots are only handed out under the map lock, so with the write lock
    /// held a strong count of two (map plus `slot`) means nobody else can
    /// be about to fill it.
    async fn prune_slot(&self, key: LayerKey, slot: &LayerSlot) {
        let mut slots = self.slots.write().await;
        let Some(live) = slots.get(&key) else {
            return;
        };
        if !Arc::ptr_eq(live, slot) || Arc::strong_count(slot) != 2 {
            return;
        }

        let empty = match slot.try_lock() {
            Ok(current) => current.is_none(),
            Err(_) => false,
        };
        if empty {
            slots.remove(&key);
        }
    }

    /// Stores `bytes` under `key`, replacing any previous bytes but keeping
    /// their reference count.
    pub async fn put(&self, key: LayerKey, bytes: Bytes) -> Result<PutLayerResult> {
        let slot = self.slot(key).await;
        let result = self.put_in_slot(&slot, key, bytes).await;
        if result.is_err() {
            self.prune_slot(key, &slot).await;
        }
        result
    }

    async fn put_in_slot(
        &self,
        slot: &LayerSlot,
        key: LayerKey,
        bytes: Bytes,
    ) -> Result<PutLayerResult> {
        let mut current = slot.lock().await;

        let lease = self.pool.try_acquire(bytes.len() as u64)?;
        if let Some(files) = &self.files {
            files.put_layer(key, &bytes).await?;
        }

        let sha256 = compute_hash(&bytes);
        let ref_count = current.as_ref().map(|layer| layer.ref_count).unwrap_or(0);
        let replaced = current
            .replace(StoredLayer {
                bytes,
                sha256: sha256.clone(),
                ref_count,
                _lease: lease,
            })
            .is_some();

        Ok(PutLayerResult { sha256, replaced })
    }

    /// Returns the bytes and checksum stored under `key`.
    pub async fn get(&self, key: LayerKey, expected_size: Option<u64>) -> Result<(Bytes, String)> {
        let not_found = || EvoError::NotFound(format!("layer {}", key));

        let slot = self.existing_slot(key).await.ok_or_else(not_found)?;
        let current = slot.lock().await;
        if current.is_none() {
            drop(current);
            self.prune_slot(key, &slot).await;
            return Err(not_found());
        }
        let layer = current.as_ref().ok_or_else(not_found)?;

        let actual = layer.bytes.len() as u64;
        if let Some(expected) = expected_size {
            if expected != actual {
                return Err(EvoError::SizeMismatch {
                    layer_id: key.layer_id,
                    expected,
                    actual,
                });
            }
        }

        Ok((layer.bytes.clone(), layer.sha256.clone()))
    }

    /// Adds `delta` to the count of every listed layer of `owner` and drops
    /// layers whose count reaches zero or below. Returns the dropped ids.
    ///
    /// Every layer must exist before any count changes. A layer listed more
    /// than once is adjusted once.
    pub async fn adjust_refs(
        &self,
        owner: OwnerId,
        layer_ids: &[LayerId],
        delta: i64,
    ) -> Result<Vec<LayerId>> {
        let mut seen = HashSet::with_capacity(layer_ids.len());
        let layer_ids: Vec<LayerId> = layer_ids
            .iter()
            .copied()
            .filter(|layer_id| seen.insert(*layer_id))
            .collect();

        let mut slots = Vec::with_capacity(layer_ids.len());
        for layer_id in layer_ids {
            let key = LayerKey::new(owner, layer_id);
            let slot = self.existing_slot(key).await;
            let resident = match &slot {
                Some(slot) => slot.lock().await.is_some(),
                None => false,
            };
            match slot {
                Some(slot) if resident => slots.push((key, slot)),
                _ => return Err(EvoError::NotFound(format!("layer {}", key))),
            }
        }

        let mut released = Vec::new();
        for (key, slot) in slots {
            let mut current = slot.lock().await;
            let Some(layer) = current.as_mut() else {
                return Err(EvoError::NotFound(format!("layer {}", key)));
            };

            layer.ref_count += delta;
            if layer.ref_count <= 0 {
                *current = None;
                if let Some(files) = &self.files {
                    files.delete_layer(key).await?;
                }
                drop(current);
                self.prune_slot(key, &slot).await;
                released.push(key.layer_id);
            }
        }

        if !released.is_empty() {
            tracing::debug!("Released {} layers of owner {}", released.len(), owner);
        }
        Ok(released)
    }

    pub async fn remove(&self, key: LayerKey) -> Result<bool> {
        let Some(slot) = self.existing_slot(key).await else {
            return Ok(false);
        };

        let mut current = slot.lock().await;
        let removed = current.take().is_some();
        if let Some(files) = &self.files {
            files.delete_layer(key).await?;
        }
        drop(current);
        self.prune_slot(key, &slot).await;
        Ok(removed)
    }

    /// Loads every layer file back into memory. Counts start at zero.
    pub async fn recover(&self) -> Result<usize> {
        let Some(files) = &self.files else {
            return Ok(0);
        };

        let layers = files.scan().await?;
        let mut slots = self.slots.write().await;
        for (key, bytes) in &layers {
            let lease = self.pool.try_acquire(bytes.len() as u64)?;
            slots.insert(
                *key,
                Arc::new(Mutex::new(Some(StoredLayer {
                    bytes: bytes.clone(),
                    sha256: compute_hash(bytes),
                    ref_count: 0,
                    _lease: lease,
                }))),
            );
        }

        tracing::info!(
            "Recovered {} layers ({} bytes) from {}",
            layers.len(),
            self.pool.in_use(),
            files.base_path().display()
        );
        Ok(layers.len())
    }

    pub async fn ref_count(&self, key: LayerKey) -> Option<i64> {
        let slot = self.existing_slot(key).await?;
        let current = slot.lock().await;
        current.as_ref().map(|layer| layer.ref_count)
    }

    /// Number of resident layers.
    pub async fn len(&self) -> usize {
        let slots: Vec<LayerSlot> = self.slots.read().await.values().cloned().collect();
        let mut count = 0;
        for slot in slots {
            if slot.lock().await.is_some() {
                count += 1;
            }
        }
        count
    }
}
