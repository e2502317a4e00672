use crate::error::Result;
use crate::lineage::trie::PrefixTrie;
use crate::storage::RecordStore;
use crate::types::{LineageChain, ModelId, ModelRecord, PrefixMatch};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// One shard of the lineage registry.
///
/// Records are immutable once committed; a later `store_meta` for the same
/// id swaps in a new `Arc` and rewrites its trie entries under the same
/// write lock, so readers always see whole records.
pub struct LineageIndex {
    state: RwLock<IndexState>,
    record_store: Option<Arc<RecordStore>>,
}

#[derive(Default)]
struct IndexState {
    records: HashMap<ModelId, Arc<ModelRecord>>,
    trie: PrefixTrie,
    next_seq: u64,
}

impl IndexState {
    fn insert(&mut self, record: Arc<ModelRecord>) -> Option<Arc<ModelRecord>> {
        let previous = self.records.insert(record.model_id, record.clone());
        if let Some(old) = &previous {
            self.trie.remove(&old.edges, old.seq, old.model_id);
        }
        self.trie.insert(&record.edges, record.seq, record.model_id);
        self.next_seq = self.next_seq.max(record.seq + 1);
        previous
    }
}

impl Default for LineageIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl LineageIndex {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(IndexState {
                next_seq: 1,
                ..IndexState::default()
            }),
            record_store: None,
        }
    }

    /// Opens an index backed by `store`, replaying every persisted record.
    pub fn with_record_store(store: Arc<RecordStore>) -> Result<Self> {
        let mut state = IndexState {
            next_seq: 1,
            ..IndexState::default()
        };

        for record in store.load_records()? {
            state.insert(Arc::new(record));
        }

        tracing::info!(
            "Recovered {} model records from {}",
            state.records.len(),
            store.db_path().display()
        );

        Ok(Self {
            state: RwLock::new(state),
            record_store: Some(store),
        })
    }

    /// Commits `record`, replacing any previous record with the same id.
    pub async fn store_meta(&self, mut record: ModelRecord) -> Result<Arc<ModelRecord>> {
        let mut state = self.state.write().await;

        record.seq = state.next_seq;
        record.stored_at = Utc::now();

        if let Some(store) = &self.record_store {
            store.upsert_record(&record)?;
        }

        let record = Arc::new(record);
        if let Some(old) = state.insert(record.clone()) {
            tracing::debug!(
                "Model {} overwritten (seq {} -> {})",
                old.model_id,
                old.seq,
                record.seq
            );
        }

        Ok(record)
    }

    pub async fn get_model(&self, model_id: ModelId) -> Option<Arc<ModelRecord>> {
        self.state.read().await.records.get(&model_id).cloned()
    }

    pub async fn get_prefix(&self, query: &LineageChain) -> Option<PrefixMatch> {
        let state = self.state.read().await;
        let hit = state.trie.longest_match(query)?;
        let record = state.records.get(&hit.model_id)?;

        let take = hit.depth.min(record.layers.len());
        Some(PrefixMatch {
            model_id: record.model_id,
            layer_ids: record.layers[..take]
                .iter()
                .map(|layer| layer.layer_id)
                .collect(),
            matched_layers: hit.depth,
            stored_at: record.stored_at,
        })
    }

    /// Drops the record for `model_id`; returns it if one existed.
    pub async fn retire(&self, model_id: ModelId) -> Result<Option<Arc<ModelRecord>>> {
        let mut state = self.state.write().await;

        if let Some(store) = &self.record_store {
            store.delete_record(model_id)?;
        }

        let removed = state.records.remove(&model_id);
        if let Some(record) = &removed {
            state.trie.remove(&record.edges, record.seq, record.model_id);
        }
        Ok(removed)
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(model_id: ModelId, edges: &[u64], layer_ids: &[u64]) -> ModelRecord {
        let owners = vec![model_id; layer_ids.len()];
        let sizes = vec![80; layer_ids.len()];
        ModelRecord::from_parts(model_id, edges.to_vec(), layer_ids, &owners, &sizes, 0.0)
            .unwrap()
    }

    fn chain(edges: &[u64]) -> LineageChain {
        LineageChain::new(edges.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_reference_prefix_scenario() {
        let index = LineageIndex::new();
        index.store_meta(record(1, &[0, 1, 1, 2], &[0, 1, 2])).await.unwrap();
        index.store_meta(record(2, &[0, 3, 3, 2], &[0, 3, 2])).await.unwrap();

        let found = index.get_prefix(&chain(&[0, 3, 3, 1])).await.unwrap();
        assert_eq!(found.model_id, 2);
        assert_eq!(found.layer_ids, vec![0, 3]);
        assert_eq!(found.matched_layers, 2);
    }

    #[tokio::test]
    async fn test_shared_root_alone_matches_one_layer() {
        let index = LineageIndex::new();
        index.store_meta(record(1, &[0, 1, 1, 2], &[0, 1, 2])).await.unwrap();

        let found = index.get_prefix(&chain(&[0, 3, 3, 1])).await.unwrap();
        assert_eq!(found.model_id, 1);
        assert_eq!(found.layer_ids, vec![0]);
        assert_eq!(found.matched_layers, 1);

        assert!(index.get_prefix(&chain(&[3, 0])).await.is_none());
        assert!(index.get_prefix(&chain(&[])).await.is_none());
    }

    #[tokio::test]
    async fn test_trie_agrees_with_linear_scan() {
        let index = LineageIndex::new();
        let mut stored: Vec<(ModelId, LineageChain)> = Vec::new();

        // small alphabet so chains collide often
        let mut state = 17u64;
        let mut next = move || {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (state >> 33) % 3
        };

        for model_id in 1..=40u64 {
            let pairs = (next() + 1) as usize;
            let mut vertices = vec![next()];
            for _ in 0..pairs {
                vertices.push(next());
            }
            let edges: Vec<u64> = vertices.windows(2).flat_map(|w| [w[0], w[1]]).collect();
            let layer_ids: Vec<u64> = (0..vertices.len() as u64).map(|i| model_id * 10 + i).collect();
            index.store_meta(record(model_id, &edges, &layer_ids)).await.unwrap();
            stored.push((model_id, chain(&edges)));
        }

        for _ in 0..100 {
            let pairs = next() as usize + 1;
            let mut vertices = vec![next()];
            for _ in 0..pairs {
                vertices.push(next());
            }
            let query: Vec<u64> = vertices.windows(2).flat_map(|w| [w[0], w[1]]).collect();
            let query = chain(&query);

            // later models are more recent, so the last maximum wins ties
            let mut expected: Option<(ModelId, usize)> = None;
            for (model_id, edges) in &stored {
                let shared = edges.shared_layers(&query);
                if shared > 0 && expected.is_none_or(|(_, best)| shared >= best) {
                    expected = Some((*model_id, shared));
                }
            }

            let found = index.get_prefix(&query).await;
            assert_eq!(
                found.map(|found| (found.model_id, found.matched_layers)),
                expected,
                "query {:?}",
                query
            );
        }
    }

    #[tokio::test]
    async fn test_empty_index_has_no_prefix() {
        let index = LineageIndex::new();
        assert!(index.get_prefix(&chain(&[0, 1])).await.is_none());
        assert!(index.is_empty().await);
    }

    #[tokio::test]
    async fn test_overwrite_replaces_trie_entries() {
        let index = LineageIndex::new();
        let first = index.store_meta(record(7, &[0, 1, 1, 2], &[0, 1, 2])).await.unwrap();
        let second = index.store_meta(record(7, &[0, 5], &[0, 5])).await.unwrap();
        assert!(second.seq > first.seq);
        assert_eq!(index.len().await, 1);

        let found = index.get_prefix(&chain(&[0, 1])).await.unwrap();
        assert_eq!(found.layer_ids, vec![0]);
        let found = index.get_prefix(&chain(&[0, 5, 5, 6])).await.unwrap();
        assert_eq!(found.model_id, 7);
        assert_eq!(found.layer_ids, vec![0, 5]);

        let fetched = index.get_model(7).await.unwrap();
        assert_eq!(fetched.layer_ids(), vec![0, 5]);
    }

    #[tokio::test]
    async fn test_matched_layers_are_capped_by_record_length() {
        let index = LineageIndex::new();
        index.store_meta(record(3, &[0, 1, 1, 2], &[0])).await.unwrap();

        let found = index.get_prefix(&chain(&[0, 1, 1, 2])).await.unwrap();
        assert_eq!(found.matched_layers, 3);
        assert_eq!(found.layer_ids, vec![0]);
    }

    #[tokio::test]
    async fn test_retire_removes_from_search() {
        let index = LineageIndex::new();
        index.store_meta(record(1, &[0, 1], &[0, 1])).await.unwrap();
        let retired = index.retire(1).await.unwrap();
        assert!(retired.is_some());
        assert!(index.get_model(1).await.is_none());
        assert!(index.get_prefix(&chain(&[0, 1])).await.is_none());
        assert!(index.retire(1).await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_readers_never_see_mixed_records() {
        let index = Arc::new(LineageIndex::new());
        index.store_meta(record(1, &[0, 1], &[0, 1])).await.unwrap();

        let writer = {
            let index = index.clone();
            tokio::spawn(async move {
                for round in 0..200u64 {
                    let next = if round % 2 == 0 {
                        record(1, &[0, 2, 2, 3], &[0, 2, 3])
                    } else {
                        record(1, &[0, 1], &[0, 1])
                    };
                    index.store_meta(next).await.unwrap();
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let index = index.clone();
                tokio::spawn(async move {
                    for _ in 0..200 {
                        let current = index.get_model(1).await.unwrap();
                        assert_eq!(current.layers.len(), current.edges.pair_count() + 1);
                        let found = index.get_prefix(&chain(&[0, 2, 2, 3])).await.unwrap();
                        match found.matched_layers {
                            3 => assert_eq!(found.layer_ids, vec![0, 2, 3]),
                            1 => assert_eq!(found.layer_ids, vec![0]),
                            other => panic!("unexpected match length {}", other),
                        }
                    }
                })
            })
            .collect();

        writer.await.unwrap();
        for reader in readers {
            reader.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(RecordStore::open(dir.path()).unwrap());
        {
            let index = LineageIndex::with_record_store(store.clone()).unwrap();
            index.store_meta(record(1, &[0, 1, 1, 2], &[0, 1, 2])).await.unwrap();
            index.store_meta(record(2, &[0, 3, 3, 2], &[0, 3, 2])).await.unwrap();
            index.retire(1).await.unwrap();
        }

        let store = Arc::new(RecordStore::open(dir.path()).unwrap());
        let index = LineageIndex::with_record_store(store).unwrap();
        assert_eq!(index.len().await, 1);
        let found = index.get_prefix(&chain(&[0, 3])).await.unwrap();
        assert_eq!(found.model_id, 2);

        let next = index.store_meta(record(4, &[0, 3], &[0, 3])).await.unwrap();
        assert!(next.seq > index.get_model(2).await.unwrap().seq);
    }
}
