use crate::{LineageIndex, ModelId, ModelRecord, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;

#[derive(Clone)]
pub struct StoreMetaOperation {
    index: Arc<LineageIndex>,
}

#[derive(Debug, Clone)]
pub struct StoreMetaOperationRequest {
    pub model_id: ModelId,
    pub edges: Vec<u64>,
    pub layer_ids: Vec<u64>,
    pub owners: Vec<u64>,
    pub sizes: Vec<u64>,
    pub score: f64,
}

#[derive(Debug, Clone)]
pub struct StoreMetaOperationResult {
    pub model_id: ModelId,
    pub seq: u64,
    pub stored_at: DateTime<Utc>,
}

impl StoreMetaOperation {
    pub fn new(index: Arc<LineageIndex>) -> Self {
        Self { index }
    }

    pub async fn run(&self, request: StoreMetaOperationRequest) -> Result<StoreMetaOperationResult> {
        let StoreMetaOperationRequest {
            model_id,
            edges,
            layer_ids,
            owners,
            sizes,
            score,
        } = request;

        let record = ModelRecord::from_parts(model_id, edges, &layer_ids, &owners, &sizes, score)?;
        let committed = self.index.store_meta(record).await?;

        tracing::info!(
            "Stored model {} with {} layers and {} lineage pairs",
            committed.model_id,
            committed.layers.len(),
            committed.edges.pair_count()
        );

        Ok(StoreMetaOperationResult {
            model_id: committed.model_id,
            seq: committed.seq,
            stored_at: committed.stored_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EvoError;

    #[tokio::test]
    async fn test_invalid_request_leaves_index_untouched() {
        let index = Arc::new(LineageIndex::new());
        let operation = StoreMetaOperation::new(index.clone());

        let err = operation
            .run(StoreMetaOperationRequest {
                model_id: 1,
                edges: vec![0, 1, 1],
                layer_ids: vec![0, 1],
                owners: vec![1, 1],
                sizes: vec![80, 80],
                score: 0.0,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, EvoError::Validation(_)));

        let err = operation
            .run(StoreMetaOperationRequest {
                model_id: 1,
                edges: vec![0, 1],
                layer_ids: vec![0, 1],
                owners: vec![1],
                sizes: vec![80, 80],
                score: 0.0,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, EvoError::Validation(_)));
        assert!(index.is_empty().await);
    }

    #[tokio::test]
    async fn test_empty_chain_is_stored() {
        let index = Arc::new(LineageIndex::new());
        let operation = StoreMetaOperation::new(index.clone());

        let result = operation
            .run(StoreMetaOperationRequest {
                model_id: 9,
                edges: vec![],
                layer_ids: vec![],
                owners: vec![],
                sizes: vec![],
                score: -3.5,
            })
            .await
            .unwrap();
        assert_eq!(result.model_id, 9);
        assert!(index.get_model(9).await.is_some());

        let err = operation
            .run(StoreMetaOperationRequest {
                model_id: 10,
                edges: vec![],
                layer_ids: vec![],
                owners: vec![],
                sizes: vec![],
                score: f64::NAN,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, EvoError::Validation(_)));
    }
}
