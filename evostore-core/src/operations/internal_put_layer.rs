use crate::{BlobStore, LayerId, LayerKey, OwnerId, Result, verify_hash};
use bytes::Bytes;
use std::sync::Arc;

#[derive(Clone)]
pub struct InternalPutLayerOperation {
    blobs: Arc<BlobStore>,
}

#[derive(Debug, Clone)]
pub struct InternalPutLayerOperationRequest {
    pub owner: OwnerId,
    pub layer_id: LayerId,
    pub sha256: Option<String>,
    pub body: Bytes,
}

#[derive(Debug, Clone)]
pub struct InternalPutLayerOperationResult {
    pub replaced: bool,
    pub sha256: String,
}

impl InternalPutLayerOperation {
    pub fn new(blobs: Arc<BlobStore>) -> Self {
        Self { blobs }
    }

    pub async fn run(
        &self,
        request: InternalPutLayerOperationRequest,
    ) -> Result<InternalPutLayerOperationResult> {
        let InternalPutLayerOperationRequest {
            owner,
            layer_id,
            sha256,
            body,
        } = request;

        if let Some(expected) = sha256.as_deref() {
            verify_hash(&body, expected)?;
        }

        let size = body.len();
        let key = LayerKey::new(owner, layer_id);
        let put = self.blobs.put(key, body).await?;

        tracing::debug!(
            "Stored layer {} ({} bytes, replaced={})",
            key,
            size,
            put.replaced
        );

        Ok(InternalPutLayerOperationResult {
            replaced: put.replaced,
            sha256: put.sha256,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BufferPool, EvoError, compute_hash};

    #[tokio::test]
    async fn test_rejects_corrupted_body() {
        let blobs = Arc::new(BlobStore::new(BufferPool::new(1024).unwrap()));
        let operation = InternalPutLayerOperation::new(blobs.clone());

        let err = operation
            .run(InternalPutLayerOperationRequest {
                owner: 1,
                layer_id: 0,
                sha256: Some(compute_hash(b"expected")),
                body: Bytes::from_static(b"corrupted"),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, EvoError::HashMismatch { .. }));
        assert_eq!(blobs.len().await, 0);

        let stored = operation
            .run(InternalPutLayerOperationRequest {
                owner: 1,
                layer_id: 0,
                sha256: Some(compute_hash(b"expected")),
                body: Bytes::from_static(b"expected"),
            })
            .await
            .unwrap();
        assert!(!stored.replaced);
        assert_eq!(stored.sha256, compute_hash(b"expected"));
    }
}
