use crate::{BlobStore, LayerId, LayerKey, OwnerId, Result};
use bytes::Bytes;
use std::sync::Arc;

#[derive(Clone)]
pub struct InternalGetLayerOperation {
    blobs: Arc<BlobStore>,
}

#[derive(Debug, Clone)]
pub struct InternalGetLayerOperationRequest {
    pub owner: OwnerId,
    pub layer_id: LayerId,
    pub expected_size: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct InternalLayerPayload {
    pub bytes: Bytes,
    pub sha256: String,
}

#[derive(Debug, Clone)]
pub enum InternalGetLayerOperationOutcome {
    Found(InternalLayerPayload),
    NotFound,
}

impl InternalGetLayerOperation {
    pub fn new(blobs: Arc<BlobStore>) -> Self {
        Self { blobs }
    }

    pub async fn run(
        &self,
        request: InternalGetLayerOperationRequest,
    ) -> Result<InternalGetLayerOperationOutcome> {
        let key = LayerKey::new(request.owner, request.layer_id);

        match self.blobs.get(key, request.expected_size).await {
            Ok((bytes, sha256)) => Ok(InternalGetLayerOperationOutcome::Found(
                InternalLayerPayload { bytes, sha256 },
            )),
            Err(error) if error.is_not_found() => Ok(InternalGetLayerOperationOutcome::NotFound),
            Err(error) => Err(error),
        }
    }
}
