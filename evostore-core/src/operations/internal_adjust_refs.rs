use crate::{BlobStore, LayerId, OwnerId, Result};
use std::sync::Arc;

#[derive(Clone)]
pub struct InternalAdjustRefsOperation {
    blobs: Arc<BlobStore>,
}

#[derive(Debug, Clone)]
pub struct InternalAdjustRefsOperationRequest {
    pub owner: OwnerId,
    pub layer_ids: Vec<LayerId>,
    pub delta: i64,
}

#[derive(Debug, Clone)]
pub struct InternalAdjustRefsOperationResult {
    pub owner: OwnerId,
    pub released: Vec<LayerId>,
}

impl InternalAdjustRefsOperation {
    pub fn new(blobs: Arc<BlobStore>) -> Self {
        Self { blobs }
    }

    pub async fn run(
        &self,
        request: InternalAdjustRefsOperationRequest,
    ) -> Result<InternalAdjustRefsOperationResult> {
        let InternalAdjustRefsOperationRequest {
            owner,
            layer_ids,
            delta,
        } = request;

        let released = self.blobs.adjust_refs(owner, &layer_ids, delta).await?;
        if !released.is_empty() {
            tracing::info!(
                "Released layers {:?} of owner {} after ref delta {}",
                released,
                owner,
                delta
            );
        }

        Ok(InternalAdjustRefsOperationResult { owner, released })
    }
}
