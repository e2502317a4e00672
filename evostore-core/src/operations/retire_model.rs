use crate::{LineageIndex, ModelId, Result};
use std::sync::Arc;

/// Removes a model's record from this shard. Layer bytes are untouched;
/// they are released through reference counting.
#[derive(Clone)]
pub struct RetireModelOperation {
    index: Arc<LineageIndex>,
}

#[derive(Debug, Clone)]
pub struct RetireModelOperationRequest {
    pub model_id: ModelId,
}

#[derive(Debug, Clone)]
pub struct RetireModelOperationResult {
    pub model_id: ModelId,
    pub retired: bool,
}

impl RetireModelOperation {
    pub fn new(index: Arc<LineageIndex>) -> Self {
        Self { index }
    }

    pub async fn run(
        &self,
        request: RetireModelOperationRequest,
    ) -> Result<RetireModelOperationResult> {
        let model_id = request.model_id;
        let retired = self.index.retire(model_id).await?.is_some();
        if retired {
            tracing::info!("Retired model {}", model_id);
        }

        Ok(RetireModelOperationResult { model_id, retired })
    }
}
