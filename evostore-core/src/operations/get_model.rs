use crate::{LineageIndex, ModelId, ModelRecord, Result};
use std::sync::Arc;

#[derive(Clone)]
pub struct GetModelOperation {
    index: Arc<LineageIndex>,
}

#[derive(Debug, Clone)]
pub struct GetModelOperationRequest {
    pub model_id: ModelId,
}

#[derive(Debug, Clone)]
pub enum GetModelOperationOutcome {
    Found(Arc<ModelRecord>),
    NotFound,
}

impl GetModelOperation {
    pub fn new(index: Arc<LineageIndex>) -> Self {
        Self { index }
    }

    pub async fn run(&self, request: GetModelOperationRequest) -> Result<GetModelOperationOutcome> {
        match self.index.get_model(request.model_id).await {
            Some(record) => Ok(GetModelOperationOutcome::Found(record)),
            None => Ok(GetModelOperationOutcome::NotFound),
        }
    }
}
