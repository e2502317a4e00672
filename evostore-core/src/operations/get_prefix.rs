use crate::{LineageChain, LineageIndex, PrefixMatch, Result};
use std::sync::Arc;

#[derive(Clone)]
pub struct GetPrefixOperation {
    index: Arc<LineageIndex>,
}

#[derive(Debug, Clone)]
pub struct GetPrefixOperationRequest {
    pub edges: Vec<u64>,
}

#[derive(Debug, Clone)]
pub enum GetPrefixOperationOutcome {
    Found(PrefixMatch),
    NotFound,
}

impl GetPrefixOperation {
    pub fn new(index: Arc<LineageIndex>) -> Self {
        Self { index }
    }

    pub async fn run(&self, request: GetPrefixOperationRequest) -> Result<GetPrefixOperationOutcome> {
        let query = LineageChain::new(request.edges)?;

        match self.index.get_prefix(&query).await {
            Some(found) => Ok(GetPrefixOperationOutcome::Found(found)),
            None => Ok(GetPrefixOperationOutcome::NotFound),
        }
    }
}
