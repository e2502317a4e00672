use crate::{Composition, CompositionResolver, ModelId, Result};

#[derive(Clone)]
pub struct GetCompositionOperation {
    resolver: CompositionResolver,
}

#[derive(Debug, Clone)]
pub struct GetCompositionOperationRequest {
    pub model_id: ModelId,
}

#[derive(Debug, Clone)]
pub enum GetCompositionOperationOutcome {
    Found(Composition),
    NotFound,
}

impl GetCompositionOperation {
    pub fn new(resolver: CompositionResolver) -> Self {
        Self { resolver }
    }

    pub async fn run(
        &self,
        request: GetCompositionOperationRequest,
    ) -> Result<GetCompositionOperationOutcome> {
        match self.resolver.resolve(request.model_id).await {
            Ok(composition) => Ok(GetCompositionOperationOutcome::Found(composition)),
            Err(error) if error.is_not_found() => Ok(GetCompositionOperationOutcome::NotFound),
            Err(error) => Err(error),
        }
    }
}
