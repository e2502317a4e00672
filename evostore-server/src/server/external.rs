use super::{ServerState, error_response, not_found};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use evostore_core::wire::{
    HealthResponse, PrefixRequest, RetireModelResponse, StoreMetaRequest, StoreMetaResponse,
};
use evostore_core::{
    GetCompositionOperationOutcome, GetCompositionOperationRequest, GetModelOperationOutcome,
    GetModelOperationRequest, GetPrefixOperationOutcome, GetPrefixOperationRequest,
    RetireModelOperationRequest, StoreMetaOperationRequest,
};
use std::sync::Arc;

pub(crate) async fn health(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let info = state.node.info().await;
    let pool = state.blobs.pool();

    (
        StatusCode::OK,
        Json(HealthResponse {
            status: info.status.as_str().to_string(),
            node_id: info.node_id,
            address: info.address,
            layers: state.blobs.len().await,
            records: state.index.len().await,
            pool_capacity: pool.capacity(),
            pool_in_use: pool.in_use(),
        }),
    )
}

pub(crate) async fn v1_store_meta(
    State(state): State<Arc<ServerState>>,
    Path(model_id): Path<u64>,
    Json(request): Json<StoreMetaRequest>,
) -> impl IntoResponse {
    let result = state
        .store_meta_operation
        .run(StoreMetaOperationRequest {
            model_id,
            edges: request.edges,
            layer_ids: request.layer_ids,
            owners: request.owners,
            sizes: request.sizes,
            score: request.score,
        })
        .await;

    match result {
        Ok(result) => (
            StatusCode::OK,
            Json(StoreMetaResponse {
                model_id: result.model_id,
                seq: result.seq,
                stored_at: result.stored_at,
            }),
        )
            .into_response(),
        Err(error) => error_response(&error),
    }
}

pub(crate) async fn v1_get_model(
    State(state): State<Arc<ServerState>>,
    Path(model_id): Path<u64>,
) -> impl IntoResponse {
    let result = state
        .get_model_operation
        .run(GetModelOperationRequest { model_id })
        .await;

    match result {
        Ok(GetModelOperationOutcome::Found(record)) => {
            (StatusCode::OK, Json(record.as_ref())).into_response()
        }
        Ok(GetModelOperationOutcome::NotFound) => not_found(format!("model {}", model_id)),
        Err(error) => error_response(&error),
    }
}

pub(crate) async fn v1_retire_model(
    State(state): State<Arc<ServerState>>,
    Path(model_id): Path<u64>,
) -> impl IntoResponse {
    let result = state
        .retire_model_operation
        .run(RetireModelOperationRequest { model_id })
        .await;

    match result {
        Ok(result) => (
            StatusCode::OK,
            Json(RetireModelResponse {
                model_id: result.model_id,
                retired: result.retired,
            }),
        )
            .into_response(),
        Err(error) => error_response(&error),
    }
}

pub(crate) async fn v1_get_composition(
    State(state): State<Arc<ServerState>>,
    Path(model_id): Path<u64>,
) -> impl IntoResponse {
    let result = state
        .get_composition_operation
        .run(GetCompositionOperationRequest { model_id })
        .await;

    match result {
        Ok(GetCompositionOperationOutcome::Found(composition)) => {
            (StatusCode::OK, Json(composition)).into_response()
        }
        Ok(GetCompositionOperationOutcome::NotFound) => not_found(format!("model {}", model_id)),
        Err(error) => error_response(&error),
    }
}

pub(crate) async fn v1_get_prefix(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<PrefixRequest>,
) -> impl IntoResponse {
    let result = state
        .get_prefix_operation
        .run(GetPrefixOperationRequest {
            edges: request.edges,
        })
        .await;

    match result {
        Ok(GetPrefixOperationOutcome::Found(found)) => (StatusCode::OK, Json(found)).into_response(),
        Ok(GetPrefixOperationOutcome::NotFound) => {
            not_found("no stored lineage shares a prefix with the query".to_string())
        }
        Err(error) => error_response(&error),
    }
}
