use super::{ServerState, error_response, not_found};
use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use evostore_core::wire::{
    AdjustRefsRequest, AdjustRefsResponse, LayerQuery, PutLayerResponse, SHA256_HEADER,
    ShutdownResponse,
};
use evostore_core::{
    InternalAdjustRefsOperationRequest, InternalGetLayerOperationOutcome,
    InternalGetLayerOperationRequest, InternalPutLayerOperationRequest, NodeStatus,
};
use std::sync::Arc;

pub(crate) async fn internal_put_layer(
    State(state): State<Arc<ServerState>>,
    Path((owner, layer_id)): Path<(u64, u64)>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let sha256 = headers
        .get(SHA256_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string);

    let result = state
        .internal_put_layer_operation
        .run(InternalPutLayerOperationRequest {
            owner,
            layer_id,
            sha256,
            body,
        })
        .await;

    match result {
        Ok(result) => (
            StatusCode::OK,
            Json(PutLayerResponse {
                accepted: true,
                replaced: result.replaced,
                sha256: result.sha256,
            }),
        )
            .into_response(),
        Err(error) => error_response(&error),
    }
}

pub(crate) async fn internal_get_layer(
    State(state): State<Arc<ServerState>>,
    Path((owner, layer_id)): Path<(u64, u64)>,
    Query(query): Query<LayerQuery>,
) -> impl IntoResponse {
    let result = state
        .internal_get_layer_operation
        .run(InternalGetLayerOperationRequest {
            owner,
            layer_id,
            expected_size: query.expected_size,
        })
        .await;

    match result {
        Ok(InternalGetLayerOperationOutcome::Found(layer)) => {
            let mut response = Response::new(layer.bytes.into());
            *response.status_mut() = StatusCode::OK;
            response.headers_mut().insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/octet-stream"),
            );
            if let Ok(value) = HeaderValue::from_str(&layer.sha256) {
                response.headers_mut().insert(SHA256_HEADER, value);
            }
            response
        }
        Ok(InternalGetLayerOperationOutcome::NotFound) => {
            not_found(format!("layer owner={} layer={}", owner, layer_id))
        }
        Err(error) => error_response(&error),
    }
}

pub(crate) async fn internal_adjust_refs(
    State(state): State<Arc<ServerState>>,
    Path(owner): Path<u64>,
    Json(request): Json<AdjustRefsRequest>,
) -> impl IntoResponse {
    let result = state
        .internal_adjust_refs_operation
        .run(InternalAdjustRefsOperationRequest {
            owner,
            layer_ids: request.layer_ids,
            delta: request.delta,
        })
        .await;

    match result {
        Ok(result) => (
            StatusCode::OK,
            Json(AdjustRefsResponse {
                owner: result.owner,
                released: result.released,
            }),
        )
            .into_response(),
        Err(error) => error_response(&error),
    }
}

pub(crate) async fn internal_shutdown(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    state.node.update_status(NodeStatus::Draining).await;
    state.shutdown.notify_one();

    (
        StatusCode::OK,
        Json(ShutdownResponse {
            node_id: state.node.node_id(),
            stopping: true,
        }),
    )
}
