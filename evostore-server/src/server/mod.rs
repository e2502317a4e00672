use crate::config::Config;
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Request},
    http::{HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use evostore_core::now_micros;
use evostore_core::wire::{BEGIN_US_HEADER, END_US_HEADER, ErrorResponse};
use evostore_core::{
    BlobStore, BufferPool, CompositionResolver, EvoError, GetCompositionOperation,
    GetModelOperation, GetPrefixOperation, InternalAdjustRefsOperation, InternalGetLayerOperation,
    InternalPutLayerOperation, LayerFileStore, LineageIndex, Node, RecordStore, Result,
    RetireModelOperation, StoreMetaOperation,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Notify;

mod external;
mod internal;

use external::{
    health, v1_get_composition, v1_get_model, v1_get_prefix, v1_retire_model, v1_store_meta,
};
use internal::{internal_adjust_refs, internal_get_layer, internal_put_layer, internal_shutdown};

pub struct ServerState {
    pub(crate) node: Arc<Node>,
    pub(crate) index: Arc<LineageIndex>,
    pub(crate) blobs: Arc<BlobStore>,
    pub(crate) store_meta_operation: Arc<StoreMetaOperation>,
    pub(crate) get_prefix_operation: Arc<GetPrefixOperation>,
    pub(crate) get_composition_operation: Arc<GetCompositionOperation>,
    pub(crate) get_model_operation: Arc<GetModelOperation>,
    pub(crate) retire_model_operation: Arc<RetireModelOperation>,
    pub(crate) internal_put_layer_operation: Arc<InternalPutLayerOperation>,
    pub(crate) internal_get_layer_operation: Arc<InternalGetLayerOperation>,
    pub(crate) internal_adjust_refs_operation: Arc<InternalAdjustRefsOperation>,
    pub(crate) shutdown: Arc<Notify>,
}

pub async fn build_state(config: &Config) -> Result<Arc<ServerState>> {
    let node = Arc::new(Node::new(config.node.node_id, config.advertise_addr()?));
    let pool = BufferPool::new(config.storage.buffer_pool_bytes)?;

    let (index, blobs) = match &config.storage.data_dir {
        Some(data_dir) => {
            let records = Arc::new(RecordStore::open(data_dir)?);
            let index = LineageIndex::with_record_store(records)?;
            let blobs = BlobStore::with_files(pool, LayerFileStore::new(data_dir.clone())?);
            blobs.recover().await?;
            (index, blobs)
        }
        None => (LineageIndex::new(), BlobStore::new(pool)),
    };
    let index = Arc::new(index);
    let blobs = Arc::new(blobs);

    let resolver = CompositionResolver::new(index.clone());

    Ok(Arc::new(ServerState {
        node,
        index: index.clone(),
        blobs: blobs.clone(),
        store_meta_operation: Arc::new(StoreMetaOperation::new(index.clone())),
        get_prefix_operation: Arc::new(GetPrefixOperation::new(index.clone())),
        get_composition_operation: Arc::new(GetCompositionOperation::new(resolver)),
        get_model_operation: Arc::new(GetModelOperation::new(index.clone())),
        retire_model_operation: Arc::new(RetireModelOperation::new(index)),
        internal_put_layer_operation: Arc::new(InternalPutLayerOperation::new(blobs.clone())),
        internal_get_layer_operation: Arc::new(InternalGetLayerOperation::new(blobs.clone())),
        internal_adjust_refs_operation: Arc::new(InternalAdjustRefsOperation::new(blobs)),
        shutdown: Arc::new(Notify::new()),
    }))
}

pub fn build_router(state: Arc<ServerState>) -> Router {
    let body_limit = usize::try_from(state.blobs.pool().capacity()).unwrap_or(usize::MAX);

    Router::new()
        .route("/health", get(health))
        .route("/api/v1/models/:model_id", get(v1_get_model).delete(v1_retire_model))
        .route("/api/v1/models/:model_id/meta", put(v1_store_meta))
        .route(
            "/api/v1/models/:model_id/composition",
            get(v1_get_composition),
        )
        .route("/api/v1/prefix", post(v1_get_prefix))
        .route(
            "/internal/v1/owners/:owner/layers/:layer_id",
            put(internal_put_layer).get(internal_get_layer),
        )
        .route("/internal/v1/owners/:owner/refs", post(internal_adjust_refs))
        .route("/internal/v1/shutdown", post(internal_shutdown))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn(stamp_timing))
        .with_state(state)
}

/// Reports when this node started and finished each request.
async fn stamp_timing(request: Request, next: Next) -> Response {
    let begin_us = now_micros();
    let mut response = next.run(request).await;
    let end_us = now_micros();

    let headers = response.headers_mut();
    headers.insert(BEGIN_US_HEADER, HeaderValue::from(begin_us));
    headers.insert(END_US_HEADER, HeaderValue::from(end_us));
    response
}

pub async fn run_server(config: Config) -> Result<()> {
    let listen = config.listen()?;
    let state = build_state(&config).await?;

    let listener = TcpListener::bind(&listen.address).await?;
    tracing::info!(
        "EvoStore node {} listening on {} ({})",
        config.node.node_id,
        listen.address,
        listen.fabric
    );

    serve(listener, state).await
}

/// Serves until a remote shutdown request or ctrl-c.
pub async fn serve(listener: TcpListener, state: Arc<ServerState>) -> Result<()> {
    let shutdown = state.shutdown.clone();
    let app = build_router(state);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = shutdown.notified() => {
                    tracing::info!("Shutdown requested remotely");
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Received ctrl-c, shutting down");
                }
            }
        })
        .await
        .map_err(|error| EvoError::Internal(error.to_string()))?;

    Ok(())
}

pub(crate) fn error_response(error: &EvoError) -> Response {
    let body = ErrorResponse::from_error(error);
    let status =
        StatusCode::from_u16(body.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() && status != StatusCode::INSUFFICIENT_STORAGE {
        tracing::warn!("Request failed: {}", error);
    }
    (status, Json(body)).into_response()
}

pub(crate) fn not_found(what: String) -> Response {
    error_response(&EvoError::NotFound(what))
}
