use crate::error::{EvoError, Result};
use crate::lineage::Composition;
use crate::profile::TimingProfile;
use crate::transport::{
    ConnectionString, DEFAULT_BUFFER_SIZE, DEFAULT_REQUEST_TIMEOUT, Endpoint, Fabric,
};
use crate::types::{
    LayerId, LayerKey, LineageChain, ModelId, ModelRecord, OwnerId, PrefixMatch, node_for_id,
};
use crate::wire::{
    AdjustRefsRequest, AdjustRefsResponse, PrefixRequest, RetireModelResponse, ShutdownResponse,
    StoreMetaRequest, StoreMetaResponse,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinSet;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub transport: String,
    pub addresses: Vec<String>,
    pub buffer_pool_bytes: u64,
    pub request_timeout: Duration,
}

impl ClientConfig {
    pub fn new(transport: impl Into<String>, addresses: Vec<String>) -> Self {
        Self {
            transport: transport.into(),
            addresses,
            buffer_pool_bytes: DEFAULT_BUFFER_SIZE,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Builds a config from full connection strings that share one transport.
    pub fn from_connection_strings<S: AsRef<str>>(connections: &[S]) -> Result<Self> {
        let mut fabric: Option<Fabric> = None;
        let mut addresses = Vec::with_capacity(connections.len());

        for connection in connections {
            let parsed = ConnectionString::parse(connection.as_ref())?;
            match fabric {
                Some(existing) if existing != parsed.fabric => {
                    return Err(EvoError::Connection(format!(
                        "mixed transports: {} and {}",
                        existing, parsed.fabric
                    )));
                }
                _ => fabric = Some(parsed.fabric),
            }
            addresses.push(parsed.address);
        }

        let fabric = fabric.ok_or_else(|| {
            EvoError::Connection("at least one connection string is required".to_string())
        })?;

        Ok(Self::new(fabric.as_str(), addresses))
    }

    pub fn with_buffer_pool_bytes(mut self, bytes: u64) -> Self {
        self.buffer_pool_bytes = bytes;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Entry point for applications: saves and loads layers, commits lineage
/// records and queries them across every node of the deployment.
///
/// Model `m`'s record lives on node `m % n`; bytes saved under owner `o`
/// live on node `o % n`.
pub struct EvoStoreClient {
    endpoint: Arc<Endpoint>,
    compositions: RwLock<HashMap<ModelId, Arc<Composition>>>,
}

impl EvoStoreClient {
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        let endpoint = Endpoint::connect(
            &config.transport,
            &config.addresses,
            config.buffer_pool_bytes,
            config.request_timeout,
        )
        .await?;

        tracing::info!(
            "Connected to {} nodes over {}",
            endpoint.node_count(),
            endpoint.fabric()
        );
        Ok(Self {
            endpoint: Arc::new(endpoint),
            compositions: RwLock::new(HashMap::new()),
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Node-side timings of every call this client made, keyed by the
    /// client operation (`save_layers`, `load_layers`, `get_prefix`, ...).
    pub fn timings(&self) -> &TimingProfile {
        self.endpoint.profile()
    }

    fn node_for(&self, id: u64) -> usize {
        node_for_id(id, self.endpoint.node_count())
    }

    /// Sends `buffers[i]` as layer `layer_ids[i]` owned by `model_id`.
    /// Stops at the first failure; layers already sent stay stored.
    pub async fn save_layers<B: AsRef<[u8]>>(
        &self,
        buffers: &[B],
        model_id: ModelId,
        layer_ids: &[LayerId],
    ) -> Result<()> {
        if buffers.len() != layer_ids.len() {
            return Err(EvoError::Validation(format!(
                "{} buffers supplied for {} layer ids",
                buffers.len(),
                layer_ids.len()
            )));
        }

        let node = self.node_for(model_id);
        for (index, (buffer, &layer_id)) in buffers.iter().zip(layer_ids).enumerate() {
            self.endpoint
                .send(
                    "save_layers",
                    node,
                    LayerKey::new(model_id, layer_id),
                    buffer.as_ref(),
                )
                .await
                .map_err(|error| error.at_index(index))?;
        }

        Ok(())
    }

    pub async fn store_meta(
        &self,
        model_id: ModelId,
        edges: &[u64],
        layer_ids: &[LayerId],
        owners: &[OwnerId],
        sizes: &[u64],
        score: f64,
    ) -> Result<()> {
        ModelRecord::from_parts(model_id, edges.to_vec(), layer_ids, owners, sizes, score)?;

        let request = StoreMetaRequest {
            edges: edges.to_vec(),
            layer_ids: layer_ids.to_vec(),
            owners: owners.to_vec(),
            sizes: sizes.to_vec(),
            score,
        };
        let _: StoreMetaResponse = self
            .endpoint
            .put_json(
                "store_meta",
                self.node_for(model_id),
                &format!("/api/v1/models/{}/meta", model_id),
                &request,
            )
            .await?;

        self.compositions.write().await.remove(&model_id);
        Ok(())
    }

    /// Asks every shard at once for its best match and keeps the longest,
    /// breaking ties by the most recent commit.
    pub async fn get_prefix(&self, edges: &[u64]) -> Result<PrefixMatch> {
        LineageChain::new(edges.to_vec())?;
        let request = PrefixRequest {
            edges: edges.to_vec(),
        };

        let mut queries = JoinSet::new();
        for node in 0..self.endpoint.node_count() {
            let endpoint = self.endpoint.clone();
            let request = request.clone();
            queries.spawn(async move {
                endpoint
                    .post_json::<_, PrefixMatch>("get_prefix", node, "/api/v1/prefix", &request)
                    .await
            });
        }

        let mut best: Option<PrefixMatch> = None;
        while let Some(joined) = queries.join_next().await {
            let candidate = match joined {
                Ok(Ok(found)) => found,
                Ok(Err(error)) if error.is_not_found() => continue,
                Ok(Err(error)) => return Err(error),
                Err(error) => {
                    return Err(EvoError::Internal(format!(
                        "prefix query task failed: {}",
                        error
                    )));
                }
            };

            if best
                .as_ref()
                .is_none_or(|current| candidate.is_better_than(current))
            {
                best = Some(candidate);
            }
        }

        best.ok_or_else(|| EvoError::NotFound(format!("no lineage prefix for {:?}", edges)))
    }

    /// Fetches the model's composition from its shard and refreshes the
    /// cached copy.
    pub async fn get_composition(&self, model_id: ModelId) -> Result<Composition> {
        let composition = self.fetch_composition(model_id).await?;
        Ok(composition.as_ref().clone())
    }

    /// Composition this client last fetched for `model_id`, fetching it
    /// only when none is cached.
    pub async fn cached_composition(&self, model_id: ModelId) -> Result<Arc<Composition>> {
        if let Some(cached) = self.compositions.read().await.get(&model_id) {
            return Ok(cached.clone());
        }
        self.fetch_composition(model_id).await
    }

    async fn fetch_composition(&self, model_id: ModelId) -> Result<Arc<Composition>> {
        let composition: Composition = self
            .endpoint
            .get_json(
                "get_composition",
                self.node_for(model_id),
                &format!("/api/v1/models/{}/composition", model_id),
            )
            .await?;

        let composition = Arc::new(composition);
        self.compositions
            .write()
            .await
            .insert(model_id, composition.clone());
        Ok(composition)
    }

    pub async fn clear_composition_cache(&self) {
        self.compositions.write().await.clear();
    }

    pub async fn get_model(&self, model_id: ModelId) -> Result<ModelRecord> {
        self.endpoint
            .get_json(
                "get_model",
                self.node_for(model_id),
                &format!("/api/v1/models/{}", model_id),
            )
            .await
    }

    /// Fills `buffers[i]` with layer `layer_ids[i]` of `model_id`, fetched
    /// from `owners[i]`. Ownership and sizes are checked against the
    /// model's current composition before any buffer is written.
    pub async fn load_layers<B: AsMut<[u8]>>(
        &self,
        buffers: &mut [B],
        model_id: ModelId,
        layer_ids: &[LayerId],
        owners: &[OwnerId],
    ) -> Result<()> {
        let composition = self.get_composition(model_id).await?;
        let lengths: Vec<u64> = buffers
            .iter_mut()
            .map(|buffer| buffer.as_mut().len() as u64)
            .collect();
        composition.verify(layer_ids, owners, &lengths)?;

        for (index, buffer) in buffers.iter_mut().enumerate() {
            let owner = owners[index];
            self.endpoint
                .receive(
                    "load_layers",
                    self.node_for(owner),
                    LayerKey::new(owner, layer_ids[index]),
                    buffer.as_mut(),
                )
                .await
                .map_err(|error| error.at_index(index))?;
        }

        Ok(())
    }

    /// Adds `delta` to the reference count of every layer in the model's
    /// cached composition; a negative delta also retires the model's record.
    pub async fn update_ref_counter(&self, model_id: ModelId, delta: i64) -> Result<()> {
        let composition = self.cached_composition(model_id).await?;

        for (owner, layer_ids) in composition.by_owner() {
            let response: AdjustRefsResponse = self
                .endpoint
                .post_json(
                    "update_ref_counter",
                    self.node_for(owner),
                    &format!("/internal/v1/owners/{}/refs", owner),
                    &AdjustRefsRequest { layer_ids, delta },
                )
                .await?;
            if !response.released.is_empty() {
                tracing::debug!(
                    "Owner {} released layers {:?}",
                    response.owner,
                    response.released
                );
            }
        }

        if delta < 0 {
            self.retire_model(model_id).await?;
        }
        Ok(())
    }

    /// Removes the model's record; returns whether one existed.
    pub async fn retire_model(&self, model_id: ModelId) -> Result<bool> {
        let response: RetireModelResponse = self
            .endpoint
            .delete_json(
                "retire_model",
                self.node_for(model_id),
                &format!("/api/v1/models/{}", model_id),
            )
            .await?;

        self.compositions.write().await.remove(&model_id);
        Ok(response.retired)
    }

    /// Asks every node to stop. All nodes are contacted; the first failure
    /// is returned.
    pub async fn shutdown(&self) -> Result<()> {
        let mut first_error = None;
        for node in 0..self.endpoint.node_count() {
            let result: Result<ShutdownResponse> = self
                .endpoint
                .post_json(
                    "shutdown",
                    node,
                    "/internal/v1/shutdown",
                    &serde_json::json!({}),
                )
                .await;
            match result {
                Ok(response) => tracing::info!("Node {} is stopping", response.node_id),
                Err(error) => {
                    tracing::warn!("Failed to stop node {}: {}", self.endpoint.nodes()[node], error);
                    first_error.get_or_insert(error);
                }
            }
        }

        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_connection_strings() {
        let config =
            ClientConfig::from_connection_strings(&["ofi+tcp://127.0.0.1:1234", "ofi+tcp://h2:80"])
                .unwrap();
        assert_eq!(config.transport, "ofi+tcp");
        assert_eq!(config.addresses, vec!["127.0.0.1:1234", "h2:80"]);
        assert_eq!(config.buffer_pool_bytes, DEFAULT_BUFFER_SIZE);

        let err = ClientConfig::from_connection_strings(&["tcp://a:1", "http://b:2"]).unwrap_err();
        assert!(matches!(err, EvoError::Connection(_)));

        let empty: [&str; 0] = [];
        assert!(ClientConfig::from_connection_strings(&empty).is_err());
    }
}
