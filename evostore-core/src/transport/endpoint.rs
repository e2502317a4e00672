use crate::error::{EvoError, Result};
use crate::profile::{ServerTiming, TimingProfile};
use crate::storage::{BufferPool, compute_hash};
use crate::transport::{ConnectionString, Fabric};
use crate::types::LayerKey;
use crate::wire::{ErrorResponse, HealthResponse, LayerQuery, SHA256_HEADER};
use bytes::Bytes;
use reqwest::{Client, RequestBuilder, Response, header};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

/// Default in-flight buffer budget: 1 GiB.
pub const DEFAULT_BUFFER_SIZE: u64 = 1 << 30;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Client side of the node protocol: a fixed list of nodes reached over
/// one fabric, plus the buffer pool bounding bytes in flight.
///
/// Every call is labelled with the client operation it serves; the node's
/// timing headers are recorded under that label.
pub struct Endpoint {
    client: Client,
    fabric: Fabric,
    nodes: Vec<ConnectionString>,
    pool: Arc<BufferPool>,
    profile: TimingProfile,
}

impl Endpoint {
    /// Parses the addresses, then probes `/health` on every node.
    pub async fn connect(
        transport: &str,
        addresses: &[String],
        buffer_pool_bytes: u64,
        request_timeout: Duration,
    ) -> Result<Self> {
        let fabric: Fabric = transport.parse()?;
        if addresses.is_empty() {
            return Err(EvoError::Connection(
                "at least one node address is required".to_string(),
            ));
        }

        let nodes = addresses
            .iter()
            .map(|address| ConnectionString::parse_for(fabric, address))
            .collect::<Result<Vec<_>>>()?;

        let pool = BufferPool::new(buffer_pool_bytes)
            .map_err(|error| EvoError::Connection(error.to_string()))?;

        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|error| EvoError::Connection(format!("failed to build HTTP client: {}", error)))?;

        let endpoint = Self {
            client,
            fabric,
            nodes,
            pool,
            profile: TimingProfile::new(),
        };

        for node in 0..endpoint.nodes.len() {
            let health = endpoint.health(node).await.map_err(|error| {
                EvoError::Connection(format!(
                    "node {} unreachable: {}",
                    endpoint.nodes[node], error
                ))
            })?;
            tracing::debug!(
                "Connected to node {} ({}) holding {} layers, {} records",
                health.node_id,
                endpoint.nodes[node],
                health.layers,
                health.records
            );
        }

        Ok(endpoint)
    }

    pub fn fabric(&self) -> Fabric {
        self.fabric
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> &[ConnectionString] {
        &self.nodes
    }

    pub fn pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }

    pub fn profile(&self) -> &TimingProfile {
        &self.profile
    }

    fn url(&self, node: usize, path: &str) -> Result<String> {
        let target = self.nodes.get(node).ok_or_else(|| {
            EvoError::Internal(format!(
                "node index {} out of range ({} nodes)",
                node,
                self.nodes.len()
            ))
        })?;
        Ok(format!("{}{}", target.base_url(), path))
    }

    fn layer_path(key: LayerKey) -> String {
        format!(
            "/internal/v1/owners/{}/layers/{}",
            key.owner, key.layer_id
        )
    }

    pub async fn health(&self, node: usize) -> Result<HealthResponse> {
        self.get_json("health", node, "/health").await
    }

    /// Copies `bytes` into a pooled staging buffer and uploads it to `node`.
    pub async fn send(
        &self,
        operation: &str,
        node: usize,
        key: LayerKey,
        bytes: &[u8],
    ) -> Result<()> {
        let _lease = self.pool.try_acquire(bytes.len() as u64)?;
        let body = Bytes::copy_from_slice(bytes);
        let sha256 = compute_hash(&body);

        let request = self
            .client
            .put(self.url(node, &Self::layer_path(key))?)
            .header(SHA256_HEADER, sha256)
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .body(body);

        self.dispatch(operation, request).await?;
        Ok(())
    }

    /// Fetches the layer at `key` from `node` into `into`, which must match
    /// the stored size exactly.
    pub async fn receive(
        &self,
        operation: &str,
        node: usize,
        key: LayerKey,
        into: &mut [u8],
    ) -> Result<()> {
        let _lease = self.pool.try_acquire(into.len() as u64)?;

        let request = self
            .client
            .get(self.url(node, &Self::layer_path(key))?)
            .query(&LayerQuery {
                expected_size: Some(into.len() as u64),
            });
        let response = self.dispatch(operation, request).await?;

        let expected_sha = response
            .headers()
            .get(SHA256_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?;

        if body.len() != into.len() {
            return Err(EvoError::Transfer(format!(
                "layer {} arrived with {} bytes, expected {}",
                key,
                body.len(),
                into.len()
            )));
        }

        if let Some(expected) = expected_sha {
            let actual = compute_hash(&body);
            if !actual.eq_ignore_ascii_case(&expected) {
                return Err(EvoError::Transfer(format!(
                    "layer {} failed checksum: expected {}, got {}",
                    key, expected, actual
                )));
            }
        }

        into.copy_from_slice(&body);
        Ok(())
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        operation: &str,
        node: usize,
        path: &str,
    ) -> Result<T> {
        self.execute_json(operation, self.client.get(self.url(node, path)?))
            .await
    }

    pub async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        operation: &str,
        node: usize,
        path: &str,
        body: &B,
    ) -> Result<T> {
        self.execute_json(operation, self.client.post(self.url(node, path)?).json(body))
            .await
    }

    pub async fn put_json<B: Serialize, T: DeserializeOwned>(
        &self,
        operation: &str,
        node: usize,
        path: &str,
        body: &B,
    ) -> Result<T> {
        self.execute_json(operation, self.client.put(self.url(node, path)?).json(body))
            .await
    }

    pub async fn delete_json<T: DeserializeOwned>(
        &self,
        operation: &str,
        node: usize,
        path: &str,
    ) -> Result<T> {
        self.execute_json(operation, self.client.delete(self.url(node, path)?))
            .await
    }

    async fn execute_json<T: DeserializeOwned>(
        &self,
        operation: &str,
        request: RequestBuilder,
    ) -> Result<T> {
        let response = self.dispatch(operation, request).await?;
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Sends `request`, records the node's timing and checks the status.
    async fn dispatch(&self, operation: &str, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await?;
        if let Some(timing) = ServerTiming::from_headers(response.headers()) {
            self.profile.record(operation, timing).await;
        }
        check_response(response).await
    }
}

/// Passes successful responses through and rebuilds the node's error otherwise.
async fn check_response(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let url = response.url().clone();
    let body = response.bytes().await.unwrap_or_default();
    match serde_json::from_slice::<ErrorResponse>(&body) {
        Ok(error) => Err(error.into_error()),
        Err(_) => Err(EvoError::Transfer(format!(
            "{} returned {}: {}",
            url,
            status,
            String::from_utf8_lossy(&body)
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_rejects_bad_arguments() {
        let timeout = Duration::from_secs(1);

        let err = Endpoint::connect("verbs", &["127.0.0.1:1".to_string()], 1024, timeout)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, EvoError::Connection(_)));

        let err = Endpoint::connect("tcp", &[], 1024, timeout)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, EvoError::Connection(_)));

        let err = Endpoint::connect("tcp", &["127.0.0.1:1".to_string()], 0, timeout)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, EvoError::Connection(_)));
    }

    #[tokio::test]
    async fn test_connect_fails_when_node_unreachable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let err = Endpoint::connect("tcp", &[address], 1024, Duration::from_secs(2))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, EvoError::Connection(_)));
    }
}
