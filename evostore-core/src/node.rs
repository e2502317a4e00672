use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeInfo {
    pub node_id: u32,
    pub address: String,
    pub status: NodeStatus,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Healthy,
    Draining,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Healthy => "healthy",
            NodeStatus::Draining => "draining",
        }
    }
}

pub struct Node {
    node_id: u32,
    info: Arc<RwLock<NodeInfo>>,
}

impl Node {
    pub fn new(node_id: u32, address: String) -> Self {
        let info = NodeInfo {
            node_id,
            address,
            status: NodeStatus::Healthy,
        };

        Self {
            node_id,
            info: Arc::new(RwLock::new(info)),
        }
    }

    pub fn node_id(&self) -> u32 {
        self.node_id
    }

    pub async fn info(&self) -> NodeInfo {
        self.info.read().await.clone()
    }

    pub async fn update_status(&self, status: NodeStatus) {
        let mut info = self.info.write().await;
        info.status = status;
    }
}
