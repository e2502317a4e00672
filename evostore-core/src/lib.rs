//! EvoStore Core - lineage-aware layer storage for evolving model populations

pub mod client;
pub mod error;
pub mod lineage;
pub mod node;
pub mod operations;
pub mod profile;
pub mod storage;
pub mod transport;
pub mod types;
pub mod wire;

pub use client::{ClientConfig, EvoStoreClient};
pub use error::{EvoError, Result};
pub use lineage::{Composition, CompositionResolver, LineageIndex, PrefixTrie, TrieHit};
pub use node::{Node, NodeInfo, NodeStatus};
pub use operations::*;
pub use profile::{ServerTiming, TimingProfile, now_micros};
pub use storage::{
    BlobStore, BufferPool, LayerFileStore, PoolLease, RecordStore, StoredLayer, compute_hash,
    verify_hash,
};
pub use transport::{ConnectionString, DEFAULT_BUFFER_SIZE, Endpoint, Fabric};
pub use types::{
    LayerEntry, LayerId, LayerKey, LineageChain, ModelId, ModelRecord, OwnerId, PrefixMatch,
    node_for_id,
};
