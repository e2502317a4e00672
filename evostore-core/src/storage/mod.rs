pub mod blob_store;
pub mod buffer_pool;
pub mod layer_files;
pub mod record_store;

pub use blob_store::{BlobStore, PutLayerResult, StoredLayer};
pub use buffer_pool::{BufferPool, PoolLease};
pub use layer_files::{LayerFileStore, compute_hash, verify_hash};
pub use record_store::RecordStore;
