use crate::types::{LayerId, OwnerId};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EvoError>;

#[derive(Error, Debug)]
pub enum EvoError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("transfer error: {0}")]
    Transfer(String),

    #[error(
        "buffer pool exhausted: requested {requested} bytes, {available} of {capacity} available"
    )]
    ResourceExhausted {
        requested: u64,
        available: u64,
        capacity: u64,
    },

    #[error("size mismatch for layer {layer_id}: recorded {expected} bytes, got {actual}")]
    SizeMismatch {
        layer_id: LayerId,
        expected: u64,
        actual: u64,
    },

    #[error("owner mismatch for layer {layer_id}: recorded {recorded:?}, supplied {supplied}")]
    OwnerMismatch {
        layer_id: LayerId,
        recorded: Option<OwnerId>,
        supplied: OwnerId,
    },

    #[error("content hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("layer batch failed at index {index}: {source}")]
    Batch {
        index: usize,
        #[source]
        source: Box<EvoError>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl EvoError {
    /// Unwraps batch failures down to the error that stopped the batch.
    pub fn root(&self) -> &EvoError {
        match self {
            EvoError::Batch { source, .. } => source.root(),
            other => other,
        }
    }

    /// Transport failures and pool exhaustion may succeed on a later attempt.
    /// Callers decide whether to retry; nothing in this crate retries on its own.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.root(),
            EvoError::Connection(_) | EvoError::Transfer(_) | EvoError::ResourceExhausted { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), EvoError::NotFound(_))
    }

    pub(crate) fn at_index(self, index: usize) -> Self {
        EvoError::Batch {
            index,
            source: Box::new(self),
        }
    }
}

impl From<reqwest::Error> for EvoError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() {
            EvoError::Connection(err.to_string())
        } else {
            EvoError::Transfer(err.to_string())
        }
    }
}
