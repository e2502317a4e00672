//! Request and response bodies shared by the node server and the client.

use crate::error::EvoError;
use crate::types::{LayerId, ModelId, OwnerId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Hex SHA-256 of the layer body, sent with every layer transfer.
pub const SHA256_HEADER: &str = "x-evostore-sha256";
/// Node clock, in microseconds since the Unix epoch, when a request started.
pub const BEGIN_US_HEADER: &str = "x-evostore-begin-us";
/// Node clock when the response was ready.
pub const END_US_HEADER: &str = "x-evostore-end-us";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreMetaRequest {
    pub edges: Vec<u64>,
    pub layer_ids: Vec<LayerId>,
    pub owners: Vec<OwnerId>,
    pub sizes: Vec<u64>,
    #[serde(default)]
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreMetaResponse {
    pub model_id: ModelId,
    pub seq: u64,
    pub stored_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrefixRequest {
    pub edges: Vec<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetireModelResponse {
    pub model_id: ModelId,
    pub retired: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdjustRefsRequest {
    pub layer_ids: Vec<LayerId>,
    pub delta: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdjustRefsResponse {
    pub owner: OwnerId,
    pub released: Vec<LayerId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PutLayerResponse {
    pub accepted: bool,
    pub replaced: bool,
    pub sha256: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LayerQuery {
    #[serde(default)]
    pub expected_size: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub node_id: u32,
    pub address: String,
    pub layers: usize,
    pub records: usize,
    pub pool_capacity: u64,
    pub pool_in_use: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownResponse {
    pub node_id: u32,
    pub stopping: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(flatten)]
    pub detail: ErrorDetail,
}

/// Machine-readable error kind, so a client can rebuild the node's error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ErrorDetail {
    Validation,
    NotFound,
    ResourceExhausted {
        requested: u64,
        available: u64,
        capacity: u64,
    },
    SizeMismatch {
        layer_id: LayerId,
        expected: u64,
        actual: u64,
    },
    OwnerMismatch {
        layer_id: LayerId,
        recorded: Option<OwnerId>,
        supplied: OwnerId,
    },
    HashMismatch {
        expected: String,
        actual: String,
    },
    Internal,
}

impl ErrorResponse {
    pub fn from_error(error: &EvoError) -> Self {
        let root = error.root();
        let (message, detail) = match root {
            EvoError::Validation(message) => (message.clone(), ErrorDetail::Validation),
            EvoError::NotFound(message) => (message.clone(), ErrorDetail::NotFound),
            EvoError::ResourceExhausted {
                requested,
                available,
                capacity,
            } => (
                root.to_string(),
                ErrorDetail::ResourceExhausted {
                    requested: *requested,
                    available: *available,
                    capacity: *capacity,
                },
            ),
            EvoError::SizeMismatch {
                layer_id,
                expected,
                actual,
            } => (
                root.to_string(),
                ErrorDetail::SizeMismatch {
                    layer_id: *layer_id,
                    expected: *expected,
                    actual: *actual,
                },
            ),
            EvoError::OwnerMismatch {
                layer_id,
                recorded,
                supplied,
            } => (
                root.to_string(),
                ErrorDetail::OwnerMismatch {
                    layer_id: *layer_id,
                    recorded: *recorded,
                    supplied: *supplied,
                },
            ),
            EvoError::HashMismatch { expected, actual } => (
                root.to_string(),
                ErrorDetail::HashMismatch {
                    expected: expected.clone(),
                    actual: actual.clone(),
                },
            ),
            other => (other.to_string(), ErrorDetail::Internal),
        };

        Self {
            error: message,
            detail,
        }
    }

    pub fn status_code(&self) -> u16 {
        match self.detail {
            ErrorDetail::Validation => 400,
            ErrorDetail::NotFound => 404,
            ErrorDetail::SizeMismatch { .. } | ErrorDetail::OwnerMismatch { .. } => 409,
            ErrorDetail::HashMismatch { .. } => 422,
            ErrorDetail::ResourceExhausted { .. } => 507,
            ErrorDetail::Internal => 500,
        }
    }

    pub fn into_error(self) -> EvoError {
        match self.detail {
            ErrorDetail::Validation => EvoError::Validation(self.error),
            ErrorDetail::NotFound => EvoError::NotFound(self.error),
            ErrorDetail::ResourceExhausted {
                requested,
                available,
                capacity,
            } => EvoError::ResourceExhausted {
                requested,
                available,
                capacity,
            },
            ErrorDetail::SizeMismatch {
                layer_id,
                expected,
                actual,
            } => EvoError::SizeMismatch {
                layer_id,
                expected,
                actual,
            },
            ErrorDetail::OwnerMismatch {
                layer_id,
                recorded,
                supplied,
            } => EvoError::OwnerMismatch {
                layer_id,
                recorded,
                supplied,
            },
            ErrorDetail::HashMismatch { expected, actual } => {
                EvoError::HashMismatch { expected, actual }
            }
            ErrorDetail::Internal => EvoError::Internal(self.error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_body_shape() {
        let body = ErrorResponse::from_error(&EvoError::SizeMismatch {
            layer_id: 3,
            expected: 512,
            actual: 80,
        });
        assert_eq!(body.status_code(), 409);

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["kind"], "size_mismatch");
        assert_eq!(json["expected"], 512);
        assert!(json["error"].as_str().unwrap().contains("layer 3"));
    }

    #[test]
    fn test_batch_errors_report_their_cause() {
        let err = EvoError::NotFound("layer owner=1 layer=2".to_string()).at_index(4);
        let body = ErrorResponse::from_error(&err);
        assert_eq!(body.status_code(), 404);
        assert!(body.into_error().is_not_found());
    }

    #[test]
    fn test_error_kind_survives_the_wire() {
        let body = ErrorResponse::from_error(&EvoError::OwnerMismatch {
            layer_id: 3,
            recorded: Some(2),
            supplied: 1,
        });
        let json = serde_json::to_string(&body).unwrap();
        let parsed: ErrorResponse = serde_json::from_str(&json).unwrap();
        assert!(matches!(
            parsed.into_error(),
            EvoError::OwnerMismatch {
                layer_id: 3,
                recorded: Some(2),
                supplied: 1
            }
        ));

        let io = EvoError::Io(std::io::Error::other("disk gone"));
        let body = ErrorResponse::from_error(&io);
        assert_eq!(body.status_code(), 500);
        assert!(matches!(body.into_error(), EvoError::Internal(_)));
    }
}
