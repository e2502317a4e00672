pub mod get_composition;
pub mod get_model;
pub mod get_prefix;
pub mod internal_adjust_refs;
pub mod internal_get_layer;
pub mod internal_put_layer;
pub mod retire_model;
pub mod store_meta;

pub use get_composition::{
    GetCompositionOperation, GetCompositionOperationOutcome, GetCompositionOperationRequest,
};
pub use get_model::{GetModelOperation, GetModelOperationOutcome, GetModelOperationRequest};
pub use get_prefix::{GetPrefixOperation, GetPrefixOperationOutcome, GetPrefixOperationRequest};
pub use internal_adjust_refs::{
    InternalAdjustRefsOperation, InternalAdjustRefsOperationRequest,
    InternalAdjustRefsOperationResult,
};
pub use internal_get_layer::{
    InternalGetLayerOperation, InternalGetLayerOperationOutcome, InternalGetLayerOperationRequest,
    InternalLayerPayload,
};
pub use internal_put_layer::{
    InternalPutLayerOperation, InternalPutLayerOperationRequest, InternalPutLayerOperationResult,
};
pub use retire_model::{
    RetireModelOperation, RetireModelOperationRequest, RetireModelOperationResult,
};
pub use store_meta::{StoreMetaOperation, StoreMetaOperationRequest, StoreMetaOperationResult};
