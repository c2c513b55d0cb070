//! Core types for liveql.
//!
//! This crate provides the foundational records shared between the binding
//! layer and the execution engine:
//! - `operation`: operation kinds and engine-facing requests
//! - `response`: GraphQL responses, errors, cache snapshots
//! - `error`: the network/GraphQL/combined error taxonomy
//! - `policy`: fetch policies, error policies, network status
//! - `result`: the snapshot records exposed to the view layer
//! - `context`: request-scoped, type-keyed context

pub mod context;
pub mod error;
pub mod operation;
pub mod policy;
pub mod response;
pub mod result;

pub use context::{ContextExt, RequestContext, SharedContext};
pub use error::{CombinedError, NetworkError, NetworkErrorCode};
pub use operation::{infer_operation_name, OperationKind, OperationRequest};
pub use policy::{ErrorPolicy, FetchPolicy, NetworkStatus};
pub use response::{
    CacheSnapshot, ExecutionResult, GraphQLError, GraphQLLocation, PathSegment,
};
pub use result::{MutationResult, QueryResult, SubscriptionResult};
