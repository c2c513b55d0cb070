//! Render-binding synchronization core for liveql.
//!
//! This crate keeps view snapshots consistent with a live GraphQL execution
//! engine:
//! - `engine`: the execution engine seam the bindings adapt
//! - `registry`: acquire/release-counted shared query registry
//! - `reactive`: the shared per-identity reactive query primitive
//! - `query`: live and lazy query bindings
//! - `mutation`: stateful, re-triggerable mutation bindings
//! - `subscription`: push-only subscription bindings
//! - `client`: the facade constructing bindings with config defaults
//! - `typed`: compile-time typed operations and snapshot decoding

pub mod client;
pub mod engine;
pub mod mutation;
pub mod query;
pub mod reactive;
pub mod registry;
pub mod subscription;
pub mod typed;

pub use client::{ClientConfig, LiveqlClient};
pub use engine::{ExecutionEngine, OptimisticId, SubscriptionEvent};
pub use mutation::{
    MutationBinding, MutationCallOptions, MutationOptions, MutationTrigger, MutationTuple,
    OptimisticResponse, RefetchQueries, UpdateCallback,
};
pub use query::{
    DataCallback, ErrorCallback, QueryBinding, QueryOptions, QueryTrigger, QueryTuple,
    SubscribeToMoreHandle, SubscribeToMoreOptions,
};
pub use reactive::{accumulate, MergeFn, QuerySpec, ReactiveQuery};
pub use registry::{QueryAcquisition, QueryKey, QueryRegistry, RefetchTarget};
pub use subscription::{
    ShouldResubscribe, SubscriptionBinding, SubscriptionDataContext, SubscriptionOptions,
};
pub use typed::{DecodeData, TypedOperation};

// Re-export the core records alongside the bindings that produce them.
pub use liveql_core::{
    CacheSnapshot, CombinedError, ErrorPolicy, ExecutionResult, FetchPolicy, GraphQLError,
    MutationResult, NetworkError, NetworkErrorCode, NetworkStatus, OperationKind,
    OperationRequest, QueryResult, RequestContext, SharedContext, SubscriptionResult,
};
