//! The execution engine seam.
//!
//! Everything the bindings do not do themselves — transport, document
//! parsing, response normalization, caching — sits behind
//! [`ExecutionEngine`]. The bindings only ever hold an
//! `Arc<dyn ExecutionEngine>`.

use async_trait::async_trait;
use liveql_core::{CacheSnapshot, ExecutionResult, NetworkError, OperationRequest};
use tokio::sync::mpsc;

/// Identifier tying an optimistic installation to its rollback.
pub type OptimisticId = u64;

/// One event on a subscription stream.
#[derive(Debug, Clone)]
pub enum SubscriptionEvent {
    /// The server delivered a result.
    Next(ExecutionResult),
    /// The transport failed; the stream is dead.
    Failed(NetworkError),
    /// The server closed the stream normally.
    Complete,
}

/// The engine the bindings adapt: one-shot execution, subscription streams,
/// and optional cache/optimistic hooks.
///
/// Engines without a cache or optimistic layer implement only the two
/// required methods; the hooks default to "no cache" and no-ops.
#[async_trait]
pub trait ExecutionEngine: Send + Sync + 'static {
    /// Executes a query or mutation once. No implicit retry.
    async fn execute(&self, request: OperationRequest) -> Result<ExecutionResult, NetworkError>;

    /// Opens a subscription stream. Events arrive on the returned receiver;
    /// a [`SubscriptionEvent::Complete`] marks natural completion, while
    /// dropping the sender without one means the stream was torn down.
    async fn open_subscription(
        &self,
        request: OperationRequest,
    ) -> Result<mpsc::Receiver<SubscriptionEvent>, NetworkError>;

    /// Reads whatever the cache can synchronously say about a query.
    fn read_cache(&self, request: &OperationRequest) -> Option<CacheSnapshot> {
        let _ = request;
        None
    }

    /// Installs a speculative mutation result visible to cache readers until
    /// [`ExecutionEngine::rollback_optimistic`] is called with the same id.
    fn install_optimistic(
        &self,
        id: OptimisticId,
        request: &OperationRequest,
        data: &serde_json::Value,
    ) {
        let _ = (id, request, data);
    }

    /// Removes a previously installed speculative result.
    fn rollback_optimistic(&self, id: OptimisticId) {
        let _ = id;
    }
}
