//! The client facade: owns the engine and the shared query registry, and
//! constructs bindings with config defaults applied.

use crate::engine::ExecutionEngine;
use crate::mutation::{MutationBinding, MutationOptions};
use crate::query::{QueryBinding, QueryOptions, QueryTuple};
use crate::registry::QueryRegistry;
use crate::subscription::{SubscriptionBinding, SubscriptionOptions};
use liveql_core::{ErrorPolicy, FetchPolicy};
use std::sync::Arc;

/// Client-wide defaults merged into option bundles that did not set them.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub default_fetch_policy: FetchPolicy,
    pub default_error_policy: ErrorPolicy,
    pub default_notify_on_network_status_change: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            default_fetch_policy: FetchPolicy::CacheFirst,
            default_error_policy: ErrorPolicy::None,
            default_notify_on_network_status_change: false,
        }
    }
}

impl ClientConfig {
    /// Creates a config with the standard defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the default fetch policy.
    pub fn default_fetch_policy(mut self, policy: FetchPolicy) -> Self {
        self.default_fetch_policy = policy;
        self
    }

    /// Sets the default error policy.
    pub fn default_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.default_error_policy = policy;
        self
    }

    /// Sets the default for status-only snapshot delivery.
    pub fn default_notify_on_network_status_change(mut self, notify: bool) -> Self {
        self.default_notify_on_network_status_change = notify;
        self
    }
}

/// The liveql client. Cheap to clone; clones share the engine and registry.
#[derive(Clone)]
pub struct LiveqlClient {
    engine: Arc<dyn ExecutionEngine>,
    registry: QueryRegistry,
    config: ClientConfig,
}

impl LiveqlClient {
    /// Creates a client over the given engine with default configuration.
    pub fn new(engine: Arc<dyn ExecutionEngine>) -> Self {
        Self::with_config(engine, ClientConfig::default())
    }

    /// Creates a client with explicit configuration.
    pub fn with_config(engine: Arc<dyn ExecutionEngine>, config: ClientConfig) -> Self {
        Self {
            registry: QueryRegistry::new(engine.clone()),
            engine,
            config,
        }
    }

    /// The client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The shared query registry.
    pub fn registry(&self) -> &QueryRegistry {
        &self.registry
    }

    /// Creates a live query binding that activates immediately (unless
    /// skipped).
    pub fn watch_query(&self, options: QueryOptions) -> QueryBinding {
        QueryBinding::new(self.registry.clone(), self.defaulted(options), false)
    }

    /// Creates a dormant query pair driven through its trigger.
    pub fn lazy_query(&self, options: QueryOptions) -> QueryTuple {
        QueryTuple::new(self.registry.clone(), self.defaulted(options))
    }

    /// Creates a mutation binding.
    pub fn mutation(&self, mut options: MutationOptions) -> MutationBinding {
        options
            .error_policy
            .get_or_insert(self.config.default_error_policy);
        MutationBinding::new(self.registry.clone(), options)
    }

    /// Creates a subscription binding.
    pub fn subscription(&self, mut options: SubscriptionOptions) -> SubscriptionBinding {
        options
            .error_policy
            .get_or_insert(self.config.default_error_policy);
        SubscriptionBinding::new(self.engine.clone(), options)
    }

    fn defaulted(&self, mut options: QueryOptions) -> QueryOptions {
        options
            .fetch_policy
            .get_or_insert(self.config.default_fetch_policy);
        options
            .error_policy
            .get_or_insert(self.config.default_error_policy);
        options
            .notify_on_network_status_change
            .get_or_insert(self.config.default_notify_on_network_status_change);
        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::SubscriptionEvent;
    use async_trait::async_trait;
    use liveql_core::{
        CacheSnapshot, ExecutionResult, NetworkError, OperationRequest,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    struct CachedEngine {
        network_calls: AtomicUsize,
    }

    #[async_trait]
    impl ExecutionEngine for CachedEngine {
        async fn execute(
            &self,
            _request: OperationRequest,
        ) -> Result<ExecutionResult, NetworkError> {
            self.network_calls.fetch_add(1, Ordering::SeqCst);
            Ok(ExecutionResult::data(serde_json::json!({"n": "net"})))
        }

        async fn open_subscription(
            &self,
            _request: OperationRequest,
        ) -> Result<mpsc::Receiver<SubscriptionEvent>, NetworkError> {
            Err(NetworkError::closed("unsupported"))
        }

        fn read_cache(&self, _request: &OperationRequest) -> Option<CacheSnapshot> {
            Some(CacheSnapshot {
                data: serde_json::json!({"n": "cache"}),
                complete: true,
            })
        }
    }

    #[test]
    fn test_config_builder() {
        let config = ClientConfig::new()
            .default_fetch_policy(FetchPolicy::NetworkOnly)
            .default_error_policy(ErrorPolicy::All)
            .default_notify_on_network_status_change(true);
        assert_eq!(config.default_fetch_policy, FetchPolicy::NetworkOnly);
        assert_eq!(config.default_error_policy, ErrorPolicy::All);
        assert!(config.default_notify_on_network_status_change);
    }

    #[tokio::test]
    async fn test_default_fetch_policy_applies() {
        let engine = Arc::new(CachedEngine {
            network_calls: AtomicUsize::new(0),
        });
        // Cache-only default: the binding must settle from cache and never
        // touch the network.
        let client = LiveqlClient::with_config(
            engine.clone(),
            ClientConfig::new().default_fetch_policy(FetchPolicy::CacheOnly),
        );

        let binding = client.watch_query(QueryOptions::new("query Q { n }"));
        let mut rx = binding.subscribe();
        loop {
            let snapshot = rx.borrow_and_update().clone();
            if snapshot.is_settled() && snapshot.called {
                assert_eq!(snapshot.data, Some(serde_json::json!({"n": "cache"})));
                break;
            }
            rx.changed().await.unwrap();
        }
        assert_eq!(engine.network_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_explicit_policy_wins_over_default() {
        let engine = Arc::new(CachedEngine {
            network_calls: AtomicUsize::new(0),
        });
        let client = LiveqlClient::with_config(
            engine.clone(),
            ClientConfig::new().default_fetch_policy(FetchPolicy::CacheOnly),
        );

        let binding = client.watch_query(
            QueryOptions::new("query Q { n }").fetch_policy(FetchPolicy::NetworkOnly),
        );
        let mut rx = binding.subscribe();
        loop {
            let snapshot = rx.borrow_and_update().clone();
            if snapshot.is_settled() && snapshot.called && snapshot.data.is_some() {
                assert_eq!(snapshot.data, Some(serde_json::json!({"n": "net"})));
                break;
            }
            rx.changed().await.unwrap();
        }
        assert_eq!(engine.network_calls.load(Ordering::SeqCst), 1);
    }
}
