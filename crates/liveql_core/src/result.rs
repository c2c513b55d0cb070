//! Snapshot records exposed to the view layer.
//!
//! Each binding publishes one of these through a watch channel; value
//! equality between consecutive snapshots decides whether a render
//! notification is due.

use crate::error::CombinedError;
use crate::policy::NetworkStatus;

/// Snapshot of one query's execution state.
///
/// Invariants maintained by the bindings:
/// - `network_status == Error` implies `error` is set;
/// - `called == false` implies no request was ever issued and `data`/`error`
///   are both unset;
/// - `loading` mirrors `network_status.is_in_flight()`.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    /// Last delivered data; possibly partial, absent until first resolution.
    pub data: Option<serde_json::Value>,
    /// At most one combined error for the last settled cycle.
    pub error: Option<CombinedError>,
    /// True while a request this binding considers in flight is outstanding.
    pub loading: bool,
    /// Fine-grained phase of the current request lifecycle.
    pub network_status: NetworkStatus,
    /// True when `data` is a partial cache satisfaction.
    pub partial: bool,
    /// True once the query has been executed at least once. Stays false for
    /// skipped bindings and untriggered lazy bindings.
    pub called: bool,
}

impl QueryResult {
    /// The snapshot of a binding that has never issued a request
    /// (skipped, or lazy and not yet triggered).
    pub fn idle() -> Self {
        Self {
            data: None,
            error: None,
            loading: false,
            network_status: NetworkStatus::Ready,
            partial: false,
            called: false,
        }
    }

    /// The snapshot of an active query with a request in flight.
    pub fn in_flight(status: NetworkStatus) -> Self {
        Self {
            data: None,
            error: None,
            loading: status.is_in_flight(),
            network_status: status,
            partial: false,
            called: true,
        }
    }

    /// Returns true once the current request cycle has settled.
    pub fn is_settled(&self) -> bool {
        !self.loading
    }
}

impl Default for QueryResult {
    fn default() -> Self {
        Self::idle()
    }
}

/// Snapshot of a mutation binding across trigger calls.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MutationResult {
    /// Result of the most recent successful execution.
    pub data: Option<serde_json::Value>,
    /// Error of the most recent settled execution, if it failed.
    pub error: Option<CombinedError>,
    /// True while any trigger call (and its awaited refetches) is outstanding.
    pub loading: bool,
    /// True once the trigger has been invoked at least once.
    pub called: bool,
}

impl MutationResult {
    /// The snapshot before the trigger has ever been called.
    pub fn idle() -> Self {
        Self::default()
    }
}

/// Snapshot of a subscription binding.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubscriptionResult {
    /// Data of the most recent event.
    pub data: Option<serde_json::Value>,
    /// Error of the most recent event or transport failure.
    pub error: Option<CombinedError>,
    /// True only until the first event or error arrives.
    pub loading: bool,
}

impl SubscriptionResult {
    /// The snapshot of a skipped or documentless binding.
    pub fn idle() -> Self {
        Self::default()
    }

    /// The snapshot of a freshly established stream awaiting its first event.
    pub fn pending() -> Self {
        Self {
            loading: true,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_invariant() {
        let idle = QueryResult::idle();
        assert!(!idle.called);
        assert!(idle.data.is_none());
        assert!(idle.error.is_none());
        assert!(!idle.loading);
    }

    #[test]
    fn test_in_flight_mirrors_status() {
        let snap = QueryResult::in_flight(NetworkStatus::Refetch);
        assert!(snap.loading);
        assert!(snap.called);
        assert!(!snap.is_settled());

        let snap = QueryResult::in_flight(NetworkStatus::Ready);
        assert!(!snap.loading);
    }

    #[test]
    fn test_snapshot_value_equality() {
        let a = QueryResult {
            data: Some(serde_json::json!({"n": 1})),
            ..QueryResult::in_flight(NetworkStatus::Loading)
        };
        let b = a.clone();
        assert_eq!(a, b);

        let c = QueryResult {
            data: Some(serde_json::json!({"n": 2})),
            ..a.clone()
        };
        assert_ne!(a, c);
    }

    #[test]
    fn test_subscription_pending() {
        assert!(SubscriptionResult::pending().loading);
        assert!(!SubscriptionResult::idle().loading);
    }
}
