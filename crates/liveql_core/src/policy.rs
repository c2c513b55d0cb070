//! Fetch/error policies and the fine-grained request phase.

use crate::error::CombinedError;
use crate::response::ExecutionResult;
use serde::{Deserialize, Serialize};

/// Strategy governing whether a query reads from cache, network, or both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FetchPolicy {
    /// Serve from cache when complete, otherwise fall through to network.
    #[default]
    CacheFirst,
    /// Serve cached data immediately, then always refresh from network.
    CacheAndNetwork,
    /// Always hit the network; the result may still be cached by the engine.
    NetworkOnly,
    /// Never hit the network; whatever the cache yields is terminal.
    CacheOnly,
    /// Always hit the network and ask the engine not to cache the result.
    NoCache,
}

impl FetchPolicy {
    /// Returns true if this policy consults the cache before the network.
    pub const fn reads_cache(&self) -> bool {
        matches!(self, Self::CacheFirst | Self::CacheAndNetwork | Self::CacheOnly)
    }

    /// Returns true if this policy never issues network requests.
    pub const fn cache_terminal(&self) -> bool {
        matches!(self, Self::CacheOnly)
    }
}

/// How GraphQL-layer errors are surfaced to the binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    /// Any GraphQL error is fatal: data is withheld, the error surfaces.
    #[default]
    None,
    /// Errors are dropped; whatever data arrived is delivered.
    Ignore,
    /// Both data and errors are delivered.
    All,
}

impl ErrorPolicy {
    /// Splits a settled execution into the data and error the binding should
    /// expose, per this policy. With [`ErrorPolicy::None`] an errored result
    /// yields no data; callers keep whatever they previously delivered.
    pub fn apply(
        &self,
        result: ExecutionResult,
    ) -> (Option<serde_json::Value>, Option<CombinedError>) {
        if result.errors.is_empty() {
            return (result.data, None);
        }
        match self {
            Self::None => (None, Some(CombinedError::from_graphql(result.errors))),
            Self::Ignore => (result.data, None),
            Self::All => (
                result.data,
                Some(CombinedError::from_graphql(result.errors)),
            ),
        }
    }
}

/// Fine-grained phase of a query's current request lifecycle, distinct from
/// the coarse `loading` flag. Discriminants are wire-compatible with the
/// conventional numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NetworkStatus {
    /// First request for this query identity is in flight.
    Loading = 1,
    /// The query was re-pointed at new variables; a request is in flight.
    SetVariables = 2,
    /// A pagination request is in flight; existing data is retained.
    FetchMore = 3,
    /// An explicit refetch is in flight.
    Refetch = 4,
    /// A poll-tick request is in flight.
    Poll = 6,
    /// The last request settled successfully.
    Ready = 7,
    /// The last request settled with a fatal error.
    Error = 8,
}

impl NetworkStatus {
    /// Returns true while a request this binding considers "in flight" is
    /// outstanding. Equivalent to the coarse `loading` flag.
    pub const fn is_in_flight(&self) -> bool {
        matches!(
            self,
            Self::Loading | Self::SetVariables | Self::FetchMore | Self::Refetch | Self::Poll
        )
    }

    /// Returns true once a request cycle has settled, in success or error.
    pub const fn is_settled(&self) -> bool {
        !self.is_in_flight()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::GraphQLError;

    #[test]
    fn test_fetch_policy_cache_behavior() {
        assert!(FetchPolicy::CacheFirst.reads_cache());
        assert!(FetchPolicy::CacheOnly.reads_cache());
        assert!(!FetchPolicy::NetworkOnly.reads_cache());
        assert!(FetchPolicy::CacheOnly.cache_terminal());
        assert!(!FetchPolicy::CacheAndNetwork.cache_terminal());
    }

    #[test]
    fn test_fetch_policy_wire_spelling() {
        let json = serde_json::to_string(&FetchPolicy::CacheAndNetwork).unwrap();
        assert_eq!(json, r#""cache-and-network""#);
    }

    #[test]
    fn test_error_policy_none_withholds_data() {
        let result = ExecutionResult {
            data: Some(serde_json::json!({"n": 1})),
            errors: vec![GraphQLError::new("boom")],
            extensions: None,
        };
        let (data, error) = ErrorPolicy::None.apply(result);
        assert!(data.is_none());
        assert!(error.unwrap().is_graphql());
    }

    #[test]
    fn test_error_policy_ignore_drops_errors() {
        let result = ExecutionResult {
            data: Some(serde_json::json!({"n": 1})),
            errors: vec![GraphQLError::new("boom")],
            extensions: None,
        };
        let (data, error) = ErrorPolicy::Ignore.apply(result);
        assert_eq!(data, Some(serde_json::json!({"n": 1})));
        assert!(error.is_none());
    }

    #[test]
    fn test_error_policy_all_delivers_both() {
        let result = ExecutionResult {
            data: Some(serde_json::json!({"n": 1})),
            errors: vec![GraphQLError::new("boom")],
            extensions: None,
        };
        let (data, error) = ErrorPolicy::All.apply(result);
        assert!(data.is_some());
        assert!(error.is_some());
    }

    #[test]
    fn test_network_status_in_flight() {
        assert!(NetworkStatus::Loading.is_in_flight());
        assert!(NetworkStatus::SetVariables.is_in_flight());
        assert!(NetworkStatus::Poll.is_in_flight());
        assert!(NetworkStatus::Ready.is_settled());
        assert!(NetworkStatus::Error.is_settled());
    }

    #[test]
    fn test_network_status_discriminants() {
        assert_eq!(NetworkStatus::Loading as u8, 1);
        assert_eq!(NetworkStatus::Refetch as u8, 4);
        assert_eq!(NetworkStatus::Poll as u8, 6);
        assert_eq!(NetworkStatus::Error as u8, 8);
    }
}
