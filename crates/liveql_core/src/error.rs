//! Error taxonomy for liveql bindings.
//!
//! Three layers, per the binding contract:
//! - [`NetworkError`]: transport-level failure, no usable response.
//! - [`GraphQLError`]: application-level errors returned alongside
//!   possibly-partial data (see [`crate::response`]).
//! - [`CombinedError`]: the binding-level wrapper unifying the two so view
//!   code handles a single error shape.

use crate::response::GraphQLError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Typed codes for transport-level failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum NetworkErrorCode {
    /// Generic transport failure (socket error, DNS, TLS).
    Transport,
    /// The request timed out before a response arrived.
    Timeout,
    /// The connection or stream closed before the response completed.
    Closed,
    /// A response arrived but could not be interpreted.
    InvalidResponse,
}

impl NetworkErrorCode {
    /// Returns the wire spelling of the code.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Transport => "TRANSPORT",
            Self::Timeout => "TIMEOUT",
            Self::Closed => "CLOSED",
            Self::InvalidResponse => "INVALID_RESPONSE",
        }
    }

    /// Returns true if a fresh attempt of the same request could succeed.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport | Self::Timeout | Self::Closed)
    }
}

impl fmt::Display for NetworkErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A transport-level failure: the engine produced no usable response.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("[{code}] {message}")]
pub struct NetworkError {
    /// Typed failure code.
    pub code: NetworkErrorCode,
    /// Human-readable message.
    pub message: String,
}

impl NetworkError {
    /// Creates a new error with the given code and message.
    pub fn new(code: NetworkErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Creates a generic transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(NetworkErrorCode::Transport, message)
    }

    /// Creates a timeout error.
    pub fn timeout() -> Self {
        Self::new(NetworkErrorCode::Timeout, "request timed out")
    }

    /// Creates an error for a connection or stream that closed early.
    pub fn closed(message: impl Into<String>) -> Self {
        Self::new(NetworkErrorCode::Closed, message)
    }

    /// Creates an error for an uninterpretable response.
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(NetworkErrorCode::InvalidResponse, message)
    }

    /// Returns true if a fresh attempt of the same request could succeed.
    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }
}

/// The binding-level error: at most one network failure plus zero or more
/// GraphQL-layer errors, so consumers handle a single shape.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CombinedError {
    /// Transport-level failure, if any.
    pub network: Option<NetworkError>,
    /// Application-level errors returned by the server, if any.
    pub graphql: Vec<GraphQLError>,
}

impl CombinedError {
    /// Wraps a transport failure.
    pub fn from_network(network: NetworkError) -> Self {
        Self {
            network: Some(network),
            graphql: Vec::new(),
        }
    }

    /// Wraps GraphQL-layer errors.
    pub fn from_graphql(graphql: Vec<GraphQLError>) -> Self {
        Self {
            network: None,
            graphql,
        }
    }

    /// Returns true if this error carries a transport failure.
    pub fn is_network(&self) -> bool {
        self.network.is_some()
    }

    /// Returns true if this error carries GraphQL-layer errors.
    pub fn is_graphql(&self) -> bool {
        !self.graphql.is_empty()
    }

    /// The most useful single message: the network message if present,
    /// otherwise the first GraphQL error message.
    pub fn message(&self) -> &str {
        if let Some(net) = &self.network {
            return &net.message;
        }
        self.graphql
            .first()
            .map_or("unknown error", |e| e.message.as_str())
    }
}

impl fmt::Display for CombinedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.network, self.graphql.len()) {
            (Some(net), 0) => write!(f, "{net}"),
            (Some(net), n) => write!(f, "{net} (+{n} graphql errors)"),
            (None, 0) => write!(f, "unknown error"),
            (None, 1) => write!(f, "{}", self.graphql[0].message),
            (None, n) => write!(f, "{} (+{} more)", self.graphql[0].message, n - 1),
        }
    }
}

impl std::error::Error for CombinedError {}

impl From<NetworkError> for CombinedError {
    fn from(network: NetworkError) -> Self {
        Self::from_network(network)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_error_code_properties() {
        assert!(NetworkErrorCode::Timeout.is_retryable());
        assert!(NetworkErrorCode::Closed.is_retryable());
        assert!(!NetworkErrorCode::InvalidResponse.is_retryable());
        assert_eq!(NetworkErrorCode::Transport.as_str(), "TRANSPORT");
    }

    #[test]
    fn test_network_error_display() {
        let err = NetworkError::timeout();
        assert_eq!(err.to_string(), "[TIMEOUT] request timed out");
    }

    #[test]
    fn test_combined_error_message_prefers_network() {
        let err = CombinedError {
            network: Some(NetworkError::transport("connection refused")),
            graphql: vec![GraphQLError::new("field error")],
        };
        assert_eq!(err.message(), "connection refused");
        assert!(err.is_network());
        assert!(err.is_graphql());
    }

    #[test]
    fn test_combined_error_display_counts_graphql() {
        let err = CombinedError::from_graphql(vec![
            GraphQLError::new("first"),
            GraphQLError::new("second"),
        ]);
        assert_eq!(err.to_string(), "first (+1 more)");
        assert_eq!(err.message(), "first");
    }
}
