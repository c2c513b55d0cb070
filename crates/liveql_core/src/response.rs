//! GraphQL response records as delivered by the execution engine.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A source location (line and column, both starting at 1) attached to a
/// [`GraphQLError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GraphQLLocation {
    pub line: usize,
    pub column: usize,
}

/// A path segment inside a response, as used in error paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Field(String),
    Index(usize),
}

impl From<&str> for PathSegment {
    fn from(s: &str) -> Self {
        Self::Field(s.to_string())
    }
}

impl From<usize> for PathSegment {
    fn from(i: usize) -> Self {
        Self::Index(i)
    }
}

/// An application-level error, as found in a GraphQL response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQLError {
    /// The error message.
    pub message: String,
    /// Locations relevant to the error, if any.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<GraphQLLocation>,
    /// Path to the response field the error applies to, if any.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<PathSegment>,
    /// Extension data attached by the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<IndexMap<String, serde_json::Value>>,
}

impl GraphQLError {
    /// Creates an error with just a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            locations: Vec::new(),
            path: Vec::new(),
            extensions: None,
        }
    }

    /// Sets the error path.
    pub fn at_path(mut self, path: Vec<PathSegment>) -> Self {
        self.path = path;
        self
    }
}

/// One settled GraphQL execution: possibly-partial data plus zero or more
/// errors, exactly as the engine hands it over.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<GraphQLError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<IndexMap<String, serde_json::Value>>,
}

impl ExecutionResult {
    /// Creates a result carrying only data.
    pub fn data(data: serde_json::Value) -> Self {
        Self {
            data: Some(data),
            ..Self::default()
        }
    }

    /// Creates a result carrying only errors.
    pub fn errors(errors: Vec<GraphQLError>) -> Self {
        Self {
            errors,
            ..Self::default()
        }
    }

    /// Returns true if the server reported any GraphQL-layer errors.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// A synchronous cache satisfaction of a query, reported by the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheSnapshot {
    /// The (possibly partial) cached data.
    pub data: serde_json::Value,
    /// Whether the cache fully satisfied the query.
    pub complete: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_segment_serde_untagged() {
        let path = vec![PathSegment::from("items"), PathSegment::from(2)];
        let json = serde_json::to_string(&path).unwrap();
        assert_eq!(json, r#"["items",2]"#);

        let back: Vec<PathSegment> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, path);
    }

    #[test]
    fn test_execution_result_round_trip() {
        let result = ExecutionResult {
            data: Some(serde_json::json!({"user": {"id": "1"}})),
            errors: vec![GraphQLError::new("partial failure").at_path(vec!["user".into()])],
            extensions: None,
        };
        let json = serde_json::to_string(&result).unwrap();
        let back: ExecutionResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back, result);
        assert!(back.has_errors());
    }

    #[test]
    fn test_execution_result_skips_empty_fields() {
        let json = serde_json::to_string(&ExecutionResult::data(serde_json::json!({"n": 1})))
            .unwrap();
        assert!(!json.contains("errors"));
        assert!(!json.contains("extensions"));
    }
}
