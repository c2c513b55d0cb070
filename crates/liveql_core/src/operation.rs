//! Operation requests as handed to the execution engine.

use crate::context::SharedContext;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, OnceLock};

/// The kind of a GraphQL operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Query,
    Mutation,
    Subscription,
}

impl OperationKind {
    /// Returns the keyword spelling of this kind.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Mutation => "mutation",
            Self::Subscription => "subscription",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One operation dispatch: everything the engine needs to execute a
/// query/mutation or open a subscription stream.
#[derive(Clone)]
pub struct OperationRequest {
    /// The kind of operation being dispatched.
    pub kind: OperationKind,
    /// The GraphQL document, uninterpreted by this layer.
    pub document: Arc<str>,
    /// The operation name, for multi-operation documents and refetch-by-name.
    pub operation_name: Option<String>,
    /// Operation variables, if any.
    pub variables: Option<serde_json::Value>,
    /// Request-scoped context, handed to the engine verbatim.
    pub context: SharedContext,
}

impl OperationRequest {
    /// Creates a request. When no operation name is given, a name is sniffed
    /// from the document head so refetch-by-name keeps working.
    pub fn new(
        kind: OperationKind,
        document: Arc<str>,
        operation_name: Option<String>,
        variables: Option<serde_json::Value>,
        context: SharedContext,
    ) -> Self {
        let operation_name = operation_name.or_else(|| infer_operation_name(&document));
        Self {
            kind,
            document,
            operation_name,
            variables,
            context,
        }
    }

    /// Builds the conventional JSON request body.
    pub fn body(&self) -> serde_json::Value {
        serde_json::json!({
            "query": self.document.as_ref(),
            "variables": self.variables,
            "operationName": self.operation_name,
        })
    }
}

impl fmt::Debug for OperationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationRequest")
            .field("kind", &self.kind)
            .field("operation_name", &self.operation_name)
            .field("variables", &self.variables)
            .finish()
    }
}

/// Extracts the operation name from a document's head, if it declares one.
/// This is a textual sniff, not a parse; documents are otherwise opaque here.
pub fn infer_operation_name(document: &str) -> Option<String> {
    static NAME_RE: OnceLock<Regex> = OnceLock::new();
    let re = NAME_RE.get_or_init(|| {
        Regex::new(r"^\s*(?:query|mutation|subscription)\s+([_A-Za-z][_0-9A-Za-z]*)")
            .expect("operation name pattern")
    });
    re.captures(document)
        .map(|caps| caps[1].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RequestContext;

    #[test]
    fn test_infer_operation_name() {
        assert_eq!(
            infer_operation_name("query GetItems($first: Int) { items }"),
            Some("GetItems".into())
        );
        assert_eq!(
            infer_operation_name("\n  mutation AddItem { addItem { id } }"),
            Some("AddItem".into())
        );
        assert_eq!(infer_operation_name("{ items }"), None);
        assert_eq!(infer_operation_name("query { items }"), None);
    }

    #[test]
    fn test_request_sniffs_name() {
        let request = OperationRequest::new(
            OperationKind::Query,
            "query GetItems { items }".into(),
            None,
            None,
            SharedContext::default(),
        );
        assert_eq!(request.operation_name.as_deref(), Some("GetItems"));
    }

    #[test]
    fn test_explicit_name_wins() {
        let request = OperationRequest::new(
            OperationKind::Query,
            "query GetItems { items }".into(),
            Some("Other".into()),
            None,
            SharedContext::default(),
        );
        assert_eq!(request.operation_name.as_deref(), Some("Other"));
    }

    #[test]
    fn test_body_shape() {
        let request = OperationRequest::new(
            OperationKind::Mutation,
            "mutation AddItem { addItem { id } }".into(),
            None,
            Some(serde_json::json!({"name": "x"})),
            Arc::new(RequestContext::new()),
        );
        let body = request.body();
        assert_eq!(body["operationName"], "AddItem");
        assert_eq!(body["variables"]["name"], "x");
        assert!(body["query"].as_str().unwrap().starts_with("mutation"));
    }
}
