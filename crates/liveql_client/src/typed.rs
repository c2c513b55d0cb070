//! Typed operations: compile-time pairing of documents, variables, and
//! response shapes.
//!
//! # Example
//!
//! ```ignore
//! use liveql_client::typed::TypedOperation;
//! use liveql_core::OperationKind;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize)]
//! struct GetUserVars { id: String }
//!
//! #[derive(Deserialize)]
//! struct GetUserData { user: Option<User> }
//!
//! struct GetUser;
//! impl TypedOperation for GetUser {
//!     type Variables = GetUserVars;
//!     type Response = GetUserData;
//!     const OPERATION: &'static str = "query GetUser($id: ID!) { user(id: $id) { id name } }";
//!     const OPERATION_NAME: &'static str = "GetUser";
//!     const KIND: OperationKind = OperationKind::Query;
//! }
//!
//! let binding = client.watch_query(QueryOptions::for_operation::<GetUser>(
//!     GetUserVars { id: "1".into() },
//! ));
//! let user: Option<GetUserData> = binding.current().data_as().unwrap();
//! ```

use crate::mutation::MutationOptions;
use crate::query::QueryOptions;
use crate::subscription::SubscriptionOptions;
use liveql_core::{
    ExecutionResult, MutationResult, OperationKind, QueryResult, SubscriptionResult,
};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// A strongly typed GraphQL operation: the document plus its variable and
/// response types.
pub trait TypedOperation {
    /// The input variables type.
    type Variables: Serialize;

    /// The response data type.
    type Response: DeserializeOwned;

    /// The GraphQL operation document.
    const OPERATION: &'static str;

    /// The operation name, for multi-operation documents and
    /// refetch-by-name.
    const OPERATION_NAME: &'static str;

    /// The kind of operation.
    const KIND: OperationKind;
}

impl QueryOptions {
    /// Builds query options from a typed operation.
    pub fn for_operation<Op: TypedOperation>(variables: Op::Variables) -> Self {
        debug_assert!(matches!(Op::KIND, OperationKind::Query));
        let mut options =
            QueryOptions::new(Op::OPERATION).operation_name(Op::OPERATION_NAME);
        options.variables = serde_json::to_value(variables).ok();
        options
    }
}

impl MutationOptions {
    /// Builds mutation options from a typed operation.
    pub fn for_operation<Op: TypedOperation>(variables: Op::Variables) -> Self {
        debug_assert!(matches!(Op::KIND, OperationKind::Mutation));
        let mut options =
            MutationOptions::new(Op::OPERATION).operation_name(Op::OPERATION_NAME);
        options.variables = serde_json::to_value(variables).ok();
        options
    }
}

impl SubscriptionOptions {
    /// Builds subscription options from a typed operation.
    pub fn for_operation<Op: TypedOperation>(variables: Op::Variables) -> Self {
        debug_assert!(matches!(Op::KIND, OperationKind::Subscription));
        let mut options =
            SubscriptionOptions::new(Op::OPERATION).operation_name(Op::OPERATION_NAME);
        options.variables = serde_json::to_value(variables).ok();
        options
    }
}

/// Decoding of snapshot data into typed response shapes.
pub trait DecodeData {
    /// The raw data payload, if any.
    fn raw_data(&self) -> Option<&serde_json::Value>;

    /// Decodes the data payload into a typed response. `Ok(None)` means no
    /// data has been delivered yet.
    fn data_as<T: DeserializeOwned>(&self) -> Result<Option<T>, serde_json::Error> {
        self.raw_data()
            .map(|data| serde_json::from_value(data.clone()))
            .transpose()
    }
}

impl DecodeData for QueryResult {
    fn raw_data(&self) -> Option<&serde_json::Value> {
        self.data.as_ref()
    }
}

impl DecodeData for MutationResult {
    fn raw_data(&self) -> Option<&serde_json::Value> {
        self.data.as_ref()
    }
}

impl DecodeData for SubscriptionResult {
    fn raw_data(&self) -> Option<&serde_json::Value> {
        self.data.as_ref()
    }
}

impl DecodeData for ExecutionResult {
    fn raw_data(&self) -> Option<&serde_json::Value> {
        self.data.as_ref()
    }
}
