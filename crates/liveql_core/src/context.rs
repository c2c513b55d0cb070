//! Request-scoped context passed through to the execution engine.
//!
//! Uses `TypeId` keys for type-safe entries instead of string keys, plus a
//! plain header map for transport concerns.

use rustc_hash::FxHashMap;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Type-keyed storage for request-scoped data, handed to the engine verbatim
/// with every operation.
///
/// # Example
///
/// ```
/// use liveql_core::context::RequestContext;
///
/// #[derive(Clone)]
/// struct AuthToken(String);
///
/// let mut ctx = RequestContext::new();
/// ctx.insert(AuthToken("secret".into()));
/// ctx.set_header("x-request-id", "42");
///
/// let token: Option<&AuthToken> = ctx.get();
/// assert_eq!(token.unwrap().0, "secret");
/// assert_eq!(ctx.header("x-request-id"), Some("42"));
/// ```
#[derive(Default)]
pub struct RequestContext {
    data: FxHashMap<TypeId, Box<dyn Any + Send + Sync>>,
    headers: HashMap<String, String>,
}

impl RequestContext {
    /// Creates a new empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value, replacing any existing entry of the same type.
    pub fn insert<T: Send + Sync + 'static>(&mut self, value: T) -> Option<T> {
        self.data
            .insert(TypeId::of::<T>(), Box::new(value))
            .and_then(|boxed| boxed.downcast().ok().map(|b| *b))
    }

    /// Gets a reference to a value by type.
    pub fn get<T: 'static>(&self) -> Option<&T> {
        self.data
            .get(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast_ref())
    }

    /// Returns true if the context contains a value of the given type.
    pub fn contains<T: 'static>(&self) -> bool {
        self.data.contains_key(&TypeId::of::<T>())
    }

    /// Sets a header value.
    pub fn set_header(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(key.into(), value.into());
    }

    /// Gets a header value.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }

    /// Returns all headers.
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("entries", &self.data.len())
            .field("headers", &self.headers)
            .finish()
    }
}

/// A shareable, immutable context handle; option bundles carry this.
pub type SharedContext = Arc<RequestContext>;

/// Fluent construction of contexts.
pub trait ContextExt {
    /// Adds a value and returns self.
    fn with<T: Send + Sync + 'static>(self, value: T) -> Self;

    /// Adds a header and returns self.
    fn with_header(self, key: impl Into<String>, value: impl Into<String>) -> Self;
}

impl ContextExt for RequestContext {
    fn with<T: Send + Sync + 'static>(mut self, value: T) -> Self {
        self.insert(value);
        self
    }

    fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_header(key, value);
        self
    }
}
