//! The shared query registry.
//!
//! One [`ReactiveQuery`] per (document identity, serialized variables),
//! with explicit acquire/release counting. The last release tears the shared
//! query down; nothing here relies on ambient garbage collection.

use crate::engine::ExecutionEngine;
use crate::reactive::{FetchKind, QuerySpec, ReactiveQuery};
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::collections::hash_map::Entry;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Identity of one shared query: the document plus its variables in
/// canonical serialized form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    document: Arc<str>,
    variables_key: String,
}

impl QueryKey {
    pub(crate) fn new(document: Arc<str>, variables: Option<&Value>) -> Self {
        // serde_json's default map keeps keys sorted, so serialization is
        // canonical across callers that built their variables differently.
        let variables_key = variables
            .map(|v| v.to_string())
            .unwrap_or_else(|| "null".to_string());
        Self {
            document,
            variables_key,
        }
    }
}

/// Designates queries a mutation wants refetched or updated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefetchTarget {
    /// Every active query whose operation name matches.
    OperationName(String),
    /// Every active query executing this document, regardless of variables.
    Document(Arc<str>),
}

impl From<&str> for RefetchTarget {
    fn from(name: &str) -> Self {
        Self::OperationName(name.to_string())
    }
}

struct RegistryEntry {
    query: Arc<ReactiveQuery>,
    acquisitions: usize,
}

#[derive(Default)]
struct RegistryInner {
    entries: FxHashMap<QueryKey, RegistryEntry>,
}

/// Registry of shared reactive queries. Cheap to clone; all clones share
/// the same entries.
#[derive(Clone)]
pub struct QueryRegistry {
    engine: Arc<dyn ExecutionEngine>,
    inner: Arc<Mutex<RegistryInner>>,
}

impl QueryRegistry {
    pub(crate) fn new(engine: Arc<dyn ExecutionEngine>) -> Self {
        Self {
            engine,
            inner: Arc::new(Mutex::new(RegistryInner::default())),
        }
    }

    /// The engine this registry creates shared queries against.
    pub(crate) fn engine(&self) -> Arc<dyn ExecutionEngine> {
        self.engine.clone()
    }

    /// Acquires the shared query for the spec's identity, creating it if this
    /// is the first interest. Returns the acquisition guard and whether the
    /// query was created by this call.
    pub fn acquire(&self, spec: QuerySpec) -> (QueryAcquisition, bool) {
        let key = QueryKey::new(spec.document.clone(), spec.variables.as_ref());
        let mut inner = self.inner.lock().unwrap();
        let (query, created) = match inner.entries.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                entry.acquisitions += 1;
                (entry.query.clone(), false)
            }
            Entry::Vacant(vacant) => {
                let query = Arc::new(ReactiveQuery::new(self.engine.clone(), spec));
                vacant.insert(RegistryEntry {
                    query: query.clone(),
                    acquisitions: 1,
                });
                (query, true)
            }
        };
        debug!(
            operation = query.operation_name().unwrap_or("<anonymous>"),
            created, "acquired shared query"
        );
        (
            QueryAcquisition {
                key,
                query,
                inner: self.inner.clone(),
            },
            created,
        )
    }

    /// Active queries matching a refetch target.
    pub fn matching(&self, target: &RefetchTarget) -> Vec<Arc<ReactiveQuery>> {
        let inner = self.inner.lock().unwrap();
        inner
            .entries
            .values()
            .filter(|entry| match target {
                RefetchTarget::OperationName(name) => {
                    entry.query.operation_name() == Some(name.as_str())
                }
                RefetchTarget::Document(document) => entry.query.document() == document,
            })
            .map(|entry| entry.query.clone())
            .collect()
    }

    /// Re-executes every active query matching the target, serially per
    /// query. Failures are reported in the result, not raised.
    pub async fn refetch(&self, target: &RefetchTarget) -> usize {
        let queries = self.matching(target);
        if queries.is_empty() {
            warn!(?target, "refetch target matched no active queries");
        }
        let mut settled = 0;
        for query in queries {
            match query.fetch(FetchKind::Refetch, None).await {
                Ok(_) => settled += 1,
                Err(error) => {
                    warn!(
                        operation = query.operation_name().unwrap_or("<anonymous>"),
                        %error,
                        "refetch triggered by mutation failed"
                    );
                }
            }
        }
        settled
    }

    /// Applies a synchronous data transform to every active query matching
    /// the target (the mutation `update` path).
    pub fn update_query_data<F>(&self, target: &RefetchTarget, f: F)
    where
        F: Fn(Option<Value>) -> Option<Value>,
    {
        for query in self.matching(target) {
            query.update_data(&f);
        }
    }

    /// Number of active shared queries, mostly for diagnostics and tests.
    pub fn active_count(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }
}

/// Guard tying one binding's interest in a shared query to the registry's
/// refcount. Dropping the guard is the release; the last release tears the
/// shared query down.
pub struct QueryAcquisition {
    key: QueryKey,
    query: Arc<ReactiveQuery>,
    inner: Arc<Mutex<RegistryInner>>,
}

impl QueryAcquisition {
    /// The shared query this acquisition points at.
    pub fn query(&self) -> &Arc<ReactiveQuery> {
        &self.query
    }
}

impl Drop for QueryAcquisition {
    fn drop(&mut self) {
        let mut inner = self.inner.lock().unwrap();
        let last = match inner.entries.get_mut(&self.key) {
            Some(entry) => {
                entry.acquisitions -= 1;
                entry.acquisitions == 0
            }
            None => false,
        };
        if last {
            inner.entries.remove(&self.key);
            debug!("released last acquisition, removing shared query");
            self.query.teardown();
        }
    }
}
