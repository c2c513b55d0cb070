//! The shared reactive query primitive.
//!
//! One [`ReactiveQuery`] exists per (document, variables) identity; all
//! bindings watching that identity share it through the registry. It owns
//! the result watch channel, serializes requests for its identity, drives
//! polling, and applies fetch/error policies to settlements.

use crate::engine::ExecutionEngine;
use liveql_core::{
    CacheSnapshot, CombinedError, ErrorPolicy, FetchPolicy, NetworkStatus, OperationKind,
    OperationRequest, QueryResult, SharedContext,
};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, watch, Mutex as AsyncMutex};
use tracing::{debug, trace, warn};

/// Capacity of the per-query settlement channel. Settlements are rare
/// (one per request cycle), so a small buffer is plenty.
const SETTLEMENT_CAPACITY: usize = 16;

/// Merge strategy folding a secondary result into existing data.
pub type MergeFn = Arc<dyn Fn(Option<Value>, Value) -> Value + Send + Sync>;

/// Everything needed to create one shared query.
#[derive(Clone)]
pub struct QuerySpec {
    pub document: Arc<str>,
    pub operation_name: Option<String>,
    pub variables: Option<Value>,
    pub fetch_policy: FetchPolicy,
    pub error_policy: ErrorPolicy,
    /// Deliver partial cache satisfactions instead of withholding them.
    pub deliver_partial: bool,
    pub context: SharedContext,
}

/// Which request cycle a fetch belongs to; decides the published status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FetchKind {
    Initial,
    SetVariables,
    Refetch,
    Poll,
}

impl FetchKind {
    fn status(self) -> NetworkStatus {
        match self {
            Self::Initial => NetworkStatus::Loading,
            Self::SetVariables => NetworkStatus::SetVariables,
            Self::Refetch => NetworkStatus::Refetch,
            Self::Poll => NetworkStatus::Poll,
        }
    }
}

struct PollState {
    interval: Option<Duration>,
    task: Option<tokio::task::JoinHandle<()>>,
}

/// The shared per-identity query. See the module docs for ownership rules.
pub struct ReactiveQuery {
    engine: Arc<dyn ExecutionEngine>,
    document: Arc<str>,
    operation_name: Option<String>,
    fetch_policy: FetchPolicy,
    error_policy: ErrorPolicy,
    deliver_partial: bool,
    context: SharedContext,
    variables: Mutex<Option<Value>>,
    results: watch::Sender<QueryResult>,
    /// One event per settled request cycle. Unlike the watch channel this
    /// never coalesces, so per-settlement callbacks see every cycle.
    settlements: broadcast::Sender<QueryResult>,
    /// Serializes refetch/fetch_more/poll for this identity.
    request_gate: AsyncMutex<()>,
    /// Bumped on variable changes and teardown; a settlement from an older
    /// generation never touches the shared snapshot.
    generation: AtomicU64,
    /// Poll ticks are suppressed while this is set.
    non_poll_in_flight: AtomicBool,
    poll: Mutex<PollState>,
}

impl ReactiveQuery {
    pub(crate) fn new(engine: Arc<dyn ExecutionEngine>, spec: QuerySpec) -> Self {
        let operation_name = spec
            .operation_name
            .or_else(|| liveql_core::infer_operation_name(&spec.document));
        let (results, _) = watch::channel(QueryResult::in_flight(NetworkStatus::Loading));
        let (settlements, _) = broadcast::channel(SETTLEMENT_CAPACITY);
        Self {
            engine,
            document: spec.document,
            operation_name,
            fetch_policy: spec.fetch_policy,
            error_policy: spec.error_policy,
            deliver_partial: spec.deliver_partial,
            context: spec.context,
            variables: Mutex::new(spec.variables),
            results,
            settlements,
            request_gate: AsyncMutex::new(()),
            generation: AtomicU64::new(0),
            non_poll_in_flight: AtomicBool::new(false),
            poll: Mutex::new(PollState {
                interval: None,
                task: None,
            }),
        }
    }

    /// The document this query executes.
    pub fn document(&self) -> &Arc<str> {
        &self.document
    }

    /// The operation name, declared or sniffed from the document.
    pub fn operation_name(&self) -> Option<&str> {
        self.operation_name.as_deref()
    }

    /// The variables currently bound to this identity.
    pub fn variables(&self) -> Option<Value> {
        self.variables.lock().unwrap().clone()
    }

    /// The latest published snapshot.
    pub fn current(&self) -> QueryResult {
        self.results.borrow().clone()
    }

    /// Subscribes to the result stream.
    pub fn subscribe(&self) -> watch::Receiver<QueryResult> {
        self.results.subscribe()
    }

    /// Subscribes to settlement events: exactly one per settled request
    /// cycle, never coalesced.
    pub fn settlements(&self) -> broadcast::Receiver<QueryResult> {
        self.settlements.subscribe()
    }

    /// Publishes the current snapshot as one settled cycle.
    fn record_settlement(&self) {
        let _ = self.settlements.send(self.current());
    }

    /// Applies a change to the snapshot, notifying watchers only when the
    /// snapshot actually changed by value.
    fn publish<F: FnOnce(&mut QueryResult)>(&self, f: F) {
        self.results.send_if_modified(|current| {
            let before = current.clone();
            f(current);
            *current != before
        });
    }

    fn request(&self, variables: Option<Value>) -> OperationRequest {
        OperationRequest::new(
            OperationKind::Query,
            self.document.clone(),
            self.operation_name.clone(),
            variables,
            self.context.clone(),
        )
    }

    /// Runs one request cycle for this identity. Cycles are serialized; a
    /// cycle that was superseded (variables changed, query torn down) settles
    /// its caller without touching the shared snapshot.
    pub(crate) async fn fetch(
        &self,
        kind: FetchKind,
        new_variables: Option<Value>,
    ) -> Result<QueryResult, CombinedError> {
        let _gate = self.request_gate.lock().await;

        let generation = {
            let mut variables = self.variables.lock().unwrap();
            match new_variables {
                Some(vars) if variables.as_ref() != Some(&vars) => {
                    *variables = Some(vars);
                    self.generation.fetch_add(1, Ordering::SeqCst) + 1
                }
                _ => self.generation.load(Ordering::SeqCst),
            }
        };
        let request = self.request(self.variables());

        if self.fetch_policy.cache_terminal() {
            let cached = self.engine.read_cache(&request);
            return Ok(self.settle_from_cache(cached));
        }

        // Initial activations and variable changes consult the cache per
        // policy; refetch and poll always go to the network.
        if self.fetch_policy.reads_cache()
            && matches!(kind, FetchKind::Initial | FetchKind::SetVariables)
        {
            if let Some(cached) = self.engine.read_cache(&request) {
                if cached.complete {
                    let data = cached.data;
                    self.publish(|r| {
                        r.data = Some(data);
                        r.error = None;
                        r.loading = false;
                        r.network_status = NetworkStatus::Ready;
                        r.partial = false;
                        r.called = true;
                    });
                    if self.fetch_policy == FetchPolicy::CacheFirst {
                        self.record_settlement();
                        return Ok(self.current());
                    }
                } else if self.deliver_partial {
                    let data = cached.data;
                    self.publish(|r| {
                        r.data = Some(data);
                        r.partial = true;
                        r.called = true;
                    });
                }
            }
        }

        let status = kind.status();
        self.publish(|r| {
            r.loading = true;
            r.network_status = status;
            r.error = None;
            r.called = true;
        });

        let suppresses_polling = kind != FetchKind::Poll;
        if suppresses_polling {
            self.non_poll_in_flight.store(true, Ordering::SeqCst);
        }
        let outcome = self.engine.execute(request).await;
        if suppresses_polling {
            self.non_poll_in_flight.store(false, Ordering::SeqCst);
        }

        if self.generation.load(Ordering::SeqCst) != generation {
            trace!(
                operation = self.operation_name().unwrap_or("<anonymous>"),
                "discarding settlement of a superseded request"
            );
            return Self::settle_detached(self.error_policy, outcome);
        }

        match outcome {
            Err(net) => {
                let error = CombinedError::from_network(net);
                let published = error.clone();
                self.publish(|r| {
                    // Previously delivered data stays; a failed refresh does
                    // not invalidate it.
                    r.error = Some(published);
                    r.loading = false;
                    r.network_status = NetworkStatus::Error;
                });
                self.record_settlement();
                Err(error)
            }
            Ok(result) => {
                let (data, error) = self.error_policy.apply(result);
                let fatal = error.is_some() && self.error_policy == ErrorPolicy::None;
                let published_error = error.clone();
                self.publish(|r| {
                    if let Some(data) = data {
                        r.data = Some(data);
                        r.partial = false;
                    }
                    r.error = published_error;
                    r.loading = false;
                    r.network_status = if error.is_some() {
                        NetworkStatus::Error
                    } else {
                        NetworkStatus::Ready
                    };
                    r.called = true;
                });
                self.record_settlement();
                if fatal {
                    Err(error.expect("fatal implies error"))
                } else {
                    Ok(self.current())
                }
            }
        }
    }

    /// Issues a secondary request and folds its result into existing data.
    /// Data never regresses to `None` during the merge window.
    pub(crate) async fn fetch_more(
        &self,
        document: Option<Arc<str>>,
        variables: Option<Value>,
        merge: MergeFn,
    ) -> Result<QueryResult, CombinedError> {
        let _gate = self.request_gate.lock().await;
        let generation = self.generation.load(Ordering::SeqCst);

        let merged_vars = merge_variables(self.variables(), variables);
        let request = OperationRequest::new(
            OperationKind::Query,
            document.unwrap_or_else(|| self.document.clone()),
            None,
            merged_vars,
            self.context.clone(),
        );

        self.publish(|r| {
            r.loading = true;
            r.network_status = NetworkStatus::FetchMore;
            r.called = true;
        });
        self.non_poll_in_flight.store(true, Ordering::SeqCst);
        let outcome = self.engine.execute(request).await;
        self.non_poll_in_flight.store(false, Ordering::SeqCst);

        if self.generation.load(Ordering::SeqCst) != generation {
            return Self::settle_detached(self.error_policy, outcome);
        }

        match outcome {
            Err(net) => {
                let error = CombinedError::from_network(net);
                let published = error.clone();
                self.publish(|r| {
                    r.error = Some(published);
                    r.loading = false;
                    r.network_status = NetworkStatus::Error;
                });
                self.record_settlement();
                Err(error)
            }
            Ok(result) => {
                let (data, error) = self.error_policy.apply(result);
                let fatal = error.is_some() && self.error_policy == ErrorPolicy::None;
                let published_error = error.clone();
                self.publish(|r| {
                    if let Some(incoming) = data {
                        r.data = Some(merge(r.data.take(), incoming));
                        r.partial = false;
                    }
                    r.error = published_error;
                    r.loading = false;
                    r.network_status = if error.is_some() {
                        NetworkStatus::Error
                    } else {
                        NetworkStatus::Ready
                    };
                });
                self.record_settlement();
                if fatal {
                    Err(error.expect("fatal implies error"))
                } else {
                    Ok(self.current())
                }
            }
        }
    }

    /// Synchronously transforms the last-known data; the transformed value
    /// becomes the new snapshot immediately, no network involved.
    pub fn update_data<F>(&self, f: F)
    where
        F: FnOnce(Option<Value>) -> Option<Value>,
    {
        self.results.send_if_modified(|r| {
            let before = r.data.clone();
            r.data = f(r.data.take());
            r.data != before
        });
    }

    /// Arms (or re-arms) polling. Ticks are suppressed while a non-poll
    /// request for this identity is in flight.
    pub fn start_polling(self: &Arc<Self>, interval: Duration) {
        if self.fetch_policy.cache_terminal() {
            warn!(
                operation = self.operation_name().unwrap_or("<anonymous>"),
                "ignoring start_polling on a cache-only query"
            );
            return;
        }
        let mut poll = self.poll.lock().unwrap();
        if let Some(task) = poll.task.take() {
            task.abort();
        }
        poll.interval = Some(interval);
        let weak = Arc::downgrade(self);
        poll.task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick of a tokio interval fires immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(query) = weak.upgrade() else { break };
                if query.non_poll_in_flight.load(Ordering::SeqCst) {
                    trace!("poll tick suppressed by an in-flight request");
                    continue;
                }
                let _ = query.fetch(FetchKind::Poll, None).await;
            }
        }));
    }

    /// Stops polling. A no-op when not polling.
    pub fn stop_polling(&self) {
        let mut poll = self.poll.lock().unwrap();
        if let Some(task) = poll.task.take() {
            task.abort();
        }
        poll.interval = None;
    }

    /// The currently armed poll interval, if any.
    pub fn poll_interval(&self) -> Option<Duration> {
        self.poll.lock().unwrap().interval
    }

    /// Shuts the query down: polling stops, and any in-flight settlement is
    /// discarded rather than published.
    pub(crate) fn teardown(&self) {
        debug!(
            operation = self.operation_name().unwrap_or("<anonymous>"),
            "tearing down shared query"
        );
        self.stop_polling();
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    fn settle_from_cache(&self, cached: Option<CacheSnapshot>) -> QueryResult {
        let deliver_partial = self.deliver_partial;
        self.publish(move |r| {
            match cached {
                Some(c) if c.complete => {
                    r.data = Some(c.data);
                    r.partial = false;
                }
                Some(c) if deliver_partial => {
                    r.data = Some(c.data);
                    r.partial = true;
                }
                _ => {}
            }
            r.error = None;
            r.loading = false;
            r.network_status = NetworkStatus::Ready;
            r.called = true;
        });
        self.record_settlement();
        self.current()
    }

    /// Settles a caller whose request no longer owns the snapshot.
    fn settle_detached(
        policy: ErrorPolicy,
        outcome: Result<liveql_core::ExecutionResult, liveql_core::NetworkError>,
    ) -> Result<QueryResult, CombinedError> {
        match outcome {
            Err(net) => Err(CombinedError::from_network(net)),
            Ok(result) => {
                let (data, error) = policy.apply(result);
                match error {
                    Some(e) if policy == ErrorPolicy::None => Err(e),
                    error => Ok(QueryResult {
                        data,
                        error,
                        loading: false,
                        network_status: NetworkStatus::Ready,
                        partial: false,
                        called: true,
                    }),
                }
            }
        }
    }
}

impl Drop for ReactiveQuery {
    fn drop(&mut self) {
        if let Some(task) = self.poll.lock().unwrap().task.take() {
            task.abort();
        }
    }
}

/// The default accumulating merge: objects merge field-wise, arrays append,
/// everything else is replaced by the incoming value. Page N+1 never drops
/// already-merged page N content.
pub fn accumulate(previous: Option<Value>, incoming: Value) -> Value {
    match (previous, incoming) {
        (Some(Value::Object(mut prev)), Value::Object(next)) => {
            for (key, value) in next {
                let merged = match prev.remove(&key) {
                    Some(existing) => accumulate(Some(existing), value),
                    None => value,
                };
                prev.insert(key, merged);
            }
            Value::Object(prev)
        }
        (Some(Value::Array(mut prev)), Value::Array(next)) => {
            prev.extend(next);
            Value::Array(prev)
        }
        (_, incoming) => incoming,
    }
}

/// Shallow-merges override variables onto the query's current variables.
fn merge_variables(base: Option<Value>, overrides: Option<Value>) -> Option<Value> {
    match (base, overrides) {
        (Some(Value::Object(mut base)), Some(Value::Object(overrides))) => {
            for (key, value) in overrides {
                base.insert(key, value);
            }
            Some(Value::Object(base))
        }
        (base, None) => base,
        (_, overrides) => overrides,
    }
}
