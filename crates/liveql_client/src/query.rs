//! Query bindings: the live adapter between one render site and one shared
//! reactive query.
//!
//! A [`QueryBinding`] owns exactly one registry acquisition plus a forwarding
//! task that filters the shared query's emissions into the binding's own
//! snapshot channel. The lazy variant ([`QueryTuple`]) starts dormant and is
//! driven through its [`QueryTrigger`].

use crate::engine::SubscriptionEvent;
use crate::reactive::{accumulate, FetchKind, MergeFn, QuerySpec, ReactiveQuery};
use crate::registry::{QueryAcquisition, QueryRegistry};
use liveql_core::{
    CombinedError, ErrorPolicy, ExecutionResult, FetchPolicy, NetworkError, OperationKind,
    OperationRequest, QueryResult, SharedContext,
};
use serde_json::Value;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Callback fired with the settled data of an execution.
pub type DataCallback = Arc<dyn Fn(&Value) + Send + Sync>;
/// Callback fired with the error of a failed execution.
pub type ErrorCallback = Arc<dyn Fn(&CombinedError) + Send + Sync>;

/// Configuration for one query usage site.
#[derive(Clone)]
pub struct QueryOptions {
    pub document: Arc<str>,
    pub operation_name: Option<String>,
    pub variables: Option<Value>,
    pub fetch_policy: Option<FetchPolicy>,
    pub error_policy: Option<ErrorPolicy>,
    pub poll_interval: Option<Duration>,
    /// Suppress execution entirely; re-checked on every option change.
    pub skip: bool,
    /// Deliver snapshots whose only change is loading/network status.
    /// `error` transitions are always delivered regardless of this flag.
    pub notify_on_network_status_change: Option<bool>,
    pub return_partial_data: bool,
    pub partial_refetch: bool,
    pub on_completed: Option<DataCallback>,
    pub on_error: Option<ErrorCallback>,
    pub context: SharedContext,
}

impl QueryOptions {
    /// Creates options for a document with everything else defaulted.
    pub fn new(document: impl Into<Arc<str>>) -> Self {
        Self {
            document: document.into(),
            operation_name: None,
            variables: None,
            fetch_policy: None,
            error_policy: None,
            poll_interval: None,
            skip: false,
            notify_on_network_status_change: None,
            return_partial_data: false,
            partial_refetch: false,
            on_completed: None,
            on_error: None,
            context: SharedContext::default(),
        }
    }

    /// Sets the operation variables.
    pub fn variables(mut self, variables: Value) -> Self {
        self.variables = Some(variables);
        self
    }

    /// Sets the operation name.
    pub fn operation_name(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }

    /// Sets the fetch policy.
    pub fn fetch_policy(mut self, policy: FetchPolicy) -> Self {
        self.fetch_policy = Some(policy);
        self
    }

    /// Sets the error policy.
    pub fn error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = Some(policy);
        self
    }

    /// Arms polling at the given interval.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// Suppresses or re-enables execution.
    pub fn skip(mut self, skip: bool) -> Self {
        self.skip = skip;
        self
    }

    /// Controls delivery of status-only snapshot changes.
    pub fn notify_on_network_status_change(mut self, notify: bool) -> Self {
        self.notify_on_network_status_change = Some(notify);
        self
    }

    /// Delivers partial cache satisfactions instead of withholding them.
    pub fn return_partial_data(mut self, on: bool) -> Self {
        self.return_partial_data = on;
        self
    }

    /// Accepts partial data while a full refresh resolves.
    pub fn partial_refetch(mut self, on: bool) -> Self {
        self.partial_refetch = on;
        self
    }

    /// Registers a callback fired once per settled execution with data.
    pub fn on_completed(mut self, f: impl Fn(&Value) + Send + Sync + 'static) -> Self {
        self.on_completed = Some(Arc::new(f));
        self
    }

    /// Registers a callback fired once per failed execution.
    pub fn on_error(mut self, f: impl Fn(&CombinedError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    /// Attaches a request-scoped context.
    pub fn context(mut self, context: SharedContext) -> Self {
        self.context = context;
        self
    }

    pub(crate) fn spec(&self) -> QuerySpec {
        QuerySpec {
            document: self.document.clone(),
            operation_name: self.operation_name.clone(),
            variables: self.variables.clone(),
            fetch_policy: self.fetch_policy.unwrap_or_default(),
            error_policy: self.error_policy.unwrap_or_default(),
            deliver_partial: self.return_partial_data || self.partial_refetch,
            context: self.context.clone(),
        }
    }
}

/// Options for a secondary live subscription folded into a query's data.
#[derive(Clone)]
pub struct SubscribeToMoreOptions {
    pub document: Arc<str>,
    pub variables: Option<Value>,
    /// Reducer folding each incoming event into the current data.
    pub update: Arc<dyn Fn(Option<Value>, &ExecutionResult) -> Option<Value> + Send + Sync>,
    pub on_error: Option<ErrorCallback>,
    pub context: SharedContext,
}

impl SubscribeToMoreOptions {
    pub fn new(
        document: impl Into<Arc<str>>,
        update: impl Fn(Option<Value>, &ExecutionResult) -> Option<Value> + Send + Sync + 'static,
    ) -> Self {
        Self {
            document: document.into(),
            variables: None,
            update: Arc::new(update),
            on_error: None,
            context: SharedContext::default(),
        }
    }

    pub fn variables(mut self, variables: Value) -> Self {
        self.variables = Some(variables);
        self
    }

    pub fn on_error(mut self, f: impl Fn(&CombinedError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }
}

/// Detach guard for a `subscribe_to_more` stream. Dropping it (or calling
/// [`SubscribeToMoreHandle::unsubscribe`]) tears the stream down;
/// [`SubscribeToMoreHandle::detach`] lets it outlive the guard.
pub struct SubscribeToMoreHandle {
    task: Option<tokio::task::JoinHandle<()>>,
}

impl SubscribeToMoreHandle {
    /// Lets the stream run until the query binding goes away.
    pub fn detach(mut self) {
        self.task.take();
    }

    /// Tears the stream down now.
    pub fn unsubscribe(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for SubscribeToMoreHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

struct Attachment {
    acquisition: QueryAcquisition,
    forward: tokio::task::JoinHandle<()>,
    callbacks: Option<tokio::task::JoinHandle<()>>,
}

impl Drop for Attachment {
    fn drop(&mut self) {
        self.forward.abort();
        if let Some(callbacks) = self.callbacks.take() {
            callbacks.abort();
        }
    }
}

struct BindingState {
    options: QueryOptions,
    /// False only for lazy bindings that have not been triggered yet.
    activated: bool,
    attachment: Option<Attachment>,
}

struct BindingInner {
    registry: QueryRegistry,
    out: watch::Sender<QueryResult>,
    state: Mutex<BindingState>,
}

/// A live query binding. Cheap to clone; clones share one snapshot channel
/// and one registry acquisition.
#[derive(Clone)]
pub struct QueryBinding {
    inner: Arc<BindingInner>,
}

impl QueryBinding {
    pub(crate) fn new(registry: QueryRegistry, options: QueryOptions, lazy: bool) -> Self {
        let (out, _) = watch::channel(QueryResult::idle());
        let binding = Self {
            inner: Arc::new(BindingInner {
                registry,
                out,
                state: Mutex::new(BindingState {
                    options,
                    activated: !lazy,
                    attachment: None,
                }),
            }),
        };
        binding.sync_attachment(FetchKind::Initial, true);
        binding
    }

    /// The latest snapshot.
    pub fn current(&self) -> QueryResult {
        self.inner.out.borrow().clone()
    }

    /// Subscribes to snapshot changes.
    pub fn subscribe(&self) -> watch::Receiver<QueryResult> {
        self.inner.out.subscribe()
    }

    /// Re-supplies the option bundle. A changed document/variables identity
    /// re-points the binding; a changed poll interval re-arms polling
    /// without resetting data; `skip` is re-checked.
    pub fn set_options(&self, options: QueryOptions) {
        let (repoint, kind, poll_changed) = {
            let mut state = self.inner.state.lock().unwrap();
            let prev = &state.options;
            let identity_changed =
                prev.document != options.document || prev.variables != options.variables;
            let skip_changed = prev.skip != options.skip;
            let had_attachment = state.attachment.is_some();
            let repoint = identity_changed
                || skip_changed
                || (state.activated && !options.skip && !had_attachment);
            let kind = if had_attachment && identity_changed {
                FetchKind::SetVariables
            } else {
                FetchKind::Initial
            };
            let poll_changed = prev.poll_interval != options.poll_interval;
            state.options = options;
            (repoint, kind, poll_changed)
        };

        if repoint {
            debug!("re-pointing query binding after option change");
            self.sync_attachment(kind, true);
        } else if poll_changed {
            let state = self.inner.state.lock().unwrap();
            if let Some(attachment) = &state.attachment {
                match state.options.poll_interval {
                    Some(interval) => attachment.acquisition.query().start_polling(interval),
                    None => attachment.acquisition.query().stop_polling(),
                }
            }
        }
    }

    /// Re-issues the request, optionally under new variables. Resolves to
    /// the next settled result.
    pub async fn refetch(&self, variables: Option<Value>) -> Result<QueryResult, CombinedError> {
        let query = self.active_query()?;
        query.fetch(FetchKind::Refetch, variables).await
    }

    /// Issues a pagination request under merged variables and folds the
    /// result into existing data with the default accumulating merge.
    pub async fn fetch_more_same_page(
        &self,
        variables: Value,
    ) -> Result<QueryResult, CombinedError> {
        let query = self.active_query()?;
        query
            .fetch_more(None, Some(variables), Arc::new(accumulate))
            .await
    }

    /// Issues a secondary request under a different document and folds the
    /// result into existing data with a caller-supplied merge.
    pub async fn fetch_more_with_document(
        &self,
        document: impl Into<Arc<str>>,
        variables: Option<Value>,
        merge: MergeFn,
    ) -> Result<QueryResult, CombinedError> {
        let query = self.active_query()?;
        query.fetch_more(Some(document.into()), variables, merge).await
    }

    /// Synchronously transforms the last-known data without a request.
    pub fn update_query<F>(&self, f: F) -> Result<(), CombinedError>
    where
        F: FnOnce(Option<Value>) -> Option<Value>,
    {
        self.active_query()?.update_data(f);
        Ok(())
    }

    /// Arms (or re-arms) polling and remembers the interval across
    /// re-points.
    pub fn start_polling(&self, interval: Duration) {
        let query = {
            let mut state = self.inner.state.lock().unwrap();
            state.options.poll_interval = Some(interval);
            state
                .attachment
                .as_ref()
                .map(|a| a.acquisition.query().clone())
        };
        if let Some(query) = query {
            query.start_polling(interval);
        }
    }

    /// Stops polling. A no-op when not polling.
    pub fn stop_polling(&self) {
        let query = {
            let mut state = self.inner.state.lock().unwrap();
            state.options.poll_interval = None;
            state
                .attachment
                .as_ref()
                .map(|a| a.acquisition.query().clone())
        };
        if let Some(query) = query {
            query.stop_polling();
        }
    }

    /// Attaches a secondary live subscription whose events are folded into
    /// this query's data. Its lifecycle is independent of the primary
    /// subscription: the returned guard controls it.
    pub fn subscribe_to_more(
        &self,
        options: SubscribeToMoreOptions,
    ) -> Result<SubscribeToMoreHandle, CombinedError> {
        let query = self.active_query()?;
        let engine = self.inner.registry.engine();
        let request = OperationRequest::new(
            OperationKind::Subscription,
            options.document.clone(),
            None,
            options.variables.clone(),
            options.context.clone(),
        );
        let update = options.update.clone();
        let on_error = options.on_error.clone();
        let task = tokio::spawn(async move {
            let mut events = match engine.open_subscription(request).await {
                Ok(events) => events,
                Err(error) => {
                    warn!(%error, "subscribe_to_more stream failed to open");
                    if let Some(cb) = &on_error {
                        cb(&CombinedError::from_network(error));
                    }
                    return;
                }
            };
            while let Some(event) = events.recv().await {
                match event {
                    SubscriptionEvent::Next(result) => {
                        query.update_data(|data| update(data, &result));
                    }
                    SubscriptionEvent::Failed(error) => {
                        warn!(%error, "subscribe_to_more stream failed");
                        if let Some(cb) = &on_error {
                            cb(&CombinedError::from_network(error));
                        }
                        break;
                    }
                    SubscriptionEvent::Complete => break,
                }
            }
        });
        Ok(SubscribeToMoreHandle { task: Some(task) })
    }

    /// Releases the registry acquisition and stops delivering. The last
    /// snapshot stays readable; imperative controls error afterwards.
    pub fn dispose(&self) {
        let mut state = self.inner.state.lock().unwrap();
        state.attachment = None;
        state.activated = false;
    }

    fn active_query(&self) -> Result<Arc<ReactiveQuery>, CombinedError> {
        let state = self.inner.state.lock().unwrap();
        state
            .attachment
            .as_ref()
            .map(|a| a.acquisition.query().clone())
            .ok_or_else(|| {
                CombinedError::from_network(NetworkError::closed("query binding is not active"))
            })
    }

    /// Reconciles the attachment with the current options: detached when
    /// skipped or dormant, attached (and optionally fetching) otherwise.
    fn sync_attachment(&self, kind: FetchKind, fire: bool) {
        let mut state = self.inner.state.lock().unwrap();
        if !state.activated || state.options.skip {
            state.attachment = None;
            self.inner.out.send_if_modified(|current| {
                let idle = QueryResult::idle();
                if *current != idle {
                    *current = idle;
                    true
                } else {
                    false
                }
            });
            return;
        }

        let (acquisition, created) = self.inner.registry.acquire(state.options.spec());
        let query = acquisition.query().clone();
        let notify_status = state
            .options
            .notify_on_network_status_change
            .unwrap_or(false);
        let forward = spawn_forward(&self.inner, query.subscribe(), notify_status);
        let callbacks = spawn_callbacks(
            &self.inner,
            query.settlements(),
            state.options.on_completed.clone(),
            state.options.on_error.clone(),
        );
        state.attachment = Some(Attachment {
            acquisition,
            forward,
            callbacks,
        });

        // Reflect the shared query's state synchronously so the very next
        // render observes the in-flight phase.
        let snapshot = query.current();
        self.inner.out.send_if_modified(move |current| {
            if *current != snapshot {
                *current = snapshot;
                true
            } else {
                false
            }
        });

        if let Some(interval) = state.options.poll_interval {
            query.start_polling(interval);
        }
        if created && fire {
            tokio::spawn(async move {
                let _ = query.fetch(kind, None).await;
            });
        }
    }
}

/// The trigger half of a lazy query pair: each call executes the query and
/// resolves to the settled result, updating the paired binding's snapshot.
#[derive(Clone)]
pub struct QueryTrigger {
    inner: Arc<BindingInner>,
}

impl QueryTrigger {
    /// Executes the query, activating the dormant binding on first call.
    /// New variables re-point the binding at the new identity.
    pub async fn execute(&self, variables: Option<Value>) -> Result<QueryResult, CombinedError> {
        let binding = QueryBinding {
            inner: self.inner.clone(),
        };
        let (first, kind) = {
            let mut state = self.inner.state.lock().unwrap();
            let first = !state.activated;
            state.activated = true;
            if let Some(vars) = variables.clone() {
                state.options.variables = Some(vars);
            }
            let kind = if first {
                FetchKind::Initial
            } else if variables.is_some() {
                FetchKind::SetVariables
            } else {
                FetchKind::Refetch
            };
            (first, kind)
        };
        if first {
            binding.sync_attachment(FetchKind::Initial, false);
        }
        let query = binding.active_query()?;
        query.fetch(kind, variables).await
    }
}

/// The explicit pair type for lazy queries: a trigger plus the live binding.
pub struct QueryTuple {
    pub trigger: QueryTrigger,
    pub binding: QueryBinding,
}

impl QueryTuple {
    pub(crate) fn new(registry: QueryRegistry, options: QueryOptions) -> Self {
        let binding = QueryBinding::new(registry, options, true);
        let trigger = QueryTrigger {
            inner: binding.inner.clone(),
        };
        Self { trigger, binding }
    }
}

fn spawn_forward(
    inner: &Arc<BindingInner>,
    mut source: watch::Receiver<QueryResult>,
    notify_status: bool,
) -> tokio::task::JoinHandle<()> {
    let weak: Weak<BindingInner> = Arc::downgrade(inner);
    tokio::spawn(async move {
        let mut last: Option<QueryResult> = None;
        loop {
            let snapshot = source.borrow_and_update().clone();
            let Some(inner) = weak.upgrade() else { break };
            forward_one(&inner, notify_status, &mut last, snapshot);
            drop(inner);
            if source.changed().await.is_err() {
                break;
            }
        }
    })
}

/// Applies the notify filter to one emission from the shared query.
fn forward_one(
    inner: &BindingInner,
    notify_status: bool,
    last: &mut Option<QueryResult>,
    snapshot: QueryResult,
) {
    let payload_changed = last
        .as_ref()
        .map_or(true, |l| l.data != snapshot.data || l.error != snapshot.error);
    let any_changed = last.as_ref() != Some(&snapshot);
    // Error transitions count as payload changes, so they are delivered
    // even when status-only notifications are off.
    let should_deliver = if notify_status {
        any_changed
    } else {
        payload_changed
    };
    if should_deliver {
        let next = snapshot.clone();
        inner.out.send_if_modified(move |current| {
            if *current != next {
                *current = next;
                true
            } else {
                false
            }
        });
    }
    *last = Some(snapshot);
}

/// Drives `on_completed`/`on_error` from the settlement channel: exactly one
/// invocation per settled request cycle, never coalesced away.
fn spawn_callbacks(
    inner: &Arc<BindingInner>,
    mut settlements: tokio::sync::broadcast::Receiver<QueryResult>,
    on_completed: Option<DataCallback>,
    on_error: Option<ErrorCallback>,
) -> Option<tokio::task::JoinHandle<()>> {
    if on_completed.is_none() && on_error.is_none() {
        return None;
    }
    let weak: Weak<BindingInner> = Arc::downgrade(inner);
    Some(tokio::spawn(async move {
        loop {
            match settlements.recv().await {
                Ok(snapshot) => {
                    if weak.upgrade().is_none() {
                        break;
                    }
                    if let Some(error) = &snapshot.error {
                        if let Some(cb) = &on_error {
                            cb(error);
                        }
                    } else if let Some(data) = &snapshot.data {
                        if let Some(cb) = &on_completed {
                            cb(data);
                        }
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "query settlement callbacks lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    }))
}
