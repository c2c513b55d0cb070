//! Subscription bindings: a push-only adapter over an engine event stream.
//!
//! `loading` is true only until the first event or error; natural stream
//! completion fires the completion callback exactly once, and disposal never
//! fires it.

use crate::engine::{ExecutionEngine, SubscriptionEvent};
use liveql_core::{
    CombinedError, ErrorPolicy, OperationKind, OperationRequest, SharedContext,
    SubscriptionResult,
};
use serde_json::Value;
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::watch;
use tracing::{debug, warn};

/// Callback receiving the live binding context once per delivered event.
pub type SubscriptionDataCallback = Arc<dyn Fn(&SubscriptionDataContext) + Send + Sync>;
/// Callback fired once on natural stream completion.
pub type SubscriptionCompleteCallback = Arc<dyn Fn() + Send + Sync>;

/// What `on_subscription_data` sees: the snapshot just published plus the
/// identity it was delivered against.
pub struct SubscriptionDataContext {
    pub result: SubscriptionResult,
    pub document: Arc<str>,
    pub variables: Option<Value>,
}

/// Whether an option change with a new document/variables identity tears the
/// stream down and re-establishes it.
#[derive(Clone)]
pub enum ShouldResubscribe {
    Always(bool),
    Predicate(Arc<dyn Fn(&SubscriptionOptions) -> bool + Send + Sync>),
}

impl ShouldResubscribe {
    fn evaluate(&self, options: &SubscriptionOptions) -> bool {
        match self {
            Self::Always(yes) => *yes,
            Self::Predicate(f) => f(options),
        }
    }
}

impl Default for ShouldResubscribe {
    fn default() -> Self {
        Self::Always(true)
    }
}

/// Configuration for one subscription usage site.
#[derive(Clone)]
pub struct SubscriptionOptions {
    /// No document means no stream, same as `skip`.
    pub document: Option<Arc<str>>,
    pub operation_name: Option<String>,
    pub variables: Option<Value>,
    pub skip: bool,
    pub error_policy: Option<ErrorPolicy>,
    pub should_resubscribe: ShouldResubscribe,
    pub on_subscription_data: Option<SubscriptionDataCallback>,
    pub on_subscription_complete: Option<SubscriptionCompleteCallback>,
    pub context: SharedContext,
}

impl SubscriptionOptions {
    pub fn new(document: impl Into<Arc<str>>) -> Self {
        Self {
            document: Some(document.into()),
            operation_name: None,
            variables: None,
            skip: false,
            error_policy: None,
            should_resubscribe: ShouldResubscribe::default(),
            on_subscription_data: None,
            on_subscription_complete: None,
            context: SharedContext::default(),
        }
    }

    /// Options with no document yet; nothing is established until one is
    /// supplied through `set_options`.
    pub fn without_document() -> Self {
        Self {
            document: None,
            operation_name: None,
            variables: None,
            skip: false,
            error_policy: None,
            should_resubscribe: ShouldResubscribe::default(),
            on_subscription_data: None,
            on_subscription_complete: None,
            context: SharedContext::default(),
        }
    }

    pub fn variables(mut self, variables: Value) -> Self {
        self.variables = Some(variables);
        self
    }

    pub fn operation_name(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }

    pub fn skip(mut self, skip: bool) -> Self {
        self.skip = skip;
        self
    }

    pub fn error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = Some(policy);
        self
    }

    pub fn should_resubscribe(mut self, value: ShouldResubscribe) -> Self {
        self.should_resubscribe = value;
        self
    }

    pub fn on_subscription_data(
        mut self,
        f: impl Fn(&SubscriptionDataContext) + Send + Sync + 'static,
    ) -> Self {
        self.on_subscription_data = Some(Arc::new(f));
        self
    }

    pub fn on_subscription_complete(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_subscription_complete = Some(Arc::new(f));
        self
    }

    pub fn context(mut self, context: SharedContext) -> Self {
        self.context = context;
        self
    }

    /// The stream identity these options resolve to; `None` when no stream
    /// should exist (skipped or documentless).
    fn identity(&self) -> Option<(Arc<str>, String)> {
        if self.skip {
            return None;
        }
        let document = self.document.as_ref()?;
        let variables_key = self
            .variables
            .as_ref()
            .map(|v| v.to_string())
            .unwrap_or_else(|| "null".to_string());
        Some((document.clone(), variables_key))
    }
}

struct StreamHandle {
    task: tokio::task::JoinHandle<()>,
    identity: (Arc<str>, String),
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct SubState {
    options: SubscriptionOptions,
    stream: Option<StreamHandle>,
}

struct SubscriptionInner {
    engine: Arc<dyn ExecutionEngine>,
    out: watch::Sender<SubscriptionResult>,
    state: Mutex<SubState>,
}

/// A live subscription binding. Cheap to clone; clones share one snapshot
/// channel and one underlying stream.
#[derive(Clone)]
pub struct SubscriptionBinding {
    inner: Arc<SubscriptionInner>,
}

impl SubscriptionBinding {
    pub(crate) fn new(engine: Arc<dyn ExecutionEngine>, options: SubscriptionOptions) -> Self {
        let (out, _) = watch::channel(SubscriptionResult::idle());
        let binding = Self {
            inner: Arc::new(SubscriptionInner {
                engine,
                out,
                state: Mutex::new(SubState {
                    options,
                    stream: None,
                }),
            }),
        };
        binding.reconcile();
        binding
    }

    /// The latest snapshot.
    pub fn current(&self) -> SubscriptionResult {
        self.inner.out.borrow().clone()
    }

    /// Subscribes to snapshot changes.
    pub fn subscribe(&self) -> watch::Receiver<SubscriptionResult> {
        self.inner.out.subscribe()
    }

    /// Re-supplies the option bundle. When the document/variables identity
    /// changed and `should_resubscribe` evaluates true, the stream is torn
    /// down and re-established rather than delivering events against stale
    /// variables; otherwise the existing stream is kept.
    pub fn set_options(&self, options: SubscriptionOptions) {
        let reconcile = {
            let mut state = self.inner.state.lock().unwrap();
            let next_identity = options.identity();
            let suspended = next_identity.is_none();
            let identity_changed = match (&state.stream, &next_identity) {
                (Some(stream), Some(next)) => &stream.identity != next,
                (Some(_), None) | (None, Some(_)) => true,
                (None, None) => false,
            };
            let wants_resubscribe = options.should_resubscribe.evaluate(&options);
            let had_stream = state.stream.is_some();
            state.options = options;
            if suspended {
                // Skip always wins; tear down through reconcile.
                identity_changed
            } else if had_stream && identity_changed && !wants_resubscribe {
                debug!("keeping subscription stream despite identity change");
                false
            } else {
                identity_changed || !had_stream
            }
        };
        if reconcile {
            self.reconcile();
        }
    }

    /// Tears the stream down. The completion callback does not fire.
    pub fn dispose(&self) {
        let mut state = self.inner.state.lock().unwrap();
        state.stream = None;
    }

    /// Reconciles the stream with the current options.
    fn reconcile(&self) {
        let mut state = self.inner.state.lock().unwrap();
        let Some(identity) = state.options.identity() else {
            state.stream = None;
            publish(&self.inner.out, SubscriptionResult::idle());
            return;
        };
        publish(&self.inner.out, SubscriptionResult::pending());
        let task = spawn_reader(&self.inner, &state.options);
        state.stream = Some(StreamHandle { task, identity });
    }
}

fn publish(out: &watch::Sender<SubscriptionResult>, next: SubscriptionResult) {
    out.send_if_modified(|current| {
        if *current != next {
            *current = next;
            true
        } else {
            false
        }
    });
}

fn spawn_reader(
    inner: &Arc<SubscriptionInner>,
    options: &SubscriptionOptions,
) -> tokio::task::JoinHandle<()> {
    let document = options.document.clone().expect("document present");
    let variables = options.variables.clone();
    let error_policy = options.error_policy.unwrap_or_default();
    let on_data = options.on_subscription_data.clone();
    let on_complete = options.on_subscription_complete.clone();
    let engine = inner.engine.clone();
    let request = OperationRequest::new(
        OperationKind::Subscription,
        document.clone(),
        options.operation_name.clone(),
        variables.clone(),
        options.context.clone(),
    );
    let weak: Weak<SubscriptionInner> = Arc::downgrade(inner);

    tokio::spawn(async move {
        let mut events = match engine.open_subscription(request).await {
            Ok(events) => events,
            Err(error) => {
                warn!(%error, "subscription stream failed to open");
                if let Some(inner) = weak.upgrade() {
                    publish(
                        &inner.out,
                        SubscriptionResult {
                            data: None,
                            error: Some(CombinedError::from_network(error)),
                            loading: false,
                        },
                    );
                }
                return;
            }
        };

        loop {
            match events.recv().await {
                Some(SubscriptionEvent::Next(result)) => {
                    let (data, error) = error_policy.apply(result);
                    let snapshot = SubscriptionResult {
                        data,
                        error,
                        loading: false,
                    };
                    let Some(inner) = weak.upgrade() else { break };
                    publish(&inner.out, snapshot.clone());
                    drop(inner);
                    if let Some(cb) = &on_data {
                        cb(&SubscriptionDataContext {
                            result: snapshot,
                            document: document.clone(),
                            variables: variables.clone(),
                        });
                    }
                }
                Some(SubscriptionEvent::Failed(error)) => {
                    warn!(%error, "subscription stream failed");
                    let Some(inner) = weak.upgrade() else { break };
                    publish(
                        &inner.out,
                        SubscriptionResult {
                            data: None,
                            error: Some(CombinedError::from_network(error)),
                            loading: false,
                        },
                    );
                    break;
                }
                Some(SubscriptionEvent::Complete) => {
                    // Natural completion only; disposal aborts this task
                    // before it could ever get here.
                    if let Some(cb) = &on_complete {
                        cb();
                    }
                    break;
                }
                // Sender dropped without a Complete: the stream was torn
                // down, not completed.
                None => break,
            }
        }
    })
}
