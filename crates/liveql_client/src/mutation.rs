//! Mutation bindings: a stateful, re-triggerable adapter over one-shot
//! mutation execution.
//!
//! Each trigger call is one logical execution with its own future; the
//! paired snapshot tracks `{loading, called, data, error}` across calls and
//! reflects whichever call settled most recently.

use crate::query::{DataCallback, ErrorCallback};
use crate::registry::{QueryRegistry, RefetchTarget};
use liveql_core::{
    CombinedError, ErrorPolicy, ExecutionResult, MutationResult, OperationKind, OperationRequest,
    SharedContext,
};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

/// A speculative mutation result: a literal value, or computed from the
/// call's variables at trigger time.
#[derive(Clone)]
pub enum OptimisticResponse {
    Literal(Value),
    Computed(Arc<dyn Fn(Option<&Value>) -> Value + Send + Sync>),
}

impl OptimisticResponse {
    /// Computes a function of the call's variables.
    pub fn computed(f: impl Fn(Option<&Value>) -> Value + Send + Sync + 'static) -> Self {
        Self::Computed(Arc::new(f))
    }

    fn resolve(&self, variables: Option<&Value>) -> Value {
        match self {
            Self::Literal(value) => value.clone(),
            Self::Computed(f) => f(variables),
        }
    }
}

/// Queries to re-execute after a mutation settles: a static target list, or
/// computed from the mutation's own result.
#[derive(Clone)]
pub enum RefetchQueries {
    Static(Vec<RefetchTarget>),
    Computed(Arc<dyn Fn(&ExecutionResult) -> Vec<RefetchTarget> + Send + Sync>),
}

impl RefetchQueries {
    /// Builds a static list from operation names.
    pub fn named<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Static(
            names
                .into_iter()
                .map(|n| RefetchTarget::OperationName(n.into()))
                .collect(),
        )
    }

    /// Computes targets from the mutation's result.
    pub fn computed(
        f: impl Fn(&ExecutionResult) -> Vec<RefetchTarget> + Send + Sync + 'static,
    ) -> Self {
        Self::Computed(Arc::new(f))
    }

    fn resolve(&self, result: &ExecutionResult) -> Vec<RefetchTarget> {
        match self {
            Self::Static(targets) => targets.clone(),
            Self::Computed(f) => f(result),
        }
    }
}

/// Side-effecting adjustment of shared query state, applied exactly once per
/// successful settlement before consumers observe the mutation's result.
pub type UpdateCallback = Arc<dyn Fn(&QueryRegistry, &ExecutionResult) + Send + Sync>;

/// Configuration for one mutation usage site.
#[derive(Clone)]
pub struct MutationOptions {
    pub document: Arc<str>,
    pub operation_name: Option<String>,
    pub variables: Option<Value>,
    pub optimistic_response: Option<OptimisticResponse>,
    pub refetch_queries: Option<RefetchQueries>,
    /// Hold the trigger's future and the `loading` flag until every listed
    /// refetch has itself settled.
    pub await_refetch_queries: bool,
    /// Leave the paired snapshot untouched; the returned future still
    /// resolves or rejects normally.
    pub ignore_results: bool,
    pub error_policy: Option<ErrorPolicy>,
    pub update: Option<UpdateCallback>,
    pub on_completed: Option<DataCallback>,
    pub on_error: Option<ErrorCallback>,
    pub context: SharedContext,
}

impl MutationOptions {
    pub fn new(document: impl Into<Arc<str>>) -> Self {
        Self {
            document: document.into(),
            operation_name: None,
            variables: None,
            optimistic_response: None,
            refetch_queries: None,
            await_refetch_queries: false,
            ignore_results: false,
            error_policy: None,
            update: None,
            on_completed: None,
            on_error: None,
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

    pub fn optimistic_response(mut self, response: OptimisticResponse) -> Self {
        self.optimistic_response = Some(response);
        self
    }

    pub fn refetch_queries(mut self, refetch: RefetchQueries) -> Self {
        self.refetch_queries = Some(refetch);
        self
    }

    pub fn await_refetch_queries(mut self, await_them: bool) -> Self {
        self.await_refetch_queries = await_them;
        self
    }

    pub fn ignore_results(mut self, ignore: bool) -> Self {
        self.ignore_results = ignore;
        self
    }

    pub fn error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = Some(policy);
        self
    }

    pub fn update(mut self, f: impl Fn(&QueryRegistry, &ExecutionResult) + Send + Sync + 'static) -> Self {
        self.update = Some(Arc::new(f));
        self
    }

    pub fn on_completed(mut self, f: impl Fn(&Value) + Send + Sync + 'static) -> Self {
        self.on_completed = Some(Arc::new(f));
        self
    }

    pub fn on_error(
        mut self,
        f: impl Fn(&CombinedError) + Send + Sync + 'static,
    ) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    pub fn context(mut self, context: SharedContext) -> Self {
        self.context = context;
        self
    }
}

/// Per-call overrides applied on top of the binding's options.
#[derive(Clone, Default)]
pub struct MutationCallOptions {
    pub variables: Option<Value>,
    pub optimistic_response: Option<OptimisticResponse>,
    pub context: Option<SharedContext>,
}

impl MutationCallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn variables(mut self, variables: Value) -> Self {
        self.variables = Some(variables);
        self
    }

    pub fn optimistic_response(mut self, response: OptimisticResponse) -> Self {
        self.optimistic_response = Some(response);
        self
    }

    pub fn context(mut self, context: SharedContext) -> Self {
        self.context = Some(context);
        self
    }
}

struct MutationInner {
    registry: QueryRegistry,
    options: Mutex<MutationOptions>,
    out: watch::Sender<MutationResult>,
    /// Number of trigger calls currently outstanding.
    in_flight: AtomicUsize,
    /// Ids tying optimistic installs to their rollbacks.
    next_optimistic_id: AtomicU64,
}

/// A mutation binding. Cheap to clone; clones share one snapshot channel.
#[derive(Clone)]
pub struct MutationBinding {
    inner: Arc<MutationInner>,
}

impl MutationBinding {
    pub(crate) fn new(registry: QueryRegistry, options: MutationOptions) -> Self {
        let (out, _) = watch::channel(MutationResult::idle());
        Self {
            inner: Arc::new(MutationInner {
                registry,
                options: Mutex::new(options),
                out,
                in_flight: AtomicUsize::new(0),
                next_optimistic_id: AtomicU64::new(0),
            }),
        }
    }

    /// The latest snapshot.
    pub fn current(&self) -> MutationResult {
        self.inner.out.borrow().clone()
    }

    /// Subscribes to snapshot changes.
    pub fn subscribe(&self) -> watch::Receiver<MutationResult> {
        self.inner.out.subscribe()
    }

    /// Re-supplies the option bundle for subsequent trigger calls.
    pub fn set_options(&self, options: MutationOptions) {
        *self.inner.options.lock().unwrap() = options;
    }

    /// Clears the snapshot back to its untriggered state.
    pub fn reset(&self) {
        publish(&self.inner.out, MutationResult::idle());
    }

    /// Starts one logical execution. The returned future carries this call's
    /// own result regardless of interleaving with other calls.
    pub async fn trigger(
        &self,
        call: Option<MutationCallOptions>,
    ) -> Result<ExecutionResult, CombinedError> {
        run(self.inner.clone(), call).await
    }

    /// The explicit `{trigger, state}` pair for imperative usage.
    pub fn tuple(&self) -> MutationTuple {
        MutationTuple {
            trigger: MutationTrigger {
                inner: self.inner.clone(),
            },
            state: self.inner.out.subscribe(),
        }
    }
}

/// The trigger half of a mutation pair.
#[derive(Clone)]
pub struct MutationTrigger {
    inner: Arc<MutationInner>,
}

impl MutationTrigger {
    /// Starts one logical execution; see [`MutationBinding::trigger`].
    pub async fn execute(
        &self,
        call: Option<MutationCallOptions>,
    ) -> Result<ExecutionResult, CombinedError> {
        run(self.inner.clone(), call).await
    }
}

/// The explicit pair type for mutations: a trigger plus the snapshot stream.
pub struct MutationTuple {
    pub trigger: MutationTrigger,
    pub state: watch::Receiver<MutationResult>,
}

fn publish(out: &watch::Sender<MutationResult>, next: MutationResult) {
    out.send_if_modified(|current| {
        if *current != next {
            *current = next;
            true
        } else {
            false
        }
    });
}

async fn run(
    inner: Arc<MutationInner>,
    call: Option<MutationCallOptions>,
) -> Result<ExecutionResult, CombinedError> {
    let call = call.unwrap_or_default();
    let options = inner.options.lock().unwrap().clone();
    let variables = call.variables.or_else(|| options.variables.clone());
    let optimistic = call
        .optimistic_response
        .or_else(|| options.optimistic_response.clone());
    let context = call.context.unwrap_or_else(|| options.context.clone());
    let error_policy = options.error_policy.unwrap_or_default();
    let track = !options.ignore_results;

    // Published before the engine future is awaited, so the very next
    // render reflects the in-flight call.
    inner.in_flight.fetch_add(1, Ordering::SeqCst);
    if track {
        publish(
            &inner.out,
            MutationResult {
                data: None,
                error: None,
                loading: true,
                called: true,
            },
        );
    }

    let request = OperationRequest::new(
        OperationKind::Mutation,
        options.document.clone(),
        options.operation_name.clone(),
        variables.clone(),
        context,
    );

    let engine = inner.registry.engine();
    let optimistic_id = inner.next_optimistic_id.fetch_add(1, Ordering::SeqCst) + 1;
    let installed = match &optimistic {
        Some(optimistic) => {
            let value = optimistic.resolve(variables.as_ref());
            engine.install_optimistic(optimistic_id, &request, &value);
            true
        }
        None => false,
    };

    let outcome = engine.execute(request).await;

    if installed {
        // Unconditional, success or failure.
        engine.rollback_optimistic(optimistic_id);
    }

    let settled: Result<ExecutionResult, CombinedError> = match outcome {
        Err(net) => Err(CombinedError::from_network(net)),
        Ok(result) if result.has_errors() => match error_policy {
            ErrorPolicy::None => Err(CombinedError::from_graphql(result.errors)),
            ErrorPolicy::Ignore => Ok(ExecutionResult {
                errors: Vec::new(),
                ..result
            }),
            ErrorPolicy::All => Ok(result),
        },
        Ok(result) => Ok(result),
    };

    if let Ok(result) = &settled {
        if let Some(update) = &options.update {
            update(&inner.registry, result);
        }
        if let Some(refetch) = &options.refetch_queries {
            let targets = refetch.resolve(result);
            if options.await_refetch_queries {
                for target in &targets {
                    // A refetch failure never fails the mutation itself;
                    // the registry logs and swallows it.
                    let _ = inner.registry.refetch(target).await;
                }
            } else if !targets.is_empty() {
                let registry = inner.registry.clone();
                tokio::spawn(async move {
                    for target in &targets {
                        let _ = registry.refetch(target).await;
                    }
                });
            }
        }
    }

    let remaining = inner.in_flight.fetch_sub(1, Ordering::SeqCst) - 1;
    if track {
        let snapshot = match &settled {
            Ok(result) => MutationResult {
                data: result.data.clone(),
                error: if result.has_errors() {
                    Some(CombinedError::from_graphql(result.errors.clone()))
                } else {
                    None
                },
                loading: remaining > 0,
                called: true,
            },
            Err(error) => MutationResult {
                data: None,
                error: Some(error.clone()),
                loading: remaining > 0,
                called: true,
            },
        };
        publish(&inner.out, snapshot);
    }

    match &settled {
        Ok(result) => {
            if let (Some(cb), Some(data)) = (&options.on_completed, &result.data) {
                cb(data);
            }
        }
        Err(error) => {
            if let Some(cb) = &options.on_error {
                cb(error);
            }
        }
    }

    settled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{ExecutionEngine, OptimisticId, SubscriptionEvent};
    use crate::query::{QueryBinding, QueryOptions};
    use async_trait::async_trait;
    use liveql_core::{GraphQLError, NetworkError};
    use std::collections::VecDeque;
    use tokio::sync::{mpsc, Semaphore};

    /// Mutations settle immediately; queries block on the semaphore.
    /// Everything is appended to a shared event log.
    struct StepEngine {
        query_gate: Semaphore,
        mutation_responses: Mutex<VecDeque<Result<ExecutionResult, NetworkError>>>,
        log: Mutex<Vec<String>>,
        optimistic: Mutex<Vec<(OptimisticId, bool)>>,
    }

    impl StepEngine {
        fn new() -> Self {
            Self {
                query_gate: Semaphore::new(usize::from(u8::MAX)),
                mutation_responses: Mutex::new(VecDeque::new()),
                log: Mutex::new(Vec::new()),
                optimistic: Mutex::new(Vec::new()),
            }
        }

        fn gated() -> Self {
            Self {
                query_gate: Semaphore::new(0),
                ..Self::new()
            }
        }

        fn respond_with(self, responses: Vec<Result<ExecutionResult, NetworkError>>) -> Self {
            *self.mutation_responses.lock().unwrap() = responses.into();
            self
        }

        fn log_contains(&self, needle: &str) -> bool {
            self.log.lock().unwrap().iter().any(|e| e == needle)
        }
    }

    #[async_trait]
    impl ExecutionEngine for StepEngine {
        async fn execute(
            &self,
            request: OperationRequest,
        ) -> Result<ExecutionResult, NetworkError> {
            match request.kind {
                OperationKind::Mutation => {
                    self.log.lock().unwrap().push("mutation:done".into());
                    self.mutation_responses
                        .lock()
                        .unwrap()
                        .pop_front()
                        .unwrap_or_else(|| Ok(ExecutionResult::data(serde_json::json!({"ok": true}))))
                }
                _ => {
                    self.log.lock().unwrap().push("query:start".into());
                    let permit = self.query_gate.acquire().await.expect("gate closed");
                    permit.forget();
                    self.log.lock().unwrap().push("query:done".into());
                    Ok(ExecutionResult::data(serde_json::json!({"items": []})))
                }
            }
        }

        async fn open_subscription(
            &self,
            _request: OperationRequest,
        ) -> Result<mpsc::Receiver<SubscriptionEvent>, NetworkError> {
            Err(NetworkError::closed("unsupported"))
        }

        fn install_optimistic(
            &self,
            id: OptimisticId,
            _request: &OperationRequest,
            _data: &Value,
        ) {
            self.optimistic.lock().unwrap().push((id, true));
        }

        fn rollback_optimistic(&self, id: OptimisticId) {
            self.optimistic.lock().unwrap().push((id, false));
        }
    }

    fn harness(engine: StepEngine) -> (Arc<StepEngine>, QueryRegistry) {
        let engine = Arc::new(engine);
        (engine.clone(), QueryRegistry::new(engine))
    }

    async fn eventually(f: impl Fn() -> bool) {
        for _ in 0..200 {
            if f() {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("condition was not reached");
    }

    #[tokio::test]
    async fn test_trigger_resolves_with_data() {
        let (_engine, registry) = harness(StepEngine::new());
        let binding = MutationBinding::new(
            registry,
            MutationOptions::new("mutation AddItem { addItem { id } }"),
        );

        let result = binding.trigger(None).await.unwrap();
        assert_eq!(result.data, Some(serde_json::json!({"ok": true})));

        let snapshot = binding.current();
        assert_eq!(snapshot.data, Some(serde_json::json!({"ok": true})));
        assert!(snapshot.called);
        assert!(!snapshot.loading);
    }

    #[tokio::test]
    async fn test_loading_and_called_publish_before_settlement() {
        let (engine, registry) = harness(StepEngine::new());
        let binding = MutationBinding::new(
            registry,
            MutationOptions::new("mutation AddItem { addItem { id } }"),
        );
        let mut state = binding.subscribe();

        let worker = tokio::spawn({
            let binding = binding.clone();
            async move { binding.trigger(None).await }
        });

        // First observed change must be the in-flight snapshot.
        state.changed().await.unwrap();
        let first = state.borrow_and_update().clone();
        assert!(first.called);
        worker.await.unwrap().unwrap();
        assert!(engine.log_contains("mutation:done"));
    }

    #[tokio::test]
    async fn test_optimistic_installed_and_rolled_back_on_success() {
        let (engine, registry) = harness(StepEngine::new());
        let binding = MutationBinding::new(
            registry,
            MutationOptions::new("mutation AddItem { addItem { id } }")
                .optimistic_response(OptimisticResponse::Literal(serde_json::json!({
                    "addItem": {"id": "tmp"}
                }))),
        );

        binding.trigger(None).await.unwrap();
        let events = engine.optimistic.lock().unwrap().clone();
        assert_eq!(events, vec![(1, true), (1, false)]);
    }

    #[tokio::test]
    async fn test_optimistic_rolled_back_on_failure() {
        let (engine, registry) = harness(
            StepEngine::new().respond_with(vec![Err(NetworkError::timeout())]),
        );
        let binding = MutationBinding::new(
            registry,
            MutationOptions::new("mutation AddItem { addItem { id } }")
                .optimistic_response(OptimisticResponse::computed(|vars| {
                    serde_json::json!({"addItem": {"id": vars.and_then(|v| v.get("id")).cloned()}})
                })),
        );

        let err = binding
            .trigger(Some(
                MutationCallOptions::new().variables(serde_json::json!({"id": "x"})),
            ))
            .await
            .unwrap_err();
        assert!(err.is_network());

        let events = engine.optimistic.lock().unwrap().clone();
        assert_eq!(events, vec![(1, true), (1, false)]);
        assert!(binding.current().error.is_some());
    }

    #[tokio::test]
    async fn test_concurrent_triggers_carry_their_own_results() {
        let (_engine, registry) = harness(StepEngine::new().respond_with(vec![
            Ok(ExecutionResult::data(serde_json::json!({"seq": 1}))),
            Ok(ExecutionResult::data(serde_json::json!({"seq": 2}))),
        ]));
        let binding = MutationBinding::new(
            registry,
            MutationOptions::new("mutation Step { step }"),
        );

        let (first, second) = tokio::join!(binding.trigger(None), binding.trigger(None));
        let mut seqs = vec![
            first.unwrap().data.unwrap()["seq"].as_i64().unwrap(),
            second.unwrap().data.unwrap()["seq"].as_i64().unwrap(),
        ];
        seqs.sort_unstable();
        assert_eq!(seqs, vec![1, 2]);

        let snapshot = binding.current();
        assert!(!snapshot.loading);
        assert!(snapshot.data.is_some());
    }

    #[tokio::test]
    async fn test_graphql_errors_reject_under_default_policy() {
        let (_engine, registry) = harness(StepEngine::new().respond_with(vec![Ok(
            ExecutionResult {
                data: Some(serde_json::json!({"addItem": null})),
                errors: vec![GraphQLError::new("denied")],
                extensions: None,
            },
        )]));
        let binding = MutationBinding::new(
            registry,
            MutationOptions::new("mutation AddItem { addItem { id } }"),
        );

        let err = binding.trigger(None).await.unwrap_err();
        assert!(err.is_graphql());
        assert!(binding.current().error.is_some());
        assert!(binding.current().data.is_none());
    }

    #[tokio::test]
    async fn test_error_policy_all_resolves_with_errors() {
        let (_engine, registry) = harness(StepEngine::new().respond_with(vec![Ok(
            ExecutionResult {
                data: Some(serde_json::json!({"addItem": null})),
                errors: vec![GraphQLError::new("partial")],
                extensions: None,
            },
        )]));
        let binding = MutationBinding::new(
            registry,
            MutationOptions::new("mutation AddItem { addItem { id } }")
                .error_policy(ErrorPolicy::All),
        );

        let result = binding.trigger(None).await.unwrap();
        assert!(result.has_errors());
        let snapshot = binding.current();
        assert!(snapshot.error.is_some());
        assert!(snapshot.data.is_some());
    }

    #[tokio::test]
    async fn test_ignore_results_leaves_snapshot_untouched() {
        let (_engine, registry) = harness(StepEngine::new());
        let binding = MutationBinding::new(
            registry,
            MutationOptions::new("mutation AddItem { addItem { id } }").ignore_results(true),
        );

        let result = binding.trigger(None).await.unwrap();
        assert!(result.data.is_some());
        assert_eq!(binding.current(), MutationResult::idle());
    }

    #[tokio::test]
    async fn test_update_runs_once_against_shared_queries() {
        let (_engine, registry) = harness(StepEngine::new());
        let query = QueryBinding::new(
            registry.clone(),
            QueryOptions::new("query GetItems { items }"),
            false,
        );
        eventually(|| query.current().is_settled() && query.current().called).await;

        let binding = MutationBinding::new(
            registry,
            MutationOptions::new("mutation AddItem { addItem { id } }").update(
                |registry, result| {
                    let added = result.data.clone().unwrap_or_default();
                    registry.update_query_data(&RefetchTarget::from("GetItems"), move |data| {
                        let mut data = data.unwrap_or_else(|| serde_json::json!({"items": []}));
                        data["items"]
                            .as_array_mut()
                            .expect("items array")
                            .push(added.clone());
                        Some(data)
                    });
                },
            ),
        );

        binding.trigger(None).await.unwrap();
        eventually(move || {
            query
                .current()
                .data
                .map(|d| d["items"].as_array().map(Vec::len) == Some(1))
                .unwrap_or(false)
        })
        .await;
    }

    #[tokio::test]
    async fn test_awaited_refetch_blocks_resolution() {
        let (engine, registry) = harness(StepEngine::gated());
        // An active query the mutation will refetch. Its initial fetch also
        // blocks on the gate, so feed it one permit.
        let query = QueryBinding::new(
            registry.clone(),
            QueryOptions::new("query GetItems { items }"),
            false,
        );
        engine.query_gate.add_permits(1);
        eventually(|| query.current().is_settled() && query.current().called).await;

        let binding = MutationBinding::new(
            registry,
            MutationOptions::new("mutation AddItem { addItem { id } }")
                .refetch_queries(RefetchQueries::named(["GetItems"]))
                .await_refetch_queries(true),
        );

        let worker = tokio::spawn({
            let binding = binding.clone();
            async move { binding.trigger(None).await }
        });

        // The mutation has settled and its refetch is blocked on the gate:
        // the trigger future must still be pending and loading still true.
        eventually(|| engine.log_contains("mutation:done")).await;
        eventually(|| {
            engine
                .log
                .lock()
                .unwrap()
                .iter()
                .filter(|e| *e == "query:start")
                .count()
                == 2
        })
        .await;
        assert!(!worker.is_finished());
        assert!(binding.current().loading);

        engine.query_gate.add_permits(1);
        worker.await.unwrap().unwrap();
        assert!(!binding.current().loading);
        assert_eq!(
            engine
                .log
                .lock()
                .unwrap()
                .iter()
                .filter(|e| *e == "query:done")
                .count(),
            2
        );
    }

    #[tokio::test]
    async fn test_unawaited_refetch_does_not_block() {
        let (engine, registry) = harness(StepEngine::gated());
        let query = QueryBinding::new(
            registry.clone(),
            QueryOptions::new("query GetItems { items }"),
            false,
        );
        engine.query_gate.add_permits(1);
        eventually(|| query.current().is_settled() && query.current().called).await;

        let binding = MutationBinding::new(
            registry,
            MutationOptions::new("mutation AddItem { addItem { id } }")
                .refetch_queries(RefetchQueries::named(["GetItems"])),
        );

        binding.trigger(None).await.unwrap();
        assert!(!binding.current().loading);

        // The spawned refetch still runs once the gate opens.
        engine.query_gate.add_permits(1);
        eventually(|| {
            engine
                .log
                .lock()
                .unwrap()
                .iter()
                .filter(|e| *e == "query:done")
                .count()
                == 2
        })
        .await;
    }

    #[tokio::test]
    async fn test_callbacks_fire_once_per_settlement() {
        let (_engine, registry) = harness(StepEngine::new().respond_with(vec![
            Ok(ExecutionResult::data(serde_json::json!({"ok": true}))),
            Err(NetworkError::timeout()),
        ]));
        let completed = Arc::new(AtomicUsize::new(0));
        let failed = Arc::new(AtomicUsize::new(0));
        let completed_counter = completed.clone();
        let failed_counter = failed.clone();
        let binding = MutationBinding::new(
            registry,
            MutationOptions::new("mutation AddItem { addItem { id } }")
                .on_completed(move |_| {
                    completed_counter.fetch_add(1, Ordering::SeqCst);
                })
                .on_error(move |_| {
                    failed_counter.fetch_add(1, Ordering::SeqCst);
                }),
        );

        binding.trigger(None).await.unwrap();
        binding.trigger(None).await.unwrap_err();
        assert_eq!(completed.load(Ordering::SeqCst), 1);
        assert_eq!(failed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_reset_clears_snapshot() {
        let (_engine, registry) = harness(StepEngine::new());
        let binding = MutationBinding::new(
            registry,
            MutationOptions::new("mutation AddItem { addItem { id } }"),
        );
        binding.trigger(None).await.unwrap();
        assert!(binding.current().called);

        binding.reset();
        assert_eq!(binding.current(), MutationResult::idle());
    }

    #[tokio::test]
    async fn test_tuple_snapshot_tracks_trigger() {
        let (_engine, registry) = harness(StepEngine::new());
        let binding = MutationBinding::new(
            registry,
            MutationOptions::new("mutation AddItem { addItem { id } }"),
        );
        let MutationTuple { trigger, mut state } = binding.tuple();

        trigger.execute(None).await.unwrap();
        state.changed().await.unwrap();
        let snapshot = state.borrow_and_update().clone();
        assert!(snapshot.called);
    }
}
