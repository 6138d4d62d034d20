use crate::expression::PathEvaluator;
use crate::hook::{ErrorHook, LoggingErrorHook, NodeFailure};
use crate::registry::HandlerRegistry;
use crate::runner::{Execution, Runner};
use crate::store::Store;
use chrono::Utc;
use flowcore::{
    Evaluator, EventBus, ExecutionEvent, ExecutionId, FlowDefinition, FlowError, FlowInfo,
    WorkflowError,
};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Main runtime for executing flows
pub struct FlowRuntime {
    registry: Arc<HandlerRegistry>,
    evaluator: Arc<dyn Evaluator>,
    error_hook: Arc<dyn ErrorHook>,
    event_bus: Arc<EventBus>,
    config: RuntimeConfig,
}

impl FlowRuntime {
    /// Create a new runtime with default settings
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Create a new runtime with custom configuration
    pub fn with_config(config: RuntimeConfig) -> Self {
        Self::with_registry(Arc::new(HandlerRegistry::new()), config)
    }

    /// Create a new runtime with a pre-configured handler table
    pub fn with_registry(registry: Arc<HandlerRegistry>, config: RuntimeConfig) -> Self {
        let event_bus = Arc::new(EventBus::new(config.event_buffer_size));

        Self {
            registry,
            evaluator: Arc::new(PathEvaluator),
            error_hook: Arc::new(LoggingErrorHook),
            event_bus,
            config,
        }
    }

    /// Replace the expression evaluator
    pub fn with_evaluator(mut self, evaluator: Arc<dyn Evaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    /// Replace the hook receiving step failures
    pub fn with_error_hook(mut self, hook: impl ErrorHook + 'static) -> Self {
        self.error_hook = Arc::new(hook);
        self
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Execute a flow from `entry` (default: the definition's entry).
    ///
    /// Completes once the root runner and every runner it forked have
    /// stopped. Step failures do not fail the call; they are reported to the
    /// error hook and listed in the result.
    pub async fn start(
        &self,
        definition: &FlowDefinition,
        context: Value,
        entry: Option<&str>,
    ) -> Result<ExecutionResult, FlowError> {
        definition.validate()?;

        let entry = entry.unwrap_or(definition.flow_entry.as_str()).to_string();
        if definition.node(&entry).is_none() {
            return Err(WorkflowError::NodeNotFound(entry).into());
        }

        let execution = Arc::new(Execution::new(
            Arc::new(definition.clone()),
            self.registry.clone(),
            self.evaluator.clone(),
            Arc::new(context),
            self.event_bus.clone(),
            self.error_hook.clone(),
            self.config.node_timeout,
        ));
        let start_time = Instant::now();

        tracing::info!("Starting flow execution {} at '{}'", execution.id, entry);
        self.event_bus.emit(ExecutionEvent::FlowStarted {
            execution_id: execution.id,
            entry: entry.clone(),
            timestamp: Utc::now(),
        });

        Runner::root(execution.clone()).run(entry).await;

        let parked = execution.store.drain();
        if parked > 0 {
            tracing::warn!("{} runner(s) were still waiting at a join when the flow ended", parked);
        }

        let failures = execution.failures();
        let duration_ms = start_time.elapsed().as_millis() as u64;
        tracing::info!(
            "Flow execution {} finished in {}ms with {} failure(s)",
            execution.id,
            duration_ms,
            failures.len()
        );
        self.event_bus.emit(ExecutionEvent::FlowCompleted {
            execution_id: execution.id,
            failures: failures.len(),
            duration_ms,
            timestamp: Utc::now(),
        });

        Ok(ExecutionResult {
            execution_id: execution.id,
            results: execution.store.results(),
            failures,
            duration_ms,
            store: execution.store.clone(),
        })
    }

    /// Subscribe to execution events
    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<ExecutionEvent> {
        self.event_bus.subscribe()
    }

    /// Get the event bus for direct access
    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }
}

impl Default for FlowRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of one flow execution
#[derive(Clone)]
pub struct ExecutionResult {
    pub execution_id: ExecutionId,
    /// Last result per visited node
    pub results: HashMap<String, FlowInfo>,
    pub failures: Vec<NodeFailure>,
    pub duration_ms: u64,
    /// Store of the finished execution, for diagnostics
    pub store: Arc<Store>,
}

impl ExecutionResult {
    pub fn result(&self, node_name: &str) -> Option<&FlowInfo> {
        self.results.get(node_name)
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Debug for ExecutionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionResult")
            .field("execution_id", &self.execution_id)
            .field("results", &self.results)
            .field("failures", &self.failures)
            .field("duration_ms", &self.duration_ms)
            .finish_non_exhaustive()
    }
}

/// Configuration for the runtime
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Deadline applied to each handler invocation
    pub node_timeout: Duration,
    pub event_buffer_size: usize,
}

impl RuntimeConfig {
    pub const TIMEOUT_ENV: &'static str = "FLOW_NODE_TIMEOUT_MS";
    pub const EVENT_BUFFER_ENV: &'static str = "FLOW_EVENT_BUFFER";

    /// Defaults overridden by `FLOW_NODE_TIMEOUT_MS` and `FLOW_EVENT_BUFFER`
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(ms) = read_env::<u64>(Self::TIMEOUT_ENV) {
            config.node_timeout = Duration::from_millis(ms);
        }
        if let Some(size) = read_env::<usize>(Self::EVENT_BUFFER_ENV) {
            config.event_buffer_size = size;
        }
        config
    }

    pub fn with_node_timeout(mut self, timeout: Duration) -> Self {
        self.node_timeout = timeout;
        self
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            node_timeout: Duration::from_secs(30),
            event_buffer_size: 1000,
        }
    }
}

fn read_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring malformed {}={:?}", key, raw);
            None
        }
    }
}
