use crate::{events::EventEmitter, FlowInfo, NodeError};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Work attached to an activity or custom node
#[async_trait]
pub trait Handler: Send + Sync {
    /// Produce this node's result from the payload
    async fn handle(&self, payload: Payload) -> Result<Value, NodeError>;
}

/// Evaluates property and routing expressions.
///
/// The expression language itself belongs to the host; the engine only hands
/// over the source text together with the runtime context and executor.
pub trait Evaluator: Send + Sync {
    fn evaluate(&self, expression: &str, context: &Value, executor: &Executor) -> Result<Value, NodeError>;

    /// Evaluate and coerce to a boolean
    fn test(&self, expression: &str, context: &Value, executor: &Executor) -> Result<bool, NodeError> {
        self.evaluate(expression, context, executor)
            .map(|value| crate::is_truthy(&value))
    }
}

/// Everything a handler sees for one execution
#[derive(Clone)]
pub struct Payload {
    /// Host runtime context, opaque to the engine
    pub context: Arc<Value>,

    /// Properties evaluated for this execution
    pub props: Map<String, Value>,

    /// Result of the node executed just before this one
    pub flow_info: FlowInfo,

    pub executor: Executor,
}

impl Payload {
    pub fn prop(&self, name: &str) -> Option<&Value> {
        self.props.get(name)
    }

    /// Get required property or return error
    pub fn require_prop(&self, name: &str) -> Result<&Value, NodeError> {
        self.props
            .get(name)
            .ok_or_else(|| NodeError::MissingInput(name.to_string()))
    }

    /// Get property with default
    pub fn prop_or(&self, name: &str, default: Value) -> Value {
        self.props.get(name).cloned().unwrap_or(default)
    }
}

/// Execution context handed to handlers and expressions.
///
/// Exposes the current node name, a snapshot of the latest per-node results
/// and an `exit` switch for the runner executing the node.
#[derive(Clone)]
pub struct Executor {
    node_name: String,
    results: HashMap<String, FlowInfo>,
    events: EventEmitter,
    status: CancellationToken,
}

impl Executor {
    pub fn new(
        node_name: impl Into<String>,
        results: HashMap<String, FlowInfo>,
        events: EventEmitter,
        status: CancellationToken,
    ) -> Self {
        Self {
            node_name: node_name.into(),
            results,
            events,
            status,
        }
    }

    /// Executor that is not attached to any runner or event bus
    pub fn detached(node_name: impl Into<String>) -> Self {
        Self::new(
            node_name,
            HashMap::new(),
            EventEmitter::disconnected(),
            CancellationToken::new(),
        )
    }

    pub fn with_results(mut self, results: HashMap<String, FlowInfo>) -> Self {
        self.results = results;
        self
    }

    pub fn with_events(mut self, events: EventEmitter) -> Self {
        self.events = events;
        self
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    pub fn results(&self) -> &HashMap<String, FlowInfo> {
        &self.results
    }

    pub fn result(&self, node_name: &str) -> Option<&FlowInfo> {
        self.results.get(node_name)
    }

    pub fn events(&self) -> &EventEmitter {
        &self.events
    }

    /// Stop the owning runner after the current step
    pub fn exit(&self) {
        self.status.cancel();
    }

    pub fn is_exited(&self) -> bool {
        self.status.is_cancelled()
    }
}

/// Adapter turning an async closure into a [`Handler`]
pub struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(Payload) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, NodeError>> + Send + 'static,
{
    async fn handle(&self, payload: Payload) -> Result<Value, NodeError> {
        (self.0)(payload).await
    }
}

pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn Handler>
where
    F: Fn(Payload) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, NodeError>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}
