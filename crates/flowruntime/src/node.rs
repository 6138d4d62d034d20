use crate::registry::HandlerRegistry;
use crate::store::{GroupId, Store};
use flowcore::{
    Evaluator, Executor, Handler, NodeError, NodeKind, NodeSpec, TriggerSpec, TriggerType,
};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// How a node produces its result
#[derive(Clone)]
pub enum NodeHandler {
    /// Caller supplied work (activity and custom nodes)
    Handler(Arc<dyn Handler>),
    /// Folds the trigger's arrivals into `{ predecessor: latest result }`
    Join,
    /// Produces no result; the incoming flow info passes through
    None,
}

/// Outcome of a join admission check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// The node has no trigger
    Proceed,
    /// This arrival satisfied the trigger; carries the arrived predecessors
    Satisfied(Vec<String>),
    /// Still waiting for other predecessors
    Wait,
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        !matches!(self, Admission::Wait)
    }
}

#[derive(Debug, Default)]
struct Arrivals {
    names: Vec<String>,
    fired: bool,
}

/// One flow-definition entry plus its runtime join state.
///
/// A store holds at most one `Node` per name so every runner sees the same
/// arrival register.
pub struct Node {
    name: String,
    spec: NodeSpec,
    handler: NodeHandler,
    register: Mutex<HashMap<GroupId, Arrivals>>,
    trigger_result: Mutex<Option<Vec<String>>>,
}

impl Node {
    pub fn new(name: impl Into<String>, spec: NodeSpec, registry: &HandlerRegistry) -> Result<Self, NodeError> {
        let name = name.into();
        let handler = if spec.is_join() {
            NodeHandler::Join
        } else {
            match registry.resolve(&name, &spec)? {
                Some(handler) => NodeHandler::Handler(handler),
                None => NodeHandler::None,
            }
        };

        Ok(Self {
            name,
            spec,
            handler,
            register: Mutex::new(HashMap::new()),
            trigger_result: Mutex::new(None),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn spec(&self) -> &NodeSpec {
        &self.spec
    }

    pub fn kind(&self) -> NodeKind {
        self.spec.kind
    }

    pub fn trigger(&self) -> Option<&TriggerSpec> {
        self.spec.trigger.as_ref()
    }

    pub fn handler(&self) -> &NodeHandler {
        &self.handler
    }

    /// Whether executing this node produces a new result
    pub fn has_handler(&self) -> bool {
        !matches!(self.handler, NodeHandler::None)
    }

    /// Evaluate the declared property tree for one execution.
    pub fn resolve_properties(
        &self,
        evaluator: &dyn Evaluator,
        context: &Value,
        executor: &Executor,
    ) -> Result<Map<String, Value>, NodeError> {
        resolve_tree(&self.spec.props, evaluator, context, executor)
    }

    /// Register an arrival from `previous` and decide whether the node may run.
    ///
    /// Arrivals are tracked per group as a set of predecessor names, so the
    /// decision holds for any arrival order. A trigger fires at most once per
    /// group.
    pub fn can_proceed(&self, group_id: GroupId, previous: Option<&str>) -> Result<Admission, NodeError> {
        let Some(trigger) = &self.spec.trigger else {
            return Ok(Admission::Proceed);
        };
        let previous = previous.ok_or_else(|| NodeError::AdmissionViolation {
            node: self.name.clone(),
        })?;

        let mut register = self.register.lock();
        let arrivals = register.entry(group_id).or_default();
        if arrivals.names.iter().any(|n| n == previous) || arrivals.fired {
            return Ok(Admission::Wait);
        }
        arrivals.names.push(previous.to_string());

        let satisfied = match trigger.trigger_type {
            TriggerType::All => arrivals.names.len() == trigger.on.len(),
            TriggerType::Race => arrivals.names.len() == 1,
        };
        if !satisfied {
            return Ok(Admission::Wait);
        }

        arrivals.fired = true;
        let result = arrivals.names.clone();
        *self.trigger_result.lock() = Some(result.clone());
        Ok(Admission::Satisfied(result))
    }

    /// Predecessors that have arrived for a group so far
    pub fn arrivals(&self, group_id: GroupId) -> Vec<String> {
        self.register
            .lock()
            .get(&group_id)
            .map(|a| a.names.clone())
            .unwrap_or_default()
    }

    /// Arrival list captured by the most recent satisfied trigger
    pub fn trigger_result(&self) -> Option<Vec<String>> {
        self.trigger_result.lock().clone()
    }

    /// Result of a join: each arrived predecessor's latest result
    pub fn join_result(&self, arrivals: &[String], store: &Store) -> Value {
        let map: Map<String, Value> = arrivals
            .iter()
            .map(|name| {
                let value = store.result(name).map(|info| info.to_value()).unwrap_or(Value::Null);
                (name.clone(), value)
            })
            .collect();
        Value::Object(map)
    }
}

fn resolve_tree(
    tree: &Map<String, Value>,
    evaluator: &dyn Evaluator,
    context: &Value,
    executor: &Executor,
) -> Result<Map<String, Value>, NodeError> {
    tree.iter()
        .map(|(key, prop)| Ok((key.clone(), resolve_prop(prop, evaluator, context, executor)?)))
        .collect()
}

/// `{ "format": "variable", "value": "<expr>" }` is evaluated,
/// `{ "format": "custom", "value": ... }` and bare values are literals whose
/// nested objects and lists are resolved recursively.
fn resolve_prop(
    prop: &Value,
    evaluator: &dyn Evaluator,
    context: &Value,
    executor: &Executor,
) -> Result<Value, NodeError> {
    let tagged = prop.as_object().and_then(|obj| {
        let format = obj.get("format")?.as_str()?;
        let value = obj.get("value").unwrap_or(&Value::Null);
        matches!(format, "custom" | "variable").then_some((format, value))
    });

    match tagged {
        Some(("variable", Value::String(expression))) => evaluator.evaluate(expression, context, executor),
        Some(("variable", other)) => Err(NodeError::Expression(format!(
            "variable property must be an expression string, got {}",
            other
        ))),
        Some((_, value)) => resolve_literal(value, evaluator, context, executor),
        None => resolve_literal(prop, evaluator, context, executor),
    }
}

fn resolve_literal(
    value: &Value,
    evaluator: &dyn Evaluator,
    context: &Value,
    executor: &Executor,
) -> Result<Value, NodeError> {
    match value {
        Value::Object(map) => resolve_tree(map, evaluator, context, executor).map(Value::Object),
        Value::Array(items) => items
            .iter()
            .map(|item| resolve_prop(item, evaluator, context, executor))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        other => Ok(other.clone()),
    }
}
