use crate::WorkflowError;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Complete flow definition: the static graph a runner traverses
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FlowDefinition {
    pub nodes: HashMap<String, NodeSpec>,
    #[serde(default)]
    pub flow: HashMap<String, Routing>,
    pub flow_entry: String,
}

impl FlowDefinition {
    pub fn new(flow_entry: impl Into<String>) -> Self {
        Self {
            nodes: HashMap::new(),
            flow: HashMap::new(),
            flow_entry: flow_entry.into(),
        }
    }

    pub fn with_node(mut self, name: impl Into<String>, spec: NodeSpec) -> Self {
        self.nodes.insert(name.into(), spec);
        self
    }

    pub fn route(mut self, from: impl Into<String>, routing: impl Into<Routing>) -> Self {
        self.flow.insert(from.into(), routing.into());
        self
    }

    pub fn node(&self, name: &str) -> Option<&NodeSpec> {
        self.nodes.get(name)
    }

    pub fn routing(&self, name: &str) -> Option<&Routing> {
        self.flow.get(name)
    }

    /// Check the definition for structural errors before it is executed.
    pub fn validate(&self) -> Result<(), WorkflowError> {
        if !self.nodes.contains_key(&self.flow_entry) {
            return Err(WorkflowError::NodeNotFound(self.flow_entry.clone()));
        }

        for (from, routing) in &self.flow {
            if !self.nodes.contains_key(from) {
                return Err(WorkflowError::NodeNotFound(from.clone()));
            }
            if let Some(target) = routing.targets().find(|t| !self.nodes.contains_key(*t)) {
                return Err(WorkflowError::NodeNotFound(target.to_string()));
            }
            if let Routing::Conditional(routes) = routing {
                validate_conditional(from, routes)?;
            }
        }

        for (name, spec) in &self.nodes {
            if let Some(trigger) = &spec.trigger {
                if trigger.on.is_empty() {
                    return Err(WorkflowError::InvalidTrigger {
                        node: name.clone(),
                        reason: "trigger waits on no predecessors".to_string(),
                    });
                }
                if let Some(unknown) = trigger.on.iter().find(|p| !self.nodes.contains_key(*p)) {
                    return Err(WorkflowError::InvalidTrigger {
                        node: name.clone(),
                        reason: format!("unknown predecessor '{}'", unknown),
                    });
                }
            }
        }

        let unreachable = self.unreachable_nodes();
        if !unreachable.is_empty() {
            tracing::warn!("Nodes unreachable from '{}': {:?}", self.flow_entry, unreachable);
        }

        Ok(())
    }

    /// Build a directed graph of the routing table
    pub fn graph(&self) -> (DiGraph<String, ()>, HashMap<String, NodeIndex>) {
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();

        for name in self.nodes.keys() {
            index.insert(name.clone(), graph.add_node(name.clone()));
        }

        for (from, routing) in &self.flow {
            let Some(&from_idx) = index.get(from) else { continue };
            for target in routing.targets() {
                if let Some(&to_idx) = index.get(target) {
                    graph.add_edge(from_idx, to_idx, ());
                }
            }
        }

        (graph, index)
    }

    /// Node names that no path from the entry reaches, sorted
    pub fn unreachable_nodes(&self) -> Vec<String> {
        let (graph, index) = self.graph();
        let Some(&start) = index.get(&self.flow_entry) else {
            return Vec::new();
        };

        let mut reached = vec![false; graph.node_count()];
        let mut dfs = Dfs::new(&graph, start);
        while let Some(idx) = dfs.next(&graph) {
            reached[idx.index()] = true;
        }

        let mut names: Vec<String> = graph
            .node_indices()
            .filter(|idx| !reached[idx.index()])
            .map(|idx| graph[idx].clone())
            .collect();
        names.sort();
        names
    }
}

fn validate_conditional(from: &str, routes: &[ConditionalRoute]) -> Result<(), WorkflowError> {
    let malformed = |reason: &str| WorkflowError::MalformedRouting {
        node: from.to_string(),
        reason: reason.to_string(),
    };

    match routes.iter().position(ConditionalRoute::is_fallback) {
        None => Err(malformed("conditional routing has no fallback entry")),
        Some(idx) if idx + 1 != routes.len() => {
            Err(malformed("fallback entry without a condition must be last"))
        }
        Some(_) => Ok(()),
    }
}

/// Closed set of node kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Activity,
    Control(ControlType),
    Custom,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Activity => "activity_node",
            NodeKind::Control(_) => "control_node",
            NodeKind::Custom => "custom_node",
        }
    }

    pub fn control_type(&self) -> Option<ControlType> {
        match self {
            NodeKind::Control(control) => Some(*control),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlType {
    Parallel,
    Decide,
    Join,
}

impl ControlType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlType::Parallel => "parallel",
            ControlType::Decide => "decide",
            ControlType::Join => "join",
        }
    }
}

impl FromStr for ControlType {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "parallel" => Ok(ControlType::Parallel),
            "decide" => Ok(ControlType::Decide),
            "join" => Ok(ControlType::Join),
            other => Err(WorkflowError::UnknownNodeType(format!("control_node/{}", other))),
        }
    }
}

impl fmt::Display for ControlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Node specification in a flow definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawNodeSpec", into = "RawNodeSpec")]
pub struct NodeSpec {
    pub kind: NodeKind,
    pub props: Map<String, Value>,
    pub trigger: Option<TriggerSpec>,
    pub handler_source: Option<String>,
}

impl NodeSpec {
    fn with_kind(kind: NodeKind) -> Self {
        Self {
            kind,
            props: Map::new(),
            trigger: None,
            handler_source: None,
        }
    }

    pub fn activity() -> Self {
        Self::with_kind(NodeKind::Activity)
    }

    pub fn control(control: ControlType) -> Self {
        Self::with_kind(NodeKind::Control(control))
    }

    pub fn custom() -> Self {
        Self::with_kind(NodeKind::Custom)
    }

    /// Add a literal property
    pub fn with_prop(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.props.insert(
            key.into(),
            serde_json::json!({ "format": "custom", "value": value.into() }),
        );
        self
    }

    /// Add a property computed from an expression at execution time
    pub fn with_variable(mut self, key: impl Into<String>, expression: impl Into<String>) -> Self {
        self.props.insert(
            key.into(),
            serde_json::json!({ "format": "variable", "value": expression.into() }),
        );
        self
    }

    pub fn with_trigger(mut self, trigger: TriggerSpec) -> Self {
        self.trigger = Some(trigger);
        self
    }

    pub fn with_handler_source(mut self, source: impl Into<String>) -> Self {
        self.handler_source = Some(source.into());
        self
    }

    pub fn is_join(&self) -> bool {
        self.kind.control_type() == Some(ControlType::Join)
    }

    pub fn is_split(&self) -> bool {
        self.kind.control_type() == Some(ControlType::Parallel)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawNodeSpec {
    node_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    control_type: Option<String>,
    #[serde(default)]
    props: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    trigger: Option<TriggerSpec>,
    #[serde(default, alias = "handler", skip_serializing_if = "Option::is_none")]
    handler_source: Option<String>,
}

impl TryFrom<RawNodeSpec> for NodeSpec {
    type Error = WorkflowError;

    fn try_from(raw: RawNodeSpec) -> Result<Self, Self::Error> {
        let kind = match raw.node_type.to_ascii_lowercase().as_str() {
            "activity_node" | "activity" => NodeKind::Activity,
            "custom_node" | "custom" => NodeKind::Custom,
            "control_node" | "control" => {
                let control = raw.control_type.as_deref().ok_or_else(|| {
                    WorkflowError::Invalid("control node without controlType".to_string())
                })?;
                NodeKind::Control(control.parse()?)
            }
            _ => return Err(WorkflowError::UnknownNodeType(raw.node_type)),
        };

        Ok(Self {
            kind,
            props: raw.props,
            trigger: raw.trigger,
            handler_source: raw.handler_source,
        })
    }
}

impl From<NodeSpec> for RawNodeSpec {
    fn from(spec: NodeSpec) -> Self {
        Self {
            node_type: spec.kind.as_str().to_string(),
            control_type: spec.kind.control_type().map(|c| c.as_str().to_string()),
            props: spec.props,
            trigger: spec.trigger,
            handler_source: spec.handler_source,
        }
    }
}

/// Wait policy for a join node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerSpec {
    #[serde(rename = "type")]
    pub trigger_type: TriggerType,
    pub on: Vec<String>,
}

impl TriggerSpec {
    pub fn all<I, S>(on: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            trigger_type: TriggerType::All,
            on: on.into_iter().map(Into::into).collect(),
        }
    }

    pub fn race<I, S>(on: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            trigger_type: TriggerType::Race,
            on: on.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerType {
    All,
    Race,
}

/// Outgoing routing entry of a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Routing {
    Single(String),
    Parallel(Vec<String>),
    Conditional(Vec<ConditionalRoute>),
}

impl Routing {
    /// Every node name this entry can lead to
    pub fn targets(&self) -> Box<dyn Iterator<Item = &str> + '_> {
        match self {
            Routing::Single(next) => Box::new(std::iter::once(next.as_str())),
            Routing::Parallel(next) => Box::new(next.iter().map(String::as_str)),
            Routing::Conditional(routes) => Box::new(routes.iter().map(|r| r.next.as_str())),
        }
    }
}

impl From<&str> for Routing {
    fn from(next: &str) -> Self {
        Routing::Single(next.to_string())
    }
}

impl From<String> for Routing {
    fn from(next: String) -> Self {
        Routing::Single(next)
    }
}

impl<const N: usize> From<[&str; N]> for Routing {
    fn from(next: [&str; N]) -> Self {
        Routing::Parallel(next.iter().map(|s| s.to_string()).collect())
    }
}

impl From<Vec<ConditionalRoute>> for Routing {
    fn from(routes: Vec<ConditionalRoute>) -> Self {
        Routing::Conditional(routes)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionalRoute {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    pub next: String,
}

impl ConditionalRoute {
    pub fn when(condition: impl Into<String>, next: impl Into<String>) -> Self {
        Self {
            condition: Some(condition.into()),
            next: next.into(),
        }
    }

    pub fn otherwise(next: impl Into<String>) -> Self {
        Self {
            condition: None,
            next: next.into(),
        }
    }

    /// A missing or blank condition marks the fallback entry
    pub fn is_fallback(&self) -> bool {
        self.condition.as_deref().map_or(true, |c| c.trim().is_empty())
    }
}
