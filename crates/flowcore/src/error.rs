use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Node error: {0}")]
    Node(#[from] NodeError),

    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised while a runner executes a single step.
///
/// Every variant is caught at the step boundary: it fulfils the owning
/// runner and is reported once to the error hook.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NodeError {
    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),

    #[error("Timeout after {millis}ms")]
    Timeout { millis: u64 },

    #[error("Handler failed: {0}")]
    HandlerFailure(String),

    #[error("Node '{node}' is gated by a trigger but was reached without a predecessor")]
    AdmissionViolation { node: String },

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("No handler registered for node '{0}'")]
    MissingHandler(String),

    #[error("Expression error: {0}")]
    Expression(String),

    #[error("Missing required input: {0}")]
    MissingInput(String),

    #[error("Invalid input type for '{field}': expected {expected}, got {actual}")]
    InvalidInputType {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<WorkflowError> for NodeError {
    fn from(err: WorkflowError) -> Self {
        match err {
            WorkflowError::UnknownNodeType(kind) => NodeError::UnknownNodeType(kind),
            WorkflowError::NodeNotFound(name) => NodeError::NodeNotFound(name),
            other => NodeError::Configuration(other.to_string()),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorkflowError {
    #[error("Invalid workflow: {0}")]
    Invalid(String),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),

    #[error("Malformed routing for '{node}': {reason}")]
    MalformedRouting { node: String, reason: String },

    #[error("Invalid trigger on '{node}': {reason}")]
    InvalidTrigger { node: String, reason: String },
}
