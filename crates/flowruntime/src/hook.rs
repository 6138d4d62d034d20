use flowcore::NodeError;
use uuid::Uuid;

/// Receives every step failure, once per failing runner
pub trait ErrorHook: Send + Sync {
    fn on_error(&self, node_name: &str, error: &NodeError);
}

impl<F> ErrorHook for F
where
    F: Fn(&str, &NodeError) + Send + Sync,
{
    fn on_error(&self, node_name: &str, error: &NodeError) {
        self(node_name, error)
    }
}

/// Default hook: report through tracing and carry on
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingErrorHook;

impl ErrorHook for LoggingErrorHook {
    fn on_error(&self, node_name: &str, error: &NodeError) {
        tracing::error!(node = node_name, "Node failed: {}", error);
    }
}

/// A failed step as recorded in the execution result
#[derive(Debug, Clone, PartialEq)]
pub struct NodeFailure {
    pub node: String,
    pub runner_id: Uuid,
    pub error: NodeError,
}
