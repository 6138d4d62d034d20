use async_trait::async_trait;
use flowcore::{Handler, NodeError, Payload};
use flowruntime::{HandlerFactory, HandlerMetadata};
use serde_json::{json, Value};
use std::sync::Arc;

/// Logs its properties and incoming flow info
pub struct DebugHandler;

#[async_trait]
impl Handler for DebugHandler {
    async fn handle(&self, payload: Payload) -> Result<Value, NodeError> {
        let events = payload.executor.events();
        let message = match payload.prop("message").and_then(|v| v.as_str()) {
            Some(message) => message.to_string(),
            None => {
                events.warn("debug.log has no string 'message' property");
                "(no message)".to_string()
            }
        };

        events.info(format!("DEBUG: {}", message));
        tracing::debug!(node = payload.executor.node_name(), "{}", message);

        // Also log all properties for visibility
        for (key, value) in &payload.props {
            events.info(format!("  {}: {}", key, value));
        }
        events.info(format!("  flowInfo: {}", payload.flow_info));

        Ok(json!({ "message": message }))
    }
}

pub struct DebugHandlerFactory;

impl HandlerFactory for DebugHandlerFactory {
    fn create(&self) -> Result<Arc<dyn Handler>, NodeError> {
        Ok(Arc::new(DebugHandler))
    }

    fn handler_type(&self) -> &str {
        "debug.log"
    }

    fn metadata(&self) -> HandlerMetadata {
        HandlerMetadata {
            description: "Logs properties and flow info for debugging".to_string(),
            category: "debug".to_string(),
        }
    }
}
