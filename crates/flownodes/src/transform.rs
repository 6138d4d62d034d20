use crate::type_name;
use async_trait::async_trait;
use flowcore::{Handler, NodeError, Payload};
use flowruntime::{HandlerFactory, HandlerMetadata};
use serde_json::Value;
use std::sync::Arc;

/// Parse the `json` property into a value
pub struct JsonParseHandler;

#[async_trait]
impl Handler for JsonParseHandler {
    async fn handle(&self, payload: Payload) -> Result<Value, NodeError> {
        let input = payload.require_prop("json")?;
        let text = input.as_str().ok_or_else(|| NodeError::InvalidInputType {
            field: "json".to_string(),
            expected: "string".to_string(),
            actual: type_name(input).to_string(),
        })?;

        let parsed: Value = serde_json::from_str(text)
            .map_err(|e| NodeError::HandlerFailure(format!("JSON parse error: {}", e)))?;
        payload.executor.events().data("parsed", parsed.clone());
        Ok(parsed)
    }
}

pub struct JsonParseHandlerFactory;

impl HandlerFactory for JsonParseHandlerFactory {
    fn create(&self) -> Result<Arc<dyn Handler>, NodeError> {
        Ok(Arc::new(JsonParseHandler))
    }

    fn handler_type(&self) -> &str {
        "json.parse"
    }

    fn metadata(&self) -> HandlerMetadata {
        HandlerMetadata {
            description: "Parse JSON string".to_string(),
            category: "transform".to_string(),
        }
    }
}

/// Serialize the `value` property, or the incoming flow info when absent
pub struct JsonStringifyHandler;

#[async_trait]
impl Handler for JsonStringifyHandler {
    async fn handle(&self, payload: Payload) -> Result<Value, NodeError> {
        let pretty = payload.prop("pretty").and_then(Value::as_bool).unwrap_or(false);
        let value = match payload.prop("value") {
            Some(value) => value,
            None => payload.flow_info.as_value(),
        };

        let text = if pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        }
        .map_err(|e| NodeError::HandlerFailure(format!("JSON stringify error: {}", e)))?;

        Ok(Value::String(text))
    }
}

pub struct JsonStringifyHandlerFactory;

impl HandlerFactory for JsonStringifyHandlerFactory {
    fn create(&self) -> Result<Arc<dyn Handler>, NodeError> {
        Ok(Arc::new(JsonStringifyHandler))
    }

    fn handler_type(&self) -> &str {
        "json.stringify"
    }

    fn metadata(&self) -> HandlerMetadata {
        HandlerMetadata {
            description: "Convert value to JSON string".to_string(),
            category: "transform".to_string(),
        }
    }
}
