//! Standard handler library
//!
//! Built-in handlers for common operations, exposed as factories so a
//! custom node can reference them through its `handlerSource`.

mod debug;
mod http;
mod time;
mod transform;

pub use debug::{DebugHandler, DebugHandlerFactory};
pub use http::{HttpRequestHandler, HttpRequestHandlerFactory};
pub use time::{DelayHandler, DelayHandlerFactory};
pub use transform::{JsonParseHandler, JsonParseHandlerFactory, JsonStringifyHandler, JsonStringifyHandlerFactory};

use flowruntime::HandlerRegistry;
use serde_json::Value;
use std::sync::Arc;

/// Register all standard handler factories with a registry
pub fn register_all(registry: &mut HandlerRegistry) {
    registry.register_factory(Arc::new(DebugHandlerFactory));
    registry.register_factory(Arc::new(HttpRequestHandlerFactory));
    registry.register_factory(Arc::new(JsonParseHandlerFactory));
    registry.register_factory(Arc::new(JsonStringifyHandlerFactory));
    registry.register_factory(Arc::new(DelayHandlerFactory));
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
