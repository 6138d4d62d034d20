use async_trait::async_trait;
use flowcore::{Handler, NodeError, Payload};
use flowruntime::{HandlerFactory, HandlerMetadata};
use serde_json::Value;
use std::sync::Arc;
use tokio::time::{sleep, Duration};

const DEFAULT_DELAY_MS: u64 = 1000;

/// Waits for `delay_ms`, then passes the incoming flow info through
pub struct DelayHandler;

#[async_trait]
impl Handler for DelayHandler {
    async fn handle(&self, payload: Payload) -> Result<Value, NodeError> {
        let delay_ms = match payload.prop("delay_ms") {
            None | Some(Value::Null) => DEFAULT_DELAY_MS,
            Some(value) => value.as_u64().ok_or_else(|| NodeError::InvalidInputType {
                field: "delay_ms".to_string(),
                expected: "non-negative integer".to_string(),
                actual: value.to_string(),
            })?,
        };

        let events = payload.executor.events();
        events.progress(0.0, Some(format!("Delaying for {}ms", delay_ms)));
        sleep(Duration::from_millis(delay_ms)).await;
        events.progress(100.0, None);

        Ok(payload.flow_info.to_value())
    }
}

pub struct DelayHandlerFactory;

impl HandlerFactory for DelayHandlerFactory {
    fn create(&self) -> Result<Arc<dyn Handler>, NodeError> {
        Ok(Arc::new(DelayHandler))
    }

    fn handler_type(&self) -> &str {
        "time.delay"
    }

    fn metadata(&self) -> HandlerMetadata {
        HandlerMetadata {
            description: "Delay execution for specified milliseconds".to_string(),
            category: "time".to_string(),
        }
    }
}
