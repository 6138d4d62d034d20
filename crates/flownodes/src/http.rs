use crate::type_name;
use async_trait::async_trait;
use flowcore::{Handler, NodeError, Payload};
use flowruntime::{HandlerFactory, HandlerMetadata};
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// HTTP request handler
pub struct HttpRequestHandler {
    client: reqwest::Client,
}

impl HttpRequestHandler {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpRequestHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Handler for HttpRequestHandler {
    async fn handle(&self, payload: Payload) -> Result<Value, NodeError> {
        let url_value = payload.require_prop("url")?;
        let url = url_value.as_str().ok_or_else(|| NodeError::InvalidInputType {
            field: "url".to_string(),
            expected: "string".to_string(),
            actual: type_name(url_value).to_string(),
        })?;
        let method = payload
            .prop("method")
            .and_then(Value::as_str)
            .unwrap_or("GET")
            .to_uppercase();

        payload.executor.events().info(format!("{} {}", method, url));

        let mut request = match method.as_str() {
            "GET" => self.client.get(url),
            "POST" => self.client.post(url),
            "PUT" => self.client.put(url),
            "DELETE" => self.client.delete(url),
            _ => return Err(NodeError::Configuration(format!("Unsupported method: {}", method))),
        };

        if matches!(method.as_str(), "POST" | "PUT") {
            match payload.prop("body") {
                None | Some(Value::Null) => {}
                Some(Value::String(text)) => request = request.body(text.clone()),
                Some(body) => request = request.json(body),
            }
        }

        if let Some(Value::Object(headers)) = payload.prop("headers") {
            for (key, value) in headers {
                if let Some(val_str) = value.as_str() {
                    request = request.header(key.as_str(), val_str);
                }
            }
        }

        let response = request
            .send()
            .await
            .map_err(|e| NodeError::HandlerFailure(format!("HTTP request failed: {}", e)))?;

        let status = response.status().as_u16();
        let headers: Map<String, Value> = response
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_str().unwrap_or("").to_string())))
            .collect();

        let body_text = response
            .text()
            .await
            .map_err(|e| NodeError::HandlerFailure(format!("Failed to read response: {}", e)))?;

        if status >= 400 {
            payload.executor.events().warn(format!("Response status: {}", status));
        } else {
            payload.executor.events().info(format!("Response status: {}", status));
        }
        tracing::debug!(node = payload.executor.node_name(), status, "HTTP {} {}", method, url);

        // JSON bodies are handed on parsed so later nodes can address fields
        let body = serde_json::from_str(&body_text).unwrap_or(Value::String(body_text));

        Ok(json!({
            "status": status,
            "body": body,
            "headers": headers,
        }))
    }
}

pub struct HttpRequestHandlerFactory;

impl HandlerFactory for HttpRequestHandlerFactory {
    fn create(&self) -> Result<Arc<dyn Handler>, NodeError> {
        Ok(Arc::new(HttpRequestHandler::new()))
    }

    fn handler_type(&self) -> &str {
        "http.request"
    }

    fn metadata(&self) -> HandlerMetadata {
        HandlerMetadata {
            description: "Make HTTP requests".to_string(),
            category: "http".to_string(),
        }
    }
}
