use flowcore::{Handler, NodeError, NodeKind, NodeSpec};
use std::collections::HashMap;
use std::sync::Arc;

/// Factory for handlers referenced by a node's `handlerSource`
pub trait HandlerFactory: Send + Sync {
    /// Create a new handler instance
    fn create(&self) -> Result<Arc<dyn Handler>, NodeError>;

    /// Handler type identifier matched against `handlerSource`
    fn handler_type(&self) -> &str;

    /// Optional: Get handler metadata (description, category)
    fn metadata(&self) -> HandlerMetadata {
        HandlerMetadata::default()
    }
}

/// Metadata about a handler type
#[derive(Debug, Clone)]
pub struct HandlerMetadata {
    pub description: String,
    pub category: String,
}

impl Default for HandlerMetadata {
    fn default() -> Self {
        Self {
            description: String::new(),
            category: "general".to_string(),
        }
    }
}

/// Handler table for one engine.
///
/// Handlers registered by node name take precedence; otherwise a node's
/// `handlerSource` is resolved through a registered factory.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn Handler>>,
    factories: HashMap<String, Arc<dyn HandlerFactory>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a handler to a node name
    pub fn register(&mut self, node_name: impl Into<String>, handler: Arc<dyn Handler>) {
        let node_name = node_name.into();
        tracing::debug!("Registering handler for node: {}", node_name);
        self.handlers.insert(node_name, handler);
    }

    pub fn with_handler(mut self, node_name: impl Into<String>, handler: Arc<dyn Handler>) -> Self {
        self.register(node_name, handler);
        self
    }

    /// Register a handler factory
    pub fn register_factory(&mut self, factory: Arc<dyn HandlerFactory>) {
        let handler_type = factory.handler_type().to_string();
        tracing::info!("Registering handler type: {}", handler_type);
        self.factories.insert(handler_type, factory);
    }

    pub fn handler(&self, node_name: &str) -> Option<Arc<dyn Handler>> {
        self.handlers.get(node_name).cloned()
    }

    /// Find the handler for a node.
    ///
    /// Custom nodes must resolve to something; activity nodes without a
    /// handler pass their input through; control nodes never take one.
    pub fn resolve(&self, node_name: &str, spec: &NodeSpec) -> Result<Option<Arc<dyn Handler>>, NodeError> {
        if matches!(spec.kind, NodeKind::Control(_)) {
            return Ok(None);
        }

        if let Some(handler) = self.handlers.get(node_name) {
            return Ok(Some(handler.clone()));
        }

        if let Some(source) = &spec.handler_source {
            let factory = self.factories.get(source).ok_or_else(|| {
                NodeError::Configuration(format!("Unknown handler source '{}' on node '{}'", source, node_name))
            })?;
            return factory.create().map(Some);
        }

        match spec.kind {
            NodeKind::Custom => Err(NodeError::MissingHandler(node_name.to_string())),
            _ => Ok(None),
        }
    }

    /// Get all registered handler types
    pub fn list_handler_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.factories.keys().cloned().collect();
        types.sort();
        types
    }

    /// Get metadata for a handler type
    pub fn get_metadata(&self, handler_type: &str) -> Option<HandlerMetadata> {
        self.factories.get(handler_type).map(|f| f.metadata())
    }
}
