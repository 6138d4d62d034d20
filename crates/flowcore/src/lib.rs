//! Core abstractions for the flow engine
//!
//! This crate provides the flow-definition data model, the handler contract
//! and the error taxonomy that all other components depend on. It does not
//! execute anything.

mod definition;
mod error;
pub mod events;
mod node;
mod value;

pub use definition::{
    ConditionalRoute, ControlType, FlowDefinition, NodeKind, NodeSpec, Routing, TriggerSpec,
    TriggerType,
};
pub use error::{FlowError, NodeError, WorkflowError};
pub use events::*;
pub use node::{handler_fn, Evaluator, Executor, FnHandler, Handler, Payload};
pub use value::{is_truthy, lookup_path, FlowInfo};

/// Result type for flow operations
pub type Result<T> = std::result::Result<T, FlowError>;
