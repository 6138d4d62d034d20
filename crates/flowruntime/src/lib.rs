//! Flow execution runtime
//!
//! This crate provides the engine that runs flow definitions: the shared
//! store, node wrappers, routing resolution and the runner state machine
//! that forks on splits and synchronizes on joins.

mod expression;
mod hook;
mod node;
mod registry;
mod runner;
mod runtime;
mod store;
mod transition;

pub use expression::PathEvaluator;
pub use hook::{ErrorHook, LoggingErrorHook, NodeFailure};
pub use node::{Admission, Node, NodeHandler};
pub use registry::{HandlerFactory, HandlerMetadata, HandlerRegistry};
pub use runner::{Execution, Runner};
pub use runtime::{ExecutionResult, FlowRuntime, RuntimeConfig};
pub use store::{GroupId, RunnerHandle, RunnerStatus, Store, Termination};
pub use transition::Transition;
