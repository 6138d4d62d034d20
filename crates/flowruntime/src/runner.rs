use crate::hook::{ErrorHook, NodeFailure};
use crate::node::{Admission, Node, NodeHandler};
use crate::registry::HandlerRegistry;
use crate::store::{GroupId, RunnerHandle, RunnerStatus, Store, Termination};
use crate::transition::Transition;
use chrono::Utc;
use flowcore::{
    Evaluator, EventBus, ExecutionEvent, ExecutionId, Executor, FlowDefinition, FlowInfo,
    NodeError, Payload,
};
use futures::future::{join_all, BoxFuture, FutureExt};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error};
use uuid::Uuid;

/// Everything the runners of one top-level execution share
pub struct Execution {
    pub id: ExecutionId,
    pub definition: Arc<FlowDefinition>,
    pub registry: Arc<HandlerRegistry>,
    pub evaluator: Arc<dyn Evaluator>,
    pub context: Arc<Value>,
    pub store: Arc<Store>,
    pub events: Arc<EventBus>,
    pub error_hook: Arc<dyn ErrorHook>,
    pub node_timeout: Duration,
    failures: Mutex<Vec<NodeFailure>>,
}

impl Execution {
    pub fn new(
        definition: Arc<FlowDefinition>,
        registry: Arc<HandlerRegistry>,
        evaluator: Arc<dyn Evaluator>,
        context: Arc<Value>,
        events: Arc<EventBus>,
        error_hook: Arc<dyn ErrorHook>,
        node_timeout: Duration,
    ) -> Self {
        Self {
            id: ExecutionId::new_v4(),
            definition,
            registry,
            evaluator,
            context,
            store: Arc::new(Store::new()),
            events,
            error_hook,
            node_timeout,
            failures: Mutex::new(Vec::new()),
        }
    }

    pub fn failures(&self) -> Vec<NodeFailure> {
        self.failures.lock().clone()
    }
}

/// What a runner does after finishing a step
enum Advance {
    /// Waiting at a join; another arrival will carry on
    Park,
    Finished,
    Continue(String),
    Fork(Vec<String>),
}

/// State machine walking the flow graph one node at a time.
///
/// Each runner has a unique instance id and a group id it shares with the
/// other branches of the split that created it. `lineage` holds the group
/// ids of the enclosing splits, innermost last.
pub struct Runner {
    execution: Arc<Execution>,
    handle: RunnerHandle,
    group_id: GroupId,
    lineage: Vec<GroupId>,
    previous: Option<Arc<Node>>,
    flow_info: FlowInfo,
}

impl Runner {
    pub fn root(execution: Arc<Execution>) -> Self {
        Self::spawn(execution, Uuid::new_v4(), Vec::new(), None, FlowInfo::null())
    }

    fn spawn(
        execution: Arc<Execution>,
        group_id: GroupId,
        lineage: Vec<GroupId>,
        previous: Option<Arc<Node>>,
        flow_info: FlowInfo,
    ) -> Self {
        let handle = RunnerHandle::new();
        execution.store.join(group_id, handle.clone());
        Self {
            execution,
            handle,
            group_id,
            lineage,
            previous,
            flow_info,
        }
    }

    pub fn id(&self) -> Uuid {
        self.handle.id()
    }

    pub fn group_id(&self) -> GroupId {
        self.group_id
    }

    pub fn status(&self) -> RunnerStatus {
        self.handle.status()
    }

    pub fn handle(&self) -> &RunnerHandle {
        &self.handle
    }

    /// Drive this runner from `entry` until it finishes, parks, fails or
    /// forks; a fork completes when every child does.
    pub fn run(mut self, entry: String) -> BoxFuture<'static, ()> {
        async move {
            let mut node_name = entry;
            loop {
                match self.step(&node_name).await {
                    Ok(Advance::Continue(next)) => node_name = next,
                    Ok(Advance::Fork(targets)) => {
                        let children = self.split(&node_name, targets);
                        join_all(children).await;
                        return;
                    }
                    Ok(Advance::Park) | Ok(Advance::Finished) => return,
                    Err(err) => {
                        self.fail(&node_name, err);
                        return;
                    }
                }
            }
        }
        .boxed()
    }

    async fn step(&mut self, node_name: &str) -> Result<Advance, NodeError> {
        let execution = self.execution.clone();

        let node = execution.store.register_node(node_name, || {
            let spec = execution
                .definition
                .node(node_name)
                .cloned()
                .ok_or_else(|| NodeError::NodeNotFound(node_name.to_string()))?;
            Node::new(node_name, spec, &execution.registry)
        })?;

        let previous = self.previous.as_ref().map(|n| n.name().to_string());
        let admission = node.can_proceed(self.group_id, previous.as_deref())?;
        match &admission {
            Admission::Wait => {
                debug!(
                    node = node_name,
                    group = %self.group_id,
                    arrived = ?node.arrivals(self.group_id),
                    "Join not satisfied yet, runner parked"
                );
                return Ok(Advance::Park);
            }
            Admission::Satisfied(arrivals) => {
                debug!(node = node_name, group = %self.group_id, ?arrivals, "Join satisfied");
                execution.events.emit(ExecutionEvent::JoinSatisfied {
                    execution_id: execution.id,
                    group_id: self.group_id,
                    node: node_name.to_string(),
                    arrivals: arrivals.clone(),
                    timestamp: Utc::now(),
                });
            }
            Admission::Proceed => {}
        }

        let executor = Executor::new(
            node_name,
            execution.store.results(),
            execution.events.create_emitter(execution.id, node_name),
            self.handle.token(),
        );

        execution.events.emit(ExecutionEvent::NodeStarted {
            execution_id: execution.id,
            runner_id: self.id(),
            group_id: self.group_id,
            node: node_name.to_string(),
            timestamp: Utc::now(),
        });
        let started = Instant::now();

        self.execute(&node, &admission, &executor).await?;

        let duration_ms = started.elapsed().as_millis() as u64;
        debug!(node = node_name, runner = %self.id(), "Node completed in {}ms", duration_ms);
        execution.events.emit(ExecutionEvent::NodeCompleted {
            execution_id: execution.id,
            runner_id: self.id(),
            node: node_name.to_string(),
            result: self.flow_info.to_value(),
            duration_ms,
            timestamp: Utc::now(),
        });

        execution.store.record_result(node_name, self.flow_info.clone());
        self.previous = Some(node);

        let executor = executor.with_results(execution.store.results());
        self.advance(node_name, &executor)
    }

    async fn execute(&mut self, node: &Node, admission: &Admission, executor: &Executor) -> Result<(), NodeError> {
        let execution = self.execution.clone();

        match node.handler() {
            NodeHandler::None => {}
            NodeHandler::Join => {
                let arrivals = match admission {
                    Admission::Satisfied(arrivals) => arrivals.clone(),
                    _ => node.trigger_result().unwrap_or_default(),
                };
                self.flow_info = FlowInfo::new(node.join_result(&arrivals, &execution.store));
            }
            NodeHandler::Handler(handler) => {
                let props = node.resolve_properties(
                    execution.evaluator.as_ref(),
                    &execution.context,
                    executor,
                )?;
                let payload = Payload {
                    context: execution.context.clone(),
                    props,
                    flow_info: self.flow_info.clone(),
                    executor: executor.clone(),
                };

                let deadline = execution.node_timeout;
                let result = tokio::time::timeout(deadline, handler.handle(payload))
                    .await
                    .map_err(|_| NodeError::Timeout {
                        millis: deadline.as_millis() as u64,
                    })??;
                self.flow_info = FlowInfo::new(result);
            }
        }
        Ok(())
    }

    fn advance(&mut self, node_name: &str, executor: &Executor) -> Result<Advance, NodeError> {
        if !self.handle.is_pending() {
            debug!(node = node_name, runner = %self.id(), "Runner terminated, not advancing");
            self.retire();
            return Ok(Advance::Finished);
        }

        let execution = self.execution.clone();
        let transition = Transition::new(
            &execution.definition,
            execution.evaluator.as_ref(),
            &execution.context,
        );
        let next = transition.resolve_next(node_name, executor)?;

        if next.is_empty() {
            debug!(node = node_name, runner = %self.id(), "No outgoing route, runner finished");
            self.retire();
            return Ok(Advance::Finished);
        }

        if transition.is_join(node_name) {
            let terminated = execution
                .store
                .terminate_group(self.group_id, Termination::ExceptFor(self.id()));
            debug!(node = node_name, group = %self.group_id, terminated, "Join terminated sibling runners");
            self.retire();
            *self = self.continuation();
        }

        match next.as_slice() {
            [single] if !transition.is_split(node_name) => Ok(Advance::Continue(single.clone())),
            _ => {
                self.retire();
                Ok(Advance::Fork(next))
            }
        }
    }

    /// Child runners for each target, sharing one fresh group id
    fn split(&self, node_name: &str, targets: Vec<String>) -> Vec<BoxFuture<'static, ()>> {
        let group_id = Uuid::new_v4();
        let mut lineage = self.lineage.clone();
        lineage.push(self.group_id);

        debug!(node = node_name, parent = %self.id(), group = %group_id, ?targets, "Forking runners");
        self.execution.events.emit(ExecutionEvent::RunnerForked {
            execution_id: self.execution.id,
            parent_id: self.id(),
            group_id,
            node: node_name.to_string(),
            branches: targets.clone(),
            timestamp: Utc::now(),
        });

        let children: Vec<Runner> = targets
            .iter()
            .map(|_| self.fork(group_id, lineage.clone()))
            .collect();

        children
            .into_iter()
            .zip(targets)
            .map(|(child, target)| child.run(target))
            .collect()
    }

    fn fork(&self, group_id: GroupId, lineage: Vec<GroupId>) -> Runner {
        Runner::spawn(
            self.execution.clone(),
            group_id,
            lineage,
            self.previous.clone(),
            self.flow_info.clone(),
        )
    }

    /// Runner that carries on after a join, back in the enclosing group
    fn continuation(&self) -> Runner {
        let mut lineage = self.lineage.clone();
        let group_id = lineage.pop().unwrap_or(self.group_id);
        self.fork(group_id, lineage)
    }

    /// Fulfil this runner and drop it from its group
    fn retire(&self) {
        self.execution
            .store
            .terminate_group(self.group_id, Termination::Only(self.id()));
        self.handle.fulfill();
    }

    fn fail(&self, node_name: &str, err: NodeError) {
        error!(node = node_name, runner = %self.id(), "Step failed: {}", err);
        self.retire();

        self.execution.events.emit(ExecutionEvent::NodeFailed {
            execution_id: self.execution.id,
            runner_id: self.id(),
            node: node_name.to_string(),
            error: err.to_string(),
            timestamp: Utc::now(),
        });

        self.execution.failures.lock().push(NodeFailure {
            node: node_name.to_string(),
            runner_id: self.id(),
            error: err.clone(),
        });
        self.execution.error_hook.on_error(node_name, &err);
    }
}
