use crate::node::Node;
use flowcore::{FlowInfo, NodeError};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Identity shared by every runner forked from one split
pub type GroupId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunnerStatus {
    Pending,
    Fulfilled,
}

/// Bookkeeping view of a runner: its unique id and its status switch.
///
/// The status only ever moves from pending to fulfilled; fulfilling twice is
/// a no-op.
#[derive(Debug, Clone)]
pub struct RunnerHandle {
    instance_id: Uuid,
    status: CancellationToken,
}

impl RunnerHandle {
    pub fn new() -> Self {
        Self {
            instance_id: Uuid::new_v4(),
            status: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.instance_id
    }

    pub fn status(&self) -> RunnerStatus {
        if self.status.is_cancelled() {
            RunnerStatus::Fulfilled
        } else {
            RunnerStatus::Pending
        }
    }

    pub fn is_pending(&self) -> bool {
        !self.status.is_cancelled()
    }

    pub fn fulfill(&self) {
        self.status.cancel();
    }

    /// Token handed to executors so handlers can end their runner
    pub fn token(&self) -> CancellationToken {
        self.status.clone()
    }
}

impl Default for RunnerHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Which members of a group [`Store::terminate_group`] fulfils
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Only this runner; the rest of the group keeps running
    Only(Uuid),
    /// Everyone but this runner, which stays as the sole member
    ExceptFor(Uuid),
    /// The whole group
    All,
}

#[derive(Default)]
struct StoreInner {
    flow_info: HashMap<String, FlowInfo>,
    nodes: HashMap<String, Arc<Node>>,
    groups: HashMap<GroupId, Vec<RunnerHandle>>,
}

/// State shared by every runner of one top-level execution.
///
/// Critical sections are short and never span an await point.
#[derive(Default)]
pub struct Store {
    inner: Mutex<StoreInner>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the last known result for a node
    pub fn record_result(&self, node_name: &str, flow_info: FlowInfo) {
        self.inner.lock().flow_info.insert(node_name.to_string(), flow_info);
    }

    pub fn result(&self, node_name: &str) -> Option<FlowInfo> {
        self.inner.lock().flow_info.get(node_name).cloned()
    }

    /// Snapshot of every recorded result
    pub fn results(&self) -> HashMap<String, FlowInfo> {
        self.inner.lock().flow_info.clone()
    }

    /// Return the node singleton for `name`, building it on first use.
    pub fn register_node<F>(&self, name: &str, factory: F) -> Result<Arc<Node>, NodeError>
    where
        F: FnOnce() -> Result<Node, NodeError>,
    {
        if let Some(node) = self.node(name) {
            return Ok(node);
        }

        let built = Arc::new(factory()?);
        let mut inner = self.inner.lock();
        // keep whichever instance got in first
        let node = inner.nodes.entry(name.to_string()).or_insert(built);
        Ok(node.clone())
    }

    pub fn node(&self, name: &str) -> Option<Arc<Node>> {
        self.inner.lock().nodes.get(name).cloned()
    }

    /// Add a runner to a group's live list
    pub fn join(&self, group_id: GroupId, runner: RunnerHandle) {
        self.inner.lock().groups.entry(group_id).or_default().push(runner);
    }

    /// Fulfil members of a group and drop them from its live list.
    ///
    /// Safe to call for runners that already finished. Returns how many
    /// runners were removed.
    pub fn terminate_group(&self, group_id: GroupId, mode: Termination) -> usize {
        let destroyed = {
            let mut inner = self.inner.lock();
            let Some(members) = inner.groups.get_mut(&group_id) else {
                return 0;
            };

            let destroyed: Vec<RunnerHandle> = match mode {
                Termination::Only(id) => match members.iter().position(|r| r.id() == id) {
                    Some(idx) => vec![members.remove(idx)],
                    None => Vec::new(),
                },
                Termination::ExceptFor(id) => {
                    let (kept, others): (Vec<_>, Vec<_>) =
                        members.drain(..).partition(|r| r.id() == id);
                    *members = kept;
                    others
                }
                Termination::All => members.drain(..).collect(),
            };

            if members.is_empty() {
                inner.groups.remove(&group_id);
            }
            destroyed
        };

        for runner in &destroyed {
            runner.fulfill();
        }
        destroyed.len()
    }

    /// Ids of the runners currently live in a group
    pub fn group_members(&self, group_id: GroupId) -> Vec<Uuid> {
        self.inner
            .lock()
            .groups
            .get(&group_id)
            .map(|members| members.iter().map(RunnerHandle::id).collect())
            .unwrap_or_default()
    }

    pub fn group_count(&self) -> usize {
        self.inner.lock().groups.len()
    }

    /// Fulfil every runner still tracked; returns how many were still pending.
    pub fn drain(&self) -> usize {
        let groups: Vec<Vec<RunnerHandle>> = {
            let mut inner = self.inner.lock();
            inner.groups.drain().map(|(_, members)| members).collect()
        };

        let mut pending = 0;
        for runner in groups.iter().flatten() {
            if runner.is_pending() {
                pending += 1;
            }
            runner.fulfill();
        }
        pending
    }
}
