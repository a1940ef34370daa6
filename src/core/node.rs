use compact_str::CompactString;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use strum::{Display, EnumIter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, EnumIter)]
pub enum NodeStatus {
    /// Unreachable or offline
    #[strum(to_string = "Down")]
    Down,
    /// Reachable, no scheduled jobs
    #[strum(to_string = "Free")]
    Free,
    /// Reachable, at least one scheduled job
    #[strum(to_string = "Exclusive")]
    Exclusive,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobInfo {
    pub user: CompactString,
    pub job_name: String,
    pub time_used: String,
}

/// Scheduler jobs on one node, keyed by PID.
pub type Jobs = BTreeMap<CompactString, JobInfo>;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NodeMetrics {
    pub cpu_util_pct: f64,
    pub cpu_mem_pct: f64,
    pub cpu_temp_c: f64,
    pub gpu_util_pct: f64,
    pub gpu_mem_pct: f64,
    pub gpu_temp_c: f64,
    pub ib_speed_gbps: f64,
    pub ib_temp_c: f64,
    pub disk_used_pct: f64,
}

/// A node is either down with nothing known about it, or up with a full
/// set of metrics.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum NodeState {
    Down,
    Up { jobs: Jobs, metrics: NodeMetrics },
}

impl NodeState {
    pub fn status(&self) -> NodeStatus {
        match self {
            NodeState::Down => NodeStatus::Down,
            NodeState::Up { jobs, .. } if jobs.is_empty() => NodeStatus::Free,
            NodeState::Up { .. } => NodeStatus::Exclusive,
        }
    }

    pub fn is_down(&self) -> bool {
        matches!(self, NodeState::Down)
    }

    pub fn jobs(&self) -> Option<&Jobs> {
        match self {
            NodeState::Down => None,
            NodeState::Up { jobs, .. } => Some(jobs),
        }
    }

    pub fn metrics(&self) -> Option<&NodeMetrics> {
        match self {
            NodeState::Down => None,
            NodeState::Up { metrics, .. } => Some(metrics),
        }
    }

    /// Users owning at least one scheduler job on this node.
    pub fn job_owners(&self) -> BTreeSet<CompactString> {
        self.jobs()
            .map(|jobs| jobs.values().map(|job| job.user.clone()).collect())
            .unwrap_or_default()
    }
}

/// Parsed snapshot of the whole cluster, keyed by node name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct NodeStates(BTreeMap<String, NodeState>);

impl NodeStates {
    pub fn get(&self, node: &str) -> Option<&NodeState> {
        self.0.get(node)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &NodeState)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Nodes that answered, in name order. This is the list a process
    /// collector should poll.
    pub fn alive_nodes(&self) -> Vec<&str> {
        self.0
            .iter()
            .filter(|(_, state)| !state.is_down())
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn count_by_status(&self, status: NodeStatus) -> usize {
        self.0.values().filter(|s| s.status() == status).count()
    }

    pub(crate) fn insert(&mut self, node: String, state: NodeState) {
        self.0.insert(node, state);
    }

    pub(crate) fn get_mut(&mut self, node: &str) -> Option<&mut NodeState> {
        self.0.get_mut(node)
    }
}

impl FromIterator<(String, NodeState)> for NodeStates {
    fn from_iter<I: IntoIterator<Item = (String, NodeState)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
