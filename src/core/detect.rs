//! Threshold detectors over parsed snapshots.
//!
//! Every metric detector skips nodes that are currently down, since no
//! metrics exist for them. Comparisons are strict: a value equal to the
//! limit never triggers.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::node::{Jobs, NodeMetrics, NodeState, NodeStates};

/// Numeric limits for one detection run. There are no defaults here; they
/// come from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// °C
    pub cpu_temp_limit: f64,
    /// °C
    pub gpu_temp_limit: f64,
    /// °C
    pub ib_temp_limit: f64,
    /// Gbps
    pub ib_min_speed: f64,
    /// percent of volume
    pub disk_usage_limit: f64,
    /// percent of one core
    pub login_cpu_pct_limit: f64,
    /// percent of node memory
    pub login_mem_pct_limit: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricViolation {
    pub value: f64,
    pub limit: f64,
    pub jobs: Jobs,
}

/// Offending nodes for one metric rule, keyed by node name.
pub type MetricViolations = BTreeMap<String, MetricViolation>;

/// Nodes that just went down, with the jobs they were running before.
pub type DownNodes = BTreeMap<String, Jobs>;

/// Nodes down now that were not down in the previous snapshot.
///
/// A node missing from the previous snapshot counts as not down; it is
/// reported with no jobs.
pub fn node_down(current: &NodeStates, previous: &NodeStates) -> DownNodes {
    current
        .iter()
        .filter(|(_, state)| state.is_down())
        .filter_map(|(node, _)| match previous.get(node) {
            Some(NodeState::Down) => None,
            Some(NodeState::Up { jobs, .. }) => Some((node.clone(), jobs.clone())),
            None => Some((node.clone(), Jobs::new())),
        })
        .collect()
}

pub fn cpu_high_temp(current: &NodeStates, limit: f64) -> MetricViolations {
    scan(current, limit, |m| m.cpu_temp_c, above)
}

pub fn gpu_high_temp(current: &NodeStates, limit: f64) -> MetricViolations {
    scan(current, limit, |m| m.gpu_temp_c, above)
}

pub fn ib_high_temp(current: &NodeStates, limit: f64) -> MetricViolations {
    scan(current, limit, |m| m.ib_temp_c, above)
}

pub fn ib_low_speed(current: &NodeStates, threshold: f64) -> MetricViolations {
    scan(current, threshold, |m| m.ib_speed_gbps, below)
}

pub fn disk_high_usage(current: &NodeStates, limit: f64) -> MetricViolations {
    scan(current, limit, |m| m.disk_used_pct, above)
}

fn above(value: f64, limit: f64) -> bool {
    value > limit
}

fn below(value: f64, limit: f64) -> bool {
    value < limit
}

fn scan(
    current: &NodeStates,
    limit: f64,
    metric: impl Fn(&NodeMetrics) -> f64,
    violates: fn(f64, f64) -> bool,
) -> MetricViolations {
    current
        .iter()
        .filter_map(|(node, state)| match state {
            NodeState::Down => None,
            NodeState::Up { jobs, metrics } => {
                let value = metric(metrics);
                violates(value, limit).then(|| {
                    (
                        node.clone(),
                        MetricViolation {
                            value,
                            limit,
                            jobs: jobs.clone(),
                        },
                    )
                })
            }
        })
        .collect()
}
