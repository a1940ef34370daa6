//! Parser for the per-node status snapshot.
//!
//! One line per node, optionally followed by continuation lines for the
//! node's additional jobs:
//!
//! ```text
//! node01 down
//! node02 alice relax 4242 12:01:33 99.8 41.2 62.0 97.0 55.1 71.0 100 48.0 37.5
//! alice relax2 4250 03:10:09
//! node03 -- -- -- -- 0.3 2.1 38.0 0.0 0.0 31.0 100 45.0 12.0
//! ```

use compact_str::CompactString;

use super::error::{ParseWarning, SnapshotError};
use super::node::{JobInfo, Jobs, NodeMetrics, NodeState, NodeStates};
use super::{parse_reading, ClusterLayout};

const DOWN_TOKENS: usize = 2;
const CONTINUATION_TOKENS: usize = 4;
const NODE_TOKENS: usize = 14;

const METRIC_FIELDS: [&str; 9] = [
    "%CPU",
    "CPU-mem%",
    "CPU-temp",
    "%GPU",
    "GPU-mem%",
    "GPU-temp",
    "IB-speed",
    "IB-temp",
    "disk-used%",
];

#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotParse {
    pub nodes: NodeStates,
    pub warnings: Vec<ParseWarning>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ParserState {
    AwaitingNodeHeader,
    WithinNodeBlock(String),
    /// The header was rejected; its continuation lines are dropped with it.
    SkippingNodeBlock(String),
}

/// Parse a raw status snapshot into per-node state.
///
/// Lines with an unexpected token count become warnings, as do node lines
/// with unreadable metrics and the job lines that follow them. A
/// continuation line with no node header before it fails the whole
/// snapshot.
/// When a node appears twice the later line wins.
pub fn parse_snapshot(text: &str, layout: &ClusterLayout) -> Result<SnapshotParse, SnapshotError> {
    let mut nodes = NodeStates::default();
    let mut warnings = Vec::new();
    let mut state = ParserState::AwaitingNodeHeader;

    for (idx, line) in text.lines().enumerate() {
        let line_no = idx + 1;
        let tokens: Vec<&str> = line.split_whitespace().collect();

        // Continuations start with a user name, so the node prefix filter
        // does not apply to them.
        if tokens.len() == CONTINUATION_TOKENS {
            match &state {
                ParserState::AwaitingNodeHeader => {
                    return Err(SnapshotError::OrphanContinuation {
                        line: line_no,
                        text: line.trim().to_string(),
                    });
                }
                ParserState::WithinNodeBlock(node) => {
                    if let Some(NodeState::Up { jobs, .. }) = nodes.get_mut(node) {
                        let (pid, job) =
                            job_from_tokens(tokens[0], tokens[1], tokens[2], tokens[3]);
                        if job.user != layout.idle_user_sentinel {
                            jobs.insert(pid, job);
                        }
                    }
                }
                ParserState::SkippingNodeBlock(node) => {
                    let warning = ParseWarning::RejectedNodeContinuation {
                        line: line_no,
                        node: node.clone(),
                    };
                    tracing::warn!("Skipping snapshot line: {warning}");
                    warnings.push(warning);
                }
            }
            continue;
        }

        let Some(node) = tokens.first() else {
            continue;
        };
        if !node.starts_with(layout.node_prefix.as_str()) {
            continue;
        }

        match tokens.len() {
            DOWN_TOKENS => {
                nodes.insert(node.to_string(), NodeState::Down);
                state = ParserState::AwaitingNodeHeader;
            }
            NODE_TOKENS => match node_from_tokens(&tokens, line_no, layout) {
                Ok(node_state) => {
                    nodes.insert(node.to_string(), node_state);
                    state = ParserState::WithinNodeBlock(node.to_string());
                }
                Err(warning) => {
                    tracing::warn!("Skipping snapshot line: {warning}");
                    warnings.push(warning);
                    state = ParserState::SkippingNodeBlock(node.to_string());
                }
            },
            found => {
                let warning = ParseWarning::UnexpectedTokenCount {
                    line: line_no,
                    found,
                };
                tracing::warn!("Skipping snapshot line: {warning}");
                warnings.push(warning);
            }
        }
    }

    tracing::debug!(
        "Parsed snapshot: {} node(s), {} warning(s)",
        nodes.len(),
        warnings.len()
    );

    Ok(SnapshotParse { nodes, warnings })
}

fn job_from_tokens(
    user: &str,
    job_name: &str,
    pid: &str,
    time_used: &str,
) -> (CompactString, JobInfo) {
    (
        CompactString::from(pid),
        JobInfo {
            user: CompactString::from(user),
            job_name: job_name.to_string(),
            time_used: time_used.to_string(),
        },
    )
}

fn node_from_tokens(
    tokens: &[&str],
    line: usize,
    layout: &ClusterLayout,
) -> Result<NodeState, ParseWarning> {
    let mut values = [0.0f64; METRIC_FIELDS.len()];
    for (i, (raw, field)) in tokens[5..].iter().zip(METRIC_FIELDS).enumerate() {
        values[i] = parse_reading(raw).ok_or_else(|| ParseWarning::InvalidMetric {
            line,
            node: tokens[0].to_string(),
            field,
            value: raw.to_string(),
        })?;
    }
    let [
        cpu_util_pct,
        cpu_mem_pct,
        cpu_temp_c,
        gpu_util_pct,
        gpu_mem_pct,
        gpu_temp_c,
        ib_speed_gbps,
        ib_temp_c,
        disk_used_pct,
    ] = values;

    let (pid, job) = job_from_tokens(tokens[1], tokens[2], tokens[3], tokens[4]);
    let mut jobs = Jobs::new();
    // The scheduler prints its idle placeholder in the owner column.
    if job.user != layout.idle_user_sentinel {
        jobs.insert(pid, job);
    }

    Ok(NodeState::Up {
        jobs,
        metrics: NodeMetrics {
            cpu_util_pct,
            cpu_mem_pct,
            cpu_temp_c,
            gpu_util_pct,
            gpu_mem_pct,
            gpu_temp_c,
            ib_speed_gbps,
            ib_temp_c,
            disk_used_pct,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::node::NodeStatus;
    use crate::core::test_support::{header, layout};
    use proptest::prelude::*;

    #[test]
    fn test_parse_mixed_snapshot() {
        let text = format!(
            "Node User Job PID Time %CPU\n\
             node01 down\n\
             {}\n\
             alice relax2 4250 03:10:09\n\
             bob post 4251 00:00:09\n\
             {}\n",
            header("node02", "alice", "4242"),
            header("node03", "--", "--"),
        );

        let parsed = parse_snapshot(&text, &layout()).unwrap();
        assert!(parsed.warnings.is_empty());
        assert_eq!(parsed.nodes.len(), 3);

        assert_eq!(parsed.nodes.get("node01").unwrap().status(), NodeStatus::Down);

        let node02 = parsed.nodes.get("node02").unwrap();
        assert_eq!(node02.status(), NodeStatus::Exclusive);
        let jobs = node02.jobs().unwrap();
        assert_eq!(jobs.len(), 3);
        assert_eq!(jobs["4250"].job_name, "relax2");
        assert_eq!(jobs["4251"].user, "bob");

        let node03 = parsed.nodes.get("node03").unwrap();
        assert_eq!(node03.status(), NodeStatus::Free);
        assert!(node03.jobs().unwrap().is_empty());
    }

    #[test]
    fn test_metrics_map_positionally() {
        let text = "node05 carol md 7 00:01:00 1 2 3 4 5 6 7 8 9\n";
        let parsed = parse_snapshot(text, &layout()).unwrap();
        let metrics = *parsed.nodes.get("node05").unwrap().metrics().unwrap();
        assert_eq!(
            metrics,
            NodeMetrics {
                cpu_util_pct: 1.0,
                cpu_mem_pct: 2.0,
                cpu_temp_c: 3.0,
                gpu_util_pct: 4.0,
                gpu_mem_pct: 5.0,
                gpu_temp_c: 6.0,
                ib_speed_gbps: 7.0,
                ib_temp_c: 8.0,
                disk_used_pct: 9.0,
            }
        );
    }

    #[test]
    fn test_unexpected_token_count_is_a_warning() {
        let text = format!(
            "node01 what is\n{}\nnode09 a b c d e f g\n",
            header("node02", "alice", "1")
        );
        let parsed = parse_snapshot(&text, &layout()).unwrap();

        assert_eq!(parsed.nodes.len(), 1);
        assert_eq!(
            parsed.warnings,
            vec![
                ParseWarning::UnexpectedTokenCount { line: 1, found: 3 },
                ParseWarning::UnexpectedTokenCount { line: 3, found: 8 },
            ]
        );
    }

    #[test]
    fn test_warning_keeps_node_context() {
        let text = format!(
            "{}\nnode02 noise x y z w\nbob extra 2 00:00:05\n",
            header("node01", "alice", "1")
        );
        let parsed = parse_snapshot(&text, &layout()).unwrap();
        let jobs = parsed.nodes.get("node01").unwrap().jobs().unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(parsed.warnings.len(), 1);
    }

    #[test]
    fn test_orphan_continuation_is_fatal() {
        let text = "alice job 1234 00:01:00\n";
        let err = parse_snapshot(text, &layout()).unwrap_err();
        assert_eq!(
            err,
            SnapshotError::OrphanContinuation {
                line: 1,
                text: "alice job 1234 00:01:00".to_string()
            }
        );
    }

    #[test]
    fn test_continuation_after_down_node_is_fatal() {
        let text = format!(
            "{}\nnode02 down\nalice job 1234 00:01:00\n",
            header("node01", "bob", "9")
        );
        let err = parse_snapshot(&text, &layout()).unwrap_err();
        assert!(matches!(
            err,
            SnapshotError::OrphanContinuation { line: 3, .. }
        ));
    }

    #[test]
    fn test_invalid_metric_drops_node_block() {
        let text = format!(
            "node01 bob job 9 00:01:00 1 2 N/A 4 5 6 7 8 9\n\
             bob job2 10 00:01:00\n\
             node02 down\n\
             {}\n\
             carol job3 11 00:02:00\n",
            header("node03", "alice", "12")
        );
        let parsed = parse_snapshot(&text, &layout()).unwrap();

        assert!(parsed.nodes.get("node01").is_none());
        assert!(parsed.nodes.get("node02").unwrap().is_down());
        assert_eq!(parsed.nodes.get("node03").unwrap().jobs().unwrap().len(), 2);
        assert_eq!(
            parsed.warnings,
            vec![
                ParseWarning::InvalidMetric {
                    line: 1,
                    node: "node01".to_string(),
                    field: "CPU-temp",
                    value: "N/A".to_string(),
                },
                ParseWarning::RejectedNodeContinuation {
                    line: 2,
                    node: "node01".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_continuation_after_down_following_rejected_node_is_fatal() {
        let text = "node01 bob job 9 00:01:00 1 2 N/A 4 5 6 7 8 9\n\
                    node02 down\n\
                    bob job2 10 00:01:00\n";
        let err = parse_snapshot(text, &layout()).unwrap_err();
        assert!(matches!(
            err,
            SnapshotError::OrphanContinuation { line: 3, .. }
        ));
    }

    #[test]
    fn test_non_finite_metrics_are_rejected() {
        for raw in ["NaN", "inf", "-inf"] {
            let text = format!("node01 alice j 1 00:01:00 1 2 {raw} 4 5 6 7 8 9\n");
            let parsed = parse_snapshot(&text, &layout()).unwrap();
            assert!(parsed.nodes.is_empty());
            assert_eq!(
                parsed.warnings,
                vec![ParseWarning::InvalidMetric {
                    line: 1,
                    node: "node01".to_string(),
                    field: "CPU-temp",
                    value: raw.to_string(),
                }]
            );
        }
    }

    #[test]
    fn test_foreign_nodes_are_ignored() {
        let text = format!("{}\nlogin1 down\n", header("other01", "alice", "1"));
        let parsed = parse_snapshot(&text, &layout()).unwrap();
        assert!(parsed.nodes.is_empty());
        assert!(parsed.warnings.is_empty());
    }

    #[test]
    fn test_later_line_wins_for_duplicate_node() {
        let text = format!("{}\nnode01 down\n", header("node01", "alice", "1"));
        let parsed = parse_snapshot(&text, &layout()).unwrap();
        assert!(parsed.nodes.get("node01").unwrap().is_down());
    }

    fn snapshot_line() -> impl Strategy<Value = String> {
        prop_oneof![
            (1u32..20).prop_map(|n| format!("node{n:02} down")),
            (1u32..20, 0u32..3, 1u32..9999).prop_map(|(n, u, pid)| {
                let user = ["alice", "bob", "--"][u as usize];
                header(&format!("node{n:02}"), user, &pid.to_string())
            }),
            (0u32..3, 1u32..9999).prop_map(|(u, pid)| {
                let user = ["alice", "bob", "carol"][u as usize];
                format!("{user} extra {pid} 00:00:01")
            }),
            Just("garbage line with too many tokens here".to_string()),
        ]
    }

    proptest! {
        /// Parsing is a pure function of the text
        #[test]
        fn prop_parse_is_idempotent(lines in prop::collection::vec(snapshot_line(), 0..30)) {
            let text = lines.join("\n");
            let first = parse_snapshot(&text, &layout());
            let second = parse_snapshot(&text, &layout());
            prop_assert_eq!(first, second);
        }

        /// A node is Down exactly when its last line carried no metrics
        #[test]
        fn prop_down_iff_no_metrics(lines in prop::collection::vec(snapshot_line(), 0..30)) {
            let text = lines.join("\n");
            if let Ok(parsed) = parse_snapshot(&text, &layout()) {
                for (name, state) in parsed.nodes.iter() {
                    let last = lines
                        .iter()
                        .rev()
                        .find(|l| l.split_whitespace().next() == Some(name.as_str()))
                        .unwrap();
                    let had_metrics = last.split_whitespace().count() == NODE_TOKENS;
                    prop_assert_eq!(state.is_down(), !had_metrics);
                    prop_assert_eq!(state.metrics().is_some(), had_metrics);
                }
            }
        }
    }
}
