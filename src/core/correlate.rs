//! Cross-references scheduler job ownership against live processes.

use compact_str::CompactString;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};

use super::node::NodeStates;
use super::process::{JobIndex, UserProcesses};
use super::ClusterLayout;

/// Flagged processes per user. Users with nothing flagged are left out.
pub type FlaggedProcesses = BTreeMap<CompactString, UserProcesses>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NonManagedNode {
    /// Users holding a scheduler job on the node
    pub owners: BTreeSet<CompactString>,
    pub users: FlaggedProcesses,
}

/// Processes on the login node using more than `cpu_limit` percent of a
/// core or more than `mem_limit` percent of memory.
pub fn login_node_hogs(
    index: &JobIndex,
    login_node: &str,
    cpu_limit: f64,
    mem_limit: f64,
) -> FlaggedProcesses {
    let Some(users) = index.node(login_node) else {
        return FlaggedProcesses::new();
    };

    users
        .iter()
        .filter_map(|(user, procs)| {
            let hogs: UserProcesses = procs
                .iter()
                .filter(|(_, p)| p.cpu_pct > cpu_limit || p.mem_pct > mem_limit)
                .map(|(pid, p)| (pid.clone(), p.clone()))
                .collect();
            (!hogs.is_empty()).then(|| (user.clone(), hogs))
        })
        .collect()
}

/// Processes on compute nodes belonging to local accounts that hold no
/// scheduler job there.
///
/// Only nodes that are up in `current` are checked; the login node is
/// skipped. Commands listed in `layout.excluded_commands` are never
/// flagged.
pub fn non_managed_processes(
    current: &NodeStates,
    index: &JobIndex,
    valid_users: &HashSet<String>,
    layout: &ClusterLayout,
) -> BTreeMap<String, NonManagedNode> {
    let mut flagged = BTreeMap::new();

    for (node, state) in current.iter() {
        if state.is_down() || layout.login_node.as_deref() == Some(node.as_str()) {
            continue;
        }
        let Some(live) = index.node(node) else {
            continue;
        };

        let owners = state.job_owners();
        let users: FlaggedProcesses = live
            .iter()
            .filter(|(user, _)| valid_users.contains(user.as_str()) && !owners.contains(*user))
            .filter_map(|(user, procs)| {
                let rogue: UserProcesses = procs
                    .iter()
                    .filter(|(_, p)| !p.runs_any_of(&layout.excluded_commands))
                    .map(|(pid, p)| (pid.clone(), p.clone()))
                    .collect();
                (!rogue.is_empty()).then(|| (user.clone(), rogue))
            })
            .collect();

        if !users.is_empty() {
            tracing::debug!("{} has {} non-managed user(s)", node, users.len());
            flagged.insert(node.clone(), NonManagedNode { owners, users });
        }
    }

    flagged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::process::build_job_index;
    use crate::core::snapshot::parse_snapshot;
    use crate::core::test_support::{header, layout};

    fn valid(names: &[&str]) -> HashSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn login_index(cpu: f64, mem: f64) -> JobIndex {
        let text = format!("node0: dave 100 {cpu} {mem} 00:05:00 python big.py\n");
        build_job_index(&text, &layout()).index
    }

    #[test]
    fn test_login_node_limits() {
        assert_eq!(login_node_hogs(&login_index(101.0, 10.0), "node0", 100.0, 25.0).len(), 1);
        assert!(login_node_hogs(&login_index(50.0, 10.0), "node0", 100.0, 25.0).is_empty());
        assert_eq!(login_node_hogs(&login_index(50.0, 26.0), "node0", 100.0, 25.0).len(), 1);
        assert!(login_node_hogs(&login_index(100.0, 25.0), "node0", 100.0, 25.0).is_empty());
    }

    #[test]
    fn test_login_node_prunes_quiet_users() {
        let text = "node0: dave 1 150.0 1.0 00:05:00 make\n\
                    node0: erin 2 1.0 1.0 00:00:01 vim\n";
        let index = build_job_index(text, &layout()).index;
        let hogs = login_node_hogs(&index, "node0", 100.0, 25.0);
        assert_eq!(hogs.keys().collect::<Vec<_>>(), vec!["dave"]);
        assert!(login_node_hogs(&index, "node99", 100.0, 25.0).is_empty());
    }

    fn cluster() -> NodeStates {
        let text = format!(
            "{}\n{}\nnode3 down\n",
            header("node1", "alice", "10"),
            header("node2", "--", "--")
        );
        parse_snapshot(&text, &layout()).unwrap().nodes
    }

    #[test]
    fn test_job_owner_is_never_flagged() {
        let index = build_job_index(
            "node1: alice 10 100.0 5.0 01:00:00 python train.py\n\
             node1: alice 11 80.0 5.0 00:30:00 python side.py\n",
            &layout(),
        )
        .index;
        let flagged = non_managed_processes(&cluster(), &index, &valid(&["alice"]), &layout());
        assert!(flagged.is_empty());
    }

    #[test]
    fn test_local_user_without_job_is_flagged() {
        let index = build_job_index(
            "node1: bob 20 100.0 5.0 01:00:00 ./solver\n\
             node1: bob 21 0.0 0.1 00:00:00 nvidia-cuda-mps-server\n\
             node1: root 1 0.0 0.0 00:00:10 /sbin/init\n",
            &layout(),
        )
        .index;
        let flagged = non_managed_processes(&cluster(), &index, &valid(&["alice", "bob"]), &layout());

        let node1 = &flagged["node1"];
        assert_eq!(node1.owners.iter().collect::<Vec<_>>(), vec!["alice"]);
        assert_eq!(node1.users.len(), 1);
        let bob = &node1.users["bob"];
        assert_eq!(bob.keys().collect::<Vec<_>>(), vec!["20"]);
    }

    #[test]
    fn test_excluded_command_alone_is_not_flagged() {
        let index = build_job_index(
            "node2: bob 21 0.0 0.1 00:00:00 nvidia-cuda-mps-server\n",
            &layout(),
        )
        .index;
        let flagged = non_managed_processes(&cluster(), &index, &valid(&["bob"]), &layout());
        assert!(flagged.is_empty());
    }

    #[test]
    fn test_down_and_login_nodes_are_skipped() {
        let mut layout = layout();
        layout.login_node = Some("node2".to_string());
        let index = build_job_index(
            "node2: bob 20 100.0 5.0 01:00:00 ./solver\n\
             node3: bob 22 100.0 5.0 01:00:00 ./solver\n",
            &layout,
        )
        .index;
        let flagged = non_managed_processes(&cluster(), &index, &valid(&["bob"]), &layout);
        assert!(flagged.is_empty());
    }
}
