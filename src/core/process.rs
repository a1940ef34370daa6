use compact_str::CompactString;
use serde::Serialize;
use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::path::Path;

use super::error::ParseWarning;
use super::{parse_reading, ClusterLayout};

/// `<node><suffix> user pid %cpu %mem time command...`
const MIN_PROCESS_COLUMNS: usize = 7;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessRecord {
    pub user: CompactString,
    pub pid: CompactString,
    pub cpu_pct: f64,
    pub mem_pct: f64,
    pub time: String,
    pub command: SmallVec<[String; 4]>,
}

impl ProcessRecord {
    /// Whether the executable is one of `names`, compared either as
    /// written or by file name.
    pub fn runs_any_of(&self, names: &[String]) -> bool {
        let Some(exe) = self.command.first() else {
            return false;
        };
        let base = Path::new(exe)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(exe);
        names.iter().any(|name| name == exe || name == base)
    }

    pub fn command_line(&self) -> String {
        self.command.join(" ")
    }
}

/// A user's processes on one node, keyed by PID.
pub type UserProcesses = BTreeMap<CompactString, ProcessRecord>;

/// Live processes of the cluster: node → user → PID → record.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct JobIndex(BTreeMap<String, BTreeMap<CompactString, UserProcesses>>);

impl JobIndex {
    pub fn node(&self, node: &str) -> Option<&BTreeMap<CompactString, UserProcesses>> {
        self.0.get(node)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn process_count(&self) -> usize {
        self.0
            .values()
            .flat_map(|users| users.values())
            .map(BTreeMap::len)
            .sum()
    }

    fn insert(&mut self, node: &str, record: ProcessRecord) {
        self.0
            .entry(node.to_string())
            .or_default()
            .entry(record.user.clone())
            .or_default()
            .insert(record.pid.clone(), record);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobIndexBuild {
    pub index: JobIndex,
    pub warnings: Vec<ParseWarning>,
}

/// Build the job index from a merged, node-prefixed process listing.
///
/// The first column is the node name followed by a one-character
/// separator, as written by parallel shells (`node01: alice 4242 ...`).
pub fn build_job_index(text: &str, layout: &ClusterLayout) -> JobIndexBuild {
    let mut index = JobIndex::default();
    let mut warnings = Vec::new();

    for (idx, line) in text.lines().enumerate() {
        let line_no = idx + 1;
        let columns: Vec<&str> = line.split_whitespace().collect();

        let Some(first) = columns.first() else {
            continue;
        };
        if !first.starts_with(layout.node_prefix.as_str()) {
            continue;
        }
        let node = strip_node_suffix(first);

        if columns
            .get(1)
            .is_some_and(|user| user.eq_ignore_ascii_case("user"))
        {
            continue;
        }

        match record_from_columns(&columns, line_no) {
            Ok(record) => index.insert(node, record),
            Err(warning) => {
                tracing::warn!("Skipping process line: {warning}");
                warnings.push(warning);
            }
        }
    }

    tracing::debug!(
        "Built job index: {} process(es), {} warning(s)",
        index.process_count(),
        warnings.len()
    );

    JobIndexBuild { index, warnings }
}

fn strip_node_suffix(column: &str) -> &str {
    let mut chars = column.chars();
    chars.next_back();
    chars.as_str()
}

fn record_from_columns(columns: &[&str], line: usize) -> Result<ProcessRecord, ParseWarning> {
    if columns.len() < MIN_PROCESS_COLUMNS {
        return Err(ParseWarning::ShortProcessLine {
            line,
            found: columns.len().saturating_sub(1),
        });
    }

    let percent = |field: &'static str, raw: &str| {
        parse_reading(raw).ok_or_else(|| ParseWarning::InvalidProcessField {
            line,
            field,
            value: raw.to_string(),
        })
    };

    Ok(ProcessRecord {
        user: CompactString::from(columns[1]),
        pid: CompactString::from(columns[2]),
        cpu_pct: percent("%cpu", columns[3])?,
        mem_pct: percent("%mem", columns[4])?,
        time: columns[5].to_string(),
        command: columns[6..].iter().map(|s| s.to_string()).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_support::layout;

    const LISTING: &str = "\
node01: USER                 PID %CPU %MEM     TIME COMMAND
node01: root                   1  0.0  0.0 00:00:12 /sbin/init
node01: alice               4242 99.5  3.2 12:01:33 python train.py --epochs 10
node01: alice               4250  0.1  0.0 00:00:01 bash
node02: bob                  777 12.0  1.0 00:10:00 ./a.out
login1: carol                  9 50.0  1.0 00:10:00 vim
";

    #[test]
    fn test_build_job_index() {
        let built = build_job_index(LISTING, &layout());
        assert!(built.warnings.is_empty());
        assert_eq!(built.index.process_count(), 4);
        assert_eq!(built.index.nodes().collect::<Vec<_>>(), vec!["node01", "node02"]);

        let node01 = built.index.node("node01").unwrap();
        assert_eq!(node01.len(), 2);
        let train = &node01["alice"]["4242"];
        assert_eq!(train.cpu_pct, 99.5);
        assert_eq!(train.mem_pct, 3.2);
        assert_eq!(train.time, "12:01:33");
        assert_eq!(train.command_line(), "python train.py --epochs 10");
    }

    #[test]
    fn test_bad_process_lines_are_warnings() {
        let text = "node01: alice 1 2.0\nnode01: alice 2 lots 1.0 00:00:01 yes\n";
        let built = build_job_index(text, &layout());
        assert_eq!(built.index.process_count(), 0);
        assert_eq!(
            built.warnings,
            vec![
                ParseWarning::ShortProcessLine { line: 1, found: 3 },
                ParseWarning::InvalidProcessField {
                    line: 2,
                    field: "%cpu",
                    value: "lots".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_non_finite_usage_is_rejected() {
        let text = "node01: alice 1 NaN 1.0 00:00:01 yes\n\
                    node01: alice 2 1.0 inf 00:00:01 yes\n";
        let built = build_job_index(text, &layout());
        assert_eq!(built.index.process_count(), 0);
        assert_eq!(
            built.warnings,
            vec![
                ParseWarning::InvalidProcessField {
                    line: 1,
                    field: "%cpu",
                    value: "NaN".to_string()
                },
                ParseWarning::InvalidProcessField {
                    line: 2,
                    field: "%mem",
                    value: "inf".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_runs_any_of_matches_file_name() {
        let built = build_job_index(
            "node01: alice 5 0.0 0.1 00:00:00 /usr/bin/nvidia-cuda-mps-server -d\n\
             node01: alice 6 0.0 0.1 00:00:00 nvidia-smi\n",
            &layout(),
        );
        let procs = &built.index.node("node01").unwrap()["alice"];
        let names = vec!["nvidia-cuda-mps-server".to_string()];
        assert!(procs["5"].runs_any_of(&names));
        assert!(!procs["6"].runs_any_of(&names));
    }
}
