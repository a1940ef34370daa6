pub mod correlate;
pub mod detect;
pub mod error;
pub mod event;
pub mod node;
pub mod process;
pub mod snapshot;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use strum::Display;

use self::correlate::{login_node_hogs, non_managed_processes};
use self::detect::Thresholds;
use self::error::{DetectError, ParseWarning};
use self::event::{Event, EventSet, MetricRule};
use self::process::build_job_index;
use self::snapshot::parse_snapshot;

const VERSION_MESSAGE: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("VERGEN_BUILD_TIMESTAMP"),
    ")\n",
    "Target: ",
    env!("VERGEN_CARGO_TARGET_TRIPLE"),
    "\nBranch: ",
    env!("VERGEN_GIT_BRANCH"),
    "\nCommit: ",
    env!("VERGEN_GIT_SHA"),
);

pub fn version() -> &'static str {
    VERSION_MESSAGE
}

pub fn get_config_dir() -> anyhow::Result<PathBuf> {
    dirs::config_dir()
        .ok_or_else(|| anyhow::anyhow!("Failed to get config directory"))
        .map(|p| p.join("nodewatch"))
}

/// Parse a numeric reading. `NaN` and infinities compare false against
/// every limit, so they are rejected like any other non-number.
pub(crate) fn parse_reading(raw: &str) -> Option<f64> {
    raw.parse::<f64>().ok().filter(|value| value.is_finite())
}

/// Site-specific naming and exclusions shared by the parsers and the correlator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterLayout {
    /// Every node name starts with this prefix (e.g. `"eureka"`)
    pub node_prefix: String,
    /// Owner token the scheduler prints for an idle slot
    pub idle_user_sentinel: String,
    /// Interactive node that never runs scheduled jobs
    pub login_node: Option<String>,
    /// Background services that may run on compute nodes without a job
    pub excluded_commands: Vec<String>,
}

/// Which raw input a warning came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum InputKind {
    Current,
    Previous,
    Processes,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourcedWarning {
    pub input: InputKind,
    pub warning: ParseWarning,
}

/// Result of one detection cycle.
#[derive(Debug, Clone, Serialize)]
pub struct Detection {
    pub events: EventSet,
    pub warnings: Vec<SourcedWarning>,
}

/// Run one full detection cycle over raw inputs.
///
/// Both snapshots are parsed before any detector runs, so a structurally
/// invalid snapshot yields an error and no partial event set.
pub fn detect_events(
    layout: &ClusterLayout,
    current_raw: &str,
    previous_raw: &str,
    live_process_raw: &str,
    valid_users: &HashSet<String>,
    thresholds: &Thresholds,
) -> Result<Detection, DetectError> {
    let current = parse_snapshot(current_raw, layout).map_err(|source| DetectError::Snapshot {
        input: InputKind::Current,
        source,
    })?;
    let previous = parse_snapshot(previous_raw, layout).map_err(|source| DetectError::Snapshot {
        input: InputKind::Previous,
        source,
    })?;
    let processes = build_job_index(live_process_raw, layout);

    let warnings: Vec<SourcedWarning> = [
        (InputKind::Current, current.warnings),
        (InputKind::Previous, previous.warnings),
        (InputKind::Processes, processes.warnings),
    ]
    .into_iter()
    .flat_map(|(input, warnings)| {
        warnings
            .into_iter()
            .map(move |warning| SourcedWarning { input, warning })
    })
    .collect();

    let current = current.nodes;
    let previous = previous.nodes;
    let index = processes.index;

    let mut events = EventSet::default();
    events.record(Event::node_down(detect::node_down(&current, &previous)));
    events.record(Event::metric(
        MetricRule::CpuHighTemp,
        detect::cpu_high_temp(&current, thresholds.cpu_temp_limit),
    ));
    events.record(Event::metric(
        MetricRule::GpuHighTemp,
        detect::gpu_high_temp(&current, thresholds.gpu_temp_limit),
    ));
    events.record(Event::metric(
        MetricRule::IbHighTemp,
        detect::ib_high_temp(&current, thresholds.ib_temp_limit),
    ));
    events.record(Event::metric(
        MetricRule::IbLowSpeed,
        detect::ib_low_speed(&current, thresholds.ib_min_speed),
    ));
    events.record(Event::metric(
        MetricRule::DiskHighUsage,
        detect::disk_high_usage(&current, thresholds.disk_usage_limit),
    ));

    if let Some(login_node) = layout.login_node.as_deref() {
        events.record(Event::login_node(login_node_hogs(
            &index,
            login_node,
            thresholds.login_cpu_pct_limit,
            thresholds.login_mem_pct_limit,
        )));
    }
    events.record(Event::non_managed(non_managed_processes(
        &current,
        &index,
        valid_users,
        layout,
    )));

    tracing::info!(
        "Detection finished: {} node(s) now, {} before, {} event(s), {} warning(s)",
        current.len(),
        previous.len(),
        events.len(),
        warnings.len()
    );

    Ok(Detection { events, warnings })
}
