use std::process::ExitCode;

use anyhow::{Context, Result};
use nodewatch::config::Config;
use nodewatch::core::detect::{MetricViolation, Thresholds};
use nodewatch::core::event::{Event, ReportShape, Violations};
use nodewatch::core::process::UserProcesses;
use nodewatch::core::{detect_events, Detection};
use nodewatch::inputs::{load_valid_users, read_input, valid_users_from_home};
use nodewatch::utils::{format_jobs, format_value};
use owo_colors::OwoColorize;
use serde::Serialize;
use tabled::{builder::Builder, settings::style::Style};

use crate::cli::{CheckArgs, OutputFormat};

/// Exit status when `--fail-on-events` is set and something was found.
const EVENTS_FOUND: u8 = 2;

#[derive(Serialize)]
struct Report<'a> {
    generated_at: String,
    version: &'static str,
    thresholds: Thresholds,
    #[serde(flatten)]
    detection: &'a Detection,
}

pub fn handle_check(config: &Config, args: CheckArgs) -> Result<ExitCode> {
    let matcher = config.rules.matcher()?;
    let layout = config.cluster.layout();
    let thresholds = config.thresholds.thresholds();

    // Read everything before detecting anything.
    let current = read_input(&args.current, "current snapshot")?;
    let previous = read_input(&args.previous, "previous snapshot")?;
    let processes = read_input(&args.processes, "process listing")?;
    let valid_users = match (&args.users, &args.home_root) {
        (Some(path), _) => load_valid_users(path)?,
        (None, Some(root)) => valid_users_from_home(root)?,
        (None, None) => valid_users_from_home(&config.cluster.home_root)?,
    };

    let mut detection = detect_events(
        &layout,
        &current,
        &previous,
        &processes,
        &valid_users,
        &thresholds,
    )
    .context("Detection aborted")?;
    detection.events.retain_rules(&matcher);
    for w in &detection.warnings {
        tracing::warn!("{} input: {}", w.input, w.warning);
    }

    match args.format {
        OutputFormat::Json => {
            let report = Report {
                generated_at: chrono::Utc::now()
                    .to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
                version: env!("CARGO_PKG_VERSION"),
                thresholds,
                detection: &detection,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Table => print_table(&detection),
    }

    if args.fail_on_events && !detection.events.is_empty() {
        return Ok(ExitCode::from(EVENTS_FOUND));
    }
    Ok(ExitCode::SUCCESS)
}

fn print_table(detection: &Detection) {
    if detection.events.is_empty() {
        println!("No events detected.");
        return;
    }

    let mut builder = Builder::default();
    builder.push_record(["Rule", "Node", "User", "Value", "Detail"]);
    for event in detection.events.iter() {
        for row in event_rows(event) {
            builder.push_record(row);
        }
    }

    let table = builder.build().with(Style::rounded()).to_string();
    println!("{}", table);
}

fn event_rows(event: &Event) -> Vec<[String; 5]> {
    let rule = colored_rule(event);
    match &event.violations {
        Violations::Down(nodes) => nodes
            .iter()
            .map(|(node, jobs)| {
                [
                    rule.clone(),
                    node.clone(),
                    "-".to_string(),
                    "down".to_string(),
                    format!("was running: {}", format_jobs(jobs)),
                ]
            })
            .collect(),
        Violations::Metric(nodes) => nodes
            .iter()
            .map(|(node, v)| {
                [
                    rule.clone(),
                    node.clone(),
                    "-".to_string(),
                    metric_value(event.shape, v),
                    format!("jobs: {}", format_jobs(&v.jobs)),
                ]
            })
            .collect(),
        Violations::LoginNode(users) => users
            .iter()
            .flat_map(|(user, procs)| process_rows(&rule, "login", user, procs))
            .collect(),
        Violations::NonManaged(nodes) => nodes
            .iter()
            .flat_map(|(node, flagged)| {
                let owners = flagged
                    .owners
                    .iter()
                    .map(|o| o.as_str())
                    .collect::<Vec<_>>()
                    .join(",");
                flagged
                    .users
                    .iter()
                    .flat_map(|(user, procs)| process_rows(&rule, node, user, procs))
                    .map(|mut row| {
                        row[4] = format!("{} [job owners: {}]", row[4], owners);
                        row
                    })
                    .collect::<Vec<_>>()
            })
            .collect(),
    }
}

fn process_rows(rule: &str, node: &str, user: &str, procs: &UserProcesses) -> Vec<[String; 5]> {
    procs
        .values()
        .map(|p| {
            [
                rule.to_string(),
                node.to_string(),
                user.to_string(),
                format!("{}% cpu, {}% mem", format_value(p.cpu_pct), format_value(p.mem_pct)),
                format!("pid {} {}", p.pid, p.command_line()),
            ]
        })
        .collect()
}

fn metric_value(shape: ReportShape, v: &MetricViolation) -> String {
    let unit = match shape {
        ReportShape::Temperature => "°C",
        ReportShape::Speed => " Gbps",
        ReportShape::Usage => "%",
        ReportShape::Down | ReportShape::Resource | ReportShape::Ownership => "",
    };
    format!(
        "{}{unit} (limit {}{unit})",
        format_value(v.value),
        format_value(v.limit)
    )
}

fn colored_rule(event: &Event) -> String {
    match event.shape {
        ReportShape::Down => event.rule.red().bold().to_string(),
        ReportShape::Ownership | ReportShape::Resource => event.rule.magenta().to_string(),
        _ => event.rule.yellow().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodewatch::core::detect::MetricViolations;
    use nodewatch::core::event::MetricRule;
    use nodewatch::core::node::Jobs;

    #[test]
    fn test_metric_rows() {
        let event = Event::metric(
            MetricRule::IbLowSpeed,
            MetricViolations::from([(
                "node4".to_string(),
                MetricViolation {
                    value: 56.0,
                    limit: 100.0,
                    jobs: Jobs::new(),
                },
            )]),
        );
        let rows = event_rows(&event);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][1], "node4");
        assert_eq!(rows[0][3], "56 Gbps (limit 100 Gbps)");
        assert_eq!(rows[0][4], "jobs: -");
    }
}
