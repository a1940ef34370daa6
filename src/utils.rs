use clap::builder::{
    styling::{AnsiColor, Effects},
    Styles,
};

use crate::core::node::Jobs;

/// Format scheduler jobs for display as `user:job(pid)`, one per entry.
///
/// # Examples
///
/// ```
/// use nodewatch::core::node::{JobInfo, Jobs};
/// use nodewatch::utils::format_jobs;
///
/// let jobs = Jobs::from([(
///     "4242".into(),
///     JobInfo { user: "alice".into(), job_name: "relax".into(), time_used: "01:00:00".into() },
/// )]);
/// assert_eq!(format_jobs(&jobs), "alice:relax(4242)");
/// assert_eq!(format_jobs(&Jobs::new()), "-");
/// ```
pub fn format_jobs(jobs: &Jobs) -> String {
    if jobs.is_empty() {
        return "-".to_string();
    }
    jobs.iter()
        .map(|(pid, job)| format!("{}:{}({})", job.user, job.job_name, pid))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Format a metric value, dropping the fraction when it is zero.
///
/// # Examples
///
/// ```
/// use nodewatch::utils::format_value;
///
/// assert_eq!(format_value(100.0), "100");
/// assert_eq!(format_value(65.27), "65.3");
/// ```
pub fn format_value(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        format!("{value:.1}")
    }
}

pub const STYLES: Styles = Styles::styled()
    .header(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .usage(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .literal(AnsiColor::Cyan.on_default().effects(Effects::BOLD))
    .placeholder(AnsiColor::Cyan.on_default());
