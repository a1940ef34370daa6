use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::str::FromStr;
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};

use super::correlate::{FlaggedProcesses, NonManagedNode};
use super::detect::{DownNodes, MetricViolations};

/// Stable identifiers of the detection rules.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Display,
    EnumIter,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Rule {
    NodeDown,
    CpuHighTemp,
    GpuHighTemp,
    IbHighTemp,
    IbLowSpeed,
    DiskHighUsage,
    LoginNodeResourceHog,
    NonManagedProcess,
}

/// How a downstream reporter should render an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, EnumIter)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ReportShape {
    Down,
    Temperature,
    Speed,
    Usage,
    Resource,
    Ownership,
}

/// The threshold rules, the only ones whose events carry
/// [`MetricViolations`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter)]
pub enum MetricRule {
    CpuHighTemp,
    GpuHighTemp,
    IbHighTemp,
    IbLowSpeed,
    DiskHighUsage,
}

impl From<MetricRule> for Rule {
    fn from(rule: MetricRule) -> Self {
        match rule {
            MetricRule::CpuHighTemp => Rule::CpuHighTemp,
            MetricRule::GpuHighTemp => Rule::GpuHighTemp,
            MetricRule::IbHighTemp => Rule::IbHighTemp,
            MetricRule::IbLowSpeed => Rule::IbLowSpeed,
            MetricRule::DiskHighUsage => Rule::DiskHighUsage,
        }
    }
}

impl Rule {
    pub fn shape(self) -> ReportShape {
        match self {
            Rule::NodeDown => ReportShape::Down,
            Rule::CpuHighTemp | Rule::GpuHighTemp | Rule::IbHighTemp => ReportShape::Temperature,
            Rule::IbLowSpeed => ReportShape::Speed,
            Rule::DiskHighUsage => ReportShape::Usage,
            Rule::LoginNodeResourceHog => ReportShape::Resource,
            Rule::NonManagedProcess => ReportShape::Ownership,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Violations {
    Down(DownNodes),
    Metric(MetricViolations),
    LoginNode(FlaggedProcesses),
    NonManaged(BTreeMap<String, NonManagedNode>),
}

impl Violations {
    /// Number of offending nodes, or users for the login node rule.
    pub fn len(&self) -> usize {
        match self {
            Violations::Down(v) => v.len(),
            Violations::Metric(v) => v.len(),
            Violations::LoginNode(v) => v.len(),
            Violations::NonManaged(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub rule: Rule,
    pub shape: ReportShape,
    pub violations: Violations,
}

impl Event {
    pub fn node_down(nodes: DownNodes) -> Self {
        Self::new(Rule::NodeDown, Violations::Down(nodes))
    }

    pub fn metric(rule: MetricRule, nodes: MetricViolations) -> Self {
        Self::new(rule.into(), Violations::Metric(nodes))
    }

    pub fn login_node(users: FlaggedProcesses) -> Self {
        Self::new(Rule::LoginNodeResourceHog, Violations::LoginNode(users))
    }

    pub fn non_managed(nodes: BTreeMap<String, NonManagedNode>) -> Self {
        Self::new(Rule::NonManagedProcess, Violations::NonManaged(nodes))
    }

    fn new(rule: Rule, violations: Violations) -> Self {
        Self {
            rule,
            shape: rule.shape(),
            violations,
        }
    }
}

/// Selects which rules are reported. `"*"` enables all of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleMatcher {
    All,
    Set(HashSet<Rule>),
}

impl RuleMatcher {
    pub fn from_names(names: &[String]) -> anyhow::Result<Self> {
        if names.iter().any(|n| n.trim() == "*") {
            return Ok(Self::All);
        }
        let set = names
            .iter()
            .map(|n| n.trim())
            .filter(|n| !n.is_empty())
            .map(|n| {
                Rule::from_str(&n.to_lowercase()).map_err(|_| {
                    anyhow::anyhow!(
                        "unknown rule '{n}', expected one of: {}",
                        Rule::iter().map(|r| r.to_string()).collect::<Vec<_>>().join(", ")
                    )
                })
            })
            .collect::<anyhow::Result<HashSet<Rule>>>()?;
        if set.is_empty() {
            Ok(Self::All)
        } else {
            Ok(Self::Set(set))
        }
    }

    pub fn matches(&self, rule: Rule) -> bool {
        match self {
            Self::All => true,
            Self::Set(set) => set.contains(&rule),
        }
    }
}

/// All events of one detection run, in rule order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct EventSet {
    events: Vec<Event>,
}

impl EventSet {
    /// Add an event unless it has no violations.
    pub fn record(&mut self, event: Event) {
        if event.violations.is_empty() {
            return;
        }
        tracing::debug!("{}: {} violation(s)", event.rule, event.violations.len());
        self.events.push(event);
    }

    pub fn get(&self, rule: Rule) -> Option<&Event> {
        self.events.iter().find(|e| e.rule == rule)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn retain_rules(&mut self, matcher: &RuleMatcher) {
        self.events.retain(|e| matcher.matches(e.rule));
    }
}
