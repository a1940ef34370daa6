use crate::core::detect::Thresholds;
use crate::core::event::RuleMatcher;
use crate::core::{get_config_dir, ClusterLayout};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Deserialize, Serialize, Debug, Default, Clone)]
pub struct Config {
    #[serde(default)]
    pub cluster: ClusterConfig,
    #[serde(default)]
    pub thresholds: ThresholdsConfig,
    #[serde(default)]
    pub rules: RulesConfig,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ClusterConfig {
    /// Prefix shared by all node names
    #[serde(default = "default_node_prefix")]
    pub node_prefix: String,
    /// Owner token the scheduler prints for an idle slot
    #[serde(default = "default_idle_user_sentinel")]
    pub idle_user_sentinel: String,
    /// Interactive node checked for resource hogs instead of job ownership
    #[serde(default)]
    pub login_node: Option<String>,
    /// Commands allowed to run on compute nodes without a scheduler job
    #[serde(default = "default_excluded_commands")]
    pub excluded_commands: Vec<String>,
    /// Account home directories; each entry is a valid local user
    #[serde(default = "default_home_root")]
    pub home_root: PathBuf,
    /// Directory for daily rolling log files (None = stderr only)
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

impl ClusterConfig {
    pub fn layout(&self) -> ClusterLayout {
        ClusterLayout {
            node_prefix: self.node_prefix.clone(),
            idle_user_sentinel: self.idle_user_sentinel.clone(),
            login_node: self.login_node.clone(),
            excluded_commands: self.excluded_commands.clone(),
        }
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            node_prefix: default_node_prefix(),
            idle_user_sentinel: default_idle_user_sentinel(),
            login_node: None,
            excluded_commands: default_excluded_commands(),
            home_root: default_home_root(),
            log_dir: None,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct RulesConfig {
    /// Rules to report. Supports `"*"` (all).
    ///
    /// Examples: `["node_down", "gpu_high_temp"]`, `["*"]`
    #[serde(default = "default_enabled_rules")]
    pub enabled: Vec<String>,
}

impl RulesConfig {
    pub fn matcher(&self) -> anyhow::Result<RuleMatcher> {
        RuleMatcher::from_names(&self.enabled)
    }
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled_rules(),
        }
    }
}

fn default_node_prefix() -> String {
    "node".to_string()
}

fn default_idle_user_sentinel() -> String {
    "--".to_string()
}

fn default_excluded_commands() -> Vec<String> {
    vec!["nvidia-cuda-mps-server".to_string()]
}

fn default_home_root() -> PathBuf {
    PathBuf::from("/home")
}

fn default_enabled_rules() -> Vec<String> {
    vec!["*".to_string()]
}

/// Detection limits. Each one can be set on its own; the rest keep their
/// defaults.
#[derive(Deserialize, Serialize, Debug, Clone, Copy)]
pub struct ThresholdsConfig {
    #[serde(default = "default_cpu_temp_limit")]
    pub cpu_temp_limit: f64,
    #[serde(default = "default_gpu_temp_limit")]
    pub gpu_temp_limit: f64,
    #[serde(default = "default_ib_temp_limit")]
    pub ib_temp_limit: f64,
    #[serde(default = "default_ib_min_speed")]
    pub ib_min_speed: f64,
    #[serde(default = "default_disk_usage_limit")]
    pub disk_usage_limit: f64,
    #[serde(default = "default_login_cpu_pct_limit")]
    pub login_cpu_pct_limit: f64,
    #[serde(default = "default_login_mem_pct_limit")]
    pub login_mem_pct_limit: f64,
}

impl ThresholdsConfig {
    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            cpu_temp_limit: self.cpu_temp_limit,
            gpu_temp_limit: self.gpu_temp_limit,
            ib_temp_limit: self.ib_temp_limit,
            ib_min_speed: self.ib_min_speed,
            disk_usage_limit: self.disk_usage_limit,
            login_cpu_pct_limit: self.login_cpu_pct_limit,
            login_mem_pct_limit: self.login_mem_pct_limit,
        }
    }
}

impl Default for ThresholdsConfig {
    fn default() -> Self {
        Self {
            cpu_temp_limit: default_cpu_temp_limit(),
            gpu_temp_limit: default_gpu_temp_limit(),
            ib_temp_limit: default_ib_temp_limit(),
            ib_min_speed: default_ib_min_speed(),
            disk_usage_limit: default_disk_usage_limit(),
            login_cpu_pct_limit: default_login_cpu_pct_limit(),
            login_mem_pct_limit: default_login_mem_pct_limit(),
        }
    }
}

fn default_cpu_temp_limit() -> f64 {
    80.0
}

fn default_gpu_temp_limit() -> f64 {
    85.0
}

// Sites disagree here (65 to 105 °C depending on the adapter); override per site.
fn default_ib_temp_limit() -> f64 {
    105.0
}

/// EDR links run at 100 Gbps
fn default_ib_min_speed() -> f64 {
    100.0
}

fn default_disk_usage_limit() -> f64 {
    90.0
}

/// One full core
fn default_login_cpu_pct_limit() -> f64 {
    100.0
}

fn default_login_mem_pct_limit() -> f64 {
    25.0
}

pub fn load_config(config_path: Option<&PathBuf>) -> Result<Config, config::ConfigError> {
    let mut config_vec = vec![];

    // User-provided config file. Logging is not up yet, so a missing one is fatal.
    if let Some(config_path) = config_path {
        if !config_path.exists() {
            return Err(config::ConfigError::Message(format!(
                "config file {} not found",
                config_path.display()
            )));
        }
        config_vec.push(config_path.clone());
    }

    // Default config file
    if let Ok(default_config_path) = get_config_dir().map(|d| d.join("nodewatch.toml")) {
        if default_config_path.exists() {
            config_vec.push(default_config_path);
        }
    }

    let settings = config::Config::builder();
    // Later sources override earlier ones, so the explicit file goes last.
    let settings = config_vec.iter().rev().fold(settings, |s, path| {
        s.add_source(config::File::from(path.as_path()))
    });

    settings
        .add_source(
            config::Environment::with_prefix("NODEWATCH")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("cluster.excluded_commands")
                .with_list_parse_key("rules.enabled"),
        )
        .build()?
        .try_deserialize()
}
