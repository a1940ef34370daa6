use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use clap_complete::Shell;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use strum::Display;

#[derive(Debug, Parser)]
#[command(name = "nodewatch", author, version = nodewatch::core::version(), about = "Detect node events by comparing two cluster status snapshots.")]
#[command(styles=nodewatch::utils::STYLES)]
pub struct NodeWatch {
    #[command(subcommand)]
    pub command: Commands,

    /// The configuration file to use
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Write daily rolling log files to this directory
    #[arg(long, global = true, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    #[command(flatten)]
    pub verbosity: Verbosity<InfoLevel>,
}

#[derive(Debug, Parser)]
pub enum Commands {
    /// Run one detection cycle and print the events
    Check(CheckArgs),
    /// Parse a single snapshot and print the node states
    Parse(ParseArgs),
    /// Print the effective configuration as TOML
    Config,
    /// Generate shell completion scripts
    Completion {
        /// The shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Parser)]
pub struct CheckArgs {
    /// Status snapshot taken now
    #[arg(long, value_name = "FILE")]
    pub current: PathBuf,

    /// Status snapshot from the previous run
    #[arg(long, value_name = "FILE")]
    pub previous: PathBuf,

    /// Merged process listing of the alive nodes
    #[arg(long, value_name = "FILE")]
    pub processes: PathBuf,

    /// File with one valid local username per line
    #[arg(long, value_name = "FILE", conflicts_with = "home_root")]
    pub users: Option<PathBuf>,

    /// List valid users from the home directories below this path
    #[arg(long, value_name = "DIR")]
    pub home_root: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// Exit with status 2 when any event was detected
    #[arg(long)]
    pub fail_on_events: bool,
}

#[derive(Debug, Parser)]
pub struct ParseArgs {
    /// Status snapshot to parse
    #[arg(value_name = "FILE")]
    pub snapshot: PathBuf,

    /// Print only the names of nodes that answered
    #[arg(long)]
    pub alive: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Display)]
#[strum(serialize_all = "lowercase")]
pub enum OutputFormat {
    Json,
    Table,
}
