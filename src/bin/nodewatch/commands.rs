use std::process::ExitCode;

use clap::CommandFactory;
use nodewatch::config::Config;

use crate::cli::{Commands, NodeWatch};

mod check;
mod parse;
mod show_config;

pub fn handle_commands(config: &Config, command: Commands) -> anyhow::Result<ExitCode> {
    match command {
        Commands::Check(args) => check::handle_check(config, args),
        Commands::Parse(args) => parse::handle_parse(config, args).map(|()| ExitCode::SUCCESS),
        Commands::Config => show_config::handle_config(config).map(|()| ExitCode::SUCCESS),
        Commands::Completion { shell } => {
            let mut cmd = NodeWatch::command();
            clap_complete::generate(shell, &mut cmd, "nodewatch", &mut std::io::stdout());
            Ok(ExitCode::SUCCESS)
        }
    }
}
