use std::process::ExitCode;

use clap::Parser;

mod cli;
mod commands;
mod logging;

#[cfg(target_arch = "x86_64")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() -> ExitCode {
    match real_main() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:?}");
            ExitCode::from(1)
        }
    }
}

fn real_main() -> anyhow::Result<ExitCode> {
    let args = cli::NodeWatch::parse();
    let config = nodewatch::config::load_config(args.config.as_ref())?;

    let log_dir = args.log_dir.clone().or_else(|| config.cluster.log_dir.clone());
    let _guard = logging::init(args.verbosity.tracing_level_filter(), log_dir.as_deref())?;

    commands::handle_commands(&config, args.command)
}
