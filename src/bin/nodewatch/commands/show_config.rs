use anyhow::{Context, Result};
use nodewatch::config::Config;

pub fn handle_config(config: &Config) -> Result<()> {
    // Fail here rather than at the next check run.
    config.rules.matcher()?;

    let rendered = toml::to_string_pretty(config).context("Failed to render configuration")?;
    print!("{rendered}");
    Ok(())
}
