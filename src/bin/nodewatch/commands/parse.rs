use anyhow::{Context, Result};
use nodewatch::config::Config;
use nodewatch::core::node::NodeStatus;
use nodewatch::core::snapshot::parse_snapshot;
use nodewatch::inputs::read_input;
use strum::IntoEnumIterator;

use crate::cli::ParseArgs;

pub fn handle_parse(config: &Config, args: ParseArgs) -> Result<()> {
    let text = read_input(&args.snapshot, "snapshot")?;
    let parsed = parse_snapshot(&text, &config.cluster.layout())
        .with_context(|| format!("{} is not a valid snapshot", args.snapshot.display()))?;

    let summary = NodeStatus::iter()
        .map(|s| format!("{} {}", parsed.nodes.count_by_status(s), s))
        .collect::<Vec<_>>()
        .join(", ");
    tracing::info!("{}: {}", args.snapshot.display(), summary);

    if args.alive {
        for node in parsed.nodes.alive_nodes() {
            println!("{node}");
        }
        return Ok(());
    }

    let json = serde_json::to_string_pretty(&parsed.nodes)?;
    println!("{json}");
    Ok(())
}
