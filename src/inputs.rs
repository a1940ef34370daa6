//! Reading detection inputs from disk.
//!
//! Any missing or unreadable input is an error; detection never runs on a
//! partial set of inputs.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::Path;

pub fn read_input(path: &Path, what: &str) -> Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {what} from {}", path.display()))
}

/// One username per line. Blank lines and `#` comments are ignored.
pub fn load_valid_users(path: &Path) -> Result<HashSet<String>> {
    let text = read_input(path, "valid user list")?;
    Ok(text
        .lines()
        .map(|line| line.split('#').next().unwrap_or_default().trim())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect())
}

/// Every directory directly below `home_root` names a local account.
pub fn valid_users_from_home(home_root: &Path) -> Result<HashSet<String>> {
    let entries = std::fs::read_dir(home_root)
        .with_context(|| format!("Failed to list home directories in {}", home_root.display()))?;

    let mut users = HashSet::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("Failed to read {}", home_root.display()))?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            if !name.starts_with('.') {
                users.insert(name.to_string());
            }
        }
    }

    tracing::debug!("Found {} local account(s) in {}", users.len(), home_root.display());
    Ok(users)
}
