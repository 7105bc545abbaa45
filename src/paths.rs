//! Path resolution for fleetctl
//!
//! # Environment Variables
//!
//! - `FLEETCTL_CONFIG` - Override the client config file
//!
//! # Config Resolution Priority
//!
//! 1. `-c <config>` on the command line
//! 2. `FLEETCTL_CONFIG` environment variable
//! 3. `/etc/fleetctl/client.toml`

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Environment variable for config file override
pub const ENV_CONFIG: &str = "FLEETCTL_CONFIG";

/// System-wide client config
pub const DEFAULT_CONFIG: &str = "/etc/fleetctl/client.toml";

/// Directory holding a knife profile, relative to a repo checkout
pub const KNIFE_DIR: &str = ".chef";

/// Get the client config path
pub fn config_path(cli_override: Option<&Path>) -> PathBuf {
    if let Some(path) = cli_override {
        log::debug!("Using config from command line: {}", path.display());
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ENV_CONFIG) {
        let path = expand(&path);
        log::debug!("Using config from {}: {}", ENV_CONFIG, path.display());
        return path;
    }

    log::debug!("Using default config: {DEFAULT_CONFIG}");
    PathBuf::from(DEFAULT_CONFIG)
}

/// Find `.chef/knife.toml` in `start` or any of its ancestors
pub fn find_knife_profile(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(KNIFE_DIR).join("knife.toml"))
        .find(|candidate| candidate.is_file())
}

/// Knife profile from the current directory upward
pub fn knife_profile_from_cwd() -> Result<Option<PathBuf>> {
    let cwd = std::env::current_dir().context("Could not determine current directory")?;
    Ok(find_knife_profile(&cwd))
}

/// Expand ~ and environment variables in a path string
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

/// Expand `path` and anchor it at `base` when relative
pub fn resolve_against(base: &Path, path: &str) -> PathBuf {
    let expanded = expand(path);
    if expanded.is_absolute() {
        expanded
    } else {
        base.join(expanded)
    }
}
