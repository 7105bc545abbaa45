use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::paths;

// ============================================================================
// Client Config
// ============================================================================

/// `/etc/fleetctl/client.toml`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    /// Cookbook search path; the first directory providing a cookbook wins
    pub cookbook_path: Vec<PathBuf>,
    /// Run-list manifest (`{"run_list": [...]}`)
    pub runlist: PathBuf,
    /// Directory for per-run output files
    pub outputs_dir: PathBuf,
    /// Days to keep `chef.2*` outputs
    pub retention_days: u32,
    /// Exclusive lock held for the duration of a run
    pub lock_path: PathBuf,
    pub sentinels: Sentinels,
}

/// Marker files that suppress scheduled runs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Sentinels {
    pub override_file: PathBuf,
    /// Minutes before the override marker goes stale
    pub override_max_age_minutes: u64,
    pub test_timestamp: PathBuf,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            cookbook_path: vec![PathBuf::from("/var/chef/repo/scale-chef/cookbooks")],
            runlist: PathBuf::from("/etc/chef/runlist.json"),
            outputs_dir: PathBuf::from("/var/chef/outputs"),
            retention_days: 14,
            lock_path: PathBuf::from("/var/lock/fleetctl.lock"),
            sentinels: Sentinels::default(),
        }
    }
}

impl Default for Sentinels {
    fn default() -> Self {
        Self {
            override_file: PathBuf::from("/var/chef/cron.default.override"),
            override_max_age_minutes: 60,
            test_timestamp: PathBuf::from("/etc/chef/test_timestamp"),
        }
    }
}

impl ClientConfig {
    /// Load the config, falling back to defaults when the file is absent
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        let mut config: Self = toml::from_str(&content)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        config.expand_paths();
        Ok(config)
    }

    fn expand_paths(&mut self) {
        let expand = |p: &Path| paths::expand(&p.to_string_lossy());
        self.cookbook_path = self.cookbook_path.iter().map(|p| expand(p)).collect();
        self.runlist = expand(&self.runlist);
        self.outputs_dir = expand(&self.outputs_dir);
        self.lock_path = expand(&self.lock_path);
        self.sentinels.override_file = expand(&self.sentinels.override_file);
        self.sentinels.test_timestamp = expand(&self.sentinels.test_timestamp);
    }
}

// ============================================================================
// Knife Profile
// ============================================================================

/// `.chef/knife.toml`, used by workstation tooling only
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct KnifeProfile {
    pub node_name: Option<String>,
    pub chef_server_url: Option<String>,
    pub client_key: Option<PathBuf>,
    pub validation_client_name: Option<String>,
    pub validation_key: Option<PathBuf>,
    pub cookbook_path: Vec<PathBuf>,
    pub log_level: Option<String>,
    pub log_location: Option<String>,
}

impl KnifeProfile {
    /// Load a profile; relative paths resolve against the profile's directory
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        let mut profile: Self = toml::from_str(&content)
            .with_context(|| format!("Invalid knife profile {}", path.display()))?;

        let base = path.parent().unwrap_or(Path::new("."));
        let resolve = |p: &Path| paths::resolve_against(base, &p.to_string_lossy());
        profile.client_key = profile.client_key.as_deref().map(resolve);
        profile.validation_key = profile.validation_key.as_deref().map(resolve);
        profile.cookbook_path = profile.cookbook_path.iter().map(|p| resolve(p)).collect();
        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_config_uses_defaults() {
        let config = ClientConfig::load(Path::new("/nonexistent/client.toml")).unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.retention_days, 14);
        assert_eq!(config.sentinels.override_max_age_minutes, 60);
        assert_eq!(
            config.sentinels.override_file,
            PathBuf::from("/var/chef/cron.default.override")
        );
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("client.toml");
        fs::write(
            &path,
            r#"
cookbook_path = ["/srv/site-cookbooks", "/srv/cookbooks"]
retention_days = 3

[sentinels]
override_max_age_minutes = 5
"#,
        )
        .unwrap();

        let config = ClientConfig::load(&path).unwrap();
        assert_eq!(config.cookbook_path.len(), 2);
        assert_eq!(config.retention_days, 3);
        assert_eq!(config.sentinels.override_max_age_minutes, 5);
        assert_eq!(config.sentinels.test_timestamp, PathBuf::from("/etc/chef/test_timestamp"));
        assert_eq!(config.outputs_dir, PathBuf::from("/var/chef/outputs"));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("client.toml");
        fs::write(&path, "cookbooks = []\n").unwrap();
        assert!(ClientConfig::load(&path).is_err());
    }

    #[test]
    fn test_knife_profile_paths_relative_to_profile() {
        let dir = TempDir::new().unwrap();
        let chef = dir.path().join(".chef");
        fs::create_dir_all(&chef).unwrap();
        let path = chef.join("knife.toml");
        fs::write(
            &path,
            r#"
node_name = "phil"
chef_server_url = "https://chef.scale.example/organizations/scale"
client_key = "phil.pem"
validation_key = "/etc/chef/validation.pem"
cookbook_path = ["../cookbooks"]
log_level = "info"
"#,
        )
        .unwrap();

        let profile = KnifeProfile::load(&path).unwrap();
        assert_eq!(profile.node_name.as_deref(), Some("phil"));
        assert_eq!(profile.client_key, Some(chef.join("phil.pem")));
        assert_eq!(profile.validation_key, Some(PathBuf::from("/etc/chef/validation.pem")));
        assert_eq!(profile.cookbook_path, vec![chef.join("../cookbooks")]);
    }
}
