//! `fleetctl profile`

use anyhow::{Result, bail};
use std::path::PathBuf;

use crate::config::KnifeProfile;
use crate::paths;
use crate::ui;

pub fn run(path: Option<PathBuf>) -> Result<()> {
    let path = match path {
        Some(path) => path,
        None => match paths::knife_profile_from_cwd()? {
            Some(found) => found,
            None => bail!(
                "No {}/knife.toml in this directory or its parents",
                paths::KNIFE_DIR
            ),
        },
    };
    let profile = KnifeProfile::load(&path)?;

    ui::header("Knife Profile");
    ui::kv("Profile", &path.display().to_string());
    let show = |key: &str, value: Option<String>| {
        ui::kv(key, value.as_deref().unwrap_or("(unset)"));
    };
    show("node_name", profile.node_name.clone());
    show("chef_server_url", profile.chef_server_url.clone());
    show(
        "client_key",
        profile.client_key.as_ref().map(|p| p.display().to_string()),
    );
    show("validation_client_name", profile.validation_client_name.clone());
    show(
        "validation_key",
        profile.validation_key.as_ref().map(|p| p.display().to_string()),
    );
    show("log_level", profile.log_level.clone());
    show("log_location", profile.log_location.clone());
    if profile.cookbook_path.is_empty() {
        show("cookbook_path", None);
    } else {
        for dir in &profile.cookbook_path {
            ui::kv("cookbook_path", &dir.display().to_string());
        }
    }
    Ok(())
}
