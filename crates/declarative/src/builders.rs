//! Builders that expand an attribute map into a family of resources

use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::render;
use crate::resource::{Action, Permissions, Resource, ResourceSpec};

/// One YAML config per monitoring check, plus deletion of stale configs
///
/// Each check `name` is written to `<dir>/<name>.d/<name>.yaml`. Top-level
/// `<dir>/*.yaml` files whose stem is not a configured check are deleted.
pub fn monitor_configs(
    dir: &Path,
    monitors: &Map<String, Value>,
    perms: &Permissions,
) -> Result<Vec<Resource>> {
    let mut resources = Vec::new();

    for stale in stale_yaml(dir, monitors)? {
        resources.push(Resource::file(&stale, None).action(Action::Delete));
    }

    for (name, config) in monitors {
        let check_dir = dir.join(format!("{name}.d"));
        let path = check_dir.join(format!("{name}.yaml"));
        resources.push(Resource::directory(&check_dir).with_perms(Permissions {
            mode: Some("0755".to_string()),
            ..perms.clone()
        }));
        resources.push(
            Resource::template(&path, "monitor.yaml", render::yaml(config)?)
                .with_perms(perms.clone()),
        );
    }
    Ok(resources)
}

fn stale_yaml(dir: &Path, monitors: &Map<String, Value>) -> Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut stale = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.extension().is_none_or(|ext| ext != "yaml") || !path.is_file() {
            continue;
        }
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        if !monitors.contains_key(&stem) {
            stale.push(path);
        }
    }
    stale.sort();
    Ok(stale)
}

/// One cron resource per `name -> {time, command, user}` entry
pub fn cron_jobs(jobs: &Map<String, Value>, cron_dir: Option<&Path>) -> Result<Vec<Resource>> {
    let mut resources = Vec::new();
    for (name, job) in jobs {
        let field = |key: &str| job.get(key).and_then(Value::as_str);
        let key = format!("cron[{name}]");
        let time = field("time").ok_or_else(|| Error::invalid(&key, "missing time"))?;
        let command = field("command").ok_or_else(|| Error::invalid(&key, "missing command"))?;

        let mut resource = Resource::cron(name, time, command);
        if let ResourceSpec::Cron(spec) = &mut resource.spec {
            if let Some(user) = field("user") {
                spec.user = user.to_string();
            }
            if let Some(dir) = cron_dir {
                spec.cron_dir = dir.to_path_buf();
            }
        }
        resources.push(resource);
    }
    Ok(resources)
}

/// One file per user under `dir`, holding that user's keys one per line
pub fn authorized_keys(
    dir: &Path,
    keys: &Map<String, Value>,
    perms: &Permissions,
) -> Result<Vec<Resource>> {
    let mut resources = Vec::new();
    for (user, user_keys) in keys {
        let list = user_keys.as_array().ok_or_else(|| {
            Error::attribute(user.clone(), "authorized keys must be a list")
        })?;
        let lines = list
            .iter()
            .map(|k| {
                k.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| Error::attribute(user.clone(), "keys must be strings"))
            })
            .collect::<Result<Vec<_>>>()?;
        resources.push(
            Resource::file(dir.join(user), Some(&lines.join("\n"))).with_perms(perms.clone()),
        );
    }
    Ok(resources)
}
