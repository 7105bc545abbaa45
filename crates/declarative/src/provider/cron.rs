//! Cron job provider: one file per job under the cron directory

use anyhow::{Result, bail};
use std::path::PathBuf;

use super::Provider;
use super::file::converge_file;
use crate::context::ApplyContext;
use crate::resource::{Action, CronSpec, Permissions};
use crate::types::{ApplyResult, ResourceState};

impl CronSpec {
    /// File this job is written to
    ///
    /// cron ignores `cron.d` entries whose names contain anything besides
    /// letters, digits, `_` and `-`.
    pub fn file_path(&self, name: &str) -> PathBuf {
        let file_name: String = name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.cron_dir.join(file_name)
    }

    /// The `cron.d` line for this job
    pub fn entry(&self) -> String {
        format!("{} {} {}\n", self.time.trim(), self.user, self.command.trim())
    }

    fn content(&self) -> String {
        format!("# Managed by fleetctl\n{}", self.entry())
    }

    fn perms() -> Permissions {
        Permissions {
            mode: Some("0644".to_string()),
            ..Permissions::default()
        }
    }
}

/// A cron spec bound to the resource name that picks its file
pub(super) struct CronJob<'a> {
    pub name: &'a str,
    pub spec: &'a CronSpec,
}

impl Provider for CronJob<'_> {
    fn current_state(&self, _ctx: &ApplyContext) -> Result<ResourceState> {
        let path = self.spec.file_path(self.name);
        if !path.exists() {
            return Ok(ResourceState::Absent);
        }
        let current = std::fs::read_to_string(&path).unwrap_or_default();
        if current == self.spec.content() {
            Ok(ResourceState::Present {
                details: Some(self.spec.entry().trim().to_string()),
            })
        } else {
            Ok(ResourceState::Modified {
                from: current.lines().last().unwrap_or_default().to_string(),
                to: self.spec.entry().trim().to_string(),
            })
        }
    }

    fn apply(&self, action: Action, ctx: &ApplyContext) -> Result<ApplyResult> {
        let path = self.spec.file_path(self.name);
        let content = self.spec.content();
        match action {
            Action::Nothing => Ok(ApplyResult::NoChange),
            Action::Create => converge_file(&path, Some(&content), &CronSpec::perms(), action, ctx),
            Action::Delete => converge_file(&path, None, &Permissions::default(), action, ctx),
            other => bail!("cron does not support action {other}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::Node;
    use crate::context::test_support::MockRunner;
    use tempfile::TempDir;

    fn chef_cron(dir: &std::path::Path) -> CronSpec {
        CronSpec {
            time: "*/15 * * * *".into(),
            user: "root".into(),
            command: "/usr/local/sbin/chefctl -q".into(),
            cron_dir: dir.to_path_buf(),
        }
    }

    #[test]
    fn test_file_name_is_sanitized() {
        let spec = chef_cron(std::path::Path::new("/etc/cron.d"));
        assert_eq!(spec.file_path("chef.run"), PathBuf::from("/etc/cron.d/chef_run"));
    }

    #[test]
    fn test_create_writes_entry_once() {
        let dir = TempDir::new().unwrap();
        let spec = chef_cron(dir.path());
        let job = CronJob { name: "chef", spec: &spec };
        let runner = MockRunner::default();
        let node = Node::default();
        let ctx = ApplyContext::new(&runner, &node);

        assert_eq!(job.apply(Action::Create, &ctx).unwrap(), ApplyResult::Created);
        assert_eq!(job.apply(Action::Create, &ctx).unwrap(), ApplyResult::NoChange);
        let written = std::fs::read_to_string(dir.path().join("chef")).unwrap();
        assert!(written.ends_with("*/15 * * * * root /usr/local/sbin/chefctl -q\n"));
    }
}
