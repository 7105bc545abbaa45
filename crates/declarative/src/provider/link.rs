//! Symbolic link provider

use anyhow::{Context, Result, bail};
use std::fs;
use std::path::PathBuf;

use super::Provider;
use crate::context::ApplyContext;
use crate::resource::{Action, LinkSpec};
use crate::types::{ApplyResult, ResourceState};

#[derive(Debug)]
enum LinkState {
    Missing,
    Correct,
    WrongTarget(PathBuf),
    NotALink,
}

impl LinkSpec {
    fn check_current(&self) -> Result<LinkState> {
        if !self.path.is_symlink() {
            return Ok(if self.path.exists() {
                LinkState::NotALink
            } else {
                LinkState::Missing
            });
        }
        let actual = fs::read_link(&self.path)
            .with_context(|| format!("Failed to read symlink {}", self.path.display()))?;
        if actual == self.to {
            Ok(LinkState::Correct)
        } else {
            Ok(LinkState::WrongTarget(actual))
        }
    }

    fn create_link(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create parent directory: {}", parent.display())
            })?;
        }
        std::os::unix::fs::symlink(&self.to, &self.path).with_context(|| {
            format!(
                "Failed to create symlink: {} -> {}",
                self.path.display(),
                self.to.display()
            )
        })
    }
}

impl Provider for LinkSpec {
    fn current_state(&self, _ctx: &ApplyContext) -> Result<ResourceState> {
        Ok(match self.check_current()? {
            LinkState::Missing => ResourceState::Absent,
            LinkState::Correct => ResourceState::Present {
                details: Some(format!("-> {}", self.to.display())),
            },
            LinkState::WrongTarget(actual) => ResourceState::Modified {
                from: actual.display().to_string(),
                to: self.to.display().to_string(),
            },
            LinkState::NotALink => ResourceState::Modified {
                from: "regular file".to_string(),
                to: format!("symlink -> {}", self.to.display()),
            },
        })
    }

    fn apply(&self, action: Action, ctx: &ApplyContext) -> Result<ApplyResult> {
        let state = self.check_current()?;
        match action {
            Action::Nothing => Ok(ApplyResult::NoChange),
            Action::Create => match state {
                LinkState::Correct => Ok(ApplyResult::NoChange),
                LinkState::NotALink => bail!(
                    "{} exists and is not a symlink",
                    self.path.display()
                ),
                LinkState::Missing => {
                    if !ctx.why_run {
                        self.create_link()?;
                    }
                    Ok(ApplyResult::Created)
                }
                LinkState::WrongTarget(_) => {
                    if !ctx.why_run {
                        fs::remove_file(&self.path).with_context(|| {
                            format!("Failed to remove existing symlink: {}", self.path.display())
                        })?;
                        self.create_link()?;
                    }
                    Ok(ApplyResult::Modified)
                }
            },
            Action::Delete => match state {
                LinkState::Missing => Ok(ApplyResult::NoChange),
                LinkState::NotALink => bail!("{} is not a symlink", self.path.display()),
                LinkState::Correct | LinkState::WrongTarget(_) => {
                    if !ctx.why_run {
                        fs::remove_file(&self.path).with_context(|| {
                            format!("Failed to remove symlink: {}", self.path.display())
                        })?;
                    }
                    Ok(ApplyResult::Removed)
                }
            },
            other => bail!("link does not support action {other}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::Node;
    use crate::context::test_support::MockRunner;
    use tempfile::TempDir;

    #[test]
    fn test_link_lifecycle() {
        let dir = TempDir::new().unwrap();
        let link = LinkSpec {
            path: dir.path().join("client.rb"),
            to: dir.path().join("client-prod.rb"),
        };
        let runner = MockRunner::default();
        let node = Node::default();
        let ctx = ApplyContext::new(&runner, &node);

        assert_eq!(link.apply(Action::Create, &ctx).unwrap(), ApplyResult::Created);
        assert_eq!(link.apply(Action::Create, &ctx).unwrap(), ApplyResult::NoChange);

        let retarget = LinkSpec {
            path: link.path.clone(),
            to: dir.path().join("client-dev.rb"),
        };
        assert_eq!(retarget.apply(Action::Create, &ctx).unwrap(), ApplyResult::Modified);
        assert_eq!(fs::read_link(&link.path).unwrap(), retarget.to);

        assert_eq!(retarget.apply(Action::Delete, &ctx).unwrap(), ApplyResult::Removed);
        assert!(!link.path.is_symlink());
    }

    #[test]
    fn test_regular_file_is_not_replaced() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("client.rb");
        fs::write(&path, "log_level :info").unwrap();
        let link = LinkSpec {
            path,
            to: dir.path().join("client-prod.rb"),
        };
        let runner = MockRunner::default();
        let node = Node::default();
        let ctx = ApplyContext::new(&runner, &node);
        assert!(link.apply(Action::Create, &ctx).is_err());
    }
}
