//! Shell command provider

use anyhow::{Result, bail};

use super::Provider;
use crate::context::ApplyContext;
use crate::resource::{Action, ExecuteSpec};
use crate::types::{ApplyResult, ResourceState};

impl Provider for ExecuteSpec {
    fn current_state(&self, _ctx: &ApplyContext) -> Result<ResourceState> {
        Ok(match &self.creates {
            Some(path) if path.exists() => ResourceState::Present {
                details: Some(format!("{} exists", path.display())),
            },
            _ => ResourceState::Unknown,
        })
    }

    fn apply(&self, action: Action, ctx: &ApplyContext) -> Result<ApplyResult> {
        match action {
            Action::Nothing => Ok(ApplyResult::NoChange),
            Action::Run => {
                if let Some(creates) = &self.creates
                    && creates.exists()
                {
                    log::debug!("{} exists, not running `{}`", creates.display(), self.command);
                    return Ok(ApplyResult::NoChange);
                }
                if ctx.why_run {
                    return Ok(ApplyResult::Ran);
                }
                let output = ctx.runner.run_in(
                    "sh",
                    &["-c", &self.command],
                    self.cwd.as_deref(),
                    &self.environment,
                )?;
                if !output.success() {
                    bail!(
                        "`{}` exited with {}: {}",
                        self.command,
                        output.code.map_or_else(|| "signal".to_string(), |c| c.to_string()),
                        output.stderr_str().trim()
                    );
                }
                Ok(ApplyResult::Ran)
            }
            other => bail!("execute does not support action {other}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::Node;
    use crate::context::test_support::MockRunner;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn newaliases() -> ExecuteSpec {
        ExecuteSpec {
            command: "newaliases".into(),
            cwd: None,
            environment: BTreeMap::new(),
            creates: None,
        }
    }

    #[test]
    fn test_runs_through_shell() {
        let runner = MockRunner::default();
        let node = Node::default();
        let ctx = ApplyContext::new(&runner, &node);
        assert_eq!(newaliases().apply(Action::Run, &ctx).unwrap(), ApplyResult::Ran);
        assert_eq!(runner.calls(), vec!["sh -c newaliases".to_string()]);
    }

    #[test]
    fn test_creates_skips_when_present() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("aliases.db");
        std::fs::write(&marker, "").unwrap();
        let mut spec = newaliases();
        spec.creates = Some(marker);
        let runner = MockRunner::default();
        let node = Node::default();
        let ctx = ApplyContext::new(&runner, &node);
        assert_eq!(spec.apply(Action::Run, &ctx).unwrap(), ApplyResult::NoChange);
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_non_zero_exit_is_an_error() {
        let runner = MockRunner::default().failing("sh -c newaliases");
        let node = Node::default();
        let ctx = ApplyContext::new(&runner, &node);
        assert!(newaliases().apply(Action::Run, &ctx).is_err());
    }
}
