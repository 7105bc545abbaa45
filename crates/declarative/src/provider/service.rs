//! Service provider backed by `systemctl`

use anyhow::{Result, bail};

use super::{Provider, run_checked};
use crate::context::ApplyContext;
use crate::resource::{Action, ServiceSpec};
use crate::types::{ApplyResult, ResourceState};

impl ServiceSpec {
    fn is_active(&self, ctx: &ApplyContext) -> Result<bool> {
        ctx.runner
            .run_status("systemctl", &["is-active", "--quiet", &self.service_name])
    }

    fn is_enabled(&self, ctx: &ApplyContext) -> Result<bool> {
        ctx.runner
            .run_status("systemctl", &["is-enabled", "--quiet", &self.service_name])
    }

    fn systemctl(&self, verb: &str, ctx: &ApplyContext) -> Result<()> {
        log::debug!("systemctl {} {}", verb, self.service_name);
        run_checked(ctx, "systemctl", &[verb, &self.service_name])
    }

    /// Run `verb` when `needed`, honoring why-run
    fn transition(&self, needed: bool, verb: &str, ctx: &ApplyContext) -> Result<ApplyResult> {
        if !needed {
            return Ok(ApplyResult::NoChange);
        }
        if !ctx.why_run {
            self.systemctl(verb, ctx)?;
        }
        Ok(ApplyResult::Modified)
    }
}

impl Provider for ServiceSpec {
    fn current_state(&self, ctx: &ApplyContext) -> Result<ResourceState> {
        if self.is_active(ctx)? {
            Ok(ResourceState::Present {
                details: Some("running".to_string()),
            })
        } else {
            Ok(ResourceState::Absent)
        }
    }

    fn apply(&self, action: Action, ctx: &ApplyContext) -> Result<ApplyResult> {
        match action {
            Action::Nothing => Ok(ApplyResult::NoChange),
            Action::Enable => self.transition(!self.is_enabled(ctx)?, "enable", ctx),
            Action::Disable => self.transition(self.is_enabled(ctx)?, "disable", ctx),
            Action::Start => self.transition(!self.is_active(ctx)?, "start", ctx),
            Action::Stop => self.transition(self.is_active(ctx)?, "stop", ctx),
            Action::Restart | Action::Reload => {
                if !ctx.why_run {
                    self.systemctl(action.as_str(), ctx)?;
                }
                Ok(ApplyResult::Ran)
            }
            other => bail!("service does not support action {other}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::Node;
    use crate::context::test_support::MockRunner;

    fn sshd() -> ServiceSpec {
        ServiceSpec {
            service_name: "sshd".into(),
        }
    }

    #[test]
    fn test_running_service_start_is_unchanged() {
        let runner = MockRunner::default();
        let node = Node::default();
        let ctx = ApplyContext::new(&runner, &node);
        assert_eq!(sshd().apply(Action::Start, &ctx).unwrap(), ApplyResult::NoChange);
    }

    #[test]
    fn test_stopped_service_is_started() {
        let runner = MockRunner::default().failing("systemctl is-active --quiet sshd");
        let node = Node::default();
        let ctx = ApplyContext::new(&runner, &node);
        assert_eq!(sshd().apply(Action::Start, &ctx).unwrap(), ApplyResult::Modified);
        assert!(runner.calls().contains(&"systemctl start sshd".to_string()));
    }

    #[test]
    fn test_restart_always_runs() {
        let runner = MockRunner::default();
        let node = Node::default();
        let ctx = ApplyContext::new(&runner, &node);
        assert_eq!(sshd().apply(Action::Restart, &ctx).unwrap(), ApplyResult::Ran);
        assert_eq!(runner.calls(), vec!["systemctl restart sshd".to_string()]);
    }

    #[test]
    fn test_why_run_restart_does_not_call_systemctl() {
        let runner = MockRunner::default();
        let node = Node::default();
        let ctx = ApplyContext::new(&runner, &node).why_run(true);
        assert_eq!(sshd().apply(Action::Restart, &ctx).unwrap(), ApplyResult::Ran);
        assert!(runner.calls().is_empty());
    }
}
