//! Guard predicates (`only_if` / `not_if`)
//!
//! Guards are evaluated lazily, right before the action they protect, so a
//! guard sees every change made earlier in the same run.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::attributes::AttrPath;
use crate::context::ApplyContext;

type CheckFn = dyn Fn(&ApplyContext) -> Result<bool> + Send + Sync;

/// A guard condition evaluated in code
#[derive(Clone)]
pub struct Predicate {
    label: String,
    check: Arc<CheckFn>,
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Predicate").field("label", &self.label).finish()
    }
}

/// A single guard condition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    PathExists(PathBuf),
    PathMissing(PathBuf),
    IsSymlink(PathBuf),
    /// Shell command; holds when it exits 0
    Command(String),
    /// Node attribute is present and not `false`
    Attribute(AttrPath),
    #[serde(skip)]
    Check(Predicate),
}

impl Condition {
    pub fn check<F>(label: impl Into<String>, f: F) -> Self
    where
        F: Fn(&ApplyContext) -> Result<bool> + Send + Sync + 'static,
    {
        Self::Check(Predicate {
            label: label.into(),
            check: Arc::new(f),
        })
    }

    pub fn evaluate(&self, ctx: &ApplyContext) -> Result<bool> {
        match self {
            Self::PathExists(path) => Ok(path.exists() || path.is_symlink()),
            Self::PathMissing(path) => Ok(!path.exists() && !path.is_symlink()),
            Self::IsSymlink(path) => Ok(path.is_symlink()),
            Self::Command(cmd) => {
                let output = ctx
                    .runner
                    .run("sh", &["-c", cmd])
                    .with_context(|| format!("Failed to evaluate guard command `{cmd}`"))?;
                Ok(output.success())
            }
            Self::Attribute(path) => Ok(ctx.node.is_truthy(path.clone())),
            Self::Check(predicate) => (predicate.check)(ctx),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PathExists(p) => write!(f, "path_exists({})", p.display()),
            Self::PathMissing(p) => write!(f, "path_missing({})", p.display()),
            Self::IsSymlink(p) => write!(f, "is_symlink({})", p.display()),
            Self::Command(c) => write!(f, "`{c}`"),
            Self::Attribute(p) => write!(f, "node[{p}]"),
            Self::Check(p) => write!(f, "{{ {} }}", p.label),
        }
    }
}

/// The guards attached to a resource
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Guards {
    #[serde(default)]
    pub only_if: Vec<Condition>,
    #[serde(default)]
    pub not_if: Vec<Condition>,
}

impl Guards {
    pub fn is_empty(&self) -> bool {
        self.only_if.is_empty() && self.not_if.is_empty()
    }

    /// `None` when the action may proceed, otherwise the reason it may not
    ///
    /// Every `only_if` must hold and no `not_if` may hold. Evaluation stops
    /// at the first blocking condition.
    pub fn evaluate(&self, ctx: &ApplyContext) -> Result<Option<String>> {
        for condition in &self.only_if {
            if !condition.evaluate(ctx)? {
                return Ok(Some(format!("only_if {condition} was false")));
            }
        }
        for condition in &self.not_if {
            if condition.evaluate(ctx)? {
                return Ok(Some(format!("not_if {condition} was true")));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::{AttributeBuilder, Layer, Node};
    use crate::context::test_support::MockRunner;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    #[test]
    fn test_path_guards() {
        let dir = TempDir::new().unwrap();
        let present = dir.path().join("present");
        std::fs::write(&present, "x").unwrap();
        let runner = MockRunner::default();
        let node = Node::default();
        let ctx = ApplyContext::new(&runner, &node);

        assert!(Condition::PathExists(present.clone()).evaluate(&ctx).unwrap());
        assert!(!Condition::PathMissing(present).evaluate(&ctx).unwrap());
        assert!(Condition::PathMissing(dir.path().join("absent")).evaluate(&ctx).unwrap());
    }

    #[test]
    fn test_command_guard_uses_exit_status() {
        let runner = MockRunner::default().failing("sh -c test -f /etc/postfix/skip_mailgun");
        let node = Node::default();
        let ctx = ApplyContext::new(&runner, &node);
        let cond = Condition::Command("test -f /etc/postfix/skip_mailgun".into());
        assert!(!cond.evaluate(&ctx).unwrap());
        assert!(Condition::Command("true".into()).evaluate(&ctx).unwrap());
    }

    #[test]
    fn test_attribute_guard() {
        let mut attrs = AttributeBuilder::new();
        attrs
            .set(Layer::Default, &AttrPath::parse("fb_init.secrets.datadog_api_key"), json!("k"))
            .unwrap();
        let node = attrs.build();
        let runner = MockRunner::default();
        let ctx = ApplyContext::new(&runner, &node);
        let set = Condition::Attribute(AttrPath::parse("fb_init.secrets.datadog_api_key"));
        let unset = Condition::Attribute(AttrPath::parse("fb_init.secrets.other"));
        assert!(set.evaluate(&ctx).unwrap());
        assert!(!unset.evaluate(&ctx).unwrap());
    }

    #[test]
    fn test_only_if_short_circuits_before_not_if() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);
        let guards = Guards {
            only_if: vec![Condition::check("false", |_| Ok(false))],
            not_if: vec![Condition::check("counted", move |_| {
                counted.fetch_add(1, Ordering::SeqCst);
                Ok(false)
            })],
        };
        let runner = MockRunner::default();
        let node = Node::default();
        let ctx = ApplyContext::new(&runner, &node);
        let reason = guards.evaluate(&ctx).unwrap().unwrap();
        assert!(reason.contains("only_if"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_guard_deserializes_from_toml_shape() {
        let guards: Guards = serde_json::from_value(json!({
            "not_if": [{"is_symlink": "/etc/chef/client.rb"}],
            "only_if": [{"attribute": "fb_init.secrets.datadog_api_key"}],
        }))
        .unwrap();
        assert_eq!(guards.not_if.len(), 1);
        assert_eq!(guards.only_if[0].to_string(), "node[fb_init.secrets.datadog_api_key]");
    }
}
