//! Providers: the code that inspects and changes the host for each kind
//!
//! Every provider honors why-run by computing the [`ApplyResult`] it would
//! return without touching the host.

mod cron;
mod execute;
mod file;
mod link;
mod package;
mod service;

use anyhow::Result;

use crate::context::ApplyContext;
use crate::resource::{Action, Resource, ResourceSpec};
use crate::types::{ApplyResult, ResourceState};

pub use file::{content_diff, digest};

/// Inspect and converge one resource kind
pub trait Provider {
    /// Observed state of the resource on this host
    fn current_state(&self, ctx: &ApplyContext) -> Result<ResourceState>;

    /// Take `action`, or report what it would do in why-run
    fn apply(&self, action: Action, ctx: &ApplyContext) -> Result<ApplyResult>;
}

impl<P: Provider + ?Sized> Provider for &P {
    fn current_state(&self, ctx: &ApplyContext) -> Result<ResourceState> {
        (**self).current_state(ctx)
    }

    fn apply(&self, action: Action, ctx: &ApplyContext) -> Result<ApplyResult> {
        (**self).apply(action, ctx)
    }
}

/// Provider for a declared resource
pub fn provider_for(resource: &Resource) -> Box<dyn Provider + '_> {
    match &resource.spec {
        ResourceSpec::Package(s) => Box::new(s),
        ResourceSpec::File(s) => Box::new(s),
        ResourceSpec::Directory(s) => Box::new(s),
        ResourceSpec::Template(s) => Box::new(s),
        ResourceSpec::Link(s) => Box::new(s),
        ResourceSpec::Execute(s) => Box::new(s),
        ResourceSpec::Service(s) => Box::new(s),
        ResourceSpec::Cron(s) => Box::new(cron::CronJob {
            name: &resource.name,
            spec: s,
        }),
    }
}

/// Run a command and fail with its stderr when it exits non-zero
pub(crate) fn run_checked(ctx: &ApplyContext, cmd: &str, args: &[&str]) -> Result<()> {
    let output = ctx.runner.run(cmd, args)?;
    if !output.success() {
        anyhow::bail!(
            "`{} {}` exited with {}: {}",
            cmd,
            args.join(" "),
            output.code.map_or_else(|| "signal".to_string(), |c| c.to_string()),
            output.stderr_str().trim()
        );
    }
    Ok(())
}
