//! Apply context and provider traits
//!
//! These traits keep the engine independent of how commands are spawned
//! and how progress is shown. Tests swap in a recording runner; the CLI
//! plugs in a logging observer.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::Path;
use std::process::Command;

use crate::attributes::Node;
use crate::facts::Facts;
use crate::notify::Timing;
use crate::resource::Action;
use crate::types::{ActionRecord, CommandOutput, RunReport};

/// Runs external commands for providers and guards
pub trait CommandRunner: Send + Sync {
    /// Run a command and capture its output
    fn run(&self, cmd: &str, args: &[&str]) -> Result<CommandOutput>;

    /// Run a command in `cwd` with extra environment variables
    fn run_in(
        &self,
        cmd: &str,
        args: &[&str],
        _cwd: Option<&Path>,
        _env: &BTreeMap<String, String>,
    ) -> Result<CommandOutput> {
        self.run(cmd, args)
    }

    /// Run a command and return just success/failure
    fn run_status(&self, cmd: &str, args: &[&str]) -> Result<bool> {
        Ok(self.run(cmd, args)?.success())
    }

    /// Run a command and capture stdout, failing on non-zero exit
    fn run_capture(&self, cmd: &str, args: &[&str]) -> Result<String> {
        let output = self.run(cmd, args)?;
        if !output.success() {
            anyhow::bail!(
                "Command failed: {} {}: {}",
                cmd,
                args.join(" "),
                output.stderr_str().trim()
            );
        }
        Ok(output.stdout_str())
    }
}

/// Spawns real processes
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, cmd: &str, args: &[&str]) -> Result<CommandOutput> {
        self.run_in(cmd, args, None, &BTreeMap::new())
    }

    fn run_in(
        &self,
        cmd: &str,
        args: &[&str],
        cwd: Option<&Path>,
        env: &BTreeMap<String, String>,
    ) -> Result<CommandOutput> {
        let mut command = Command::new(cmd);
        command.args(args).envs(env);
        if let Some(dir) = cwd {
            command.current_dir(dir);
        }
        let output = command
            .output()
            .with_context(|| format!("Failed to execute: {} {}", cmd, args.join(" ")))?;
        Ok(output.into())
    }
}

/// Package tool used by the package provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    Dnf,
    Apt,
}

impl PackageManager {
    pub fn for_facts(facts: &Facts) -> Self {
        if facts.is_debian_family() {
            Self::Apt
        } else {
            Self::Dnf
        }
    }
}

/// Context passed to providers and guards
pub struct ApplyContext<'a> {
    /// Report what would change without changing anything
    pub why_run: bool,
    /// Log content diffs
    pub verbose: bool,
    pub runner: &'a dyn CommandRunner,
    /// Frozen attributes for this run
    pub node: &'a Node,
    pub package_manager: PackageManager,
}

impl<'a> ApplyContext<'a> {
    pub fn new(runner: &'a dyn CommandRunner, node: &'a Node) -> Self {
        Self {
            why_run: false,
            verbose: false,
            runner,
            node,
            package_manager: PackageManager::Dnf,
        }
    }

    pub fn why_run(mut self, why_run: bool) -> Self {
        self.why_run = why_run;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn package_manager(mut self, manager: PackageManager) -> Self {
        self.package_manager = manager;
        self
    }
}

/// Receives progress events during a run
///
/// Every method has an empty default so observers implement only what
/// they display.
pub trait RunObserver {
    /// Called once before the first resource
    fn on_run_start(&mut self, _resources: usize, _why_run: bool) {}

    /// Called before an action is evaluated
    fn on_action_start(&mut self, _resource: &str, _action: Action) {}

    /// Called after an action has an outcome
    fn on_action_complete(&mut self, _record: &ActionRecord) {}

    /// Called when a converged resource queues (or fires) a notification
    fn on_notification(&mut self, _source: &str, _target: &str, _action: Action, _timing: Timing) {}

    /// Called once with the final report
    fn on_run_complete(&mut self, _report: &RunReport) {}
}

/// No-op observer
pub struct NoObserver;

impl RunObserver for NoObserver {}
