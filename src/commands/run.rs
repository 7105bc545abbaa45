//! `fleetctl run`

use anyhow::{Result, bail};
use chrono::Local;
use colored::Colorize;
use declarative::{
    Action, ActionRecord, ApplyContext, NotificationState, PackageManager, ResourceOutcome,
    RunObserver, RunReport, RunStatus, SystemRunner, Timing, converge,
};
use std::time::SystemTime;

use crate::Context;
use crate::cli::RunArgs;
use crate::client::{self, Gate, RunLock, RunOutput};
use crate::ui;

/// Mirrors run progress to the console and the run output file
struct RunLog<'a> {
    output: &'a mut RunOutput,
    quiet: bool,
    verbose: bool,
}

impl RunObserver for RunLog<'_> {
    fn on_run_start(&mut self, resources: usize, why_run: bool) {
        let mode = if why_run { " (why-run)" } else { "" };
        self.output
            .line(&format!("Converging {resources} resources{mode}"));
        if !self.quiet {
            ui::header(&format!("Converging {resources} resources{mode}"));
        }
    }

    fn on_action_complete(&mut self, record: &ActionRecord) {
        let via = record
            .notified_by
            .as_deref()
            .map(|source| format!(" (notified by {source})"))
            .unwrap_or_default();
        let text = ui::outcome_text(&record.outcome);
        self.output
            .line(&format!("{} {}{via}: {text}", record.resource, record.action));

        let show = self.verbose || !matches!(record.outcome, ResourceOutcome::Unchanged);
        if !self.quiet && show {
            println!(
                "  {} {} {}{} {}",
                ui::outcome_symbol(&record.outcome),
                record.resource,
                record.action.to_string().cyan(),
                via.dimmed(),
                text.dimmed()
            );
        }
    }

    fn on_notification(&mut self, source: &str, target: &str, action: Action, timing: Timing) {
        self.output
            .line(&format!("  {source} notifies {target} to {action} ({timing})"));
    }

    fn on_run_complete(&mut self, report: &RunReport) {
        let summary = ui::summary_line(&report.summary());
        self.output.line(&summary);
        if let RunStatus::Failed { resource, error } = &report.status {
            self.output.line(&format!("Run failed at {resource}: {error}"));
        }
        for record in &report.notifications {
            if record.state == NotificationState::Discarded {
                self.output.line(&format!(
                    "Discarded {} {} from {}",
                    record.action, record.target, record.source
                ));
            }
        }
    }
}

pub fn run(ctx: &Context, args: RunArgs) -> Result<()> {
    let config = super::load_config(ctx)?;

    if args.scheduled {
        if let Gate::Suppressed(reason) =
            client::check_sentinels(&config.sentinels, SystemTime::now())?
        {
            log::info!("Skipping scheduled run: {reason}");
            if !ctx.quiet {
                ui::info(&format!("Skipping scheduled run: {reason}"));
            }
            return Ok(());
        }
    }

    let _lock = RunLock::acquire(&config.lock_path)?;
    let mut output = RunOutput::start(&config.outputs_dir, Local::now())?;

    let compiled = match super::compile_run(&config, &args.compile) {
        Ok(compiled) => compiled,
        Err(e) => {
            output.line(&format!("{e:#}"));
            output.finish()?;
            return Err(e);
        }
    };
    output.line(&format!(
        "Run list expanded to: {}",
        compiled
            .run
            .recipes
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    ));

    let apply_ctx = ApplyContext::new(&SystemRunner, &compiled.run.node)
        .why_run(args.why_run)
        .verbose(ctx.verbose > 0)
        .package_manager(PackageManager::for_facts(&compiled.facts));
    let report = {
        let mut observer = RunLog {
            output: &mut output,
            quiet: ctx.quiet,
            verbose: ctx.verbose > 0,
        };
        converge(&compiled.run.collection, &apply_ctx, &mut observer)
    };
    let path = output.finish()?;

    let pruned = client::prune(&config.outputs_dir, config.retention_days, SystemTime::now())?;
    if !pruned.is_empty() {
        log::info!("Pruned {} old run outputs", pruned.len());
    }

    if !ctx.quiet {
        println!();
        for record in &report.notifications {
            if record.state == NotificationState::Discarded {
                ui::warn(&format!(
                    "Discarded {} of {} (notified by {})",
                    record.action, record.target, record.source
                ));
            }
        }
        ui::kv("Summary", &ui::summary_line(&report.summary()));
        ui::kv("Output", &path.display().to_string());
    }

    match &report.status {
        RunStatus::Success => {
            if !ctx.quiet {
                if report.why_run {
                    ui::success("Why-run complete, nothing was changed");
                } else {
                    ui::success("Run complete");
                }
            }
            Ok(())
        }
        RunStatus::Failed { resource, error } => {
            ui::error(&format!("{resource} failed: {error}"));
            bail!("Run failed at {resource}")
        }
    }
}
