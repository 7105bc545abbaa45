//! `fleetctl generate`

use anyhow::{Context as _, Result, bail};
use declarative::{ApplyContext, Node, ResourceOutcome, RunStatus, SystemRunner, converge_simple};
use std::path::{self, Path};

use crate::Context;
use crate::generator;
use crate::ui;

pub fn cookbook(ctx: &Context, name: &str, license: &str, root: &Path) -> Result<()> {
    let root = path::absolute(root)
        .with_context(|| format!("Could not resolve {}", root.display()))?;
    let collection = generator::cookbook(&root, name, license)?;

    if !ctx.quiet {
        ui::header(&format!("Generating cookbook {name}"));
    }
    let node = Node::default();
    let apply_ctx = ApplyContext::new(&SystemRunner, &node).verbose(ctx.verbose > 0);
    let report = converge_simple(&collection, &apply_ctx);

    if !ctx.quiet {
        for record in &report.actions {
            match &record.outcome {
                ResourceOutcome::Converged { .. } => {
                    ui::success(&format!("Created {}", record.resource));
                }
                ResourceOutcome::Unchanged if record.resource.starts_with("file[") => {
                    ui::warn(&format!("Kept existing {}", record.resource));
                }
                _ => {}
            }
        }
    }
    if let RunStatus::Failed { resource, error } = &report.status {
        bail!("Could not create {resource}: {error}");
    }

    if !ctx.quiet {
        println!();
        ui::info(&format!("Cookbook ready at {}", root.join(name).display()));
    }
    Ok(())
}
