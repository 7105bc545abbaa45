//! `fleetctl plan` and `fleetctl validate`

use anyhow::Result;
use colored::Colorize;
use declarative::{ApplyContext, PackageManager, PlannedResource, ResourceState, SystemRunner, plan};

use crate::Context;
use crate::cli::CompileArgs;
use crate::ui;

pub fn plan_run(ctx: &Context, args: &CompileArgs) -> Result<()> {
    let config = super::load_config(ctx)?;
    let compiled = super::compile_run(&config, args)?;

    let apply_ctx = ApplyContext::new(&SystemRunner, &compiled.run.node)
        .why_run(true)
        .package_manager(PackageManager::for_facts(&compiled.facts));
    let planned = plan(&compiled.run.collection, &apply_ctx);

    ui::header(&format!("Plan for {}", compiled.facts.hostname));
    let mut current_recipe: Option<&str> = None;
    for resource in &planned {
        let recipe = resource.declared_in.as_deref();
        if recipe != current_recipe {
            ui::section(recipe.unwrap_or("(no recipe)"));
            current_recipe = recipe;
        }
        print_planned(resource, ctx.verbose > 0);
    }

    let pending = planned.iter().filter(|r| needs_work(&r.current)).count();
    println!();
    if pending == 0 {
        ui::success(&format!("{} resources, all present", planned.len()));
    } else {
        ui::info(&format!(
            "{} resources, {} absent or out of date",
            planned.len(),
            pending
        ));
    }
    Ok(())
}

fn needs_work(state: &ResourceState) -> bool {
    matches!(state, ResourceState::Absent | ResourceState::Modified { .. })
}

fn print_planned(resource: &PlannedResource, verbose: bool) {
    let actions = resource
        .actions
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    println!(
        "  {} {:<48} {}",
        ui::state_symbol(&resource.current),
        ui::truncate_start(&resource.key, 48),
        actions.cyan()
    );
    if let ResourceState::Modified { from, to } = &resource.current {
        ui::dim(&format!("    {from} → {to}"));
    }
    if verbose {
        ui::dim(&format!("    {}", resource.description));
    }
    for notify in &resource.notifies {
        ui::dim(&format!("    notifies {notify}"));
    }
}

pub fn validate(ctx: &Context, args: &CompileArgs) -> Result<()> {
    let config = super::load_config(ctx)?;
    let compiled = super::compile_run(&config, args)?;

    ui::header("Validation");
    ui::kv("Cookbooks", &compiled.repo.cookbooks.len().to_string());
    ui::kv("Recipes", &compiled.run.recipes.len().to_string());
    ui::kv("Resources", &compiled.run.collection.len().to_string());
    if ctx.verbose > 0 {
        ui::section("Run list");
        for recipe in &compiled.run.recipes {
            ui::dim(&recipe.to_string());
        }
        ui::section("Cookbooks");
        for cookbook in &compiled.repo.cookbooks {
            let version = cookbook.version.as_deref().unwrap_or("-");
            ui::dim(&format!(
                "{} {} ({})",
                cookbook.name,
                version,
                cookbook.dir.display()
            ));
            if let Some(description) = &cookbook.description {
                ui::dim(&format!("  {description}"));
            }
            if let Some(license) = &cookbook.license {
                ui::dim(&format!("  license: {license}"));
            }
            if !cookbook.depends.is_empty() {
                ui::dim(&format!("  depends: {}", cookbook.depends.join(", ")));
            }
            ui::dim(&format!("  recipes: {}", cookbook.recipes.join(", ")));
        }
    }
    println!();
    ui::success("Run list compiles");
    Ok(())
}
