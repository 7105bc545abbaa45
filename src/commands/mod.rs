// Convergence
pub mod plan;
pub mod run;

// Client housekeeping
pub mod client;
pub mod profile;

// Authoring
pub mod generate;

use anyhow::{Context as _, Result};
use declarative::{CompiledRun, Facts, RunList, compile};
use std::fs;
use std::path::PathBuf;

use crate::Context;
use crate::cli::CompileArgs;
use crate::config::ClientConfig;
use crate::cookbook::CookbookRepo;
use crate::host;
use crate::ui;

/// Load the client config named on the command line or by the environment
pub fn load_config(ctx: &Context) -> Result<ClientConfig> {
    ClientConfig::load(&ctx.config_path)
}

/// Everything a run, plan, or validation needs
pub struct Compiled {
    pub repo: CookbookRepo,
    pub facts: Facts,
    pub run: CompiledRun,
}

/// Run list from `-o`, or the configured manifest
pub fn run_list(config: &ClientConfig, args: &CompileArgs) -> Result<RunList> {
    if !args.run_list.is_empty() {
        log::debug!("Using override run list: {}", args.run_list.join(", "));
        return Ok(RunList::parse(&args.run_list)?);
    }
    let content = fs::read_to_string(&config.runlist)
        .with_context(|| format!("Could not read run list {}", config.runlist.display()))?;
    RunList::from_json(&content)
        .with_context(|| format!("Invalid run list {}", config.runlist.display()))
}

/// Load cookbooks, gather facts, and compile the run list
pub fn compile_run(config: &ClientConfig, args: &CompileArgs) -> Result<Compiled> {
    let run_list = run_list(config, args)?;
    if run_list.is_empty() {
        ui::warn("Run list is empty, nothing to converge");
    }

    let cookbook_path: Vec<PathBuf> = args
        .cookbook_path
        .iter()
        .chain(&config.cookbook_path)
        .cloned()
        .collect();
    let repo = CookbookRepo::load(&cookbook_path)?;
    let facts = host::gather()?;
    let run = compile(&repo.registry, &run_list, &facts).context("Compile failed")?;

    Ok(Compiled { repo, facts, run })
}
