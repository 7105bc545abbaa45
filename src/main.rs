mod cli;
mod client;
mod commands;
mod config;
mod cookbook;
mod generator;
mod host;
mod paths;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command, GenerateCommand};
use std::io;
use std::path::PathBuf;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    pub config_path: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
        config_path: paths::config_path(cli.config.as_deref()),
    };

    match cli.command {
        Command::Run(args) => commands::run::run(&ctx, args),
        Command::Plan(args) => commands::plan::plan_run(&ctx, &args),
        Command::Validate(args) => commands::plan::validate(&ctx, &args),
        Command::Pause { minutes } => commands::client::pause(&ctx, minutes),
        Command::Resume => commands::client::resume(&ctx),
        Command::Prune => commands::client::prune(&ctx),
        Command::Generate {
            command: GenerateCommand::Cookbook {
                name,
                license,
                path,
            },
        } => commands::generate::cookbook(&ctx, &name, &license, &path),
        Command::Profile { path } => commands::profile::run(path),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "fleetctl", &mut io::stdout());
            Ok(())
        }
    }
}
