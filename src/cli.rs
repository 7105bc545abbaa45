use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "fleetctl")]
#[command(version)]
#[command(about = "Converge this host toward its cookbooks", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Client config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Compile the run list and converge this host
    Run(RunArgs),

    /// Show what a run would do, without changing anything
    Plan(CompileArgs),

    /// Load cookbooks and compile the run list
    Validate(CompileArgs),

    /// Suppress scheduled runs for a while
    Pause {
        /// Minutes until scheduled runs resume
        #[arg(short, long, default_value = "60")]
        minutes: u64,
    },

    /// Allow scheduled runs again
    Resume,

    /// Delete run outputs past the retention period
    Prune,

    /// Scaffold new cookbook content
    Generate {
        #[command(subcommand)]
        command: GenerateCommand,
    },

    /// Show the knife profile for this checkout
    Profile {
        /// Profile file (default: .chef/knife.toml above the current directory)
        #[arg(short, long)]
        path: Option<PathBuf>,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum GenerateCommand {
    /// Create a cookbook skeleton, keeping any files that already exist
    Cookbook {
        /// Cookbook name
        name: String,

        /// License: apachev2, mit, gplv2, gplv3, or all_rights
        #[arg(short = 'I', long, default_value = "all_rights")]
        license: String,

        /// Directory the cookbook is created in
        #[arg(short, long, default_value = ".")]
        path: PathBuf,
    },
}

#[derive(Parser)]
pub struct RunArgs {
    #[command(flatten)]
    pub compile: CompileArgs,

    /// Report what would change without changing it
    #[arg(short = 'n', long)]
    pub why_run: bool,

    /// Started by cron; honor sentinel files
    #[arg(long)]
    pub scheduled: bool,
}

#[derive(Parser)]
pub struct CompileArgs {
    /// Run list entries, replacing the manifest (e.g. recipe[scale_web])
    #[arg(short = 'o', long = "override-runlist", value_delimiter = ',')]
    pub run_list: Vec<String>,

    /// Cookbook directory, searched before the configured path
    #[arg(long = "cookbook-path")]
    pub cookbook_path: Vec<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_flags() {
        let cli = Cli::parse_from([
            "fleetctl",
            "-vv",
            "run",
            "--why-run",
            "-o",
            "recipe[fb_init],recipe[scale_web]",
        ]);
        assert_eq!(cli.verbose, 2);
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert!(args.why_run);
        assert!(!args.scheduled);
        assert_eq!(args.compile.run_list, vec!["recipe[fb_init]", "recipe[scale_web]"]);
    }

    #[test]
    fn test_generate_cookbook_defaults() {
        let cli = Cli::parse_from(["fleetctl", "generate", "cookbook", "scale_wiki"]);
        let Command::Generate {
            command: GenerateCommand::Cookbook { name, license, path },
        } = cli.command
        else {
            panic!("expected generate cookbook");
        };
        assert_eq!(name, "scale_wiki");
        assert_eq!(license, "all_rights");
        assert_eq!(path, PathBuf::from("."));
    }

    #[test]
    fn test_pause_default_minutes() {
        let cli = Cli::parse_from(["fleetctl", "pause"]);
        assert!(matches!(cli.command, Command::Pause { minutes: 60 }));
    }
}
