// src/cli.rs
//! CLI definitions for cellar
//!
//! The command implementations live in the `commands` module.

use cellar::recipe::{Compiler, Os};
use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "cellar")]
#[command(author = "Cellar Contributors")]
#[command(version)]
#[command(about = "Build packages from declarative recipes, dependencies first", long_about = None)]
pub struct Cli {
    /// Directory holding `<name>.toml` recipes
    #[arg(long, global = true, default_value = "recipes")]
    pub recipes: PathBuf,

    /// Configuration file (default: <config dir>/cellar/cellar.toml if present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by everything that resolves a plan
#[derive(Args, Debug, Clone)]
pub struct PlanArgs {
    /// Recipes to resolve
    #[arg(required = true)]
    pub targets: Vec<String>,

    /// Build this target from its head checkout (repeatable)
    #[arg(long, value_name = "NAME")]
    pub head: Vec<String>,

    /// Resolve for this OS instead of the host (linux, macos)
    #[arg(long)]
    pub os: Option<Os>,

    /// Compiler the build will use (default: from config)
    #[arg(long, value_name = "NAME[@VERSION]")]
    pub compiler: Option<Compiler>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the ordered build plan and its parallel layers
    Plan {
        #[command(flatten)]
        plan: PlanArgs,
    },

    /// Build recipes and everything they depend on
    Build {
        #[command(flatten)]
        plan: PlanArgs,

        /// Recipes built at once (default: from config)
        #[arg(short, long)]
        jobs: Option<usize>,

        /// Skip smoke tests after building
        #[arg(long)]
        no_test: bool,

        /// Keep the build directory of a failed build
        #[arg(long)]
        keep_builddir: bool,
    },

    /// Download and verify sources without building
    Fetch {
        #[command(flatten)]
        plan: PlanArgs,
    },

    /// Rerun the smoke tests of an installed recipe
    Test {
        /// Recipe name
        name: String,

        /// Test the head build
        #[arg(long)]
        head: bool,
    },

    /// List everything a recipe depends on, directly or not
    Deps {
        /// Recipe name
        name: String,

        /// Resolve for this OS instead of the host
        #[arg(long)]
        os: Option<Os>,
    },

    /// List every recipe that depends on a recipe, directly or not
    Uses {
        /// Recipe name
        name: String,

        /// Resolve for this OS instead of the host
        #[arg(long)]
        os: Option<Os>,
    },

    /// Validate recipe files
    Lint {
        /// Recipe files (default: every recipe in --recipes)
        files: Vec<PathBuf>,
    },

    /// Show recipe metadata and installed versions
    Info {
        /// Recipe name
        name: String,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_build() {
        let cli = Cli::try_parse_from([
            "cellar", "build", "gdal", "octave", "--head", "octave", "-j", "2", "--no-test",
            "--recipes", "/srv/recipes",
        ])
        .unwrap();
        assert_eq!(cli.recipes, PathBuf::from("/srv/recipes"));
        match cli.command {
            Commands::Build {
                plan, jobs, no_test, ..
            } => {
                assert_eq!(plan.targets, vec!["gdal", "octave"]);
                assert_eq!(plan.head, vec!["octave"]);
                assert_eq!(jobs, Some(2));
                assert!(no_test);
            }
            _ => panic!("expected build"),
        }
    }

    #[test]
    fn test_parse_os() {
        let cli = Cli::try_parse_from(["cellar", "plan", "liblouis", "--os", "macos"]).unwrap();
        match cli.command {
            Commands::Plan { plan } => assert_eq!(plan.os, Some(Os::Macos)),
            _ => panic!("expected plan"),
        }
        assert!(Cli::try_parse_from(["cellar", "plan", "liblouis", "--os", "beos"]).is_err());
    }

    #[test]
    fn test_plan_requires_targets() {
        assert!(Cli::try_parse_from(["cellar", "plan"]).is_err());
    }
}
