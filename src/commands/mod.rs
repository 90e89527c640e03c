// src/commands/mod.rs
//! Command handlers for the cellar CLI

mod cook;
mod lint;
mod query;

pub use cook::{cmd_build, cmd_fetch, cmd_test};
pub use lint::cmd_lint;
pub use query::{cmd_deps, cmd_info, cmd_plan, cmd_uses};

use crate::cli::PlanArgs;
use anyhow::{Context, Result};
use cellar::recipe::{BuildPlan, KitchenConfig, Os, RecipeBook, ResolveOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Everything a command needs from the global flags
pub struct Session {
    pub recipes: PathBuf,
    pub config: KitchenConfig,
}

impl Session {
    /// Load configuration from `config_path`, or the per-user default if present
    pub fn load(recipes: PathBuf, config_path: Option<&Path>) -> Result<Self> {
        let config = match config_path {
            Some(path) => KitchenConfig::load(path)
                .with_context(|| format!("Failed to load config: {}", path.display()))?,
            None => match default_config_path().filter(|p| p.is_file()) {
                Some(path) => {
                    debug!("Using config {}", path.display());
                    KitchenConfig::load(&path)
                        .with_context(|| format!("Failed to load config: {}", path.display()))?
                }
                None => KitchenConfig::default(),
            },
        };
        Ok(Self { recipes, config })
    }

    /// The recipe book, with the configured system packages
    pub fn book(&self) -> Result<RecipeBook> {
        let book = RecipeBook::load_dir(&self.recipes)
            .with_context(|| format!("Failed to load recipes from {}", self.recipes.display()))?;
        Ok(book.with_system_packages(self.config.system_packages.iter().cloned()))
    }

    /// Resolve the targets of a plan-style command
    pub fn resolve(&self, book: &RecipeBook, args: &PlanArgs) -> Result<BuildPlan> {
        let mut options = ResolveOptions::for_os(args.os.unwrap_or_default());
        for name in &args.head {
            options = options.with_head(name.clone());
        }
        let compiler = args.compiler.as_ref().or(self.config.compiler.as_ref());
        options = options.with_compiler(compiler.cloned());
        let targets: Vec<&str> = args.targets.iter().map(String::as_str).collect();
        book.resolve(&targets, &options)
            .with_context(|| format!("Failed to resolve {}", args.targets.join(", ")))
    }
}

/// `<config dir>/cellar/cellar.toml`
fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("cellar").join("cellar.toml"))
}

fn os_or_host(os: Option<Os>) -> Os {
    os.unwrap_or_default()
}
