// src/recipe/kitchen/config.rs

//! Configuration types for the Kitchen build system

use crate::error::{Error, Result};
use crate::recipe::cellar::{InstallPrefix, InstallReceipt};
use crate::recipe::format::Compiler;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for the Kitchen
///
/// Loadable from `cellar.toml`; every field has a default so a config file
/// only needs the values it changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KitchenConfig {
    /// Install root (`<cellar>/<name>/<version>`)
    #[serde(default = "default_cellar")]
    pub cellar: PathBuf,

    /// Directory for downloaded sources
    #[serde(default = "default_source_cache")]
    pub source_cache: PathBuf,

    /// Number of parallel jobs, used for `MAKEFLAGS` and for the scheduler
    #[serde(default = "default_jobs")]
    pub jobs: usize,

    /// Timeout for a single build or test process in seconds (0 = no limit)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Keep build directory after a failed build (for debugging)
    #[serde(default)]
    pub keep_builddir: bool,

    /// Prefix that system-provided packages live under
    #[serde(default = "default_system_prefix")]
    pub system_prefix: PathBuf,

    /// Dependencies satisfied by the host system instead of a recipe
    #[serde(default)]
    pub system_packages: BTreeSet<String>,

    /// Run smoke tests after each fresh build
    #[serde(default = "default_true")]
    pub run_tests: bool,

    /// Compiler builds use (`gcc@11`), checked against recipes' `fails_with`
    #[serde(default)]
    pub compiler: Option<Compiler>,
}

fn default_cellar() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("cellar")
        .join("Cellar")
}

fn default_source_cache() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("cellar")
        .join("sources")
}

fn default_jobs() -> usize {
    std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(4)
}

fn default_timeout_secs() -> u64 {
    3600 // 1 hour
}

fn default_system_prefix() -> PathBuf {
    PathBuf::from("/usr")
}

fn default_true() -> bool {
    true
}

impl Default for KitchenConfig {
    fn default() -> Self {
        Self {
            cellar: default_cellar(),
            source_cache: default_source_cache(),
            jobs: default_jobs(),
            timeout_secs: default_timeout_secs(),
            keep_builddir: false,
            system_prefix: default_system_prefix(),
            system_packages: BTreeSet::new(),
            run_tests: true,
            compiler: None,
        }
    }
}

impl KitchenConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::IoError(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        let config: KitchenConfig = toml::from_str(&content).map_err(|e| {
            Error::ParseError(format!("Failed to parse config file {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Configuration rooted in one directory (cellar and source cache side by side)
    pub fn rooted_at(root: &Path) -> Self {
        Self {
            cellar: root.join("Cellar"),
            source_cache: root.join("sources"),
            ..Self::default()
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.jobs == 0 {
            return Err(Error::ParseError("jobs must be at least 1".to_string()));
        }
        if self.cellar.as_os_str().is_empty() {
            return Err(Error::ParseError("cellar path cannot be empty".to_string()));
        }
        Ok(())
    }

    /// Per-process timeout, if any
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

/// Result of cooking a recipe
#[derive(Debug, Clone)]
pub struct CookResult {
    /// Where the build was installed
    pub prefix: InstallPrefix,
    /// Receipt written into the prefix
    pub receipt: InstallReceipt,
    /// Build log
    pub log: String,
    /// Warnings generated during build
    pub warnings: Vec<String>,
    /// Whether an existing install with the same fingerprint was reused
    pub from_cache: bool,
}

impl CookResult {
    pub fn fingerprint(&self) -> &str {
        &self.receipt.fingerprint
    }
}
