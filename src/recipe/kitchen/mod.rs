// src/recipe/kitchen/mod.rs

//! Kitchen: where resolved recipes are cooked into install prefixes
//!
//! The Kitchen handles:
//! - Fetching source archives (cached by checksum) and head checkouts
//! - Extracting sources into a build directory owned by one build
//! - Running the typed build steps
//! - Writing the install receipt into the prefix
//!
//! ## Cooking Process
//! 1. **Prep**: Fetch and verify the source (a mismatch stops here)
//! 2. **Unpack**: Extract the archive; a lone top-level directory becomes the source root
//! 3. **Simmer**: Run the build steps in order, stopping at the first failure
//! 4. **Plate**: Check the prefix and write `INSTALL_RECEIPT.json`
//!
//! A build whose fingerprint matches an existing receipt is not repeated.

mod archive;
mod config;
mod cook;
pub mod process;

pub use archive::{
    ArchiveFormat, clone_vcs, download_file, extract_archive, url_filename, vcs_revision,
};
pub use config::{CookResult, KitchenConfig};
pub use cook::Cook;
pub(crate) use cook::search_path;

use crate::error::{Error, Result};
use crate::hash::{Hash, hash_file};
use crate::recipe::book::BuildPlan;
use crate::recipe::cellar::{Cellar, InstallPrefix, InstallReceipt, InstalledDep};
use crate::recipe::resolved::{ResolvedRecipe, Source};
use rayon::prelude::*;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// The Kitchen: where recipes are cooked
pub struct Kitchen {
    pub(crate) config: KitchenConfig,
    cellar: Cellar,
}

impl Kitchen {
    /// Create a new Kitchen with the given configuration
    pub fn new(config: KitchenConfig) -> Self {
        let cellar = Cellar::new(&config.cellar);
        Self { config, cellar }
    }

    /// Create a Kitchen with default configuration
    pub fn with_defaults() -> Self {
        Self::new(KitchenConfig::default())
    }

    pub fn config(&self) -> &KitchenConfig {
        &self.config
    }

    pub fn cellar(&self) -> &Cellar {
        &self.cellar
    }

    /// Cook a resolved recipe into its install prefix
    ///
    /// `deps` must hold one entry per dependency of the recipe, already
    /// installed (or system-provided).
    pub fn cook(&self, recipe: &ResolvedRecipe, deps: &[InstalledDep]) -> Result<CookResult> {
        let dep_fingerprints: Vec<(&str, &str)> = deps
            .iter()
            .map(|d| (d.name.as_str(), d.fingerprint.as_str()))
            .collect();
        let fingerprint = recipe.fingerprint(&dep_fingerprints)?;
        let prefix = self.cellar.prefix_for(recipe);
        let installed = self.cellar.receipt(recipe)?;

        // A checkout can move under the same fingerprint, so head builds are
        // only reused once prep has seen the revision
        if let Source::Archive { .. } = recipe.source
            && let Some(receipt) = installed.clone()
            && receipt.fingerprint == fingerprint
        {
            return Ok(Self::cache_hit(recipe, prefix, receipt));
        }

        info!("Cooking {} version {} ({})", recipe.name, recipe.version, recipe.variant);

        let mut cook = Cook::new(self, recipe, deps, fingerprint)?;

        info!("Prep: fetching ingredients...");
        if let Err(e) = cook.prep() {
            cook.discard();
            return Err(e);
        }

        if let Some(receipt) = installed
            && receipt.fingerprint == cook.fingerprint
            && receipt.source_revision.is_some()
            && receipt.source_revision == cook.revision
        {
            return Ok(Self::cache_hit(recipe, prefix, receipt));
        }

        let outcome = (|| {
            info!("Unpacking sources...");
            cook.unpack()?;

            info!("Simmering: running build...");
            cook.simmer()?;

            info!("Plating: writing install receipt...");
            cook.plate()
        })();

        match outcome {
            Ok(receipt) => Ok(CookResult {
                prefix,
                receipt,
                log: cook.log,
                warnings: cook.warnings,
                from_cache: false,
            }),
            Err(e) => {
                cook.discard();
                Err(e)
            }
        }
    }

    fn cache_hit(
        recipe: &ResolvedRecipe,
        prefix: InstallPrefix,
        receipt: InstallReceipt,
    ) -> CookResult {
        info!(
            "{} {} already installed (fingerprint {})",
            recipe.name,
            recipe.keg_name(),
            &receipt.fingerprint[..12]
        );
        CookResult {
            prefix,
            log: format!("Cache hit: {}", receipt.fingerprint),
            receipt,
            warnings: Vec::new(),
            from_cache: true,
        }
    }

    /// Fetch the source for a recipe without building
    ///
    /// Returns the cached archive path, or `None` for head checkouts, which
    /// are cloned at build time.
    pub fn fetch(&self, recipe: &ResolvedRecipe) -> Result<Option<PathBuf>> {
        match &recipe.source {
            Source::Archive { url, mirrors, checksum } => {
                info!("Fetching sources for {} version {}", recipe.name, recipe.version);
                self.fetch_source(url, mirrors, checksum).map(Some)
            }
            Source::Vcs { url, .. } => {
                debug!("{} builds from {}, nothing to prefetch", recipe.name, url);
                Ok(None)
            }
        }
    }

    /// Fetch and verify every archive in a plan in parallel
    ///
    /// Returns one result per planned recipe, in plan order.
    pub fn fetch_all(&self, plan: &BuildPlan) -> Vec<(String, Result<Option<PathBuf>>)> {
        plan.recipes()
            .par_iter()
            .map(|planned| {
                let recipe = &planned.recipe;
                (recipe.name.clone(), self.fetch(recipe))
            })
            .collect()
    }

    /// Check if the source for a recipe is already cached
    pub fn sources_cached(&self, recipe: &ResolvedRecipe) -> bool {
        match recipe.source.checksum() {
            Some(checksum) => self.cache_path(checksum).exists(),
            None => false,
        }
    }

    fn cache_path(&self, checksum: &Hash) -> PathBuf {
        // Use checksum as cache key
        let cache_key = checksum.to_prefixed_string().replace(':', "_");
        self.config.source_cache.join(cache_key)
    }

    /// Fetch a source archive (with caching)
    ///
    /// Mirrors are tried in order when a download fails. Content that does
    /// not match the checksum is never cached.
    pub(crate) fn fetch_source(
        &self,
        url: &str,
        mirrors: &[String],
        checksum: &Hash,
    ) -> Result<PathBuf> {
        fs::create_dir_all(&self.config.source_cache)?;
        let cached_path = self.cache_path(checksum);

        // Check if already cached
        if cached_path.exists() {
            debug!("Using cached source: {}", cached_path.display());
            if hash_file(checksum.algorithm, &cached_path)? == *checksum {
                return Ok(cached_path);
            }
            warn!("Cached file checksum mismatch, re-downloading");
            fs::remove_file(&cached_path)?;
        }

        let mut last_error = None;
        for candidate in std::iter::once(url).chain(mirrors.iter().map(String::as_str)) {
            let temp = tempfile::NamedTempFile::new_in(&self.config.source_cache)?;

            info!("Downloading: {}", candidate);
            if let Err(e) = download_file(candidate, temp.path()) {
                warn!("{}", e);
                last_error = Some(e);
                continue;
            }

            let actual = hash_file(checksum.algorithm, temp.path())?;
            if actual != *checksum {
                return Err(Error::ChecksumMismatch {
                    url: candidate.to_string(),
                    expected: checksum.to_string(),
                    actual: actual.to_string(),
                });
            }

            temp.persist(&cached_path).map_err(|e| {
                Error::IoError(format!(
                    "Failed to store {} in source cache: {}",
                    candidate, e.error
                ))
            })?;
            return Ok(cached_path);
        }

        Err(last_error
            .unwrap_or_else(|| Error::DownloadError(format!("No source URL for {}", url))))
    }
}
