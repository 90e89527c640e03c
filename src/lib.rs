// src/lib.rs

//! Cellar: recipe-driven source builds
//!
//! Cellar reads declarative build recipes, resolves a dependency-ordered
//! build plan, fetches and verifies sources, runs typed build steps into
//! per-version install prefixes, and smoke-tests the results.
//!
//! # Architecture
//!
//! - Recipes: TOML files with stable/head variants and per-OS overrides
//! - Plans: deterministic topological order, cycles rejected up front
//! - Kitchen: checksum-keyed source cache, one scratch directory per build
//! - Cellar: `<root>/<name>/<version>` prefixes with JSON install receipts

mod error;
pub mod hash;
pub mod progress;
pub mod recipe;

pub use error::{Error, Result, TestFailure};
pub use hash::{Hash, HashAlgorithm, Hasher};
pub use progress::{
    CallbackProgress, CliProgress, LogProgress, ProgressEvent, ProgressTracker, SilentProgress,
};
pub use recipe::{
    BuildPlan, Kitchen, KitchenConfig, Recipe, RecipeBook, ResolveOptions, Scheduler,
};
