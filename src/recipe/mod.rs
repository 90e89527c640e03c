// src/recipe/mod.rs

//! Recipe system for building packages from source
//!
//! Recipes define how to build a package from source, including:
//! - Stable source archives with checksums, and optional head checkouts
//! - Dependencies, tagged with the phase that needs them
//! - Per-OS dependency and flag overrides
//! - Typed build steps and smoke tests
//!
//! # Culinary Terminology
//!
//! We use cooking metaphors:
//! - **Recipe**: Declarative build instructions (like a recipe card)
//! - **Book**: The collection of recipes a build resolves against
//! - **Cook**: Build a package from a recipe
//! - **Kitchen**: Where builds happen, with its source cache and cellar
//! - **Prep**: Fetch and verify sources
//! - **Simmer**: The actual build process
//! - **Plate**: Finish the install and write its receipt
//! - **Taste**: Run the smoke tests against the installed prefix
//! - **Cellar**: Where finished builds are kept, one prefix per version
//!
//! # Example Recipe
//!
//! ```toml
//! depends = ["proj", "geos", { name = "pkg-config", phase = "build" }]
//!
//! [package]
//! name = "gdal"
//! version = "3.8.4"
//!
//! [stable]
//! url = "https://download.osgeo.org/gdal/%(version)s/gdal-%(version)s.tar.xz"
//! checksum = "sha256:abc123..."
//!
//! [[build]]
//! configure = true
//! args = ["--prefix=%(prefix)s", "--with-proj=%(proj:prefix)s"]
//!
//! [[build]]
//! command = "make"
//! args = ["install"]
//!
//! [[test]]
//! command = "%(bin)s/gdalinfo"
//! args = ["--version"]
//! ```

mod book;
mod cellar;
mod format;
mod graph;
mod kitchen;
pub mod parser;
mod resolved;
mod schedule;
mod taste;
pub mod vars;

pub use book::{BuildPlan, PlannedRecipe, RecipeBook, ResolveOptions};
pub use cellar::{
    Cellar, InstallPrefix, InstallReceipt, InstalledDep, PREVIOUS_SUFFIX, RECEIPT_FILE,
    ReceiptDependency,
};
pub use format::{
    AppendSpec, Compiler, CompilerFailure, ConflictSpec, DependencyDetail, DependencySpec,
    Expectation, HeadSection, License, LivecheckSection, MoveSpec, Os, OsOverrides, OsSection,
    PackageSection, Phase, Recipe, ReplaceSpec, StableSection, StepAction, StepSpec, TestAction,
    TestSpec, Variant, VcsKind, WriteSpec,
};
pub use graph::RecipeGraph;
pub use kitchen::{
    ArchiveFormat, Cook, CookResult, Kitchen, KitchenConfig, clone_vcs, download_file,
    extract_archive, url_filename, vcs_revision,
};
pub use parser::{parse_recipe, parse_recipe_file, validate_recipe};
pub use resolved::{Dependency, HEAD_KEG, ResolvedRecipe, Source, Step, TestStep};
pub use schedule::{BatchReport, BuildOutcome, RecipeOutcome, Scheduler};
pub use taste::{TestReport, TestRunner};
pub use vars::Substitutions;
