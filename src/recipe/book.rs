// src/recipe/book.rs

//! Recipe collections and build planning
//!
//! A [`RecipeBook`] holds every known recipe plus the names of packages the
//! host system provides. [`RecipeBook::resolve`] turns a set of targets into
//! a [`BuildPlan`]: every recipe that must be built, each resolved to one
//! variant, in a deterministic dependency order.

use crate::error::{Error, Result};
use crate::recipe::format::{Compiler, Os, Recipe, Variant};
use crate::recipe::graph::RecipeGraph;
use crate::recipe::parser::parse_recipe_file;
use crate::recipe::resolved::{Dependency, ResolvedRecipe};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Options for [`RecipeBook::resolve`]
#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    /// OS to resolve OS-guarded sections for
    pub os: Os,
    /// Targets to build from their head source
    ///
    /// Only applies to the named targets; their dependencies stay stable.
    pub head: BTreeSet<String>,
    /// Compiler the plan will be built with, checked against `fails_with`
    pub compiler: Option<Compiler>,
}

impl ResolveOptions {
    pub fn for_os(os: Os) -> Self {
        Self {
            os,
            head: BTreeSet::new(),
            compiler: None,
        }
    }

    pub fn with_head(mut self, name: impl Into<String>) -> Self {
        self.head.insert(name.into());
        self
    }

    pub fn with_compiler(mut self, compiler: Option<Compiler>) -> Self {
        self.compiler = compiler;
        self
    }
}

/// A recipe in a build plan
#[derive(Debug, Clone)]
pub struct PlannedRecipe {
    pub recipe: ResolvedRecipe,
    /// Plan indices of the recipes this one depends on, ascending
    pub deps: Vec<usize>,
    /// Dependencies satisfied by the host system
    pub system_deps: Vec<Dependency>,
    /// Whether this recipe was named as a target
    pub requested: bool,
}

impl PlannedRecipe {
    pub fn name(&self) -> &str {
        &self.recipe.name
    }
}

/// An ordered, deduplicated list of recipes to build
///
/// Every recipe appears after all of its dependencies. Among recipes whose
/// dependencies are satisfied, names sort lexicographically, so resolving
/// the same targets twice gives the same plan.
#[derive(Debug, Clone, Default)]
pub struct BuildPlan {
    recipes: Vec<PlannedRecipe>,
    dependents: Vec<Vec<usize>>,
}

impl BuildPlan {
    fn new(recipes: Vec<PlannedRecipe>) -> Self {
        let mut dependents = vec![Vec::new(); recipes.len()];
        for (idx, planned) in recipes.iter().enumerate() {
            for &dep in &planned.deps {
                dependents[dep].push(idx);
            }
        }
        Self { recipes, dependents }
    }

    pub fn recipes(&self) -> &[PlannedRecipe] {
        &self.recipes
    }

    pub fn len(&self) -> usize {
        self.recipes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipes.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&PlannedRecipe> {
        self.recipes.get(idx)
    }

    /// Recipe names in build order
    pub fn names(&self) -> Vec<&str> {
        self.recipes.iter().map(PlannedRecipe::name).collect()
    }

    /// Plan index of a recipe
    pub fn position(&self, name: &str) -> Option<usize> {
        self.recipes.iter().position(|p| p.recipe.name == name)
    }

    /// Plan indices of the recipes that directly depend on `idx`
    pub fn dependents(&self, idx: usize) -> &[usize] {
        &self.dependents[idx]
    }

    /// Plan indices of every recipe that depends on `idx`, directly or not
    pub fn transitive_dependents(&self, idx: usize) -> BTreeSet<usize> {
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<usize> = self.dependents[idx].iter().copied().collect();
        while let Some(next) = queue.pop_front() {
            if seen.insert(next) {
                queue.extend(self.dependents[next].iter().copied());
            }
        }
        seen
    }

    /// Groups of mutually independent recipes, by plan index
    ///
    /// Everything in layer N only depends on recipes in earlier layers.
    pub fn layers(&self) -> Vec<Vec<usize>> {
        let mut depth = vec![0usize; self.recipes.len()];
        let mut layers: Vec<Vec<usize>> = Vec::new();
        // Plan order is topological, so dependencies already have their depth
        for (idx, planned) in self.recipes.iter().enumerate() {
            depth[idx] = planned.deps.iter().map(|&d| depth[d] + 1).max().unwrap_or(0);
            if layers.len() <= depth[idx] {
                layers.resize_with(depth[idx] + 1, Vec::new);
            }
            layers[depth[idx]].push(idx);
        }
        layers
    }
}

/// A collection of recipes and system packages
#[derive(Debug, Clone, Default)]
pub struct RecipeBook {
    recipes: BTreeMap<String, Recipe>,
    paths: BTreeMap<String, PathBuf>,
    system_packages: BTreeSet<String>,
}

impl RecipeBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every `*.toml` recipe in a directory
    ///
    /// The file stem must match the package name.
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let mut book = Self::new();
        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
            .map_err(|e| {
                Error::IoError(format!("Failed to read recipe directory {}: {}", dir.display(), e))
            })?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "toml"))
            .collect();
        files.sort();

        for path in files {
            let recipe = parse_recipe_file(&path)?;
            let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
            if stem != recipe.package.name {
                return Err(Error::ParseError(format!(
                    "{}: file name does not match package name '{}'",
                    path.display(),
                    recipe.package.name
                )));
            }
            book.paths.insert(recipe.package.name.clone(), path);
            book.insert(recipe)?;
        }

        info!("Loaded {} recipe(s) from {}", book.len(), dir.display());
        Ok(book)
    }

    /// Add a recipe; names must be unique
    pub fn insert(&mut self, recipe: Recipe) -> Result<()> {
        let name = recipe.package.name.clone();
        if self.recipes.contains_key(&name) {
            return Err(Error::ParseError(format!("Duplicate recipe: {}", name)));
        }
        self.recipes.insert(name, recipe);
        Ok(())
    }

    /// Declare packages provided by the host system
    pub fn with_system_packages<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.system_packages.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn is_system_package(&self, name: &str) -> bool {
        self.system_packages.contains(name)
    }

    pub fn get(&self, name: &str) -> Option<&Recipe> {
        self.recipes.get(name)
    }

    /// File a recipe was loaded from, if any
    pub fn path_of(&self, name: &str) -> Option<&Path> {
        self.paths.get(name).map(PathBuf::as_path)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.recipes.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.recipes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipes.is_empty()
    }

    /// Dependency graph of the whole book (stable variants)
    ///
    /// System packages are left out. Dependencies with no recipe still get
    /// a node so reverse queries work on incomplete books.
    pub fn dependency_graph(&self, os: Os) -> Result<RecipeGraph> {
        let mut graph = RecipeGraph::new();
        for recipe in self.recipes.values() {
            let resolved = recipe.resolve(Variant::Stable, os)?;
            let deps: Vec<&str> = resolved
                .dependency_names()
                .filter(|d| !self.is_system_package(d))
                .collect();
            graph.add_recipe(&resolved.name, &deps);
        }
        Ok(graph)
    }

    /// Resolve targets into a build plan
    ///
    /// Fails with [`Error::UnresolvedDependency`] when a dependency has no
    /// recipe and is not a system package, [`Error::Cycle`] when the
    /// dependency graph loops, [`Error::Conflict`] when two planned
    /// recipes declare a conflict, and [`Error::UnsupportedCompiler`] when a
    /// planned recipe lists the chosen compiler in `fails_with`.
    pub fn resolve(&self, targets: &[&str], options: &ResolveOptions) -> Result<BuildPlan> {
        let requested: BTreeSet<&str> = targets.iter().copied().collect();

        for name in &options.head {
            if !requested.contains(name.as_str()) {
                return Err(Error::ParseError(format!(
                    "--head {} given, but {} is not a build target",
                    name, name
                )));
            }
        }

        // Walk the dependency closure, resolving each recipe once
        let mut resolved: BTreeMap<String, ResolvedRecipe> = BTreeMap::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        for target in &requested {
            if self.is_system_package(target) {
                return Err(Error::NotFound(format!(
                    "{} is provided by the system and has nothing to build",
                    target
                )));
            }
            if !self.recipes.contains_key(*target) {
                return Err(Error::NotFound(format!("No recipe named {}", target)));
            }
            queue.push_back(target);
        }

        while let Some(name) = queue.pop_front() {
            if resolved.contains_key(name) {
                continue;
            }
            let Some(recipe) = self.recipes.get(name) else {
                continue;
            };
            let variant = if options.head.contains(name) {
                Variant::Head
            } else {
                Variant::Stable
            };
            if let Some(compiler) = &options.compiler
                && recipe.fails_with.iter().any(|f| f.matches(compiler))
            {
                return Err(Error::UnsupportedCompiler {
                    recipe: name.to_string(),
                    compiler: compiler.to_string(),
                });
            }
            let r = recipe.resolve(variant, options.os)?;
            debug!("Resolved {} ({}, {})", r.name, r.variant, r.os);

            for dep in r.dependency_names() {
                if self.is_system_package(dep) {
                    continue;
                }
                match self.recipes.get_key_value(dep) {
                    Some((key, _)) => queue.push_back(key.as_str()),
                    None => {
                        return Err(Error::UnresolvedDependency {
                            recipe: r.name.clone(),
                            dependency: dep.to_string(),
                        });
                    }
                }
            }
            resolved.insert(name.to_string(), r);
        }

        // Order
        let mut graph = RecipeGraph::new();
        for r in resolved.values() {
            let deps: Vec<&str> = r
                .dependency_names()
                .filter(|d| !self.is_system_package(d))
                .collect();
            graph.add_recipe(&r.name, &deps);
        }
        let order = graph.topological_order()?;

        for r in resolved.values() {
            for conflict in &r.conflicts {
                if resolved.contains_key(&conflict.name) {
                    return Err(Error::Conflict {
                        recipe: r.name.clone(),
                        other: conflict.name.clone(),
                        because: conflict
                            .because
                            .clone()
                            .unwrap_or_else(|| "declared conflict".to_string()),
                    });
                }
            }
        }

        // Graph index -> plan index
        let mut plan_index = vec![0usize; graph.len()];
        for (pos, &node) in order.iter().enumerate() {
            plan_index[node] = pos;
        }

        let mut planned = Vec::with_capacity(order.len());
        for &node in &order {
            let name = graph.name(node);
            let Some(recipe) = resolved.remove(name) else {
                continue;
            };
            let mut deps: Vec<usize> = graph
                .dependency_indices(node)
                .map(|d| plan_index[d])
                .collect();
            deps.sort_unstable();
            let system_deps = recipe
                .dependencies
                .iter()
                .filter(|d| self.is_system_package(&d.name))
                .cloned()
                .collect();
            planned.push(PlannedRecipe {
                requested: requested.contains(recipe.name.as_str()),
                recipe,
                deps,
                system_deps,
            });
        }

        info!(
            "Resolved {} target(s) into {} recipe(s)",
            requested.len(),
            planned.len()
        );
        Ok(BuildPlan::new(planned))
    }
}
