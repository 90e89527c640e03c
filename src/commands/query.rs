// src/commands/query.rs

//! Read-only commands: plan, deps, uses, info

use super::{Session, os_or_host};
use crate::cli::PlanArgs;
use anyhow::{Result, bail};
use cellar::recipe::{BuildPlan, Cellar, Kitchen, Os, Recipe, RecipeBook, Variant};
use std::collections::BTreeSet;

/// Print the resolved build order and the layers that could build in parallel
pub fn cmd_plan(session: &Session, args: &PlanArgs) -> Result<()> {
    let book = session.book()?;
    let plan = session.resolve(&book, args)?;
    let kitchen = Kitchen::new(session.config.clone());

    println!("Build plan ({} recipe(s)):", plan.len());
    for (idx, planned) in plan.recipes().iter().enumerate() {
        let recipe = &planned.recipe;
        let marker = if planned.requested { "*" } else { " " };
        println!(
            "{:>3}. {}{} {} ({})",
            idx + 1,
            marker,
            recipe.name,
            recipe.keg_name(),
            recipe.variant
        );
        let cached = if kitchen.sources_cached(recipe) { " (cached)" } else { "" };
        println!("       source: {}{}", recipe.source.describe(), cached);
        if !planned.system_deps.is_empty() {
            let system: Vec<&str> = planned.system_deps.iter().map(|d| d.name.as_str()).collect();
            println!("       system: {}", system.join(", "));
        }
    }

    print_layers(&plan);
    Ok(())
}

fn print_layers(plan: &BuildPlan) {
    println!("\nLayers:");
    for (depth, layer) in plan.layers().iter().enumerate() {
        let names: Vec<&str> = layer
            .iter()
            .filter_map(|&idx| plan.get(idx).map(|p| p.name()))
            .collect();
        println!("  {}: {}", depth, names.join(" "));
    }
}

/// Print every transitive dependency of a recipe
pub fn cmd_deps(session: &Session, name: &str, os: Option<Os>) -> Result<()> {
    let book = session.book()?;
    ensure_recipe(&book, name)?;
    let graph = book.dependency_graph(os_or_host(os))?;
    let deps = graph.transitive_dependencies(name);
    print_names(&book, name, "depends on", &deps);
    Ok(())
}

/// Print every recipe that transitively depends on a recipe
pub fn cmd_uses(session: &Session, name: &str, os: Option<Os>) -> Result<()> {
    let book = session.book()?;
    let graph = book.dependency_graph(os_or_host(os))?;
    if !graph.contains(name) && !book.is_system_package(name) {
        bail!("No recipe or dependency named {}", name);
    }
    let users = graph.transitive_dependents(name);
    print_names(&book, name, "is used by", &users);
    Ok(())
}

fn print_names(book: &RecipeBook, name: &str, relation: &str, names: &BTreeSet<String>) {
    if names.is_empty() {
        println!("{} {} nothing", name, relation);
        return;
    }
    println!("{} {} {} recipe(s):", name, relation, names.len());
    for other in names {
        if book.get(other).is_some() {
            println!("  {}", other);
        } else {
            println!("  {} (no recipe)", other);
        }
    }
}

/// Print recipe metadata and what is installed
pub fn cmd_info(session: &Session, name: &str) -> Result<()> {
    let book = session.book()?;
    let recipe = ensure_recipe(&book, name)?;
    let stable = recipe.resolve(Variant::Stable, Os::host())?;

    println!("{} {}", stable.name, stable.keg_name());
    if let Some(description) = &stable.description {
        println!("  {}", description);
    }
    if let Some(homepage) = &stable.homepage {
        println!("  Homepage: {}", homepage);
    }
    if let Some(license) = &stable.license {
        println!("  License:  {}", license);
    }
    if let Some(path) = book.path_of(name) {
        println!("  Recipe:   {}", path.display());
    }
    println!("  Stable:   {}", stable.source.url());
    if recipe.has_head() {
        let head = recipe.resolve(Variant::Head, Os::host())?;
        println!("  Head:     {}", head.source.describe());
    }
    if let Some(livecheck) = &recipe.livecheck {
        println!("  Livecheck: {} ({})", livecheck.url, livecheck.regex);
    }
    for failure in &recipe.fails_with {
        match &failure.version {
            Some(version) => println!("  Fails with {} {}", failure.compiler, version),
            None => println!("  Fails with {}", failure.compiler),
        }
    }

    if !stable.dependencies.is_empty() {
        println!("  Dependencies ({}):", Os::host());
        for dep in &stable.dependencies {
            let system = if book.is_system_package(&dep.name) { ", system" } else { "" };
            println!("    {} ({}{})", dep.name, dep.phase.as_str(), system);
        }
    }
    for conflict in &stable.conflicts {
        match &conflict.because {
            Some(because) => println!("  Conflicts with {}: {}", conflict.name, because),
            None => println!("  Conflicts with {}", conflict.name),
        }
    }

    let installed = Cellar::new(&session.config.cellar).installed(name)?;
    if installed.is_empty() {
        println!("  Not installed");
    } else {
        println!("  Installed:");
        for (prefix, receipt) in installed {
            let revision = receipt
                .source_revision
                .as_deref()
                .map(|r| format!(" at {}", r))
                .unwrap_or_default();
            println!(
                "    {} ({}{}, built {})",
                prefix.path().display(),
                receipt.variant,
                revision,
                receipt.built_at.format("%Y-%m-%d %H:%M")
            );
        }
    }
    Ok(())
}

fn ensure_recipe<'a>(book: &'a RecipeBook, name: &str) -> Result<&'a Recipe> {
    match book.get(name) {
        Some(recipe) => Ok(recipe),
        None => bail!("No recipe named {} in the recipe directory", name),
    }
}
