// src/commands/lint.rs

//! Lint command - validate recipe files

use super::Session;
use anyhow::{Context, Result, bail};
use cellar::recipe::{parse_recipe_file, validate_recipe};
use std::path::{Path, PathBuf};

/// Validate recipe files, or every recipe in the recipe directory
pub fn cmd_lint(session: &Session, files: &[PathBuf]) -> Result<()> {
    let files = if files.is_empty() {
        recipe_files(&session.recipes)?
    } else {
        files.to_vec()
    };
    if files.is_empty() {
        bail!("No recipe files found in {}", session.recipes.display());
    }

    let mut errors = 0;
    let mut warnings = 0;
    for path in &files {
        match lint_file(path) {
            Ok(found) if found.is_empty() => println!("[OK] {}", path.display()),
            Ok(found) => {
                println!("[OK] {} ({} warning(s))", path.display(), found.len());
                for warning in &found {
                    println!("    warning: {}", warning);
                }
                warnings += found.len();
            }
            Err(e) => {
                println!("[ERROR] {}: {:#}", path.display(), e);
                errors += 1;
            }
        }
    }

    println!(
        "\n{} recipe(s) checked, {} error(s), {} warning(s)",
        files.len(),
        errors,
        warnings
    );
    if errors > 0 {
        bail!("{} recipe(s) failed validation", errors);
    }
    Ok(())
}

fn lint_file(path: &Path) -> Result<Vec<String>> {
    let recipe = parse_recipe_file(path)?;
    let mut warnings = validate_recipe(&recipe)?;
    if path.file_stem().and_then(|s| s.to_str()) != Some(recipe.package.name.as_str()) {
        warnings.push(format!(
            "file name does not match package name '{}'; the recipe directory will reject it",
            recipe.package.name
        ));
    }
    Ok(warnings)
}

fn recipe_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read recipe directory {}", dir.display()))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "toml"))
        .collect();
    files.sort();
    Ok(files)
}
