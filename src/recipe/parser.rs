// src/recipe/parser.rs

//! Recipe file parsing and linting

use crate::error::{Error, Result};
use crate::recipe::format::{Recipe, StepAction, Variant};
use crate::recipe::vars::{BUILTIN_VARIABLES, placeholders};
use regex::Regex;
use std::path::Path;

/// Parse a recipe from a TOML string
pub fn parse_recipe(content: &str) -> Result<Recipe> {
    toml::from_str(content).map_err(|e| Error::ParseError(format!("Invalid recipe: {}", e)))
}

/// Parse a recipe from a file
pub fn parse_recipe_file(path: &Path) -> Result<Recipe> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::IoError(format!("Failed to read recipe file {}: {}", path.display(), e))
    })?;

    parse_recipe(&content).map_err(|e| match e {
        Error::ParseError(msg) => Error::ParseError(format!("{}: {}", path.display(), msg)),
        other => other,
    })
}

/// Validate a recipe for completeness and correctness
///
/// Hard errors are returned as `Err`; soft problems come back as warnings.
/// Malformed checksums and unknown OS/variant tags are already rejected by
/// [`parse_recipe`].
pub fn validate_recipe(recipe: &Recipe) -> Result<Vec<String>> {
    let mut warnings = Vec::new();
    let name = &recipe.package.name;

    if name.is_empty() {
        return Err(Error::ParseError("Recipe package name cannot be empty".to_string()));
    }
    if name.contains('/') || name.contains(':') || name.chars().any(char::is_whitespace) {
        return Err(Error::ParseError(format!(
            "Invalid package name '{}': must not contain '/', ':' or whitespace",
            name
        )));
    }
    if recipe.package.version.is_empty() {
        return Err(Error::ParseError("Recipe package version cannot be empty".to_string()));
    }

    if recipe.all_dependency_names().contains(&name.as_str()) {
        return Err(Error::ParseError(format!("{} depends on itself", name)));
    }

    for key in recipe.variables.keys() {
        if BUILTIN_VARIABLES.contains(&key.as_str()) {
            return Err(Error::ParseError(format!(
                "Variable '{}' shadows a built-in placeholder",
                key
            )));
        }
    }

    for (index, step) in recipe.build.iter().enumerate() {
        let action = step
            .action(&[])
            .map_err(|e| Error::ParseError(format!("build step {}: {}", index, e)))?;

        if let StepAction::Replace(replace) = &action {
            Regex::new(&replace.pattern).map_err(|e| {
                Error::ParseError(format!(
                    "build step {}: invalid replace pattern '{}': {}",
                    index, replace.pattern, e
                ))
            })?;
        }
        if let Some(workdir) = &step.workdir
            && (Path::new(workdir).is_absolute() || workdir.split('/').any(|c| c == ".."))
        {
            return Err(Error::ParseError(format!(
                "build step {}: workdir '{}' must stay inside the source tree",
                index, workdir
            )));
        }
        if step.only_variant == Some(Variant::Head) && recipe.head.is_none() {
            warnings.push(format!(
                "build step {} only runs for head, but no [head] section is declared",
                index
            ));
        }
    }

    for (index, test) in recipe.test.iter().enumerate() {
        test.action()
            .map_err(|e| Error::ParseError(format!("test step {}: {}", index, e)))?;
        if let Some(command) = &test.command
            && placeholders(command).is_empty()
            && !command.contains('/')
        {
            warnings.push(format!(
                "test step {} runs '{}' from PATH rather than from the installed prefix",
                index, command
            ));
        }
    }

    if let Some(head) = &recipe.head
        && head.url.trim().is_empty()
    {
        warnings.push("[head] section has an empty url".to_string());
    }

    for failure in &recipe.fails_with {
        if failure.compiler.is_empty() || failure.compiler.contains('@') {
            return Err(Error::ParseError(format!(
                "fails_with: invalid compiler name '{}'",
                failure.compiler
            )));
        }
    }

    if let Some(livecheck) = &recipe.livecheck {
        let regex = Regex::new(&livecheck.regex).map_err(|e| {
            Error::ParseError(format!("livecheck: invalid regex '{}': {}", livecheck.regex, e))
        })?;
        if regex.captures_len() < 2 {
            warnings.push("livecheck regex has no capture group for the version".to_string());
        }
    }

    if recipe.package.description.is_none() {
        warnings.push("Missing package description".to_string());
    }
    if recipe.package.license.is_none() {
        warnings.push("Missing package license".to_string());
    }
    if recipe.package.homepage.is_none() {
        warnings.push("Missing package homepage".to_string());
    }
    if recipe.test.is_empty() {
        warnings.push("No test steps declared".to_string());
    }
    if recipe.build.is_empty() {
        warnings.push("No build steps declared".to_string());
    }

    Ok(warnings)
}
