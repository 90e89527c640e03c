// src/recipe/vars.rs

//! `%(name)s` placeholder expansion
//!
//! Unlike a plain string replace, every placeholder must resolve: an unknown
//! name is reported as [`Error::MissingVariable`] so a step never runs with a
//! half-expanded command line.

use crate::error::{Error, Result};
use crate::recipe::cellar::{InstallPrefix, InstalledDep};
use crate::recipe::resolved::ResolvedRecipe;
use std::collections::BTreeMap;
use std::path::Path;

/// Names that recipes may not redefine in `[variables]`
pub const BUILTIN_VARIABLES: &[&str] = &[
    "name",
    "version",
    "prefix",
    "bin",
    "lib",
    "include",
    "share",
    "man",
    "buildpath",
    "jobs",
    "testpath",
];

/// A set of placeholder values
#[derive(Debug, Clone, Default)]
pub struct Substitutions {
    values: BTreeMap<String, String>,
}

impl Substitutions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value, replacing any previous one
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// Builder form of [`Substitutions::set`]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Values for expanding source URLs (only name and version are known)
    pub fn for_source(name: &str, version: &str) -> Self {
        Self::new().with("name", name).with("version", version)
    }

    /// Values available to build and test steps
    ///
    /// Covers the recipe's own prefix directories, the build path, the job
    /// count, one `<dep>:<dir>` set per dependency, and the recipe's custom
    /// variables (which are expanded against everything else first).
    pub fn for_build(
        recipe: &ResolvedRecipe,
        prefix: &InstallPrefix,
        buildpath: &Path,
        jobs: usize,
        deps: &[InstalledDep],
    ) -> Result<Self> {
        let mut subs = Self::new()
            .with("name", &recipe.name)
            .with("version", &recipe.version)
            .with("buildpath", buildpath.to_string_lossy())
            .with("jobs", jobs.to_string());
        subs.add_prefix(None, prefix);
        subs.set("share", prefix.share().to_string_lossy());
        subs.set("man", prefix.man().to_string_lossy());

        for dep in deps {
            subs.add_prefix(Some(&dep.name), &dep.prefix);
        }

        // Custom variables may refer to each other, so expand them in dependency order
        let mut pending: BTreeMap<&str, &str> = BTreeMap::new();
        for (key, template) in &recipe.variables {
            if BUILTIN_VARIABLES.contains(&key.as_str()) || key.contains(':') {
                return Err(Error::ParseError(format!(
                    "{}: variable '{}' shadows a built-in placeholder",
                    recipe.name, key
                )));
            }
            pending.insert(key, template);
        }

        while !pending.is_empty() {
            let ready: Vec<&str> = pending
                .iter()
                .filter(|(_, template)| {
                    placeholders(template)
                        .iter()
                        .all(|name| !pending.contains_key(name))
                })
                .map(|(key, _)| *key)
                .collect();

            if ready.is_empty() {
                let names: Vec<&str> = pending.keys().copied().collect();
                return Err(Error::ParseError(format!(
                    "{}: variables {} refer to each other",
                    recipe.name,
                    names.join(", ")
                )));
            }

            for key in ready {
                if let Some(template) = pending.remove(key) {
                    let value = subs.expand(template)?;
                    subs.set(key, value);
                }
            }
        }

        Ok(subs)
    }

    fn add_prefix(&mut self, dep: Option<&str>, prefix: &InstallPrefix) {
        let key = |dir: &str| match dep {
            Some(name) => format!("{}:{}", name, dir),
            None => dir.to_string(),
        };
        self.set(key("prefix"), prefix.path().to_string_lossy());
        self.set(key("bin"), prefix.bin().to_string_lossy());
        self.set(key("lib"), prefix.lib().to_string_lossy());
        self.set(key("include"), prefix.include().to_string_lossy());
    }

    /// Expand every `%(key)s` in `template`
    pub fn expand(&self, template: &str) -> Result<String> {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(start) = rest.find("%(") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let Some(end) = after.find(")s") else {
                // No terminator: keep the text as written
                out.push_str(&rest[start..]);
                return Ok(out);
            };
            let name = &after[..end];
            let value = self.values.get(name).ok_or_else(|| Error::MissingVariable {
                name: name.to_string(),
                template: template.to_string(),
            })?;
            out.push_str(value);
            rest = &after[end + 2..];
        }

        out.push_str(rest);
        Ok(out)
    }

    /// Expand a list of templates
    pub fn expand_all(&self, templates: &[String]) -> Result<Vec<String>> {
        templates.iter().map(|t| self.expand(t)).collect()
    }

    /// Expand the values of an environment map
    pub fn expand_env(&self, env: &BTreeMap<String, String>) -> Result<BTreeMap<String, String>> {
        env.iter()
            .map(|(k, v)| Ok((k.clone(), self.expand(v)?)))
            .collect()
    }
}

/// Placeholder names referenced by a template, in order of appearance
pub fn placeholders(template: &str) -> Vec<&str> {
    let mut names = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find("%(") {
        let after = &rest[start + 2..];
        let Some(end) = after.find(")s") else {
            break;
        };
        names.push(&after[..end]);
        rest = &after[end + 2..];
    }
    names
}
