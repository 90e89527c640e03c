// src/recipe/resolved.rs

//! Recipes resolved to one variant and one OS
//!
//! A [`ResolvedRecipe`] is what the kitchen actually cooks: the source is
//! fixed, dependencies are merged and deduplicated, OS-guarded overrides are
//! folded in, and every build and test step has been turned into a typed
//! action. Placeholders are still unexpanded at this point because install
//! prefixes are only known at cook time.

use crate::error::{Error, Result};
use crate::hash::{Hash, sha256};
use crate::recipe::format::{
    ConflictSpec, DependencySpec, Os, Phase, Recipe, StepAction, TestAction, Variant, VcsKind,
};
use crate::recipe::vars::Substitutions;
use serde::Serialize;
use std::collections::BTreeMap;

/// Keg name of every head build
pub const HEAD_KEG: &str = "HEAD";

/// Where the source for a build comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Source {
    /// A checksummed release archive
    Archive {
        url: String,
        mirrors: Vec<String>,
        checksum: Hash,
    },
    /// A version control checkout (not content-addressed)
    Vcs {
        url: String,
        branch: Option<String>,
        vcs: VcsKind,
    },
}

impl Source {
    /// Primary URL
    pub fn url(&self) -> &str {
        match self {
            Source::Archive { url, .. } | Source::Vcs { url, .. } => url,
        }
    }

    pub fn checksum(&self) -> Option<&Hash> {
        match self {
            Source::Archive { checksum, .. } => Some(checksum),
            Source::Vcs { .. } => None,
        }
    }

    /// Short description recorded in install receipts
    pub fn describe(&self) -> String {
        match self {
            Source::Archive { checksum, .. } => checksum.to_string(),
            Source::Vcs { url, branch, .. } => match branch {
                Some(b) => format!("{}#{}", url, b),
                None => url.clone(),
            },
        }
    }
}

/// A merged dependency edge
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dependency {
    pub name: String,
    pub phase: Phase,
}

/// A build step with its action and context
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Step {
    /// Position in the recipe's `[[build]]` list (0-based)
    pub index: usize,
    pub action: StepAction,
    pub workdir: Option<String>,
    pub env: BTreeMap<String, String>,
}

/// A test step with its action
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestStep {
    /// Position in the recipe's `[[test]]` list (0-based)
    pub index: usize,
    pub action: TestAction,
    pub env: BTreeMap<String, String>,
}

/// A recipe with its variant and OS fixed
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedRecipe {
    pub name: String,
    pub version: String,
    pub revision: u32,
    pub description: Option<String>,
    pub homepage: Option<String>,
    pub license: Option<String>,
    pub variant: Variant,
    pub os: Os,
    pub source: Source,
    /// Sorted by name, one entry per dependency
    pub dependencies: Vec<Dependency>,
    pub conflicts: Vec<ConflictSpec>,
    /// Recipe env with the OS env layered on top
    pub env: BTreeMap<String, String>,
    pub env_append: BTreeMap<String, String>,
    pub variables: BTreeMap<String, String>,
    pub steps: Vec<Step>,
    pub tests: Vec<TestStep>,
}

impl ResolvedRecipe {
    /// Directory name under `<cellar>/<name>/`
    ///
    /// Stable builds use the version, plus `_<revision>` when non-zero. Head
    /// builds always go to `HEAD`, so they never replace a stable keg.
    pub fn keg_name(&self) -> String {
        if self.variant == Variant::Head {
            HEAD_KEG.to_string()
        } else if self.revision == 0 {
            self.version.clone()
        } else {
            format!("{}_{}", self.version, self.revision)
        }
    }

    /// Dependency names in order
    pub fn dependency_names(&self) -> impl Iterator<Item = &str> {
        self.dependencies.iter().map(|d| d.name.as_str())
    }

    /// Build fingerprint
    ///
    /// SHA-256 over everything that affects the installed output plus the
    /// fingerprints of the dependencies it was built against. Two builds
    /// with the same fingerprint produce interchangeable prefixes.
    pub fn fingerprint(&self, dep_fingerprints: &[(&str, &str)]) -> Result<String> {
        let mut deps: Vec<(&str, &str)> = dep_fingerprints.to_vec();
        deps.sort_unstable();

        #[derive(Serialize)]
        struct Input<'a> {
            recipe: &'a ResolvedRecipe,
            deps: Vec<(&'a str, &'a str)>,
        }

        let json = serde_json::to_vec(&Input { recipe: self, deps })
            .map_err(|e| Error::ParseError(format!("Failed to serialize recipe: {}", e)))?;
        Ok(sha256(&json))
    }
}

impl Recipe {
    /// Resolve this recipe for one variant and OS
    ///
    /// Merges base, variant, OS and `uses_from_macos` dependencies (keeping
    /// the stronger phase on duplicates), drops steps whose guards exclude
    /// this combination, and expands `%(name)s`/`%(version)s` in source URLs.
    pub fn resolve(&self, variant: Variant, os: Os) -> Result<ResolvedRecipe> {
        let name = self.package.name.clone();
        let overrides = self.os_overrides(os);
        let url_subs = Substitutions::for_source(&self.package.name, &self.package.version);

        let (source, variant_deps) = match variant {
            Variant::Stable => (
                Source::Archive {
                    url: url_subs.expand(&self.stable.url)?,
                    mirrors: url_subs.expand_all(&self.stable.mirrors)?,
                    checksum: self.stable.checksum.clone(),
                },
                &self.stable.depends,
            ),
            Variant::Head => {
                let head = self.head.as_ref().ok_or_else(|| {
                    Error::NotFound(format!("{} has no head source", name))
                })?;
                (
                    Source::Vcs {
                        url: url_subs.expand(&head.url)?,
                        branch: head.branch.clone(),
                        vcs: head.vcs,
                    },
                    &head.depends,
                )
            }
        };

        let mut merged: BTreeMap<String, Phase> = BTreeMap::new();
        let macos_provided: &[DependencySpec] = if os == Os::Macos {
            &[]
        } else {
            &self.uses_from_macos
        };
        for dep in self
            .depends
            .iter()
            .chain(variant_deps)
            .chain(&overrides.depends)
            .chain(macos_provided)
        {
            if dep.name() == name {
                return Err(Error::ParseError(format!("{} depends on itself", name)));
            }
            let phase = merged.entry(dep.name().to_string()).or_insert(dep.phase());
            *phase = (*phase).max(dep.phase());
        }
        let dependencies = merged
            .into_iter()
            .map(|(name, phase)| Dependency { name, phase })
            .collect();

        let mut env = self.env.clone();
        env.extend(overrides.env.clone());

        let mut env_append = self.env_append.clone();
        for (key, value) in &overrides.env_append {
            env_append
                .entry(key.clone())
                .and_modify(|base| {
                    base.push(' ');
                    base.push_str(value);
                })
                .or_insert_with(|| value.clone());
        }

        let mut steps = Vec::new();
        for (index, spec) in self.build.iter().enumerate() {
            if !spec.applies_to(os, variant) {
                continue;
            }
            let action = spec.action(&overrides.args).map_err(|e| {
                Error::ParseError(format!("{}: build step {}: {}", name, index, e))
            })?;
            steps.push(Step {
                index,
                action,
                workdir: spec.workdir.clone(),
                env: spec.env.clone(),
            });
        }

        let mut tests = Vec::new();
        for (index, spec) in self.test.iter().enumerate() {
            if !spec.applies_to(os, variant) {
                continue;
            }
            let action = spec.action().map_err(|e| {
                Error::ParseError(format!("{}: test step {}: {}", name, index, e))
            })?;
            tests.push(TestStep {
                index,
                action,
                env: spec.env.clone(),
            });
        }

        Ok(ResolvedRecipe {
            name,
            version: self.package.version.clone(),
            revision: self.package.revision,
            description: self.package.description.clone(),
            homepage: self.package.homepage.clone(),
            license: self.package.license.as_ref().map(ToString::to_string),
            variant,
            os,
            source,
            dependencies,
            conflicts: self.conflicts.clone(),
            env,
            env_append,
            variables: self.variables.clone(),
            steps,
            tests,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::parser::parse_recipe;

    const OCTAVE: &str = r#"
depends = [
    { name = "gnu-sed", phase = "build" },
    { name = "pkg-config", phase = "build" },
    "fftw",
    "glpk",
]
uses_from_macos = ["curl", { name = "bison", phase = "build" }]

[package]
name = "octave"
version = "7.2.0"
revision = 2

[stable]
url = "https://ftp.gnu.org/gnu/octave/octave-%(version)s.tar.xz"
mirrors = ["https://ftpmirror.gnu.org/octave/octave-%(version)s.tar.xz"]
checksum = "sha256:b12cb652587d31c5c382b85ec4ae4ee1ecb39fea8b6e02e8f4a1b6b9a5f3a2c1"

[head]
url = "https://hg.savannah.gnu.org/hgweb/octave"
branch = "default"
vcs = "hg"
depends = [
    { name = "autoconf", phase = "build" },
    { name = "automake", phase = "build" },
    { name = "fftw", phase = "build" },
]

[os.linux]
depends = ["gcc"]
env = { CXXFLAGS = "-O2" }

[os.macos]
args = ["--with-x=no"]

[env]
CXXFLAGS = "-O3"

[[build]]
command = "./bootstrap"
only_variant = "head"

[[build]]
configure = true
args = ["--prefix=%(prefix)s"]

[[build]]
command = "make"
args = ["all"]

[[build]]
command = "make"
args = ["install"]

[[test]]
command = "%(bin)s/octave"
args = ["--eval", "1+1"]

[[test]]
command = "%(bin)s/octave"
args = ["--eval", "exit(1)"]
expect_exit = 1
only_os = "macos"
"#;

    fn octave() -> Recipe {
        parse_recipe(OCTAVE).unwrap()
    }

    #[test]
    fn test_stable_linux() {
        let resolved = octave().resolve(Variant::Stable, Os::Linux).unwrap();

        assert_eq!(resolved.keg_name(), "7.2.0_2");
        assert_eq!(
            resolved.source.url(),
            "https://ftp.gnu.org/gnu/octave/octave-7.2.0.tar.xz"
        );
        assert!(matches!(&resolved.source, Source::Archive { mirrors, .. }
            if mirrors[0] == "https://ftpmirror.gnu.org/octave/octave-7.2.0.tar.xz"));

        let names: Vec<&str> = resolved.dependency_names().collect();
        assert_eq!(
            names,
            vec!["bison", "curl", "fftw", "gcc", "glpk", "gnu-sed", "pkg-config"]
        );

        // bootstrap is head-only
        assert_eq!(resolved.steps.len(), 3);
        assert_eq!(resolved.steps[0].index, 1);
        assert_eq!(resolved.env.get("CXXFLAGS").map(String::as_str), Some("-O2"));
        assert_eq!(resolved.tests.len(), 1);
    }

    #[test]
    fn test_macos_uses_system_packages_and_os_args() {
        let resolved = octave().resolve(Variant::Stable, Os::Macos).unwrap();

        let names: Vec<&str> = resolved.dependency_names().collect();
        assert!(!names.contains(&"curl"));
        assert!(!names.contains(&"gcc"));
        assert_eq!(
            resolved.steps[0].action,
            StepAction::Configure {
                args: vec!["--prefix=%(prefix)s".to_string(), "--with-x=no".to_string()]
            }
        );
        assert_eq!(resolved.tests.len(), 2);
    }

    #[test]
    fn test_head_adds_depends_and_keeps_stronger_phase() {
        let resolved = octave().resolve(Variant::Head, Os::Linux).unwrap();

        assert!(matches!(resolved.source, Source::Vcs { vcs: VcsKind::Hg, .. }));
        let phase_of = |n: &str| {
            resolved
                .dependencies
                .iter()
                .find(|d| d.name == n)
                .map(|d| d.phase)
        };
        assert_eq!(phase_of("autoconf"), Some(Phase::Build));
        // base declares fftw as run, head as build; run wins
        assert_eq!(phase_of("fftw"), Some(Phase::Run));
        assert_eq!(resolved.steps.len(), 4);
    }

    #[test]
    fn test_head_and_stable_use_separate_kegs() {
        let stable = octave().resolve(Variant::Stable, Os::Linux).unwrap();
        let head = octave().resolve(Variant::Head, Os::Linux).unwrap();
        assert_eq!(stable.keg_name(), "7.2.0_2");
        assert_eq!(head.keg_name(), HEAD_KEG);
    }

    #[test]
    fn test_os_env_append_extends_base_append() {
        let mut recipe = octave();
        recipe
            .env_append
            .insert("LDFLAGS".to_string(), "-L%(fftw:lib)s".to_string());
        recipe
            .os
            .linux
            .env_append
            .insert("LDFLAGS".to_string(), "-lgfortran".to_string());
        recipe
            .os
            .linux
            .env_append
            .insert("CFLAGS".to_string(), "-I%(buildpath)s/libinterp".to_string());

        let linux = recipe.resolve(Variant::Stable, Os::Linux).unwrap();
        assert_eq!(
            linux.env_append.get("LDFLAGS").map(String::as_str),
            Some("-L%(fftw:lib)s -lgfortran")
        );
        assert_eq!(
            linux.env_append.get("CFLAGS").map(String::as_str),
            Some("-I%(buildpath)s/libinterp")
        );
        // Appends never replace the inherited value
        assert!(!linux.env.contains_key("LDFLAGS"));

        let macos = recipe.resolve(Variant::Stable, Os::Macos).unwrap();
        assert_eq!(
            macos.env_append.get("LDFLAGS").map(String::as_str),
            Some("-L%(fftw:lib)s")
        );
        assert!(!macos.env_append.contains_key("CFLAGS"));
    }

    #[test]
    fn test_head_without_head_section() {
        let mut recipe = octave();
        recipe.head = None;
        assert!(matches!(
            recipe.resolve(Variant::Head, Os::Linux),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_self_dependency_rejected() {
        let mut recipe = octave();
        recipe.depends.push(DependencySpec::Name("octave".to_string()));
        assert!(recipe.resolve(Variant::Stable, Os::Linux).is_err());
    }

    #[test]
    fn test_fingerprint_tracks_dependencies() {
        let resolved = octave().resolve(Variant::Stable, Os::Linux).unwrap();

        let a = resolved.fingerprint(&[("fftw", "aaa"), ("glpk", "bbb")]).unwrap();
        let b = resolved.fingerprint(&[("glpk", "bbb"), ("fftw", "aaa")]).unwrap();
        let c = resolved.fingerprint(&[("fftw", "ccc"), ("glpk", "bbb")]).unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }
}
