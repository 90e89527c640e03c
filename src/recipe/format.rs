// src/recipe/format.rs

//! Recipe file format definitions
//!
//! Recipes are TOML files that describe how to fetch, build, install and
//! smoke-test one package. Shell snippets are replaced by typed steps: each
//! `[[build]]` entry carries exactly one action (`command`, `configure`,
//! `replace`, `mkdir`, `move`, `remove` or `append`).

use crate::error::{Error, Result};
use crate::hash::Hash;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// A complete recipe as written by a maintainer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Recipe {
    /// Package metadata
    pub package: PackageSection,

    /// Stable release source
    pub stable: StableSection,

    /// Development checkout (optional)
    #[serde(default)]
    pub head: Option<HeadSection>,

    /// Dependencies shared by every variant
    #[serde(default)]
    pub depends: Vec<DependencySpec>,

    /// Dependencies that macOS ships with the base system
    ///
    /// On every other OS these are ordinary dependencies.
    #[serde(default)]
    pub uses_from_macos: Vec<DependencySpec>,

    /// OS-guarded overrides
    #[serde(default)]
    pub os: OsSection,

    /// Packages that cannot be installed alongside this one
    #[serde(default)]
    pub conflicts: Vec<ConflictSpec>,

    /// Compilers this recipe is known not to build with
    #[serde(default)]
    pub fails_with: Vec<CompilerFailure>,

    /// Where to look for new upstream releases
    #[serde(default)]
    pub livecheck: Option<LivecheckSection>,

    /// Environment variables set for every build step
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Environment variables appended (space separated) to inherited values
    #[serde(default)]
    pub env_append: BTreeMap<String, String>,

    /// Variables for `%(name)s` substitution
    #[serde(default)]
    pub variables: BTreeMap<String, String>,

    /// Ordered build steps
    #[serde(default)]
    pub build: Vec<StepSpec>,

    /// Ordered smoke-test steps
    #[serde(default)]
    pub test: Vec<TestSpec>,
}

impl Recipe {
    /// Package name
    pub fn name(&self) -> &str {
        &self.package.name
    }

    /// Whether a head variant is declared
    pub fn has_head(&self) -> bool {
        self.head.is_some()
    }

    /// OS-specific overrides for `os`
    pub fn os_overrides(&self, os: Os) -> &OsOverrides {
        match os {
            Os::Linux => &self.os.linux,
            Os::Macos => &self.os.macos,
        }
    }

    /// Every dependency name mentioned anywhere in the recipe
    pub fn all_dependency_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .depends
            .iter()
            .chain(&self.uses_from_macos)
            .chain(&self.stable.depends)
            .chain(self.head.iter().flat_map(|h| &h.depends))
            .chain(&self.os.linux.depends)
            .chain(&self.os.macos.depends)
            .map(DependencySpec::name)
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}

/// Package metadata section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackageSection {
    /// Package name
    pub name: String,

    /// Upstream version
    pub version: String,

    /// Rebuild counter for the same upstream version
    #[serde(default)]
    pub revision: u32,

    /// Short description
    #[serde(default)]
    pub description: Option<String>,

    /// Homepage URL
    #[serde(default)]
    pub homepage: Option<String>,

    /// License expression
    #[serde(default)]
    pub license: Option<License>,
}

/// License declaration
///
/// Either a single SPDX expression or a conjunction/disjunction of several.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum License {
    /// A single SPDX expression
    Spdx(String),
    /// All of the listed licenses apply
    AllOf { all_of: Vec<String> },
    /// Any of the listed licenses may be chosen
    AnyOf { any_of: Vec<String> },
}

impl fmt::Display for License {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            License::Spdx(s) => write!(f, "{}", s),
            License::AllOf { all_of } => write!(f, "{}", all_of.join(" AND ")),
            License::AnyOf { any_of } => write!(f, "{}", any_of.join(" OR ")),
        }
    }
}

/// Stable source section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StableSection {
    /// Primary archive URL
    ///
    /// Supports `%(version)s` substitution.
    pub url: String,

    /// Alternate download locations for the same archive
    #[serde(default)]
    pub mirrors: Vec<String>,

    /// Checksum of the archive (`sha256:...`)
    pub checksum: Hash,

    /// Extra dependencies for stable builds
    #[serde(default)]
    pub depends: Vec<DependencySpec>,
}

/// Head (development checkout) section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HeadSection {
    /// Repository URL
    pub url: String,

    /// Branch to check out (repository default if omitted)
    #[serde(default)]
    pub branch: Option<String>,

    /// Version control system
    #[serde(default)]
    pub vcs: VcsKind,

    /// Extra dependencies for head builds
    #[serde(default)]
    pub depends: Vec<DependencySpec>,
}

/// Version control system for head checkouts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VcsKind {
    #[default]
    Git,
    Hg,
}

/// Dependency phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Needed only while building
    Build,
    /// Needed at run time (and therefore also while building)
    #[default]
    Run,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Build => "build",
            Phase::Run => "run",
        }
    }
}

/// A dependency declaration
///
/// A bare string is a run-time dependency; the table form names the phase:
/// `{ name = "pkg-config", phase = "build" }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependencySpec {
    Name(String),
    Detailed(DependencyDetail),
}

/// Table form of a dependency declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DependencyDetail {
    pub name: String,
    #[serde(default)]
    pub phase: Phase,
}

impl DependencySpec {
    pub fn name(&self) -> &str {
        match self {
            DependencySpec::Name(name) => name,
            DependencySpec::Detailed(detail) => &detail.name,
        }
    }

    pub fn phase(&self) -> Phase {
        match self {
            DependencySpec::Name(_) => Phase::Run,
            DependencySpec::Detailed(detail) => detail.phase,
        }
    }
}

/// OS-guarded override tables
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OsSection {
    #[serde(default)]
    pub linux: OsOverrides,
    #[serde(default)]
    pub macos: OsOverrides,
}

/// Overrides applied when building for one OS
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OsOverrides {
    /// Extra dependencies
    #[serde(default)]
    pub depends: Vec<DependencySpec>,

    /// Extra arguments for `configure` steps
    #[serde(default)]
    pub args: Vec<String>,

    /// Extra or overriding environment variables
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Values appended to the recipe's own `env_append` entries
    #[serde(default)]
    pub env_append: BTreeMap<String, String>,
}

/// A declared conflict with another package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConflictSpec {
    pub name: String,
    #[serde(default)]
    pub because: Option<String>,
}

/// A compiler a recipe does not build with
///
/// Without a version every release of the compiler is excluded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompilerFailure {
    pub compiler: String,
    #[serde(default)]
    pub version: Option<String>,
}

impl CompilerFailure {
    /// `version = "5"` matches gcc 5 and gcc 5.4, but not gcc 15
    pub fn matches(&self, compiler: &Compiler) -> bool {
        if self.compiler != compiler.name {
            return false;
        }
        match (&self.version, &compiler.version) {
            (None, _) => true,
            (Some(want), Some(have)) => have
                .strip_prefix(want.as_str())
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('.')),
            // An unversioned compiler only matches a blanket exclusion
            (Some(_), None) => false,
        }
    }
}

/// A build compiler, written `gcc` or `gcc@11`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Compiler {
    pub name: String,
    pub version: Option<String>,
}

impl fmt::Display for Compiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{}@{}", self.name, version),
            None => f.write_str(&self.name),
        }
    }
}

impl FromStr for Compiler {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (name, version) = match s.split_once('@') {
            Some((name, version)) => (name, Some(version)),
            None => (s, None),
        };
        if name.is_empty() || version.is_some_and(str::is_empty) {
            return Err(format!("invalid compiler '{}' (expected name or name@version)", s));
        }
        Ok(Self {
            name: name.to_string(),
            version: version.map(str::to_string),
        })
    }
}

impl TryFrom<String> for Compiler {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Compiler> for String {
    fn from(compiler: Compiler) -> Self {
        compiler.to_string()
    }
}

/// Upstream release check
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LivecheckSection {
    /// Page listing releases
    pub url: String,
    /// Pattern whose first capture group is a version
    pub regex: String,
}

/// Source variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    #[default]
    Stable,
    Head,
}

impl Variant {
    pub fn as_str(&self) -> &'static str {
        match self {
            Variant::Stable => "stable",
            Variant::Head => "head",
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Variant {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "stable" => Ok(Variant::Stable),
            "head" => Ok(Variant::Head),
            other => Err(format!("unknown variant '{}' (expected stable or head)", other)),
        }
    }
}

/// Target operating system tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Os {
    Linux,
    Macos,
}

impl Os {
    /// The OS this binary was compiled for
    pub fn host() -> Self {
        if cfg!(target_os = "macos") {
            Os::Macos
        } else {
            Os::Linux
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Os::Linux => "linux",
            Os::Macos => "macos",
        }
    }
}

impl Default for Os {
    fn default() -> Self {
        Os::host()
    }
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Os {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "linux" => Ok(Os::Linux),
            "macos" | "mac" | "darwin" => Ok(Os::Macos),
            other => Err(format!("unknown OS '{}' (expected linux or macos)", other)),
        }
    }
}

/// A build step as written in the recipe
///
/// Exactly one of the action fields must be set; [`StepSpec::action`]
/// turns the raw fields into a typed [`StepAction`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepSpec {
    /// Program to run (no shell)
    #[serde(default)]
    pub command: Option<String>,

    /// Run `./configure` with `args` plus the OS-specific args
    #[serde(default)]
    pub configure: bool,

    /// Arguments for `command` or `configure`
    #[serde(default)]
    pub args: Vec<String>,

    /// Regex edit of a source file
    #[serde(default)]
    pub replace: Option<ReplaceSpec>,

    /// Create a directory tree
    #[serde(default)]
    pub mkdir: Option<String>,

    /// Move a file, overwriting the target
    #[serde(default, rename = "move")]
    pub move_file: Option<MoveSpec>,

    /// Delete every path matching a glob
    #[serde(default)]
    pub remove: Option<String>,

    /// Append a line to a file
    #[serde(default)]
    pub append: Option<AppendSpec>,

    /// Working directory relative to the source root
    #[serde(default)]
    pub workdir: Option<String>,

    /// Extra environment for this step
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Only run when building for this OS
    #[serde(default)]
    pub only_os: Option<Os>,

    /// Only run for this variant
    #[serde(default)]
    pub only_variant: Option<Variant>,
}

/// `replace = { file, pattern, with }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReplaceSpec {
    pub file: String,
    pub pattern: String,
    #[serde(rename = "with")]
    pub replacement: String,
}

/// `move = { from, to }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MoveSpec {
    pub from: String,
    pub to: String,
}

/// `append = { file, line }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppendSpec {
    pub file: String,
    pub line: String,
}

/// A typed build action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepAction {
    Run { command: String, args: Vec<String> },
    Configure { args: Vec<String> },
    Replace(ReplaceSpec),
    Mkdir(String),
    Move(MoveSpec),
    Remove(String),
    Append(AppendSpec),
}

impl StepAction {
    /// Short label for logs
    pub fn label(&self) -> String {
        match self {
            StepAction::Run { command, .. } => command.clone(),
            StepAction::Configure { .. } => "./configure".to_string(),
            StepAction::Replace(r) => format!("replace in {}", r.file),
            StepAction::Mkdir(path) => format!("mkdir {}", path),
            StepAction::Move(m) => format!("move {} -> {}", m.from, m.to),
            StepAction::Remove(pattern) => format!("remove {}", pattern),
            StepAction::Append(a) => format!("append to {}", a.file),
        }
    }
}

impl StepSpec {
    /// Whether this step applies to the given OS and variant
    pub fn applies_to(&self, os: Os, variant: Variant) -> bool {
        self.only_os.is_none_or(|o| o == os) && self.only_variant.is_none_or(|v| v == variant)
    }

    /// Convert the raw fields into a typed action
    ///
    /// `os_args` are appended to `configure` steps.
    pub fn action(&self, os_args: &[String]) -> Result<StepAction> {
        let mut actions = Vec::new();

        if let Some(command) = &self.command {
            actions.push(StepAction::Run {
                command: command.clone(),
                args: self.args.clone(),
            });
        }
        if self.configure {
            let mut args = self.args.clone();
            args.extend(os_args.iter().cloned());
            actions.push(StepAction::Configure { args });
        }
        if let Some(replace) = &self.replace {
            actions.push(StepAction::Replace(replace.clone()));
        }
        if let Some(path) = &self.mkdir {
            actions.push(StepAction::Mkdir(path.clone()));
        }
        if let Some(m) = &self.move_file {
            actions.push(StepAction::Move(m.clone()));
        }
        if let Some(pattern) = &self.remove {
            actions.push(StepAction::Remove(pattern.clone()));
        }
        if let Some(append) = &self.append {
            actions.push(StepAction::Append(append.clone()));
        }

        match actions.len() {
            0 => Err(Error::ParseError(
                "build step has no action (command, configure, replace, mkdir, move, remove, append)"
                    .to_string(),
            )),
            1 => Ok(actions.remove(0)),
            n => Err(Error::ParseError(format!(
                "build step has {} actions, expected exactly one",
                n
            ))),
        }
    }
}

/// A test step as written in the recipe
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TestSpec {
    /// Program to run
    #[serde(default)]
    pub command: Option<String>,

    /// Arguments
    #[serde(default)]
    pub args: Vec<String>,

    /// Data written to the program's stdin
    #[serde(default)]
    pub stdin: Option<String>,

    /// Exact expected stdout (one trailing newline is ignored)
    #[serde(default)]
    pub expect_stdout: Option<String>,

    /// Expected exit code (default 0)
    #[serde(default)]
    pub expect_exit: Option<i32>,

    /// Write a fixture file into the test directory
    #[serde(default)]
    pub write: Option<WriteSpec>,

    /// Extra environment
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    #[serde(default)]
    pub only_os: Option<Os>,

    #[serde(default)]
    pub only_variant: Option<Variant>,
}

/// `write = { file, content }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WriteSpec {
    pub file: String,
    pub content: String,
}

/// What a test run must produce
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Expectation {
    ExitCode(i32),
    Stdout(String),
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expectation::ExitCode(code) => write!(f, "exit code {}", code),
            Expectation::Stdout(out) => write!(f, "stdout {:?}", out),
        }
    }
}

/// A typed test action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestAction {
    Run {
        command: String,
        args: Vec<String>,
        stdin: Option<String>,
        expect: Expectation,
    },
    Write(WriteSpec),
}

impl TestSpec {
    pub fn applies_to(&self, os: Os, variant: Variant) -> bool {
        self.only_os.is_none_or(|o| o == os) && self.only_variant.is_none_or(|v| v == variant)
    }

    /// Convert the raw fields into a typed action
    pub fn action(&self) -> Result<TestAction> {
        match (&self.command, &self.write) {
            (Some(_), Some(_)) => Err(Error::ParseError(
                "test step sets both command and write".to_string(),
            )),
            (None, None) => Err(Error::ParseError(
                "test step has neither command nor write".to_string(),
            )),
            (None, Some(write)) => Ok(TestAction::Write(write.clone())),
            (Some(command), None) => {
                let expect = match (&self.expect_stdout, self.expect_exit) {
                    (Some(_), Some(_)) => {
                        return Err(Error::ParseError(format!(
                            "test step '{}' sets both expect_stdout and expect_exit",
                            command
                        )));
                    }
                    (Some(out), None) => Expectation::Stdout(out.clone()),
                    (None, code) => Expectation::ExitCode(code.unwrap_or(0)),
                };
                Ok(TestAction::Run {
                    command: command.clone(),
                    args: self.args.clone(),
                    stdin: self.stdin.clone(),
                    expect,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RECIPE: &str = r#"
depends = [
    { name = "pkg-config", phase = "build" },
    "proj",
    "geos",
]
uses_from_macos = ["curl"]
conflicts = [{ name = "cpl", because = "both install cpl_error.h" }]

[package]
name = "gdal"
version = "3.5.1"
revision = 1
description = "Geospatial Data Abstraction Library"
license = "MIT"

[stable]
url = "http://download.osgeo.org/gdal/%(version)s/gdal-%(version)s.tar.xz"
checksum = "sha256:d12c30a9eacdeaab493c0d1c9f88eb337c9cbb5bb40744c751bdd5a5af166ab6"

[head]
url = "https://github.com/OSGeo/gdal.git"
branch = "master"
depends = [{ name = "doxygen", phase = "build" }]

[os.linux]
depends = ["gcc"]
args = ["--with-curl=%(curl:bin)s/curl-config"]

[os.macos]
args = ["--with-opencl"]

[[build]]
configure = true
args = ["--prefix=%(prefix)s"]

[[build]]
command = "make"

[[build]]
command = "make"
args = ["man"]
only_variant = "head"

[[test]]
command = "%(bin)s/gdalinfo"
args = ["--formats"]
"#;

    #[test]
    fn test_parse_recipe() {
        let recipe: Recipe = toml::from_str(SAMPLE_RECIPE).unwrap();

        assert_eq!(recipe.package.name, "gdal");
        assert_eq!(recipe.package.revision, 1);
        assert_eq!(recipe.package.license, Some(License::Spdx("MIT".to_string())));
        assert_eq!(recipe.depends.len(), 3);
        assert_eq!(recipe.depends[0].phase(), Phase::Build);
        assert_eq!(recipe.depends[1].phase(), Phase::Run);
        assert_eq!(recipe.head.as_ref().unwrap().vcs, VcsKind::Git);
        assert_eq!(recipe.os.linux.depends.len(), 1);
        assert_eq!(recipe.build.len(), 3);
        assert_eq!(recipe.test.len(), 1);
    }

    #[test]
    fn test_all_dependency_names() {
        let recipe: Recipe = toml::from_str(SAMPLE_RECIPE).unwrap();
        assert_eq!(
            recipe.all_dependency_names(),
            vec!["curl", "doxygen", "gcc", "geos", "pkg-config", "proj"]
        );
    }

    #[test]
    fn test_license_forms() {
        #[derive(Deserialize)]
        struct Wrapper {
            license: License,
        }

        let all: Wrapper =
            toml::from_str(r#"license = { all_of = ["GPL-3.0-or-later", "LGPL-2.1-or-later"] }"#)
                .unwrap();
        assert_eq!(all.license.to_string(), "GPL-3.0-or-later AND LGPL-2.1-or-later");

        let any: Wrapper = toml::from_str(r#"license = { any_of = ["MIT", "Apache-2.0"] }"#).unwrap();
        assert_eq!(any.license.to_string(), "MIT OR Apache-2.0");
    }

    #[test]
    fn test_step_guards() {
        let recipe: Recipe = toml::from_str(SAMPLE_RECIPE).unwrap();
        let man = &recipe.build[2];
        assert!(man.applies_to(Os::Linux, Variant::Head));
        assert!(!man.applies_to(Os::Linux, Variant::Stable));
        assert!(recipe.build[0].applies_to(Os::Macos, Variant::Stable));
    }

    #[test]
    fn test_configure_action_appends_os_args() {
        let recipe: Recipe = toml::from_str(SAMPLE_RECIPE).unwrap();
        let action = recipe.build[0].action(&recipe.os.macos.args).unwrap();
        assert_eq!(
            action,
            StepAction::Configure {
                args: vec!["--prefix=%(prefix)s".to_string(), "--with-opencl".to_string()]
            }
        );
    }

    #[test]
    fn test_step_requires_exactly_one_action() {
        let empty = StepSpec::default();
        assert!(empty.action(&[]).is_err());

        let double = StepSpec {
            command: Some("make".to_string()),
            mkdir: Some("out".to_string()),
            ..Default::default()
        };
        assert!(double.action(&[]).is_err());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let bad = SAMPLE_RECIPE.replace("revision = 1", "revison = 1");
        assert!(toml::from_str::<Recipe>(&bad).is_err());
    }

    #[test]
    fn test_unknown_dependency_field_rejected() {
        let with_dep = |dep: &str| SAMPLE_RECIPE.replacen("depends = [", &format!("depends = [{}, ", dep), 1);

        let good: Recipe = toml::from_str(&with_dep(r#"{ name = "m4", phase = "build" }"#)).unwrap();
        assert_eq!(good.depends[0].name(), "m4");
        assert_eq!(good.depends[0].phase(), Phase::Build);

        let bad = with_dep(r#"{ name = "m4", phse = "build" }"#);
        assert!(toml::from_str::<Recipe>(&bad).is_err());
    }

    #[test]
    fn test_compiler_parse_and_match() {
        let gcc5: Compiler = "gcc@5".parse().unwrap();
        assert_eq!(gcc5.name, "gcc");
        assert_eq!(gcc5.version.as_deref(), Some("5"));
        assert_eq!(gcc5.to_string(), "gcc@5");
        assert!("@5".parse::<Compiler>().is_err());
        assert!("gcc@".parse::<Compiler>().is_err());

        let failure = CompilerFailure {
            compiler: "gcc".to_string(),
            version: Some("5".to_string()),
        };
        assert!(failure.matches(&gcc5));
        assert!(failure.matches(&"gcc@5.4.0".parse().unwrap()));
        assert!(!failure.matches(&"gcc@15".parse().unwrap()));
        assert!(!failure.matches(&"gcc".parse().unwrap()));
        assert!(!failure.matches(&"clang@5".parse().unwrap()));

        let every_gcc = CompilerFailure {
            compiler: "gcc".to_string(),
            version: None,
        };
        assert!(every_gcc.matches(&"gcc".parse().unwrap()));
    }

    #[test]
    fn test_fails_with_and_livecheck_fields() {
        let content = format!(
            r#"fails_with = [{{ compiler = "gcc", version = "5" }}]
{}
[livecheck]
url = "https://download.osgeo.org/gdal/CURRENT/"
regex = 'href=.*?gdal[._-]v?(\d+(?:\.\d+)+)\.t'
"#,
            SAMPLE_RECIPE
        );
        let recipe: Recipe = toml::from_str(&content).unwrap();
        assert_eq!(recipe.fails_with.len(), 1);
        assert_eq!(recipe.fails_with[0].version.as_deref(), Some("5"));
        assert_eq!(
            recipe.livecheck.as_ref().map(|l| l.url.as_str()),
            Some("https://download.osgeo.org/gdal/CURRENT/")
        );

        let bad = content.replace("version = \"5\"", "versoin = \"5\"");
        assert!(toml::from_str::<Recipe>(&bad).is_err());
    }

    #[test]
    fn test_unknown_os_rejected() {
        let bad = format!("{}\n[os.windows]\nargs = []\n", SAMPLE_RECIPE);
        assert!(toml::from_str::<Recipe>(&bad).is_err());
    }

    #[test]
    fn test_test_expectations() {
        let stdout = TestSpec {
            command: Some("lou_translate".to_string()),
            stdin: Some("42".to_string()),
            expect_stdout: Some("⠼⠙⠃".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            stdout.action().unwrap(),
            TestAction::Run { expect: Expectation::Stdout(_), stdin: Some(_), .. }
        ));

        let default_exit = TestSpec {
            command: Some("octave".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            default_exit.action().unwrap(),
            TestAction::Run { expect: Expectation::ExitCode(0), .. }
        ));

        let both = TestSpec {
            command: Some("x".to_string()),
            expect_stdout: Some("y".to_string()),
            expect_exit: Some(1),
            ..Default::default()
        };
        assert!(both.action().is_err());
    }

    #[test]
    fn test_os_and_variant_from_str() {
        assert_eq!("linux".parse::<Os>().unwrap(), Os::Linux);
        assert_eq!("Darwin".parse::<Os>().unwrap(), Os::Macos);
        assert!("windows".parse::<Os>().is_err());
        assert_eq!("HEAD".parse::<Variant>().unwrap(), Variant::Head);
    }
}
