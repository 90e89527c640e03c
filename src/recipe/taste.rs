// src/recipe/taste.rs

//! Taste: smoke-testing an installed recipe
//!
//! Test steps run in a fresh scratch directory (`%(testpath)s`) against the
//! installed prefix. A failing test is recorded in the [`TestReport`] and
//! never removes the install.

use crate::error::{Error, Result, TestFailure};
use crate::recipe::cellar::{InstallPrefix, InstalledDep};
use crate::recipe::format::{Expectation, TestAction};
use crate::recipe::kitchen::process::{ProcessSpec, run_process};
use crate::recipe::kitchen::KitchenConfig;
use crate::recipe::resolved::{ResolvedRecipe, TestStep};
use crate::recipe::vars::Substitutions;
use std::collections::BTreeMap;
use std::fs;
use std::time::Duration;
use tracing::{info, warn};

/// Outcome of running a recipe's test steps
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestReport {
    pub recipe: String,
    /// Indices of test steps that passed
    pub passed: Vec<usize>,
    pub failures: Vec<TestFailure>,
    pub log: String,
}

impl TestReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Total number of test steps that ran
    pub fn total(&self) -> usize {
        self.passed.len() + self.failures.len()
    }
}

/// Runs test steps against an installed prefix
pub struct TestRunner {
    jobs: usize,
    timeout: Option<Duration>,
}

impl TestRunner {
    pub fn new(config: &KitchenConfig) -> Self {
        Self {
            jobs: config.jobs,
            timeout: config.timeout(),
        }
    }

    /// Run every test step of `recipe`
    ///
    /// `Err` is reserved for problems that prevent testing at all (an
    /// unusable scratch directory, an unknown placeholder). Individual test
    /// failures land in the report.
    pub fn run(
        &self,
        recipe: &ResolvedRecipe,
        prefix: &InstallPrefix,
        deps: &[InstalledDep],
    ) -> Result<TestReport> {
        let mut report = TestReport {
            recipe: recipe.name.clone(),
            ..Default::default()
        };
        if recipe.tests.is_empty() {
            return Ok(report);
        }

        let scratch = tempfile::Builder::new()
            .prefix(&format!("cellar-test-{}-", recipe.name))
            .tempdir()
            .map_err(|e| Error::IoError(format!("Failed to create test directory: {}", e)))?;
        let testpath = scratch.path();

        let mut subs = Substitutions::for_build(recipe, prefix, testpath, self.jobs, deps)?;
        subs.set("testpath", testpath.to_string_lossy());

        let path = crate::recipe::kitchen::search_path(
            std::iter::once(prefix.bin()).chain(
                deps.iter()
                    .filter(|d| !d.is_system())
                    .map(|d| d.prefix.bin()),
            ),
        );
        let mut base_env = BTreeMap::new();
        base_env.insert("PATH".to_string(), path);
        base_env.insert("HOME".to_string(), testpath.to_string_lossy().into_owned());

        info!("Testing {} ({} step(s))", recipe.name, recipe.tests.len());

        for step in &recipe.tests {
            match self.run_step(recipe, step, &subs, &base_env, testpath, &mut report.log) {
                Ok(()) => report.passed.push(step.index),
                Err(Error::TestFailure(failure)) => {
                    warn!("{}", failure);
                    report.failures.push(failure);
                }
                Err(other) => return Err(other),
            }
        }

        Ok(report)
    }

    fn run_step(
        &self,
        recipe: &ResolvedRecipe,
        step: &TestStep,
        subs: &Substitutions,
        base_env: &BTreeMap<String, String>,
        testpath: &std::path::Path,
        log: &mut String,
    ) -> Result<()> {
        let failure = |expected: String, actual: String| -> Error {
            TestFailure {
                recipe: recipe.name.clone(),
                step_index: step.index,
                actual,
                expected,
            }
            .into()
        };

        match &step.action {
            TestAction::Write(write) => {
                let path = testpath.join(subs.expand(&write.file)?);
                let content = subs.expand(&write.content)?;
                let written = match path.parent() {
                    Some(parent) => fs::create_dir_all(parent),
                    None => Ok(()),
                }
                .and_then(|()| fs::write(&path, content));
                if let Err(e) = written {
                    return Err(failure(format!("wrote {}", write.file), e.to_string()));
                }
                log.push_str(&format!("=== test {}: wrote {} ===\n", step.index, path.display()));
                Ok(())
            }
            TestAction::Run {
                command,
                args,
                stdin,
                expect,
            } => {
                let command = subs.expand(command)?;
                let args = subs.expand_all(args)?;
                let stdin = stdin.as_deref().map(|s| subs.expand(s)).transpose()?;
                let expect = match expect {
                    Expectation::Stdout(out) => Expectation::Stdout(subs.expand(out)?),
                    other => other.clone(),
                };

                let mut env = base_env.clone();
                env.extend(subs.expand_env(&step.env)?);

                let output = match run_process(&ProcessSpec {
                    program: &command,
                    args: &args,
                    cwd: testpath,
                    env: &env,
                    stdin: stdin.as_deref(),
                    timeout: self.timeout,
                }) {
                    Ok(output) => output,
                    Err(e @ (Error::IoError(_) | Error::Timeout { .. })) => {
                        return Err(failure(expect.to_string(), e.to_string()));
                    }
                    Err(e) => return Err(e),
                };

                log.push_str(&format!("=== test {}: {} ===\n", step.index, command));
                log.push_str(&output.stdout);
                log.push_str(&output.stderr);

                match &expect {
                    Expectation::ExitCode(code) if output.exit_code != *code => Err(failure(
                        expect.to_string(),
                        format!("exit code {}", output.exit_code),
                    )),
                    Expectation::Stdout(expected) => {
                        let actual = trim_one_newline(&output.stdout);
                        if actual == trim_one_newline(expected) {
                            Ok(())
                        } else {
                            Err(failure(expect.to_string(), format!("stdout {:?}", actual)))
                        }
                    }
                    Expectation::ExitCode(_) => Ok(()),
                }
            }
        }
    }
}

/// Drop a single trailing newline (`\n` or `\r\n`)
fn trim_one_newline(s: &str) -> &str {
    s.strip_suffix("\r\n")
        .or_else(|| s.strip_suffix('\n'))
        .unwrap_or(s)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::recipe::format::{Os, Variant};
    use crate::recipe::parser::parse_recipe;
    use tempfile::TempDir;

    fn recipe(tests: &str) -> ResolvedRecipe {
        let content = format!(
            r#"
[package]
name = "liblouis"
version = "3.22.0"

[stable]
url = "https://example.com/liblouis-%(version)s.tar.gz"
checksum = "sha256:b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"

{}
"#,
            tests
        );
        parse_recipe(&content)
            .unwrap()
            .resolve(Variant::Stable, Os::Linux)
            .unwrap()
    }

    fn runner() -> TestRunner {
        TestRunner {
            jobs: 1,
            timeout: Some(Duration::from_secs(30)),
        }
    }

    #[test]
    fn test_trim_one_newline() {
        assert_eq!(trim_one_newline("a\n"), "a");
        assert_eq!(trim_one_newline("a\n\n"), "a\n");
        assert_eq!(trim_one_newline("a\r\n"), "a");
        assert_eq!(trim_one_newline("a"), "a");
    }

    #[test]
    fn test_stdout_and_exit_expectations() {
        let tmp = TempDir::new().unwrap();
        let prefix = InstallPrefix::new(tmp.path());
        let resolved = recipe(
            r#"
[[test]]
command = "cat"
stdin = "⠼⠁⠃⠉"
expect_stdout = "⠼⠁⠃⠉\n"

[[test]]
command = "sh"
args = ["-c", "exit 2"]
expect_exit = 2

[[test]]
command = "sh"
args = ["-c", "echo wrong"]
expect_stdout = "right"
"#,
        );

        let report = runner().run(&resolved, &prefix, &[]).unwrap();
        assert_eq!(report.passed, vec![0, 1]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].step_index, 2);
        assert_eq!(report.failures[0].actual, "stdout \"wrong\"");
        assert!(!report.is_success());
        assert_eq!(report.total(), 3);
    }

    #[test]
    fn test_write_fixture_then_use_it() {
        let tmp = TempDir::new().unwrap();
        let prefix = InstallPrefix::new(tmp.path());
        let resolved = recipe(
            r#"
[[test]]
write = { file = "oct_demo.cc", content = "int main() {}" }

[[test]]
command = "cat"
args = ["%(testpath)s/oct_demo.cc"]
expect_stdout = "int main() {}"
"#,
        );

        let report = runner().run(&resolved, &prefix, &[]).unwrap();
        assert!(report.is_success(), "{:?}", report.failures);
    }

    #[test]
    fn test_unwritable_fixture_is_test_failure() {
        let tmp = TempDir::new().unwrap();
        let prefix = InstallPrefix::new(tmp.path());
        let resolved = recipe(
            r#"
[[test]]
write = { file = ".", content = "unused" }

[[test]]
command = "true"
"#,
        );

        let report = runner().run(&resolved, &prefix, &[]).unwrap();
        assert_eq!(report.passed, vec![1]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].step_index, 0);
        assert_eq!(report.failures[0].expected, "wrote .");
    }

    #[test]
    fn test_missing_binary_is_test_failure() {
        let tmp = TempDir::new().unwrap();
        let prefix = InstallPrefix::new(tmp.path());
        let resolved = recipe(
            r#"
[[test]]
command = "%(bin)s/lou_translate"
args = ["--version"]
"#,
        );

        let report = runner().run(&resolved, &prefix, &[]).unwrap();
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].expected, "exit code 0");
    }

    #[test]
    fn test_unknown_placeholder_is_error() {
        let tmp = TempDir::new().unwrap();
        let prefix = InstallPrefix::new(tmp.path());
        let resolved = recipe(
            r#"
[[test]]
command = "%(nope)s"
"#,
        );
        assert!(matches!(
            runner().run(&resolved, &prefix, &[]),
            Err(Error::MissingVariable { .. })
        ));
    }
}
