// src/recipe/schedule.rs

//! Batch scheduling of a build plan
//!
//! Recipes are cooked on scoped worker threads with at most `jobs` in
//! flight. A recipe is dispatched once every dependency in the plan has
//! installed; ready recipes go out in name order. When a recipe fails, all
//! of its transitive dependents are skipped and the rest of the plan keeps
//! going.

use crate::error::{Error, Result, TestFailure};
use crate::progress::ProgressTracker;
use crate::recipe::book::BuildPlan;
use crate::recipe::cellar::{InstallPrefix, InstalledDep};
use crate::recipe::kitchen::{CookResult, Kitchen};
use crate::recipe::resolved::ResolvedRecipe;
use crate::recipe::taste::{TestReport, TestRunner};
use std::collections::BTreeSet;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::mpsc;
use std::thread;
use tracing::{debug, error, info, warn};

/// What happened to one recipe of a batch
#[derive(Debug)]
pub enum BuildOutcome {
    /// Built (or reused) and installed
    ///
    /// `tests` is `None` when tests were not run: disabled, or the install
    /// was reused from an earlier build. `Some(Err(_))` means the tests
    /// could not be run at all; the install is kept either way.
    Installed {
        result: CookResult,
        tests: Option<Result<TestReport>>,
    },
    /// Fetching or building failed
    Failed { error: Error },
    /// Not attempted because a dependency failed
    Skipped { blocked_by: String },
}

impl BuildOutcome {
    pub fn is_installed(&self) -> bool {
        matches!(self, BuildOutcome::Installed { .. })
    }

    /// Short label for summaries
    pub fn label(&self) -> &'static str {
        match self {
            BuildOutcome::Installed { result, .. } if result.from_cache => "cached",
            BuildOutcome::Installed { .. } => "installed",
            BuildOutcome::Failed { .. } => "failed",
            BuildOutcome::Skipped { .. } => "skipped",
        }
    }
}

/// A recipe name with its outcome
#[derive(Debug)]
pub struct RecipeOutcome {
    pub name: String,
    pub outcome: BuildOutcome,
}

/// Result of running a whole plan, one entry per recipe in plan order
#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<RecipeOutcome>,
}

impl BatchReport {
    pub fn get(&self, name: &str) -> Option<&BuildOutcome> {
        self.outcomes
            .iter()
            .find(|o| o.name == name)
            .map(|o| &o.outcome)
    }

    pub fn installed(&self) -> Vec<&str> {
        self.names_where(|o| o.is_installed())
    }

    pub fn failed(&self) -> Vec<(&str, &Error)> {
        self.outcomes
            .iter()
            .filter_map(|o| match &o.outcome {
                BuildOutcome::Failed { error } => Some((o.name.as_str(), error)),
                _ => None,
            })
            .collect()
    }

    pub fn skipped(&self) -> Vec<&str> {
        self.names_where(|o| matches!(o, BuildOutcome::Skipped { .. }))
    }

    /// Every test failure across installed recipes
    pub fn test_failures(&self) -> Vec<&TestFailure> {
        self.outcomes
            .iter()
            .filter_map(|o| match &o.outcome {
                BuildOutcome::Installed {
                    tests: Some(Ok(report)),
                    ..
                } => Some(report.failures.iter()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    /// True when every recipe installed; test failures do not count
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|o| o.outcome.is_installed())
    }

    fn names_where(&self, pred: impl Fn(&BuildOutcome) -> bool) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| pred(&o.outcome))
            .map(|o| o.name.as_str())
            .collect()
    }
}

/// Runs build plans through a [`Kitchen`]
pub struct Scheduler<'a> {
    kitchen: &'a Kitchen,
    progress: &'a dyn ProgressTracker,
    jobs: usize,
    run_tests: bool,
}

impl<'a> Scheduler<'a> {
    /// Scheduler using the kitchen's `jobs` and `run_tests` settings
    pub fn new(kitchen: &'a Kitchen, progress: &'a dyn ProgressTracker) -> Self {
        Self {
            kitchen,
            progress,
            jobs: kitchen.config().jobs.max(1),
            run_tests: kitchen.config().run_tests,
        }
    }

    /// Limit the number of recipes built at once
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    pub fn with_tests(mut self, run_tests: bool) -> Self {
        self.run_tests = run_tests;
        self
    }

    /// Build every recipe of `plan`
    pub fn run(&self, plan: &BuildPlan) -> BatchReport {
        let recipes = plan.recipes();
        let mut outcomes: Vec<Option<BuildOutcome>> = recipes.iter().map(|_| None).collect();
        let mut installed: Vec<Option<(InstallPrefix, String)>> =
            vec![None; recipes.len()];
        let mut waiting_on: Vec<usize> = recipes.iter().map(|p| p.deps.len()).collect();
        let mut ready: BTreeSet<(&str, usize)> = recipes
            .iter()
            .enumerate()
            .filter(|(_, p)| p.deps.is_empty())
            .map(|(idx, p)| (p.name(), idx))
            .collect();

        self.progress.set_length(recipes.len() as u64);
        info!("Building {} recipe(s) with {} job(s)", recipes.len(), self.jobs);

        thread::scope(|scope| {
            let (tx, rx) = mpsc::channel::<(usize, BuildOutcome)>();
            let mut in_flight = 0usize;

            loop {
                while in_flight < self.jobs {
                    let Some((name, idx)) = ready.pop_first() else {
                        break;
                    };
                    let deps = self.installed_deps(plan, idx, &installed);
                    let recipe = &recipes[idx].recipe;
                    let tx = tx.clone();
                    debug!("Dispatching {}", name);
                    self.progress.set_message(&format!("Cooking {}", name));
                    scope.spawn(move || {
                        let outcome = catch_unwind(AssertUnwindSafe(|| self.build_one(recipe, &deps)))
                            .unwrap_or_else(|_| BuildOutcome::Failed {
                                error: Error::IoError(format!("Build of {} panicked", recipe.name)),
                            });
                        let _ = tx.send((idx, outcome));
                    });
                    in_flight += 1;
                }

                if in_flight == 0 {
                    break;
                }
                let Ok((idx, outcome)) = rx.recv() else {
                    break;
                };
                in_flight -= 1;

                let name = recipes[idx].name();
                match &outcome {
                    BuildOutcome::Installed { result, .. } => {
                        info!("{} {}", name, outcome.label());
                        installed[idx] = Some((result.prefix.clone(), result.fingerprint().to_string()));
                        for &dependent in plan.dependents(idx) {
                            waiting_on[dependent] -= 1;
                            if waiting_on[dependent] == 0 && outcomes[dependent].is_none() {
                                ready.insert((recipes[dependent].name(), dependent));
                            }
                        }
                    }
                    BuildOutcome::Failed { error } => {
                        error!("{} failed: {}", name, error);
                        for dependent in plan.transitive_dependents(idx) {
                            if outcomes[dependent].is_none() {
                                warn!("Skipping {}: {} failed", recipes[dependent].name(), name);
                                outcomes[dependent] = Some(BuildOutcome::Skipped {
                                    blocked_by: name.to_string(),
                                });
                                self.progress.increment(1);
                            }
                        }
                    }
                    BuildOutcome::Skipped { .. } => {}
                }
                self.progress.set_message(&format!("{} {}", name, outcome.label()));
                self.progress.increment(1);
                outcomes[idx] = Some(outcome);
            }
        });

        let report = BatchReport {
            outcomes: recipes
                .iter()
                .zip(outcomes)
                .map(|(planned, outcome)| RecipeOutcome {
                    name: planned.name().to_string(),
                    // Anything never dispatched sits behind a failure
                    outcome: outcome.unwrap_or(BuildOutcome::Skipped {
                        blocked_by: String::new(),
                    }),
                })
                .collect(),
        };

        let failed = report.failed().len();
        let skipped = report.skipped().len();
        if failed == 0 && skipped == 0 {
            self.progress
                .finish_with_message(&format!("{} recipe(s) installed", report.installed().len()));
        } else {
            self.progress.finish_with_error(&format!(
                "{} failed, {} skipped",
                failed, skipped
            ));
        }
        report
    }

    /// Dependencies of plan entry `idx` as its build sees them
    fn installed_deps(
        &self,
        plan: &BuildPlan,
        idx: usize,
        installed: &[Option<(InstallPrefix, String)>],
    ) -> Vec<InstalledDep> {
        let planned = &plan.recipes()[idx];
        let mut deps = Vec::with_capacity(planned.deps.len() + planned.system_deps.len());

        for &dep_idx in &planned.deps {
            let dep_name = plan.recipes()[dep_idx].name();
            let Some((prefix, fingerprint)) = &installed[dep_idx] else {
                continue;
            };
            let phase = planned
                .recipe
                .dependencies
                .iter()
                .find(|d| d.name == dep_name)
                .map(|d| d.phase)
                .unwrap_or_default();
            deps.push(InstalledDep {
                name: dep_name.to_string(),
                prefix: prefix.clone(),
                fingerprint: fingerprint.clone(),
                phase,
            });
        }
        for dep in &planned.system_deps {
            deps.push(InstalledDep::system(
                &dep.name,
                &self.kitchen.config().system_prefix,
                dep.phase,
            ));
        }
        deps.sort_by(|a, b| a.name.cmp(&b.name));
        deps
    }

    fn build_one(&self, recipe: &ResolvedRecipe, deps: &[InstalledDep]) -> BuildOutcome {
        let result = match self.kitchen.cook(recipe, deps) {
            Ok(result) => result,
            Err(error) => return BuildOutcome::Failed { error },
        };

        let tests = if self.run_tests && !result.from_cache {
            let report = TestRunner::new(self.kitchen.config()).run(recipe, &result.prefix, deps);
            match &report {
                Ok(report) if !report.is_success() => warn!(
                    "{}: {} of {} test step(s) failed",
                    recipe.name,
                    report.failures.len(),
                    report.total()
                ),
                Ok(report) => info!("{}: {} test step(s) passed", recipe.name, report.total()),
                Err(e) => warn!("{}: tests could not run: {}", recipe.name, e),
            }
            Some(report)
        } else {
            None
        };

        BuildOutcome::Installed { result, tests }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::hash::{HashAlgorithm, hash_bytes};
    use crate::progress::SilentProgress;
    use crate::recipe::book::{RecipeBook, ResolveOptions};
    use crate::recipe::format::Os;
    use crate::recipe::kitchen::KitchenConfig;
    use crate::recipe::parser::parse_recipe;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::path::Path;
    use tempfile::TempDir;

    /// Write a tarball holding `<name>-1.0/README` and return its checksum
    fn source_archive(dir: &Path, name: &str) -> (String, String) {
        let path = dir.join(format!("{}-1.0.tar.gz", name));
        let file = std::fs::File::create(&path).unwrap();
        let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
        let body = format!("{}\n", name);
        let mut header = tar::Header::new_gnu();
        header.set_size(body.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, format!("{}-1.0/README", name), body.as_bytes())
            .unwrap();
        builder.into_inner().unwrap().finish().unwrap();

        let checksum = hash_bytes(HashAlgorithm::Sha256, &std::fs::read(&path).unwrap());
        (path.display().to_string(), checksum.to_string())
    }

    fn recipe(dir: &Path, name: &str, depends: &[&str], script: &str) -> String {
        let (url, checksum) = source_archive(dir, name);
        let depends = depends
            .iter()
            .map(|d| format!("{:?}", d))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            r#"
depends = [{depends}]

[package]
name = "{name}"
version = "1.0"

[stable]
url = "{url}"
checksum = "{checksum}"

[[build]]
command = "sh"
args = ["-c", {script:?}]
"#
        )
    }

    const INSTALL: &str = "mkdir -p %(bin)s && cp README %(prefix)s/";

    fn run(book: &RecipeBook, root: &Path, targets: &[&str]) -> BatchReport {
        let plan = book.resolve(targets, &ResolveOptions::for_os(Os::Linux)).unwrap();
        let kitchen = Kitchen::new(KitchenConfig::rooted_at(root));
        let progress = SilentProgress::new();
        let report = Scheduler::new(&kitchen, &progress).with_jobs(2).run(&plan);
        assert!(progress.is_finished());
        assert_eq!(progress.position(), plan.len() as u64);
        report
    }

    #[test]
    fn test_failure_skips_dependents_only() {
        let tmp = TempDir::new().unwrap();
        let mut book = RecipeBook::new();
        for (name, deps, script) in [
            ("proj", &[][..], INSTALL),
            ("geos", &[][..], "exit 1"),
            ("gdal", &["proj", "geos"][..], INSTALL),
            ("qgis", &["gdal"][..], INSTALL),
        ] {
            book.insert(parse_recipe(&recipe(tmp.path(), name, deps, script)).unwrap())
                .unwrap();
        }

        let report = run(&book, tmp.path(), &["qgis", "proj"]);
        assert_eq!(report.installed(), vec!["proj"]);
        assert_eq!(report.skipped(), vec!["gdal", "qgis"]);
        let failed = report.failed();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].0, "geos");
        assert!(matches!(
            failed[0].1,
            Error::BuildStepFailure { step_index: 0, exit_code: 1, .. }
        ));
        assert!(matches!(
            report.get("qgis"),
            Some(BuildOutcome::Skipped { blocked_by }) if blocked_by == "geos"
        ));
        assert!(!report.is_success());
    }

    #[test]
    fn test_dependents_see_dependency_prefix() {
        let tmp = TempDir::new().unwrap();
        let mut book = RecipeBook::new();
        book.insert(parse_recipe(&recipe(tmp.path(), "libtiff", &[], INSTALL)).unwrap())
            .unwrap();
        book.insert(
            parse_recipe(&recipe(
                tmp.path(),
                "gdal",
                &["libtiff"],
                "test -f %(libtiff:prefix)s/README && mkdir -p %(bin)s",
            ))
            .unwrap(),
        )
        .unwrap();

        let report = run(&book, tmp.path(), &["gdal"]);
        assert!(report.is_success(), "{:?}", report.failed());
        assert_eq!(report.installed(), vec!["libtiff", "gdal"]);

        // Second run reuses both installs
        let again = run(&book, tmp.path(), &["gdal"]);
        assert!(
            again
                .outcomes
                .iter()
                .all(|o| o.outcome.label() == "cached")
        );
    }
}
