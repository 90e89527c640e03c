// src/commands/cook.rs

//! Cook commands: build, fetch, test

use super::Session;
use crate::cli::PlanArgs;
use anyhow::{Context, Result, anyhow, bail};
use cellar::progress::{CliProgress, LogProgress, ProgressTracker};
use cellar::recipe::{
    BatchReport, BuildOutcome, BuildPlan, InstalledDep, Kitchen, Os, ResolveOptions, Scheduler,
    TestReport, TestRunner,
};
use std::io::IsTerminal;
use tracing::info;

/// Build the targets and their dependencies
pub fn cmd_build(
    session: &Session,
    args: &PlanArgs,
    jobs: Option<usize>,
    no_test: bool,
    keep_builddir: bool,
) -> Result<()> {
    let mut config = session.config.clone();
    if let Some(jobs) = jobs {
        config.jobs = jobs;
    }
    if no_test {
        config.run_tests = false;
    }
    config.keep_builddir |= keep_builddir;
    config.validate()?;

    let book = session.book()?;
    let plan = session.resolve(&book, args)?;
    println!("Building {} recipe(s): {}", plan.len(), plan.names().join(" "));

    let kitchen = Kitchen::new(config);
    let progress: Box<dyn ProgressTracker> = if std::io::stderr().is_terminal() {
        Box::new(CliProgress::new("Cooking", plan.len() as u64))
    } else {
        Box::new(LogProgress::new("build", plan.len() as u64))
    };
    let report = Scheduler::new(&kitchen, progress.as_ref()).run(&plan);

    print_summary(&report);

    if !report.is_success() {
        bail!(
            "{} recipe(s) failed, {} skipped",
            report.failed().len(),
            report.skipped().len()
        );
    }
    Ok(())
}

fn print_summary(report: &BatchReport) {
    println!();
    for entry in &report.outcomes {
        match &entry.outcome {
            BuildOutcome::Installed { result, tests } => {
                println!(
                    "[{}] {} -> {}",
                    entry.outcome.label().to_uppercase(),
                    entry.name,
                    result.prefix.path().display()
                );
                for warning in &result.warnings {
                    println!("    warning: {}", warning);
                }
                match tests {
                    Some(Ok(tests)) => print_tests(tests),
                    Some(Err(e)) => println!("    tests not run: {}", e),
                    None => {}
                }
            }
            BuildOutcome::Failed { error } => {
                println!("[FAILED] {}: {}", entry.name, error);
            }
            BuildOutcome::Skipped { blocked_by } => {
                println!("[SKIPPED] {} (needs {})", entry.name, blocked_by);
            }
        }
    }

    let failures = report.test_failures();
    if !failures.is_empty() {
        println!("\n{} test failure(s); the installs were kept", failures.len());
    }
}

fn print_tests(report: &TestReport) {
    if report.total() == 0 {
        return;
    }
    println!("    tests: {}/{} passed", report.passed.len(), report.total());
    for failure in &report.failures {
        println!("    test {}: expected {}, got {}", failure.step_index, failure.expected, failure.actual);
    }
}

/// Download and verify every source in the plan
pub fn cmd_fetch(session: &Session, args: &PlanArgs) -> Result<()> {
    let book = session.book()?;
    let plan = session.resolve(&book, args)?;
    let kitchen = Kitchen::new(session.config.clone());

    let mut failed = 0;
    for (name, result) in kitchen.fetch_all(&plan) {
        match result {
            Ok(Some(path)) => println!("[OK] {}: {}", name, path.display()),
            Ok(None) => println!("[OK] {}: head checkout, cloned at build time", name),
            Err(e) => {
                failed += 1;
                println!("[FAILED] {}: {}", name, e);
            }
        }
    }

    if failed > 0 {
        bail!("{} source(s) could not be fetched", failed);
    }
    println!("\nAll sources are cached. Ready for offline build.");
    Ok(())
}

/// Rerun the smoke tests of an installed recipe
pub fn cmd_test(session: &Session, name: &str, head: bool) -> Result<()> {
    let book = session.book()?;
    let mut options = ResolveOptions::for_os(Os::host());
    if head {
        options = options.with_head(name);
    }
    let plan = book
        .resolve(&[name], &options)
        .with_context(|| format!("Failed to resolve {}", name))?;
    let kitchen = Kitchen::new(session.config.clone());

    let idx = plan
        .position(name)
        .ok_or_else(|| anyhow!("{} is not in its own plan", name))?;
    let recipe = &plan.recipes()[idx].recipe;
    let prefix = kitchen.cellar().prefix_for(recipe);
    if kitchen.cellar().receipt(recipe)?.is_none() {
        bail!("{} {} is not installed", name, recipe.keg_name());
    }
    let deps = installed_deps(&kitchen, &plan, idx)?;

    info!("Testing {} in {}", name, prefix.path().display());
    let report = TestRunner::new(kitchen.config()).run(recipe, &prefix, &deps)?;
    if report.total() == 0 {
        println!("{} has no test steps", name);
        return Ok(());
    }
    print_tests(&report);
    if !report.is_success() {
        bail!("{} of {} test step(s) failed", report.failures.len(), report.total());
    }
    Ok(())
}

/// Dependencies of an already installed plan entry
fn installed_deps(kitchen: &Kitchen, plan: &BuildPlan, idx: usize) -> Result<Vec<InstalledDep>> {
    let planned = &plan.recipes()[idx];
    let mut deps = Vec::new();
    for &dep_idx in &planned.deps {
        let dep = &plan.recipes()[dep_idx].recipe;
        let receipt = kitchen
            .cellar()
            .receipt(dep)?
            .ok_or_else(|| anyhow!("Dependency {} {} is not installed", dep.name, dep.keg_name()))?;
        let phase = planned
            .recipe
            .dependencies
            .iter()
            .find(|d| d.name == dep.name)
            .map(|d| d.phase)
            .unwrap_or_default();
        deps.push(InstalledDep {
            name: dep.name.clone(),
            prefix: kitchen.cellar().prefix_for(dep),
            fingerprint: receipt.fingerprint,
            phase,
        });
    }
    for dep in &planned.system_deps {
        deps.push(InstalledDep::system(&dep.name, &kitchen.config().system_prefix, dep.phase));
    }
    deps.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(deps)
}
