// src/recipe/kitchen/cook.rs

//! Cook: the actual build execution for a single recipe

use crate::error::{Error, Result};
use crate::recipe::cellar::{InstallPrefix, InstallReceipt, InstalledDep};
use crate::recipe::format::{AppendSpec, MoveSpec, ReplaceSpec, StepAction};
use crate::recipe::resolved::{ResolvedRecipe, Source, Step};
use crate::recipe::vars::Substitutions;
use regex::{NoExpand, Regex};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, warn};

use super::Kitchen;
use super::archive::{clone_vcs, extract_archive, url_filename, vcs_revision};
use super::process::{ProcessSpec, run_process};

/// A single cook operation
pub struct Cook<'a> {
    pub(super) kitchen: &'a Kitchen,
    pub(super) recipe: &'a ResolvedRecipe,
    pub(super) deps: &'a [InstalledDep],
    /// Temporary build directory, owned by this build only
    pub(super) build_dir: TempDir,
    /// Source directory within build_dir
    pub(super) source_dir: PathBuf,
    /// Local copy of the source archive
    pub(super) archive: Option<PathBuf>,
    /// Install prefix
    pub(super) prefix: InstallPrefix,
    /// Set once simmer has claimed the prefix
    pub(super) prefix_claimed: bool,
    /// The install this build replaces, moved aside until plate succeeds
    pub(super) previous: Option<PathBuf>,
    /// Checked-out commit of a head source
    pub(super) revision: Option<String>,
    pub(super) fingerprint: String,
    /// Build log accumulator
    pub(super) log: String,
    /// Warnings
    pub(super) warnings: Vec<String>,
}

impl<'a> Cook<'a> {
    pub(super) fn new(
        kitchen: &'a Kitchen,
        recipe: &'a ResolvedRecipe,
        deps: &'a [InstalledDep],
        fingerprint: String,
    ) -> Result<Self> {
        let build_dir = tempfile::Builder::new()
            .prefix(&format!("cellar-{}-", recipe.name))
            .tempdir()
            .map_err(|e| Error::IoError(format!("Failed to create build directory: {}", e)))?;

        let source_dir = build_dir.path().join("source");
        let prefix = kitchen.cellar().prefix_for(recipe);

        Ok(Self {
            kitchen,
            recipe,
            deps,
            build_dir,
            source_dir,
            archive: None,
            prefix,
            prefix_claimed: false,
            previous: None,
            revision: None,
            fingerprint,
            log: String::new(),
            warnings: Vec::new(),
        })
    }

    /// Build directory (kept on failure when `keep_builddir` is set)
    pub fn build_dir(&self) -> &Path {
        self.build_dir.path()
    }

    /// Phase 1: Prep - fetch the source
    pub(super) fn prep(&mut self) -> Result<()> {
        let recipe = self.recipe;
        match &recipe.source {
            Source::Archive { url, mirrors, checksum } => {
                let cached = self.kitchen.fetch_source(url, mirrors, checksum)?;
                let local_archive = self.build_dir.path().join(url_filename(url));
                fs::copy(&cached, &local_archive)?;
                self.archive = Some(local_archive);
                self.log_line(&format!("Fetched source: {} ({})", url, checksum));
            }
            Source::Vcs { url, branch, vcs } => {
                clone_vcs(*vcs, url, branch.as_deref(), &self.source_dir)?;
                let revision = vcs_revision(*vcs, &self.source_dir)?;
                self.log_line(&format!("Cloned {} at {}", recipe.source.describe(), revision));
                self.revision = Some(revision);
            }
        }
        Ok(())
    }

    /// Phase 2: Unpack sources
    pub(super) fn unpack(&mut self) -> Result<()> {
        let Some(archive_path) = self.archive.clone() else {
            // Head checkouts are already in place
            return Ok(());
        };

        extract_archive(&archive_path, &self.source_dir)?;
        self.log_line(&format!("Extracted source to {}", self.source_dir.display()));

        // Find the actual source directory (often archives have a top-level dir)
        let entries: Vec<_> = fs::read_dir(&self.source_dir)?
            .filter_map(|e| e.ok())
            .collect();

        if entries.len() == 1 && entries[0].file_type().map(|t| t.is_dir()).unwrap_or(false) {
            // Single directory - this is the actual source
            self.source_dir = entries[0].path();
            debug!("Source directory: {}", self.source_dir.display());
        }

        Ok(())
    }

    /// Placeholder values for this build
    pub(super) fn substitutions(&self) -> Result<Substitutions> {
        Substitutions::for_build(
            self.recipe,
            &self.prefix,
            &self.source_dir,
            self.kitchen.config.jobs,
            self.deps,
        )
    }

    /// Phase 3: Simmer - run the build steps in order
    pub(super) fn simmer(&mut self) -> Result<()> {
        let subs = self.substitutions()?;
        let env = build_environment(
            self.recipe,
            &self.prefix,
            self.deps,
            self.kitchen.config.jobs,
            &subs,
        )?;

        // The old install of this keg waits aside until plate succeeds
        if self.prefix.path().exists() {
            let previous = self.prefix.previous_path();
            if previous.exists() {
                fs::remove_dir_all(&previous)?;
            }
            info!(
                "Moving existing install {} aside while rebuilding",
                self.prefix.path().display()
            );
            fs::rename(self.prefix.path(), &previous)?;
            self.previous = Some(previous);
        }
        fs::create_dir_all(self.prefix.path())?;
        self.prefix_claimed = true;

        let recipe = self.recipe;
        for step in &recipe.steps {
            self.run_build_step(step, &subs, &env)?;
        }

        Ok(())
    }

    /// Run a build step
    fn run_build_step(
        &mut self,
        step: &Step,
        subs: &Substitutions,
        base_env: &BTreeMap<String, String>,
    ) -> Result<()> {
        let label = step.action.label();
        info!("Running step {}: {}", step.index, label);

        let workdir = match &step.workdir {
            Some(wd) => self.source_dir.join(subs.expand(wd)?),
            None => self.source_dir.clone(),
        };
        if !workdir.is_dir() {
            return Err(self.step_error(
                step,
                format!("working directory {} does not exist", workdir.display()),
            ));
        }

        match &step.action {
            StepAction::Run { command, args } => {
                let command = subs.expand(command)?;
                let args = subs.expand_all(args)?;
                self.run_command(step, &command, &args, &workdir, subs, base_env)
            }
            StepAction::Configure { args } => {
                let args = subs.expand_all(args)?;
                self.run_command(step, "./configure", &args, &workdir, subs, base_env)
            }
            StepAction::Replace(replace) => self.replace(step, replace, &workdir, subs),
            StepAction::Mkdir(path) => {
                let path = resolve(&workdir, &subs.expand(path)?);
                fs::create_dir_all(&path).map_err(|e| {
                    self.step_error(step, format!("mkdir {}: {}", path.display(), e))
                })?;
                self.log_line(&format!("=== step {}: mkdir {} ===", step.index, path.display()));
                Ok(())
            }
            StepAction::Move(m) => self.move_file(step, m, &workdir, subs),
            StepAction::Remove(pattern) => self.remove(step, pattern, &workdir, subs),
            StepAction::Append(append) => self.append(step, append, &workdir, subs),
        }
    }

    fn run_command(
        &mut self,
        step: &Step,
        command: &str,
        args: &[String],
        workdir: &Path,
        subs: &Substitutions,
        base_env: &BTreeMap<String, String>,
    ) -> Result<()> {
        debug!("Command: {} {}", command, args.join(" "));

        let mut env = base_env.clone();
        env.extend(subs.expand_env(&step.env)?);

        let output = run_process(&ProcessSpec {
            program: command,
            args,
            cwd: workdir,
            env: &env,
            stdin: None,
            timeout: self.kitchen.config.timeout(),
        })
        .map_err(|e| match e {
            Error::IoError(message) => self.step_error(step, message),
            other => other,
        })?;

        self.log_build_output(step, command, &output.stdout, &output.stderr);

        if !output.success() {
            return Err(Error::BuildStepFailure {
                recipe: self.recipe.name.clone(),
                step_index: step.index,
                exit_code: output.exit_code,
            });
        }

        Ok(())
    }

    fn replace(
        &mut self,
        step: &Step,
        spec: &ReplaceSpec,
        workdir: &Path,
        subs: &Substitutions,
    ) -> Result<()> {
        let path = resolve(workdir, &subs.expand(&spec.file)?);
        let pattern = Regex::new(&spec.pattern)
            .map_err(|e| self.step_error(step, format!("invalid pattern '{}': {}", spec.pattern, e)))?;
        let replacement = subs.expand(&spec.replacement)?;

        let content = fs::read_to_string(&path)
            .map_err(|e| self.step_error(step, format!("read {}: {}", path.display(), e)))?;
        let matches = pattern.find_iter(&content).count();
        if matches == 0 {
            return Err(self.step_error(
                step,
                format!("pattern '{}' not found in {}", spec.pattern, path.display()),
            ));
        }

        let updated = pattern.replace_all(&content, NoExpand(&replacement));
        fs::write(&path, updated.as_bytes())
            .map_err(|e| self.step_error(step, format!("write {}: {}", path.display(), e)))?;

        self.log_line(&format!(
            "=== step {}: replaced {} match(es) in {} ===",
            step.index,
            matches,
            path.display()
        ));
        Ok(())
    }

    fn move_file(
        &mut self,
        step: &Step,
        spec: &MoveSpec,
        workdir: &Path,
        subs: &Substitutions,
    ) -> Result<()> {
        let from = resolve(workdir, &subs.expand(&spec.from)?);
        let mut to = resolve(workdir, &subs.expand(&spec.to)?);

        if !from.exists() {
            return Err(self.step_error(step, format!("{} does not exist", from.display())));
        }
        if to.is_dir()
            && let Some(name) = from.file_name()
        {
            to = to.join(name);
        }

        let moved = (|| -> std::io::Result<()> {
            if let Some(parent) = to.parent() {
                fs::create_dir_all(parent)?;
            }
            if to.is_dir() {
                fs::remove_dir_all(&to)?;
            } else if to.exists() {
                fs::remove_file(&to)?;
            }
            if fs::rename(&from, &to).is_err() {
                // Crossing filesystems: copy then delete
                fs::copy(&from, &to)?;
                fs::remove_file(&from)?;
            }
            Ok(())
        })();
        moved.map_err(|e| {
            self.step_error(step, format!("move {} -> {}: {}", from.display(), to.display(), e))
        })?;

        self.log_line(&format!(
            "=== step {}: moved {} -> {} ===",
            step.index,
            from.display(),
            to.display()
        ));
        Ok(())
    }

    fn remove(
        &mut self,
        step: &Step,
        pattern: &str,
        workdir: &Path,
        subs: &Substitutions,
    ) -> Result<()> {
        let full = resolve(workdir, &subs.expand(pattern)?);
        let full = full.to_string_lossy();
        let paths = glob::glob(&full)
            .map_err(|e| self.step_error(step, format!("invalid glob '{}': {}", pattern, e)))?;

        let mut removed = 0;
        for entry in paths {
            let path = entry.map_err(|e| self.step_error(step, e.to_string()))?;
            let result = if path.is_dir() {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };
            result.map_err(|e| self.step_error(step, format!("remove {}: {}", path.display(), e)))?;
            removed += 1;
        }

        if removed == 0 {
            debug!("remove {} matched nothing", full);
        }
        self.log_line(&format!("=== step {}: removed {} path(s) matching {} ===", step.index, removed, full));
        Ok(())
    }

    fn append(
        &mut self,
        step: &Step,
        spec: &AppendSpec,
        workdir: &Path,
        subs: &Substitutions,
    ) -> Result<()> {
        let path = resolve(workdir, &subs.expand(&spec.file)?);
        let line = subs.expand(&spec.line)?;

        let needs_newline = fs::read(&path)
            .map(|content| !content.is_empty() && !content.ends_with(b"\n"))
            .unwrap_or(false);

        let appended = (|| -> std::io::Result<()> {
            let mut file = fs::OpenOptions::new().create(true).append(true).open(&path)?;
            if needs_newline {
                file.write_all(b"\n")?;
            }
            writeln!(file, "{}", line)
        })();
        appended.map_err(|e| self.step_error(step, format!("append to {}: {}", path.display(), e)))?;

        self.log_line(&format!("=== step {}: appended to {} ===", step.index, path.display()));
        Ok(())
    }

    /// Phase 4: Plate - verify the prefix and write the receipt
    pub(super) fn plate(&mut self) -> Result<InstallReceipt> {
        if !self.prefix.is_populated()? {
            return Err(Error::IoError(format!(
                "No files installed to {} - install step may be missing",
                self.prefix.path().display()
            )));
        }

        let mut receipt = InstallReceipt::new(self.recipe, self.deps, &self.fingerprint);
        receipt.source_revision = self.revision.clone();
        receipt.write(&self.prefix)?;

        if let Some(previous) = self.previous.take()
            && let Err(e) = fs::remove_dir_all(&previous)
        {
            warn!("Failed to remove replaced install {}: {}", previous.display(), e);
        }

        self.log_line(&format!("Installed to {}", self.prefix.path().display()));
        info!("Cooked: {} {}", self.recipe.name, self.prefix.path().display());

        Ok(receipt)
    }

    /// Clean up after a failed build
    ///
    /// Removes the partial prefix if simmer got far enough to create it and
    /// puts back the install it replaced. An existing install is never
    /// touched when prep or unpack fail. The build directory is deleted
    /// unless `keep_builddir` is set.
    pub(super) fn discard(self) {
        if self.prefix_claimed
            && let Err(e) = fs::remove_dir_all(self.prefix.path())
        {
            warn!("Failed to remove partial install {}: {}", self.prefix.path().display(), e);
        }

        if let Some(previous) = &self.previous {
            match fs::rename(previous, self.prefix.path()) {
                Ok(()) => info!("Restored previous install of {}", self.recipe.name),
                Err(e) => warn!(
                    "Failed to restore previous install {}: {}",
                    previous.display(),
                    e
                ),
            }
        }

        if self.kitchen.config.keep_builddir {
            let kept = self.build_dir.keep();
            warn!("Keeping build directory for {}: {}", self.recipe.name, kept.display());
        }
    }

    fn step_error(&self, step: &Step, message: String) -> Error {
        Error::StepError {
            recipe: self.recipe.name.clone(),
            step_index: step.index,
            message,
        }
    }

    fn log_line(&mut self, line: &str) {
        self.log.push_str(line);
        self.log.push('\n');
    }

    /// Log build step output (stdout/stderr) with a step header
    fn log_build_output(&mut self, step: &Step, command: &str, stdout: &str, stderr: &str) {
        self.log_line(&format!("=== step {}: {} ===", step.index, command));
        for line in stdout.lines().chain(stderr.lines()) {
            debug!("[{}] {}", self.recipe.name, line);
        }
        if !stdout.is_empty() {
            self.log.push_str(stdout);
            self.log.push('\n');
        }
        if !stderr.is_empty() {
            self.log.push_str(stderr);
            self.log.push('\n');
        }
    }
}

/// Resolve a step operand against the working directory
fn resolve(workdir: &Path, path: &str) -> PathBuf {
    let p = Path::new(path);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        workdir.join(p)
    }
}

/// Environment shared by every run step of a recipe
///
/// `PREFIX`, `MAKEFLAGS` and a `PATH` led by the dependency `bin`
/// directories, then the recipe env with `env_append` values added on.
fn build_environment(
    recipe: &ResolvedRecipe,
    prefix: &InstallPrefix,
    deps: &[InstalledDep],
    jobs: usize,
    subs: &Substitutions,
) -> Result<BTreeMap<String, String>> {
    let mut env = BTreeMap::new();
    env.insert("PREFIX".to_string(), prefix.path().to_string_lossy().into_owned());
    env.insert("MAKEFLAGS".to_string(), format!("-j{}", jobs));
    env.insert("PATH".to_string(), search_path(deps.iter().filter(|d| !d.is_system()).map(|d| d.prefix.bin())));

    env.extend(subs.expand_env(&recipe.env)?);

    for (key, value) in subs.expand_env(&recipe.env_append)? {
        let existing = env
            .get(&key)
            .cloned()
            .or_else(|| std::env::var(&key).ok())
            .unwrap_or_default();
        let merged = if existing.is_empty() {
            value
        } else {
            format!("{} {}", existing, value)
        };
        env.insert(key, merged);
    }

    Ok(env)
}

/// `PATH` with the given directories in front of the inherited one
pub(crate) fn search_path(dirs: impl Iterator<Item = PathBuf>) -> String {
    let inherited = std::env::var_os("PATH").unwrap_or_default();
    let all: Vec<PathBuf> = dirs.chain(std::env::split_paths(&inherited)).collect();
    std::env::join_paths(all)
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|_| inherited.to_string_lossy().into_owned())
}
