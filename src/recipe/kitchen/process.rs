// src/recipe/kitchen/process.rs

//! Child process execution with timeouts
//!
//! Commands are spawned directly (no shell). Output is drained on helper
//! threads while the parent waits, so a chatty build cannot fill a pipe and
//! stall.

use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;
use tracing::debug;
use wait_timeout::ChildExt;

/// Exit code reported when a process was killed by a signal
pub const SIGNAL_EXIT_CODE: i32 = -1;

/// A process to run
#[derive(Debug, Clone)]
pub struct ProcessSpec<'a> {
    pub program: &'a str,
    pub args: &'a [String],
    pub cwd: &'a Path,
    pub env: &'a BTreeMap<String, String>,
    pub stdin: Option<&'a str>,
    pub timeout: Option<Duration>,
}

/// Captured result of a finished process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Resolve a program name against the working directory
///
/// `./configure` and `build/tool` are relative to `cwd`; bare names are
/// looked up on `PATH` by the OS.
pub fn resolve_program(program: &str, cwd: &Path) -> PathBuf {
    let path = Path::new(program);
    if path.is_relative() && program.contains('/') {
        cwd.join(path)
    } else {
        path.to_path_buf()
    }
}

fn drain<R: Read + Send + 'static>(reader: Option<R>) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut r) = reader {
            let _ = r.read_to_end(&mut buf);
        }
        buf
    })
}

/// Run a process to completion
///
/// A non-zero exit is not an error here; callers decide what it means.
/// Spawn failures and timeouts are.
pub fn run_process(spec: &ProcessSpec<'_>) -> Result<ProcessOutput> {
    let program = resolve_program(spec.program, spec.cwd);
    debug!("Running {} {:?} in {}", program.display(), spec.args, spec.cwd.display());

    let mut child = Command::new(&program)
        .args(spec.args)
        .current_dir(spec.cwd)
        .envs(spec.env)
        .stdin(if spec.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            Error::IoError(format!("Failed to spawn '{}': {}", program.display(), e))
        })?;

    let stdin_writer = match (spec.stdin, child.stdin.take()) {
        (Some(data), Some(mut pipe)) => {
            let data = data.to_string();
            Some(thread::spawn(move || {
                // The child may exit without reading; a broken pipe is fine
                let _ = pipe.write_all(data.as_bytes());
            }))
        }
        _ => None,
    };
    let stdout_reader = drain(child.stdout.take());
    let stderr_reader = drain(child.stderr.take());

    let status = match spec.timeout {
        Some(timeout) => match child.wait_timeout(timeout)? {
            Some(status) => status,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(Error::Timeout {
                    what: spec.program.to_string(),
                    secs: timeout.as_secs(),
                });
            }
        },
        None => child.wait()?,
    };

    if let Some(writer) = stdin_writer {
        let _ = writer.join();
    }
    let stdout = stdout_reader.join().unwrap_or_default();
    let stderr = stderr_reader.join().unwrap_or_default();

    Ok(ProcessOutput {
        exit_code: status.code().unwrap_or(SIGNAL_EXIT_CODE),
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
    })
}
