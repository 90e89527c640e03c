// src/error.rs

//! Error types for recipe parsing, resolution, cooking and testing

use thiserror::Error;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the build engine
#[derive(Error, Debug)]
pub enum Error {
    /// A recipe, config file or receipt could not be parsed or is invalid
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Filesystem or process failure with context
    #[error("I/O error: {0}")]
    IoError(String),

    /// Raw I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Fetching a source failed
    #[error("Download failed: {0}")]
    DownloadError(String),

    /// A recipe, file or installed prefix does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// A `%(name)s` placeholder has no value
    #[error("Unknown variable %({name})s in '{template}'")]
    MissingVariable { name: String, template: String },

    /// Fetched source content does not match the declared checksum
    #[error("Checksum mismatch for {url}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        url: String,
        expected: String,
        actual: String,
    },

    /// A dependency has no recipe and is not a declared system package
    #[error("{recipe} depends on {dependency}, which has no recipe and is not a system package")]
    UnresolvedDependency { recipe: String, dependency: String },

    /// The dependency graph contains a cycle
    #[error("Circular dependency: {}", .cycle.join(" -> "))]
    Cycle { cycle: Vec<String> },

    /// Two recipes in the same plan install conflicting files
    #[error("{recipe} conflicts with {other}: {because}")]
    Conflict {
        recipe: String,
        other: String,
        because: String,
    },

    /// The recipe declares `fails_with` for the configured compiler
    #[error("{recipe} does not build with {compiler}")]
    UnsupportedCompiler { recipe: String, compiler: String },

    /// A build command exited unsuccessfully
    #[error("{recipe}: build step {step_index} failed with exit code {exit_code}")]
    BuildStepFailure {
        recipe: String,
        step_index: usize,
        exit_code: i32,
    },

    /// A built-in build action (replace, move, ...) failed
    #[error("{recipe}: build step {step_index} failed: {message}")]
    StepError {
        recipe: String,
        step_index: usize,
        message: String,
    },

    /// A smoke test did not produce the expected result
    #[error(transparent)]
    TestFailure(#[from] TestFailure),

    /// A process exceeded the configured timeout
    #[error("{what} timed out after {secs} seconds")]
    Timeout { what: String, secs: u64 },
}

/// A single failed test step
///
/// Test failures are advisory: the artifact stays installed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{recipe}: test step {step_index} failed: expected {expected}, got {actual}")]
pub struct TestFailure {
    pub recipe: String,
    pub step_index: usize,
    pub actual: String,
    pub expected: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_display() {
        let err = Error::Cycle {
            cycle: vec!["a".to_string(), "b".to_string(), "a".to_string()],
        };
        assert_eq!(err.to_string(), "Circular dependency: a -> b -> a");
    }

    #[test]
    fn test_build_step_failure_display() {
        let err = Error::BuildStepFailure {
            recipe: "gdal".to_string(),
            step_index: 2,
            exit_code: 1,
        };
        assert_eq!(err.to_string(), "gdal: build step 2 failed with exit code 1");
    }

    #[test]
    fn test_failure_display() {
        let err: Error = TestFailure {
            recipe: "octave".to_string(),
            step_index: 0,
            actual: "exit code 1".to_string(),
            expected: "exit code 0".to_string(),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "octave: test step 0 failed: expected exit code 0, got exit code 1"
        );
    }
}
