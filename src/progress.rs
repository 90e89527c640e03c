// src/progress.rs

//! Progress reporting for batch builds
//!
//! The scheduler reports through the [`ProgressTracker`] trait so the same
//! code drives an interactive bar, plain log lines, or nothing at all:
//! - `CliProgress`: progress bar using indicatif
//! - `LogProgress`: logs progress to tracing
//! - `SilentProgress`: no-op for scripted/quiet modes
//! - `CallbackProgress`: forwards every update to a closure

use indicatif::ProgressBar;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tracing::{info, warn};

/// Core trait for progress tracking
///
/// Implementations must be thread-safe; the scheduler reports from
/// whichever worker finishes a recipe.
pub trait ProgressTracker: Send + Sync {
    /// Set the current status message
    fn set_message(&self, message: &str);

    /// Increment progress by the given amount
    fn increment(&self, amount: u64);

    /// Set the total (length) of the progress
    fn set_length(&self, length: u64);

    /// Get current position
    fn position(&self) -> u64;

    /// Get total length
    fn length(&self) -> u64;

    /// Finish progress successfully with a message
    fn finish_with_message(&self, message: &str);

    /// Finish progress with an error message
    fn finish_with_error(&self, message: &str);

    /// Check if progress is finished
    fn is_finished(&self) -> bool;
}

/// Silent progress tracker (no-op)
#[derive(Debug, Default)]
pub struct SilentProgress {
    position: AtomicU64,
    length: AtomicU64,
    finished: AtomicBool,
}

impl SilentProgress {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressTracker for SilentProgress {
    fn set_message(&self, _message: &str) {}

    fn increment(&self, amount: u64) {
        self.position.fetch_add(amount, Ordering::Relaxed);
    }

    fn set_length(&self, length: u64) {
        self.length.store(length, Ordering::Relaxed);
    }

    fn position(&self) -> u64 {
        self.position.load(Ordering::Relaxed)
    }

    fn length(&self) -> u64 {
        self.length.load(Ordering::Relaxed)
    }

    fn finish_with_message(&self, _message: &str) {
        self.finished.store(true, Ordering::Relaxed);
    }

    fn finish_with_error(&self, _message: &str) {
        self.finished.store(true, Ordering::Relaxed);
    }

    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Relaxed)
    }
}

/// Logging progress tracker
///
/// Every message and every completed unit is logged at info level, for
/// non-interactive runs where a bar would only garble the output.
#[derive(Debug)]
pub struct LogProgress {
    name: String,
    position: AtomicU64,
    length: AtomicU64,
    finished: AtomicBool,
}

impl LogProgress {
    pub fn new(name: impl Into<String>, length: u64) -> Self {
        Self {
            name: name.into(),
            position: AtomicU64::new(0),
            length: AtomicU64::new(length),
            finished: AtomicBool::new(false),
        }
    }
}

impl ProgressTracker for LogProgress {
    fn set_message(&self, message: &str) {
        info!("{}: {}", self.name, message);
    }

    fn increment(&self, amount: u64) {
        let position = self.position.fetch_add(amount, Ordering::Relaxed) + amount;
        let length = self.length.load(Ordering::Relaxed);
        if length > 0 {
            info!("{}: {}/{} done", self.name, position.min(length), length);
        }
    }

    fn set_length(&self, length: u64) {
        self.length.store(length, Ordering::Relaxed);
    }

    fn position(&self) -> u64 {
        self.position.load(Ordering::Relaxed)
    }

    fn length(&self) -> u64 {
        self.length.load(Ordering::Relaxed)
    }

    fn finish_with_message(&self, message: &str) {
        self.finished.store(true, Ordering::Relaxed);
        info!("{}: {}", self.name, message);
    }

    fn finish_with_error(&self, message: &str) {
        self.finished.store(true, Ordering::Relaxed);
        warn!("{}: ERROR - {}", self.name, message);
    }

    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Relaxed)
    }
}

/// Events emitted by [`CallbackProgress`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Message(String),
    Position(u64),
    Length(u64),
    Finished(String),
    Error(String),
}

/// Callback-based progress tracker
pub struct CallbackProgress<F>
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    callback: F,
    position: AtomicU64,
    length: AtomicU64,
    finished: AtomicBool,
}

impl<F> CallbackProgress<F>
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self {
            callback,
            position: AtomicU64::new(0),
            length: AtomicU64::new(0),
            finished: AtomicBool::new(false),
        }
    }
}

impl<F> ProgressTracker for CallbackProgress<F>
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    fn set_message(&self, message: &str) {
        (self.callback)(ProgressEvent::Message(message.to_string()));
    }

    fn increment(&self, amount: u64) {
        let position = self.position.fetch_add(amount, Ordering::Relaxed) + amount;
        (self.callback)(ProgressEvent::Position(position));
    }

    fn set_length(&self, length: u64) {
        self.length.store(length, Ordering::Relaxed);
        (self.callback)(ProgressEvent::Length(length));
    }

    fn position(&self) -> u64 {
        self.position.load(Ordering::Relaxed)
    }

    fn length(&self) -> u64 {
        self.length.load(Ordering::Relaxed)
    }

    fn finish_with_message(&self, message: &str) {
        self.finished.store(true, Ordering::Relaxed);
        (self.callback)(ProgressEvent::Finished(message.to_string()));
    }

    fn finish_with_error(&self, message: &str) {
        self.finished.store(true, Ordering::Relaxed);
        (self.callback)(ProgressEvent::Error(message.to_string()));
    }

    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Relaxed)
    }
}

/// Terminal progress bar
pub struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    /// Create a bar for `length` units of work
    pub fn new(message: &str, length: u64) -> Self {
        let bar = ProgressBar::new(length);
        let style = indicatif::ProgressStyle::default_bar()
            .template("{spinner:.green} {msg} ({pos}/{len}) [{bar:40.green/dim}] {elapsed}")
            .unwrap_or_else(|_| indicatif::ProgressStyle::default_bar())
            .progress_chars("##-");
        bar.set_style(style);
        bar.set_message(message.to_string());
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar }
    }

    /// A bar that never draws; used when stderr is not a terminal
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }
}

impl ProgressTracker for CliProgress {
    fn set_message(&self, message: &str) {
        self.bar.set_message(message.to_string());
    }

    fn increment(&self, amount: u64) {
        self.bar.inc(amount);
    }

    fn set_length(&self, length: u64) {
        self.bar.set_length(length);
    }

    fn position(&self) -> u64 {
        self.bar.position()
    }

    fn length(&self) -> u64 {
        self.bar.length().unwrap_or(0)
    }

    fn finish_with_message(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

    fn finish_with_error(&self, message: &str) {
        self.bar.abandon_with_message(message.to_string());
    }

    fn is_finished(&self) -> bool {
        self.bar.is_finished()
    }
}
