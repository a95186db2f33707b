#![deny(missing_docs)]
//! Shared logging utilities for the genqueue workspace.
//!
//! This crate provides the `gq_*` logging macros used across the codebase,
//! the job/output prefixes that make a job's log trail greppable, and the
//! global logger initializers for binaries and tests.

use std::fs::File;
use std::path::PathBuf;

#[doc(hidden)]
pub use log;
use log::LevelFilter;
use simplelog::{
    ColorChoice, CombinedLogger, Config, ConfigBuilder, SharedLogger, TermLogger, TerminalMode,
    WriteLogger,
};

/// Logs a trace-level message using the global logging facade.
#[macro_export]
macro_rules! gq_trace {
    ($($arg:tt)*) => {{
        $crate::log::trace!($($arg)*);
    }};
}

/// Logs a debug-level message using the global logging facade.
#[macro_export]
macro_rules! gq_debug {
    ($($arg:tt)*) => {{
        $crate::log::debug!($($arg)*);
    }};
}

/// Logs an info-level message using the global logging facade.
#[macro_export]
macro_rules! gq_info {
    ($($arg:tt)*) => {{
        $crate::log::info!($($arg)*);
    }};
}

/// Logs a warn-level message using the global logging facade.
#[macro_export]
macro_rules! gq_warn {
    ($($arg:tt)*) => {{
        $crate::log::warn!($($arg)*);
    }};
}

/// Logs an error-level message using the global logging facade.
#[macro_export]
macro_rules! gq_error {
    ($($arg:tt)*) => {{
        $crate::log::error!($($arg)*);
    }};
}

/// Stable per-job prefix: `[JOB-xxxxxxxx]`, built from the first eight
/// characters of the job id.
pub fn job_prefix(job_id: &str) -> String {
    let short: String = job_id.chars().take(8).collect();
    format!("[JOB-{short}]")
}

/// Per-output prefix appended after [`job_prefix`]: `[Output i/N]` with a
/// 1-based index.
pub fn output_prefix(index: usize, total: usize) -> String {
    format!("[Output {}/{}]", index + 1, total)
}

/// File the binary logs to, relative to the working directory.
pub const LOG_FILE: &str = "genqueue.log";

/// Where [`initialize`] sends log records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogDestination {
    /// Only [`LOG_FILE`].
    File,
    /// Only the terminal.
    Terminal,
    /// Terminal and [`LOG_FILE`].
    Both,
}

impl LogDestination {
    fn to_terminal(self) -> bool {
        matches!(self, Self::Terminal | Self::Both)
    }

    fn to_file(self) -> bool {
        matches!(self, Self::File | Self::Both)
    }
}

/// Installs the global logger at `level`.
///
/// The log file is truncated on every start. If it cannot be created the
/// terminal logger (when requested) is still installed. A second call is a
/// no-op.
pub fn initialize(destination: LogDestination, level: LevelFilter) {
    let config = build_config();
    let mut loggers: Vec<Box<dyn SharedLogger>> = Vec::new();

    if destination.to_terminal() {
        loggers.push(TermLogger::new(
            level,
            config.clone(),
            TerminalMode::Mixed,
            ColorChoice::Auto,
        ));
    }
    if destination.to_file() {
        if let Some(file_logger) = create_file_logger(level, config) {
            loggers.push(file_logger);
        }
    }

    if !loggers.is_empty() {
        let _ = CombinedLogger::init(loggers);
    }
}

/// Initializes a simple terminal logger for use in unit tests.
///
/// This safely no-ops if another logger has already been initialized.
pub fn initialize_for_tests() {
    // Use debug level in debug builds, info in release builds.
    let level = if cfg!(debug_assertions) {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let _ = CombinedLogger::init(vec![TermLogger::new(
        level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )]);
}

fn build_config() -> Config {
    ConfigBuilder::new()
        .set_time_format_rfc3339()
        .set_target_level(LevelFilter::Error)
        .build()
}

fn create_file_logger(level: LevelFilter, config: Config) -> Option<Box<WriteLogger<File>>> {
    let log_path = PathBuf::from(LOG_FILE);
    match File::create(&log_path) {
        Ok(file) => Some(WriteLogger::new(level, config, file)),
        Err(err) => {
            eprintln!("warning: cannot create log file {}: {err}", log_path.display());
            None
        }
    }
}
