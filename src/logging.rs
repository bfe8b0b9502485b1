// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Logging setup and structured memory events.
//!
//! The crate logs through `tracing` under three targets:
//!
//! - `devmem::buffer` - handle transitions (allocate, grow, borrow, release)
//! - `devmem::memory` - raw runtime calls and tracker snapshots
//! - `devmem::device` - backend selection
//!
//! Nothing is printed unless a subscriber is installed. Binaries and tests
//! call [`init_logging`] once; `RUST_LOG` overrides the configured level.

use std::sync::Once;

/// Configuration for logging initialization.
///
/// ## Why This Struct
///
/// Binaries want timestamps and colors, tests want compact plain output.
/// The presets ([`development`](Self::development),
/// [`production`](Self::production), [`testing`](Self::testing)) cover those
/// without every caller building a subscriber by hand.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Default log level when `RUST_LOG` is not set.
    pub default_level: LogLevel,
    /// Include timestamps in log output.
    pub with_timestamps: bool,
    /// Include target (module path) in log output.
    pub with_target: bool,
    /// Include source file and line numbers.
    pub with_file_line: bool,
    /// Use ANSI colors (disable for file output).
    pub with_ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            default_level: LogLevel::Info,
            with_timestamps: true,
            with_target: true,
            with_file_line: false,
            with_ansi: true,
        }
    }
}

impl LogConfig {
    /// Create a new logging configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default log level.
    #[must_use]
    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.default_level = level;
        self
    }

    /// Enable or disable timestamps.
    #[must_use]
    pub fn with_timestamps(mut self, enable: bool) -> Self {
        self.with_timestamps = enable;
        self
    }

    /// Enable or disable ANSI colors.
    #[must_use]
    pub fn with_ansi(mut self, enable: bool) -> Self {
        self.with_ansi = enable;
        self
    }

    /// Verbose preset: every buffer transition, with file/line.
    #[must_use]
    pub fn development() -> Self {
        Self {
            default_level: LogLevel::Debug,
            with_timestamps: true,
            with_target: true,
            with_file_line: true,
            with_ansi: true,
        }
    }

    /// Quiet preset without colors, for log ingestion.
    #[must_use]
    pub fn production() -> Self {
        Self {
            default_level: LogLevel::Info,
            with_timestamps: true,
            with_target: false,
            with_file_line: false,
            with_ansi: false,
        }
    }

    /// Minimal preset for test harness capture.
    #[must_use]
    pub fn testing() -> Self {
        Self {
            default_level: LogLevel::Warn,
            with_timestamps: false,
            with_target: false,
            with_file_line: false,
            with_ansi: false,
        }
    }
}

/// Log level enumeration, mapped onto tracing levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    /// Errors only.
    Error,
    /// Warnings and above.
    Warn,
    /// Informational messages and above.
    #[default]
    Info,
    /// Debug messages and above.
    Debug,
    /// All messages including trace.
    Trace,
}

impl LogLevel {
    fn as_filter_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

static INIT_LOGGING: Once = Once::new();

/// Install the global tracing subscriber.
///
/// ## Arguments
///
/// * `config` - Level, formatting and color settings
///
/// ## Why Single Initialization
///
/// The subscriber is process-global. The first call wins and later calls are
/// no-ops, so every binary, demo and test can call this without coordinating.
///
/// ## Environment Override
///
/// `RUST_LOG` takes precedence over `config.default_level`.
///
/// ```rust
/// use rust_ai_devmem::{init_logging, LogConfig};
///
/// init_logging(&LogConfig::testing());
/// ```
pub fn init_logging(config: &LogConfig) {
    INIT_LOGGING.call_once(|| {
        let filter = std::env::var("RUST_LOG")
            .unwrap_or_else(|_| config.default_level.as_filter_str().to_string());

        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(config.with_ansi)
            .with_target(config.with_target)
            .with_file(config.with_file_line)
            .with_line_number(config.with_file_line);

        // try_init: a test binary may already have installed a subscriber.
        let _ = if config.with_timestamps {
            builder.try_init()
        } else {
            builder.without_time().try_init()
        };
    });
}

/// Log a tracker snapshot for a backend.
///
/// Emitted at `debug` on the `devmem::memory` target after each allocation.
///
/// ## Arguments
///
/// * `allocated_bytes` - Currently allocated bytes
/// * `peak_bytes` - Peak allocation
/// * `backend` - Backend name, e.g. `"cuda:0"`
#[allow(clippy::cast_precision_loss)]
pub fn log_memory_usage(allocated_bytes: usize, peak_bytes: usize, backend: &str) {
    let allocated_mb = allocated_bytes as f64 / (1024.0 * 1024.0);
    let peak_mb = peak_bytes as f64 / (1024.0 * 1024.0);

    tracing::debug!(
        target: "devmem::memory",
        allocated_mb = format!("{allocated_mb:.2}"),
        peak_mb = format!("{peak_mb:.2}"),
        backend,
        "device memory usage"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_config_builder() {
        let config = LogConfig::new()
            .with_level(LogLevel::Debug)
            .with_timestamps(false)
            .with_ansi(false);

        assert_eq!(config.default_level, LogLevel::Debug);
        assert!(!config.with_timestamps);
        assert!(!config.with_ansi);
    }

    #[test]
    fn test_log_config_presets() {
        let dev = LogConfig::development();
        assert_eq!(dev.default_level, LogLevel::Debug);
        assert!(dev.with_file_line);

        let prod = LogConfig::production();
        assert!(!prod.with_ansi);

        let test = LogConfig::testing();
        assert_eq!(test.default_level, LogLevel::Warn);
        assert!(!test.with_timestamps);
    }

    #[test]
    fn test_log_level_filter_str() {
        assert_eq!(LogLevel::Error.as_filter_str(), "error");
        assert_eq!(LogLevel::Trace.as_filter_str(), "trace");
    }

    #[test]
    fn test_init_logging_is_idempotent() {
        init_logging(&LogConfig::testing());
        init_logging(&LogConfig::development());
    }
}
