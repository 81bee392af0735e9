//! Logging infrastructure - structured tracing throughout the bridge
//!
//! Design: Uses `tracing` for structured, contextual logging with:
//! - Configurable log levels per module
//! - Zero-cost when disabled
//! - Span-based performance tracking
//! - Console or rolling-file output, human-readable or JSON

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::io;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

// Re-export tracing macros for use throughout the bridge
pub use tracing::{debug, error, info, trace, warn, Level};

/// Global logging state
static LOGGER: OnceCell<()> = OnceCell::new();

/// Keeps the non-blocking writer flushing for the life of the process
static WRITER_GUARD: Mutex<Option<WorkerGuard>> = Mutex::new(None);

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Default log level
    pub level: Level,
    /// Log file path (console output when `None`)
    pub log_path: Option<String>,
    /// Enable JSON format (vs human-readable)
    pub json_format: bool,
    /// Show span events (enter/exit)
    pub show_spans: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            log_path: None,
            json_format: false,
            show_spans: false,
        }
    }
}

impl LogConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // TYPTHON_OBJC_LOG_LEVEL: trace, debug, info, warn, error
        if let Ok(level_str) = std::env::var("TYPTHON_OBJC_LOG_LEVEL") {
            config.level = parse_level(&level_str).unwrap_or(Level::INFO);
        }

        // TYPTHON_OBJC_LOG_FILE: path to log file
        if let Ok(path) = std::env::var("TYPTHON_OBJC_LOG_FILE") {
            config.log_path = Some(path);
        }

        config.json_format = std::env::var("TYPTHON_OBJC_LOG_JSON").is_ok();
        config.show_spans = std::env::var("TYPTHON_OBJC_LOG_SPANS").is_ok();

        config
    }

    /// Verbose logging for debugging dispatch problems
    pub fn debug() -> Self {
        Self {
            level: Level::TRACE,
            log_path: None,
            json_format: false,
            show_spans: true,
        }
    }
}

pub fn parse_level(level: &str) -> Option<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

/// Initialize logging with configuration from the environment
pub fn init() {
    init_with_config(LogConfig::from_env());
}

/// Initialize logging with custom configuration
///
/// Only the first call has an effect. A subscriber installed elsewhere in
/// the process is left alone.
pub fn init_with_config(config: LogConfig) {
    LOGGER.get_or_init(|| {
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "typthon_objc={}",
                config.level.as_str().to_lowercase()
            ))
        });

        let span_events = if config.show_spans {
            FmtSpan::ENTER | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };

        let (writer, guard) = match config.log_path.as_deref() {
            Some(path) => {
                let path = Path::new(path);
                let directory = path.parent().unwrap_or_else(|| Path::new("."));
                let prefix = path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "typthon_objc.log".to_string());
                tracing_appender::non_blocking(tracing_appender::rolling::daily(directory, prefix))
            }
            None => tracing_appender::non_blocking(io::stderr()),
        };

        let layer = if config.json_format {
            fmt::layer()
                .json()
                .with_writer(writer)
                .with_span_events(span_events)
                .with_target(true)
                .boxed()
        } else {
            fmt::layer()
                .with_writer(writer)
                .with_span_events(span_events)
                .with_target(true)
                .with_thread_ids(cfg!(debug_assertions))
                .with_line_number(cfg!(debug_assertions))
                .boxed()
        };

        if tracing_subscriber::registry()
            .with(env_filter)
            .with(layer)
            .try_init()
            .is_ok()
        {
            *WRITER_GUARD.lock() = Some(guard);
        }
    });
}

/// Check if logging is initialized
pub fn is_initialized() -> bool {
    LOGGER.get().is_some()
}

// ============================================================================
// Bridge-specific logging functions
// ============================================================================

/// Log a shared library load
pub fn log_library_load(name: &str, cached: bool) {
    debug!(
        event = "library_load",
        library = name,
        cached = cached,
        "Shared library resolved"
    );
}

/// Log a message send before the native call
#[inline]
pub fn log_dispatch(selector: &str, receiver: usize, arg_count: usize) {
    trace!(
        event = "dispatch",
        selector = selector,
        receiver = receiver as u64,
        args = arg_count,
        "Sending message"
    );
}

/// Log a dispatch failure detected before the native call
pub fn log_dispatch_error(selector: &str, error: &str) {
    warn!(
        event = "dispatch_error",
        selector = selector,
        error = error,
        "Message not sent"
    );
}

/// Log a wrapper creation
#[inline]
pub fn log_wrap(address: usize, class_name: &str) {
    trace!(
        event = "wrap",
        address = address as u64,
        class = class_name,
        "Wrapper created"
    );
}

/// Log an identity-cache eviction
#[inline]
pub fn log_evict(address: usize) {
    trace!(
        event = "evict",
        address = address as u64,
        "Wrapper evicted after native deallocation"
    );
}

/// Log a runtime class registration
pub fn log_class_registered(name: &str, parent: &str) {
    info!(
        event = "class_registered",
        class = name,
        parent = parent,
        "Runtime class registered"
    );
}

/// Log a host method installed on a runtime class
pub fn log_method_added(class: &str, selector: &str, encoding: &str) {
    debug!(
        event = "method_added",
        class = class,
        selector = selector,
        encoding = encoding,
        "Host method installed"
    );
}

/// Log an error swallowed at a native callback boundary
pub fn log_callback_error(selector: &str, error: &str) {
    error!(
        event = "callback_error",
        selector = selector,
        error = error,
        "Host method failed inside native callback"
    );
}

/// Log an uncaught native exception
pub fn log_native_exception(name: &str, reason: &str) {
    error!(
        event = "native_exception",
        name = name,
        reason = reason,
        "Uncaught native exception"
    );
}

/// Performance tracking utilities
pub mod perf {
    use std::time::Instant;
    use tracing::debug;

    /// Track operation duration (returns guard that logs on drop)
    #[must_use]
    pub fn track(operation: &'static str) -> PerformanceGuard {
        PerformanceGuard {
            operation,
            start: Instant::now(),
        }
    }

    pub struct PerformanceGuard {
        operation: &'static str,
        start: Instant,
    }

    impl Drop for PerformanceGuard {
        fn drop(&mut self) {
            let elapsed = self.start.elapsed();
            debug!(
                operation = self.operation,
                duration_us = elapsed.as_micros() as u64,
                "operation completed"
            );
        }
    }
}
