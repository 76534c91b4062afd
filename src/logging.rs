/// Structured logging for the weather forecast pipeline
///
/// Provides context-rich logging with a pipeline component tag, the object
/// key being processed, timestamps, and severity levels. Supports both
/// console output and file-based logging for scheduled runs.

use chrono::Utc;
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::str::FromStr;
use std::sync::Mutex;

use crate::model::{ErrorKind, StageError};

// ---------------------------------------------------------------------------
// Log Levels
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warning => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level: {}", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline Components
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Ingest,
    Quality,
    Store,
    Notify,
    System,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Component::Ingest => write!(f, "INGEST"),
            Component::Quality => write!(f, "QUALITY"),
            Component::Store => write!(f, "STORE"),
            Component::Notify => write!(f, "NOTIFY"),
            Component::System => write!(f, "SYS"),
        }
    }
}

// ---------------------------------------------------------------------------
// Failure Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureType {
    /// Expected failure - the data quality gate rejected an empty payload
    Expected,
    /// Unexpected failure - indicates a bug, schema drift, or misconfiguration
    Unexpected,
    /// Unknown - likely transient (upstream outage, timeout), may clear next run
    Unknown,
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureType::Expected => write!(f, "EXPECTED"),
            FailureType::Unexpected => write!(f, "UNEXPECTED"),
            FailureType::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

// ---------------------------------------------------------------------------
// Logger Configuration
// ---------------------------------------------------------------------------

/// Global logger instance
static LOGGER: Mutex<Option<Logger>> = Mutex::new(None);

pub struct Logger {
    /// Minimum log level to display
    min_level: LogLevel,
    /// Optional file path for logging
    log_file: Option<String>,
    /// Whether to include timestamps in console output
    console_timestamps: bool,
}

impl Logger {
    /// Initialize the global logger
    pub fn init(min_level: LogLevel, log_file: Option<String>, console_timestamps: bool) {
        let logger = Logger {
            min_level,
            log_file,
            console_timestamps,
        };

        if let Ok(mut slot) = LOGGER.lock() {
            *slot = Some(logger);
        }
    }

    fn log(&self, level: LogLevel, component: Component, object_key: Option<&str>, message: &str) {
        if level < self.min_level {
            return;
        }

        let log_entry = format_entry(level, component, object_key, message);

        // Console output; stdout is reserved for command results
        let console = if self.console_timestamps {
            log_entry.clone()
        } else {
            console_line(level, component, object_key, message)
        };
        let _ = writeln!(std::io::stderr().lock(), "{}", console);

        // File output
        if let Some(ref path) = self.log_file {
            if let Err(e) = Self::append_to_file(path, &log_entry) {
                eprintln!("Failed to write to log file {}: {}", path, e);
            }
        }
    }

    fn append_to_file(path: &str, entry: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        writeln!(file, "{}", entry)?;
        Ok(())
    }
}

/// `<timestamp> <LEVEL> <COMPONENT> [<key>]: <message>`
fn format_entry(level: LogLevel, component: Component, object_key: Option<&str>, message: &str) -> String {
    let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
    let key_part = object_key.map(|k| format!(" [{}]", k)).unwrap_or_default();
    format!("{} {} {}{}: {}", timestamp, level, component, key_part, message)
}

/// Compact console form used when timestamps are off.
fn console_line(level: LogLevel, component: Component, object_key: Option<&str>, message: &str) -> String {
    let key_part = object_key.map(|k| format!(" [{}]", k)).unwrap_or_default();
    match level {
        LogLevel::Error => format!("   ✗ {}{}: {}", component, key_part, message),
        LogLevel::Warning => format!("   ⚠ {}{}: {}", component, key_part, message),
        LogLevel::Info => format!("   {}{}: {}", component, key_part, message),
        LogLevel::Debug => format!("   [DEBUG] {}{}: {}", component, key_part, message),
    }
}

// ---------------------------------------------------------------------------
// Public Logging Functions
// ---------------------------------------------------------------------------

/// Initialize the global logger
pub fn init_logger(min_level: LogLevel, log_file: Option<&str>, console_timestamps: bool) {
    Logger::init(min_level, log_file.map(String::from), console_timestamps);
}

fn dispatch(level: LogLevel, component: Component, object_key: Option<&str>, message: &str) {
    if let Ok(guard) = LOGGER.lock() {
        if let Some(logger) = guard.as_ref() {
            logger.log(level, component, object_key, message);
        }
    }
}

/// Log a general informational message
pub fn info(component: Component, object_key: Option<&str>, message: &str) {
    dispatch(LogLevel::Info, component, object_key, message);
}

/// Log a warning message
pub fn warn(component: Component, object_key: Option<&str>, message: &str) {
    dispatch(LogLevel::Warning, component, object_key, message);
}

/// Log an error message
pub fn error(component: Component, object_key: Option<&str>, message: &str) {
    dispatch(LogLevel::Error, component, object_key, message);
}

/// Log a debug message
pub fn debug(component: Component, object_key: Option<&str>, message: &str) {
    dispatch(LogLevel::Debug, component, object_key, message);
}

// ---------------------------------------------------------------------------
// Failure Classification Helpers
// ---------------------------------------------------------------------------

/// Classify a stage failure from its kind and rendered message
pub fn classify_failure(kind: ErrorKind, error_message: &str) -> FailureType {
    match kind {
        ErrorKind::EmptyData => FailureType::Expected,
        // 5xx and timeouts from the forecast API usually clear by the next run
        ErrorKind::Fetch
            if error_message.contains("HTTP error: 5")
                || error_message.contains("timed out") =>
        {
            FailureType::Unknown
        }
        ErrorKind::Read if error_message.contains("object not found") => FailureType::Unknown,
        _ => FailureType::Unexpected,
    }
}

/// Log a stage failure with automatic classification
pub fn log_stage_failure(component: Component, object_key: Option<&str>, err: &StageError) {
    let error_msg = err.to_string();
    let failure_type = classify_failure(err.kind(), &error_msg);

    let message = format!("{} [{}]: {}", err.kind(), failure_type, error_msg);

    match failure_type {
        FailureType::Expected => info(component, object_key, &message),
        FailureType::Unknown => warn(component, object_key, &message),
        FailureType::Unexpected => error(component, object_key, &message),
    }
}

// ---------------------------------------------------------------------------
// Run Summary Logging
// ---------------------------------------------------------------------------

/// Log a summary of one scheduler cycle
pub fn log_run_summary(total: usize, successful: usize, failed: usize) {
    let message = format!(
        "Run complete: {}/{} invocations successful, {} failed",
        successful, total, failed
    );

    if failed == 0 {
        info(Component::System, None, &message);
    } else if successful == 0 {
        error(Component::System, None, &message);
    } else {
        warn(Component::System, None, &message);
    }
}
