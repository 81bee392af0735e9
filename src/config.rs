//! Bridge configuration
//!
//! Loaded from TOML, every section optional:
//!
//! ```toml
//! [libraries]
//! objc = "/usr/lib/libobjc.A.dylib"
//!
//! [dispatch]
//! signature_cache_capacity = 2048
//!
//! [exceptions]
//! policy = "abort"
//! trap_faults = true
//!
//! [logging]
//! level = "debug"
//! ```

use crate::error::{BridgeError, Result};
use crate::logging::{parse_level, LogConfig, Level};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub libraries: LibrariesConfig,

    #[serde(default)]
    pub dispatch: DispatchConfig,

    #[serde(default)]
    pub exceptions: ExceptionsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Shared libraries opened by the native runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibrariesConfig {
    #[serde(default = "default_objc")]
    pub objc: String,

    #[serde(default = "default_core_foundation")]
    pub core_foundation: String,

    #[serde(default = "default_foundation")]
    pub foundation: String,

    /// Loaded eagerly after the required libraries (AppKit, CoreText, ...)
    #[serde(default)]
    pub extra: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Capacity of the encoding-string memo table
    #[serde(default = "default_signature_cache_capacity")]
    pub signature_cache_capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExceptionsConfig {
    #[serde(default)]
    pub policy: ExceptionPolicy,

    /// Install signal handlers that report hard faults before dying
    #[serde(default = "default_false")]
    pub trap_faults: bool,
}

/// What the uncaught-exception handler does with a native exception
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExceptionPolicy {
    /// Surface it as `BridgeError::NativeException` on the calling thread
    Raise,
    /// Log it and terminate the process
    Abort,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default)]
    pub file: Option<String>,

    #[serde(default = "default_false")]
    pub json: bool,

    #[serde(default = "default_false")]
    pub spans: bool,
}

impl Default for LibrariesConfig {
    fn default() -> Self {
        Self {
            objc: default_objc(),
            core_foundation: default_core_foundation(),
            foundation: default_foundation(),
            extra: Vec::new(),
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            signature_cache_capacity: default_signature_cache_capacity(),
        }
    }
}

impl Default for ExceptionsConfig {
    fn default() -> Self {
        Self {
            policy: ExceptionPolicy::default(),
            trap_faults: false,
        }
    }
}

impl Default for ExceptionPolicy {
    fn default() -> Self {
        ExceptionPolicy::Raise
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            file: None,
            json: false,
            spans: false,
        }
    }
}

#[cfg(target_vendor = "apple")]
fn default_objc() -> String {
    "/usr/lib/libobjc.A.dylib".to_string()
}
#[cfg(not(target_vendor = "apple"))]
fn default_objc() -> String {
    "libobjc.so.4".to_string()
}

#[cfg(target_vendor = "apple")]
fn default_core_foundation() -> String {
    "/System/Library/Frameworks/CoreFoundation.framework/CoreFoundation".to_string()
}
#[cfg(not(target_vendor = "apple"))]
fn default_core_foundation() -> String {
    "libgnustep-corebase.so".to_string()
}

#[cfg(target_vendor = "apple")]
fn default_foundation() -> String {
    "/System/Library/Frameworks/Foundation.framework/Foundation".to_string()
}
#[cfg(not(target_vendor = "apple"))]
fn default_foundation() -> String {
    "libgnustep-base.so".to_string()
}

fn default_signature_cache_capacity() -> usize { crate::codec::DEFAULT_SPLIT_CACHE_CAPACITY }
fn default_level() -> String { "info".to_string() }
fn default_false() -> bool { false }

impl ExceptionPolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "raise" => Some(Self::Raise),
            "abort" => Some(Self::Abort),
            _ => None,
        }
    }
}

impl BridgeConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            BridgeError::runtime(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| BridgeError::runtime(format!("Failed to parse config: {}", e)))
    }

    /// Defaults, then the file named by `TYPTHON_OBJC_CONFIG`, then
    /// individual environment overrides
    pub fn from_env() -> Result<Self> {
        let mut config = match std::env::var("TYPTHON_OBJC_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };

        if let Ok(policy) = std::env::var("TYPTHON_OBJC_EXCEPTION_POLICY") {
            config.exceptions.policy = ExceptionPolicy::parse(&policy).ok_or_else(|| {
                BridgeError::runtime(format!("Unknown exception policy: {}", policy))
            })?;
        }
        if let Ok(level) = std::env::var("TYPTHON_OBJC_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Ok(path) = std::env::var("TYPTHON_OBJC_LOG_FILE") {
            config.logging.file = Some(path);
        }

        Ok(config)
    }

    /// Logging settings in the form the logging module consumes
    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            level: parse_level(&self.logging.level).unwrap_or(Level::INFO),
            log_path: self.logging.file.clone(),
            json_format: self.logging.json,
            show_spans: self.logging.spans,
        }
    }

    /// Bring process-wide state in line with this configuration
    pub fn apply(&self) {
        crate::codec::set_split_cache_capacity(self.dispatch.signature_cache_capacity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_is_default() {
        let config = BridgeConfig::from_toml_str("").unwrap();
        assert_eq!(config, BridgeConfig::default());
        assert_eq!(config.exceptions.policy, ExceptionPolicy::Raise);
        assert!(!config.exceptions.trap_faults);
    }

    #[test]
    fn test_partial_sections() {
        let config = BridgeConfig::from_toml_str(
            r#"
            [dispatch]
            signature_cache_capacity = 16

            [exceptions]
            policy = "abort"
            trap_faults = true

            [libraries]
            extra = ["/System/Library/Frameworks/AppKit.framework/AppKit"]
            "#,
        )
        .unwrap();

        assert_eq!(config.dispatch.signature_cache_capacity, 16);
        assert_eq!(config.exceptions.policy, ExceptionPolicy::Abort);
        assert!(config.exceptions.trap_faults);
        assert_eq!(config.libraries.extra.len(), 1);
        assert_eq!(config.libraries.objc, LibrariesConfig::default().objc);
    }

    #[test]
    fn test_invalid_policy_is_error() {
        let err = BridgeConfig::from_toml_str("[exceptions]\npolicy = \"ignore\"").unwrap_err();
        assert!(matches!(err, BridgeError::Runtime { .. }));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridge.toml");
        fs::write(&path, "[logging]\nlevel = \"trace\"\njson = true\n").unwrap();

        let config = BridgeConfig::from_file(&path).unwrap();
        let log = config.log_config();
        assert_eq!(log.level, Level::TRACE);
        assert!(log.json_format);
    }

    #[test]
    fn test_missing_file_is_error() {
        assert!(BridgeConfig::from_file(Path::new("/nonexistent/bridge.toml")).is_err());
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!(ExceptionPolicy::parse(" Raise "), Some(ExceptionPolicy::Raise));
        assert_eq!(ExceptionPolicy::parse("ABORT"), Some(ExceptionPolicy::Abort));
        assert_eq!(ExceptionPolicy::parse("retry"), None);
    }
}
