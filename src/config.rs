//! Run configuration: logging setup and the default Output memory/spill
//! budget (spec.md §8 ambient stack).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Info
    }
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogFileConfig {
    pub directory: PathBuf,
    pub file_name: String,
}

/// Composition-wide configuration. `slot_memory_limit`/`slot_memory_location`
/// are the defaults a component's own `OutputSlot` spill policy (spec.md
/// §4.2) can fall back to; they are not enforced automatically since only
/// the component declaring a slot knows whether history is safe to spill.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositionConfig {
    pub logger_name: String,
    pub print_log: bool,
    pub log_file: Option<LogFileConfig>,
    pub log_level: LogLevel,
    pub slot_memory_limit: Option<u64>,
    pub slot_memory_location: Option<PathBuf>,
}

impl Default for CompositionConfig {
    fn default() -> Self {
        CompositionConfig {
            logger_name: "finam".to_string(),
            print_log: true,
            log_file: None,
            log_level: LogLevel::Info,
            slot_memory_limit: None,
            slot_memory_location: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_json() {
        let config = CompositionConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: CompositionConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.logger_name, config.logger_name);
        assert_eq!(back.log_level, config.log_level);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: CompositionConfig = serde_json::from_str("{\"logger_name\": \"custom\"}").unwrap();
        assert_eq!(config.logger_name, "custom");
        assert!(config.print_log);
        assert_eq!(config.log_level, LogLevel::Info);
    }
}
