//! Logging configuration
//!
//! The console doubles as the launcher's user interface, so tracing output
//! defaults to a quiet filter that keeps the HTTP stack from flooding it.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::errors::LauncherError;

/// Crates whose chatter drowns out deploy progress at their default level.
const QUIET_TARGETS: &[(&str, &str)] = &[
    ("hyper", "warn"),
    ("reqwest", "warn"),
    ("tower_http", "info"),
    ("tungstenite", "warn"),
];

/// Log level configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
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

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(format!("Invalid log level: {}", s)),
        }
    }
}

/// Logging options
#[derive(Debug, Clone)]
pub struct LogOptions {
    /// Log level for the launcher's own crates
    pub log_level: LogLevel,

    /// Colorize output
    pub ansi: bool,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            ansi: true,
        }
    }
}

/// Build the default filter directive for a level, quieting noisy targets.
fn default_directives(level: LogLevel) -> String {
    let mut directives = level.as_str().to_string();
    for (target, target_level) in QUIET_TARGETS {
        directives.push_str(&format!(",{}={}", target, target_level));
    }
    directives
}

/// Initialize logging. `RUST_LOG` overrides the options entirely.
pub fn init_logging(options: LogOptions) -> Result<(), LauncherError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(options.log_level)));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_ansi(options.ansi).with_target(false))
        .try_init()
        .map_err(|e| LauncherError::ConfigError(e.to_string()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_parse_accepts_warning_alias() {
        assert_eq!("warning".parse::<LogLevel>(), Ok(LogLevel::Warn));
        assert_eq!("DEBUG".parse::<LogLevel>(), Ok(LogLevel::Debug));
        assert!("loud".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_default_directives_quiet_the_http_stack() {
        let directives = default_directives(LogLevel::Debug);
        assert!(directives.starts_with("debug,"));
        assert!(directives.contains("hyper=warn"));
    }
}
