pub mod metrics;

pub use metrics::{HistogramSummary, MetricSample, MetricType, MetricsRecorder};

use std::sync::Arc;

use brain_settings::{LogFormat, LoggingSettings};
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Errors raised while installing the global subscriber.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("invalid log level `{0}`")]
    InvalidLevel(String),
    #[error("failed to install tracing subscriber: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

/// Configuration for the telemetry subsystem.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default log level. Overridden by RUST_LOG env var.
    pub log_level: Level,
    /// Per-module level overrides (e.g. "brain_server::router" => DEBUG).
    pub module_levels: Vec<(String, Level)>,
    pub format: LogFormat,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            module_levels: Vec::new(),
            format: LogFormat::Json,
        }
    }
}

impl TelemetryConfig {
    /// Build from the `logging` settings section.
    pub fn from_settings(logging: &LoggingSettings) -> Result<Self, TelemetryError> {
        let log_level = parse_level(&logging.level)?;
        let module_levels = logging
            .modules
            .iter()
            .map(|(module, level)| Ok((module.clone(), parse_level(level)?)))
            .collect::<Result<Vec<_>, TelemetryError>>()?;
        Ok(Self {
            log_level,
            module_levels,
            format: logging.format,
        })
    }

    /// The `EnvFilter` directive string used when RUST_LOG is unset.
    pub fn filter_directives(&self) -> String {
        let mut filter = self.log_level.to_string().to_lowercase();
        for (module, level) in &self.module_levels {
            filter.push_str(&format!(",{}={}", module, level.to_string().to_lowercase()));
        }
        filter
    }
}

fn parse_level(level: &str) -> Result<Level, TelemetryError> {
    level
        .trim()
        .parse::<Level>()
        .map_err(|_| TelemetryError::InvalidLevel(level.to_string()))
}

/// Keeps the process-wide metrics recorder reachable after init.
pub struct TelemetryGuard {
    metrics: Arc<MetricsRecorder>,
}

impl TelemetryGuard {
    pub fn metrics(&self) -> &Arc<MetricsRecorder> {
        &self.metrics
    }
}

/// Initialize the telemetry subsystem. Call once at startup.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter_directives()));

    let fmt_layer = match config.format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .with_target(true)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(fmt_layer.with_filter(env_filter))
        .try_init()?;

    Ok(TelemetryGuard {
        metrics: Arc::new(MetricsRecorder::new()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn default_config() {
        let config = TelemetryConfig::default();
        assert_eq!(config.log_level, Level::INFO);
        assert_eq!(config.filter_directives(), "info");
    }

    #[test]
    fn from_settings_with_modules() {
        let mut modules = BTreeMap::new();
        modules.insert("brain_server::router".to_string(), "trace".to_string());
        let logging = LoggingSettings {
            level: "warn".into(),
            format: LogFormat::Pretty,
            modules,
        };

        let config = TelemetryConfig::from_settings(&logging).unwrap();

        assert_eq!(config.log_level, Level::WARN);
        assert_eq!(config.format, LogFormat::Pretty);
        assert_eq!(config.filter_directives(), "warn,brain_server::router=trace");
    }

    #[test]
    fn from_settings_rejects_bad_level() {
        let logging = LoggingSettings {
            level: "loud".into(),
            ..LoggingSettings::default()
        };
        let err = TelemetryConfig::from_settings(&logging).unwrap_err();
        assert!(matches!(err, TelemetryError::InvalidLevel(ref l) if l == "loud"));
    }

    #[test]
    fn level_parsing_is_case_insensitive() {
        assert_eq!(parse_level("DEBUG").unwrap(), Level::DEBUG);
        assert_eq!(parse_level(" info ").unwrap(), Level::INFO);
    }
}
