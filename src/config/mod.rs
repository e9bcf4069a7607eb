//! Configuration module for the chaos controller.

use crate::error::{ChaosError, Result};
use crate::metrics::{SinkApp, SinkDriver};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Main configuration for a controller process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Lifecycle engine tuning.
    pub engine: EngineConfig,
    /// Logging and endpoints.
    pub observability: ObservabilityConfig,
    /// Metrics sink selection.
    pub metrics: MetricsConfig,
}

impl ControllerConfig {
    /// Load configuration from a file.
    ///
    /// The format is picked from the extension: `.yaml`/`.yml`, `.toml`, and
    /// anything else is read as JSON.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ChaosError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Self = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)
                .map_err(|e| ChaosError::Config(format!("Failed to parse config: {}", e)))?,
            Some("toml") => toml::from_str(&content)
                .map_err(|e| ChaosError::Config(format!("Failed to parse config: {}", e)))?,
            _ => serde_json::from_str(&content)
                .map_err(|e| ChaosError::Config(format!("Failed to parse config: {}", e)))?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        self.engine.validate()
    }

    /// Permissive settings for local clusters.
    pub fn development() -> Self {
        Self {
            engine: EngineConfig {
                holding_recheck_interval: Duration::from_secs(5),
                backoff: BackoffConfig {
                    initial: Duration::from_millis(200),
                    max: Duration::from_secs(5),
                    multiplier: 2,
                },
                ..EngineConfig::default()
            },
            observability: ObservabilityConfig {
                log_level: "debug".to_string(),
                ..ObservabilityConfig::default()
            },
            metrics: MetricsConfig {
                driver: SinkDriver::Noop,
                app: SinkApp::Controller,
            },
        }
    }

    /// Conservative settings for shared clusters.
    pub fn production() -> Self {
        Self {
            engine: EngineConfig {
                max_concurrent_injections: 4,
                ..EngineConfig::default()
            },
            observability: ObservabilityConfig {
                json_logs: true,
                ..ObservabilityConfig::default()
            },
            metrics: MetricsConfig::default(),
        }
    }
}

/// Tuning knobs for the lifecycle engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Injector attempts per record before the record is marked failed.
    pub injection_retry_limit: u32,
    /// Failed removals per record before the disruption is stuck on removal.
    pub stuck_retry_limit: u32,
    /// Consecutive unhealthy checks before a pending record is given up on.
    pub health_failure_threshold: u32,
    /// Upper bound on concurrent injector calls within one tick.
    pub max_concurrent_injections: usize,
    /// Requeue interval while a disruption is holding.
    #[serde(with = "humantime_serde")]
    pub holding_recheck_interval: Duration,
    /// Requeue backoff after failed injector calls.
    pub backoff: BackoffConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            injection_retry_limit: 3,
            stuck_retry_limit: 3,
            health_failure_threshold: 3,
            max_concurrent_injections: 8,
            holding_recheck_interval: Duration::from_secs(30),
            backoff: BackoffConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.injection_retry_limit == 0 {
            return Err(ChaosError::invalid_config(
                "engine.injection_retry_limit",
                "must be at least 1",
            ));
        }
        if self.stuck_retry_limit == 0 {
            return Err(ChaosError::invalid_config(
                "engine.stuck_retry_limit",
                "must be at least 1",
            ));
        }
        if self.health_failure_threshold == 0 {
            return Err(ChaosError::invalid_config(
                "engine.health_failure_threshold",
                "must be at least 1",
            ));
        }
        if self.max_concurrent_injections == 0 {
            return Err(ChaosError::invalid_config(
                "engine.max_concurrent_injections",
                "must be at least 1",
            ));
        }
        if self.holding_recheck_interval.is_zero() {
            return Err(ChaosError::invalid_config(
                "engine.holding_recheck_interval",
                "must be non-zero",
            ));
        }
        self.backoff.validate()
    }
}

/// Exponential backoff used to space out retries of failed injector calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    #[serde(with = "humantime_serde")]
    pub initial: Duration,
    #[serde(with = "humantime_serde")]
    pub max: Duration,
    pub multiplier: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(60),
            multiplier: 2,
        }
    }
}

impl BackoffConfig {
    /// Delay before the next attempt, given how many attempts already failed.
    pub fn delay(&self, failures: u32) -> Duration {
        if failures == 0 {
            return self.initial;
        }
        let factor = self
            .multiplier
            .checked_pow(failures.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.initial
            .checked_mul(factor)
            .unwrap_or(self.max)
            .min(self.max)
    }

    fn validate(&self) -> Result<()> {
        if self.initial.is_zero() {
            return Err(ChaosError::invalid_config(
                "engine.backoff.initial",
                "must be non-zero",
            ));
        }
        if self.max < self.initial {
            return Err(ChaosError::invalid_config(
                "engine.backoff.max",
                "must not be lower than the initial delay",
            ));
        }
        if self.multiplier == 0 {
            return Err(ChaosError::invalid_config(
                "engine.backoff.multiplier",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Enable the metrics endpoint.
    pub metrics_enabled: bool,
    /// Metrics listen address.
    pub metrics_addr: SocketAddr,
    /// Health probe listen address.
    pub health_addr: SocketAddr,
    /// Log level.
    pub log_level: String,
    /// Enable JSON logging.
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: true,
            metrics_addr: "0.0.0.0:8080".parse().expect("valid socket address"),
            health_addr: "0.0.0.0:8081".parse().expect("valid socket address"),
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

/// Metrics sink selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub driver: SinkDriver,
    pub app: SinkApp,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            driver: SinkDriver::Prometheus,
            app: SinkApp::Controller,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = ControllerConfig::default();
        assert_eq!(config.engine.injection_retry_limit, 3);
        assert_eq!(config.engine.stuck_retry_limit, 3);
        assert_eq!(config.metrics.driver, SinkDriver::Prometheus);
        config.validate().unwrap();
    }

    #[test]
    fn test_presets_are_valid() {
        ControllerConfig::development().validate().unwrap();
        ControllerConfig::production().validate().unwrap();
        assert!(ControllerConfig::production().observability.json_logs);
    }

    #[test]
    fn test_backoff_delay() {
        let backoff = BackoffConfig::default();
        assert_eq!(backoff.delay(0), Duration::from_secs(1));
        assert_eq!(backoff.delay(1), Duration::from_secs(1));
        assert_eq!(backoff.delay(2), Duration::from_secs(2));
        assert_eq!(backoff.delay(4), Duration::from_secs(8));
        assert_eq!(backoff.delay(30), Duration::from_secs(60));
        assert_eq!(backoff.delay(u32::MAX), Duration::from_secs(60));
    }

    #[test]
    fn test_zero_retry_limit_rejected() {
        let mut config = ControllerConfig::default();
        config.engine.stuck_retry_limit = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_yaml_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "engine:\n  injection_retry_limit: 5\n  holding_recheck_interval: 10s\nmetrics:\n  driver: noop"
        )
        .unwrap();

        let config = ControllerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.engine.injection_retry_limit, 5);
        assert_eq!(config.engine.holding_recheck_interval, Duration::from_secs(10));
        assert_eq!(config.engine.stuck_retry_limit, 3);
        assert_eq!(config.metrics.driver, SinkDriver::Noop);
    }

    #[test]
    fn test_from_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[engine]\nstuck_retry_limit = 7\n\n[observability]\njson_logs = true"
        )
        .unwrap();

        let config = ControllerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.engine.stuck_retry_limit, 7);
        assert!(config.observability.json_logs);
    }

    #[test]
    fn test_invalid_file_rejected() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        writeln!(file, "{{\"engine\": {{\"injection_retry_limit\": 0}}}}").unwrap();

        assert!(ControllerConfig::from_file(file.path()).is_err());
    }
}
