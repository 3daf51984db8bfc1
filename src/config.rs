use crate::error::{CoordinatorError, Result};
use std::collections::HashMap;
use std::time::Duration;

/// Coordinator configuration with the recognized tuning surface.
///
/// The timing defaults (cooldown, verification grace, staleness multipliers)
/// are deployment-tunable; `validate()` enforces internal consistency, not
/// specific values.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub database_url: String,

    /// Expected heartbeat cadence from agents, and the monitor tick.
    pub heartbeat_interval_seconds: u64,
    /// `age >= warning_multiplier * interval` marks the agent overdue.
    pub heartbeat_warning_multiplier: u32,
    /// `age >= critical_multiplier * interval` escalates to ERROR.
    pub heartbeat_critical_multiplier: u32,
    /// Consecutive missed monitor ticks required before escalation. Both this
    /// counter and the age threshold must agree, to avoid flapping on clock
    /// skew.
    pub missed_ticks_threshold: u32,

    /// Minimum baseline samples before a metric is eligible for anomaly
    /// evaluation.
    pub anomaly_min_samples: usize,
    pub anomaly_warning_z: f64,
    pub anomaly_critical_z: f64,

    /// Minimum interval between repeated applications of the same action type
    /// on the same agent.
    pub optimization_cooldown_seconds: u64,
    /// How long after applying an action before verifying the agent's health.
    pub recovery_verification_grace_seconds: u64,

    pub metrics_retention_days: u32,
    pub events_retention_days: u32,

    /// Bound on every persistence-layer call.
    pub store_timeout_seconds: u64,
    /// Max attempts for a transient store failure before the tick gives up.
    pub store_retry_attempts: u32,
    /// Consecutive store failures before the persistence layer itself is
    /// reported unhealthy.
    pub store_failure_threshold: u32,

    pub event_channel_capacity: usize,

    /// Escape hatch for forward-compatible deployment settings.
    pub custom_settings: HashMap<String, String>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            database_url: "postgresql://localhost/overseer_development".to_string(),
            heartbeat_interval_seconds: 30,
            heartbeat_warning_multiplier: 2,
            heartbeat_critical_multiplier: 5,
            missed_ticks_threshold: 3,
            anomaly_min_samples: 20,
            anomaly_warning_z: 2.0,
            anomaly_critical_z: 3.0,
            optimization_cooldown_seconds: 300,
            recovery_verification_grace_seconds: 60,
            metrics_retention_days: 30,
            events_retention_days: 365,
            store_timeout_seconds: 10,
            store_retry_attempts: 3,
            store_failure_threshold: 5,
            event_channel_capacity: 1000,
            custom_settings: HashMap::new(),
        }
    }
}

impl CoordinatorConfig {
    /// Build a config from environment overrides on top of defaults.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(db_url) = std::env::var("DATABASE_URL") {
            config.database_url = db_url;
        }

        if let Ok(interval) = std::env::var("OVERSEER_HEARTBEAT_INTERVAL") {
            config.heartbeat_interval_seconds = parse_env("heartbeat_interval", &interval)?;
        }
        if let Ok(warning) = std::env::var("OVERSEER_HEARTBEAT_WARNING_MULTIPLIER") {
            config.heartbeat_warning_multiplier =
                parse_env("heartbeat_warning_multiplier", &warning)?;
        }
        if let Ok(critical) = std::env::var("OVERSEER_HEARTBEAT_CRITICAL_MULTIPLIER") {
            config.heartbeat_critical_multiplier =
                parse_env("heartbeat_critical_multiplier", &critical)?;
        }
        if let Ok(samples) = std::env::var("OVERSEER_ANOMALY_MIN_SAMPLES") {
            config.anomaly_min_samples = parse_env("anomaly_min_samples", &samples)?;
        }
        if let Ok(warning_z) = std::env::var("OVERSEER_ANOMALY_WARNING_Z") {
            config.anomaly_warning_z = parse_env("anomaly_warning_z", &warning_z)?;
        }
        if let Ok(critical_z) = std::env::var("OVERSEER_ANOMALY_CRITICAL_Z") {
            config.anomaly_critical_z = parse_env("anomaly_critical_z", &critical_z)?;
        }
        if let Ok(cooldown) = std::env::var("OVERSEER_OPTIMIZATION_COOLDOWN_SECONDS") {
            config.optimization_cooldown_seconds =
                parse_env("optimization_cooldown_seconds", &cooldown)?;
        }
        if let Ok(grace) = std::env::var("OVERSEER_RECOVERY_VERIFICATION_GRACE_SECONDS") {
            config.recovery_verification_grace_seconds =
                parse_env("recovery_verification_grace_seconds", &grace)?;
        }
        if let Ok(days) = std::env::var("OVERSEER_METRICS_RETENTION_DAYS") {
            config.metrics_retention_days = parse_env("metrics_retention_days", &days)?;
        }
        if let Ok(days) = std::env::var("OVERSEER_EVENTS_RETENTION_DAYS") {
            config.events_retention_days = parse_env("events_retention_days", &days)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject inconsistent thresholds before the control loop starts.
    pub fn validate(&self) -> Result<()> {
        if self.heartbeat_interval_seconds == 0 {
            return Err(CoordinatorError::Configuration(
                "heartbeat_interval must be nonzero".to_string(),
            ));
        }
        if self.heartbeat_warning_multiplier == 0
            || self.heartbeat_critical_multiplier <= self.heartbeat_warning_multiplier
        {
            return Err(CoordinatorError::Configuration(format!(
                "heartbeat multipliers must satisfy 0 < warning ({}) < critical ({})",
                self.heartbeat_warning_multiplier, self.heartbeat_critical_multiplier
            )));
        }
        if self.missed_ticks_threshold == 0 {
            return Err(CoordinatorError::Configuration(
                "missed_ticks_threshold must be nonzero".to_string(),
            ));
        }
        if self.anomaly_min_samples < 2 {
            return Err(CoordinatorError::Configuration(
                "anomaly_min_samples must be at least 2".to_string(),
            ));
        }
        if !(self.anomaly_warning_z > 0.0 && self.anomaly_critical_z > self.anomaly_warning_z) {
            return Err(CoordinatorError::Configuration(format!(
                "anomaly z thresholds must satisfy 0 < warning ({}) < critical ({})",
                self.anomaly_warning_z, self.anomaly_critical_z
            )));
        }
        if self.metrics_retention_days == 0 || self.events_retention_days == 0 {
            return Err(CoordinatorError::Configuration(
                "retention windows must be nonzero".to_string(),
            ));
        }
        if self.store_retry_attempts == 0 || self.store_timeout_seconds == 0 {
            return Err(CoordinatorError::Configuration(
                "store timeout and retry attempts must be nonzero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_seconds)
    }

    /// Age at which an agent is marked overdue (WARNING, no transition).
    pub fn warning_age(&self) -> chrono::Duration {
        chrono::Duration::seconds(
            (self.heartbeat_interval_seconds * u64::from(self.heartbeat_warning_multiplier)) as i64,
        )
    }

    /// Age at which an agent is escalated to ERROR.
    pub fn critical_age(&self) -> chrono::Duration {
        chrono::Duration::seconds(
            (self.heartbeat_interval_seconds * u64::from(self.heartbeat_critical_multiplier))
                as i64,
        )
    }

    pub fn cooldown(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.optimization_cooldown_seconds as i64)
    }

    pub fn verification_grace(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.recovery_verification_grace_seconds as i64)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_seconds)
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.parse()
        .map_err(|e| CoordinatorError::Configuration(format!("invalid {name} '{raw}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        CoordinatorConfig::default().validate().unwrap();
    }

    #[test]
    fn test_inverted_multipliers_rejected() {
        let config = CoordinatorConfig {
            heartbeat_warning_multiplier: 5,
            heartbeat_critical_multiplier: 2,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(CoordinatorError::Configuration(_))
        ));
    }

    #[test]
    fn test_inverted_z_thresholds_rejected() {
        let config = CoordinatorConfig {
            anomaly_warning_z: 3.0,
            anomaly_critical_z: 2.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let config = CoordinatorConfig {
            heartbeat_interval_seconds: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_age_thresholds() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.warning_age(), chrono::Duration::seconds(60));
        assert_eq!(config.critical_age(), chrono::Duration::seconds(150));
    }
}
