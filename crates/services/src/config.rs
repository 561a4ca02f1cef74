use std::env;
use std::str::FromStr;
use std::time::Duration as StdDuration;

use chrono::Duration;
use thiserror::Error;

use exam_core::policy;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("invalid value for {key}: {raw}")]
    Invalid { key: &'static str, raw: String },
}

/// Operational knobs for the engine and the expiry monitor.
///
/// Everything defaults to the exam policy; the environment can override the
/// operational values (not the question distribution, which is part of the
/// exam blueprint).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub database_url: String,
    pub pass_percent: u32,
    pub exam_duration_min: i64,
    pub sweep_interval_secs: u64,
    pub failed_cooldown_days: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:exam.sqlite3".to_owned(),
            pass_percent: policy::PASS_PERCENT,
            exam_duration_min: policy::EXAM_DURATION_MIN,
            sweep_interval_secs: policy::SWEEP_INTERVAL_SECS,
            failed_cooldown_days: policy::FAILED_COOLDOWN_DAYS,
        }
    }
}

fn parse_var<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| ConfigError::Invalid { key, raw }),
        Err(_) => Ok(default),
    }
}

impl EngineConfig {
    /// Read the configuration from the environment (and a `.env` file when
    /// present), falling back to the policy defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a set variable fails to parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();
        Ok(Self {
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            pass_percent: parse_var("PASS_PERCENT", defaults.pass_percent)?,
            exam_duration_min: parse_var("EXAM_DURATION_MIN", defaults.exam_duration_min)?,
            sweep_interval_secs: parse_var("SWEEP_INTERVAL_SECS", defaults.sweep_interval_secs)?,
            failed_cooldown_days: parse_var("FAILED_COOLDOWN_DAYS", defaults.failed_cooldown_days)?,
        })
    }

    /// The timed-exam window.
    #[must_use]
    pub fn exam_duration(&self) -> Duration {
        Duration::minutes(self.exam_duration_min)
    }

    /// The monitor's sweep interval.
    #[must_use]
    pub fn sweep_interval(&self) -> StdDuration {
        StdDuration::from_secs(self.sweep_interval_secs)
    }
}
