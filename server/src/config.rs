use anyhow::Context;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeDelta, Utc};
use lotto_execution::{DrawOptions, StrategyPolicy, DEFAULT_RETRY_LIMIT};
use lotto_types::DEFAULT_UTC_OFFSET_MINUTES;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::store::BUSY_TIMEOUT;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_BATCH_SIZE: usize = 1_000;
pub const DEFAULT_AGGREGATION_TIMEOUT_MS: u64 = 20_000;
pub const DEFAULT_EXECUTION_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_LOCK_TTL_MS: u64 = 60_000;
pub const DEFAULT_SCHEDULER_TICK_MS: u64 = 30_000;
pub const DEFAULT_HTTP_BODY_LIMIT_BYTES: usize = 64 * 1024;

const MINUTES_PER_DAY: i32 = 24 * 60;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{field} must be > 0 (got {value})")]
    InvalidNonZero { field: &'static str, value: u64 },
    #[error("utc_offset_minutes must be within one day (got {value})")]
    InvalidOffset { value: i32 },
    #[error("strategy policy is invalid: {value}")]
    InvalidStrategy { value: String },
    #[error("win percentage must be within 0..=100 (got {value})")]
    InvalidPercentage { value: String },
    #[error(
        "lock_ttl_ms ({lock_ttl_ms}) must exceed execution_timeout_ms plus the store busy timeout ({required_ms})"
    )]
    LockTtlTooShort { lock_ttl_ms: u64, required_ms: u64 },
}

/// Runtime configuration of the draw service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
    /// SQLite database holding tickets, sellers, win percentages and results.
    pub database_path: PathBuf,
    /// Offset of the business day's local time from UTC.
    pub utc_offset_minutes: i32,
    /// Tickets loaded per aggregation batch.
    pub batch_size: usize,
    pub aggregation_timeout_ms: u64,
    pub execution_timeout_ms: u64,
    pub lock_ttl_ms: u64,
    pub filler_retry_limit: usize,
    pub strategy_policy: StrategyPolicy,
    /// Drive draws from the built-in 15-minute schedule. Disable on all but one instance.
    pub scheduler_enabled: bool,
    pub scheduler_tick_ms: u64,
    /// Seed mixed with the draw key for reproducible draws (entropy when unset).
    pub deterministic_seed: Option<u64>,
    pub http_body_limit_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::from([127, 0, 0, 1]),
            port: DEFAULT_PORT,
            database_path: PathBuf::from("lotto.db"),
            utc_offset_minutes: DEFAULT_UTC_OFFSET_MINUTES,
            batch_size: DEFAULT_BATCH_SIZE,
            aggregation_timeout_ms: DEFAULT_AGGREGATION_TIMEOUT_MS,
            execution_timeout_ms: DEFAULT_EXECUTION_TIMEOUT_MS,
            lock_ttl_ms: DEFAULT_LOCK_TTL_MS,
            filler_retry_limit: DEFAULT_RETRY_LIMIT,
            strategy_policy: StrategyPolicy::Uniform,
            scheduler_enabled: true,
            scheduler_tick_ms: DEFAULT_SCHEDULER_TICK_MS,
            deterministic_seed: None,
            http_body_limit_bytes: DEFAULT_HTTP_BODY_LIMIT_BYTES,
        }
    }
}

impl ServerConfig {
    /// Read a YAML config file. Missing keys keep their defaults.
    pub fn from_yaml_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("could not read config file {}", path.display()))?;
        serde_yaml::from_str(&contents)
            .with_context(|| format!("could not parse config file {}", path.display()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure_nonzero("batch_size", self.batch_size as u64)?;
        ensure_nonzero("execution_timeout_ms", self.execution_timeout_ms)?;
        ensure_nonzero("lock_ttl_ms", self.lock_ttl_ms)?;
        ensure_nonzero("scheduler_tick_ms", self.scheduler_tick_ms)?;
        if self.utc_offset_minutes.abs() >= MINUTES_PER_DAY {
            return Err(ConfigError::InvalidOffset {
                value: self.utc_offset_minutes,
            });
        }
        // the lock must outlive a generation, including a save waiting on the write lock
        let required_ms = self
            .execution_timeout_ms
            .saturating_add(BUSY_TIMEOUT.as_millis() as u64);
        if self.lock_ttl_ms <= required_ms {
            return Err(ConfigError::LockTtlTooShort {
                lock_ttl_ms: self.lock_ttl_ms,
                required_ms,
            });
        }
        Ok(())
    }

    pub fn draw_options(&self) -> DrawOptions {
        DrawOptions {
            policy: self.strategy_policy,
            filler_retry_limit: self.filler_retry_limit,
        }
    }

    pub fn aggregation_timeout(&self) -> Duration {
        Duration::from_millis(self.aggregation_timeout_ms)
    }

    pub fn execution_timeout(&self) -> Duration {
        Duration::from_millis(self.execution_timeout_ms)
    }

    pub fn lock_ttl(&self) -> Duration {
        Duration::from_millis(self.lock_ttl_ms)
    }

    pub fn clock(&self) -> Result<LocalClock, ConfigError> {
        LocalClock::new(self.utc_offset_minutes)
    }
}

fn ensure_nonzero(field: &'static str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidNonZero { field, value });
    }
    Ok(())
}

/// Parse a configured strategy policy name.
pub fn parse_strategy_policy(raw: &str) -> Result<StrategyPolicy, ConfigError> {
    raw.parse()
        .map_err(|_| ConfigError::InvalidStrategy {
            value: raw.to_string(),
        })
}

/// Check a win percentage submitted by an administrator.
pub fn validate_percentage(value: f64) -> Result<f64, ConfigError> {
    if value.is_finite() && (0.0..=100.0).contains(&value) {
        Ok(value)
    } else {
        Err(ConfigError::InvalidPercentage {
            value: value.to_string(),
        })
    }
}

/// Wall clock of the business day's time zone.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LocalClock {
    offset: FixedOffset,
}

impl LocalClock {
    pub fn new(utc_offset_minutes: i32) -> Result<Self, ConfigError> {
        FixedOffset::east_opt(utc_offset_minutes * 60)
            .map(|offset| Self { offset })
            .ok_or(ConfigError::InvalidOffset {
                value: utc_offset_minutes,
            })
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn now(&self) -> DateTime<FixedOffset> {
        self.at(Utc::now())
    }

    pub fn at(&self, instant: DateTime<Utc>) -> DateTime<FixedOffset> {
        instant.with_timezone(&self.offset)
    }

    pub fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }

    /// UTC instants bounding a local business day, as `[start, end)`.
    pub fn day_bounds(&self, date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
        let local_midnight = date.and_time(NaiveTime::MIN);
        let start = local_midnight - TimeDelta::seconds(self.offset.local_minus_utc() as i64);
        let start = DateTime::<Utc>::from_naive_utc_and_offset(start, Utc);
        (start, start + TimeDelta::days(1))
    }
}
