//! Generator and buffer configuration.

use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;

/// Largest value a 5-bit site identifier can hold.
const MAX_SITE_ID: i64 = 31;

/// Snowflake generator configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SnowflakeConfig {
    /// Datacenter identifier (0-31).
    #[serde(default = "default_site_id")]
    pub datacenter_id: i64,

    /// Machine identifier within the datacenter (0-31).
    #[serde(default = "default_site_id")]
    pub machine_id: i64,

    /// Custom epoch in milliseconds since the UNIX epoch.
    #[serde(default = "default_epoch_ms")]
    pub epoch_ms: i64,

    /// Largest backward clock jump that is waited out instead of rejected.
    #[serde(default = "default_clock_drift_tolerance_ms")]
    pub clock_drift_tolerance_ms: i64,
}

const fn default_site_id() -> i64 {
    1
}

/// 2021-01-01 00:00:00 UTC.
const fn default_epoch_ms() -> i64 {
    1_609_459_200_000
}

const fn default_clock_drift_tolerance_ms() -> i64 {
    1000
}

impl SnowflakeConfig {
    /// Validate the snowflake configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a site identifier is out of its 5-bit range or the
    /// drift tolerance is negative.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0..=MAX_SITE_ID).contains(&self.datacenter_id) {
            return Err(ConfigError::Message(format!(
                "snowflake.datacenter_id must be within 0..={MAX_SITE_ID}"
            )));
        }
        if !(0..=MAX_SITE_ID).contains(&self.machine_id) {
            return Err(ConfigError::Message(format!(
                "snowflake.machine_id must be within 0..={MAX_SITE_ID}"
            )));
        }
        if self.clock_drift_tolerance_ms < 0 {
            return Err(ConfigError::Message(
                "snowflake.clock_drift_tolerance_ms cannot be negative".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for SnowflakeConfig {
    fn default() -> Self {
        Self {
            datacenter_id: default_site_id(),
            machine_id: default_site_id(),
            epoch_ms: default_epoch_ms(),
            clock_drift_tolerance_ms: default_clock_drift_tolerance_ms(),
        }
    }
}

/// Segment allocator configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SegmentConfig {
    /// Business tag naming the row in the shared store.
    #[serde(default = "default_biz_tag")]
    pub biz_tag: String,

    /// Number of IDs claimed from the store per range.
    #[serde(default = "default_step")]
    pub step: i64,

    /// Period of the background preload check, in seconds.
    #[serde(default = "default_preload_interval_secs")]
    pub preload_interval_secs: u64,

    /// Retry policy for range claims.
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_biz_tag() -> String {
    "default".to_string()
}

const fn default_step() -> i64 {
    10_000
}

const fn default_preload_interval_secs() -> u64 {
    10
}

impl SegmentConfig {
    /// Preload period as a `Duration`.
    #[must_use]
    pub const fn preload_interval(&self) -> Duration {
        Duration::from_secs(self.preload_interval_secs)
    }

    /// Validate the segment configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the tag is empty, the step is not positive or the
    /// retry policy is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.biz_tag.is_empty() {
            return Err(ConfigError::Message(
                "segment.biz_tag cannot be empty".to_string(),
            ));
        }
        if self.step <= 0 {
            return Err(ConfigError::Message(
                "segment.step must be positive".to_string(),
            ));
        }
        if self.preload_interval_secs == 0 {
            return Err(ConfigError::Message(
                "segment.preload_interval_secs cannot be 0".to_string(),
            ));
        }
        self.retry.validate()
    }
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            biz_tag: default_biz_tag(),
            step: default_step(),
            preload_interval_secs: default_preload_interval_secs(),
            retry: RetryConfig::default(),
        }
    }
}

/// Exponential backoff settings for store access.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// First delay after a failure.
    #[serde(default = "default_initial_interval_ms")]
    pub initial_interval_ms: u64,

    /// Upper bound for a single delay.
    #[serde(default = "default_max_interval_ms")]
    pub max_interval_ms: u64,

    /// Total time budget across all attempts.
    #[serde(default = "default_max_elapsed_ms")]
    pub max_elapsed_ms: u64,

    /// Growth factor applied to the delay after each failure.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Jitter ratio; each delay is drawn from `delay * (1 ± factor)`.
    #[serde(default = "default_randomization_factor")]
    pub randomization_factor: f64,
}

const fn default_initial_interval_ms() -> u64 {
    100
}

const fn default_max_interval_ms() -> u64 {
    2_000
}

const fn default_max_elapsed_ms() -> u64 {
    10_000
}

const fn default_multiplier() -> f64 {
    1.5
}

const fn default_randomization_factor() -> f64 {
    0.5
}

impl RetryConfig {
    /// Validate the retry policy.
    ///
    /// # Errors
    ///
    /// Returns an error for zero intervals, a shrinking multiplier or a jitter
    /// factor outside `[0, 1)`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.initial_interval_ms == 0 || self.max_interval_ms == 0 {
            return Err(ConfigError::Message(
                "segment.retry intervals cannot be 0".to_string(),
            ));
        }
        if self.multiplier < 1.0 {
            return Err(ConfigError::Message(
                "segment.retry.multiplier must be at least 1".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.randomization_factor) {
            return Err(ConfigError::Message(
                "segment.retry.randomization_factor must be within [0, 1)".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_interval_ms: default_initial_interval_ms(),
            max_interval_ms: default_max_interval_ms(),
            max_elapsed_ms: default_max_elapsed_ms(),
            multiplier: default_multiplier(),
            randomization_factor: default_randomization_factor(),
        }
    }
}

/// Double buffer sizing, shared by both slots of every pool.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct BufferConfig {
    /// Number of IDs pre-generated per buffer.
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Number of served IDs after which the empty standby buffer is refilled.
    #[serde(default = "default_refill_threshold")]
    pub refill_threshold: usize,
}

const fn default_capacity() -> usize {
    10_000
}

const fn default_refill_threshold() -> usize {
    5_000
}

impl BufferConfig {
    /// Validate buffer sizing.
    ///
    /// # Errors
    ///
    /// Returns an error if the capacity is 0 or the threshold would only be
    /// reached once the buffer is already drained.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::Message(
                "buffer.capacity cannot be 0".to_string(),
            ));
        }
        if self.refill_threshold >= self.capacity {
            return Err(ConfigError::Message(
                "buffer.refill_threshold must be below buffer.capacity".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            refill_threshold: default_refill_threshold(),
        }
    }
}
