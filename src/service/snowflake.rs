//! Snowflake ID generator.
//!
//! IDs are 64-bit integers laid out as
//!
//! ```text
//! | 1 bit unused | 41 bits ms since epoch | 5 bits datacenter | 5 bits machine | 12 bits sequence |
//! ```
//!
//! giving 4096 IDs per millisecond per site. State is a single
//! `(last_timestamp, sequence)` pair behind a mutex; every wait for the clock
//! happens with the mutex released and the state is re-validated afterwards.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{error, warn};

use crate::config::SnowflakeConfig;
use crate::domain::IdMode;
use crate::error::{AppError, Result};
use crate::service::IdGenerator;
use crate::telemetry::IdMetrics;

const SEQUENCE_BITS: u32 = 12;
const SITE_ID_BITS: u32 = 5;
const TIMESTAMP_BITS: u32 = 41;

const MACHINE_SHIFT: u32 = SEQUENCE_BITS;
const DATACENTER_SHIFT: u32 = SEQUENCE_BITS + SITE_ID_BITS;
const TIMESTAMP_SHIFT: u32 = DATACENTER_SHIFT + SITE_ID_BITS;

const MAX_SEQUENCE: i64 = (1 << SEQUENCE_BITS) - 1;
const MAX_SITE_ID: i64 = (1 << SITE_ID_BITS) - 1;
const MAX_ELAPSED: i64 = (1 << TIMESTAMP_BITS) - 1;

const CLOCK_POLL_INTERVAL: Duration = Duration::from_micros(100);

/// Millisecond wall clock.
pub trait Clock: Send + Sync {
    /// Milliseconds since the UNIX epoch.
    fn now_millis(&self) -> i64;
}

/// The system wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Fields packed into a snowflake ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnowflakeParts {
    /// Milliseconds since the UNIX epoch.
    pub timestamp_ms: i64,
    /// Datacenter identifier.
    pub datacenter_id: i64,
    /// Machine identifier.
    pub machine_id: i64,
    /// Sequence within the millisecond.
    pub sequence: i64,
}

struct State {
    last_timestamp: i64,
    sequence: i64,
}

/// Outcome of one pass over the state under the lock.
enum Step {
    Issued { timestamp: i64, sequence: i64 },
    ClockBehind { last: i64 },
    SequenceFull { last: i64 },
}

/// Time-based ID generator for one site.
pub struct SnowflakeGenerator {
    datacenter_id: i64,
    machine_id: i64,
    epoch_ms: i64,
    drift_tolerance_ms: i64,
    state: Mutex<State>,
    clock: Arc<dyn Clock>,
    metrics: Arc<dyn IdMetrics>,
}

impl SnowflakeGenerator {
    /// Create a generator reading the system clock.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSiteId` if either site identifier is outside 0-31.
    pub fn new(config: &SnowflakeConfig, metrics: Arc<dyn IdMetrics>) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock), metrics)
    }

    /// Create a generator reading `clock`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSiteId` if either site identifier is outside 0-31.
    pub fn with_clock(
        config: &SnowflakeConfig,
        clock: Arc<dyn Clock>,
        metrics: Arc<dyn IdMetrics>,
    ) -> Result<Self> {
        let site_ok = |id: i64| (0..=MAX_SITE_ID).contains(&id);
        if !site_ok(config.datacenter_id) || !site_ok(config.machine_id) {
            return Err(AppError::InvalidSiteId {
                datacenter_id: config.datacenter_id,
                machine_id: config.machine_id,
            });
        }

        Ok(Self {
            datacenter_id: config.datacenter_id,
            machine_id: config.machine_id,
            epoch_ms: config.epoch_ms,
            drift_tolerance_ms: config.clock_drift_tolerance_ms,
            state: Mutex::new(State {
                last_timestamp: -1,
                sequence: 0,
            }),
            clock,
            metrics,
        })
    }

    /// Generate the next ID.
    ///
    /// A backward clock jump within the drift tolerance, or a millisecond whose
    /// sequence space is used up, is waited out. A larger backward jump fails
    /// with `ClockRegression` and leaves the state untouched.
    ///
    /// # Errors
    ///
    /// Returns `ClockRegression` if the clock is behind the last issued
    /// timestamp by more than the tolerance, or behind the epoch.
    pub async fn next_id(&self) -> Result<i64> {
        loop {
            let now = self.clock.now_millis();
            if now < self.epoch_ms {
                error!(
                    now_ms = now,
                    epoch_ms = self.epoch_ms,
                    "Clock is before the configured epoch"
                );
                return Err(AppError::ClockRegression {
                    last: self.epoch_ms,
                    current: now,
                });
            }

            let step = {
                let mut state = self.state.lock();
                if now < state.last_timestamp {
                    Step::ClockBehind {
                        last: state.last_timestamp,
                    }
                } else if now == state.last_timestamp && state.sequence >= MAX_SEQUENCE {
                    Step::SequenceFull {
                        last: state.last_timestamp,
                    }
                } else {
                    if now == state.last_timestamp {
                        state.sequence += 1;
                    } else {
                        state.sequence = 0;
                    }
                    state.last_timestamp = now;
                    Step::Issued {
                        timestamp: now,
                        sequence: state.sequence,
                    }
                }
            };

            match step {
                Step::Issued {
                    timestamp,
                    sequence,
                } => return self.compose(timestamp, sequence),
                Step::ClockBehind { last } => {
                    let drift = last - now;
                    self.metrics.set_clock_offset(drift);
                    if drift > self.drift_tolerance_ms {
                        error!(
                            last_ms = last,
                            now_ms = now,
                            drift_ms = drift,
                            tolerance_ms = self.drift_tolerance_ms,
                            "Clock moved backwards beyond tolerance"
                        );
                        return Err(AppError::ClockRegression { last, current: now });
                    }
                    warn!(
                        drift_ms = drift,
                        "Clock moved backwards, waiting for it to catch up"
                    );
                    self.wait_past(last).await;
                }
                Step::SequenceFull { last } => self.wait_past(last).await,
            }
        }
    }

    /// Split an ID produced by this generator into its fields.
    #[must_use]
    pub const fn decompose(&self, id: i64) -> SnowflakeParts {
        SnowflakeParts {
            timestamp_ms: (id >> TIMESTAMP_SHIFT) + self.epoch_ms,
            datacenter_id: (id >> DATACENTER_SHIFT) & MAX_SITE_ID,
            machine_id: (id >> MACHINE_SHIFT) & MAX_SITE_ID,
            sequence: id & MAX_SEQUENCE,
        }
    }

    fn compose(&self, timestamp: i64, sequence: i64) -> Result<i64> {
        let elapsed = timestamp - self.epoch_ms;
        if elapsed > MAX_ELAPSED {
            return Err(AppError::Internal(format!(
                "timestamp {timestamp} no longer fits in {TIMESTAMP_BITS} bits"
            )));
        }

        Ok((elapsed << TIMESTAMP_SHIFT)
            | (self.datacenter_id << DATACENTER_SHIFT)
            | (self.machine_id << MACHINE_SHIFT)
            | sequence)
    }

    /// Sleep until the clock reads strictly after `last`.
    async fn wait_past(&self, last: i64) {
        while self.clock.now_millis() <= last {
            tokio::time::sleep(CLOCK_POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl IdGenerator for SnowflakeGenerator {
    async fn next_id(&self) -> Result<i64> {
        Self::next_id(self).await
    }

    fn mode(&self) -> IdMode {
        IdMode::Snowflake
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashSet, VecDeque};

    use super::*;
    use crate::telemetry::NoopMetrics;
    use crate::telemetry::testing::RecordingMetrics;

    const T: i64 = 1_700_000_000_000;

    /// Replays scripted readings, then repeats the last one.
    struct ScriptedClock {
        readings: Mutex<VecDeque<i64>>,
        last: Mutex<i64>,
    }

    impl ScriptedClock {
        fn new(readings: impl IntoIterator<Item = i64>) -> Arc<Self> {
            let readings: VecDeque<i64> = readings.into_iter().collect();
            let first = readings.front().copied().unwrap_or(T);
            Arc::new(Self {
                readings: Mutex::new(readings),
                last: Mutex::new(first),
            })
        }
    }

    impl Clock for ScriptedClock {
        fn now_millis(&self) -> i64 {
            let mut last = self.last.lock();
            if let Some(next) = self.readings.lock().pop_front() {
                *last = next;
            }
            *last
        }
    }

    fn scripted(
        readings: impl IntoIterator<Item = i64>,
        tolerance_ms: i64,
    ) -> SnowflakeGenerator {
        let config = SnowflakeConfig {
            clock_drift_tolerance_ms: tolerance_ms,
            ..Default::default()
        };
        SnowflakeGenerator::with_clock(&config, ScriptedClock::new(readings), Arc::new(NoopMetrics))
            .unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_ids_are_unique() {
        let generator = Arc::new(
            SnowflakeGenerator::new(&SnowflakeConfig::default(), Arc::new(NoopMetrics)).unwrap(),
        );

        let mut handles = Vec::new();
        for _ in 0..8 {
            let generator = generator.clone();
            handles.push(tokio::spawn(async move {
                let mut ids = Vec::with_capacity(2000);
                for _ in 0..2000 {
                    ids.push(generator.next_id().await.unwrap());
                }
                ids
            }));
        }

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.await.unwrap() {
                assert!(seen.insert(id), "duplicate id {id}");
            }
        }
        assert_eq!(seen.len(), 16_000);
    }

    #[tokio::test]
    async fn test_time_bits_are_non_decreasing() {
        let generator =
            SnowflakeGenerator::new(&SnowflakeConfig::default(), Arc::new(NoopMetrics)).unwrap();

        let mut previous = generator.decompose(generator.next_id().await.unwrap());
        for _ in 0..5000 {
            let parts = generator.decompose(generator.next_id().await.unwrap());
            assert!(parts.timestamp_ms >= previous.timestamp_ms);
            if parts.timestamp_ms == previous.timestamp_ms {
                assert!(parts.sequence > previous.sequence);
            }
            previous = parts;
        }
    }

    #[tokio::test]
    async fn test_sequence_wraps_into_next_millisecond() {
        let readings = std::iter::repeat_n(T, 4097).chain([T + 1]);
        let generator = scripted(readings, 1000);

        for expected in 0..=MAX_SEQUENCE {
            let parts = generator.decompose(generator.next_id().await.unwrap());
            assert_eq!(parts.timestamp_ms, T);
            assert_eq!(parts.sequence, expected);
        }

        let parts = generator.decompose(generator.next_id().await.unwrap());
        assert_eq!(parts.timestamp_ms, T + 1);
        assert_eq!(parts.sequence, 0);
    }

    #[tokio::test]
    async fn test_small_regression_is_waited_out() {
        let generator = scripted([T, T - 5, T - 3, T + 1], 1000);

        let first = generator.decompose(generator.next_id().await.unwrap());
        let second = generator.decompose(generator.next_id().await.unwrap());

        assert_eq!(first.timestamp_ms, T);
        assert!(second.timestamp_ms > first.timestamp_ms);
        assert_eq!(second.sequence, 0);
    }

    #[tokio::test]
    async fn test_large_regression_fails_without_consuming_state() {
        let generator = scripted([T, T - 2000, T], 1000);

        generator.next_id().await.unwrap();

        let err = generator.next_id().await.unwrap_err();
        assert!(matches!(
            err,
            AppError::ClockRegression {
                last: T,
                current
            } if current == T - 2000
        ));

        // The failed call left (T, 0) in place, so the same millisecond continues.
        let parts = generator.decompose(generator.next_id().await.unwrap());
        assert_eq!(parts.timestamp_ms, T);
        assert_eq!(parts.sequence, 1);
    }

    #[tokio::test]
    async fn test_regression_reports_clock_offset() {
        let metrics = Arc::new(RecordingMetrics::default());
        let generator = SnowflakeGenerator::with_clock(
            &SnowflakeConfig::default(),
            ScriptedClock::new([T, T - 1500]),
            metrics.clone(),
        )
        .unwrap();

        generator.next_id().await.unwrap();
        assert!(generator.next_id().await.is_err());
        assert_eq!(*metrics.clock_offsets.lock(), vec![1500]);
    }

    #[tokio::test]
    async fn test_clock_before_epoch_is_rejected() {
        let generator = scripted([1_000], 1000);
        let err = generator.next_id().await.unwrap_err();
        assert!(matches!(err, AppError::ClockRegression { .. }));
    }

    #[test]
    fn test_invalid_site_ids_are_rejected() {
        for (datacenter_id, machine_id) in [(32, 1), (1, 32), (-1, 0)] {
            let config = SnowflakeConfig {
                datacenter_id,
                machine_id,
                ..Default::default()
            };
            let result = SnowflakeGenerator::new(&config, Arc::new(NoopMetrics));
            assert!(matches!(result, Err(AppError::InvalidSiteId { .. })));
        }
    }

    #[tokio::test]
    async fn test_layout() {
        let config = SnowflakeConfig {
            datacenter_id: 3,
            machine_id: 7,
            ..Default::default()
        };
        let generator =
            SnowflakeGenerator::with_clock(&config, ScriptedClock::new([T]), Arc::new(NoopMetrics))
                .unwrap();

        let id = generator.next_id().await.unwrap();
        assert_eq!(id >> TIMESTAMP_SHIFT, T - config.epoch_ms);
        assert_eq!(
            generator.decompose(id),
            SnowflakeParts {
                timestamp_ms: T,
                datacenter_id: 3,
                machine_id: 7,
                sequence: 0,
            }
        );
    }
}
