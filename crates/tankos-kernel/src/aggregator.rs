//! [`SensorAggregator`] – periodic sensor polling and snapshot publishing.
//!
//! Every tick queries each reader once.  A reader that is not ready, returns
//! an error, or panics leaves its field(s) absent for that tick; it never
//! takes the aggregator down and never leaves a stale or placeholder value
//! behind.  The assembled snapshot is published with a single pointer swap
//! into a [`Latest`] slot, which also stamps the publish time used by
//! [`age`][SensorAggregator::age].

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tankos_hal::{Reading, SensorRig};
use tankos_middleware::{ComponentHandle, Latest, StopSignal, spawn_component};
use tankos_perception::attitude_from_accel;
use tankos_types::{SensorSnapshot, TankError};
use tracing::{debug, error, info, warn};

use crate::source::TelemetrySource;

/// `[sensors]` section of the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorsConfig {
    /// Polling period in milliseconds.
    pub poll_period_ms: u64,
    /// Pause after a tick that panicked outside the per-reader guards.
    pub fault_backoff_ms: u64,
}

impl Default for SensorsConfig {
    fn default() -> Self {
        Self {
            poll_period_ms: 500,
            fault_backoff_ms: 1000,
        }
    }
}

/// Owns the sensor readers and publishes their combined snapshot.
pub struct SensorAggregator {
    config: SensorsConfig,
    rig: Mutex<SensorRig>,
    snapshots: Latest<SensorSnapshot>,
    created_at: Instant,
}

// Run one reader call, folding not-ready, errors and panics into `None`.
fn guarded<T>(sensor: &str, read: impl FnOnce() -> Result<Reading<T>, TankError>) -> Option<T> {
    match panic::catch_unwind(AssertUnwindSafe(read)) {
        Ok(Ok(reading)) => reading.ready(),
        Ok(Err(e)) => {
            warn!(sensor, error = %e, "sensor read failed");
            None
        }
        Err(_) => {
            error!(sensor, "sensor reader panicked");
            None
        }
    }
}

impl SensorAggregator {
    pub fn new(rig: SensorRig, config: SensorsConfig) -> Self {
        Self {
            config,
            rig: Mutex::new(rig),
            snapshots: Latest::new(),
            created_at: Instant::now(),
        }
    }

    /// Handle to the slot snapshots are published into.
    pub fn snapshots(&self) -> Latest<SensorSnapshot> {
        self.snapshots.clone()
    }

    /// Query every reader once, publish the resulting snapshot and return it.
    pub fn poll_once(&self) -> SensorSnapshot {
        let snapshot = {
            let mut rig = self.rig.lock();
            let front = guarded("front", || rig.front.measure());
            let left = guarded("left", || rig.left.measure());
            let right = guarded("right", || rig.right.measure());
            let imu = guarded("imu", || rig.imu.sample());

            let attitude = imu.map(|sample| attitude_from_accel(sample.accel));
            SensorSnapshot {
                front_distance: front,
                left_distance: left,
                right_distance: right,
                temperature: imu.and_then(|sample| sample.temperature),
                pitch: attitude.map(|a| a.pitch),
                roll: attitude.map(|a| a.roll),
                yaw: attitude.map(|a| a.yaw),
                captured_at: Instant::now(),
            }
        };
        let sequence = self.snapshots.publish(snapshot);
        debug!(
            sequence,
            front = ?snapshot.front_distance,
            left = ?snapshot.left_distance,
            right = ?snapshot.right_distance,
            "sensor snapshot published"
        );
        snapshot
    }

    /// Most recent snapshot, or an all-absent one stamped with the
    /// construction instant before the first publish.
    pub fn latest(&self) -> SensorSnapshot {
        self.snapshots
            .copy_out()
            .unwrap_or_else(|| SensorSnapshot::empty(self.created_at))
    }

    /// Time since the last successful publish (since construction before
    /// the first one).
    pub fn age(&self) -> Duration {
        self.snapshots.age()
    }

    /// Start the polling loop on its own thread.
    ///
    /// # Errors
    ///
    /// Returns [`TankError::Spawn`] if the thread cannot be created.
    pub fn spawn(self: Arc<Self>, stop: StopSignal) -> Result<ComponentHandle, TankError> {
        spawn_component("sensor-aggregator", move || self.run(&stop))
    }

    fn run(&self, stop: &StopSignal) {
        let period = Duration::from_millis(self.config.poll_period_ms);
        let backoff = Duration::from_millis(self.config.fault_backoff_ms);
        info!(?period, "sensor aggregator started");

        while !stop.is_stop_requested() {
            let started = Instant::now();
            let pause = match panic::catch_unwind(AssertUnwindSafe(|| self.poll_once())) {
                Ok(_) => period.saturating_sub(started.elapsed()),
                Err(_) => {
                    error!(?backoff, "sensor tick panicked, nothing published");
                    backoff
                }
            };
            if stop.wait(pause) {
                break;
            }
        }
        info!("sensor aggregator stopped");
    }
}

impl TelemetrySource for SensorAggregator {
    fn latest(&self) -> Result<SensorSnapshot, TankError> {
        Ok(SensorAggregator::latest(self))
    }

    fn age(&self) -> Duration {
        SensorAggregator::age(self)
    }
}
