//! [`SafetyWatchdog`] – stops the drive on stale telemetry or a close
//! obstacle.
//!
//! Every tick reads the telemetry age and the latest snapshot, evaluates
//! [`SafetyState`], and issues at most one `Stop` no matter how many
//! triggers fired.  The stop goes straight to the [`Drive`], so it lands
//! within one tick plus one pin sequence of the trigger.
//!
//! The loop only ends on the orchestrator's stop request.  A tick that
//! errors or panics is logged and followed by a longer backoff.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tankos_hal::Drive;
use tankos_middleware::{ComponentHandle, StopSignal, spawn_component};
use tankos_types::TankError;
use tracing::{error, info, warn};

use crate::safety::{SafetyConfig, SafetyState};
use crate::source::TelemetrySource;

pub struct SafetyWatchdog {
    source: Arc<dyn TelemetrySource>,
    drive: Arc<dyn Drive>,
    config: SafetyConfig,
}

impl SafetyWatchdog {
    pub fn new(source: Arc<dyn TelemetrySource>, drive: Arc<dyn Drive>, config: SafetyConfig) -> Self {
        Self {
            source,
            drive,
            config,
        }
    }

    /// Evaluate the triggers once and stop the drive if either fired.
    ///
    /// # Errors
    ///
    /// Propagates telemetry and actuator failures.  When the snapshot
    /// cannot be read the drive is still told to stop before the error is
    /// returned.
    pub fn tick(&self) -> Result<SafetyState, TankError> {
        let age = self.source.age();
        let snapshot = match self.source.latest() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                if let Err(stop_err) = self.drive.stop() {
                    error!(error = %stop_err, "stop after telemetry failure also failed");
                }
                return Err(e);
            }
        };

        let state = SafetyState::evaluate(age, snapshot.front_distance, &self.config);
        if state.sensor_stale {
            error!(
                age_ms = age.as_millis() as u64,
                timeout_ms = self.config.sensor_timeout().as_millis() as u64,
                "sensor data stale, stopping motors"
            );
        }
        if state.obstacle_close {
            warn!(
                front_cm = ?snapshot.front_distance,
                threshold_cm = self.config.front_threshold_cm,
                "obstacle ahead, stopping motors"
            );
        }
        if state.requires_stop() {
            self.drive.stop()?;
        }
        Ok(state)
    }

    /// Start the watchdog loop on its own thread.
    ///
    /// # Errors
    ///
    /// Returns [`TankError::Spawn`] if the thread cannot be created.
    pub fn spawn(self: Arc<Self>, stop: StopSignal) -> Result<ComponentHandle, TankError> {
        spawn_component("safety-watchdog", move || self.run(&stop))
    }

    fn run(&self, stop: &StopSignal) {
        info!(
            tick_ms = self.config.tick_ms,
            timeout_s = self.config.sensor_timeout_s,
            threshold_cm = self.config.front_threshold_cm,
            "safety watchdog started"
        );
        while !stop.is_stop_requested() {
            let pause = match panic::catch_unwind(AssertUnwindSafe(|| self.tick())) {
                Ok(Ok(_)) => self.config.tick(),
                Ok(Err(e)) => {
                    error!(error = %e, "watchdog tick failed");
                    self.config.fault_backoff()
                }
                Err(_) => {
                    error!("watchdog tick panicked");
                    self.config.fault_backoff()
                }
            };
            if stop.wait(pause) {
                break;
            }
        }
        info!("safety watchdog stopped");
    }
}
