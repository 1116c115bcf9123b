//! Stop triggers derived from telemetry.
//!
//! [`SafetyState`] is recomputed from scratch on every watchdog tick and
//! never stored.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// `[safety]` section of the configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    /// Watchdog evaluation period in milliseconds.
    pub tick_ms: u64,
    /// Telemetry older than this (seconds) stops the motors.
    pub sensor_timeout_s: f64,
    /// Front distances strictly below this (cm) stop the motors.
    pub front_threshold_cm: f32,
    /// Pause after a faulted tick.
    pub fault_backoff_ms: u64,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            tick_ms: 300,
            sensor_timeout_s: 2.5,
            front_threshold_cm: 40.0,
            fault_backoff_ms: 1000,
        }
    }
}

impl SafetyConfig {
    const DEFAULT_TIMEOUT: Duration = Duration::from_millis(2500);

    pub fn sensor_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.sensor_timeout_s).unwrap_or(Self::DEFAULT_TIMEOUT)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn fault_backoff(&self) -> Duration {
        Duration::from_millis(self.fault_backoff_ms)
    }
}

/// Which stop triggers are active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SafetyState {
    pub sensor_stale: bool,
    pub obstacle_close: bool,
}

impl SafetyState {
    /// Evaluate both triggers.
    ///
    /// ```
    /// use std::time::Duration;
    /// use tankos_kernel::{SafetyConfig, SafetyState};
    ///
    /// let cfg = SafetyConfig::default();
    /// let state = SafetyState::evaluate(Duration::from_secs(3), Some(39.0), &cfg);
    /// assert!(state.sensor_stale && state.obstacle_close);
    /// assert!(state.requires_stop());
    /// ```
    pub fn evaluate(age: Duration, front_distance: Option<f32>, config: &SafetyConfig) -> Self {
        Self {
            sensor_stale: age > config.sensor_timeout(),
            obstacle_close: front_distance.is_some_and(|d| d < config.front_threshold_cm),
        }
    }

    pub fn requires_stop(&self) -> bool {
        self.sensor_stale || self.obstacle_close
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> Duration {
        Duration::from_millis(100)
    }

    #[test]
    fn obstacle_threshold_is_strict() {
        let cfg = SafetyConfig::default();
        let eps = 0.01;
        assert!(SafetyState::evaluate(fresh(), Some(40.0 - eps), &cfg).obstacle_close);
        assert!(!SafetyState::evaluate(fresh(), Some(40.0), &cfg).obstacle_close);
        assert!(!SafetyState::evaluate(fresh(), Some(40.0 + eps), &cfg).obstacle_close);
    }

    #[test]
    fn missing_front_distance_is_not_an_obstacle() {
        let state = SafetyState::evaluate(fresh(), None, &SafetyConfig::default());
        assert_eq!(state, SafetyState::default());
        assert!(!state.requires_stop());
    }

    #[test]
    fn staleness_is_strictly_greater_than_timeout() {
        let cfg = SafetyConfig::default();
        assert!(!SafetyState::evaluate(Duration::from_millis(2500), None, &cfg).sensor_stale);
        assert!(SafetyState::evaluate(Duration::from_millis(2501), None, &cfg).sensor_stale);
    }

    #[test]
    fn invalid_timeout_falls_back_to_default() {
        let cfg = SafetyConfig {
            sensor_timeout_s: f64::NAN,
            ..SafetyConfig::default()
        };
        assert_eq!(cfg.sensor_timeout(), Duration::from_millis(2500));
    }
}
