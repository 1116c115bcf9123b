//! [`TelemetrySource`] – the read side of sensor telemetry.

use std::time::Duration;

use tankos_types::{SensorSnapshot, TankError};

/// Anything that can hand out the latest [`SensorSnapshot`].
pub trait TelemetrySource: Send + Sync {
    /// Owned copy of the most recent snapshot.
    ///
    /// # Errors
    ///
    /// Implementations return an error when the snapshot cannot be read;
    /// callers treat that as a fault, not as "no data".
    fn latest(&self) -> Result<SensorSnapshot, TankError>;

    /// Time since the last successful publish.
    fn age(&self) -> Duration;
}
