//! Reader traits for the tank's distance and inertial sensors.
//!
//! A reader produces one measurement per call.  "Not ready yet" is an
//! ordinary outcome ([`Reading::NotReady`]), distinct from a hard fault
//! (`Err`).  Callers decide how to degrade; the aggregator treats both as an
//! absent reading for that tick.

use tankos_types::{Backend, TankError};

/// Result of polling a reader once.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading<T> {
    /// A fresh measurement.
    Ready(T),
    /// The device has no new data this time round.
    NotReady,
}

impl<T> Reading<T> {
    /// Convert into `Some(value)` for [`Reading::Ready`].
    pub fn ready(self) -> Option<T> {
        match self {
            Reading::Ready(v) => Some(v),
            Reading::NotReady => None,
        }
    }
}

/// A time-of-flight style range finder.
pub trait DistanceSensor: Send {
    /// Stable identifier, e.g. `"front"`.
    fn id(&self) -> &str;

    /// Which backend this reader was constructed with.
    fn backend(&self) -> Backend;

    /// Poll the device once and return the distance in centimetres.
    ///
    /// # Errors
    ///
    /// Returns [`TankError::SensorFault`] when the bus transaction fails.
    fn measure(&mut self) -> Result<Reading<f32>, TankError>;
}

/// One accelerometer/gyroscope sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImuSample {
    /// Linear acceleration (x, y, z) in m/s².
    pub accel: [f32; 3],
    /// Angular velocity (x, y, z) in rad/s.
    pub gyro: [f32; 3],
    /// Die temperature in °C, when the device exposes it.
    pub temperature: Option<f32>,
}

/// An accelerometer + gyroscope unit.
pub trait InertialSensor: Send {
    fn id(&self) -> &str;

    fn backend(&self) -> Backend;

    /// Poll the device once.
    ///
    /// # Errors
    ///
    /// Returns [`TankError::SensorFault`] when the bus transaction fails.
    fn sample(&mut self) -> Result<Reading<ImuSample>, TankError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlternatingSensor {
        calls: u32,
    }

    impl DistanceSensor for AlternatingSensor {
        fn id(&self) -> &str {
            "alternating"
        }

        fn backend(&self) -> Backend {
            Backend::Stub
        }

        fn measure(&mut self) -> Result<Reading<f32>, TankError> {
            self.calls += 1;
            if self.calls % 2 == 0 {
                Ok(Reading::NotReady)
            } else {
                Ok(Reading::Ready(self.calls as f32))
            }
        }
    }

    #[test]
    fn reading_ready_converts_to_option() {
        assert_eq!(Reading::Ready(3.5_f32).ready(), Some(3.5));
        assert_eq!(Reading::<f32>::NotReady.ready(), None);
    }

    #[test]
    fn mock_sensor_reports_not_ready_between_samples() {
        let mut sensor = AlternatingSensor { calls: 0 };
        assert_eq!(sensor.id(), "alternating");
        assert_eq!(sensor.measure().unwrap(), Reading::Ready(1.0));
        assert_eq!(sensor.measure().unwrap(), Reading::NotReady);
        assert_eq!(sensor.measure().unwrap(), Reading::Ready(3.0));
    }
}
