//! Chassis inclination from a static accelerometer reading.
//!
//! With the tank at rest the accelerometer measures only gravity, so tilt
//! follows from the direction of that vector:
//!
//! ```text
//! pitch = atan2(ax, sqrt(ay² + az²))
//! roll  = atan2(ay, sqrt(ax² + az²))
//! ```
//!
//! Heading cannot be observed from gravity alone; `yaw` is reported as `0.0`
//! until a magnetometer or gyro integration is added.
//!
//! # Example
//!
//! ```rust
//! use tankos_perception::attitude_from_accel;
//!
//! let level = attitude_from_accel([0.0, 0.0, 9.81]);
//! assert!(level.pitch.abs() < 1e-4);
//! assert!(level.roll.abs() < 1e-4);
//! ```

/// Chassis orientation in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Attitude {
    /// Nose up/down.
    pub pitch: f32,
    /// Left/right lean.
    pub roll: f32,
    pub yaw: f32,
}

/// Compute pitch and roll from an accelerometer sample in m/s².
pub fn attitude_from_accel(accel: [f32; 3]) -> Attitude {
    let [x, y, z] = accel;
    Attitude {
        pitch: x.atan2((y * y + z * z).sqrt()).to_degrees(),
        roll: y.atan2((x * x + z * z).sqrt()).to_degrees(),
        yaw: 0.0,
    }
}
