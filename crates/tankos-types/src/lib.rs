use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which implementation backs a hardware-facing component.
///
/// Resolved once when the component is constructed and carried as a field,
/// so upper layers never need to ask "is the hardware there?" per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// A physical driver is attached.
    Real,
    /// Hardware is absent; a simulated or logging-only stand-in is used.
    Stub,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Real => write!(f, "real"),
            Backend::Stub => write!(f, "stub"),
        }
    }
}

/// Discrete drive command accepted by the motor actuator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MotorCommand {
    Forward,
    Backward,
    Left,
    Right,
    Stop,
}

impl MotorCommand {
    /// Every command, in a stable order.
    pub const ALL: [MotorCommand; 5] = [
        MotorCommand::Forward,
        MotorCommand::Backward,
        MotorCommand::Left,
        MotorCommand::Right,
        MotorCommand::Stop,
    ];

    /// Wire token used by the control surface (`"forward"`, `"stop"`, …).
    pub fn as_str(self) -> &'static str {
        match self {
            MotorCommand::Forward => "forward",
            MotorCommand::Backward => "backward",
            MotorCommand::Left => "left",
            MotorCommand::Right => "right",
            MotorCommand::Stop => "stop",
        }
    }

    /// `true` for every command except [`MotorCommand::Stop`].
    pub fn is_directional(self) -> bool {
        self != MotorCommand::Stop
    }
}

impl fmt::Display for MotorCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MotorCommand {
    type Err = TankError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MotorCommand::ALL
            .into_iter()
            .find(|cmd| cmd.as_str() == s)
            .ok_or_else(|| TankError::InvalidCommand(s.to_string()))
    }
}

/// The command most recently applied to the drive pins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotorState {
    pub current_command: MotorCommand,
    pub issued_at: Instant,
}

impl MotorState {
    /// A stopped drive, stamped now.
    pub fn stopped() -> Self {
        Self {
            current_command: MotorCommand::Stop,
            issued_at: Instant::now(),
        }
    }
}

/// Sensor state at one instant.
///
/// A field is `None` when its reader was not ready or faulted on the tick
/// that produced the snapshot; it is never filled with a placeholder number.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorSnapshot {
    /// Front distance in centimetres.
    pub front_distance: Option<f32>,
    /// Left distance in centimetres.
    pub left_distance: Option<f32>,
    /// Right distance in centimetres.
    pub right_distance: Option<f32>,
    /// IMU die temperature in °C.
    pub temperature: Option<f32>,
    /// Forward/backward tilt in degrees.
    pub pitch: Option<f32>,
    /// Left/right tilt in degrees.
    pub roll: Option<f32>,
    /// Heading in degrees. Accelerometer-only IMUs report `0.0`.
    pub yaw: Option<f32>,
    pub captured_at: Instant,
}

impl SensorSnapshot {
    /// A snapshot with every reading absent.
    pub fn empty(captured_at: Instant) -> Self {
        Self {
            front_distance: None,
            left_distance: None,
            right_distance: None,
            temperature: None,
            pitch: None,
            roll: None,
            yaw: None,
            captured_at,
        }
    }
}

/// Workspace-wide error type.
#[derive(Error, Debug)]
pub enum TankError {
    #[error("Hardware Fault on {component}: {details}")]
    HardwareFault { component: String, details: String },

    #[error("Sensor {sensor} fault: {details}")]
    SensorFault { sensor: String, details: String },

    #[error("Camera error: {0}")]
    Camera(String),

    #[error("Vision pipeline error: {0}")]
    Vision(String),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to start component {component}: {details}")]
    Spawn { component: String, details: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn motor_command_parses_every_wire_token() {
        for cmd in MotorCommand::ALL {
            assert_eq!(cmd.as_str().parse::<MotorCommand>().unwrap(), cmd);
        }
    }

    #[test]
    fn motor_command_rejects_unknown_token() {
        let err = "diagonal".parse::<MotorCommand>().unwrap_err();
        assert!(matches!(err, TankError::InvalidCommand(ref s) if s == "diagonal"));
        // Tokens are case-sensitive on the wire.
        assert!("Forward".parse::<MotorCommand>().is_err());
    }

    #[test]
    fn motor_command_serializes_lowercase() {
        let json = serde_json::to_string(&MotorCommand::Backward).unwrap();
        assert_eq!(json, "\"backward\"");
    }

    #[test]
    fn only_stop_is_not_directional() {
        assert!(!MotorCommand::Stop.is_directional());
        assert!(MotorCommand::Left.is_directional());
    }

    #[test]
    fn empty_snapshot_has_no_readings() {
        let snap = SensorSnapshot::empty(Instant::now());
        assert!(snap.front_distance.is_none());
        assert!(snap.temperature.is_none());
        assert!(snap.pitch.is_none());
    }

    #[test]
    fn tank_error_display() {
        let err = TankError::HardwareFault {
            component: "left_motor".to_string(),
            details: "gpio busy".to_string(),
        };
        assert!(err.to_string().contains("left_motor"));
        assert_eq!(Backend::Stub.to_string(), "stub");
    }
}
