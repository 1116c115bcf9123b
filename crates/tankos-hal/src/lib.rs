//! `tankos-hal` – Hardware Abstraction Layer
//!
//! Every piece of hardware the tank touches is reached through a small
//! trait, so the rest of the system never cares whether a physical driver or
//! a simulated stand-in sits underneath.
//!
//! # Modules
//!
//! - [`sensor`] – [`DistanceSensor`] and [`InertialSensor`] reader traits.
//! - [`motor`] – [`PinBank`], the direction table, and the [`MotorActuator`]
//!   implementing the [`Drive`] contract.
//! - [`camera`] – [`Camera`] trait and [`CameraFrame`].
//! - [`ffmpeg`] – V4L2 camera read through an `ffmpeg` subprocess.
//! - [`sim`] – simulated sensors, camera, and a recording pin bank.
//! - [`registry`] – [`HardwareRig::probe`]: resolves each backend once at
//!   startup.
//! - `gpio` (feature `rpi`) – BCM GPIO pin bank built on `rppal`.

pub mod camera;
pub mod ffmpeg;
#[cfg(feature = "rpi")]
pub mod gpio;
pub mod motor;
pub mod registry;
pub mod sensor;
pub mod sim;

pub use camera::{Camera, CameraConfig, CameraFrame};
pub use motor::{Drive, Level, MotorActuator, MotorPins, PinBank, SidePins};
pub use registry::{HardwareRig, RigSummary, SensorRig};
pub use sensor::{DistanceSensor, ImuSample, InertialSensor, Reading};
