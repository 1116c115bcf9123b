//! [`HardwareRig`]: resolves every hardware backend exactly once at startup.
//!
//! Probing never fails.  Each component that cannot reach its physical
//! device falls back to the matching stand-in from [`crate::sim`], and the
//! choice is logged once here so nothing downstream has to re-check.

use tankos_types::Backend;
use tracing::{info, warn};

use crate::camera::{Camera, CameraConfig};
use crate::ffmpeg::FfmpegCamera;
use crate::motor::{MotorPins, PinBank};
use crate::sensor::{DistanceSensor, InertialSensor};
use crate::sim::{SimCamera, SimDistanceSensor, SimImu, SimPinBank};

/// The three range finders and the IMU polled by the sensor aggregator.
pub struct SensorRig {
    pub front: Box<dyn DistanceSensor>,
    pub left: Box<dyn DistanceSensor>,
    pub right: Box<dyn DistanceSensor>,
    pub imu: Box<dyn InertialSensor>,
}

impl SensorRig {
    /// Simulated range finders and IMU.
    pub fn simulated() -> Self {
        Self {
            front: SimDistanceSensor::new("front"),
            left: SimDistanceSensor::new("left"),
            right: SimDistanceSensor::new("right"),
            imu: SimImu::new("imu"),
        }
    }
}

/// Every hardware handle the runtime needs, with backends already chosen.
pub struct HardwareRig {
    pub sensors: SensorRig,
    pub pins: Box<dyn PinBank>,
    pub camera: Box<dyn Camera>,
}

/// Which backend each component ended up with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RigSummary {
    pub sensors: Backend,
    pub motor: Backend,
    pub camera: Backend,
}

impl HardwareRig {
    /// Probe the host for the camera device and GPIO, falling back to
    /// simulated components for anything missing.
    pub fn probe(camera: &CameraConfig, pins: &MotorPins) -> Self {
        // Range finder and IMU drivers are not wired up yet; the stand-ins
        // keep the aggregator and watchdog running on any host.
        let sensors = SensorRig::simulated();
        info!(backend = %Backend::Stub, "sensor readers initialised");

        let rig = Self {
            sensors,
            pins: probe_pins(pins),
            camera: probe_camera(camera),
        };
        let summary = rig.summary();
        info!(
            sensors = %summary.sensors,
            motor = %summary.motor,
            camera = %summary.camera,
            "hardware backends resolved"
        );
        rig
    }

    /// An all-simulated rig, sized like `camera`.
    pub fn simulated(camera: &CameraConfig) -> Self {
        Self {
            sensors: SensorRig::simulated(),
            pins: Box::new(SimPinBank::new()),
            camera: SimCamera::new("sim_camera", camera.width, camera.height, camera.framerate),
        }
    }

    pub fn summary(&self) -> RigSummary {
        RigSummary {
            sensors: self.sensors.front.backend(),
            motor: self.pins.backend(),
            camera: self.camera.backend(),
        }
    }
}

#[cfg(feature = "rpi")]
fn probe_pins(pins: &MotorPins) -> Box<dyn PinBank> {
    match crate::gpio::GpioPinBank::open(&pins.all()) {
        Ok(bank) => Box::new(bank),
        Err(e) => {
            warn!(error = %e, "GPIO unavailable, motor commands will only be logged");
            Box::new(SimPinBank::new())
        }
    }
}

#[cfg(not(feature = "rpi"))]
fn probe_pins(pins: &MotorPins) -> Box<dyn PinBank> {
    warn!(pins = ?pins.all(), "built without GPIO support, motor commands will only be logged");
    Box::new(SimPinBank::new())
}

fn probe_camera(config: &CameraConfig) -> Box<dyn Camera> {
    match FfmpegCamera::open(config) {
        Ok(camera) => Box::new(camera),
        Err(e) => {
            warn!(error = %e, "camera unavailable, using simulated frames");
            SimCamera::new("sim_camera", config.width, config.height, config.framerate)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_without_camera_device_falls_back_to_stub() {
        let cfg = CameraConfig {
            device: "/dev/no-such-video-device".to_string(),
            width: 32,
            height: 24,
            framerate: 0,
        };
        let mut rig = HardwareRig::probe(&cfg, &MotorPins::default());
        let summary = rig.summary();
        assert_eq!(summary.camera, Backend::Stub);
        assert_eq!(summary.sensors, Backend::Stub);
        let frame = rig.camera.capture().unwrap();
        assert_eq!((frame.width, frame.height), (32, 24));
    }

    #[test]
    fn simulated_rig_is_all_stub() {
        let mut rig = HardwareRig::simulated(&CameraConfig {
            framerate: 0,
            width: 16,
            height: 16,
            ..CameraConfig::default()
        });
        assert_eq!(
            rig.summary(),
            RigSummary {
                sensors: Backend::Stub,
                motor: Backend::Stub,
                camera: Backend::Stub,
            }
        );
        assert!(rig.sensors.front.measure().unwrap().ready().is_some());
        assert!(rig.sensors.imu.sample().unwrap().ready().is_some());
    }
}
