//! Simulated hardware for running the tank without a Raspberry Pi.
//!
//! Every stand-in reports [`Backend::Stub`] and always succeeds, producing
//! plausible values so the whole stack (watchdog, vision, operator page) can
//! be exercised on a laptop or in CI.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tankos_types::{Backend, TankError};
use tracing::trace;

use crate::camera::{Camera, CameraFrame};
use crate::motor::{Level, PinBank};
use crate::sensor::{DistanceSensor, ImuSample, InertialSensor, Reading};

/// Standard gravity, reported on the z axis by a level IMU.
pub const GRAVITY: f32 = 9.81;

// ────────────────────────────────────────────────────────────────────────────
// Distance
// ────────────────────────────────────────────────────────────────────────────

/// Range finder returning uniformly random distances in `[60, 200)` cm.
pub struct SimDistanceSensor {
    id: String,
    rng: StdRng,
}

impl SimDistanceSensor {
    pub const MIN_CM: f32 = 60.0;
    pub const MAX_CM: f32 = 200.0;

    pub fn new(id: impl Into<String>) -> Box<Self> {
        Box::new(Self {
            id: id.into(),
            rng: StdRng::from_entropy(),
        })
    }

    /// Deterministic variant for tests.
    pub fn with_seed(id: impl Into<String>, seed: u64) -> Box<Self> {
        Box::new(Self {
            id: id.into(),
            rng: StdRng::seed_from_u64(seed),
        })
    }
}

impl DistanceSensor for SimDistanceSensor {
    fn id(&self) -> &str {
        &self.id
    }

    fn backend(&self) -> Backend {
        Backend::Stub
    }

    fn measure(&mut self) -> Result<Reading<f32>, TankError> {
        Ok(Reading::Ready(
            self.rng.gen_range(Self::MIN_CM..Self::MAX_CM),
        ))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// IMU
// ────────────────────────────────────────────────────────────────────────────

/// A level, stationary IMU with a little sensor noise.
pub struct SimImu {
    id: String,
    rng: StdRng,
}

impl SimImu {
    pub fn new(id: impl Into<String>) -> Box<Self> {
        Box::new(Self {
            id: id.into(),
            rng: StdRng::from_entropy(),
        })
    }
}

impl InertialSensor for SimImu {
    fn id(&self) -> &str {
        &self.id
    }

    fn backend(&self) -> Backend {
        Backend::Stub
    }

    fn sample(&mut self) -> Result<Reading<ImuSample>, TankError> {
        let mut noise = |amp: f32| self.rng.gen_range(-amp..amp);
        Ok(Reading::Ready(ImuSample {
            accel: [noise(0.05), noise(0.05), GRAVITY + noise(0.05)],
            gyro: [noise(0.01), noise(0.01), noise(0.01)],
            temperature: Some(25.0 + noise(2.0)),
        }))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Camera
// ────────────────────────────────────────────────────────────────────────────

/// Synthetic camera: a grey gradient with a bright square sweeping across.
///
/// Captures are paced to `framerate` like a real device would be; a
/// framerate of `0` disables pacing.
pub struct SimCamera {
    id: String,
    width: u32,
    height: u32,
    interval: Option<Duration>,
    next_due: Option<Instant>,
    frame_index: u64,
}

impl SimCamera {
    pub fn new(id: impl Into<String>, width: u32, height: u32, framerate: u32) -> Box<Self> {
        Box::new(Self {
            id: id.into(),
            width: width.max(1),
            height: height.max(1),
            interval: (framerate > 0).then(|| Duration::from_secs(1) / framerate),
            next_due: None,
            frame_index: 0,
        })
    }

    fn render(&self) -> Vec<u8> {
        let (w, h) = (self.width as usize, self.height as usize);
        let side = (h / 4).max(1);
        let x0 = (self.frame_index as usize * 4) % w;
        let y0 = (h - side) / 2;
        let mut data = Vec::with_capacity(CameraFrame::rgb_len(self.width, self.height));
        for y in 0..h {
            for x in 0..w {
                let in_square = (x0..x0 + side).contains(&x) && (y0..y0 + side).contains(&y);
                if in_square {
                    data.extend_from_slice(&[240, 240, 240]);
                } else {
                    let shade = (x * 160 / w) as u8 + 40;
                    data.extend_from_slice(&[shade / 2, shade, shade / 2]);
                }
            }
        }
        data
    }
}

impl Camera for SimCamera {
    fn id(&self) -> &str {
        &self.id
    }

    fn backend(&self) -> Backend {
        Backend::Stub
    }

    fn capture(&mut self) -> Result<CameraFrame, TankError> {
        if let Some(interval) = self.interval {
            let now = Instant::now();
            let due = self.next_due.unwrap_or(now);
            if due > now {
                thread::sleep(due - now);
            }
            self.next_due = Some(due.max(now) + interval);
        }
        let data = self.render();
        self.frame_index += 1;
        Ok(CameraFrame {
            width: self.width,
            height: self.height,
            data,
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Pin bank
// ────────────────────────────────────────────────────────────────────────────

/// Logging-only pin bank.  Levels and the write log are shared between
/// clones so a test can keep a handle while the actuator owns the bank.
#[derive(Clone, Default)]
pub struct SimPinBank {
    levels: Arc<Mutex<HashMap<u8, Level>>>,
    writes: Arc<Mutex<Vec<(u8, Level)>>>,
}

impl SimPinBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last level written to `pin`, if any.
    pub fn level(&self, pin: u8) -> Option<Level> {
        self.levels.lock().get(&pin).copied()
    }

    /// Every write so far, in order.
    pub fn writes(&self) -> Vec<(u8, Level)> {
        self.writes.lock().clone()
    }

    pub fn clear_writes(&self) {
        self.writes.lock().clear();
    }
}

impl PinBank for SimPinBank {
    fn backend(&self) -> Backend {
        Backend::Stub
    }

    fn write(&mut self, pin: u8, level: Level) -> Result<(), TankError> {
        trace!(pin, ?level, "sim gpio write");
        self.levels.lock().insert(pin, level);
        self.writes.lock().push((pin, level));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sim_distance_stays_in_range() {
        let mut sensor = SimDistanceSensor::with_seed("front", 7);
        assert_eq!(sensor.backend(), Backend::Stub);
        for _ in 0..500 {
            let d = sensor.measure().unwrap().ready().unwrap();
            assert!((SimDistanceSensor::MIN_CM..SimDistanceSensor::MAX_CM).contains(&d));
        }
    }

    #[test]
    fn sim_imu_reports_gravity_on_z() {
        let mut imu = SimImu::new("imu");
        let sample = imu.sample().unwrap().ready().unwrap();
        assert!((sample.accel[2] - GRAVITY).abs() < 0.1);
        assert!(sample.accel[0].abs() < 0.1);
        let temp = sample.temperature.unwrap();
        assert!((23.0..27.0).contains(&temp));
    }

    #[test]
    fn sim_camera_produces_well_formed_moving_frames() {
        let mut cam = SimCamera::new("sim", 64, 48, 0);
        let a = cam.capture().unwrap();
        let b = cam.capture().unwrap();
        assert!(a.is_well_formed());
        assert!(b.is_well_formed());
        assert_ne!(a.data, b.data);
    }

    #[test]
    fn sim_camera_paces_to_framerate() {
        let mut cam = SimCamera::new("sim", 8, 8, 50);
        let start = Instant::now();
        for _ in 0..3 {
            cam.capture().unwrap();
        }
        // First frame is immediate, the next two wait 20 ms each.
        assert!(start.elapsed() >= Duration::from_millis(35));
    }

    #[test]
    fn sim_pin_bank_shares_state_between_clones() {
        let bank = SimPinBank::new();
        let mut owned = bank.clone();
        owned.write(13, Level::High).unwrap();
        owned.write(13, Level::Low).unwrap();
        assert_eq!(bank.level(13), Some(Level::Low));
        assert_eq!(bank.writes(), vec![(13, Level::High), (13, Level::Low)]);
        bank.clear_writes();
        assert!(bank.writes().is_empty());
        assert_eq!(bank.level(13), Some(Level::Low));
    }
}
