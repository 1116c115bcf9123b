//! `tankos-perception` – turns raw sensor and camera data into something an
//! operator can read.
//!
//! # Modules
//!
//! - [`inclination`] – pitch and roll of the chassis from the accelerometer's
//!   gravity vector.
//! - [`overlay`] – bitmap-font text and simple shapes drawn straight onto an
//!   RGB frame.
//! - [`vision`] – [`VisionPipeline`]: QR decoding, distance/obstacle overlay,
//!   edge thumbnail, and JPEG encoding of each camera frame.

pub mod inclination;
pub mod overlay;
pub mod vision;

pub use inclination::{Attitude, attitude_from_accel};
pub use vision::{
    AnnotatedFrame, DetectionResult, NullQrDecoder, QrDecoder, QrDetection, RqrrDecoder,
    VisionConfig, VisionOutputs, VisionPipeline,
};
