//! `tankos-cockpit` – the operator's HTTP gateway
//!
//! Serves everything a browser needs to drive the tank (default bind
//! `0.0.0.0:5000`):
//!
//! | Route | Handler |
//! |---|---|
//! | `GET /` | embedded control page |
//! | `GET /video_feed` | MJPEG stream of annotated frames ([`stream`]) |
//! | `GET /api/sensors` | latest sensor snapshot and QR payload ([`api`]) |
//! | `POST /api/control` | one drive command ([`api`]) |
//!
//! The server runs a multi-threaded Tokio runtime on its own OS thread so
//! the periodic sensor, vision and safety loops never share an executor
//! with request handling.
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tankos_cockpit::{GatewayConfig, GatewayServer};
//! use tankos_hal::{sim::SimPinBank, Drive, MotorActuator, MotorPins, SensorRig};
//! use tankos_kernel::{SensorAggregator, SensorsConfig};
//! use tankos_middleware::StopSignal;
//! use tankos_perception::VisionOutputs;
//!
//! let stop = StopSignal::new();
//! let telemetry = Arc::new(SensorAggregator::new(SensorRig::simulated(), SensorsConfig::default()));
//! let drive: Arc<dyn Drive> =
//!     Arc::new(MotorActuator::new(MotorPins::default(), Box::new(SimPinBank::new())));
//! let (handle, addr) = GatewayServer::new(
//!     GatewayConfig::default(),
//!     telemetry,
//!     VisionOutputs::new(),
//!     Some(drive),
//!     stop.clone(),
//! )
//! .spawn()
//! .unwrap();
//! println!("open http://{addr}/");
//! stop.request_stop();
//! handle.join_timeout(std::time::Duration::from_secs(2));
//! ```

pub mod api;
pub mod server;
pub mod stream;

#[cfg(test)]
mod test_support;

pub use server::{DEFAULT_PORT, GatewayConfig, GatewayServer, GatewayState};
