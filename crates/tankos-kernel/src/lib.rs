//! `tankos-kernel` – telemetry and safety
//!
//! Owns the two loops that decide whether the tank may keep moving.
//!
//! # Modules
//!
//! - [`source`] – [`TelemetrySource`]: read side of the sensor telemetry,
//!   shared by the watchdog, the capture loop and the gateway.
//! - [`aggregator`] – [`SensorAggregator`]: polls every sensor reader on a
//!   fixed period and publishes one [`SensorSnapshot`][tankos_types::SensorSnapshot]
//!   per tick.
//! - [`safety`] – [`SafetyState`]: the two stop triggers evaluated from a
//!   snapshot's age and front distance.
//! - [`watchdog`] – [`SafetyWatchdog`]: re-evaluates [`SafetyState`] every
//!   tick and stops the drive when either trigger fires.

pub mod aggregator;
pub mod safety;
pub mod source;
pub mod watchdog;

pub use aggregator::{SensorAggregator, SensorsConfig};
pub use safety::{SafetyConfig, SafetyState};
pub use source::TelemetrySource;
pub use watchdog::SafetyWatchdog;
