//! `tankos-runtime` – wiring and lifecycle
//!
//! Turns a probed [`HardwareRig`][tankos_hal::HardwareRig] into a running
//! tank and takes it down again.
//!
//! # Modules
//!
//! - [`capture`] – [`CaptureLoop`][capture::CaptureLoop]: pulls camera
//!   frames, runs them through the
//!   [`VisionPipeline`][tankos_perception::VisionPipeline] and publishes the
//!   annotated result for the gateway.
//! - [`orchestrator`] – [`Orchestrator`][orchestrator::Orchestrator]: starts
//!   the aggregator, watchdog, capture loop and gateway in dependency order,
//!   and shuts them down cooperatively with bounded joins.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]:
//!   initialises the global `tracing` subscriber with an optional OTLP span
//!   exporter.  Set `OTEL_EXPORTER_OTLP_ENDPOINT` to enable trace export.

pub mod capture;
pub mod orchestrator;
pub mod telemetry;

pub use capture::CaptureLoop;
pub use orchestrator::{Orchestrator, OrchestratorConfig, ShutdownConfig, ShutdownReport};
pub use telemetry::{TracerProviderGuard, init_tracing};
