//! [`CaptureLoop`] – camera → vision pipeline → frame slot.
//!
//! Owns the camera and the pipeline on one thread.  Each step captures a
//! frame, reads the current front distance from telemetry, analyses the
//! frame and publishes the JPEG with a single swap into
//! [`VisionOutputs::frames`].  Decoded QR payloads go to a separate slot
//! that is only ever overwritten, never cleared.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use tankos_hal::Camera;
use tankos_kernel::TelemetrySource;
use tankos_middleware::{ComponentHandle, StopSignal, spawn_component};
use tankos_perception::{DetectionResult, VisionOutputs, VisionPipeline};
use tankos_types::TankError;
use tracing::{debug, error, info, warn};

/// Pause before retrying after a failed capture or analysis.
pub const RETRY_DELAY: Duration = Duration::from_millis(100);
/// Pause between two successful frames.
pub const FRAME_YIELD: Duration = Duration::from_millis(10);
/// Only every Nth consecutive failure is logged.
const FAILURE_LOG_EVERY: u64 = 50;

pub struct CaptureLoop {
    camera: Box<dyn Camera>,
    pipeline: VisionPipeline,
    telemetry: Arc<dyn TelemetrySource>,
    outputs: VisionOutputs,
}

impl CaptureLoop {
    pub fn new(
        camera: Box<dyn Camera>,
        pipeline: VisionPipeline,
        telemetry: Arc<dyn TelemetrySource>,
        outputs: VisionOutputs,
    ) -> Self {
        Self {
            camera,
            pipeline,
            telemetry,
            outputs,
        }
    }

    pub fn outputs(&self) -> &VisionOutputs {
        &self.outputs
    }

    /// Capture, analyse and publish one frame.
    ///
    /// Telemetry being unavailable is not an error here; the frame is
    /// simply annotated without a distance readout.
    ///
    /// # Errors
    ///
    /// Returns the camera's [`TankError::Camera`] or the pipeline's
    /// [`TankError::Vision`]; nothing is published in that case.
    pub fn step(&mut self) -> Result<DetectionResult, TankError> {
        let frame = self.camera.capture()?;
        let front = match self.telemetry.latest() {
            Ok(snapshot) => snapshot.front_distance,
            Err(e) => {
                debug!(error = %e, "no telemetry for overlay");
                None
            }
        };
        let (annotated, detection) = self.pipeline.analyze(&frame, front)?;
        if let Some(payload) = &detection.qr_data {
            self.outputs.last_qr.publish(payload.clone());
        }
        self.outputs.frames.publish(annotated);
        Ok(detection)
    }

    /// Start the capture loop on its own thread.
    ///
    /// # Errors
    ///
    /// Returns [`TankError::Spawn`] if the thread cannot be created.
    pub fn spawn(self, stop: StopSignal) -> Result<ComponentHandle, TankError> {
        spawn_component("vision-capture", move || self.run(&stop))
    }

    fn run(mut self, stop: &StopSignal) {
        info!(camera = self.camera.id(), backend = %self.camera.backend(), "capture loop started");
        let mut failures: u64 = 0;
        while !stop.is_stop_requested() {
            let pause = match panic::catch_unwind(AssertUnwindSafe(|| self.step())) {
                Ok(Ok(_)) => {
                    if failures > 0 {
                        info!(failures, "capture recovered");
                        failures = 0;
                    }
                    FRAME_YIELD
                }
                Ok(Err(e)) => {
                    failures += 1;
                    if failures == 1 || failures % FAILURE_LOG_EVERY == 0 {
                        warn!(error = %e, failures, "frame capture failed, retrying");
                    }
                    RETRY_DELAY
                }
                Err(_) => {
                    failures += 1;
                    error!("capture step panicked");
                    RETRY_DELAY
                }
            };
            if stop.wait(pause) {
                break;
            }
        }
        info!("capture loop stopped");
    }
}
