//! Test doubles shared by the handler tests.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tankos_hal::Drive;
use tankos_kernel::TelemetrySource;
use tankos_middleware::StopSignal;
use tankos_perception::VisionOutputs;
use tankos_types::{Backend, MotorCommand, MotorState, SensorSnapshot, TankError};

use crate::server::{GatewayConfig, GatewayState};

/// Returns its snapshot, or a fault when it has none.
pub struct FixedTelemetry {
    pub snapshot: Option<SensorSnapshot>,
}

impl TelemetrySource for FixedTelemetry {
    fn latest(&self) -> Result<SensorSnapshot, TankError> {
        self.snapshot.ok_or_else(|| TankError::SensorFault {
            sensor: "aggregator".to_string(),
            details: "unavailable".to_string(),
        })
    }

    fn age(&self) -> Duration {
        Duration::ZERO
    }
}

/// Records every command it is asked to execute.
#[derive(Default)]
pub struct RecordingDrive {
    pub calls: Mutex<Vec<MotorCommand>>,
    pub fail: bool,
}

impl RecordingDrive {
    pub fn calls(&self) -> Vec<MotorCommand> {
        self.calls.lock().clone()
    }
}

impl Drive for RecordingDrive {
    fn execute(&self, command: MotorCommand) -> Result<(), TankError> {
        self.calls.lock().push(command);
        if self.fail {
            return Err(TankError::HardwareFault {
                component: "gpio13".to_string(),
                details: "line busy".to_string(),
            });
        }
        Ok(())
    }

    fn state(&self) -> MotorState {
        MotorState::stopped()
    }

    fn backend(&self) -> Backend {
        Backend::Stub
    }
}

/// Gateway state with fast stream timing.
pub fn state_with(snapshot: Option<SensorSnapshot>, motor: Option<Arc<dyn Drive>>) -> GatewayState {
    GatewayState {
        telemetry: Arc::new(FixedTelemetry { snapshot }),
        vision: VisionOutputs::new(),
        motor,
        stop: StopSignal::new(),
        timing: GatewayConfig {
            frame_interval_ms: 1,
            poll_interval_ms: 2,
            ..GatewayConfig::default()
        }
        .timing(),
    }
}
