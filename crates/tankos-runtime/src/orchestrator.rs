//! [`Orchestrator`] – starts every component and shuts them down together.
//!
//! Startup order follows the data flow: motor actuator (which stops the
//! motors as it is built), sensor aggregator, safety watchdog, capture
//! loop, then the gateway.  If any step fails, everything already running
//! is shut down before the error is returned.
//!
//! Shutdown is cooperative: raise the shared [`StopSignal`], stop the
//! motors, give the loops a short grace period, then join each component
//! with a bounded timeout.  Components that miss the deadline are detached
//! and named in the [`ShutdownReport`].

use std::mem;
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tankos_cockpit::{GatewayConfig, GatewayServer};
use tankos_hal::{Camera, CameraConfig, Drive, HardwareRig, MotorActuator, MotorPins, RigSummary};
use tankos_kernel::{SafetyConfig, SafetyWatchdog, SensorAggregator, SensorsConfig, TelemetrySource};
use tankos_middleware::{ComponentHandle, StopSignal};
use tankos_perception::{VisionConfig, VisionOutputs, VisionPipeline};
use tankos_types::TankError;
use tracing::{error, info, warn};

use crate::capture::CaptureLoop;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// `[shutdown]` section of the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Pause between raising the stop signal and joining components.
    pub grace_ms: u64,
    /// Per-component join deadline.
    pub join_timeout_ms: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace_ms: 500,
            join_timeout_ms: 2000,
        }
    }
}

/// The whole configuration file, one field per section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub sensors: SensorsConfig,
    pub safety: SafetyConfig,
    pub vision: VisionConfig,
    pub camera: CameraConfig,
    pub gateway: GatewayConfig,
    pub motor: MotorPins,
    pub shutdown: ShutdownConfig,
}

// ─────────────────────────────────────────────────────────────────────────────
// Shutdown report
// ─────────────────────────────────────────────────────────────────────────────

/// Outcome of [`Orchestrator::shutdown`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Components that exited within their join deadline.
    pub stopped: Vec<String>,
    /// Components that were still running and got detached.
    pub timed_out: Vec<String>,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.timed_out.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Orchestrator
// ─────────────────────────────────────────────────────────────────────────────

pub struct Orchestrator {
    config: OrchestratorConfig,
    stop: StopSignal,
    summary: RigSummary,
    motor: Arc<MotorActuator>,
    aggregator: Arc<SensorAggregator>,
    vision: VisionOutputs,
    gateway_addr: Option<SocketAddr>,
    components: Vec<ComponentHandle>,
}

impl Orchestrator {
    /// Build every component from `rig` and start their loops.
    ///
    /// # Errors
    ///
    /// Returns the first [`TankError::Spawn`] (thread creation or gateway
    /// bind failure).  Components started before the failure are stopped
    /// and joined first.
    pub fn start(config: OrchestratorConfig, rig: HardwareRig) -> Result<Self, TankError> {
        let summary = rig.summary();
        let HardwareRig { sensors, pins, camera } = rig;

        let motor = Arc::new(MotorActuator::new(config.motor, pins));
        let aggregator = Arc::new(SensorAggregator::new(sensors, config.sensors.clone()));

        let mut orchestrator = Self {
            config,
            stop: StopSignal::new(),
            summary,
            motor,
            aggregator,
            vision: VisionOutputs::new(),
            gateway_addr: None,
            components: Vec::new(),
        };

        if let Err(e) = orchestrator.start_components(camera) {
            error!(error = %e, "startup failed, stopping components already running");
            orchestrator.shutdown();
            return Err(e);
        }
        info!(
            components = orchestrator.components.len(),
            gateway = ?orchestrator.gateway_addr,
            "tank is up"
        );
        Ok(orchestrator)
    }

    fn start_components(&mut self, camera: Box<dyn Camera>) -> Result<(), TankError> {
        let telemetry: Arc<dyn TelemetrySource> = Arc::clone(&self.aggregator) as Arc<dyn TelemetrySource>;
        let drive: Arc<dyn Drive> = Arc::clone(&self.motor) as Arc<dyn Drive>;

        let handle = Arc::clone(&self.aggregator).spawn(self.stop.clone())?;
        self.components.push(handle);

        let watchdog = Arc::new(SafetyWatchdog::new(
            Arc::clone(&telemetry),
            Arc::clone(&drive),
            self.config.safety.clone(),
        ));
        self.components.push(watchdog.spawn(self.stop.clone())?);

        let pipeline = VisionPipeline::with_default_decoder(self.config.vision.clone());
        let capture = CaptureLoop::new(camera, pipeline, Arc::clone(&telemetry), self.vision.clone());
        self.components.push(capture.spawn(self.stop.clone())?);

        let gateway = GatewayServer::new(
            self.config.gateway.clone(),
            telemetry,
            self.vision.clone(),
            Some(drive),
            self.stop.clone(),
        );
        let (handle, addr) = gateway.spawn()?;
        info!(%addr, "gateway listening");
        self.gateway_addr = Some(addr);
        self.components.push(handle);
        Ok(())
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Backends resolved for this run.
    pub fn summary(&self) -> RigSummary {
        self.summary
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub fn motor(&self) -> Arc<MotorActuator> {
        Arc::clone(&self.motor)
    }

    pub fn telemetry(&self) -> Arc<SensorAggregator> {
        Arc::clone(&self.aggregator)
    }

    pub fn vision(&self) -> &VisionOutputs {
        &self.vision
    }

    /// Address the gateway actually bound (useful with port 0).
    pub fn gateway_addr(&self) -> Option<SocketAddr> {
        self.gateway_addr
    }

    /// Names of the running components, in start order.
    pub fn component_names(&self) -> Vec<&str> {
        self.components.iter().map(ComponentHandle::name).collect()
    }

    /// Stop every component and report which ones exited in time.
    pub fn shutdown(mut self) -> ShutdownReport {
        let grace = Duration::from_millis(self.config.shutdown.grace_ms);
        let join_timeout = Duration::from_millis(self.config.shutdown.join_timeout_ms);
        info!(?grace, ?join_timeout, "shutting down");

        self.stop.request_stop();
        if let Err(e) = self.motor.stop() {
            error!(error = %e, "motor stop during shutdown failed");
        }
        thread::sleep(grace);

        let mut report = ShutdownReport::default();
        for handle in mem::take(&mut self.components) {
            let name = handle.name().to_string();
            if handle.join_timeout(join_timeout) {
                report.stopped.push(name);
            } else {
                report.timed_out.push(name);
            }
        }

        // A control request may have landed during the grace period.
        if let Err(e) = self.motor.stop() {
            error!(error = %e, "final motor stop failed");
        }
        if report.is_clean() {
            info!(stopped = report.stopped.len(), "shutdown complete");
        } else {
            warn!(timed_out = ?report.timed_out, "shutdown left components running");
        }
        report
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        if !self.components.is_empty() {
            warn!("orchestrator dropped without shutdown; signalling components to stop");
        }
        self.stop.request_stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use tankos_types::{Backend, MotorCommand};

    fn test_config() -> OrchestratorConfig {
        let mut config = OrchestratorConfig::default();
        config.sensors.poll_period_ms = 20;
        config.safety.tick_ms = 20;
        config.camera.width = 64;
        config.camera.height = 48;
        config.camera.framerate = 0;
        config.gateway.host = "127.0.0.1".to_string();
        config.gateway.port = 0;
        config.shutdown.grace_ms = 20;
        config
    }

    fn wait_for(what: &str, mut done: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done() {
            assert!(Instant::now() < deadline, "timed out waiting for {what}");
            thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.shutdown.grace_ms, 500);
        assert_eq!(config.shutdown.join_timeout_ms, 2000);
        assert_eq!(config.gateway.port, 5000);
        assert_eq!(config.sensors.poll_period_ms, 500);
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let config: OrchestratorConfig = toml::from_str(
            r#"
            [gateway]
            port = 8080

            [safety]
            front_threshold_cm = 25.0
            "#,
        )
        .unwrap();
        assert_eq!(config.gateway.port, 8080);
        assert_eq!(config.gateway.host, "0.0.0.0");
        assert_eq!(config.safety.front_threshold_cm, 25.0);
        assert_eq!(config.safety.tick_ms, SafetyConfig::default().tick_ms);
        assert_eq!(config.camera, CameraConfig::default());
    }

    #[test]
    fn starts_all_components_and_shuts_down_cleanly() {
        let config = test_config();
        let rig = HardwareRig::simulated(&config.camera);
        let orchestrator = Orchestrator::start(config, rig).unwrap();

        assert_eq!(
            orchestrator.component_names(),
            vec!["sensor-aggregator", "safety-watchdog", "vision-capture", "gateway"]
        );
        assert_eq!(orchestrator.summary().motor, Backend::Stub);
        let addr = orchestrator.gateway_addr().unwrap();
        assert_ne!(addr.port(), 0);

        let telemetry = orchestrator.telemetry();
        wait_for("a sensor snapshot", || telemetry.snapshots().sequence() > 0);
        let frames = orchestrator.vision().frames.clone();
        wait_for("an annotated frame", || frames.sequence() > 0);

        let motor = orchestrator.motor();
        motor.forward().unwrap();

        let report = orchestrator.shutdown();
        assert!(report.is_clean(), "{report:?}");
        assert_eq!(report.stopped.len(), 4);
        assert_eq!(motor.state().current_command, MotorCommand::Stop);
    }

    #[test]
    fn occupied_port_fails_startup_and_stops_started_components() {
        let blocker = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let mut config = test_config();
        config.gateway.port = blocker.local_addr().unwrap().port();

        let rig = HardwareRig::simulated(&config.camera);
        let result = Orchestrator::start(config, rig);
        assert!(matches!(result, Err(TankError::Spawn { ref component, .. }) if component == "gateway"));
    }
}
