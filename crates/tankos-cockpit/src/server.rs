//! [`GatewayServer`] – axum router, shared state, and the server thread.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::{Html, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use tankos_hal::Drive;
use tankos_kernel::TelemetrySource;
use tankos_middleware::{ComponentHandle, StopSignal, spawn_component};
use tankos_perception::VisionOutputs;
use tankos_types::TankError;
use tracing::{Instrument, error, info, info_span};
use uuid::Uuid;

use crate::{api, stream};

/// Default TCP port for the gateway.
pub const DEFAULT_PORT: u16 = 5000;

/// The compiled-in operator page.
const COCKPIT_HTML: &str = include_str!("cockpit.html");

/// How often the shutdown watcher checks the stop signal.
const STOP_POLL: Duration = Duration::from_millis(50);

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// `[gateway]` section of the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    /// Minimum spacing between two parts sent to one stream client.
    pub frame_interval_ms: u64,
    /// How long a stream client sleeps when no new frame is available.
    pub poll_interval_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            frame_interval_ms: 33,
            poll_interval_ms: 50,
        }
    }
}

impl GatewayConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn timing(&self) -> stream::StreamTiming {
        stream::StreamTiming {
            frame_interval: Duration::from_millis(self.frame_interval_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        }
    }
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Everything a handler can reach.  Cloned per request; every field is a
/// cheap handle.
#[derive(Clone)]
pub struct GatewayState {
    pub telemetry: Arc<dyn TelemetrySource>,
    pub vision: VisionOutputs,
    /// `None` when no drive is wired in; control requests then get 503.
    pub motor: Option<Arc<dyn Drive>>,
    pub stop: StopSignal,
    pub timing: stream::StreamTiming,
}

/// Build the gateway's routes over `state`.
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/video_feed", get(stream::video_feed))
        .route("/api/sensors", get(api::sensors))
        .route("/api/control", post(api::control))
        .layer(middleware::from_fn(request_span))
        .with_state(state)
}

async fn index() -> Html<&'static str> {
    Html(COCKPIT_HTML)
}

// Every request runs inside a span carrying a fresh client id.
async fn request_span(req: Request, next: Next) -> Response {
    let span = info_span!(
        "http",
        client = %Uuid::new_v4(),
        method = %req.method(),
        path = %req.uri().path(),
    );
    next.run(req).instrument(span).await
}

// ---------------------------------------------------------------------------
// GatewayServer
// ---------------------------------------------------------------------------

pub struct GatewayServer {
    config: GatewayConfig,
    state: GatewayState,
}

impl GatewayServer {
    pub fn new(
        config: GatewayConfig,
        telemetry: Arc<dyn TelemetrySource>,
        vision: VisionOutputs,
        motor: Option<Arc<dyn Drive>>,
        stop: StopSignal,
    ) -> Self {
        let state = GatewayState {
            telemetry,
            vision,
            motor,
            stop,
            timing: config.timing(),
        };
        Self { config, state }
    }

    /// Override the listening port (builder-style).
    pub fn with_port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn port(&self) -> u16 {
        self.config.port
    }

    pub fn router(&self) -> Router {
        router(self.state.clone())
    }

    /// Bind the listener and serve on a dedicated thread until the stop
    /// signal is raised.
    ///
    /// Binding happens on the calling thread so an occupied port is
    /// reported here rather than from inside the server thread.
    ///
    /// # Errors
    ///
    /// Returns [`TankError::Spawn`] if the address cannot be bound or the
    /// thread cannot be created.
    pub fn spawn(self) -> Result<(ComponentHandle, SocketAddr), TankError> {
        let addr = self.config.bind_addr();
        let bind_error = |e: std::io::Error| TankError::Spawn {
            component: "gateway".to_string(),
            details: format!("cannot bind {addr}: {e}"),
        };
        let listener = std::net::TcpListener::bind(&addr).map_err(bind_error)?;
        listener.set_nonblocking(true)?;
        let local = listener.local_addr()?;

        let app = self.router();
        let stop = self.state.stop.clone();
        let handle = spawn_component("gateway", move || serve(listener, local, app, stop))?;
        Ok((handle, local))
    }
}

fn serve(listener: std::net::TcpListener, local: SocketAddr, app: Router, stop: StopSignal) {
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("gateway-worker")
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to build gateway runtime");
            return;
        }
    };

    runtime.block_on(async move {
        let listener = match tokio::net::TcpListener::from_std(listener) {
            Ok(l) => l,
            Err(e) => {
                error!(error = %e, "failed to register gateway listener");
                return;
            }
        };
        info!(addr = %local, "gateway listening on http://{local}/");
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(wait_for_stop(stop))
            .await
        {
            error!(error = %e, "gateway server failed");
        }
    });

    runtime.shutdown_timeout(Duration::from_millis(500));
    info!("gateway stopped");
}

async fn wait_for_stop(stop: StopSignal) {
    while !stop.is_stop_requested() {
        tokio::time::sleep(STOP_POLL).await;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FixedTelemetry, RecordingDrive, state_with};
    use axum::body::{Body, to_bytes};
    use axum::http::{Request as HttpRequest, StatusCode};
    use std::time::Instant;
    use tankos_types::SensorSnapshot;
    use tower::ServiceExt;

    #[tokio::test]
    async fn index_serves_the_control_page() {
        let state = state_with(Some(SensorSnapshot::empty(Instant::now())), None);
        let response = router(state)
            .oneshot(HttpRequest::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let html = String::from_utf8(body.to_vec()).unwrap();
        assert!(html.contains("/video_feed"));
        assert!(html.contains("/api/control"));
        assert!(html.contains("Sensors Offline"));
        assert!(html.contains("setInterval(pollSensors, 500)"));
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let state = state_with(None, None);
        let response = router(state)
            .oneshot(HttpRequest::builder().uri("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn gateway_config_defaults() {
        let cfg = GatewayConfig::default();
        assert_eq!(cfg.bind_addr(), "0.0.0.0:5000");
        assert_eq!(cfg.timing().frame_interval, Duration::from_millis(33));
        assert_eq!(cfg.timing().poll_interval, Duration::from_millis(50));
    }

    #[test]
    fn spawned_server_answers_and_stops() {
        use std::io::{Read, Write};

        let stop = StopSignal::new();
        let drive: Arc<dyn Drive> = Arc::new(RecordingDrive::default());
        let config = GatewayConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            ..GatewayConfig::default()
        };
        let server = GatewayServer::new(
            config,
            Arc::new(FixedTelemetry {
                snapshot: Some(SensorSnapshot::empty(Instant::now())),
            }),
            VisionOutputs::new(),
            Some(drive),
            stop.clone(),
        );
        let (handle, addr) = server.spawn().unwrap();

        let mut conn = std::net::TcpStream::connect(addr).unwrap();
        conn.write_all(b"GET /api/sensors HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .unwrap();
        let mut response = String::new();
        conn.read_to_string(&mut response).unwrap();
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains("\"front_distance\":null"));

        stop.request_stop();
        assert!(handle.join_timeout(Duration::from_secs(5)));
    }

    #[test]
    fn occupied_port_fails_at_spawn() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = taken.local_addr().unwrap().port();
        let server = GatewayServer::new(
            GatewayConfig {
                host: "127.0.0.1".to_string(),
                ..GatewayConfig::default()
            },
            Arc::new(FixedTelemetry { snapshot: None }),
            VisionOutputs::new(),
            None,
            StopSignal::new(),
        )
        .with_port(port);
        assert_eq!(server.port(), port);
        assert!(matches!(server.spawn(), Err(TankError::Spawn { .. })));
    }
}
