//! JSON endpoints: `/api/sensors` and `/api/control`.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tankos_types::{MotorCommand, SensorSnapshot};
use tracing::{error, info, warn};

use crate::server::GatewayState;

/// Body of a successful `GET /api/sensors`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorsResponse {
    pub front_distance: Option<f32>,
    pub left_distance: Option<f32>,
    pub right_distance: Option<f32>,
    pub temperature: Option<f32>,
    pub pitch: Option<f32>,
    pub roll: Option<f32>,
    pub yaw: Option<f32>,
    pub qr_data: Option<String>,
}

fn one_decimal(value: Option<f32>) -> Option<f32> {
    value.map(|v| (v * 10.0).round() / 10.0)
}

impl SensorsResponse {
    /// Temperature and angles are rounded to one decimal; distances are
    /// passed through.
    pub fn new(snapshot: &SensorSnapshot, qr_data: Option<String>) -> Self {
        Self {
            front_distance: snapshot.front_distance,
            left_distance: snapshot.left_distance,
            right_distance: snapshot.right_distance,
            temperature: one_decimal(snapshot.temperature),
            pitch: one_decimal(snapshot.pitch),
            roll: one_decimal(snapshot.roll),
            yaw: one_decimal(snapshot.yaw),
            qr_data,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// `GET /api/sensors`
pub async fn sensors(State(state): State<GatewayState>) -> Response {
    match state.telemetry.latest() {
        Ok(snapshot) => {
            Json(SensorsResponse::new(&snapshot, state.vision.last_qr_data())).into_response()
        }
        Err(e) => {
            error!(error = %e, "sensor query failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorBody {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// Body of every `POST /api/control` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ControlResponse {
    fn ok(command: MotorCommand) -> Self {
        Self {
            success: true,
            command: Some(command.to_string()),
            error: None,
        }
    }

    fn failure(status: StatusCode, error: impl Into<String>) -> Response {
        let body = Self {
            success: false,
            command: None,
            error: Some(error.into()),
        };
        (status, Json(body)).into_response()
    }
}

/// Pull the `command` token out of a request body.  `None` for an
/// unparsable body, a missing or null field, or an empty string.
fn command_token(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    match value.get("command")? {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// `POST /api/control`
///
/// Checks run in a fixed order: missing command (400), no drive (503),
/// unknown command (400), drive failure (500).
pub async fn control(State(state): State<GatewayState>, body: Bytes) -> Response {
    let Some(token) = command_token(&body) else {
        return ControlResponse::failure(StatusCode::BAD_REQUEST, "No command specified");
    };
    let Some(motor) = state.motor.clone() else {
        return ControlResponse::failure(StatusCode::SERVICE_UNAVAILABLE, "Motor not available");
    };
    let Ok(command) = token.parse::<MotorCommand>() else {
        warn!(token = %token, "rejected unknown drive command");
        return ControlResponse::failure(StatusCode::BAD_REQUEST, "Invalid command");
    };

    // Pin writes take a blocking lock; keep them off the async workers.
    match tokio::task::spawn_blocking(move || motor.execute(command)).await {
        Ok(Ok(())) => {
            info!(%command, "motor command executed");
            Json(ControlResponse::ok(command)).into_response()
        }
        Ok(Err(e)) => {
            error!(%command, error = %e, "motor command failed");
            ControlResponse::failure(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
        Err(e) => {
            error!(%command, error = %e, "motor command task aborted");
            ControlResponse::failure(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}
