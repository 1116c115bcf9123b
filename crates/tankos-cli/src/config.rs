//! Configuration file – reads/writes `~/.tankos/config.toml`.
//!
//! The file maps one-to-one onto [`OrchestratorConfig`]; every section and
//! every field is optional.  After parsing, `TANKOS_*` environment
//! variables are applied and the result is validated.

use std::fs;
use std::path::{Path, PathBuf};

use tankos_runtime::OrchestratorConfig;
use tankos_types::TankError;

pub type Config = OrchestratorConfig;

/// Return `$TANKOS_CONFIG`, or `~/.tankos/config.toml`.
pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var("TANKOS_CONFIG")
        && !path.is_empty()
    {
        return PathBuf::from(path);
    }
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".tankos").join("config.toml")
}

/// Load the effective configuration: file (or defaults), environment
/// overrides, validation.
pub fn load() -> Result<Config, TankError> {
    let mut cfg = load_from(&config_path())?.unwrap_or_default();
    apply_overrides(&mut cfg, |key| std::env::var(key).ok());
    validate(&cfg)?;
    Ok(cfg)
}

/// Parse the file at `path`.  Returns `None` if it does not exist.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, TankError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| TankError::Config(format!("failed to read {}: {e}", path.display())))?;
    let cfg = toml::from_str(&raw)
        .map_err(|e| TankError::Config(format!("failed to parse {}: {e}", path.display())))?;
    Ok(Some(cfg))
}

/// Apply `TANKOS_*` overrides, reading variables through `lookup`.
///
/// | Variable | Config field |
/// |---|---|
/// | `TANKOS_HOST` | `gateway.host` |
/// | `TANKOS_PORT` | `gateway.port` |
/// | `TANKOS_SENSOR_TIMEOUT_S` | `safety.sensor_timeout_s` |
/// | `TANKOS_FRONT_THRESHOLD_CM` | `safety.front_threshold_cm` |
/// | `TANKOS_CAMERA_DEVICE` | `camera.device` |
///
/// Values that do not parse are ignored.
pub fn apply_overrides(cfg: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("TANKOS_HOST")
        && !v.is_empty()
    {
        cfg.gateway.host = v;
    }
    if let Some(port) = lookup("TANKOS_PORT").and_then(|v| v.parse::<u16>().ok()) {
        cfg.gateway.port = port;
    }
    if let Some(secs) = lookup("TANKOS_SENSOR_TIMEOUT_S").and_then(|v| v.parse::<f64>().ok()) {
        cfg.safety.sensor_timeout_s = secs;
    }
    if let Some(cm) = lookup("TANKOS_FRONT_THRESHOLD_CM").and_then(|v| v.parse::<f32>().ok()) {
        cfg.safety.front_threshold_cm = cm;
    }
    if let Some(device) = lookup("TANKOS_CAMERA_DEVICE")
        && !device.is_empty()
    {
        cfg.camera.device = device;
    }
}

/// Reject values that would make a loop spin or a trigger meaningless.
pub fn validate(cfg: &Config) -> Result<(), TankError> {
    let periods = [
        ("sensors.poll_period_ms", cfg.sensors.poll_period_ms),
        ("safety.tick_ms", cfg.safety.tick_ms),
        ("gateway.frame_interval_ms", cfg.gateway.frame_interval_ms),
        ("gateway.poll_interval_ms", cfg.gateway.poll_interval_ms),
        ("shutdown.join_timeout_ms", cfg.shutdown.join_timeout_ms),
    ];
    if let Some((name, _)) = periods.iter().find(|(_, v)| *v == 0) {
        return Err(TankError::Config(format!("{name} must be greater than zero")));
    }
    if cfg.camera.width == 0 || cfg.camera.height == 0 {
        return Err(TankError::Config(format!(
            "camera size {}x{} must be non-zero",
            cfg.camera.width, cfg.camera.height
        )));
    }
    if !(cfg.safety.sensor_timeout_s.is_finite() && cfg.safety.sensor_timeout_s > 0.0) {
        return Err(TankError::Config("safety.sensor_timeout_s must be positive".to_string()));
    }
    let thresholds = [
        ("safety.front_threshold_cm", cfg.safety.front_threshold_cm),
        ("vision.obstacle_threshold_cm", cfg.vision.obstacle_threshold_cm),
    ];
    if let Some((name, _)) = thresholds.iter().find(|(_, v)| !(v.is_finite() && *v > 0.0)) {
        return Err(TankError::Config(format!("{name} must be positive")));
    }
    if !(1..=100).contains(&cfg.vision.jpeg_quality) {
        return Err(TankError::Config("vision.jpeg_quality must be within 1..=100".to_string()));
    }
    Ok(())
}

/// Render `cfg` as TOML.
pub fn to_toml(cfg: &Config) -> Result<String, TankError> {
    toml::to_string_pretty(cfg).map_err(|e| TankError::Config(format!("failed to serialize config: {e}")))
}

/// Write `cfg` to `path`, creating the parent directory if necessary.
pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), TankError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, to_toml(cfg)?)?;
    Ok(())
}

/// Write `cfg` to [`config_path`].
pub fn save(cfg: &Config) -> Result<PathBuf, TankError> {
    let path = config_path();
    save_to(cfg, &path)?;
    Ok(path)
}
