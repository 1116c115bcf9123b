//! V4L2 capture through an `ffmpeg` subprocess.
//!
//! `ffmpeg` decodes whatever the webcam emits (MJPEG, YUYV, ...) and writes
//! raw RGB24 frames to stdout.  Each [`Camera::capture`] reads exactly one
//! frame's worth of bytes, so a frame is never torn across two captures.

use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Stdio};

use tankos_types::{Backend, TankError};
use tracing::{debug, info, warn};

use crate::camera::{Camera, CameraConfig, CameraFrame};

/// Arguments passed to `ffmpeg` for `config`.
pub fn ffmpeg_args(config: &CameraConfig) -> Vec<String> {
    [
        "-hide_banner",
        "-loglevel",
        "error",
        "-f",
        "video4linux2",
        "-video_size",
        &format!("{}x{}", config.width, config.height),
        "-framerate",
        &config.framerate.to_string(),
        "-i",
        &config.device,
        "-pix_fmt",
        "rgb24",
        "-f",
        "rawvideo",
        "-",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// A [`Camera`] fed by raw RGB24 bytes, normally an `ffmpeg` child's stdout.
pub struct FfmpegCamera {
    id: String,
    width: u32,
    height: u32,
    stdout: Box<dyn Read + Send>,
    child: Option<Child>,
    buffer: Vec<u8>,
}

impl FfmpegCamera {
    /// Spawn `ffmpeg` against `config.device`.
    ///
    /// # Errors
    ///
    /// Returns [`TankError::Camera`] if the device node does not exist or
    /// the process cannot be started.
    pub fn open(config: &CameraConfig) -> Result<Self, TankError> {
        if !Path::new(&config.device).exists() {
            return Err(TankError::Camera(format!(
                "device {} not found",
                config.device
            )));
        }

        let mut child = Command::new("ffmpeg")
            .args(ffmpeg_args(config))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| TankError::Camera(format!("failed to spawn ffmpeg: {e}")))?;

        let Some(stdout) = child.stdout.take() else {
            let _ = child.kill();
            return Err(TankError::Camera("ffmpeg stdout unavailable".to_string()));
        };

        info!(
            device = %config.device,
            width = config.width,
            height = config.height,
            framerate = config.framerate,
            "ffmpeg capture started"
        );

        let mut camera = Self::from_reader(&config.device, config.width, config.height, stdout);
        camera.child = Some(child);
        Ok(camera)
    }

    /// Read frames from an arbitrary byte source.
    pub fn from_reader(
        id: &str,
        width: u32,
        height: u32,
        reader: impl Read + Send + 'static,
    ) -> Self {
        Self {
            id: id.to_string(),
            width,
            height,
            stdout: Box::new(reader),
            child: None,
            buffer: vec![0u8; CameraFrame::rgb_len(width, height)],
        }
    }
}

impl Camera for FfmpegCamera {
    fn id(&self) -> &str {
        &self.id
    }

    fn backend(&self) -> Backend {
        Backend::Real
    }

    fn capture(&mut self) -> Result<CameraFrame, TankError> {
        self.stdout
            .read_exact(&mut self.buffer)
            .map_err(|e| TankError::Camera(format!("{}: {e}", self.id)))?;
        Ok(CameraFrame {
            width: self.width,
            height: self.height,
            data: self.buffer.clone(),
        })
    }
}

impl Drop for FfmpegCamera {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill() {
                warn!(camera = %self.id, error = %e, "failed to kill ffmpeg");
            }
            let _ = child.wait();
            debug!(camera = %self.id, "ffmpeg capture stopped");
        }
    }
}
