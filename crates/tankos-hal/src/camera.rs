//! `Camera` trait and the frame type it produces.

use serde::{Deserialize, Serialize};
use tankos_types::{Backend, TankError};

/// A raw RGB24 frame returned by a camera driver.
#[derive(Debug, Clone)]
pub struct CameraFrame {
    pub width: u32,
    pub height: u32,
    /// Packed RGB24 pixels, row-major, `width * height * 3` bytes.
    pub data: Vec<u8>,
}

impl CameraFrame {
    /// Number of bytes an RGB24 frame of `width` x `height` occupies.
    pub fn rgb_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * 3
    }

    /// `true` when `data` has exactly the size the dimensions call for.
    pub fn is_well_formed(&self) -> bool {
        self.width > 0 && self.height > 0 && self.data.len() == Self::rgb_len(self.width, self.height)
    }
}

/// An image-capture device.
pub trait Camera: Send {
    /// Stable identifier, e.g. `"front_rgb"`.
    fn id(&self) -> &str;

    fn backend(&self) -> Backend;

    /// Block until the next frame is available and return it.
    ///
    /// # Errors
    ///
    /// Returns [`TankError::Camera`] if the frame cannot be read (device
    /// unplugged, capture process exited, short read).
    fn capture(&mut self) -> Result<CameraFrame, TankError>;
}

/// `[camera]` section of the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// V4L2 device node.
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub framerate: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_string(),
            width: 640,
            height: 480,
            framerate: 30,
        }
    }
}
