//! Per-frame vision processing.
//!
//! [`VisionPipeline::analyze`] takes one raw RGB frame plus the current
//! front distance and returns a JPEG-ready [`AnnotatedFrame`] and the
//! structured [`DetectionResult`].  It is a pure transform apart from
//! remembering the most recently decoded QR payload, which is never cleared
//! when a code leaves the view.
//!
//! Drawing order, back to front:
//!
//! 1. Canny edge thumbnail (thresholds 50/150, quarter size) in the top-left.
//! 2. QR outlines and payload text.
//! 3. `FRONT: <d> CM` readout and, below the obstacle threshold,
//!    `OBSTACLE!`.

use std::time::Instant;

use chrono::{DateTime, Utc};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Rgb, RgbImage};
use imageproc::edges::canny;
use serde::{Deserialize, Serialize};
use tankos_hal::CameraFrame;
use tankos_middleware::Latest;
use tankos_types::TankError;
use tracing::{debug, info};

use crate::overlay::{draw_polygon, draw_text, fill_rect, text_height, text_width};

const CANNY_LOW: f32 = 50.0;
const CANNY_HIGH: f32 = 150.0;

const QR_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const DISTANCE_COLOR: Rgb<u8> = Rgb([200, 200, 0]);
const OBSTACLE_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const LABEL_BACKGROUND: Rgb<u8> = Rgb([0, 0, 0]);

/// `[vision]` section of the configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    /// Front distances strictly below this are flagged as an obstacle.
    pub obstacle_threshold_cm: f32,
    /// JPEG quality, 1–100.
    pub jpeg_quality: u8,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            obstacle_threshold_cm: 40.0,
            jpeg_quality: 85,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// QR decoding boundary
// ────────────────────────────────────────────────────────────────────────────

/// One decoded QR code.
#[derive(Debug, Clone, PartialEq)]
pub struct QrDetection {
    pub payload: String,
    /// Corner points in image coordinates, in detector order.
    pub corners: Vec<(f32, f32)>,
}

/// Finds and decodes QR codes in a greyscale frame.
pub trait QrDecoder: Send {
    fn detect(&mut self, gray: &GrayImage) -> Vec<QrDetection>;
}

/// Decoder that never finds anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullQrDecoder;

impl QrDecoder for NullQrDecoder {
    fn detect(&mut self, _gray: &GrayImage) -> Vec<QrDetection> {
        Vec::new()
    }
}

/// QR decoder backed by the `rqrr` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct RqrrDecoder;

impl QrDecoder for RqrrDecoder {
    fn detect(&mut self, gray: &GrayImage) -> Vec<QrDetection> {
        let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(
            gray.width() as usize,
            gray.height() as usize,
            |x, y| gray.get_pixel(x as u32, y as u32).0[0],
        );
        prepared
            .detect_grids()
            .into_iter()
            .filter_map(|grid| match grid.decode() {
                Ok((_meta, payload)) => Some(QrDetection {
                    payload,
                    corners: grid.bounds.iter().map(|p| (p.x as f32, p.y as f32)).collect(),
                }),
                Err(e) => {
                    debug!(error = ?e, "QR grid found but not decodable");
                    None
                }
            })
            .collect()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Outputs
// ────────────────────────────────────────────────────────────────────────────

/// Structured result of analysing one frame.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DetectionResult {
    /// Payload decoded from this frame, if any.
    pub qr_data: Option<String>,
    pub obstacle: bool,
}

/// The most recent processed image, already JPEG-encoded.
#[derive(Debug, Clone)]
pub struct AnnotatedFrame {
    pub jpeg: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub qr_data: Option<String>,
    pub obstacle: bool,
    pub produced_at: Instant,
    /// Wall-clock time of production, for the `X-Timestamp` part header.
    pub timestamp: DateTime<Utc>,
    /// 1 for the first frame the pipeline produced.
    pub sequence: u64,
}

/// Slots the capture loop publishes into and the gateway reads from.
#[derive(Clone, Default)]
pub struct VisionOutputs {
    pub frames: Latest<AnnotatedFrame>,
    /// Most recent QR payload ever decoded.
    pub last_qr: Latest<String>,
}

impl VisionOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_qr_data(&self) -> Option<String> {
        self.last_qr.copy_out()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Pipeline
// ────────────────────────────────────────────────────────────────────────────

/// Stateful frame analyser.  Owned by the capture thread.
pub struct VisionPipeline {
    config: VisionConfig,
    decoder: Box<dyn QrDecoder>,
    last_qr_data: Option<String>,
    sequence: u64,
}

impl VisionPipeline {
    pub fn new(config: VisionConfig, decoder: Box<dyn QrDecoder>) -> Self {
        Self {
            config,
            decoder,
            last_qr_data: None,
            sequence: 0,
        }
    }

    /// Pipeline with the `rqrr` decoder.
    pub fn with_default_decoder(config: VisionConfig) -> Self {
        Self::new(config, Box::new(RqrrDecoder))
    }

    /// Most recent payload ever decoded.
    pub fn last_qr_data(&self) -> Option<&str> {
        self.last_qr_data.as_deref()
    }

    pub fn config(&self) -> &VisionConfig {
        &self.config
    }

    /// Annotate and encode `frame`.
    ///
    /// # Errors
    ///
    /// Returns [`TankError::Vision`] if the frame buffer does not match its
    /// dimensions or JPEG encoding fails.
    pub fn analyze(
        &mut self,
        frame: &CameraFrame,
        front_distance: Option<f32>,
    ) -> Result<(AnnotatedFrame, DetectionResult), TankError> {
        if !frame.is_well_formed() {
            return Err(TankError::Vision(format!(
                "malformed {}x{} frame with {} bytes",
                frame.width,
                frame.height,
                frame.data.len()
            )));
        }
        let mut image = RgbImage::from_raw(frame.width, frame.height, frame.data.clone())
            .ok_or_else(|| TankError::Vision("frame buffer too small".to_string()))?;
        let gray = imageops::grayscale(&image);

        let mut result = DetectionResult::default();

        draw_edge_thumbnail(&mut image, &gray);

        for detection in self.decoder.detect(&gray) {
            draw_polygon(&mut image, &detection.corners, QR_COLOR, 2);
            if let Some(&(x, y)) = detection.corners.first() {
                draw_text(&mut image, x as i32, y as i32 - 16, &detection.payload, 2, QR_COLOR);
            }
            result.qr_data = Some(detection.payload);
        }
        if let Some(payload) = &result.qr_data {
            if self.last_qr_data.as_deref() != Some(payload.as_str()) {
                info!(payload = %payload, "QR code decoded");
            }
            self.last_qr_data = Some(payload.clone());
        }

        if let Some(front) = front_distance {
            draw_label(&mut image, 10, 16, &format!("FRONT: {front:.1} CM"), 2, DISTANCE_COLOR);
            if front < self.config.obstacle_threshold_cm {
                result.obstacle = true;
                draw_label(&mut image, 10, 39, "OBSTACLE!", 3, OBSTACLE_COLOR);
            }
        }

        let jpeg = encode_jpeg(&image, self.config.jpeg_quality)?;
        self.sequence += 1;

        let annotated = AnnotatedFrame {
            jpeg,
            width: frame.width,
            height: frame.height,
            qr_data: result.qr_data.clone(),
            obstacle: result.obstacle,
            produced_at: Instant::now(),
            timestamp: Utc::now(),
            sequence: self.sequence,
        };
        Ok((annotated, result))
    }
}

fn draw_edge_thumbnail(image: &mut RgbImage, gray: &GrayImage) {
    let (tw, th) = (image.width() / 4, image.height() / 4);
    if tw == 0 || th == 0 {
        return;
    }
    let edges = canny(gray, CANNY_LOW, CANNY_HIGH);
    let small = imageops::resize(&edges, tw, th, FilterType::Triangle);
    let thumbnail = DynamicImage::ImageLuma8(small).to_rgb8();
    imageops::replace(image, &thumbnail, 0, 0);
}

// Text on a dark plate so it stays legible over the thumbnail.
fn draw_label(image: &mut RgbImage, x: i32, y: i32, text: &str, scale: u32, color: Rgb<u8>) {
    let pad = scale as i32;
    fill_rect(
        image,
        x - pad,
        y - pad,
        x + text_width(text, scale) as i32,
        y + text_height(scale) as i32 + pad - 1,
        LABEL_BACKGROUND,
    );
    draw_text(image, x, y, text, scale, color);
}

fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, TankError> {
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100))
        .encode_image(image)
        .map_err(|e| TankError::Vision(format!("JPEG encode failed: {e}")))?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::ImageFormat;

    /// Returns a scripted list of detections per call.
    struct ScriptedDecoder {
        script: Vec<Vec<QrDetection>>,
    }

    impl QrDecoder for ScriptedDecoder {
        fn detect(&mut self, _gray: &GrayImage) -> Vec<QrDetection> {
            if self.script.is_empty() {
                Vec::new()
            } else {
                self.script.remove(0)
            }
        }
    }

    fn qr(payload: &str) -> QrDetection {
        QrDetection {
            payload: payload.to_string(),
            corners: vec![(30.0, 30.0), (50.0, 30.0), (50.0, 45.0), (30.0, 45.0)],
        }
    }

    fn grey_frame(width: u32, height: u32, value: u8) -> CameraFrame {
        CameraFrame {
            width,
            height,
            data: vec![value; CameraFrame::rgb_len(width, height)],
        }
    }

    fn pipeline() -> VisionPipeline {
        VisionPipeline::new(VisionConfig::default(), Box::new(NullQrDecoder))
    }

    #[test]
    fn obstacle_threshold_is_strict() {
        let mut p = pipeline();
        let frame = grey_frame(64, 48, 128);
        let cases = [
            (Some(39.9), true),
            (Some(40.0), false),
            (Some(40.1), false),
            (Some(5.0), true),
            (None, false),
        ];
        for (front, expected) in cases {
            let (annotated, result) = p.analyze(&frame, front).unwrap();
            assert_eq!(result.obstacle, expected, "front={front:?}");
            assert_eq!(annotated.obstacle, expected);
        }
    }

    #[test]
    fn output_is_a_decodable_jpeg_of_the_same_size() {
        let mut p = pipeline();
        let (annotated, _) = p.analyze(&grey_frame(64, 48, 128), Some(120.0)).unwrap();
        assert_eq!(&annotated.jpeg[..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory_with_format(&annotated.jpeg, ImageFormat::Jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 48));
        assert_eq!((annotated.width, annotated.height), (64, 48));
    }

    #[test]
    fn edge_thumbnail_replaces_top_left_quarter() {
        let mut p = pipeline();
        // A flat frame has no edges, so the thumbnail is black.
        let (annotated, _) = p.analyze(&grey_frame(64, 48, 220), None).unwrap();
        let decoded = image::load_from_memory_with_format(&annotated.jpeg, ImageFormat::Jpeg)
            .unwrap()
            .to_rgb8();
        assert!(decoded.get_pixel(4, 4).0[0] < 60);
        assert!(decoded.get_pixel(50, 40).0[0] > 180);
    }

    #[test]
    fn last_decoded_qr_wins_and_is_retained() {
        let decoder = ScriptedDecoder {
            script: vec![vec![qr("first"), qr("second")], vec![]],
        };
        let mut p = VisionPipeline::new(VisionConfig::default(), Box::new(decoder));
        let frame = grey_frame(64, 48, 128);

        let (annotated, result) = p.analyze(&frame, None).unwrap();
        assert_eq!(result.qr_data.as_deref(), Some("second"));
        assert_eq!(annotated.qr_data.as_deref(), Some("second"));
        assert_eq!(p.last_qr_data(), Some("second"));

        // No code in view: this frame reports none, the memory is kept.
        let (_, result) = p.analyze(&frame, None).unwrap();
        assert_eq!(result.qr_data, None);
        assert_eq!(p.last_qr_data(), Some("second"));
    }

    #[test]
    fn sequence_counts_produced_frames() {
        let mut p = pipeline();
        let frame = grey_frame(16, 16, 0);
        let (a, _) = p.analyze(&frame, None).unwrap();
        let (b, _) = p.analyze(&frame, None).unwrap();
        assert_eq!((a.sequence, b.sequence), (1, 2));
        assert!(b.produced_at >= a.produced_at);
    }

    #[test]
    fn malformed_frame_is_rejected() {
        let mut p = pipeline();
        let frame = CameraFrame {
            width: 10,
            height: 10,
            data: vec![0; 7],
        };
        assert!(matches!(p.analyze(&frame, None), Err(TankError::Vision(_))));
        // A rejected frame does not advance the sequence.
        let (ok, _) = p.analyze(&grey_frame(8, 8, 0), None).unwrap();
        assert_eq!(ok.sequence, 1);
    }

    #[test]
    fn tiny_frames_skip_the_thumbnail() {
        let mut p = pipeline();
        assert!(p.analyze(&grey_frame(3, 3, 50), Some(10.0)).is_ok());
    }

    #[test]
    fn rqrr_finds_nothing_in_a_blank_frame() {
        let gray = GrayImage::from_pixel(64, 64, image::Luma([255]));
        assert!(RqrrDecoder.detect(&gray).is_empty());
    }

    #[test]
    fn vision_outputs_share_slots_between_clones() {
        let outputs = VisionOutputs::new();
        let reader = outputs.clone();
        outputs.last_qr.publish("hello".to_string());
        assert_eq!(reader.last_qr_data().as_deref(), Some("hello"));
    }
}
