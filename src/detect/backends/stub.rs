use anyhow::Result;
use sha2::{Digest, Sha256};

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{Detection, PERSON_CLASS_ID};
use crate::frame::Frame;

/// COCO "car", used so stub output also exercises the person filter.
const STUB_OTHER_CLASS: u32 = 2;
const MAX_STUB_DETECTIONS: u8 = 3;

/// Stub backend for running without model weights.
///
/// Detections are derived from a SHA-256 of the pixels, so identical frames
/// always give identical boxes.
#[derive(Default)]
pub struct StubBackend;

impl StubBackend {
    pub fn new() -> Self {
        Self
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let digest: [u8; 32] = Sha256::digest(frame.pixels()).into();
        let count = digest[0] % (MAX_STUB_DETECTIONS + 1);
        let width = frame.width() as f32;
        let height = frame.height() as f32;

        let detections = (0..count as usize)
            .map(|i| {
                let bytes = &digest[1 + i * 6..7 + i * 6];
                let x1 = width * (bytes[0] as f32 / 255.0) * 0.7;
                let y1 = height * (bytes[1] as f32 / 255.0) * 0.7;
                let w = width * (0.1 + bytes[2] as f32 / 255.0 * 0.2);
                let h = height * (0.2 + bytes[3] as f32 / 255.0 * 0.1);
                let confidence = 0.5 + bytes[4] as f32 / 255.0 * 0.5;
                let class_id = if bytes[5] % 4 == 0 {
                    STUB_OTHER_CLASS
                } else {
                    PERSON_CLASS_ID
                };
                Detection::new(
                    x1,
                    y1,
                    (x1 + w).min(width),
                    (y1 + h).min(height),
                    confidence,
                    class_id,
                )
            })
            .collect();
        Ok(detections)
    }
}
