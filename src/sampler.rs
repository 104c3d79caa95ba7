//! Frame-rate and resolution throttling.
//!
//! Frames wider than `max_width` are scaled down to exactly `max_width`, height
//! scaled by the same factor and rounded down. With `skip_frames = N > 0` only
//! frames whose index is a multiple of `N + 1` go on to detection.

use anyhow::Result;
use image::imageops::{self, FilterType};

use crate::frame::Frame;

/// Interpolation used for every resize. Bilinear, deterministic.
const RESIZE_FILTER: FilterType = FilterType::Triangle;

/// What the controller should do with a sampled frame.
#[derive(Debug)]
pub enum Sampled {
    /// Run detection, annotation and logging on this frame.
    Process(Frame),
    /// Decimated away. Carries the resized frame for optional raw display.
    Skip(Frame),
}

impl Sampled {
    pub fn is_skip(&self) -> bool {
        matches!(self, Sampled::Skip(_))
    }

    pub fn frame(&self) -> &Frame {
        match self {
            Sampled::Process(frame) | Sampled::Skip(frame) => frame,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameSampler {
    max_width: u32,
    skip_frames: u32,
}

impl FrameSampler {
    pub fn new(max_width: u32, skip_frames: u32) -> Self {
        Self {
            max_width: max_width.max(1),
            skip_frames,
        }
    }

    pub fn max_width(&self) -> u32 {
        self.max_width
    }

    pub fn skip_frames(&self) -> u32 {
        self.skip_frames
    }

    /// True when `index` survives decimation.
    pub fn selects(&self, index: u64) -> bool {
        self.skip_frames == 0 || index % (self.skip_frames as u64 + 1) == 0
    }

    pub fn sample(&self, frame: Frame) -> Result<Sampled> {
        let frame = self.bound_width(frame)?;
        if self.selects(frame.index()) {
            Ok(Sampled::Process(frame))
        } else {
            Ok(Sampled::Skip(frame))
        }
    }

    fn bound_width(&self, frame: Frame) -> Result<Frame> {
        if frame.width() <= self.max_width {
            return Ok(frame);
        }
        let (width, height) = scaled_size(frame.width(), frame.height(), self.max_width);
        let image = frame.to_image()?;
        let resized = imageops::resize(&image, width, height, RESIZE_FILTER);
        Ok(Frame::from_image(resized, frame.index()))
    }
}

/// Target size for a frame wider than `max_width`.
pub fn scaled_size(width: u32, height: u32, max_width: u32) -> (u32, u32) {
    let scaled = (height as u64 * max_width as u64) / width.max(1) as u64;
    (max_width, (scaled as u32).max(1))
}

/// Free-function form of [`FrameSampler::sample`].
pub fn sample(frame: Frame, max_width: u32, skip_n: u32) -> Result<Sampled> {
    FrameSampler::new(max_width, skip_n).sample(frame)
}
