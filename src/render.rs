//! Annotation overlay.
//!
//! Draws person boxes with confidence labels, then a semi-transparent status
//! panel in a fixed top-left region. Rendering always works on a copy; the
//! input frame is never touched. Panel geometry and line layout are constants
//! so the overlay is stable from frame to frame.

use chrono::{Local, NaiveTime};
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

use crate::detect::Detection;
use crate::error::{chain_message, PipelineError};
use crate::frame::Frame;
use crate::pipeline::RunState;

pub const BOX_COLOR: [u8; 3] = [0, 255, 0];
pub const BOX_THICKNESS: u32 = 2;
pub const TEXT_COLOR: [u8; 3] = [255, 255, 255];
/// Gap between a box's top edge and its label baseline.
pub const LABEL_OFFSET: i32 = 10;

pub const PANEL_LEFT: u32 = 10;
pub const PANEL_TOP: u32 = 10;
pub const PANEL_RIGHT: u32 = 450;
pub const PANEL_BOTTOM: u32 = 130;
pub const PANEL_COLOR: [u8; 3] = [0, 0, 0];
pub const PANEL_OVERLAY_WEIGHT: f32 = 0.3;
pub const PANEL_BASE_WEIGHT: f32 = 0.7;
pub const PANEL_TEXT_LEFT: i32 = 15;
pub const PANEL_FIRST_BASELINE: i32 = 30;
pub const PANEL_LINE_STEP: i32 = 22;

const GLYPH_SIZE: i32 = 8;

/// A rendered copy of a frame, ready for display.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnnotatedFrame {
    frame: Frame,
}

impl AnnotatedFrame {
    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn into_frame(self) -> Frame {
        self.frame
    }
}

#[derive(Clone, Debug)]
pub struct AnnotationRenderer {
    quit_key: char,
}

impl Default for AnnotationRenderer {
    fn default() -> Self {
        Self::new('q')
    }
}

impl AnnotationRenderer {
    pub fn new(quit_key: char) -> Self {
        Self { quit_key }
    }

    pub fn render(
        &self,
        frame: &Frame,
        detections: &[Detection],
        state: &RunState,
        source_name: &str,
    ) -> Result<AnnotatedFrame, PipelineError> {
        self.render_at(frame, detections, state, source_name, Local::now().time())
    }

    /// Render with an explicit wall-clock time for the panel.
    pub fn render_at(
        &self,
        frame: &Frame,
        detections: &[Detection],
        state: &RunState,
        source_name: &str,
        clock: NaiveTime,
    ) -> Result<AnnotatedFrame, PipelineError> {
        frame
            .validate()
            .map_err(|err| PipelineError::Render(chain_message(&err)))?;
        let mut canvas = frame
            .to_image()
            .map_err(|err| PipelineError::Render(chain_message(&err)))?;

        for detection in detections {
            draw_detection(&mut canvas, detection);
        }

        blend_panel(&mut canvas);
        for (i, line) in self
            .panel_lines(state, source_name, clock)
            .iter()
            .enumerate()
        {
            let baseline = PANEL_FIRST_BASELINE + i as i32 * PANEL_LINE_STEP;
            draw_text(&mut canvas, line, PANEL_TEXT_LEFT, baseline - GLYPH_SIZE, TEXT_COLOR);
        }

        Ok(AnnotatedFrame {
            frame: Frame::from_image(canvas, frame.index()),
        })
    }

    /// The five fixed status lines, top to bottom.
    pub fn panel_lines(&self, state: &RunState, source_name: &str, clock: NaiveTime) -> [String; 5] {
        [
            format!("Source: {}", source_name),
            format!("Persons detected: {}", state.last_person_count),
            format!("Frame: {}", state.frame_count),
            format!("Time: {}", clock.format("%H:%M:%S")),
            format!("Press '{}' to quit", self.quit_key),
        ]
    }
}

/// Label drawn above a detection box.
pub fn detection_label(detection: &Detection) -> String {
    format!("Person {:.2}", detection.confidence)
}

fn draw_detection(canvas: &mut RgbImage, detection: &Detection) {
    let x1 = detection.x1.floor() as i32;
    let y1 = detection.y1.floor() as i32;
    let x2 = detection.x2.ceil() as i32;
    let y2 = detection.y2.ceil() as i32;

    for inset in 0..BOX_THICKNESS as i32 {
        let w = x2 - x1 - 2 * inset;
        let h = y2 - y1 - 2 * inset;
        if w <= 0 || h <= 0 {
            break;
        }
        let rect = Rect::at(x1 + inset, y1 + inset).of_size(w as u32, h as u32);
        draw_hollow_rect_mut(canvas, rect, Rgb(BOX_COLOR));
    }

    let label = detection_label(detection);
    let (left, top) = label_origin(canvas.width(), x1, y1, &label);
    draw_text(canvas, &label, left, top, BOX_COLOR);
}

/// Top-left corner for a label so it stays inside the frame.
fn label_origin(frame_width: u32, x1: i32, y1: i32, label: &str) -> (i32, i32) {
    let text_width = label.chars().count() as i32 * GLYPH_SIZE;
    let max_left = (frame_width as i32 - text_width).max(0);
    let left = x1.clamp(0, max_left);
    let top = (y1 - LABEL_OFFSET - GLYPH_SIZE).max(0);
    (left, top)
}

fn blend_panel(canvas: &mut RgbImage) {
    let right = PANEL_RIGHT.min(canvas.width());
    let bottom = PANEL_BOTTOM.min(canvas.height());
    for y in PANEL_TOP..bottom {
        for x in PANEL_LEFT..right {
            let pixel = canvas.get_pixel_mut(x, y);
            for (channel, overlay) in pixel.0.iter_mut().zip(PANEL_COLOR) {
                let mixed =
                    *channel as f32 * PANEL_BASE_WEIGHT + overlay as f32 * PANEL_OVERLAY_WEIGHT;
                *channel = mixed.round().clamp(0.0, 255.0) as u8;
            }
        }
    }
}

/// Blit 8x8 bitmap glyphs with clipping. Non-ASCII characters render as '?'.
fn draw_text(canvas: &mut RgbImage, text: &str, left: i32, top: i32, color: [u8; 3]) {
    let (width, height) = (canvas.width() as i32, canvas.height() as i32);
    for (i, ch) in text.chars().enumerate() {
        let code = if ch.is_ascii() { ch as usize } else { '?' as usize };
        let glyph = font8x8::legacy::BASIC_LEGACY[code];
        let origin_x = left + i as i32 * GLYPH_SIZE;
        for (row, bits) in glyph.iter().enumerate() {
            let y = top + row as i32;
            if y < 0 || y >= height {
                continue;
            }
            for col in 0..GLYPH_SIZE {
                if bits & (1 << col) == 0 {
                    continue;
                }
                let x = origin_x + col;
                if x >= 0 && x < width {
                    canvas.put_pixel(x as u32, y as u32, Rgb(color));
                }
            }
        }
    }
}
