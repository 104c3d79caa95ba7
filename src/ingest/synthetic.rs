//! Synthetic capture backend for `stub://` URLs.
//!
//! `stub://<name>?frames=N&width=W&height=H&fail_at=K`
//!
//! - `frames` absent means the stream never ends
//! - `fail_at=K` turns the read of frame K into an I/O fault
//! - width/height default to 640x480
//!
//! Pixels follow a slowly drifting gradient so consecutive frames differ.

use anyhow::{anyhow, Context, Result};

use super::connector::{CaptureBackend, CapturedImage};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyntheticConfig {
    pub name: String,
    pub frames: Option<u64>,
    pub width: u32,
    pub height: u32,
    pub fail_at: Option<u64>,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            name: "synthetic".to_string(),
            frames: None,
            width: 640,
            height: 480,
            fail_at: None,
        }
    }
}

impl SyntheticConfig {
    pub fn parse(raw: &str) -> Result<Self> {
        let parsed = url::Url::parse(raw).with_context(|| format!("invalid stub URL '{}'", raw))?;
        if parsed.scheme() != "stub" {
            return Err(anyhow!("synthetic sources require a stub:// URL, got '{}'", raw));
        }
        let mut config = SyntheticConfig {
            name: parsed.host_str().unwrap_or("synthetic").to_string(),
            ..SyntheticConfig::default()
        };
        for (key, value) in parsed.query_pairs() {
            match key.as_ref() {
                "frames" => config.frames = Some(parse_number(&key, &value)?),
                "width" => config.width = parse_number(&key, &value)?,
                "height" => config.height = parse_number(&key, &value)?,
                "fail_at" => config.fail_at = Some(parse_number(&key, &value)?),
                other => log::warn!("ignoring unknown stub parameter '{}'", other),
            }
        }
        if config.width == 0 || config.height == 0 {
            return Err(anyhow!("stub frame size must be non-zero"));
        }
        Ok(config)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| anyhow!("stub parameter '{}' must be a number, got '{}'", key, value))
}

pub struct SyntheticCapture {
    config: SyntheticConfig,
    frame_count: u64,
    scene_state: u8,
    released: bool,
}

impl SyntheticCapture {
    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            config,
            frame_count: 0,
            scene_state: 0,
            released: false,
        }
    }

    pub fn from_url(raw: &str) -> Result<Self> {
        let config = SyntheticConfig::parse(raw)?;
        log::info!("synthetic source {} opened", config.name);
        Ok(Self::new(config))
    }

    pub fn frames_captured(&self) -> u64 {
        self.frame_count
    }

    fn generate_synthetic_pixels(&mut self) -> Vec<u8> {
        let pixel_count = (self.config.width as usize) * (self.config.height as usize) * 3;

        if self.frame_count % 50 == 0 {
            self.scene_state = self.scene_state.wrapping_add(1);
        }

        let mut pixels = vec![0u8; pixel_count];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 + self.frame_count + self.scene_state as u64) % 256) as u8;
        }
        pixels
    }
}

impl CaptureBackend for SyntheticCapture {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    fn grab(&mut self) -> Result<Option<CapturedImage>> {
        if self.released {
            return Err(anyhow!("synthetic source {} already released", self.config.name));
        }
        let next = self.frame_count + 1;
        if self.config.fail_at == Some(next) {
            return Err(anyhow!(
                "synthetic source {} failed reading frame {}",
                self.config.name,
                next
            ));
        }
        if self.config.frames.is_some_and(|total| next > total) {
            return Ok(None);
        }
        self.frame_count = next;
        let pixels = self.generate_synthetic_pixels();
        Ok(Some(CapturedImage {
            pixels,
            width: self.config.width,
            height: self.config.height,
        }))
    }

    fn release(&mut self) {
        self.released = true;
        log::debug!(
            "synthetic source {} released after {} frames",
            self.config.name,
            self.frame_count
        );
    }
}
