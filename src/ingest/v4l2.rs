//! V4L2 camera capture.
//!
//! Camera index `N` maps to `/dev/videoN`. The device is asked for RGB24 and
//! falls back to YUYV, which is converted in-memory. The mmap queue is sized
//! from the connector's buffer cap so reads stay close to real time.

use anyhow::{anyhow, Context, Result};
use ouroboros::self_referencing;

use super::connector::{CaptureBackend, CapturedImage};
use super::normalize::{normalize_to_rgb, PixelFormat};

#[derive(Clone, Debug)]
pub struct V4l2Config {
    /// Device path (e.g., "/dev/video0")
    pub device: String,
    /// Preferred frame width.
    pub width: u32,
    /// Preferred frame height.
    pub height: u32,
}

impl V4l2Config {
    pub fn for_index(index: u32) -> Self {
        Self {
            device: format!("/dev/video{}", index),
            ..Self::default()
        }
    }
}

impl Default for V4l2Config {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_string(),
            width: 1280,
            height: 720,
        }
    }
}

#[self_referencing]
struct DeviceState {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

pub(crate) struct V4l2Capture {
    config: V4l2Config,
    state: Option<DeviceState>,
    format: PixelFormat,
    active_width: u32,
    active_height: u32,
    frame_count: u64,
}

impl V4l2Capture {
    pub(crate) fn open(config: V4l2Config, buffer_frames: usize) -> Result<Self> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let mut device = v4l::Device::with_path(&config.device)
            .with_context(|| format!("open v4l2 device {}", config.device))?;
        let mut format = device.format().context("read v4l2 format")?;
        format.width = config.width;
        format.height = config.height;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!(
                    "V4l2Capture: RGB3 unsupported on {} ({}), trying YUYV",
                    config.device,
                    err
                );
                format.fourcc = v4l::FourCC::new(b"YUYV");
                device
                    .set_format(&format)
                    .context("set v4l2 YUYV format")?
            }
        };

        let pixel_format = PixelFormat::from_fourcc(&format.fourcc.repr).ok_or_else(|| {
            anyhow!(
                "device {} negotiated unsupported pixel format {}",
                config.device,
                format.fourcc
            )
        })?;

        let buffers = buffer_frames.max(1) as u32;
        let state = DeviceStateBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, buffers)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()?;

        log::info!(
            "V4l2Capture: opened {} ({}x{}, {} buffer)",
            config.device,
            format.width,
            format.height,
            buffers
        );

        Ok(Self {
            active_width: format.width,
            active_height: format.height,
            config,
            state: Some(state),
            format: pixel_format,
            frame_count: 0,
        })
    }
}

impl CaptureBackend for V4l2Capture {
    fn name(&self) -> &'static str {
        "v4l2"
    }

    fn grab(&mut self) -> Result<Option<CapturedImage>> {
        use v4l::io::traits::CaptureStream;

        let state = self.state.as_mut().context("v4l2 device not open")?;
        let raw = state
            .with_mut(|fields| fields.stream.next().map(|(buf, _meta)| buf.to_vec()))
            .map_err(|err| anyhow::Error::new(err).context("capture v4l2 frame"))?;

        let pixels = normalize_to_rgb(&raw, self.active_width, self.active_height, self.format)?;
        self.frame_count += 1;
        Ok(Some(CapturedImage {
            pixels,
            width: self.active_width,
            height: self.active_height,
        }))
    }

    fn release(&mut self) {
        if self.state.take().is_some() {
            log::debug!(
                "V4l2Capture: closed {} after {} frames",
                self.config.device,
                self.frame_count
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camera_index_maps_to_device_node() {
        assert_eq!(V4l2Config::for_index(3).device, "/dev/video3");
    }
}
