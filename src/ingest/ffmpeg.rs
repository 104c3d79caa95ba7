//! FFmpeg-backed decoder for local files and remote URLs.
//!
//! Frames are decoded in-memory and converted to RGB24. Network inputs are
//! opened with demuxer buffering disabled so reads track the live edge.

use anyhow::{anyhow, Context, Result};
use ffmpeg_next as ffmpeg;

use super::connector::{CaptureBackend, CapturedImage};

pub(crate) struct FfmpegCapture {
    location: String,
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    eof_sent: bool,
    frame_count: u64,
}

impl FfmpegCapture {
    pub(crate) fn open(location: &str, buffer_frames: usize) -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;

        let mut options = ffmpeg::Dictionary::new();
        if location.contains("://") {
            options.set("fflags", "nobuffer");
            options.set("max_delay", "0");
            options.set("reorder_queue_size", &buffer_frames.to_string());
        }

        let input = ffmpeg::format::input_with_dictionary(&location, options)
            .with_context(|| format!("failed to open input '{}' with ffmpeg", location))?;
        let input_stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| anyhow!("input has no video track"))?;
        let stream_index = input_stream.index();
        let context = ffmpeg::codec::context::Context::from_parameters(input_stream.parameters())
            .context("load video decoder parameters")?;
        let decoder = context
            .decoder()
            .video()
            .context("open ffmpeg video decoder")?;

        let scaler = ffmpeg::software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::util::format::pixel::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;

        log::info!(
            "ffmpeg input {} opened ({}x{})",
            location,
            decoder.width(),
            decoder.height()
        );

        Ok(Self {
            location: location.to_string(),
            input,
            stream_index,
            decoder,
            scaler,
            eof_sent: false,
            frame_count: 0,
        })
    }

    fn receive(&mut self) -> Result<Option<CapturedImage>> {
        let mut decoded = ffmpeg::frame::Video::empty();
        if self.decoder.receive_frame(&mut decoded).is_err() {
            return Ok(None);
        }
        let mut rgb_frame = ffmpeg::frame::Video::empty();
        self.scaler
            .run(&decoded, &mut rgb_frame)
            .context("scale frame to RGB")?;
        let (pixels, width, height) = frame_to_pixels(&rgb_frame)?;
        self.frame_count += 1;
        Ok(Some(CapturedImage {
            pixels,
            width,
            height,
        }))
    }
}

impl CaptureBackend for FfmpegCapture {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    fn grab(&mut self) -> Result<Option<CapturedImage>> {
        if let Some(image) = self.receive()? {
            return Ok(Some(image));
        }
        if self.eof_sent {
            return Ok(None);
        }

        let mut next_packet = None;
        for (stream, packet) in self.input.packets() {
            if stream.index() == self.stream_index {
                next_packet = Some(packet);
                break;
            }
        }

        while let Some(packet) = next_packet.take() {
            self.decoder
                .send_packet(&packet)
                .context("send packet to ffmpeg decoder")?;
            if let Some(image) = self.receive()? {
                return Ok(Some(image));
            }
            for (stream, packet) in self.input.packets() {
                if stream.index() == self.stream_index {
                    next_packet = Some(packet);
                    break;
                }
            }
        }

        // Demuxer exhausted: flush whatever the decoder still holds.
        self.decoder.send_eof().context("flush ffmpeg decoder")?;
        self.eof_sent = true;
        self.receive()
    }

    fn release(&mut self) {
        log::debug!(
            "ffmpeg input {} closed after {} frames",
            self.location,
            self.frame_count
        );
    }
}

fn frame_to_pixels(frame: &ffmpeg::frame::Video) -> Result<(Vec<u8>, u32, u32)> {
    let width = frame.width();
    let height = frame.height();
    let row_bytes = (width as usize) * 3;
    let stride = frame.stride(0);
    let data = frame.data(0);

    if stride == row_bytes {
        let packed = data
            .get(..row_bytes * height as usize)
            .context("ffmpeg frame is shorter than its geometry")?;
        return Ok((packed.to_vec(), width, height));
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let end = start + row_bytes;
        pixels.extend_from_slice(
            data.get(start..end)
                .context("ffmpeg frame row is out of bounds")?,
        );
    }

    Ok((pixels, width, height))
}
