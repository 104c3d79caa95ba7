//! Source connection and bounded frame reads.
//!
//! `SourceConnector::connect` opens a capture backend for a resolved stream and
//! only succeeds once a first frame has been read. On failure the backend is
//! released before the error is returned, so no half-open handle escapes.
//!
//! `OpenSource` owns the live backend. `close()` is idempotent and also runs on
//! drop, which makes release happen exactly once regardless of how a run ends.

use anyhow::{anyhow, Result};

use super::descriptor::{ResolvedStream, StreamTarget};
use super::synthetic::SyntheticCapture;
use crate::error::{chain_message, PipelineError};
use crate::frame::Frame;

/// Input-side buffering cap, in frames, requested from every backend.
pub const INPUT_BUFFER_FRAMES: usize = 1;

/// One decoded RGB24 image as handed over by a backend.
#[derive(Clone, Debug)]
pub struct CapturedImage {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Capture backend trait.
///
/// Implementations decode into RGB24 and must not buffer more frames than the
/// connector asked for.
pub trait CaptureBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Blocking read. `Ok(None)` means the stream is exhausted.
    fn grab(&mut self) -> Result<Option<CapturedImage>>;

    /// Release the underlying device or decoder.
    fn release(&mut self);
}

/// Opens capture backends for stream targets.
pub trait BackendOpener: Send {
    fn open(&self, target: &StreamTarget, buffer_frames: usize) -> Result<Box<dyn CaptureBackend>>;
}

/// Default opener: `stub://` synthetic streams, FFmpeg for files and URLs, V4L2 for cameras.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemOpener;

impl BackendOpener for SystemOpener {
    fn open(&self, target: &StreamTarget, buffer_frames: usize) -> Result<Box<dyn CaptureBackend>> {
        match target {
            StreamTarget::Url(raw) if raw.starts_with("stub://") => {
                Ok(Box::new(SyntheticCapture::from_url(raw)?))
            }
            StreamTarget::File(path) => {
                if !path.is_file() {
                    return Err(anyhow!("file not found: {}", path.display()));
                }
                open_decoder(&path.to_string_lossy(), buffer_frames)
            }
            StreamTarget::Url(raw) => open_decoder(raw, buffer_frames),
            StreamTarget::Device(index) => open_camera(*index, buffer_frames),
        }
    }
}

#[cfg(feature = "ingest-ffmpeg")]
fn open_decoder(location: &str, buffer_frames: usize) -> Result<Box<dyn CaptureBackend>> {
    Ok(Box::new(super::ffmpeg::FfmpegCapture::open(
        location,
        buffer_frames,
    )?))
}

#[cfg(not(feature = "ingest-ffmpeg"))]
fn open_decoder(location: &str, _buffer_frames: usize) -> Result<Box<dyn CaptureBackend>> {
    Err(anyhow!(
        "decoding {} requires the ingest-ffmpeg feature",
        location
    ))
}

#[cfg(feature = "ingest-v4l2")]
fn open_camera(index: u32, buffer_frames: usize) -> Result<Box<dyn CaptureBackend>> {
    Ok(Box::new(super::v4l2::V4l2Capture::open(
        super::v4l2::V4l2Config::for_index(index),
        buffer_frames,
    )?))
}

#[cfg(not(feature = "ingest-v4l2"))]
fn open_camera(index: u32, _buffer_frames: usize) -> Result<Box<dyn CaptureBackend>> {
    Err(anyhow!(
        "camera {} requires the ingest-v4l2 feature",
        index
    ))
}

pub struct SourceConnector {
    opener: Box<dyn BackendOpener>,
    buffer_frames: usize,
}

impl SourceConnector {
    pub fn new(opener: Box<dyn BackendOpener>) -> Self {
        Self {
            opener,
            buffer_frames: INPUT_BUFFER_FRAMES,
        }
    }

    pub fn system() -> Self {
        Self::new(Box::new(SystemOpener))
    }

    /// Open the stream and prove it is readable by pulling a first frame.
    pub fn connect(&self, stream: ResolvedStream) -> Result<OpenSource, PipelineError> {
        log::info!("connecting to source: {}", stream.target);

        let mut backend = self
            .opener
            .open(&stream.target, self.buffer_frames)
            .map_err(|err| connect_error(&stream.target, &err))?;

        let first = match backend.grab() {
            Ok(Some(image)) => image,
            Ok(None) => {
                backend.release();
                return Err(connect_error(
                    &stream.target,
                    &anyhow!("stream ended before the first frame"),
                ));
            }
            Err(err) => {
                backend.release();
                return Err(connect_error(&stream.target, &err));
            }
        };

        log::info!(
            "connected to {} via {} ({}x{})",
            stream.display_name,
            backend.name(),
            first.width,
            first.height
        );

        Ok(OpenSource {
            backend: Some(backend),
            pending: Some(first),
            display_name: stream.display_name,
            target: stream.target,
            frames_read: 0,
        })
    }
}

fn connect_error(target: &StreamTarget, err: &anyhow::Error) -> PipelineError {
    log::error!("unable to read from source {}: {:#}", target, err);
    PipelineError::Connect {
        source_info: format!("{} ({})", target, chain_message(err)),
    }
}

/// Result of a successful blocking read.
#[derive(Debug)]
pub enum ReadOutcome {
    Frame(Frame),
    EndOfStream,
}

/// A live, connected source.
pub struct OpenSource {
    backend: Option<Box<dyn CaptureBackend>>,
    pending: Option<CapturedImage>,
    display_name: String,
    target: StreamTarget,
    frames_read: u64,
}

impl OpenSource {
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn target(&self) -> &StreamTarget {
        &self.target
    }

    /// Frames handed out so far in this connection.
    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    pub fn is_closed(&self) -> bool {
        self.backend.is_none()
    }

    /// Blocking read of the next frame. Indices start at 1.
    pub fn read(&mut self) -> Result<ReadOutcome, PipelineError> {
        let image = match self.pending.take() {
            Some(image) => image,
            None => {
                let backend = self
                    .backend
                    .as_mut()
                    .ok_or_else(|| PipelineError::Read("source is closed".to_string()))?;
                match backend.grab() {
                    Ok(Some(image)) => image,
                    Ok(None) => return Ok(ReadOutcome::EndOfStream),
                    Err(err) => return Err(PipelineError::Read(chain_message(&err))),
                }
            }
        };

        self.frames_read += 1;
        let frame = Frame::new(image.pixels, image.width, image.height, self.frames_read)
            .map_err(|err| PipelineError::Read(chain_message(&err)))?;
        Ok(ReadOutcome::Frame(frame))
    }

    /// Release the backend. Safe to call any number of times.
    pub fn close(&mut self) {
        self.pending = None;
        if let Some(mut backend) = self.backend.take() {
            backend.release();
            log::debug!("source {} released", self.display_name);
        }
    }
}

impl Drop for OpenSource {
    fn drop(&mut self) {
        self.close();
    }
}
