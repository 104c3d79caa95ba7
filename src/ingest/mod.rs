//! Source resolution and frame ingestion.
//!
//! This module turns user input into a live frame stream:
//! - `descriptor`: classify raw input and resolve it into an openable stream
//! - `resolver`: external extraction for platform-hosted video pages
//! - `connector`: open a capture backend and read frames with 1-frame buffering
//! - Synthetic `stub://` streams (testing and demos)
//! - Local files and remote URLs (feature: ingest-ffmpeg)
//! - USB/V4L2 cameras (feature: ingest-v4l2)
//!
//! Every backend decodes to RGB24 and hands frames over one at a time. Nothing
//! in this module stores frames or keeps them past the read that produced them.

pub mod connector;
pub mod descriptor;
#[cfg(feature = "ingest-ffmpeg")]
pub(crate) mod ffmpeg;
#[cfg(feature = "ingest-v4l2")]
mod normalize;
pub mod resolver;
pub mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

pub use connector::{
    BackendOpener, CaptureBackend, CapturedImage, OpenSource, ReadOutcome, SourceConnector,
    SystemOpener, INPUT_BUFFER_FRAMES,
};
pub use descriptor::{ResolvedStream, SourceDescriptor, SourceResolver, StreamTarget};
pub use resolver::{StreamResolver, YtDlpResolver};
pub use synthetic::{SyntheticCapture, SyntheticConfig};
