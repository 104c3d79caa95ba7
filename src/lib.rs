//! Person Counter
//!
//! Streaming person detection over a single video source: resolve the source,
//! read frames one at a time, throttle them, detect people, draw an annotated
//! view and append one event per processed frame to a results log.
//!
//! # Pipeline
//!
//! `SourceResolver → SourceConnector → FrameSampler → DetectorBackend →
//! AnnotationRenderer + ResultLogger → DisplaySurface`, driven by
//! [`PipelineController`]. The controller is single-threaded; a run always ends
//! with the source and the display released, whether it finished, was quit, or
//! faulted.
//!
//! # Module Structure
//!
//! - `ingest`: source descriptors, stream extraction, capture backends
//! - `sampler`: width bound and frame-skip decimation
//! - `detect`: detection records, backend trait, person filter
//! - `render`: box labels and the status panel
//! - `results`: `DetectionEvent` persistence (JSON array or JSON lines)
//! - `display`: window and headless surfaces
//! - `pipeline`: run state machine

pub mod config;
pub mod detect;
pub mod display;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod pipeline;
pub mod render;
pub mod results;
pub mod sampler;

pub use config::CounterConfig;
pub use detect::{filter_persons, Detection, DetectorBackend};
pub use display::{DisplaySurface, HeadlessDisplay};
pub use error::PipelineError;
pub use frame::Frame;
pub use ingest::{ResolvedStream, SourceConnector, SourceDescriptor, SourceResolver};
pub use pipeline::{
    PipelineController, PipelineParts, PipelineState, RunEnd, RunReport, RunState,
};
pub use render::{AnnotatedFrame, AnnotationRenderer};
pub use results::{DetectionEvent, ResultFormat, ResultLogger, ResultStore};
pub use sampler::{FrameSampler, Sampled};
