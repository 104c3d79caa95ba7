//! Failure taxonomy for a detection run.
//!
//! Resolution and connect failures abort a run before any resource is held.
//! Read, detection and render faults end the current run after the source has
//! been released. Persistence failures are reported per frame and never end a run.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Remote stream extraction failed (auth, geo-block, extractor breakage).
    #[error("stream resolution failed: {reason}")]
    Resolution { reason: String },

    /// The source could not be opened or produced no first frame.
    #[error("cannot read from source {source_info}")]
    Connect { source_info: String },

    /// Mid-stream I/O fault. Distinct from a graceful end of stream.
    #[error("read error: {0}")]
    Read(String),

    /// The detector failed or returned malformed data.
    #[error("detection fault: {0}")]
    Detection(String),

    /// Writing the results log failed. Prior log content is left intact.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Invalid frame geometry or a display failure.
    #[error("render fault: {0}")]
    Render(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl PipelineError {
    /// True for faults that end a run after it reached `Running`.
    pub fn is_mid_run_fault(&self) -> bool {
        matches!(
            self,
            PipelineError::Read(_) | PipelineError::Detection(_) | PipelineError::Render(_)
        )
    }
}

/// Flatten an `anyhow` chain into a single line for the string-carrying variants.
pub(crate) fn chain_message(err: &anyhow::Error) -> String {
    format!("{:#}", err)
}
