use anyhow::Result;

use crate::detect::result::Detection;
use crate::frame::Frame;

/// Detector backend trait.
///
/// The pipeline relies on three properties:
/// - identical pixels and weights give identical output
/// - "nothing found" is an empty vector, not an error
/// - output may contain any class; person filtering happens in the pipeline
///
/// Backends are called from a single thread and need not be reentrant.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame. Boxes are in the frame's pixel coordinates.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
