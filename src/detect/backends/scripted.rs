use anyhow::{anyhow, Result};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::detect::backend::DetectorBackend;
use crate::detect::result::Detection;
use crate::frame::Frame;

/// Replays a fixed script of per-call results.
///
/// Each `detect` call pops the next entry; once the script runs out every call
/// returns no detections. The index of every frame seen is recorded.
pub struct ScriptedBackend {
    script: VecDeque<Result<Vec<Detection>, String>>,
    seen: Arc<Mutex<Vec<u64>>>,
}

impl ScriptedBackend {
    pub fn new(script: Vec<Vec<Detection>>) -> Self {
        Self::with_faults(script.into_iter().map(Ok).collect())
    }

    /// Script entries that are `Err` make the matching call fail.
    pub fn with_faults(script: Vec<Result<Vec<Detection>, String>>) -> Self {
        Self {
            script: script.into(),
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Shared handle to the frame indices passed to `detect`, in call order.
    pub fn seen_frames(&self) -> Arc<Mutex<Vec<u64>>> {
        self.seen.clone()
    }
}

impl DetectorBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        self.seen
            .lock()
            .map_err(|_| anyhow!("scripted backend call log poisoned"))?
            .push(frame.index());
        match self.script.pop_front() {
            Some(Ok(detections)) => Ok(detections),
            Some(Err(reason)) => Err(anyhow!(reason)),
            None => Ok(Vec::new()),
        }
    }
}
