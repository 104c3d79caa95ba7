use anyhow::{anyhow, Result};

use crate::config::CounterConfig;
use crate::detect::backend::DetectorBackend;

pub mod scripted;
pub mod stub;

#[cfg(feature = "backend-tract")]
pub mod tract;

pub use scripted::ScriptedBackend;
pub use stub::StubBackend;

#[cfg(feature = "backend-tract")]
pub use tract::TractBackend;

/// Build the backend named in the configuration.
pub fn build_backend(config: &CounterConfig) -> Result<Box<dyn DetectorBackend>> {
    match config.detector.as_str() {
        "stub" => Ok(Box::new(StubBackend::new())),
        #[cfg(feature = "backend-tract")]
        "tract" => Ok(Box::new(
            TractBackend::new(&config.model_path)?.with_threshold(config.confidence_threshold),
        )),
        #[cfg(not(feature = "backend-tract"))]
        "tract" => Err(anyhow!(
            "detector 'tract' requires the backend-tract feature (model {})",
            config.model_path.display()
        )),
        other => Err(anyhow!("unknown detector backend '{}'", other)),
    }
}
