mod backend;
mod backends;
mod result;

pub use backend::DetectorBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use backends::{build_backend, ScriptedBackend, StubBackend};
pub use result::{filter_persons, Detection, PERSON_CLASS_ID};
