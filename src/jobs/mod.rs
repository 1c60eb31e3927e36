//! Entry-point registry: maps job specs to concrete submission requests.

mod registry;

pub use registry::{JobDriver, JobRegistry, JobRequest, SubmitContext};
