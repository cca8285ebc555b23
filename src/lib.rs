//! Lifecycle controller for asynchronously loaded inference pipelines.
//!
//! A [`Pipeline`] loads an inference handle for a [`Task`] through a [`Loader`], tracks whether it
//! is loading, ready or failed, and runs inputs against it on the caller's behalf. Reconfiguring
//! starts a new session; whatever the superseded session still had in flight is discarded when it
//! resolves.
//!
//! ## Feature flags
#![doc = document_features::document_features!()]

pub mod error;
pub mod loader;
pub mod pipeline;
pub mod session;
pub mod task;

pub use error::{ErrorKind, PipelineError};
pub use loader::{FnHandle, FnLoader, InferenceHandle, Loader};
pub use pipeline::Pipeline;
pub use session::{PipelineState, SessionId, Status};
pub use task::{Device, Modality, PipelineConfig, Task};
