use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::Status;

/// Discriminant of a [`PipelineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Building the inference handle failed. Only a new session recovers from this.
    LoadFailure,
    /// An invocation was attempted before the session became ready.
    NotReady,
    /// The handle rejected an input. The session stays ready.
    InvocationFailure,
    /// The task identifier is not in the supported set.
    UnsupportedTask,
    /// A configuration document could not be parsed.
    InvalidConfig,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::LoadFailure => write!(f, "load failure"),
            ErrorKind::NotReady => write!(f, "not ready"),
            ErrorKind::InvocationFailure => write!(f, "invocation failure"),
            ErrorKind::UnsupportedTask => write!(f, "unsupported task"),
            ErrorKind::InvalidConfig => write!(f, "invalid config"),
        }
    }
}

/// A failure surfaced to the caller: a kind tag plus the message to render.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct PipelineError {
    kind: ErrorKind,
    message: String,
}

impl PipelineError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        Self { kind, message }
    }

    /// Wrap a rejection from the loader.
    pub fn load(err: anyhow::Error) -> Self {
        Self::new(ErrorKind::LoadFailure, err.to_string())
    }

    /// Wrap a rejection from the inference handle.
    pub fn invoke(err: anyhow::Error) -> Self {
        Self::new(ErrorKind::InvocationFailure, err.to_string())
    }

    pub fn not_ready(status: Status) -> Self {
        Self::new(ErrorKind::NotReady, format!("pipeline is not ready ({status})"))
    }

    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl PartialEq<str> for PipelineError {
    fn eq(&self, other: &str) -> bool {
        self.message == other
    }
}

impl PartialEq<&str> for PipelineError {
    fn eq(&self, other: &&str) -> bool {
        self.message == *other
    }
}
