use std::fmt;

use derive_getters::Getters;
use serde::{Deserialize, Serialize};

use crate::{
    error::PipelineError,
    task::{PipelineConfig, Task},
};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Status {
    #[default]
    Uninitialized,
    Loading,
    Ready,
    Failed,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Uninitialized => write!(f, "uninitialized"),
            Status::Loading => write!(f, "loading"),
            Status::Ready => write!(f, "ready"),
            Status::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionMarker;

/// Token identifying one `(task, config)` request.
/// Completions carry the token they were issued under and are dropped if it is no longer current.
pub type SessionId = uid::Id<SessionMarker>;

/// What a caller observes of a pipeline at one point in time.
#[derive(Debug, Clone, Getters)]
pub struct PipelineState<O> {
    session: SessionId,
    task: Task,
    config: PipelineConfig,
    status: Status,
    busy: bool,
    error: Option<PipelineError>,
    output: Option<O>,
}

impl<O> PipelineState<O> {
    pub(crate) fn new(task: Task, config: PipelineConfig) -> Self {
        Self {
            session: SessionId::new(),
            task,
            config,
            status: Status::Uninitialized,
            busy: false,
            error: None,
            output: None,
        }
    }

    #[inline]
    pub fn ready(&self) -> bool {
        self.status == Status::Ready
    }

    #[inline]
    pub fn loading(&self) -> bool {
        self.status == Status::Loading
    }

    #[inline]
    pub fn failed(&self) -> bool {
        self.status == Status::Failed
    }

    pub(crate) fn set_status(&mut self, status: Status) {
        self.status = status;
    }

    pub(crate) fn set_busy(&mut self, busy: bool) {
        self.busy = busy;
    }

    pub(crate) fn set_error(&mut self, error: Option<PipelineError>) {
        self.error = error;
    }

    pub(crate) fn set_output(&mut self, output: Option<O>) {
        self.output = output;
    }
}

#[cfg(test)]
mod tests {
    use super::{PipelineState, Status};
    use crate::task::{PipelineConfig, Task};

    #[test]
    fn test_new_session() {
        let first = PipelineState::<u32>::new(Task::TextGeneration, PipelineConfig::default());
        let second = PipelineState::<u32>::new(Task::TextGeneration, PipelineConfig::default());
        assert_ne!(first.session(), second.session());
        assert_eq!(*first.status(), Status::Uninitialized);
        assert!(!first.ready() && !first.loading() && !first.failed());
        assert!(!first.busy() && first.error().is_none() && first.output().is_none());
    }

    #[test]
    fn test_flags() {
        let mut state = PipelineState::<u32>::new(Task::FillMask, PipelineConfig::default());
        state.set_status(Status::Loading);
        assert!(state.loading());
        state.set_status(Status::Ready);
        state.set_output(Some(42));
        assert!(state.ready());
        assert_eq!(*state.output(), Some(42));
        state.set_status(Status::Failed);
        assert!(state.failed());
        assert_eq!(serde_json::to_string(state.status()).ok().as_deref(), Some("\"failed\""));
    }
}
