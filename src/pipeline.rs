use std::{any::Any, panic::AssertUnwindSafe, sync::Arc, task::Poll};

use anyhow::{anyhow, Result};
use futures::FutureExt;
use instant::{Duration, Instant};
use tokio::{
    sync::{oneshot, watch},
    task::{JoinError, JoinHandle},
};

use crate::{
    error::PipelineError,
    loader::{InferenceHandle, Loader},
    session::{PipelineState, SessionId, Status},
    task::{PipelineConfig, Task},
};

pub type Input<L> = <<L as Loader>::Handle as InferenceHandle>::Input;
pub type Output<L> = <<L as Loader>::Handle as InferenceHandle>::Output;

type State<L> = PipelineState<Output<L>>;

enum Command<I> {
    Configure {
        task: Task,
        config: PipelineConfig,
        force: bool,
        sender: oneshot::Sender<()>,
    },
    Run {
        input: I,
        sender: oneshot::Sender<()>,
    },
    Reset {
        sender: oneshot::Sender<()>,
    },
}

enum Completion<H: InferenceHandle> {
    Load {
        session: SessionId,
        result: Result<H>,
        elapsed: Duration,
    },
    Run {
        session: SessionId,
        result: Result<H::Output>,
        sender: oneshot::Sender<()>,
    },
}

/// Controls the lifecycle of one inference pipeline.
///
/// The pipeline state is owned by a background task. Loads and invocations run on their own tasks
/// and report back tagged with the [`SessionId`] they were issued under; reports for a session
/// that has since been superseded are dropped. Dropping the [`Pipeline`] stops the background
/// task, after which nothing is published anymore.
///
/// Requires a tokio runtime.
pub struct Pipeline<L: Loader> {
    command: flume::Sender<Command<Input<L>>>,
    state: watch::Receiver<State<L>>,
}

impl<L: Loader> Pipeline<L> {
    /// Create a pipeline and start loading `task`.
    ///
    /// Returns as soon as the load is issued, or already resolved if the loader answered at once.
    pub async fn new(loader: L, task: Task, config: PipelineConfig) -> Self {
        let (state_sender, state) = watch::channel(PipelineState::new(task, config.clone()));
        let (command, command_receiver) = flume::unbounded();
        let (completion, completion_receiver) = flume::unbounded();

        let controller = Controller {
            loader: Arc::new(loader),
            handle: None,
            session: *state.borrow().session(),
            running: 0,
            state: state_sender,
            completion,
        };
        let handle = tokio::spawn(controller.run(command_receiver, completion_receiver));
        tokio::spawn(async move {
            if let Err(err) = handle.await {
                log::error!("{}", err);
            }
        });

        let pipeline = Self { command, state };
        pipeline
            .request(|sender| Command::Configure {
                task,
                config,
                force: true,
                sender,
            })
            .await;
        pipeline
    }

    async fn request(&self, command: impl FnOnce(oneshot::Sender<()>) -> Command<Input<L>>) {
        let (sender, receiver) = oneshot::channel();
        let _ = self.command.send_async(command(sender)).await;
        let _ = receiver.await;
    }

    /// Switch to another task or configuration.
    ///
    /// A different pair discards the current session, including its outstanding load, and starts
    /// a new one. The same pair is a no-op unless the session failed, in which case it reloads.
    pub async fn configure(&self, task: Task, config: PipelineConfig) {
        self.request(|sender| Command::Configure {
            task,
            config,
            force: false,
            sender,
        })
        .await
    }

    /// Start a new session for the current task and configuration.
    pub async fn reload(&self) {
        let (task, config) = {
            let state = self.state.borrow();
            (*state.task(), state.config().clone())
        };
        self.request(|sender| Command::Configure {
            task,
            config,
            force: true,
            sender,
        })
        .await
    }

    /// Run inference on `input`.
    ///
    /// Resolves once the outcome is reflected in the state: the output on success, the error
    /// otherwise. Fails immediately with [`NotReady`](crate::ErrorKind::NotReady) if no handle
    /// has been loaded. Concurrent runs are not serialized.
    pub async fn run(&self, input: Input<L>) {
        self.request(|sender| Command::Run { input, sender }).await
    }

    /// Clear the output and the error. The loaded handle stays.
    pub async fn reset(&self) {
        self.request(|sender| Command::Reset { sender }).await
    }

    /// Receive every published state.
    pub fn subscribe(&self) -> watch::Receiver<State<L>> {
        self.state.clone()
    }

    #[inline]
    pub fn session(&self) -> SessionId {
        *self.state.borrow().session()
    }

    #[inline]
    pub fn status(&self) -> Status {
        *self.state.borrow().status()
    }

    #[inline]
    pub fn ready(&self) -> bool {
        self.state.borrow().ready()
    }

    #[inline]
    pub fn loading(&self) -> bool {
        self.state.borrow().loading()
    }

    #[inline]
    pub fn busy(&self) -> bool {
        *self.state.borrow().busy()
    }

    pub fn error(&self) -> Option<PipelineError> {
        self.state.borrow().error().clone()
    }
}

impl<L> Pipeline<L>
where
    L: Loader,
    Output<L>: Clone,
{
    pub fn state(&self) -> State<L> {
        self.state.borrow().clone()
    }

    pub fn output(&self) -> Option<Output<L>> {
        self.state.borrow().output().clone()
    }

    /// Wait until the state satisfies `f`, and return it.
    /// If the pipeline stops first, the last published state is returned.
    pub async fn wait_for(&self, mut f: impl FnMut(&State<L>) -> bool) -> State<L> {
        let mut receiver = self.state.clone();
        if let Ok(state) = receiver.wait_for(&mut f).await {
            return (*state).clone();
        }
        let state = receiver.borrow().clone();
        state
    }
}

struct Controller<L: Loader> {
    loader: Arc<L>,
    handle: Option<Arc<L::Handle>>,
    /// The current session. Completions issued under any other token are stale.
    session: SessionId,
    /// Number of outstanding runs in the current session.
    running: usize,
    state: watch::Sender<State<L>>,
    completion: flume::Sender<Completion<L::Handle>>,
}

impl<L: Loader> Controller<L> {
    async fn run(
        mut self,
        commands: flume::Receiver<Command<Input<L>>>,
        completions: flume::Receiver<Completion<L::Handle>>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv_async() => match command {
                    Ok(command) => self.command(command).await,
                    Err(_) => break,
                },
                Ok(completion) = completions.recv_async() => self.complete(completion),
            }
        }
        log::info!("pipeline session {} destroyed", self.session);
    }

    async fn command(&mut self, command: Command<Input<L>>) {
        match command {
            Command::Configure {
                task,
                config,
                force,
                sender,
            } => {
                let unchanged = {
                    let state = self.state.borrow();
                    *state.task() == task && *state.config() == config && !state.failed()
                };
                if force || !unchanged {
                    self.load(task, config).await;
                }
                let _ = sender.send(());
            }
            Command::Run { input, sender } => self.invoke(input, sender),
            Command::Reset { sender } => {
                self.state.send_modify(|state| {
                    state.set_output(None);
                    state.set_error(None);
                });
                let _ = sender.send(());
            }
        }
    }

    async fn load(&mut self, task: Task, config: PipelineConfig) {
        let mut state = PipelineState::new(task, config.clone());
        let session = *state.session();
        self.session = session;
        self.handle = None;
        self.running = 0;

        log::info!(
            "session {session}: loading {task} (model: {}, device: {})",
            config.model.as_deref().unwrap_or("default"),
            config.device
        );

        let loader = self.loader.clone();
        let start = Instant::now();
        let future = async move {
            let result = loader.load(task, &config).await;
            (result, start.elapsed())
        };
        #[cfg(feature = "trace")]
        let future = tracing::Instrument::instrument(
            future,
            tracing::trace_span!("load", task = %task),
        );
        let mut future = Box::pin(future);

        // a cached model may resolve on the first poll; settle it without showing a loading state
        let mut first = AssertUnwindSafe(future.as_mut()).catch_unwind();
        match futures::poll!(first) {
            Poll::Ready(Ok((result, elapsed))) => {
                self.handle = settle_load(&mut state, result, elapsed);
                self.state.send_replace(state);
                return;
            }
            Poll::Ready(Err(payload)) => {
                let err = panic_error(payload);
                log::error!("session {session}: load {err}");
                self.handle = settle_load(&mut state, Err(err), start.elapsed());
                self.state.send_replace(state);
                return;
            }
            Poll::Pending => {}
        }

        state.set_status(Status::Loading);
        self.state.send_replace(state);

        let completion = self.completion.clone();
        let handle = tokio::spawn(future);
        tokio::spawn(async move {
            let (result, elapsed) = match handle.await {
                Ok(output) => output,
                Err(err) => {
                    let err = join_error(err);
                    log::error!("session {session}: load {err}");
                    (Err(err), start.elapsed())
                }
            };
            let _ = completion.send(Completion::Load {
                session,
                result,
                elapsed,
            });
        });
    }

    fn invoke(&mut self, input: Input<L>, sender: oneshot::Sender<()>) {
        let Some(handle) = self.handle.clone() else {
            let status = *self.state.borrow().status();
            log::warn!("session {}: run rejected, pipeline is {status}", self.session);
            self.state
                .send_modify(|state| state.set_error(Some(PipelineError::not_ready(status))));
            let _ = sender.send(());
            return;
        };

        self.running += 1;
        self.state.send_modify(|state| {
            state.set_busy(true);
            state.set_error(None);
        });

        let session = self.session;
        let completion = self.completion.clone();
        let future = async move { handle.invoke(input).await };
        #[cfg(feature = "trace")]
        let future = tracing::Instrument::instrument(future, tracing::trace_span!("run"));
        let handle: JoinHandle<Result<Output<L>>> = tokio::spawn(future);
        tokio::spawn(async move {
            let result = match handle.await {
                Ok(result) => result,
                Err(err) => {
                    let err = join_error(err);
                    log::error!("session {session}: run {err}");
                    Err(err)
                }
            };
            let _ = completion.send(Completion::Run {
                session,
                result,
                sender,
            });
        });
    }

    fn complete(&mut self, completion: Completion<L::Handle>) {
        match completion {
            Completion::Load {
                session,
                result,
                elapsed,
            } => {
                if session != self.session {
                    log::debug!("session {session}: discarded stale load");
                    return;
                }
                let handle = &mut self.handle;
                self.state
                    .send_modify(|state| *handle = settle_load(state, result, elapsed));
            }
            Completion::Run {
                session,
                result,
                sender,
            } => {
                if session != self.session {
                    log::debug!("session {session}: discarded stale run");
                    let _ = sender.send(());
                    return;
                }
                self.running = self.running.saturating_sub(1);
                let busy = self.running > 0;
                self.state.send_modify(|state| {
                    state.set_busy(busy);
                    match result {
                        Ok(output) => state.set_output(Some(output)),
                        Err(err) => {
                            log::warn!("session {session}: run failed: {err}");
                            state.set_error(Some(PipelineError::invoke(err)));
                        }
                    }
                });
                let _ = sender.send(());
            }
        }
    }
}

fn panic_error(payload: Box<dyn Any + Send>) -> anyhow::Error {
    let message = payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown cause");
    anyhow!("panicked: {message}")
}

fn join_error(err: JoinError) -> anyhow::Error {
    match err.try_into_panic() {
        Ok(payload) => panic_error(payload),
        Err(err) => err.into(),
    }
}

/// Apply the outcome of a load to `state`, returning the handle on success.
fn settle_load<H: InferenceHandle>(
    state: &mut PipelineState<H::Output>,
    result: Result<H>,
    elapsed: Duration,
) -> Option<Arc<H>> {
    let session = *state.session();
    match result {
        Ok(handle) => {
            log::info!("session {session}: {} ready in {elapsed:?}", state.task());
            state.set_status(Status::Ready);
            state.set_error(None);
            Some(Arc::new(handle))
        }
        Err(err) => {
            log::warn!("session {session}: failed to load {}: {err}", state.task());
            state.set_status(Status::Failed);
            state.set_error(Some(PipelineError::load(err)));
            None
        }
    }
}
