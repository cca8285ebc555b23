use std::{future::Future, marker::PhantomData};

use anyhow::Result;

use crate::task::{PipelineConfig, Task};

/// Builds inference handles. Implemented by the binding to the inference library.
#[trait_variant::make(Send)]
pub trait Loader: Send + Sync + 'static {
    type Handle: InferenceHandle;

    /// Build a handle for `task`. May resolve immediately if the model is already cached.
    async fn load(&self, task: Task, config: &PipelineConfig) -> Result<Self::Handle>;
}

/// A ready-to-use inference pipeline.
///
/// The handle is shared between concurrent invocations, so it must synchronize itself if needed.
#[trait_variant::make(Send)]
pub trait InferenceHandle: Send + Sync + 'static {
    /// Payload the task consumes: text, an image reference, an audio buffer, etc.
    type Input: Send + 'static;
    type Output: Send + Sync + 'static;

    async fn invoke(&self, input: Self::Input) -> Result<Self::Output>;
}

/// A [`Loader`] built from a closure.
#[derive(Debug, Clone)]
pub struct FnLoader<F>(F);

impl<F> FnLoader<F> {
    pub fn new<Fut, H>(f: F) -> Self
    where
        F: Fn(Task, PipelineConfig) -> Fut,
        Fut: Future<Output = Result<H>>,
    {
        Self(f)
    }
}

impl<F, Fut, H> Loader for FnLoader<F>
where
    F: Fn(Task, PipelineConfig) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<H>> + Send,
    H: InferenceHandle,
{
    type Handle = H;

    async fn load(&self, task: Task, config: &PipelineConfig) -> Result<H> {
        (self.0)(task, config.clone()).await
    }
}

/// An [`InferenceHandle`] built from a closure.
pub struct FnHandle<F, I, O> {
    f: F,
    phantom: PhantomData<fn(I) -> O>,
}

impl<F, I, O> FnHandle<F, I, O> {
    pub fn new<Fut>(f: F) -> Self
    where
        F: Fn(I) -> Fut,
        Fut: Future<Output = Result<O>>,
    {
        let phantom = PhantomData;
        Self { f, phantom }
    }
}

impl<F, Fut, I, O> InferenceHandle for FnHandle<F, I, O>
where
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O>> + Send,
    I: Send + 'static,
    O: Send + Sync + 'static,
{
    type Input = I;
    type Output = O;

    async fn invoke(&self, input: I) -> Result<O> {
        (self.f)(input).await
    }
}
