//! Step trait and step results.

use crate::errors::{Collaborator, CollaboratorError};
use crate::transcript::Progress;
use async_trait::async_trait;
use std::fmt::Debug;
use std::future::Future;
use std::marker::PhantomData;

/// Outcome of one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepResult<T> {
    /// The step succeeded; the value is handed to the next step.
    Continue(T),
    /// The step failed; the workflow stops here.
    Abort(CollaboratorError),
}

impl<T> StepResult<T> {
    /// Creates an abort from a collaborator and a user-facing message.
    #[must_use]
    pub fn abort(collaborator: Collaborator, message: impl Into<String>) -> Self {
        Self::Abort(CollaboratorError::new(collaborator, message))
    }
}

/// One unit of work in a workflow.
///
/// A step consumes the value produced by the previous step (or the workflow
/// input) and produces the value for the next one. It may append warning
/// lines through `progress`; terminal lines are the executor's job.
#[async_trait]
pub trait Step<I: Send + 'static>: Send + Sync + Debug {
    /// Value handed to the next step.
    type Output: Send + 'static;

    /// Returns the name of the step, used in logs.
    fn name(&self) -> &str;

    /// Status line appended when the step starts, e.g. `Pushing...`.
    ///
    /// Steps returning `None` run without announcing themselves.
    fn status(&self) -> Option<&str> {
        None
    }

    /// Runs the step.
    async fn run(&self, input: I, progress: &mut Progress) -> StepResult<Self::Output>;
}

/// A step backed by an async closure.
///
/// The closure cannot touch the transcript, which makes this a fit for
/// single-call steps such as enqueueing a job.
pub struct FnStep<F, I, O> {
    name: String,
    status: Option<String>,
    func: F,
    _marker: PhantomData<fn(I) -> O>,
}

impl<F, Fut, I, O> FnStep<F, I, O>
where
    F: Fn(I) -> Fut + Send + Sync,
    Fut: Future<Output = StepResult<O>> + Send,
{
    /// Creates a new closure step.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            status: None,
            func,
            _marker: PhantomData,
        }
    }

    /// Sets the status line announced when the step starts.
    #[must_use]
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }
}

impl<F, I, O> Debug for FnStep<F, I, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStep")
            .field("name", &self.name)
            .field("status", &self.status)
            .finish()
    }
}

#[async_trait]
impl<F, Fut, I, O> Step<I> for FnStep<F, I, O>
where
    F: Fn(I) -> Fut + Send + Sync,
    Fut: Future<Output = StepResult<O>> + Send + 'static,
    I: Send + 'static,
    O: Send + 'static,
{
    type Output = O;

    fn name(&self) -> &str {
        &self.name
    }

    fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    async fn run(&self, input: I, _progress: &mut Progress) -> StepResult<O> {
        (self.func)(input).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::CollectingTranscriptSink;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_fn_step() {
        let step = FnStep::new("double", |x: u32| async move { StepResult::Continue(x * 2) })
            .with_status("Doubling...");

        assert_eq!(step.name(), "double");
        assert_eq!(step.status(), Some("Doubling..."));

        let sink = Arc::new(CollectingTranscriptSink::new());
        let mut progress = Progress::new(sink.clone());
        let result = step.run(21, &mut progress).await;
        assert_eq!(result, StepResult::Continue(42));
        // Closure steps never write to the transcript themselves.
        assert!(progress.transcript().is_empty());
        assert!(sink.is_empty());
    }

    #[test]
    fn test_abort_carries_collaborator_and_message() {
        let aborted: StepResult<u8> =
            StepResult::abort(Collaborator::Download, "Failed to download file");

        assert_eq!(
            aborted,
            StepResult::Abort(CollaboratorError::new(
                Collaborator::Download,
                "Failed to download file"
            ))
        );
    }
}
