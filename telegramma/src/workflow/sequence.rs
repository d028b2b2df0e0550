//! Ordered composition of steps.
//!
//! Sequences are built left to right with [`Steps::start`] and
//! [`SequenceExt::then`]; the type system checks that every step accepts
//! what the previous one produces.

use super::step::{Step, StepResult};
use crate::observability::SpanTimer;
use crate::transcript::Progress;
use async_trait::async_trait;
use tracing::{debug, info_span, warn, Instrument};

/// An ordered list of steps that can be driven from an input.
#[async_trait]
pub trait Sequence<I: Send + 'static>: Send + Sync {
    /// Value produced by the last step.
    type Output: Send + 'static;

    /// Runs the steps in order, stopping at the first abort.
    async fn drive(&self, input: I, progress: &mut Progress) -> StepResult<Self::Output>;

    /// Names of the steps, in execution order.
    fn step_names(&self) -> Vec<String>;
}

/// A sequence holding one step.
#[derive(Debug)]
pub struct Single<S>(S);

/// Two sequences run back to back.
#[derive(Debug)]
pub struct Then<A, B> {
    first: A,
    second: B,
}

/// Entry point for building sequences.
#[derive(Debug, Clone, Copy)]
pub struct Steps;

impl Steps {
    /// Starts a sequence with its first step.
    pub fn start<S>(step: S) -> Single<S> {
        Single(step)
    }
}

#[async_trait]
impl<I, S> Sequence<I> for Single<S>
where
    I: Send + 'static,
    S: Step<I>,
{
    type Output = S::Output;

    async fn drive(&self, input: I, progress: &mut Progress) -> StepResult<S::Output> {
        let step = &self.0;

        if let Some(status) = step.status() {
            progress.append(status).await;
        }

        let span = info_span!("step", step = step.name());
        async move {
            let timer = SpanTimer::start(step.name());
            let result = step.run(input, progress).await;
            let duration_ms = timer.finish();

            match &result {
                StepResult::Continue(_) => debug!(duration_ms, "Step completed"),
                StepResult::Abort(reason) => warn!(
                    duration_ms,
                    collaborator = %reason.collaborator,
                    reason = %reason.message,
                    "Step aborted"
                ),
            }
            result
        }
        .instrument(span)
        .await
    }

    fn step_names(&self) -> Vec<String> {
        vec![self.0.name().to_string()]
    }
}

#[async_trait]
impl<I, A, B> Sequence<I> for Then<A, B>
where
    I: Send + 'static,
    A: Sequence<I>,
    B: Sequence<A::Output>,
{
    type Output = B::Output;

    async fn drive(&self, input: I, progress: &mut Progress) -> StepResult<B::Output> {
        match self.first.drive(input, progress).await {
            StepResult::Continue(value) => self.second.drive(value, progress).await,
            StepResult::Abort(reason) => StepResult::Abort(reason),
        }
    }

    fn step_names(&self) -> Vec<String> {
        let mut names = self.first.step_names();
        names.extend(self.second.step_names());
        names
    }
}

/// Builder methods available on every sequence.
pub trait SequenceExt<I: Send + 'static>: Sequence<I> + Sized {
    /// Appends a step that consumes this sequence's output.
    fn then<S>(self, step: S) -> Then<Self, Single<S>>
    where
        S: Step<Self::Output>,
    {
        Then {
            first: self,
            second: Single(step),
        }
    }
}

impl<I: Send + 'static, Q: Sequence<I>> SequenceExt<I> for Q {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Collaborator;
    use crate::transcript::CollectingTranscriptSink;
    use crate::workflow::FnStep;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug)]
    struct Parse;

    #[async_trait]
    impl Step<String> for Parse {
        type Output = u32;

        fn name(&self) -> &str {
            "parse"
        }

        fn status(&self) -> Option<&str> {
            Some("Parsing...")
        }

        async fn run(&self, input: String, progress: &mut Progress) -> StepResult<u32> {
            match input.parse() {
                Ok(value) => StepResult::Continue(value),
                Err(_) => {
                    progress.warn("not a number").await;
                    StepResult::abort(Collaborator::Generator, "Parse failed")
                }
            }
        }
    }

    #[tokio::test]
    async fn test_sequence_passes_values_along() {
        let sink = Arc::new(CollectingTranscriptSink::new());
        let mut progress = Progress::new(sink.clone());

        let double = FnStep::new("double", |x: u32| async move { StepResult::Continue(x * 2) });
        let describe = FnStep::new("describe", |x: u32| async move {
            StepResult::Continue(format!("got {x}"))
        })
        .with_status("Describing...");
        let steps = Steps::start(Parse).then(double).then(describe);

        assert_eq!(steps.step_names(), vec!["parse", "double", "describe"]);

        let result = steps.drive("21".to_string(), &mut progress).await;
        assert_eq!(result, StepResult::Continue("got 42".to_string()));
        assert_eq!(
            progress.transcript().lines(),
            &["Parsing...".to_string(), "Describing...".to_string()]
        );
    }

    #[tokio::test]
    async fn test_sequence_stops_at_first_abort() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut progress = Progress::new(Arc::new(CollectingTranscriptSink::new()));

        let steps = Steps::start(Parse).then(
            FnStep::new("count", move |x: u32| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    StepResult::Continue(x)
                }
            })
            .with_status("Counting..."),
        );

        let result = steps.drive("nope".to_string(), &mut progress).await;

        assert!(matches!(result, StepResult::Abort(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            progress.transcript().lines(),
            &["Parsing...".to_string(), "Warning: not a number".to_string()]
        );
    }
}
