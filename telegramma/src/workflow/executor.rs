//! Linear workflow executor.

use super::context::WorkflowContext;
use super::sequence::Sequence;
use super::step::StepResult;
use crate::observability::SpanTimer;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

/// Implemented by the value the last step produces.
pub trait Completion {
    /// Reference shown in the `Done, <reference>` line.
    fn reference(&self) -> String;

    /// Text for the success broadcast; `None` skips it.
    fn announcement(&self) -> Option<String> {
        None
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Every step succeeded.
    Completed {
        /// The result reference from the `Done` line.
        reference: String,
    },
    /// A step failed and the rest were skipped.
    Aborted {
        /// The user-facing reason from the `Error` line.
        reason: String,
    },
    /// No step ran because configuration was incomplete.
    Rejected {
        /// The user-facing reason from the `Error` line.
        reason: String,
    },
}

impl Outcome {
    /// Returns true if the run completed.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// Summary of a finished run.
#[derive(Debug, Clone)]
pub struct WorkflowReport {
    /// Run id, also recorded on the log span.
    pub run_id: Uuid,
    /// Every transcript line, in order.
    pub transcript: Vec<String>,
    /// How the run ended.
    pub outcome: Outcome,
    /// Wall time in milliseconds.
    pub duration_ms: f64,
}

impl WorkflowReport {
    /// Returns the terminal line.
    #[must_use]
    pub fn last_line(&self) -> Option<&str> {
        self.transcript.last().map(String::as_str)
    }
}

/// Runs a fixed sequence of steps against per-run contexts.
#[derive(Debug)]
pub struct WorkflowExecutor<Q> {
    name: String,
    steps: Q,
}

impl<Q> WorkflowExecutor<Q> {
    /// Creates a new executor.
    #[must_use]
    pub fn new(name: impl Into<String>, steps: Q) -> Self {
        Self {
            name: name.into(),
            steps,
        }
    }

    /// Returns the workflow name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Executes the steps in order.
    ///
    /// Each step's output feeds the next. The first abort appends its
    /// `Error:` line and ends the run; otherwise the run ends with
    /// `Done, <reference>` followed by the optional broadcast. A failed
    /// broadcast is logged and does not change the outcome.
    pub async fn execute<I>(&self, ctx: WorkflowContext<I>) -> WorkflowReport
    where
        I: Send + 'static,
        Q: Sequence<I>,
        Q::Output: Completion,
    {
        let (run_id, input, mut progress, broadcast) = ctx.into_parts();
        let span = info_span!("workflow", workflow = %self.name, %run_id);

        async move {
            let timer = SpanTimer::start(&self.name);
            info!(steps = ?self.steps.step_names(), "Workflow started");

            let (transcript, outcome, announcement) =
                match self.steps.drive(input, &mut progress).await {
                    StepResult::Continue(output) => {
                        let reference = output.reference();
                        let transcript = progress.done(&reference).await;
                        (transcript, Outcome::Completed { reference }, output.announcement())
                    }
                    StepResult::Abort(reason) => {
                        let transcript = progress.fail(&reason.message).await;
                        (
                            transcript,
                            Outcome::Aborted {
                                reason: reason.message,
                            },
                            None,
                        )
                    }
                };

            if let (Some(broadcast), Some(text)) = (broadcast.as_ref(), announcement) {
                if let Err(err) = broadcast.send(&text).await {
                    warn!(
                        error = %err,
                        destination = %broadcast.destination(),
                        "Failed to send broadcast"
                    );
                }
            }

            let duration_ms = timer.finish();
            info!(?outcome, duration_ms, lines = transcript.len(), "Workflow finished");

            WorkflowReport {
                run_id,
                transcript: transcript.into_lines(),
                outcome,
                duration_ms,
            }
        }
        .instrument(span)
        .await
    }
}
