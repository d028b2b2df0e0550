//! Linear workflow execution.
//!
//! A workflow is a fixed sequence of [`Step`]s driven by a
//! [`WorkflowExecutor`]. Steps run in order, each one's output feeding the
//! next, and the first abort ends the run. Every run leaves behind a
//! transcript that ends in exactly one `Done, ` or `Error: ` line.

mod context;
mod executor;
mod sequence;
mod step;

pub use context::{Broadcast, WorkflowContext};
pub use executor::{Completion, Outcome, WorkflowExecutor, WorkflowReport};
pub use sequence::{Sequence, SequenceExt, Single, Steps, Then};
pub use step::{FnStep, Step, StepResult};
