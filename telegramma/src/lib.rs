//! # Telegramma
//!
//! Chat bot modules built around a linear workflow executor.
//!
//! - **Workflows**: ordered steps whose progress is shown to the requester
//!   as a single, continuously edited chat message
//! - **twrpdtgen**: turns a recovery image URL into a TWRP device tree
//!   repository on GitHub
//! - **ci**: queues CI jobs and runs them in the background
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use telegramma::prelude::*;
//!
//! let steps = Steps::start(FetchStep::new()).then(BuildStep::new());
//! let executor = WorkflowExecutor::new("build", steps);
//!
//! let sink = Arc::new(MessageTranscriptSink::replying_to(chat, &invocation.message));
//! let report = executor.execute(WorkflowContext::new(url, sink)).await;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod bot;
pub mod chat;
pub mod collaborators;
pub mod config;
pub mod errors;
pub mod module;
pub mod modules;
pub mod observability;
pub mod tasks;
pub mod testing;
pub mod transcript;
pub mod workflow;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::chat::{
        ChatId, ChatTransport, CommandInvocation, MessageRef, SendOptions, TelegramClient,
    };
    pub use crate::config::{BotConfig, CiConfig, TwrpdtgenConfig};
    pub use crate::errors::{
        Collaborator, CollaboratorError, ConfigurationError, TelegrammaError, UsageError,
    };
    pub use crate::module::{CommandHandler, ModuleDescriptor, ModuleRegistry};
    pub use crate::tasks::{TaskConsumer, TaskDispatcher, TaskQueue};
    pub use crate::transcript::{
        CollectingTranscriptSink, MessageTranscriptSink, Progress, TranscriptSink,
    };
    pub use crate::workflow::{
        Broadcast, Completion, FnStep, Outcome, SequenceExt, Step, StepResult, Steps,
        WorkflowContext, WorkflowExecutor, WorkflowReport,
    };
}
