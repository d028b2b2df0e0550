//! `/ci <project> [arguments...]`: queue a CI job and run it in the
//! background.
//!
//! The command only enqueues the job; the consumer registered under the
//! `ci` task type runs it and reports progress in a new message replying to
//! the original command.

mod runner;

pub use runner::{CiRunError, CiRunner, ProcessCiRunner};

#[cfg(test)]
pub use runner::MockCiRunner;

use crate::chat::{BotCommand, ChatId, ChatTransport, CommandInvocation, MessageRef, SendOptions};
use crate::config::CiConfig;
use crate::errors::{Collaborator, ConfigurationError, TelegrammaError, UsageError};
use crate::module::{CommandHandler, ModuleDescriptor};
use crate::tasks::{QueuedTask, TaskConsumer, TaskError, TaskQueue};
use crate::transcript::{MessageTranscriptSink, Progress, TranscriptSink};
use crate::workflow::{
    Completion, FnStep, Outcome, Step, StepResult, Steps, WorkflowContext, WorkflowExecutor,
    WorkflowReport,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

/// Module name.
pub const NAME: &str = "ci";
/// Module version.
pub const VERSION: &str = "1.0";
/// Task type of queued CI jobs.
pub const TASK_TYPE: &str = "ci";
/// Argument synopsis shown in the usage reply.
pub const SYNOPSIS: &str = "<project> [arguments...]";

/// A queued CI job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CiJob {
    /// Project to build.
    pub project: String,
    /// Extra arguments for the build script.
    pub args: Vec<String>,
    /// Chat that requested the job.
    pub chat: ChatId,
    /// Message carrying the request.
    pub message_id: i64,
}

impl CiJob {
    /// Builds a job from an invocation, or `None` without a project.
    #[must_use]
    pub fn from_invocation(invocation: &CommandInvocation) -> Option<Self> {
        let (project, args) = invocation.args.split_first()?;
        Some(Self {
            project: project.clone(),
            args: args.to_vec(),
            chat: invocation.chat().clone(),
            message_id: invocation.message.message_id,
        })
    }

    fn request(&self) -> MessageRef {
        MessageRef::new(self.chat.clone(), self.message_id)
    }
}

/// A job accepted by the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuedJob {
    /// Task id of the job.
    pub id: Uuid,
}

impl Completion for QueuedJob {
    fn reference(&self) -> String {
        format!("queued CI job {}", self.id)
    }
}

/// A job whose build succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltProject {
    /// Built project.
    pub project: String,
}

impl Completion for BuiltProject {
    fn reference(&self) -> String {
        format!("{} built successfully", self.project)
    }
}

/// Returns the module descriptor.
#[must_use]
pub fn register(
    config: &CiConfig,
    queue: TaskQueue,
    runner: Arc<dyn CiRunner>,
    chat: Arc<dyn ChatTransport>,
) -> ModuleDescriptor {
    ModuleDescriptor::new(NAME, VERSION)
        .with_command(
            BotCommand::new(NAME, "Start a CI job"),
            Arc::new(CiHandler::new(config, queue, chat.clone())),
        )
        .with_task_type(TASK_TYPE, Arc::new(CiTaskConsumer::new(runner, chat)))
}

/// Handler of `/ci`.
pub struct CiHandler {
    chat: Arc<dyn ChatTransport>,
    queue: TaskQueue,
    ready: Result<(), ConfigurationError>,
}

impl std::fmt::Debug for CiHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CiHandler")
            .field("configured", &self.ready.is_ok())
            .finish_non_exhaustive()
    }
}

impl CiHandler {
    /// Creates the handler.
    #[must_use]
    pub fn new(config: &CiConfig, queue: TaskQueue, chat: Arc<dyn ChatTransport>) -> Self {
        Self {
            chat,
            queue,
            ready: config.script().map(|_| ()),
        }
    }

    /// Enqueues a job, reporting through `sink`.
    pub async fn run(&self, job: CiJob, sink: Arc<dyn TranscriptSink>) -> WorkflowReport {
        let ctx = WorkflowContext::new(job, sink);
        if let Err(err) = &self.ready {
            return ctx.reject(err).await;
        }

        let queue = self.queue.clone();
        let enqueue = FnStep::new("enqueue", move |job: CiJob| {
            let result = queue.enqueue(TASK_TYPE, &job);
            async move {
                match result {
                    Ok(id) => StepResult::Continue(QueuedJob { id }),
                    Err(err) => {
                        error!(error = %err, project = %job.project, "Failed to queue CI job");
                        StepResult::abort(Collaborator::TaskQueue, "Failed to queue CI job")
                    }
                }
            }
        })
        .with_status("Queueing CI job...");

        WorkflowExecutor::new(NAME, Steps::start(enqueue))
            .execute(ctx)
            .await
    }
}

#[async_trait]
impl CommandHandler for CiHandler {
    async fn handle(&self, invocation: CommandInvocation) -> Result<(), TelegrammaError> {
        let Some(job) = CiJob::from_invocation(&invocation) else {
            let usage = UsageError::new(NAME, SYNOPSIS);
            self.chat
                .send_message(
                    invocation.chat(),
                    &usage.to_string(),
                    SendOptions::new().reply_to(invocation.message.message_id),
                )
                .await?;
            return Ok(());
        };

        let sink = Arc::new(MessageTranscriptSink::replying_to(
            self.chat.clone(),
            &invocation.message,
        ));
        let report = self.run(job, sink).await;
        info!(run_id = %report.run_id, outcome = ?report.outcome, "CI job request finished");
        Ok(())
    }
}

/// Runs queued CI jobs.
pub struct CiTaskConsumer {
    runner: Arc<dyn CiRunner>,
    chat: Arc<dyn ChatTransport>,
}

impl std::fmt::Debug for CiTaskConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CiTaskConsumer").finish_non_exhaustive()
    }
}

impl CiTaskConsumer {
    /// Creates the consumer.
    #[must_use]
    pub fn new(runner: Arc<dyn CiRunner>, chat: Arc<dyn ChatTransport>) -> Self {
        Self { runner, chat }
    }

    /// Runs one job, reporting through `sink`.
    pub async fn run(&self, job: CiJob, sink: Arc<dyn TranscriptSink>) -> WorkflowReport {
        let build = RunJob::new(self.runner.clone(), &job);

        WorkflowExecutor::new(TASK_TYPE, Steps::start(build))
            .execute(WorkflowContext::new(job, sink))
            .await
    }
}

/// Runs the build script of one job.
struct RunJob {
    runner: Arc<dyn CiRunner>,
    status: String,
}

impl std::fmt::Debug for RunJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunJob")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

impl RunJob {
    fn new(runner: Arc<dyn CiRunner>, job: &CiJob) -> Self {
        Self {
            runner,
            status: format!("Running CI job for {}...", job.project),
        }
    }
}

#[async_trait]
impl Step<CiJob> for RunJob {
    type Output = BuiltProject;

    fn name(&self) -> &str {
        "build"
    }

    fn status(&self) -> Option<&str> {
        Some(&self.status)
    }

    async fn run(&self, job: CiJob, _progress: &mut Progress) -> StepResult<BuiltProject> {
        match self.runner.run(&job).await {
            Ok(()) => StepResult::Continue(BuiltProject {
                project: job.project,
            }),
            Err(CiRunError::Exit(status)) => StepResult::abort(
                Collaborator::CiRunner,
                format!("CI job failed with {status}"),
            ),
            Err(err) => {
                error!(error = %err, project = %job.project, "Failed to start CI job");
                StepResult::abort(Collaborator::CiRunner, "Failed to start CI job")
            }
        }
    }
}

#[async_trait]
impl TaskConsumer for CiTaskConsumer {
    async fn consume(&self, task: QueuedTask) -> Result<(), TaskError> {
        let job: CiJob = task.decode()?;
        let sink = Arc::new(MessageTranscriptSink::replying_to(
            self.chat.clone(),
            &job.request(),
        ));

        let report = self.run(job, sink).await;
        match report.outcome {
            Outcome::Completed { .. } => Ok(()),
            Outcome::Aborted { reason } | Outcome::Rejected { reason } => {
                Err(TaskError::Failed(reason))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::MockChatTransport;
    use crate::tasks::TaskDispatcher;
    use crate::testing::{ChatEvent, RecordingChat};
    use crate::transcript::CollectingTranscriptSink;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn configured() -> CiConfig {
        CiConfig {
            script: Some(PathBuf::from("/opt/ci/build.sh")),
            working_dir: None,
        }
    }

    fn invocation(args: &[&str]) -> CommandInvocation {
        CommandInvocation::new(
            "ci",
            args.iter().map(|a| (*a).to_string()).collect(),
            MessageRef::new(ChatId::from(42_i64), 7),
        )
    }

    #[tokio::test]
    async fn test_enqueue_reports_job_id() {
        let (queue, mut dispatcher) = TaskDispatcher::new();
        let handler = CiHandler::new(&configured(), queue, Arc::new(MockChatTransport::new()));
        let job = CiJob::from_invocation(&invocation(&["twrp", "--clean"])).unwrap();

        let report = handler
            .run(job.clone(), Arc::new(CollectingTranscriptSink::new()))
            .await;

        let Outcome::Completed { reference } = &report.outcome else {
            panic!("unexpected outcome: {:?}", report.outcome);
        };
        assert_eq!(report.transcript[0], "Queueing CI job...");
        assert_eq!(report.transcript[1], format!("Done, {reference}"));
        assert!(reference.starts_with("queued CI job "));

        // The queued task carries the job.
        drop(handler);
        let mut runner = MockCiRunner::new();
        let expected = job.clone();
        runner
            .expect_run()
            .withf(move |queued| *queued == expected)
            .times(1)
            .returning(|_| Ok(()));
        let mut chat = MockChatTransport::new();
        chat.expect_send_message()
            .returning(|chat, _, _| Ok(MessageRef::new(chat.clone(), 100)));
        chat.expect_edit_message().returning(|_, _, _| Ok(()));
        dispatcher
            .register(
                TASK_TYPE,
                Arc::new(CiTaskConsumer::new(Arc::new(runner), Arc::new(chat))),
            )
            .unwrap();
        dispatcher.run().await;
    }

    #[tokio::test]
    async fn test_missing_script_rejects() {
        let (queue, _dispatcher) = TaskDispatcher::new();
        let handler =
            CiHandler::new(&CiConfig::default(), queue, Arc::new(MockChatTransport::new()));
        let job = CiJob::from_invocation(&invocation(&["twrp"])).unwrap();

        let report = handler
            .run(job, Arc::new(CollectingTranscriptSink::new()))
            .await;

        assert_eq!(report.transcript, vec!["Error: Missing configuration".to_string()]);
    }

    #[tokio::test]
    async fn test_closed_queue_aborts() {
        let (queue, dispatcher) = TaskDispatcher::new();
        drop(dispatcher);
        let handler = CiHandler::new(&configured(), queue, Arc::new(MockChatTransport::new()));
        let job = CiJob::from_invocation(&invocation(&["twrp"])).unwrap();

        let report = handler
            .run(job, Arc::new(CollectingTranscriptSink::new()))
            .await;

        assert_eq!(report.last_line(), Some("Error: Failed to queue CI job"));
    }

    #[tokio::test]
    async fn test_usage_reply() {
        let mut chat = MockChatTransport::new();
        chat.expect_send_message()
            .withf(|_, text, options| {
                text == "Usage: /ci <project> [arguments...]" && options.reply_to == Some(7)
            })
            .times(1)
            .returning(|chat, _, _| Ok(MessageRef::new(chat.clone(), 8)));
        let (queue, _dispatcher) = TaskDispatcher::new();
        let handler = CiHandler::new(&configured(), queue, Arc::new(chat));

        handler.handle(invocation(&[])).await.unwrap();
    }

    #[tokio::test]
    async fn test_consumer_success_and_failure_lines() {
        let mut runner = MockCiRunner::new();
        runner
            .expect_run()
            .withf(|job| job.project == "twrp")
            .returning(|_| Ok(()));
        runner
            .expect_run()
            .withf(|job| job.project == "lineage")
            .returning(|_| Err(CiRunError::Exit("exit status: 2".to_string())));
        runner
            .expect_run()
            .withf(|job| job.project == "kernel")
            .returning(|_| Err(CiRunError::NotConfigured));
        let consumer = CiTaskConsumer::new(Arc::new(runner), Arc::new(MockChatTransport::new()));

        let job = |project: &str| CiJob {
            project: project.to_string(),
            args: vec![],
            chat: ChatId::new("42"),
            message_id: 7,
        };

        let report = consumer
            .run(job("twrp"), Arc::new(CollectingTranscriptSink::new()))
            .await;
        assert_eq!(
            report.transcript,
            vec![
                "Running CI job for twrp...".to_string(),
                "Done, twrp built successfully".to_string(),
            ]
        );

        let report = consumer
            .run(job("lineage"), Arc::new(CollectingTranscriptSink::new()))
            .await;
        assert_eq!(report.last_line(), Some("Error: CI job failed with exit status: 2"));

        let report = consumer
            .run(job("kernel"), Arc::new(CollectingTranscriptSink::new()))
            .await;
        assert_eq!(report.last_line(), Some("Error: Failed to start CI job"));
    }

    #[tokio::test]
    async fn test_consumer_reports_in_reply_from_spawned_task() {
        let mut runner = MockCiRunner::new();
        runner
            .expect_run()
            .withf(|job| job.project == "twrp" && job.args == ["--clean"])
            .times(1)
            .returning(|_| Ok(()));
        let chat = Arc::new(RecordingChat::new());
        let consumer = CiTaskConsumer::new(Arc::new(runner), chat.clone());
        let job = CiJob::from_invocation(&invocation(&["twrp", "--clean"])).unwrap();
        let task = QueuedTask::new(TASK_TYPE, &job).unwrap();

        tokio::spawn(async move { consumer.consume(task).await })
            .await
            .unwrap()
            .unwrap();

        let events = chat.events();
        assert_eq!(events.len(), 2);
        let ChatEvent::Sent { message, options, .. } = &events[0] else {
            panic!("unexpected first event: {:?}", events[0]);
        };
        assert_eq!(options.reply_to, Some(7));
        assert_eq!(
            chat.text_of(message).as_deref(),
            Some("Running CI job for twrp...\nDone, twrp built successfully")
        );
    }

    #[tokio::test]
    async fn test_consumer_failure_is_task_error() {
        let mut runner = MockCiRunner::new();
        runner
            .expect_run()
            .returning(|_| Err(CiRunError::Exit("exit status: 1".to_string())));
        let consumer = CiTaskConsumer::new(Arc::new(runner), Arc::new(RecordingChat::new()));
        let job = CiJob::from_invocation(&invocation(&["twrp"])).unwrap();

        let err = consumer
            .consume(QueuedTask::new(TASK_TYPE, &job).unwrap())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            TaskError::Failed(reason) if reason == "CI job failed with exit status: 1"
        ));
    }

    #[test]
    fn test_register_declares_command_and_task() {
        let (queue, _dispatcher) = TaskDispatcher::new();
        let descriptor = register(
            &configured(),
            queue,
            Arc::new(MockCiRunner::new()),
            Arc::new(MockChatTransport::new()),
        );

        assert_eq!(descriptor.name, "ci");
        assert_eq!(descriptor.version, "1.0");
        assert_eq!(descriptor.commands, vec![BotCommand::new("ci", "Start a CI job")]);
        assert_eq!(descriptor.task_types[0].0, "ci");
    }
}
