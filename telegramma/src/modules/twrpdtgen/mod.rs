//! `/twrpdtgen <url>`: generate a TWRP device tree from a recovery image
//! and push it to GitHub.
//!
//! The workflow downloads the image, generates the tree, derives a branch
//! from the build description, makes sure the device repository exists in
//! the configured organization, pushes, and finally announces the result to
//! the optional broadcast chat.

mod steps;

pub use steps::{
    branch_name, repository_name, Branched, Clock, DeriveBranch, Download, Downloaded,
    EnsureRepository, Ensured, Generate, Generated, Published, Push, ResolveOrganization,
    Targeted, IMAGE_FILE, NO_DESCRIPTION_WARNING, WORKING_DIR,
};

use crate::chat::{BotCommand, ChatTransport, CommandInvocation, SendOptions};
use crate::collaborators::{CollaboratorSet, GithubCredentials};
use crate::config::TwrpdtgenConfig;
use crate::errors::{ConfigurationError, TelegrammaError, UsageError};
use crate::module::{CommandHandler, ModuleDescriptor};
use crate::transcript::{MessageTranscriptSink, TranscriptSink};
use crate::workflow::{
    Broadcast, SequenceExt, Single, Steps, Then, WorkflowContext, WorkflowExecutor,
    WorkflowReport,
};
use async_trait::async_trait;
use reqwest::Url;
use std::sync::Arc;
use tracing::{info, warn};

/// Module name.
pub const NAME: &str = "twrpdtgen";
/// Module version.
pub const VERSION: &str = "1.0";
/// Argument synopsis shown in the usage reply.
pub const SYNOPSIS: &str = "<url>";

/// The device tree workflow's step sequence.
pub type DeviceTreeSteps = Then<
    Then<
        Then<
            Then<Then<Single<Download>, Single<Generate>>, Single<DeriveBranch>>,
            Single<ResolveOrganization>,
        >,
        Single<EnsureRepository>,
    >,
    Single<Push>,
>;

/// Returns the module descriptor.
///
/// Credentials are checked once here; when they are incomplete the command
/// stays registered and answers every invocation with the configuration
/// error. `connect` builds the collaborators for valid credentials.
pub fn register<F>(
    config: &TwrpdtgenConfig,
    chat: Arc<dyn ChatTransport>,
    connect: F,
) -> Result<ModuleDescriptor, TelegrammaError>
where
    F: FnOnce(&GithubCredentials) -> Result<CollaboratorSet, TelegrammaError>,
{
    let handler = TwrpdtgenHandler::new(config, chat, connect)?;
    Ok(ModuleDescriptor::new(NAME, VERSION).with_command(
        BotCommand::new(NAME, "Generate a TWRP device tree"),
        Arc::new(handler),
    ))
}

/// Parses the command argument as an `http` or `https` URL.
#[must_use]
pub fn parse_url(arg: &str) -> Option<Url> {
    Url::parse(arg)
        .ok()
        .filter(|url| matches!(url.scheme(), "http" | "https"))
}

struct Ready {
    credentials: Arc<GithubCredentials>,
    collaborators: CollaboratorSet,
}

/// Handler of `/twrpdtgen`.
pub struct TwrpdtgenHandler {
    chat: Arc<dyn ChatTransport>,
    ready: Result<Ready, ConfigurationError>,
    broadcast: Option<Broadcast>,
    clock: Clock,
}

impl std::fmt::Debug for TwrpdtgenHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwrpdtgenHandler")
            .field("configured", &self.ready.is_ok())
            .field("broadcast", &self.broadcast)
            .finish_non_exhaustive()
    }
}

impl TwrpdtgenHandler {
    /// Creates the handler from the module configuration.
    pub fn new<F>(
        config: &TwrpdtgenConfig,
        chat: Arc<dyn ChatTransport>,
        connect: F,
    ) -> Result<Self, TelegrammaError>
    where
        F: FnOnce(&GithubCredentials) -> Result<CollaboratorSet, TelegrammaError>,
    {
        let ready = match config.credentials() {
            Ok(credentials) => Ok(Ready {
                collaborators: connect(&credentials)?,
                credentials: Arc::new(credentials),
            }),
            Err(err) => {
                warn!(error = %err, "twrpdtgen is not configured");
                Err(err)
            }
        };
        let broadcast = config
            .broadcast_chat()
            .map(|id| Broadcast::new(chat.clone(), id.clone()));

        Ok(Self {
            chat,
            ready,
            broadcast,
            clock: Arc::new(|| chrono::Local::now().date_naive()),
        })
    }

    /// Replaces the date source used for fallback branch names.
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    fn executor(&self, ready: &Ready) -> WorkflowExecutor<DeviceTreeSteps> {
        let c = &ready.collaborators;
        let steps = Steps::start(Download {
            downloader: c.downloader.clone(),
        })
        .then(Generate {
            generator: c.generator.clone(),
        })
        .then(DeriveBranch {
            clock: self.clock.clone(),
        })
        .then(ResolveOrganization {
            host: c.host.clone(),
            credentials: ready.credentials.clone(),
        })
        .then(EnsureRepository {
            host: c.host.clone(),
        })
        .then(Push {
            host: c.host.clone(),
            pusher: c.pusher.clone(),
            credentials: ready.credentials.clone(),
        });
        WorkflowExecutor::new(NAME, steps)
    }

    /// Runs the workflow for an already validated URL.
    pub async fn run(&self, url: Url, sink: Arc<dyn TranscriptSink>) -> WorkflowReport {
        let ctx = WorkflowContext::new(url, sink).with_broadcast(self.broadcast.clone());
        match &self.ready {
            Ok(ready) => self.executor(ready).execute(ctx).await,
            Err(err) => ctx.reject(err).await,
        }
    }
}

#[async_trait]
impl CommandHandler for TwrpdtgenHandler {
    async fn handle(&self, invocation: CommandInvocation) -> Result<(), TelegrammaError> {
        let Some(url) = invocation.single_arg().and_then(parse_url) else {
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
        let report = self.run(url, sink).await;
        info!(run_id = %report.run_id, outcome = ?report.outcome, "twrpdtgen finished");
        Ok(())
    }
}
