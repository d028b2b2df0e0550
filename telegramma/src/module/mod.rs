//! Module registration and command dispatch.
//!
//! A module is a named, versioned bundle of chat commands and background
//! task consumers. Each module exposes a registration function returning a
//! [`ModuleDescriptor`]; the host feeds descriptors to a [`ModuleRegistry`].

mod registry;

pub use registry::ModuleRegistry;

use crate::chat::{BotCommand, CommandInvocation};
use crate::errors::TelegrammaError;
use crate::tasks::TaskConsumer;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Handles invocations of one chat command.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Handles one invocation. Errors are logged by the dispatcher.
    async fn handle(&self, invocation: CommandInvocation) -> Result<(), TelegrammaError>;
}

/// Everything a module contributes to the bot.
pub struct ModuleDescriptor {
    /// Module name.
    pub name: String,
    /// Module version.
    pub version: String,
    /// Commands advertised to chat clients.
    pub commands: Vec<BotCommand>,
    /// Handlers keyed by command name.
    pub handlers: HashMap<String, Arc<dyn CommandHandler>>,
    /// Background task consumers keyed by task-type tag.
    pub task_types: Vec<(String, Arc<dyn TaskConsumer>)>,
}

impl std::fmt::Debug for ModuleDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleDescriptor")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("commands", &self.commands)
            .field(
                "task_types",
                &self.task_types.iter().map(|(tag, _)| tag).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

impl ModuleDescriptor {
    /// Creates an empty descriptor.
    #[must_use]
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            commands: Vec::new(),
            handlers: HashMap::new(),
            task_types: Vec::new(),
        }
    }

    /// Declares a command together with its handler.
    #[must_use]
    pub fn with_command(
        mut self,
        command: BotCommand,
        handler: Arc<dyn CommandHandler>,
    ) -> Self {
        self.handlers.insert(command.command.clone(), handler);
        self.commands.push(command);
        self
    }

    /// Declares a background task consumer.
    #[must_use]
    pub fn with_task_type(
        mut self,
        tag: impl Into<String>,
        consumer: Arc<dyn TaskConsumer>,
    ) -> Self {
        self.task_types.push((tag.into(), consumer));
        self
    }
}
