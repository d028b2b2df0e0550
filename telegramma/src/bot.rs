//! Long-polling loop feeding chat commands to the module registry.

use crate::chat::{parse_command, ChatId, CommandInvocation, MessageRef, TelegramClient, Update};
use crate::errors::ChatError;
use crate::module::ModuleRegistry;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Pause after a failed `getUpdates` call.
const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Extracts a command invocation from an update.
///
/// Returns `None` for updates without a text message, for plain text, and
/// for commands addressed to another bot.
#[must_use]
pub fn invocation_from(update: &Update, bot_username: Option<&str>) -> Option<CommandInvocation> {
    let message = update.message.as_ref()?;
    let text = message.text.as_deref()?;
    let (command, args) = parse_command(text, bot_username)?;
    Some(CommandInvocation::new(
        command,
        args,
        MessageRef::new(ChatId::from(message.chat.id), message.message_id),
    ))
}

/// The running bot.
#[derive(Debug)]
pub struct Bot {
    client: Arc<TelegramClient>,
    registry: Arc<ModuleRegistry>,
}

impl Bot {
    /// Creates a bot serving the registered modules.
    #[must_use]
    pub fn new(client: Arc<TelegramClient>, registry: Arc<ModuleRegistry>) -> Self {
        Self { client, registry }
    }

    /// Publishes the command list to chat clients.
    pub async fn publish_commands(&self) -> Result<(), ChatError> {
        self.client.set_my_commands(self.registry.commands()).await?;
        info!(commands = self.registry.commands().len(), "Command list published");
        Ok(())
    }

    /// Polls for updates forever, spawning one task per command.
    pub async fn run(self) -> Result<(), ChatError> {
        let username = self.client.username().await?;
        info!(username = ?username, "Polling for updates");

        let mut offset = None;
        loop {
            let updates = match self.client.get_updates(offset).await {
                Ok(updates) => updates,
                Err(err) => {
                    warn!(error = %err, "Failed to fetch updates");
                    tokio::time::sleep(RETRY_DELAY).await;
                    continue;
                }
            };

            for update in updates {
                offset = Some(update.update_id + 1);

                let Some(invocation) = invocation_from(&update, username.as_deref()) else {
                    continue;
                };
                if !self.registry.handles(&invocation.command) {
                    debug!(command = %invocation.command, "Ignoring unknown command");
                    continue;
                }

                let registry = self.registry.clone();
                tokio::spawn(async move { registry.dispatch(invocation).await });
            }
        }
    }
}
