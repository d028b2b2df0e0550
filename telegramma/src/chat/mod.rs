//! Chat platform abstraction.
//!
//! Modules only talk to the chat through [`ChatTransport`]: send a message,
//! edit a message in place, and send to a fixed destination. The Telegram
//! Bot API client is the production implementation.

mod command;
mod telegram;

pub use command::{parse_command, CommandInvocation};
pub use telegram::{Chat, IncomingMessage, TelegramClient, TelegramConfig, Update};

use crate::errors::ChatError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a chat.
///
/// Telegram accepts both numeric ids and `@channelusername` as a string, so
/// the id is kept in its textual form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "ChatIdRepr", into = "String")]
pub struct ChatId(String);

#[derive(Deserialize)]
#[serde(untagged)]
enum ChatIdRepr {
    Numeric(i64),
    Text(String),
}

impl From<ChatIdRepr> for ChatId {
    fn from(repr: ChatIdRepr) -> Self {
        match repr {
            ChatIdRepr::Numeric(id) => Self(id.to_string()),
            ChatIdRepr::Text(id) => Self(id),
        }
    }
}

impl From<ChatId> for String {
    fn from(id: ChatId) -> Self {
        id.0
    }
}

impl ChatId {
    /// Creates a chat id from any textual or numeric form.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the textual form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<i64> for ChatId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A message that has been sent and can be edited.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageRef {
    /// The chat holding the message.
    pub chat: ChatId,
    /// The platform message id.
    pub message_id: i64,
}

impl MessageRef {
    /// Creates a new message reference.
    #[must_use]
    pub fn new(chat: ChatId, message_id: i64) -> Self {
        Self { chat, message_id }
    }
}

/// Options applied when sending or editing a message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendOptions {
    /// Message to reply to, in the same chat.
    pub reply_to: Option<i64>,
    /// Suppress link previews.
    pub disable_web_page_preview: bool,
}

impl SendOptions {
    /// Creates default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replies to the given message.
    #[must_use]
    pub fn reply_to(mut self, message_id: i64) -> Self {
        self.reply_to = Some(message_id);
        self
    }

    /// Disables link previews.
    #[must_use]
    pub fn without_preview(mut self) -> Self {
        self.disable_web_page_preview = true;
        self
    }
}

/// A command advertised to chat users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotCommand {
    /// Command name, without the leading slash.
    pub command: String,
    /// Short description shown by the client.
    pub description: String,
}

impl BotCommand {
    /// Creates a new bot command.
    #[must_use]
    pub fn new(command: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            description: description.into(),
        }
    }
}

/// Transport to the chat platform.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Sends a new message and returns a handle for later edits.
    async fn send_message(
        &self,
        chat: &ChatId,
        text: &str,
        options: SendOptions,
    ) -> Result<MessageRef, ChatError>;

    /// Replaces the text of a previously sent message.
    async fn edit_message(
        &self,
        message: &MessageRef,
        text: &str,
        options: SendOptions,
    ) -> Result<(), ChatError>;
}
