//! Telegram Bot API client.

use super::{BotCommand, ChatId, ChatTransport, MessageRef, SendOptions};
use crate::errors::ChatError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::debug;

const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Connection settings for the Bot API.
#[derive(Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Bot token issued by BotFather.
    pub bot_token: String,
    /// API base URL.
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Long-polling timeout for `getUpdates`, in seconds.
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u64,
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_poll_timeout() -> u64 {
    30
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("api_base", &self.api_base)
            .field("poll_timeout_secs", &self.poll_timeout_secs)
            .finish_non_exhaustive()
    }
}

impl TelegramConfig {
    /// Creates a configuration for the public API.
    #[must_use]
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            api_base: default_api_base(),
            poll_timeout_secs: default_poll_timeout(),
        }
    }

    /// Overrides the API base URL.
    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct SentMessage {
    message_id: i64,
    chat: Chat,
}

/// An incoming update from `getUpdates`.
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    /// Monotonic update id.
    pub update_id: i64,
    /// The new message, if the update carries one.
    #[serde(default)]
    pub message: Option<IncomingMessage>,
}

/// A message received by the bot.
#[derive(Debug, Clone, Deserialize)]
pub struct IncomingMessage {
    /// Message id within the chat.
    pub message_id: i64,
    /// The chat it was sent in.
    pub chat: Chat,
    /// Message text, absent for media.
    #[serde(default)]
    pub text: Option<String>,
}

/// A chat as described by the Bot API.
#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    /// Numeric chat id.
    pub id: i64,
}

#[derive(Debug, Deserialize)]
struct BotUser {
    #[serde(default)]
    username: Option<String>,
}

/// Async client for the Telegram Bot API.
#[derive(Clone)]
pub struct TelegramClient {
    http: reqwest::Client,
    config: TelegramConfig,
}

impl std::fmt::Debug for TelegramClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl TelegramClient {
    /// Creates a new client.
    pub fn new(config: TelegramConfig) -> Result<Self, ChatError> {
        // Long polls must outlive the server-side timeout.
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.poll_timeout_secs + 15))
            .build()?;
        Ok(Self { http, config })
    }

    fn method_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.config.api_base.trim_end_matches('/'),
            self.config.bot_token,
            method
        )
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: serde_json::Value,
    ) -> Result<T, ChatError> {
        debug!(method, "Calling Telegram Bot API");

        let envelope: Envelope<T> = self
            .http
            .post(self.method_url(method))
            .json(&body)
            .send()
            .await?
            .json()
            .await?;

        if !envelope.ok {
            return Err(ChatError::Api(
                envelope
                    .description
                    .unwrap_or_else(|| format!("{method} failed")),
            ));
        }

        envelope
            .result
            .ok_or_else(|| ChatError::Api(format!("{method} returned no result")))
    }

    /// Returns the bot's username, used to filter `/cmd@bot` commands.
    pub async fn username(&self) -> Result<Option<String>, ChatError> {
        let me: BotUser = self.call("getMe", json!({})).await?;
        Ok(me.username)
    }

    /// Long-polls for updates newer than `offset`.
    pub async fn get_updates(&self, offset: Option<i64>) -> Result<Vec<Update>, ChatError> {
        self.call(
            "getUpdates",
            json!({
                "offset": offset,
                "timeout": self.config.poll_timeout_secs,
                "allowed_updates": ["message"],
            }),
        )
        .await
    }

    /// Publishes the command list shown by clients.
    pub async fn set_my_commands(&self, commands: &[BotCommand]) -> Result<(), ChatError> {
        let _: bool = self
            .call("setMyCommands", json!({ "commands": commands }))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ChatTransport for TelegramClient {
    async fn send_message(
        &self,
        chat: &ChatId,
        text: &str,
        options: SendOptions,
    ) -> Result<MessageRef, ChatError> {
        let mut body = json!({
            "chat_id": chat.as_str(),
            "text": text,
            "disable_web_page_preview": options.disable_web_page_preview,
        });
        if let Some(reply_to) = options.reply_to {
            body["reply_to_message_id"] = json!(reply_to);
        }

        let sent: SentMessage = self.call("sendMessage", body).await?;
        Ok(MessageRef::new(ChatId::from(sent.chat.id), sent.message_id))
    }

    async fn edit_message(
        &self,
        message: &MessageRef,
        text: &str,
        options: SendOptions,
    ) -> Result<(), ChatError> {
        // editMessageText answers with the edited message; only success matters.
        let _: serde_json::Value = self
            .call(
                "editMessageText",
                json!({
                    "chat_id": message.chat.as_str(),
                    "message_id": message.message_id,
                    "text": text,
                    "disable_web_page_preview": options.disable_web_page_preview,
                }),
            )
            .await?;
        Ok(())
    }
}
