//! Transcript sink trait and implementations.

use crate::chat::{ChatId, ChatTransport, MessageRef, SendOptions};
use crate::errors::ChatError;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Receives the rendered transcript after every append.
#[async_trait]
pub trait TranscriptSink: Send + Sync {
    /// Publishes the full rendered transcript.
    async fn flush(&self, rendered: &str) -> Result<(), ChatError>;
}

/// A sink that keeps every flushed rendering, for tests.
#[derive(Debug, Default)]
pub struct CollectingTranscriptSink {
    flushes: parking_lot::RwLock<Vec<String>>,
}

impl CollectingTranscriptSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every flushed rendering, oldest first.
    #[must_use]
    pub fn flushes(&self) -> Vec<String> {
        self.flushes.read().clone()
    }

    /// Returns the most recent rendering.
    #[must_use]
    pub fn latest(&self) -> Option<String> {
        self.flushes.read().last().cloned()
    }

    /// Returns the number of flushes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.flushes.read().len()
    }

    /// Returns true if nothing was flushed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.flushes.read().is_empty()
    }
}

#[async_trait]
impl TranscriptSink for CollectingTranscriptSink {
    async fn flush(&self, rendered: &str) -> Result<(), ChatError> {
        self.flushes.write().push(rendered.to_string());
        Ok(())
    }
}

/// A sink that mirrors the transcript into one chat message.
///
/// The first flush sends a reply to the invoking message; every later flush
/// edits that same message.
pub struct MessageTranscriptSink {
    chat: Arc<dyn ChatTransport>,
    destination: ChatId,
    reply_to: Option<i64>,
    message: Mutex<Option<MessageRef>>,
}

impl std::fmt::Debug for MessageTranscriptSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageTranscriptSink")
            .field("destination", &self.destination)
            .field("reply_to", &self.reply_to)
            .finish_non_exhaustive()
    }
}

impl MessageTranscriptSink {
    /// Creates a sink that posts to `destination`.
    #[must_use]
    pub fn new(chat: Arc<dyn ChatTransport>, destination: ChatId) -> Self {
        Self {
            chat,
            destination,
            reply_to: None,
            message: Mutex::new(None),
        }
    }

    /// Creates a sink whose message replies to the invoking command.
    #[must_use]
    pub fn replying_to(chat: Arc<dyn ChatTransport>, invocation: &MessageRef) -> Self {
        Self {
            chat,
            destination: invocation.chat.clone(),
            reply_to: Some(invocation.message_id),
            message: Mutex::new(None),
        }
    }
}

#[async_trait]
impl TranscriptSink for MessageTranscriptSink {
    async fn flush(&self, rendered: &str) -> Result<(), ChatError> {
        let options = SendOptions::new().without_preview();
        let mut message = self.message.lock().await;

        match message.as_ref() {
            Some(sent) => self.chat.edit_message(sent, rendered, options).await,
            None => {
                let options = match self.reply_to {
                    Some(id) => options.reply_to(id),
                    None => options,
                };
                let sent = self
                    .chat
                    .send_message(&self.destination, rendered, options)
                    .await?;
                *message = Some(sent);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
pub(crate) struct FailingTranscriptSink;

#[cfg(test)]
#[async_trait]
impl TranscriptSink for FailingTranscriptSink {
    async fn flush(&self, _rendered: &str) -> Result<(), ChatError> {
        Err(ChatError::Api("Bad Request: message to edit not found".to_string()))
    }
}
