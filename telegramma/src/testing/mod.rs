//! Test doubles for chat-facing code.

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::chat::{ChatId, ChatTransport, MessageRef, SendOptions};
use crate::errors::ChatError;

/// One call made against a [`RecordingChat`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// A new message.
    Sent {
        /// Message assigned by the double.
        message: MessageRef,
        /// Message text.
        text: String,
        /// Send options.
        options: SendOptions,
    },
    /// An edit of an earlier message.
    Edited {
        /// Edited message.
        message: MessageRef,
        /// New text.
        text: String,
    },
}

/// An in-memory chat that records every call.
///
/// Sent messages get increasing ids starting at 1000.
#[derive(Debug, Default)]
pub struct RecordingChat {
    events: Mutex<Vec<ChatEvent>>,
    next_id: Mutex<i64>,
}

impl RecordingChat {
    /// Creates an empty recording chat.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every recorded call, oldest first.
    #[must_use]
    pub fn events(&self) -> Vec<ChatEvent> {
        self.events.lock().clone()
    }

    /// Returns the texts of sent messages.
    #[must_use]
    pub fn sent_texts(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                ChatEvent::Sent { text, .. } => Some(text.clone()),
                ChatEvent::Edited { .. } => None,
            })
            .collect()
    }

    /// Returns the current text of `message`, after all edits.
    #[must_use]
    pub fn text_of(&self, message: &MessageRef) -> Option<String> {
        self.events
            .lock()
            .iter()
            .rev()
            .find_map(|event| match event {
                ChatEvent::Sent { message: m, text, .. } | ChatEvent::Edited { message: m, text }
                    if m == message =>
                {
                    Some(text.clone())
                }
                _ => None,
            })
    }
}

#[async_trait]
impl ChatTransport for RecordingChat {
    async fn send_message(
        &self,
        chat: &ChatId,
        text: &str,
        options: SendOptions,
    ) -> Result<MessageRef, ChatError> {
        let id = {
            let mut next = self.next_id.lock();
            *next += 1;
            999 + *next
        };
        let message = MessageRef::new(chat.clone(), id);
        self.events.lock().push(ChatEvent::Sent {
            message: message.clone(),
            text: text.to_string(),
            options,
        });
        Ok(message)
    }

    async fn edit_message(
        &self,
        message: &MessageRef,
        text: &str,
        _options: SendOptions,
    ) -> Result<(), ChatError> {
        self.events.lock().push(ChatEvent::Edited {
            message: message.clone(),
            text: text.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::{MessageTranscriptSink, Progress};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_transcript_is_one_message_with_edits() {
        let chat = Arc::new(RecordingChat::new());
        let request = MessageRef::new(ChatId::new("42"), 7);
        let sink = Arc::new(MessageTranscriptSink::replying_to(chat.clone(), &request));

        let mut progress = Progress::new(sink);
        progress.append("Downloading file...").await;
        progress.append("Generating device tree...").await;
        progress.fail("Device tree generation failed: bad image").await;

        let events = chat.events();
        assert_eq!(events.len(), 3);
        let ChatEvent::Sent { message, options, .. } = &events[0] else {
            panic!("first flush must send a message");
        };
        assert_eq!(options.reply_to, Some(7));
        assert!(options.disable_web_page_preview);
        assert_eq!(chat.sent_texts(), vec!["Downloading file...".to_string()]);
        assert_eq!(
            chat.text_of(message).as_deref(),
            Some(
                "Downloading file...\n\
                 Generating device tree...\n\
                 Error: Device tree generation failed: bad image"
            )
        );
    }
}
