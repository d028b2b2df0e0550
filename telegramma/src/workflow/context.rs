//! Per-run workflow context.

use super::executor::{Outcome, WorkflowReport};
use crate::chat::{ChatId, ChatTransport, SendOptions};
use crate::errors::{ChatError, ConfigurationError};
use crate::transcript::{Progress, TranscriptSink};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// One-shot notification target for successful runs.
#[derive(Clone)]
pub struct Broadcast {
    chat: Arc<dyn ChatTransport>,
    destination: ChatId,
}

impl std::fmt::Debug for Broadcast {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broadcast")
            .field("destination", &self.destination)
            .finish_non_exhaustive()
    }
}

impl Broadcast {
    /// Creates a broadcast to a fixed chat.
    #[must_use]
    pub fn new(chat: Arc<dyn ChatTransport>, destination: ChatId) -> Self {
        Self { chat, destination }
    }

    /// Returns the destination chat.
    #[must_use]
    pub fn destination(&self) -> &ChatId {
        &self.destination
    }

    /// Sends `text` to the destination with link previews disabled.
    pub async fn send(&self, text: &str) -> Result<(), ChatError> {
        self.chat
            .send_message(&self.destination, text, SendOptions::new().without_preview())
            .await
            .map(|_| ())
    }
}

/// Everything one workflow run needs besides its steps.
///
/// Collaborator credentials live in the steps themselves, which are built
/// from an already validated configuration.
pub struct WorkflowContext<I> {
    run_id: Uuid,
    input: I,
    sink: Arc<dyn TranscriptSink>,
    broadcast: Option<Broadcast>,
}

impl<I: std::fmt::Debug> std::fmt::Debug for WorkflowContext<I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowContext")
            .field("run_id", &self.run_id)
            .field("input", &self.input)
            .field("broadcast", &self.broadcast)
            .finish_non_exhaustive()
    }
}

impl<I> WorkflowContext<I> {
    /// Creates a context for a fresh run.
    #[must_use]
    pub fn new(input: I, sink: Arc<dyn TranscriptSink>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            input,
            sink,
            broadcast: None,
        }
    }

    /// Sets the success broadcast. `None` leaves it disabled.
    #[must_use]
    pub fn with_broadcast(mut self, broadcast: Option<Broadcast>) -> Self {
        self.broadcast = broadcast;
        self
    }

    pub(crate) fn into_parts(self) -> (Uuid, I, Progress, Option<Broadcast>) {
        (self.run_id, self.input, Progress::new(self.sink), self.broadcast)
    }

    /// Ends the run before any step because configuration is incomplete.
    ///
    /// The transcript holds exactly one line, `Error: Missing configuration`.
    pub async fn reject(self, error: &ConfigurationError) -> WorkflowReport {
        warn!(run_id = %self.run_id, error = %error, "Workflow rejected");
        let transcript = Progress::new(self.sink).fail(error.chat_message()).await;
        WorkflowReport {
            run_id: self.run_id,
            transcript: transcript.into_lines(),
            outcome: Outcome::Rejected {
                reason: error.chat_message().to_string(),
            },
            duration_ms: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::{MessageRef, MockChatTransport};
    use crate::transcript::CollectingTranscriptSink;

    #[tokio::test]
    async fn test_reject_writes_single_line() {
        let sink = Arc::new(CollectingTranscriptSink::new());
        let ctx = WorkflowContext::new("https://example.com/recovery.img", sink.clone());

        let report = ctx
            .reject(&ConfigurationError::missing("twrpdtgen", vec!["github_org".to_string()]))
            .await;

        assert_eq!(report.transcript, vec!["Error: Missing configuration".to_string()]);
        assert!(matches!(report.outcome, Outcome::Rejected { .. }));
        assert_eq!(sink.flushes(), vec!["Error: Missing configuration".to_string()]);
    }

    #[tokio::test]
    async fn test_broadcast_disables_preview() {
        let mut chat = MockChatTransport::new();
        chat.expect_send_message()
            .withf(|chat, text, options| {
                chat.as_str() == "@builds" && text == "hello" && options.disable_web_page_preview
            })
            .times(1)
            .returning(|chat, _, _| Ok(MessageRef::new(chat.clone(), 1)));

        let broadcast = Broadcast::new(Arc::new(chat), ChatId::new("@builds"));
        broadcast.send("hello").await.unwrap();
        assert_eq!(broadcast.destination().as_str(), "@builds");
    }
}
