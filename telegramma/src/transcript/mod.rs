//! Progress transcripts.
//!
//! A transcript is the list of status lines shown to the user while a
//! workflow runs. Every append re-renders the whole transcript and hands it
//! to a [`TranscriptSink`], which in production edits a single chat message
//! in place.

mod sink;

pub use sink::{CollectingTranscriptSink, MessageTranscriptSink, TranscriptSink};

use std::sync::Arc;
use tracing::warn;

/// Prefix of abort lines.
pub const ERROR_PREFIX: &str = "Error: ";
/// Prefix of non-fatal warning lines.
pub const WARNING_PREFIX: &str = "Warning: ";
/// Prefix of the success line.
pub const DONE_PREFIX: &str = "Done, ";

/// Append-only list of status lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    lines: Vec<String>,
}

impl Transcript {
    /// Creates an empty transcript.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a line.
    pub fn push(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    /// Renders the transcript as newline separated text.
    #[must_use]
    pub fn render(&self) -> String {
        self.lines.join("\n")
    }

    /// Returns all lines.
    #[must_use]
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Returns the number of lines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Returns true if nothing has been appended yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Returns the most recent line.
    #[must_use]
    pub fn last(&self) -> Option<&str> {
        self.lines.last().map(String::as_str)
    }

    /// Consumes the transcript, returning its lines.
    #[must_use]
    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }
}

/// Live progress of one workflow run.
///
/// Owns the run's transcript and flushes it after every append. The terminal
/// operations ([`Progress::done`] and [`Progress::fail`]) consume the handle,
/// so a run can end with at most one terminal line.
pub struct Progress {
    transcript: Transcript,
    sink: Arc<dyn TranscriptSink>,
}

impl std::fmt::Debug for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Progress")
            .field("transcript", &self.transcript)
            .finish_non_exhaustive()
    }
}

impl Progress {
    /// Starts an empty transcript flushed to `sink`.
    #[must_use]
    pub fn new(sink: Arc<dyn TranscriptSink>) -> Self {
        Self {
            transcript: Transcript::new(),
            sink,
        }
    }

    /// Returns the transcript so far.
    #[must_use]
    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Appends a line and flushes the rendered transcript.
    ///
    /// A failed flush is logged; the run carries on with the next step.
    pub async fn append(&mut self, line: impl Into<String>) {
        self.transcript.push(line);
        let rendered = self.transcript.render();
        if let Err(err) = self.sink.flush(&rendered).await {
            warn!(error = %err, lines = self.transcript.len(), "Failed to flush transcript");
        }
    }

    /// Appends a non-fatal `Warning: ` line.
    pub async fn warn(&mut self, message: impl AsRef<str>) {
        self.append(format!("{WARNING_PREFIX}{}", message.as_ref())).await;
    }

    /// Appends the `Done, ` line and ends the run.
    pub async fn done(mut self, reference: impl AsRef<str>) -> Transcript {
        self.append(format!("{DONE_PREFIX}{}", reference.as_ref())).await;
        self.transcript
    }

    /// Appends the `Error: ` line and ends the run.
    pub async fn fail(mut self, message: impl AsRef<str>) -> Transcript {
        self.append(format!("{ERROR_PREFIX}{}", message.as_ref())).await;
        self.transcript
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_render_joins_lines() {
        let mut transcript = Transcript::new();
        assert!(transcript.is_empty());
        assert_eq!(transcript.render(), "");

        transcript.push("Downloading file...");
        transcript.push("Generating device tree...");

        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript.render(), "Downloading file...\nGenerating device tree...");
        assert_eq!(transcript.last(), Some("Generating device tree..."));
    }

    #[tokio::test]
    async fn test_progress_flushes_every_append() {
        let sink = Arc::new(CollectingTranscriptSink::new());
        let mut progress = Progress::new(sink.clone());

        progress.append("Downloading file...").await;
        progress.warn("something odd").await;
        let transcript = progress.done("https://example.com").await;

        assert_eq!(
            sink.flushes(),
            vec![
                "Downloading file...".to_string(),
                "Downloading file...\nWarning: something odd".to_string(),
                "Downloading file...\nWarning: something odd\nDone, https://example.com"
                    .to_string(),
            ]
        );
        assert_eq!(transcript.len(), 3);
    }

    #[tokio::test]
    async fn test_progress_fail_line() {
        let sink = Arc::new(CollectingTranscriptSink::new());
        let mut progress = Progress::new(sink.clone());

        progress.append("Downloading file...").await;
        let transcript = progress.fail("Failed to download file").await;

        assert_eq!(transcript.last(), Some("Error: Failed to download file"));
        assert_eq!(sink.len(), 2);
    }

    #[tokio::test]
    async fn test_flush_failure_does_not_stop_progress() {
        let mut progress = Progress::new(Arc::new(sink::FailingTranscriptSink));

        progress.append("one").await;
        progress.append("two").await;

        assert_eq!(progress.transcript().len(), 2);
    }
}
