//! Parsing of `/command@bot arg1 arg2` message texts.

use super::{ChatId, MessageRef};

/// A parsed command received from a chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInvocation {
    /// Command name, lowercase, without slash or bot suffix.
    pub command: String,
    /// Whitespace separated arguments.
    pub args: Vec<String>,
    /// The message carrying the command.
    pub message: MessageRef,
}

impl CommandInvocation {
    /// Creates an invocation from its parts.
    #[must_use]
    pub fn new(command: impl Into<String>, args: Vec<String>, message: MessageRef) -> Self {
        Self {
            command: command.into(),
            args,
            message,
        }
    }

    /// The chat the command was sent from.
    #[must_use]
    pub fn chat(&self) -> &ChatId {
        &self.message.chat
    }

    /// Returns the only argument, or `None` unless exactly one was given.
    #[must_use]
    pub fn single_arg(&self) -> Option<&str> {
        match self.args.as_slice() {
            [arg] => Some(arg.as_str()),
            _ => None,
        }
    }
}

/// Parses a message text into a command name and arguments.
///
/// Returns `None` for texts that are not commands. When `bot_username` is
/// given, commands addressed to another bot (`/cmd@otherbot`) are rejected.
pub fn parse_command(text: &str, bot_username: Option<&str>) -> Option<(String, Vec<String>)> {
    let mut parts = text.split_whitespace();
    let head = parts.next()?.strip_prefix('/')?;

    let (name, target) = match head.split_once('@') {
        Some((name, target)) => (name, Some(target)),
        None => (head, None),
    };

    if name.is_empty() {
        return None;
    }

    if let (Some(target), Some(username)) = (target, bot_username) {
        if !target.eq_ignore_ascii_case(username) {
            return None;
        }
    }

    let args = parts.map(String::from).collect();
    Some((name.to_ascii_lowercase(), args))
}
