//! Error types for the telegramma modules.
//!
//! Errors fall into four groups: usage errors and configuration errors
//! short-circuit a command before any side effect, collaborator errors are
//! recovered into a workflow abort, and warnings never leave the step that
//! raised them (they only become a transcript line).

use thiserror::Error;

/// The main error type for telegramma operations.
#[derive(Debug, Error)]
pub enum TelegrammaError {
    /// The command was invoked with the wrong arguments.
    #[error("{0}")]
    Usage(#[from] UsageError),

    /// A required configuration value is missing or invalid.
    #[error("{0}")]
    Configuration(#[from] ConfigurationError),

    /// An external collaborator failed.
    #[error("{0}")]
    Collaborator(#[from] CollaboratorError),

    /// The chat platform rejected a request.
    #[error("{0}")]
    Chat(#[from] ChatError),

    /// Module registration failed.
    #[error("{0}")]
    Registry(#[from] RegistryError),
}

/// Error raised when a command receives the wrong arguments.
///
/// The display form is the usage line replied to the user.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Usage: /{command} {synopsis}")]
pub struct UsageError {
    /// The command name, without the leading slash.
    pub command: String,
    /// The argument synopsis, e.g. `<url>`.
    pub synopsis: String,
}

impl UsageError {
    /// Creates a new usage error.
    #[must_use]
    pub fn new(command: impl Into<String>, synopsis: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            synopsis: synopsis.into(),
        }
    }
}

/// Error raised when configuration is incomplete or unreadable.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// One or more required keys are absent from a module namespace.
    #[error("Missing configuration: {namespace} requires {}", keys.join(", "))]
    Missing {
        /// The module namespace.
        namespace: String,
        /// The absent keys.
        keys: Vec<String>,
    },

    /// The configuration file could not be read.
    #[error("Failed to read configuration at {path}: {source}")]
    Read {
        /// The file path.
        path: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file or a namespace could not be parsed.
    #[error("Invalid configuration in {location}: {source}")]
    Parse {
        /// The file path or namespace that failed to parse.
        location: String,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

impl ConfigurationError {
    /// Creates a missing-keys error.
    #[must_use]
    pub fn missing(namespace: impl Into<String>, keys: Vec<String>) -> Self {
        Self::Missing {
            namespace: namespace.into(),
            keys,
        }
    }

    /// The description shown to chat users. Never includes key names or values.
    #[must_use]
    pub fn chat_message(&self) -> &'static str {
        "Missing configuration"
    }
}

/// The external system a collaborator error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collaborator {
    /// HTTP download source.
    Download,
    /// Device tree generation library.
    Generator,
    /// Source hosting API.
    SourceHost,
    /// Version control transport.
    VersionControl,
    /// Background task queue.
    TaskQueue,
    /// CI job runner.
    CiRunner,
}

impl std::fmt::Display for Collaborator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Download => write!(f, "download"),
            Self::Generator => write!(f, "generator"),
            Self::SourceHost => write!(f, "source_host"),
            Self::VersionControl => write!(f, "version_control"),
            Self::TaskQueue => write!(f, "task_queue"),
            Self::CiRunner => write!(f, "ci_runner"),
        }
    }
}

/// A failed call to an external collaborator, already translated into a
/// short user-facing message.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct CollaboratorError {
    /// Which collaborator failed.
    pub collaborator: Collaborator,
    /// The user-facing description, without the `Error: ` prefix.
    pub message: String,
}

impl CollaboratorError {
    /// Creates a new collaborator error.
    #[must_use]
    pub fn new(collaborator: Collaborator, message: impl Into<String>) -> Self {
        Self {
            collaborator,
            message: message.into(),
        }
    }
}

/// Errors returned by the chat platform.
#[derive(Debug, Error)]
pub enum ChatError {
    /// The HTTP request could not be completed.
    #[error("chat api request failed: {0}")]
    Request(String),

    /// The platform answered with an error description.
    #[error("chat api responded with error `{0}`")]
    Api(String),
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        Self::Request(err.to_string())
    }
}

/// Errors raised while assembling the module registry.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// Two modules declared the same command.
    #[error("Command '/{command}' registered by both {first} and {second}")]
    DuplicateCommand {
        /// The command name.
        command: String,
        /// The module that registered it first.
        first: String,
        /// The module that tried to register it again.
        second: String,
    },

    /// Two modules declared the same background task type.
    #[error("Task type '{tag}' registered more than once")]
    DuplicateTaskType {
        /// The task tag.
        tag: String,
    },

    /// A handler was declared for a command that has no metadata.
    #[error("Module {module} has a handler for undeclared command '/{command}'")]
    UndeclaredCommand {
        /// The module name.
        module: String,
        /// The command name.
        command: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_error_display() {
        let err = UsageError::new("twrpdtgen", "<url>");
        assert_eq!(err.to_string(), "Usage: /twrpdtgen <url>");
    }

    #[test]
    fn test_missing_configuration_lists_keys() {
        let err = ConfigurationError::missing(
            "twrpdtgen",
            vec!["github_token".to_string(), "github_org".to_string()],
        );

        assert!(err.to_string().contains("github_token, github_org"));
        assert_eq!(err.chat_message(), "Missing configuration");
    }

    #[test]
    fn test_collaborator_error_display() {
        let err = CollaboratorError::new(Collaborator::Download, "Failed to download file");

        assert_eq!(err.to_string(), "Failed to download file");
        assert_eq!(err.collaborator.to_string(), "download");
    }

    #[test]
    fn test_registry_error_display() {
        let err = RegistryError::DuplicateCommand {
            command: "ci".to_string(),
            first: "ci".to_string(),
            second: "other".to_string(),
        };
        assert!(err.to_string().contains("/ci"));
    }

    #[test]
    fn test_top_level_from_conversions() {
        let err: TelegrammaError = UsageError::new("ci", "<project>").into();
        assert!(matches!(err, TelegrammaError::Usage(_)));

        let err: TelegrammaError = ChatError::Api("Bad Request".to_string()).into();
        assert!(err.to_string().contains("Bad Request"));
    }
}
