//! Registry of loaded modules.

use super::{CommandHandler, ModuleDescriptor};
use crate::chat::{BotCommand, CommandInvocation};
use crate::errors::RegistryError;
use crate::tasks::{TaskConsumer, TaskDispatcher};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, info, info_span, Instrument};

struct Registered {
    module: String,
    handler: Arc<dyn CommandHandler>,
}

/// Loaded modules, indexed by command name.
#[derive(Default)]
pub struct ModuleRegistry {
    modules: Vec<(String, String)>,
    commands: Vec<BotCommand>,
    handlers: HashMap<String, Registered>,
    task_types: Vec<(String, Arc<dyn TaskConsumer>)>,
}

impl std::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("modules", &self.modules)
            .field("commands", &self.commands)
            .finish_non_exhaustive()
    }
}

impl ModuleRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a module. Nothing is registered if any command or task type
    /// clashes with an earlier module.
    pub fn register(&mut self, descriptor: ModuleDescriptor) -> Result<(), RegistryError> {
        let ModuleDescriptor {
            name,
            version,
            commands,
            mut handlers,
            task_types,
        } = descriptor;

        let declared: HashSet<&str> = commands.iter().map(|c| c.command.as_str()).collect();
        if let Some(command) = handlers.keys().find(|c| !declared.contains(c.as_str())) {
            return Err(RegistryError::UndeclaredCommand {
                module: name,
                command: command.clone(),
            });
        }

        for command in &commands {
            if let Some(existing) = self.handlers.get(&command.command) {
                return Err(RegistryError::DuplicateCommand {
                    command: command.command.clone(),
                    first: existing.module.clone(),
                    second: name,
                });
            }
        }

        let mut tags: HashSet<&str> = self.task_types.iter().map(|(t, _)| t.as_str()).collect();
        for (tag, _) in &task_types {
            if !tags.insert(tag.as_str()) {
                return Err(RegistryError::DuplicateTaskType { tag: tag.clone() });
            }
        }

        for command in &commands {
            if let Some(handler) = handlers.remove(&command.command) {
                self.handlers.insert(
                    command.command.clone(),
                    Registered {
                        module: name.clone(),
                        handler,
                    },
                );
            }
        }
        info!(
            module = %name,
            version = %version,
            commands = commands.len(),
            task_types = task_types.len(),
            "Module registered"
        );
        self.commands.extend(commands);
        self.task_types.extend(task_types);
        self.modules.push((name, version));
        Ok(())
    }

    /// Loaded modules as `(name, version)`, in registration order.
    #[must_use]
    pub fn modules(&self) -> &[(String, String)] {
        &self.modules
    }

    /// Commands to advertise to chat clients.
    #[must_use]
    pub fn commands(&self) -> &[BotCommand] {
        &self.commands
    }

    /// Returns true if some module handles `command`.
    #[must_use]
    pub fn handles(&self, command: &str) -> bool {
        self.handlers.contains_key(command)
    }

    /// Moves every declared task consumer into `dispatcher`.
    pub fn attach_consumers(
        &mut self,
        dispatcher: &mut TaskDispatcher,
    ) -> Result<(), RegistryError> {
        for (tag, consumer) in self.task_types.drain(..) {
            dispatcher.register(tag, consumer)?;
        }
        Ok(())
    }

    /// Runs the handler for an invocation. Unknown commands are ignored.
    pub async fn dispatch(&self, invocation: CommandInvocation) {
        let Some(registered) = self.handlers.get(&invocation.command) else {
            debug!(command = %invocation.command, "Ignoring unknown command");
            return;
        };

        let span = info_span!(
            "command",
            command = %invocation.command,
            module = %registered.module,
            chat = %invocation.chat(),
        );
        async move {
            if let Err(err) = registered.handler.handle(invocation).await {
                error!(error = %err, "Command handler failed");
            }
        }
        .instrument(span)
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::{ChatId, MessageRef};
    use crate::errors::TelegrammaError;
    use crate::tasks::{QueuedTask, TaskError};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CommandHandler for Counting {
        async fn handle(&self, _invocation: CommandInvocation) -> Result<(), TelegrammaError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Sink;

    #[async_trait]
    impl TaskConsumer for Sink {
        async fn consume(&self, _task: QueuedTask) -> Result<(), TaskError> {
            Ok(())
        }
    }

    fn invocation(command: &str) -> CommandInvocation {
        CommandInvocation::new(command, vec![], MessageRef::new(ChatId::from(42_i64), 1))
    }

    #[tokio::test]
    async fn test_dispatch_routes_by_command() {
        let handler = Arc::new(Counting::default());
        let mut registry = ModuleRegistry::new();
        registry
            .register(
                ModuleDescriptor::new("ci", "1.0")
                    .with_command(BotCommand::new("ci", "Start a CI job"), handler.clone()),
            )
            .unwrap();

        registry.dispatch(invocation("ci")).await;
        registry.dispatch(invocation("unknown")).await;

        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
        assert!(registry.handles("ci"));
        assert_eq!(registry.commands(), &[BotCommand::new("ci", "Start a CI job")]);
        assert_eq!(registry.modules(), &[("ci".to_string(), "1.0".to_string())]);
    }

    #[test]
    fn test_duplicate_command_rejected() {
        let mut registry = ModuleRegistry::new();
        registry
            .register(
                ModuleDescriptor::new("ci", "1.0").with_command(
                    BotCommand::new("ci", "Start a CI job"),
                    Arc::new(Counting::default()),
                ),
            )
            .unwrap();

        let err = registry
            .register(
                ModuleDescriptor::new("other", "0.1")
                    .with_command(BotCommand::new("ci", "Also CI"), Arc::new(Counting::default()))
                    .with_task_type("other", Arc::new(Sink)),
            )
            .unwrap_err();

        assert_eq!(
            err,
            RegistryError::DuplicateCommand {
                command: "ci".to_string(),
                first: "ci".to_string(),
                second: "other".to_string(),
            }
        );
        assert_eq!(registry.modules().len(), 1);
        assert_eq!(registry.commands().len(), 1);
    }

    #[test]
    fn test_duplicate_task_type_rejected() {
        let mut registry = ModuleRegistry::new();
        registry
            .register(ModuleDescriptor::new("ci", "1.0").with_task_type("ci", Arc::new(Sink)))
            .unwrap();

        let err = registry
            .register(ModuleDescriptor::new("ci2", "1.0").with_task_type("ci", Arc::new(Sink)))
            .unwrap_err();
        assert_eq!(err, RegistryError::DuplicateTaskType { tag: "ci".to_string() });
    }

    #[test]
    fn test_handler_without_command_rejected() {
        let mut descriptor = ModuleDescriptor::new("broken", "1.0");
        descriptor
            .handlers
            .insert("ghost".to_string(), Arc::new(Counting::default()));

        let err = ModuleRegistry::new().register(descriptor).unwrap_err();
        assert!(matches!(err, RegistryError::UndeclaredCommand { .. }));
    }

    #[test]
    fn test_attach_consumers_moves_task_types() {
        let mut registry = ModuleRegistry::new();
        registry
            .register(ModuleDescriptor::new("ci", "1.0").with_task_type("ci", Arc::new(Sink)))
            .unwrap();

        let (_queue, mut dispatcher) = TaskDispatcher::new();
        registry.attach_consumers(&mut dispatcher).unwrap();

        assert_eq!(dispatcher.tags(), vec!["ci"]);
    }
}
