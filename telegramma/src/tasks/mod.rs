//! In-process background tasks.
//!
//! Modules enqueue work under a task-type tag through a cloneable
//! [`TaskQueue`]. A single [`TaskDispatcher`] drains the queue and hands each
//! task to the consumer registered for its tag, one task at a time.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::errors::RegistryError;

/// Errors raised by queue operations and consumers.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The dispatcher has stopped.
    #[error("task queue is closed")]
    Closed,

    /// The payload could not be encoded or decoded.
    #[error("invalid task payload: {0}")]
    Payload(#[from] serde_json::Error),

    /// The consumer failed to process the task.
    #[error("{0}")]
    Failed(String),
}

/// A unit of background work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedTask {
    /// Unique task id.
    pub id: Uuid,
    /// Task-type tag selecting the consumer.
    pub tag: String,
    /// Consumer-specific payload.
    pub payload: serde_json::Value,
    /// When the task was enqueued.
    pub enqueued_at: DateTime<Utc>,
}

impl QueuedTask {
    /// Creates a task with a fresh time-ordered id.
    pub fn new<T: Serialize>(tag: impl Into<String>, payload: &T) -> Result<Self, TaskError> {
        Ok(Self {
            id: Uuid::now_v7(),
            tag: tag.into(),
            payload: serde_json::to_value(payload)?,
            enqueued_at: Utc::now(),
        })
    }

    /// Decodes the payload.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, TaskError> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}

/// Processes tasks of one type.
#[async_trait]
pub trait TaskConsumer: Send + Sync {
    /// Handles one task.
    async fn consume(&self, task: QueuedTask) -> Result<(), TaskError>;
}

/// Producer handle for the task queue.
#[derive(Debug, Clone)]
pub struct TaskQueue {
    sender: mpsc::UnboundedSender<QueuedTask>,
}

impl TaskQueue {
    /// Enqueues `payload` under `tag`, returning the task id.
    pub fn enqueue<T: Serialize>(&self, tag: &str, payload: &T) -> Result<Uuid, TaskError> {
        let task = QueuedTask::new(tag, payload)?;
        let id = task.id;
        self.sender.send(task).map_err(|_| TaskError::Closed)?;
        debug!(task_id = %id, tag, "Task enqueued");
        Ok(id)
    }
}

/// Drains the queue and routes tasks by tag.
pub struct TaskDispatcher {
    receiver: mpsc::UnboundedReceiver<QueuedTask>,
    consumers: HashMap<String, Arc<dyn TaskConsumer>>,
}

impl std::fmt::Debug for TaskDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskDispatcher")
            .field("consumers", &self.tags())
            .finish_non_exhaustive()
    }
}

impl TaskDispatcher {
    /// Creates a dispatcher and the queue feeding it.
    #[must_use]
    pub fn new() -> (TaskQueue, Self) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            TaskQueue { sender },
            Self {
                receiver,
                consumers: HashMap::new(),
            },
        )
    }

    /// Registers the consumer for `tag`.
    pub fn register(
        &mut self,
        tag: impl Into<String>,
        consumer: Arc<dyn TaskConsumer>,
    ) -> Result<(), RegistryError> {
        let tag = tag.into();
        if self.consumers.contains_key(&tag) {
            return Err(RegistryError::DuplicateTaskType { tag });
        }
        self.consumers.insert(tag, consumer);
        Ok(())
    }

    /// Registered tags, sorted.
    #[must_use]
    pub fn tags(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.consumers.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }

    /// Processes tasks until every [`TaskQueue`] handle is dropped.
    pub async fn run(mut self) {
        info!(consumers = ?self.tags(), "Task dispatcher started");

        while let Some(task) = self.receiver.recv().await {
            let Some(consumer) = self.consumers.get(&task.tag).cloned() else {
                warn!(task_id = %task.id, tag = %task.tag, "No consumer for task type");
                continue;
            };

            let span = info_span!("task", task_id = %task.id, tag = %task.tag);
            async move {
                match consumer.consume(task).await {
                    Ok(()) => debug!("Task finished"),
                    Err(err) => error!(error = %err, "Task failed"),
                }
            }
            .instrument(span)
            .await;
        }

        info!("Task queue closed, dispatcher stopping");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct Recording {
        seen: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl TaskConsumer for Recording {
        async fn consume(&self, task: QueuedTask) -> Result<(), TaskError> {
            let value: String = task.decode()?;
            self.seen.lock().push((task.tag.clone(), value));
            if task.tag == "failing" {
                return Err(TaskError::Failed("boom".to_string()));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_dispatcher_routes_by_tag() {
        let (queue, mut dispatcher) = TaskDispatcher::new();
        let ci = Arc::new(Recording::default());
        let other = Arc::new(Recording::default());
        dispatcher.register("ci", ci.clone()).unwrap();
        dispatcher.register("failing", other.clone()).unwrap();
        assert_eq!(dispatcher.tags(), vec!["ci", "failing"]);

        let first = queue.enqueue("ci", &"lineage").unwrap();
        queue.enqueue("unknown", &"dropped").unwrap();
        queue.enqueue("failing", &"still-handled").unwrap();
        let last = queue.enqueue("ci", &"twrp").unwrap();
        assert_ne!(first, last);
        drop(queue);

        dispatcher.run().await;

        assert_eq!(
            *ci.seen.lock(),
            vec![
                ("ci".to_string(), "lineage".to_string()),
                ("ci".to_string(), "twrp".to_string()),
            ]
        );
        assert_eq!(other.seen.lock().len(), 1);
    }

    #[test]
    fn test_duplicate_tag_rejected() {
        let (_queue, mut dispatcher) = TaskDispatcher::new();
        dispatcher
            .register("ci", Arc::new(Recording::default()))
            .unwrap();

        let err = dispatcher
            .register("ci", Arc::new(Recording::default()))
            .unwrap_err();
        assert_eq!(err, RegistryError::DuplicateTaskType { tag: "ci".to_string() });
    }

    #[test]
    fn test_enqueue_after_dispatcher_dropped() {
        let (queue, dispatcher) = TaskDispatcher::new();
        drop(dispatcher);

        assert!(matches!(queue.enqueue("ci", &"x"), Err(TaskError::Closed)));
    }
}
