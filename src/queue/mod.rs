//! Task queue for handing uploaded images to the worker
//!
//! The server publishes one `ImageTask` per uploaded image; the worker pulls
//! them back off a JetStream work queue and answers each with a `Directive`.

mod memory;
mod nats;

pub use memory::MemoryTaskQueue;
pub use nats::NatsTaskQueue;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Payload queued for the worker, one per uploaded image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageTask {
    pub image_id: Uuid,
}

/// What to do with a delivered task once processing has run its course
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    /// Done with this task, drop it from the queue
    Ack,
    /// Transient trouble, hand the task back for redelivery
    Requeue,
    /// The task can never succeed, drop it without retrying
    Discard,
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("serialize task: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("connect: {0}")]
    Connect(String),
    #[error("stream setup: {0}")]
    Stream(String),
    #[error("consumer setup: {0}")]
    Consumer(String),
    #[error("publish: {0}")]
    Publish(String),
}

/// Producer side of the task queue.
#[async_trait]
pub trait TaskPublisher: Send + Sync {
    async fn publish(&self, task: &ImageTask) -> Result<(), QueueError>;
}
