//! In-memory task queue for testing

use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use uuid::Uuid;

use super::{ImageTask, QueueError, TaskPublisher};

/// Publisher that records tasks instead of sending them anywhere
#[derive(Clone, Default)]
pub struct MemoryTaskQueue {
    published: Arc<RwLock<Vec<ImageTask>>>,
    /// Simulate errors if true
    simulate_publish_failure: Arc<RwLock<bool>>,
}

impl MemoryTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable publish failure simulation for testing
    pub fn set_publish_failure(&self, enabled: bool) {
        *self.simulate_publish_failure.write() = enabled;
    }

    /// Number of tasks published so far
    pub fn published_count(&self) -> usize {
        self.published.read().len()
    }

    /// Image ids of published tasks, in publish order
    pub fn published_ids(&self) -> Vec<Uuid> {
        self.published.read().iter().map(|t| t.image_id).collect()
    }

    /// Clear recorded tasks
    pub fn clear(&self) {
        self.published.write().clear();
    }
}

#[async_trait]
impl TaskPublisher for MemoryTaskQueue {
    async fn publish(&self, task: &ImageTask) -> Result<(), QueueError> {
        if *self.simulate_publish_failure.read() {
            return Err(QueueError::Publish(
                "Simulated publish failure".to_string(),
            ));
        }

        self.published.write().push(*task);
        Ok(())
    }
}
