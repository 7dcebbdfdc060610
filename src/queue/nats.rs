//! JetStream-backed task queue

use async_nats::jetstream::consumer::pull;
use async_nats::jetstream::stream::{RetentionPolicy, Stream};
use async_trait::async_trait;
use std::time::Duration;
use tracing::instrument;

use super::{ImageTask, QueueError, TaskPublisher};
use crate::config::NatsConfig;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const ACK_WAIT: Duration = Duration::from_secs(30);

/// Task queue on a JetStream work-queue stream.
///
/// Work-queue retention keeps each task around until some consumer acks it,
/// so tasks survive worker restarts.
pub struct NatsTaskQueue {
    jetstream: async_nats::jetstream::Context,
    config: NatsConfig,
}

impl NatsTaskQueue {
    pub async fn connect(name: &str, config: &NatsConfig) -> Result<Self, QueueError> {
        let client = async_nats::ConnectOptions::new()
            .connection_timeout(CONNECT_TIMEOUT)
            .name(name)
            .retry_on_initial_connect()
            .connect(&config.url)
            .await
            .map_err(|e| QueueError::Connect(e.to_string()))?;

        Ok(Self {
            jetstream: async_nats::jetstream::new(client),
            config: config.clone(),
        })
    }

    /// Create the task stream if it does not exist yet.
    pub async fn ensure_stream(&self) -> Result<Stream, QueueError> {
        self.jetstream
            .get_or_create_stream(async_nats::jetstream::stream::Config {
                name: self.config.stream.clone(),
                subjects: vec![self.config.subject.clone()],
                retention: RetentionPolicy::WorkQueue,
                ..Default::default()
            })
            .await
            .map_err(|e| QueueError::Stream(e.to_string()))
    }

    /// Durable pull consumer for the worker. Creates the stream and consumer
    /// as needed. `max_in_flight` caps unacked deliveries.
    pub async fn task_consumer(
        &self,
        max_in_flight: usize,
    ) -> Result<async_nats::jetstream::consumer::Consumer<pull::Config>, QueueError> {
        let stream = self.ensure_stream().await?;

        stream
            .get_or_create_consumer(
                &self.config.consumer,
                pull::Config {
                    durable_name: Some(self.config.consumer.clone()),
                    ack_wait: ACK_WAIT,
                    max_ack_pending: max_in_flight as i64,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| QueueError::Consumer(e.to_string()))
    }
}

#[async_trait]
impl TaskPublisher for NatsTaskQueue {
    #[instrument(skip(self), fields(image_id = %task.image_id), err)]
    async fn publish(&self, task: &ImageTask) -> Result<(), QueueError> {
        let payload = serde_json::to_vec(task)?;

        // The second await waits for the JetStream ack, so a published task
        // is durable once this returns.
        self.jetstream
            .publish(self.config.subject.clone(), payload.into())
            .await
            .map_err(|e| QueueError::Publish(e.to_string()))?
            .await
            .map_err(|e| QueueError::Publish(e.to_string()))?;

        Ok(())
    }
}
