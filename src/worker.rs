//! Queue consumption loop
//!
//! Pulls image tasks off the JetStream consumer and runs each through the
//! `TaskProcessor`, a bounded number at a time. An interrupt stops pulling
//! new deliveries and lets in-flight tasks finish before exiting.

use anyhow::Context;
use async_nats::jetstream::AckKind;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::blobstore::S3BlobStore;
use crate::config::Config;
use crate::processor::TaskProcessor;
use crate::queue::{Directive, ImageTask, NatsTaskQueue};
use crate::records::PostgresRecordStore;

pub async fn run(config: Config) -> anyhow::Result<()> {
    let records =
        PostgresRecordStore::connect(&config.database.url, config.database.max_connections)
            .await
            .context("failed to connect to database")?;
    let blobs = S3BlobStore::from_config(&config.s3).await;
    let queue = NatsTaskQueue::connect("rakkan-worker", &config.nats)
        .await
        .context("failed to connect to nats")?;

    let concurrency = config.worker.concurrency;
    let consumer = queue
        .task_consumer(concurrency)
        .await
        .context("failed to set up task consumer")?;

    let processor = Arc::new(TaskProcessor::new(
        Arc::new(records),
        Arc::new(blobs),
        config.s3.distribution.clone(),
    ));
    let semaphore = Arc::new(Semaphore::new(concurrency));

    let mut messages = consumer
        .messages()
        .await
        .map_err(|e| anyhow::anyhow!("failed to open task stream: {}", e))?;

    info!(concurrency, "worker ready");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received, draining in-flight tasks");
                break;
            }
            next = messages.next() => {
                let message = match next {
                    None => {
                        warn!("task stream closed");
                        break;
                    }
                    // Heartbeat gaps and other delivery hiccups; the stream
                    // keeps going.
                    Some(Err(e)) => {
                        warn!(error = %e, "task stream error");
                        continue;
                    }
                    Some(Ok(message)) => message,
                };

                let task: ImageTask = match serde_json::from_slice(&message.payload) {
                    Ok(task) => task,
                    Err(e) => {
                        warn!(error = %e, "malformed task payload, discarding");
                        if let Err(e) = message.ack_with(AckKind::Term).await {
                            warn!(error = %e, "failed to answer malformed delivery");
                        }
                        continue;
                    }
                };

                let permit = semaphore
                    .clone()
                    .acquire_owned()
                    .await
                    .context("semaphore closed")?;
                let processor = processor.clone();
                tokio::spawn(async move {
                    let directive = processor.process(&task).await;
                    let result = match directive {
                        Directive::Ack => message.ack().await,
                        Directive::Requeue => message.ack_with(AckKind::Nak(None)).await,
                        Directive::Discard => message.ack_with(AckKind::Term).await,
                    };
                    if let Err(e) = result {
                        warn!(image_id = %task.image_id, ?directive, error = %e, "failed to answer task delivery");
                    }
                    drop(permit);
                });
            }
        }
    }

    // Every task holds a permit, so reacquiring full capacity waits out the
    // in-flight ones.
    let _drain = semaphore
        .acquire_many(concurrency as u32)
        .await
        .context("semaphore closed")?;
    info!("worker stopped");

    Ok(())
}
