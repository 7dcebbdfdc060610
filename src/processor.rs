//! Task execution for queued images
//!
//! One `process` call takes a queued task end to end: load the record,
//! fetch the original and watermark blobs, composite, store the output,
//! and mark the record. The returned `Directive` tells the worker how to
//! answer the delivery.

use bytes::Bytes;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::blobstore::key::{generate_asset_key, object_url};
use crate::blobstore::BlobStore;
use crate::compositor::{self, CompositeError};
use crate::constants::{OUTPUT_CONTENT_TYPE, PROCESSED_PREFIX};
use crate::queue::{Directive, ImageTask};
use crate::records::{ImageStatus, RecordStore};

pub struct TaskProcessor {
    records: Arc<dyn RecordStore>,
    blobs: Arc<dyn BlobStore>,
    /// Distribution host processed URLs are built against
    distribution: String,
}

impl TaskProcessor {
    pub fn new(
        records: Arc<dyn RecordStore>,
        blobs: Arc<dyn BlobStore>,
        distribution: impl Into<String>,
    ) -> Self {
        Self {
            records,
            blobs,
            distribution: distribution.into(),
        }
    }

    /// Run one task and decide the fate of its delivery.
    ///
    /// A missing record or unreadable original is terminal: the image is
    /// marked failed and the task discarded. Watermark trouble and storage
    /// hiccups are transient: the task is handed back for redelivery.
    #[instrument(skip(self), fields(image_id = %task.image_id))]
    pub async fn process(&self, task: &ImageTask) -> Directive {
        let image = match self.records.get_image(task.image_id).await {
            Ok(Some(image)) => image,
            Ok(None) => {
                warn!(image_id = %task.image_id, "image record missing, discarding task");
                self.mark(task.image_id, ImageStatus::Failed).await;
                return Directive::Discard;
            }
            Err(e) => {
                warn!(image_id = %task.image_id, error = %e, "failed to load image record, discarding task");
                self.mark(task.image_id, ImageStatus::Failed).await;
                return Directive::Discard;
            }
        };

        let base = match self.blobs.get(&image.key).await {
            Ok(data) => data,
            Err(e) => {
                warn!(image_id = %image.id, key = %image.key, error = %e, "failed to fetch original, discarding task");
                self.mark(image.id, ImageStatus::Failed).await;
                return Directive::Discard;
            }
        };

        let watermark = match &image.watermark_key {
            Some(key) => match self.blobs.get(key).await {
                Ok(data) => Some(data),
                Err(e) => {
                    warn!(image_id = %image.id, key = %key, error = %e, "failed to fetch watermark, requeuing task");
                    return Directive::Requeue;
                }
            },
            None => None,
        };

        let output = match compositor::composite(&base, watermark.as_deref()) {
            Ok(output) => output,
            Err(e @ CompositeError::WatermarkDecode(_)) => {
                // The watermark lives on the batch; a bad upload there may be
                // replaced, so the task stays retryable and the image status
                // untouched.
                warn!(image_id = %image.id, error = %e, "watermark unusable, requeuing task");
                return Directive::Requeue;
            }
            Err(e) => {
                warn!(image_id = %image.id, error = %e, "processing failed, requeuing task");
                self.mark(image.id, ImageStatus::Processing).await;
                return Directive::Requeue;
            }
        };

        let file_name = format!(
            "{}{}",
            PROCESSED_PREFIX,
            generate_asset_key(OUTPUT_CONTENT_TYPE)
        );
        if let Err(e) = self
            .blobs
            .put(&file_name, Bytes::from(output), OUTPUT_CONTENT_TYPE)
            .await
        {
            warn!(image_id = %image.id, key = %file_name, error = %e, "failed to store processed image, requeuing task");
            self.mark(image.id, ImageStatus::Processing).await;
            return Directive::Requeue;
        }

        // The processed object is already durable, so a failed record update
        // only loses the URL; the task is not worth redelivering.
        let processed_url = object_url(&self.distribution, &file_name);
        if let Err(e) = self.records.complete_image(image.id, &processed_url).await {
            warn!(image_id = %image.id, error = %e, "failed to record completion");
        }

        info!(image_id = %image.id, key = %file_name, "image processed");
        Directive::Ack
    }

    /// Best-effort status update; failures are logged and swallowed.
    async fn mark(&self, image_id: Uuid, status: ImageStatus) {
        if let Err(e) = self.records.update_image_status(image_id, status).await {
            warn!(image_id = %image_id, status = %status, error = %e, "failed to update image status");
        }
    }
}
