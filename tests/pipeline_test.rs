// End-to-end processing tests against the in-memory stores
// One task travels record -> blobs -> compositor -> processed blob -> completion

use bytes::Bytes;
use image::{ImageFormat, Rgba, RgbaImage};
use rakkan::blobstore::{BlobStore, MemoryBlobStore};
use rakkan::processor::TaskProcessor;
use rakkan::queue::{Directive, ImageTask};
use rakkan::records::{ImageStatus, MemoryRecordStore, RecordStore};
use std::io::Cursor;
use std::sync::Arc;
use uuid::Uuid;

const DISTRIBUTION: &str = "cdn.rakkan.test";
const BASE_KEY: &str = "raw/base.png";
const WATERMARK_KEY: &str = "watermark/logo.png";

struct PipelineContext {
    processor: TaskProcessor,
    records: MemoryRecordStore,
    blobs: MemoryBlobStore,
}

fn pipeline_context() -> PipelineContext {
    let records = MemoryRecordStore::new();
    let blobs = MemoryBlobStore::new();
    let processor = TaskProcessor::new(
        Arc::new(records.clone()),
        Arc::new(blobs.clone()),
        DISTRIBUTION,
    );
    PipelineContext {
        processor,
        records,
        blobs,
    }
}

fn png_bytes(width: u32, height: u32, color: Rgba<u8>) -> Vec<u8> {
    let img = RgbaImage::from_pixel(width, height, color);
    let mut buffer = Cursor::new(Vec::new());
    img.write_to(&mut buffer, ImageFormat::Png).unwrap();
    buffer.into_inner()
}

/// Create a batch with one pending image row pointing at `BASE_KEY`.
/// Blob contents are seeded separately by each test.
async fn seed_image(ctx: &PipelineContext, with_watermark: bool) -> Uuid {
    let user_id = Uuid::new_v4();
    let (key, url) = if with_watermark {
        (
            Some(WATERMARK_KEY),
            Some("https://cdn.rakkan.test/watermark/logo.png"),
        )
    } else {
        (None, None)
    };

    let batch = ctx
        .records
        .create_batch(user_id, "shoot", key, url)
        .await
        .unwrap();
    let image = ctx
        .records
        .create_image(batch.id, BASE_KEY, "https://cdn.rakkan.test/raw/base.png")
        .await
        .unwrap();
    image.id
}

async fn seed_blob(ctx: &PipelineContext, key: &str, data: Vec<u8>) {
    ctx.blobs
        .put(key, Bytes::from(data), "image/png")
        .await
        .unwrap();
}

fn processed_key(ctx: &PipelineContext, image_id: Uuid) -> String {
    let url = ctx.records.processed_url_of(image_id).unwrap();
    url.strip_prefix("https://cdn.rakkan.test/")
        .unwrap()
        .to_string()
}

// Test: a task without a watermark completes and stores a JPEG output
#[tokio::test]
async fn test_process_without_watermark_completes() {
    let ctx = pipeline_context();
    let image_id = seed_image(&ctx, false).await;
    seed_blob(&ctx, BASE_KEY, png_bytes(64, 48, Rgba([10, 20, 30, 255]))).await;

    let directive = ctx.processor.process(&ImageTask { image_id }).await;

    assert_eq!(directive, Directive::Ack);
    assert_eq!(ctx.records.status_of(image_id), Some(ImageStatus::Completed));

    let key = processed_key(&ctx, image_id);
    assert!(key.starts_with("processed/"));
    assert_eq!(ctx.blobs.content_type_of(&key).as_deref(), Some("image/jpeg"));

    // The output decodes back to the base dimensions
    let output = ctx.blobs.get(&key).await.unwrap();
    let decoded = image::load_from_memory(&output).unwrap();
    assert_eq!(decoded.width(), 64);
    assert_eq!(decoded.height(), 48);
}

// Test: a task with a watermark completes the same way
#[tokio::test]
async fn test_process_with_watermark_completes() {
    let ctx = pipeline_context();
    let image_id = seed_image(&ctx, true).await;
    seed_blob(&ctx, BASE_KEY, png_bytes(200, 100, Rgba([255, 255, 255, 255]))).await;
    seed_blob(&ctx, WATERMARK_KEY, png_bytes(40, 20, Rgba([255, 0, 0, 255]))).await;

    let directive = ctx.processor.process(&ImageTask { image_id }).await;

    assert_eq!(directive, Directive::Ack);
    assert_eq!(ctx.records.status_of(image_id), Some(ImageStatus::Completed));

    // raw + watermark + processed
    assert_eq!(ctx.blobs.object_count(), 3);
    let output = ctx.blobs.get(&processed_key(&ctx, image_id)).await.unwrap();
    let decoded = image::load_from_memory(&output).unwrap();
    assert_eq!(decoded.width(), 200);
    assert_eq!(decoded.height(), 100);
}

// Test: a redelivered task re-runs the pipeline and produces a fresh output
#[tokio::test]
async fn test_redelivered_task_processes_again() {
    let ctx = pipeline_context();
    let image_id = seed_image(&ctx, false).await;
    seed_blob(&ctx, BASE_KEY, png_bytes(32, 32, Rgba([0, 0, 0, 255]))).await;
    let task = ImageTask { image_id };

    assert_eq!(ctx.processor.process(&task).await, Directive::Ack);
    let first_key = processed_key(&ctx, image_id);

    assert_eq!(ctx.processor.process(&task).await, Directive::Ack);
    let second_key = processed_key(&ctx, image_id);

    // The record points at the new blob; the old one is orphaned, not removed
    assert_ne!(first_key, second_key);
    assert!(ctx.blobs.contains(&first_key));
    assert!(ctx.blobs.contains(&second_key));
    assert_eq!(ctx.records.status_of(image_id), Some(ImageStatus::Completed));
}

// Test: a task whose record is gone is discarded without touching storage
#[tokio::test]
async fn test_missing_record_discards() {
    let ctx = pipeline_context();

    let directive = ctx
        .processor
        .process(&ImageTask {
            image_id: Uuid::new_v4(),
        })
        .await;

    assert_eq!(directive, Directive::Discard);
    assert_eq!(ctx.blobs.object_count(), 0);
}

// Test: an unreadable original is terminal, the image is marked failed
#[tokio::test]
async fn test_missing_original_blob_fails_image() {
    let ctx = pipeline_context();
    let image_id = seed_image(&ctx, false).await;
    // No blob behind the record's key

    let directive = ctx.processor.process(&ImageTask { image_id }).await;

    assert_eq!(directive, Directive::Discard);
    assert_eq!(ctx.records.status_of(image_id), Some(ImageStatus::Failed));
}

// Test: an unreadable watermark is transient, the task comes back untouched
#[tokio::test]
async fn test_missing_watermark_blob_requeues() {
    let ctx = pipeline_context();
    let image_id = seed_image(&ctx, true).await;
    seed_blob(&ctx, BASE_KEY, png_bytes(64, 48, Rgba([10, 20, 30, 255]))).await;
    // The batch references a watermark key with nothing stored behind it

    let directive = ctx.processor.process(&ImageTask { image_id }).await;

    assert_eq!(directive, Directive::Requeue);
    assert_eq!(ctx.records.status_of(image_id), Some(ImageStatus::Pending));
    assert_eq!(ctx.blobs.object_count(), 1);
}

// Test: undecodable base bytes leave the image in processing for retry
#[tokio::test]
async fn test_corrupt_base_requeues_as_processing() {
    let ctx = pipeline_context();
    let image_id = seed_image(&ctx, false).await;
    seed_blob(&ctx, BASE_KEY, b"definitely not an image".to_vec()).await;

    let directive = ctx.processor.process(&ImageTask { image_id }).await;

    assert_eq!(directive, Directive::Requeue);
    assert_eq!(
        ctx.records.status_of(image_id),
        Some(ImageStatus::Processing)
    );
}

// Test: undecodable watermark bytes requeue without a status change
#[tokio::test]
async fn test_corrupt_watermark_requeues_untouched() {
    let ctx = pipeline_context();
    let image_id = seed_image(&ctx, true).await;
    seed_blob(&ctx, BASE_KEY, png_bytes(64, 48, Rgba([10, 20, 30, 255]))).await;
    seed_blob(&ctx, WATERMARK_KEY, b"garbage watermark".to_vec()).await;

    let directive = ctx.processor.process(&ImageTask { image_id }).await;

    assert_eq!(directive, Directive::Requeue);
    assert_eq!(ctx.records.status_of(image_id), Some(ImageStatus::Pending));
}

// Test: output storage trouble is transient
#[tokio::test]
async fn test_output_store_failure_requeues() {
    let ctx = pipeline_context();
    let image_id = seed_image(&ctx, false).await;
    seed_blob(&ctx, BASE_KEY, png_bytes(64, 48, Rgba([10, 20, 30, 255]))).await;

    ctx.blobs.set_put_failure(true);
    let directive = ctx.processor.process(&ImageTask { image_id }).await;

    assert_eq!(directive, Directive::Requeue);
    assert_eq!(
        ctx.records.status_of(image_id),
        Some(ImageStatus::Processing)
    );
}

// Test: a failed completion update does not bring the task back
#[tokio::test]
async fn test_completion_record_failure_still_acks() {
    let ctx = pipeline_context();
    let image_id = seed_image(&ctx, false).await;
    seed_blob(&ctx, BASE_KEY, png_bytes(64, 48, Rgba([10, 20, 30, 255]))).await;

    ctx.records.set_write_failure(true);
    let directive = ctx.processor.process(&ImageTask { image_id }).await;

    // The processed blob exists; only the record update was lost
    assert_eq!(directive, Directive::Ack);
    assert_eq!(ctx.records.status_of(image_id), Some(ImageStatus::Pending));
    assert_eq!(ctx.blobs.object_count(), 2);
}

// Test: a record-store outage during load discards after marking failed
#[tokio::test]
async fn test_record_load_failure_discards() {
    let ctx = pipeline_context();
    let image_id = seed_image(&ctx, false).await;
    seed_blob(&ctx, BASE_KEY, png_bytes(64, 48, Rgba([10, 20, 30, 255]))).await;

    ctx.records.set_read_failure(true);
    let directive = ctx.processor.process(&ImageTask { image_id }).await;

    assert_eq!(directive, Directive::Discard);
    assert_eq!(ctx.records.status_of(image_id), Some(ImageStatus::Failed));
}
