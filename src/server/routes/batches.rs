//! Batch upload and management.
//!
//! Creation takes a multipart form: image files, an optional shared
//! watermark, and an optional name. The watermark is handled strictly
//! before the batch row exists; individual files are best-effort, and a
//! batch that ends up with zero stored images is rolled back.

use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, Path};
use axum::http::StatusCode;
use axum::response::Response;
use axum::Extension;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, warn};
use uuid::Uuid;

use crate::blobstore::key::{generate_asset_key, object_url};
use crate::constants::{ALLOWED_UPLOAD_TYPES, RAW_PREFIX, WATERMARK_PREFIX};
use crate::queue::ImageTask;
use crate::records::{BatchRecord, BatchSummary, ImageRecord, ImageStatus};
use crate::server::middleware::CurrentUser;
use crate::server::{json_data, json_message, AppState};

#[derive(Debug, Serialize)]
pub struct BatchSummaryResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub watermark_key: Option<String>,
    pub watermark_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub image_count: i64,
    pub image_pending_count: i64,
    pub image_processing_count: i64,
    pub image_completed_count: i64,
    pub image_failed_count: i64,
}

impl From<&BatchSummary> for BatchSummaryResponse {
    fn from(batch: &BatchSummary) -> Self {
        Self {
            id: batch.id,
            user_id: batch.user_id,
            name: batch.name.clone(),
            watermark_key: batch.watermark_key.clone(),
            watermark_url: batch.watermark_url.clone(),
            created_at: batch.created_at,
            updated_at: batch.updated_at,
            image_count: batch.image_count,
            image_pending_count: batch.pending_count,
            image_processing_count: batch.processing_count,
            image_completed_count: batch.completed_count,
            image_failed_count: batch.failed_count,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ImageResponse {
    pub id: Uuid,
    pub batch_id: Uuid,
    pub key: String,
    pub original_url: String,
    pub processed_url: Option<String>,
    pub status: ImageStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&ImageRecord> for ImageResponse {
    fn from(image: &ImageRecord) -> Self {
        Self {
            id: image.id,
            batch_id: image.batch_id,
            key: image.key.clone(),
            original_url: image.original_url.clone(),
            processed_url: image.processed_url.clone(),
            status: image.status,
            created_at: image.created_at,
            updated_at: image.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BatchDetailResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub watermark_key: Option<String>,
    pub watermark_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub images: Vec<ImageResponse>,
}

impl BatchDetailResponse {
    fn new(batch: &BatchRecord, images: &[ImageRecord]) -> Self {
        Self {
            id: batch.id,
            user_id: batch.user_id,
            name: batch.name.clone(),
            watermark_key: batch.watermark_key.clone(),
            watermark_url: batch.watermark_url.clone(),
            created_at: batch.created_at,
            updated_at: batch.updated_at,
            images: images.iter().map(Into::into).collect(),
        }
    }
}

pub async fn list_batches(
    Extension(state): Extension<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Response {
    match state.records.get_user_batches(user.0).await {
        Ok(batches) => {
            let data: Vec<BatchSummaryResponse> = batches.iter().map(Into::into).collect();
            json_data(StatusCode::OK, "batches retrieved successfully", data)
        }
        Err(e) => {
            error!(error = %e, "failed to list batches");
            json_message(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
        }
    }
}

pub async fn get_batch(
    Extension(state): Extension<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(batch_id): Path<String>,
) -> Response {
    let batch_id = match Uuid::parse_str(&batch_id) {
        Ok(id) => id,
        Err(_) => return json_message(StatusCode::BAD_REQUEST, "invalid batch ID"),
    };

    let batch = match state.records.get_user_batch(user.0, batch_id).await {
        Ok(Some(batch)) => batch,
        Ok(None) => return json_message(StatusCode::NOT_FOUND, "batch not found"),
        Err(e) => {
            error!(error = %e, "failed to load batch");
            return json_message(StatusCode::INTERNAL_SERVER_ERROR, "internal server error");
        }
    };

    let images = match state.records.get_images_by_batch(batch.id).await {
        Ok(images) => images,
        Err(e) => {
            error!(error = %e, "failed to load batch images");
            return json_message(StatusCode::INTERNAL_SERVER_ERROR, "internal server error");
        }
    };

    json_data(
        StatusCode::OK,
        "batch retrieved successfully",
        BatchDetailResponse::new(&batch, &images),
    )
}

struct UploadedPart {
    content_type: String,
    data: Bytes,
}

pub async fn create_batch(
    Extension(state): Extension<AppState>,
    Extension(user): Extension<CurrentUser>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let mut multipart = match multipart {
        Ok(multipart) => multipart,
        Err(_) => return json_message(StatusCode::BAD_REQUEST, "invalid form data"),
    };

    let mut name = String::new();
    let mut watermark: Option<UploadedPart> = None;
    let mut watermark_parts = 0usize;
    let mut files: Vec<UploadedPart> = Vec::new();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(_) => return json_message(StatusCode::BAD_REQUEST, "invalid form data"),
        };

        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "name" => match field.text().await {
                Ok(text) => name = text,
                Err(_) => return json_message(StatusCode::BAD_REQUEST, "invalid form data"),
            },
            "watermark" => {
                watermark_parts += 1;
                if watermark_parts > 1 {
                    continue;
                }
                let content_type = field.content_type().unwrap_or_default().to_string();
                match field.bytes().await {
                    Ok(data) => watermark = Some(UploadedPart { content_type, data }),
                    Err(_) => return json_message(StatusCode::BAD_REQUEST, "invalid form data"),
                }
            }
            "files" => {
                let content_type = field.content_type().unwrap_or_default().to_string();
                match field.bytes().await {
                    Ok(data) => files.push(UploadedPart { content_type, data }),
                    Err(_) => return json_message(StatusCode::BAD_REQUEST, "invalid form data"),
                }
            }
            _ => {}
        }
    }

    if files.is_empty() {
        return json_message(StatusCode::BAD_REQUEST, "no files uploaded");
    }
    if watermark_parts > 1 {
        return json_message(StatusCode::BAD_REQUEST, "only one watermark file allowed");
    }

    // The watermark is shared by the whole batch, so any problem with it
    // fails the request outright before anything is persisted.
    let mut watermark_key: Option<String> = None;
    let mut watermark_url: Option<String> = None;
    if let Some(upload) = watermark {
        let media_type = match parse_media_type(&upload.content_type) {
            Some(media_type) => media_type,
            None => return json_message(StatusCode::BAD_REQUEST, "invalid watermark file"),
        };
        if !ALLOWED_UPLOAD_TYPES.contains(&media_type.as_str()) {
            return json_message(StatusCode::BAD_REQUEST, "unsupported watermark file type");
        }

        let key = format!("{}{}", WATERMARK_PREFIX, generate_asset_key(&media_type));
        if let Err(e) = state.blobs.put(&key, upload.data, &media_type).await {
            error!(error = %e, "failed to store watermark");
            return json_message(StatusCode::INTERNAL_SERVER_ERROR, "internal server error");
        }
        watermark_url = Some(object_url(&state.distribution, &key));
        watermark_key = Some(key);
    }

    let batch = match state
        .records
        .create_batch(
            user.0,
            &name,
            watermark_key.as_deref(),
            watermark_url.as_deref(),
        )
        .await
    {
        Ok(batch) => batch,
        Err(e) => {
            error!(error = %e, "failed to create batch");
            return json_message(StatusCode::INTERNAL_SERVER_ERROR, "internal server error");
        }
    };

    // Files are best-effort: a bad file is skipped, not fatal. An image only
    // counts once its task is published; a row whose publish failed stays
    // pending with nothing behind it.
    let mut stored = 0usize;
    for upload in files {
        let media_type = match parse_media_type(&upload.content_type) {
            Some(media_type) => media_type,
            None => {
                warn!(batch_id = %batch.id, "skipping file with unreadable content type");
                continue;
            }
        };
        if !ALLOWED_UPLOAD_TYPES.contains(&media_type.as_str()) {
            warn!(batch_id = %batch.id, media_type = %media_type, "skipping file with unsupported type");
            continue;
        }

        let key = format!("{}{}", RAW_PREFIX, generate_asset_key(&media_type));
        if let Err(e) = state.blobs.put(&key, upload.data, &media_type).await {
            warn!(batch_id = %batch.id, error = %e, "failed to store file, skipping");
            continue;
        }

        let original_url = object_url(&state.distribution, &key);
        let image = match state
            .records
            .create_image(batch.id, &key, &original_url)
            .await
        {
            Ok(image) => image,
            Err(e) => {
                warn!(batch_id = %batch.id, error = %e, "failed to record image, skipping");
                continue;
            }
        };

        let task = ImageTask { image_id: image.id };
        if let Err(e) = state.tasks.publish(&task).await {
            warn!(image_id = %image.id, error = %e, "failed to publish task for image");
            continue;
        }

        stored += 1;
    }

    if stored == 0 {
        if let Err(e) = state.records.hard_delete_batch(batch.id).await {
            error!(batch_id = %batch.id, error = %e, "failed to roll back empty batch");
        }
        return json_message(
            StatusCode::BAD_REQUEST,
            "failed to create batch: no valid images uploaded",
        );
    }

    json_message(StatusCode::CREATED, "batch created successfully")
}

pub async fn delete_batch(
    Extension(state): Extension<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(batch_id): Path<String>,
) -> Response {
    let batch_id = match Uuid::parse_str(&batch_id) {
        Ok(id) => id,
        Err(_) => return json_message(StatusCode::BAD_REQUEST, "invalid batch ID"),
    };

    match state.records.delete_batch(user.0, batch_id).await {
        Ok(true) => json_message(StatusCode::OK, "batch deleted successfully"),
        Ok(false) => json_message(StatusCode::NOT_FOUND, "batch not found"),
        Err(e) => {
            error!(error = %e, "failed to delete batch");
            json_message(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
        }
    }
}

/// Normalize a part's content type down to its `type/subtype` essence.
fn parse_media_type(raw: &str) -> Option<String> {
    let essence = raw.split(';').next()?.trim().to_ascii_lowercase();
    if essence.is_empty() {
        return None;
    }
    Some(essence)
}
