//! Record storage for users, batches, and images
//!
//! The `RecordStore` trait abstracts the relational database so the HTTP
//! server and the worker can share one interface. `PostgresRecordStore` is
//! the production implementation; `MemoryRecordStore` backs tests.

mod memory;
mod postgres;

pub use memory::MemoryRecordStore;
pub use postgres::PostgresRecordStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Record Types
// ============================================================================

/// Processing state of a single uploaded image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ImageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageStatus::Pending => "pending",
            ImageStatus::Processing => "processing",
            ImageStatus::Completed => "completed",
            ImageStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ImageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ImageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ImageStatus::Pending),
            "processing" => Ok(ImageStatus::Processing),
            "completed" => Ok(ImageStatus::Completed),
            "failed" => Ok(ImageStatus::Failed),
            other => Err(format!("unknown image status: {}", other)),
        }
    }
}

/// Registered account
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Long-lived refresh token issued at login
#[derive(Debug, Clone)]
pub struct RefreshTokenRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Upload batch owned by a user
#[derive(Debug, Clone)]
pub struct BatchRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub watermark_key: Option<String>,
    pub watermark_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Batch with per-status image counts, as returned by listings
#[derive(Debug, Clone)]
pub struct BatchSummary {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub watermark_key: Option<String>,
    pub watermark_url: Option<String>,
    pub image_count: i64,
    pub pending_count: i64,
    pub processing_count: i64,
    pub completed_count: i64,
    pub failed_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Single uploaded image
#[derive(Debug, Clone)]
pub struct ImageRecord {
    pub id: Uuid,
    pub batch_id: Uuid,
    pub key: String,
    pub original_url: String,
    pub processed_url: Option<String>,
    /// Lives on the owning batch row; resolved when the image is loaded for
    /// processing, `None` straight after creation.
    pub watermark_key: Option<String>,
    pub status: ImageStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum RecordStoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("record store unavailable: {0}")]
    Unavailable(String),
}

// ============================================================================
// Store Trait
// ============================================================================

/// Relational storage shared by the HTTP server and the worker.
///
/// Batch and image reads are scoped to a user where the operation is
/// user-facing; worker-facing reads (`get_image`) are unscoped. Deletes are
/// soft except `hard_delete_batch`, which rolls back a failed upload.
#[async_trait]
pub trait RecordStore: Send + Sync {
    // Users
    async fn create_user(
        &self,
        email: &str,
        password_hash: &str,
    ) -> Result<UserRecord, RecordStoreError>;
    async fn get_user_by_email(&self, email: &str)
        -> Result<Option<UserRecord>, RecordStoreError>;

    // Refresh tokens
    async fn create_refresh_token(
        &self,
        user_id: Uuid,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<RefreshTokenRecord, RecordStoreError>;
    /// Look up a refresh token. Expired tokens are treated as absent.
    async fn get_refresh_token(
        &self,
        token: &str,
    ) -> Result<Option<RefreshTokenRecord>, RecordStoreError>;

    // Batches
    async fn create_batch(
        &self,
        user_id: Uuid,
        name: &str,
        watermark_key: Option<&str>,
        watermark_url: Option<&str>,
    ) -> Result<BatchRecord, RecordStoreError>;
    /// List a user's live batches, newest first, with image counters.
    async fn get_user_batches(&self, user_id: Uuid)
        -> Result<Vec<BatchSummary>, RecordStoreError>;
    async fn get_user_batch(
        &self,
        user_id: Uuid,
        batch_id: Uuid,
    ) -> Result<Option<BatchRecord>, RecordStoreError>;
    /// Soft-delete a batch owned by `user_id`. Returns false when no live
    /// batch matched.
    async fn delete_batch(&self, user_id: Uuid, batch_id: Uuid)
        -> Result<bool, RecordStoreError>;
    /// Remove a batch and its images outright. Used to roll back a batch
    /// whose uploads all failed.
    async fn hard_delete_batch(&self, batch_id: Uuid) -> Result<(), RecordStoreError>;

    // Images
    async fn create_image(
        &self,
        batch_id: Uuid,
        key: &str,
        original_url: &str,
    ) -> Result<ImageRecord, RecordStoreError>;
    /// Load an image for processing, with the owning batch's watermark key
    /// attached. Soft-deleted images and batches are treated as absent.
    async fn get_image(&self, image_id: Uuid) -> Result<Option<ImageRecord>, RecordStoreError>;
    async fn get_images_by_batch(
        &self,
        batch_id: Uuid,
    ) -> Result<Vec<ImageRecord>, RecordStoreError>;
    async fn update_image_status(
        &self,
        image_id: Uuid,
        status: ImageStatus,
    ) -> Result<(), RecordStoreError>;
    /// Mark an image completed and record where the processed copy lives.
    async fn complete_image(
        &self,
        image_id: Uuid,
        processed_url: &str,
    ) -> Result<(), RecordStoreError>;
    /// Soft-delete an image, only if one of `user_id`'s batches owns it.
    /// Returns false when no live image matched.
    async fn delete_image(&self, user_id: Uuid, image_id: Uuid)
        -> Result<bool, RecordStoreError>;
}
