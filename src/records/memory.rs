//! In-memory record store for testing (HashMap-backed)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::{
    BatchRecord, BatchSummary, ImageRecord, ImageStatus, RecordStore, RecordStoreError,
    RefreshTokenRecord, UserRecord,
};

#[derive(Clone)]
struct StoredBatch {
    record: BatchRecord,
    deleted: bool,
}

#[derive(Clone)]
struct StoredImage {
    record: ImageRecord,
    deleted: bool,
}

/// Record store that keeps everything in memory for testing
#[derive(Clone, Default)]
pub struct MemoryRecordStore {
    users: Arc<RwLock<HashMap<Uuid, UserRecord>>>,
    refresh_tokens: Arc<RwLock<HashMap<String, RefreshTokenRecord>>>,
    batches: Arc<RwLock<HashMap<Uuid, StoredBatch>>>,
    images: Arc<RwLock<HashMap<Uuid, StoredImage>>>,
    /// Simulate errors if true
    simulate_read_failure: Arc<RwLock<bool>>,
    simulate_write_failure: Arc<RwLock<bool>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable read failure simulation for testing
    pub fn set_read_failure(&self, enabled: bool) {
        *self.simulate_read_failure.write() = enabled;
    }

    /// Enable write failure simulation for testing
    pub fn set_write_failure(&self, enabled: bool) {
        *self.simulate_write_failure.write() = enabled;
    }

    /// Raw image status, bypassing failure simulation and delete filters
    pub fn status_of(&self, image_id: Uuid) -> Option<ImageStatus> {
        self.images.read().get(&image_id).map(|s| s.record.status)
    }

    /// Raw processed URL, bypassing failure simulation and delete filters
    pub fn processed_url_of(&self, image_id: Uuid) -> Option<String> {
        self.images
            .read()
            .get(&image_id)
            .and_then(|s| s.record.processed_url.clone())
    }

    /// Whether an image row still exists at all (soft-deleted included)
    pub fn image_exists(&self, image_id: Uuid) -> bool {
        self.images.read().contains_key(&image_id)
    }

    fn check_read(&self) -> Result<(), RecordStoreError> {
        if *self.simulate_read_failure.read() {
            return Err(RecordStoreError::Unavailable(
                "Simulated read failure".to_string(),
            ));
        }
        Ok(())
    }

    fn check_write(&self) -> Result<(), RecordStoreError> {
        if *self.simulate_write_failure.read() {
            return Err(RecordStoreError::Unavailable(
                "Simulated write failure".to_string(),
            ));
        }
        Ok(())
    }

    fn summarize(&self, batch: &BatchRecord) -> BatchSummary {
        let mut summary = BatchSummary {
            id: batch.id,
            user_id: batch.user_id,
            name: batch.name.clone(),
            watermark_key: batch.watermark_key.clone(),
            watermark_url: batch.watermark_url.clone(),
            image_count: 0,
            pending_count: 0,
            processing_count: 0,
            completed_count: 0,
            failed_count: 0,
            created_at: batch.created_at,
            updated_at: batch.updated_at,
        };

        for stored in self.images.read().values() {
            if stored.record.batch_id != batch.id || stored.deleted {
                continue;
            }
            summary.image_count += 1;
            match stored.record.status {
                ImageStatus::Pending => summary.pending_count += 1,
                ImageStatus::Processing => summary.processing_count += 1,
                ImageStatus::Completed => summary.completed_count += 1,
                ImageStatus::Failed => summary.failed_count += 1,
            }
        }

        summary
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn create_user(
        &self,
        email: &str,
        password_hash: &str,
    ) -> Result<UserRecord, RecordStoreError> {
        self.check_write()?;

        let mut users = self.users.write();
        if users.values().any(|u| u.email == email) {
            return Err(RecordStoreError::Conflict(format!(
                "email already registered: {}",
                email
            )));
        }

        let now = Utc::now();
        let user = UserRecord {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            created_at: now,
            updated_at: now,
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_user_by_email(
        &self,
        email: &str,
    ) -> Result<Option<UserRecord>, RecordStoreError> {
        self.check_read()?;
        Ok(self
            .users
            .read()
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn create_refresh_token(
        &self,
        user_id: Uuid,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<RefreshTokenRecord, RecordStoreError> {
        self.check_write()?;

        let record = RefreshTokenRecord {
            id: Uuid::new_v4(),
            user_id,
            token: token.to_string(),
            expires_at,
            created_at: Utc::now(),
        };
        self.refresh_tokens
            .write()
            .insert(record.token.clone(), record.clone());
        Ok(record)
    }

    async fn get_refresh_token(
        &self,
        token: &str,
    ) -> Result<Option<RefreshTokenRecord>, RecordStoreError> {
        self.check_read()?;
        Ok(self
            .refresh_tokens
            .read()
            .get(token)
            .filter(|r| r.expires_at > Utc::now())
            .cloned())
    }

    async fn create_batch(
        &self,
        user_id: Uuid,
        name: &str,
        watermark_key: Option<&str>,
        watermark_url: Option<&str>,
    ) -> Result<BatchRecord, RecordStoreError> {
        self.check_write()?;

        let now = Utc::now();
        let batch = BatchRecord {
            id: Uuid::new_v4(),
            user_id,
            name: name.to_string(),
            watermark_key: watermark_key.map(String::from),
            watermark_url: watermark_url.map(String::from),
            created_at: now,
            updated_at: now,
        };
        self.batches.write().insert(
            batch.id,
            StoredBatch {
                record: batch.clone(),
                deleted: false,
            },
        );
        Ok(batch)
    }

    async fn get_user_batches(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<BatchSummary>, RecordStoreError> {
        self.check_read()?;

        let records: Vec<BatchRecord> = self
            .batches
            .read()
            .values()
            .filter(|b| !b.deleted && b.record.user_id == user_id)
            .map(|b| b.record.clone())
            .collect();

        let mut summaries: Vec<BatchSummary> =
            records.iter().map(|b| self.summarize(b)).collect();
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(summaries)
    }

    async fn get_user_batch(
        &self,
        user_id: Uuid,
        batch_id: Uuid,
    ) -> Result<Option<BatchRecord>, RecordStoreError> {
        self.check_read()?;

        Ok(self
            .batches
            .read()
            .get(&batch_id)
            .filter(|b| !b.deleted && b.record.user_id == user_id)
            .map(|b| b.record.clone()))
    }

    async fn delete_batch(
        &self,
        user_id: Uuid,
        batch_id: Uuid,
    ) -> Result<bool, RecordStoreError> {
        self.check_write()?;

        let mut batches = self.batches.write();
        match batches.get_mut(&batch_id) {
            Some(stored) if !stored.deleted && stored.record.user_id == user_id => {
                stored.deleted = true;
                stored.record.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn hard_delete_batch(&self, batch_id: Uuid) -> Result<(), RecordStoreError> {
        self.check_write()?;

        self.batches.write().remove(&batch_id);
        self.images
            .write()
            .retain(|_, s| s.record.batch_id != batch_id);
        Ok(())
    }

    async fn create_image(
        &self,
        batch_id: Uuid,
        key: &str,
        original_url: &str,
    ) -> Result<ImageRecord, RecordStoreError> {
        self.check_write()?;

        let now = Utc::now();
        let image = ImageRecord {
            id: Uuid::new_v4(),
            batch_id,
            key: key.to_string(),
            original_url: original_url.to_string(),
            processed_url: None,
            watermark_key: None,
            status: ImageStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        self.images.write().insert(
            image.id,
            StoredImage {
                record: image.clone(),
                deleted: false,
            },
        );
        Ok(image)
    }

    async fn get_image(&self, image_id: Uuid) -> Result<Option<ImageRecord>, RecordStoreError> {
        self.check_read()?;

        let record = self
            .images
            .read()
            .get(&image_id)
            .filter(|s| !s.deleted)
            .map(|s| s.record.clone());

        let mut record = match record {
            Some(r) => r,
            None => return Ok(None),
        };

        let batches = self.batches.read();
        match batches.get(&record.batch_id) {
            Some(batch) if !batch.deleted => {
                record.watermark_key = batch.record.watermark_key.clone();
                Ok(Some(record))
            }
            _ => Ok(None),
        }
    }

    async fn get_images_by_batch(
        &self,
        batch_id: Uuid,
    ) -> Result<Vec<ImageRecord>, RecordStoreError> {
        self.check_read()?;

        let watermark_key = self
            .batches
            .read()
            .get(&batch_id)
            .and_then(|b| b.record.watermark_key.clone());

        let mut images: Vec<ImageRecord> = self
            .images
            .read()
            .values()
            .filter(|s| !s.deleted && s.record.batch_id == batch_id)
            .map(|s| {
                let mut record = s.record.clone();
                record.watermark_key = watermark_key.clone();
                record
            })
            .collect();
        images.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(images)
    }

    async fn update_image_status(
        &self,
        image_id: Uuid,
        status: ImageStatus,
    ) -> Result<(), RecordStoreError> {
        self.check_write()?;

        if let Some(stored) = self.images.write().get_mut(&image_id) {
            stored.record.status = status;
            stored.record.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn complete_image(
        &self,
        image_id: Uuid,
        processed_url: &str,
    ) -> Result<(), RecordStoreError> {
        self.check_write()?;

        if let Some(stored) = self.images.write().get_mut(&image_id) {
            stored.record.status = ImageStatus::Completed;
            stored.record.processed_url = Some(processed_url.to_string());
            stored.record.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn delete_image(
        &self,
        user_id: Uuid,
        image_id: Uuid,
    ) -> Result<bool, RecordStoreError> {
        self.check_write()?;

        let batch_id = self
            .images
            .read()
            .get(&image_id)
            .filter(|s| !s.deleted)
            .map(|s| s.record.batch_id);
        let batch_id = match batch_id {
            Some(id) => id,
            None => return Ok(false),
        };

        let owned = self
            .batches
            .read()
            .get(&batch_id)
            .map(|b| !b.deleted && b.record.user_id == user_id)
            .unwrap_or(false);
        if !owned {
            return Ok(false);
        }

        if let Some(stored) = self.images.write().get_mut(&image_id) {
            stored.deleted = true;
            stored.record.updated_at = Utc::now();
            return Ok(true);
        }
        Ok(false)
    }
}
