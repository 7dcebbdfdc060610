//! Postgres-backed record store
//!
//! Runtime queries with hand-written row mappings. Soft deletes are
//! filtered with `deleted_at IS NULL` in every user-facing query; batch
//! ownership is enforced in the WHERE clause rather than checked after
//! the fact.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tracing::instrument;
use uuid::Uuid;

use super::{
    BatchRecord, BatchSummary, ImageRecord, ImageStatus, RecordStore, RecordStoreError,
    RefreshTokenRecord, UserRecord,
};

#[derive(Clone)]
pub struct PostgresRecordStore {
    pool: PgPool,
}

impl PostgresRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to the database and build a store around a fresh pool.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, RecordStoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        Ok(Self { pool })
    }
}

/// Check if an error is a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            return code.as_ref() == "23505";
        }
    }
    false
}

// ============================================================================
// Row Mappings
// ============================================================================

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for UserRecord {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(UserRecord {
            id: row.try_get("id")?,
            email: row.try_get("email")?,
            password_hash: row.try_get("password_hash")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for RefreshTokenRecord {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(RefreshTokenRecord {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            token: row.try_get("token")?,
            expires_at: row.try_get("expires_at")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for BatchRecord {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(BatchRecord {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            name: row.try_get("name")?,
            watermark_key: row.try_get("watermark_key")?,
            watermark_url: row.try_get("watermark_url")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for BatchSummary {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(BatchSummary {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            name: row.try_get("name")?,
            watermark_key: row.try_get("watermark_key")?,
            watermark_url: row.try_get("watermark_url")?,
            image_count: row.try_get("image_count")?,
            pending_count: row.try_get("pending_count")?,
            processing_count: row.try_get("processing_count")?,
            completed_count: row.try_get("completed_count")?,
            failed_count: row.try_get("failed_count")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for ImageRecord {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        // Only the processing queries join the batch row in; plain image
        // queries carry no watermark_key column.
        let watermark_key = match row.try_get("watermark_key") {
            Ok(value) => value,
            Err(sqlx::Error::ColumnNotFound(_)) => None,
            Err(e) => return Err(e),
        };

        let status: String = row.try_get("status")?;
        let status = status
            .parse::<ImageStatus>()
            .map_err(|e| sqlx::Error::ColumnDecode {
                index: "status".into(),
                source: e.into(),
            })?;

        Ok(ImageRecord {
            id: row.try_get("id")?,
            batch_id: row.try_get("batch_id")?,
            key: row.try_get("key")?,
            original_url: row.try_get("original_url")?,
            processed_url: row.try_get("processed_url")?,
            watermark_key,
            status,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

// ============================================================================
// Store Implementation
// ============================================================================

const BATCH_SUMMARY_COLUMNS: &str = r#"
    b.id,
    b.user_id,
    b.name,
    b.watermark_key,
    b.watermark_url,
    b.created_at,
    b.updated_at,
    COUNT(i.id) AS image_count,
    COUNT(i.id) FILTER (WHERE i.status = 'pending') AS pending_count,
    COUNT(i.id) FILTER (WHERE i.status = 'processing') AS processing_count,
    COUNT(i.id) FILTER (WHERE i.status = 'completed') AS completed_count,
    COUNT(i.id) FILTER (WHERE i.status = 'failed') AS failed_count
"#;

#[async_trait]
impl RecordStore for PostgresRecordStore {
    #[instrument(skip(self, password_hash), err)]
    async fn create_user(
        &self,
        email: &str,
        password_hash: &str,
    ) -> Result<UserRecord, RecordStoreError> {
        let user = sqlx::query_as::<_, UserRecord>(
            r#"
            INSERT INTO users (email, password_hash)
            VALUES ($1, $2)
            RETURNING id, email, password_hash, created_at, updated_at
            "#,
        )
        .bind(email)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                RecordStoreError::Conflict(format!("email already registered: {}", email))
            } else {
                RecordStoreError::Database(e)
            }
        })?;
        Ok(user)
    }

    #[instrument(skip(self), err)]
    async fn get_user_by_email(
        &self,
        email: &str,
    ) -> Result<Option<UserRecord>, RecordStoreError> {
        let user = sqlx::query_as::<_, UserRecord>(
            r#"
            SELECT id, email, password_hash, created_at, updated_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    #[instrument(skip(self, token), err)]
    async fn create_refresh_token(
        &self,
        user_id: Uuid,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<RefreshTokenRecord, RecordStoreError> {
        let record = sqlx::query_as::<_, RefreshTokenRecord>(
            r#"
            INSERT INTO refresh_tokens (user_id, token, expires_at)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, token, expires_at, created_at
            "#,
        )
        .bind(user_id)
        .bind(token)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(record)
    }

    #[instrument(skip(self, token), err)]
    async fn get_refresh_token(
        &self,
        token: &str,
    ) -> Result<Option<RefreshTokenRecord>, RecordStoreError> {
        let record = sqlx::query_as::<_, RefreshTokenRecord>(
            r#"
            SELECT id, user_id, token, expires_at, created_at
            FROM refresh_tokens
            WHERE token = $1 AND expires_at > now()
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    #[instrument(skip(self), err)]
    async fn create_batch(
        &self,
        user_id: Uuid,
        name: &str,
        watermark_key: Option<&str>,
        watermark_url: Option<&str>,
    ) -> Result<BatchRecord, RecordStoreError> {
        let batch = sqlx::query_as::<_, BatchRecord>(
            r#"
            INSERT INTO batches (user_id, name, watermark_key, watermark_url)
            VALUES ($1, $2, $3, $4)
            RETURNING id, user_id, name, watermark_key, watermark_url, created_at, updated_at
            "#,
        )
        .bind(user_id)
        .bind(name)
        .bind(watermark_key)
        .bind(watermark_url)
        .fetch_one(&self.pool)
        .await?;
        Ok(batch)
    }

    #[instrument(skip(self), err)]
    async fn get_user_batches(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<BatchSummary>, RecordStoreError> {
        let query = format!(
            r#"
            SELECT {BATCH_SUMMARY_COLUMNS}
            FROM batches b
            LEFT JOIN images i ON i.batch_id = b.id AND i.deleted_at IS NULL
            WHERE b.user_id = $1 AND b.deleted_at IS NULL
            GROUP BY b.id
            ORDER BY b.created_at DESC
            "#
        );
        let batches = sqlx::query_as::<_, BatchSummary>(&query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(batches)
    }

    #[instrument(skip(self), err)]
    async fn get_user_batch(
        &self,
        user_id: Uuid,
        batch_id: Uuid,
    ) -> Result<Option<BatchRecord>, RecordStoreError> {
        let batch = sqlx::query_as::<_, BatchRecord>(
            r#"
            SELECT id, user_id, name, watermark_key, watermark_url, created_at, updated_at
            FROM batches
            WHERE user_id = $1 AND id = $2 AND deleted_at IS NULL
            "#,
        )
        .bind(user_id)
        .bind(batch_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(batch)
    }

    #[instrument(skip(self), err)]
    async fn delete_batch(
        &self,
        user_id: Uuid,
        batch_id: Uuid,
    ) -> Result<bool, RecordStoreError> {
        let result = sqlx::query(
            r#"
            UPDATE batches
            SET deleted_at = now(), updated_at = now()
            WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL
            "#,
        )
        .bind(batch_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), err)]
    async fn hard_delete_batch(&self, batch_id: Uuid) -> Result<(), RecordStoreError> {
        // Images go with it via ON DELETE CASCADE.
        sqlx::query("DELETE FROM batches WHERE id = $1")
            .bind(batch_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn create_image(
        &self,
        batch_id: Uuid,
        key: &str,
        original_url: &str,
    ) -> Result<ImageRecord, RecordStoreError> {
        let image = sqlx::query_as::<_, ImageRecord>(
            r#"
            INSERT INTO images (batch_id, key, original_url)
            VALUES ($1, $2, $3)
            RETURNING id, batch_id, key, original_url, processed_url, status, created_at, updated_at
            "#,
        )
        .bind(batch_id)
        .bind(key)
        .bind(original_url)
        .fetch_one(&self.pool)
        .await?;
        Ok(image)
    }

    #[instrument(skip(self), err)]
    async fn get_image(&self, image_id: Uuid) -> Result<Option<ImageRecord>, RecordStoreError> {
        let image = sqlx::query_as::<_, ImageRecord>(
            r#"
            SELECT
                i.id,
                i.batch_id,
                i.key,
                i.original_url,
                i.processed_url,
                i.status,
                i.created_at,
                i.updated_at,
                b.watermark_key
            FROM images i
            JOIN batches b ON b.id = i.batch_id
            WHERE i.id = $1 AND i.deleted_at IS NULL AND b.deleted_at IS NULL
            "#,
        )
        .bind(image_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(image)
    }

    #[instrument(skip(self), err)]
    async fn get_images_by_batch(
        &self,
        batch_id: Uuid,
    ) -> Result<Vec<ImageRecord>, RecordStoreError> {
        let images = sqlx::query_as::<_, ImageRecord>(
            r#"
            SELECT
                i.id,
                i.batch_id,
                i.key,
                i.original_url,
                i.processed_url,
                i.status,
                i.created_at,
                i.updated_at,
                b.watermark_key
            FROM images i
            JOIN batches b ON b.id = i.batch_id
            WHERE i.batch_id = $1 AND i.deleted_at IS NULL
            ORDER BY i.created_at ASC
            "#,
        )
        .bind(batch_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(images)
    }

    #[instrument(skip(self), err)]
    async fn update_image_status(
        &self,
        image_id: Uuid,
        status: ImageStatus,
    ) -> Result<(), RecordStoreError> {
        sqlx::query(
            r#"
            UPDATE images
            SET status = $2, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(image_id)
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn complete_image(
        &self,
        image_id: Uuid,
        processed_url: &str,
    ) -> Result<(), RecordStoreError> {
        sqlx::query(
            r#"
            UPDATE images
            SET status = 'completed', processed_url = $2, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(image_id)
        .bind(processed_url)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn delete_image(
        &self,
        user_id: Uuid,
        image_id: Uuid,
    ) -> Result<bool, RecordStoreError> {
        let result = sqlx::query(
            r#"
            UPDATE images
            SET deleted_at = now(), updated_at = now()
            WHERE id = $1
              AND deleted_at IS NULL
              AND batch_id IN (
                  SELECT id FROM batches WHERE user_id = $2 AND deleted_at IS NULL
              )
            "#,
        )
        .bind(image_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
