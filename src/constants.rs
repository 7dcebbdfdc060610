// Constants used throughout the application
// Centralizes tuning values so policy changes happen in one place

// ==================== Watermark Placement ====================

/// Watermark width as a fraction of the base image width
pub const WATERMARK_SCALE_RATIO: f64 = 0.15;

/// Padding from the bottom-right corner as a fraction of the base image height
pub const WATERMARK_PADDING_RATIO: f64 = 0.01;

/// Uniform alpha applied to every watermark pixel (out of 255)
pub const WATERMARK_ALPHA: u8 = 128;

/// JPEG quality for processed output images
pub const OUTPUT_JPEG_QUALITY: u8 = 50;

// ==================== Storage Namespaces ====================

/// Key prefix for uploaded originals
pub const RAW_PREFIX: &str = "raw/";

/// Key prefix for uploaded watermark images
pub const WATERMARK_PREFIX: &str = "watermark/";

/// Key prefix for processed output images
pub const PROCESSED_PREFIX: &str = "processed/";

/// Random bytes per generated asset key (256 bits)
pub const ASSET_KEY_BYTES: usize = 32;

/// Extension used when a media type has no recognizable subtype
pub const FALLBACK_EXTENSION: &str = ".bin";

// ==================== Media Types ====================

/// Media types accepted for upload (base images and watermarks)
pub const ALLOWED_UPLOAD_TYPES: [&str; 2] = ["image/jpeg", "image/png"];

/// Content type of every processed output blob
pub const OUTPUT_CONTENT_TYPE: &str = "image/jpeg";

// ==================== Task Queue ====================

/// Default JetStream stream name for image tasks
pub const DEFAULT_TASK_STREAM: &str = "rakkan-tasks";

/// Default subject image tasks are published to
pub const DEFAULT_TASK_SUBJECT: &str = "rakkan.tasks";

/// Default durable consumer name for the worker
pub const DEFAULT_TASK_CONSUMER: &str = "rakkan-worker";

/// Maximum unacknowledged deliveries in flight per worker (prefetch credit)
pub const DEFAULT_WORKER_CONCURRENCY: usize = 5;

// ==================== Authentication ====================

/// Token issuer claim
pub const TOKEN_ISSUER: &str = "rakkan";

/// Access token lifetime in seconds
pub const ACCESS_TOKEN_TTL_SECS: u64 = 300;

/// Refresh token lifetime in days
pub const REFRESH_TOKEN_TTL_DAYS: i64 = 30;

/// Random bytes per refresh token
pub const REFRESH_TOKEN_BYTES: usize = 32;

/// Minimum accepted password length
pub const MIN_PASSWORD_LENGTH: usize = 8;

// ==================== HTTP Server ====================

/// Default bind address
pub const DEFAULT_SERVER_ADDRESS: &str = "0.0.0.0";

/// Default listen port
pub const DEFAULT_SERVER_PORT: u16 = 3000;

/// Request body cap for multipart batch uploads (50 MiB)
pub const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

// ==================== Database ====================

/// Default connection pool size
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;
