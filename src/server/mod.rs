//! HTTP API: auth endpoints, batch upload, batch and image management.
//!
//! Handlers receive their collaborators through `AppState`, injected as a
//! request extension. The protected surface sits behind a bearer-token
//! middleware that resolves the caller's user id.

pub mod middleware;
pub mod routes;

use anyhow::Context as _;
use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Extension, Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::blobstore::{BlobStore, S3BlobStore};
use crate::config::Config;
use crate::constants::MAX_UPLOAD_BYTES;
use crate::queue::{NatsTaskQueue, TaskPublisher};
use crate::records::{PostgresRecordStore, RecordStore};
use middleware::AuthState;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub records: Arc<dyn RecordStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub tasks: Arc<dyn TaskPublisher>,
    /// Public domain stored objects are served from
    pub distribution: String,
    pub jwt_secret: String,
}

/// JSON envelope with a message only.
pub(crate) fn json_message(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(serde_json::json!({ "message": message.into() })),
    )
        .into_response()
}

/// JSON envelope with a message and a data payload.
pub(crate) fn json_data<T: Serialize>(status: StatusCode, message: &str, data: T) -> Response {
    (
        status,
        Json(serde_json::json!({ "message": message, "data": data })),
    )
        .into_response()
}

async fn service_name() -> &'static str {
    "rakkan"
}

/// Assemble the full router around the given state.
pub fn build_app(state: AppState) -> Router {
    let auth_state = AuthState {
        jwt_secret: state.jwt_secret.clone(),
    };

    let protected = Router::new()
        .route(
            "/batches",
            get(routes::batches::list_batches).post(routes::batches::create_batch),
        )
        .route(
            "/batches/:batch_id",
            get(routes::batches::get_batch).delete(routes::batches::delete_batch),
        )
        .route("/images/:image_id", delete(routes::images::delete_image))
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            middleware::auth_middleware,
        ));

    let api = Router::new()
        .route("/register", post(routes::auth::register))
        .route("/login", post(routes::auth::login))
        .route("/refresh", post(routes::auth::refresh))
        .merge(protected);

    Router::new()
        .route("/", get(service_name))
        .nest("/api/v1", api)
        .layer(Extension(state))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
}

/// Run the HTTP server until ctrl-c.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let records =
        PostgresRecordStore::connect(&config.database.url, config.database.max_connections)
            .await
            .context("failed to connect to database")?;
    let blobs = S3BlobStore::from_config(&config.s3).await;
    let queue = NatsTaskQueue::connect("rakkan-server", &config.nats)
        .await
        .context("failed to connect to NATS")?;
    // Publishing needs the stream to exist; provision it up front rather
    // than on the first upload.
    queue
        .ensure_stream()
        .await
        .context("failed to provision task stream")?;

    let state = AppState {
        records: Arc::new(records),
        blobs: Arc::new(blobs),
        tasks: Arc::new(queue),
        distribution: config.s3.distribution.clone(),
        jwt_secret: config.jwt.secret.clone(),
    };
    let app = build_app(state);

    let address = format!("{}:{}", config.server.address, config.server.port);
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {}", address))?;
    info!(%address, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("server exited")?;

    info!("server stopped");
    Ok(())
}
