//! Image management.

use axum::extract::Path;
use axum::http::StatusCode;
use axum::response::Response;
use axum::Extension;
use tracing::error;
use uuid::Uuid;

use crate::server::middleware::CurrentUser;
use crate::server::{json_message, AppState};

pub async fn delete_image(
    Extension(state): Extension<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(image_id): Path<String>,
) -> Response {
    let image_id = match Uuid::parse_str(&image_id) {
        Ok(id) => id,
        Err(_) => return json_message(StatusCode::BAD_REQUEST, "invalid image ID"),
    };

    match state.records.delete_image(user.0, image_id).await {
        Ok(true) => json_message(StatusCode::OK, "image deleted successfully"),
        Ok(false) => json_message(StatusCode::NOT_FOUND, "image not found"),
        Err(e) => {
            error!(error = %e, "failed to delete image");
            json_message(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
        }
    }
}
