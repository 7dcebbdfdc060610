//! Bearer-token authentication for the protected API surface.

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use uuid::Uuid;

use super::json_message;
use crate::auth;

/// State handed to the auth middleware.
#[derive(Clone)]
pub struct AuthState {
    pub jwt_secret: String,
}

/// Authenticated user id, injected into request extensions for handlers.
#[derive(Debug, Clone, Copy)]
pub struct CurrentUser(pub Uuid);

/// Validate the bearer access token and expose the caller's user id.
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, Response> {
    let token = match extract_bearer(req.headers()) {
        Some(token) => token.to_string(),
        None => {
            return Err(json_message(
                StatusCode::UNAUTHORIZED,
                "missing or invalid authorization header",
            ))
        }
    };

    let user_id = auth::validate_access_token(&token, &state.jwt_secret)
        .map_err(|_| json_message(StatusCode::UNAUTHORIZED, "invalid or expired token"))?;

    req.extensions_mut().insert(CurrentUser(user_id));
    Ok(next.run(req).await)
}

/// Pull the token out of an `Authorization: Bearer <token>` header.
fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let header = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = header.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        return None;
    }
    Some(token)
}
