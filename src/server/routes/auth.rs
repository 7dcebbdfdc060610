//! Registration, login, and token refresh.

use axum::extract::rejection::JsonRejection;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::Response;
use axum::{Extension, Json};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::error;
use uuid::Uuid;

use crate::auth;
use crate::constants::REFRESH_TOKEN_TTL_DAYS;
use crate::records::{RecordStoreError, UserRecord};
use crate::server::{json_data, json_message, AppState};

/// Cookie clearing the refresh token on the client.
const CLEAR_REFRESH_COOKIE: &str = "refresh_token=; Path=/; Max-Age=0; HttpOnly; Secure";

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&UserRecord> for UserResponse {
    fn from(user: &UserRecord) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

pub async fn register(
    Extension(state): Extension<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Response {
    let body = match payload {
        Ok(Json(body)) => body,
        Err(_) => return json_message(StatusCode::BAD_REQUEST, "invalid request body"),
    };

    if let Err(msg) = auth::validate_email(&body.email) {
        return json_message(StatusCode::BAD_REQUEST, msg);
    }
    if let Err(msg) = auth::validate_password(&body.password) {
        return json_message(StatusCode::BAD_REQUEST, msg);
    }

    let password_hash = match auth::hash_password(&body.password) {
        Ok(hash) => hash,
        Err(e) => {
            error!(error = %e, "failed to hash password");
            return json_message(StatusCode::INTERNAL_SERVER_ERROR, "internal server error");
        }
    };

    match state.records.create_user(&body.email, &password_hash).await {
        Ok(user) => json_data(
            StatusCode::CREATED,
            "register success",
            UserResponse::from(&user),
        ),
        Err(RecordStoreError::Conflict(_)) => {
            json_message(StatusCode::CONFLICT, "email already registered")
        }
        Err(e) => {
            error!(error = %e, "failed to create user");
            json_message(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
        }
    }
}

pub async fn login(
    Extension(state): Extension<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Response {
    let body = match payload {
        Ok(Json(body)) => body,
        Err(_) => return json_message(StatusCode::BAD_REQUEST, "invalid request body"),
    };

    let user = match state.records.get_user_by_email(&body.email).await {
        Ok(Some(user)) => user,
        Ok(None) => return json_message(StatusCode::UNAUTHORIZED, "invalid email or password"),
        Err(e) => {
            error!(error = %e, "failed to look up user");
            return json_message(StatusCode::INTERNAL_SERVER_ERROR, "internal server error");
        }
    };

    if !auth::verify_password(&user.password_hash, &body.password) {
        return json_message(StatusCode::UNAUTHORIZED, "invalid email or password");
    }

    let access_token = match auth::generate_access_token(user.id, &state.jwt_secret) {
        Ok(token) => token,
        Err(e) => {
            error!(error = %e, "failed to issue access token");
            return json_message(StatusCode::INTERNAL_SERVER_ERROR, "internal server error");
        }
    };

    let refresh_token = auth::generate_refresh_token();
    let expires_at = Utc::now() + Duration::days(REFRESH_TOKEN_TTL_DAYS);
    if let Err(e) = state
        .records
        .create_refresh_token(user.id, &refresh_token, expires_at)
        .await
    {
        error!(error = %e, "failed to persist refresh token");
        return json_message(StatusCode::INTERNAL_SERVER_ERROR, "internal server error");
    }

    let mut response = json_data(
        StatusCode::OK,
        "login success",
        serde_json::json!({
            "access_token": access_token,
            "refresh_token": refresh_token,
            "user": UserResponse::from(&user),
        }),
    );
    if let Ok(cookie) = HeaderValue::from_str(&refresh_cookie(&refresh_token, expires_at)) {
        response.headers_mut().append(header::SET_COOKIE, cookie);
    }
    response
}

pub async fn refresh(Extension(state): Extension<AppState>, headers: HeaderMap) -> Response {
    let token = match refresh_token_from(&headers) {
        Some(token) => token,
        None => return json_message(StatusCode::UNAUTHORIZED, "no token"),
    };

    let record = match state.records.get_refresh_token(&token).await {
        Ok(Some(record)) => record,
        Ok(None) => {
            // Unknown or expired token; tell the client to drop its cookie.
            let mut response = json_message(StatusCode::UNAUTHORIZED, "invalid token");
            response.headers_mut().append(
                header::SET_COOKIE,
                HeaderValue::from_static(CLEAR_REFRESH_COOKIE),
            );
            return response;
        }
        Err(e) => {
            error!(error = %e, "failed to look up refresh token");
            return json_message(StatusCode::INTERNAL_SERVER_ERROR, "internal server error");
        }
    };

    let access_token = match auth::generate_access_token(record.user_id, &state.jwt_secret) {
        Ok(token) => token,
        Err(e) => {
            error!(error = %e, "failed to issue access token");
            return json_message(StatusCode::INTERNAL_SERVER_ERROR, "internal server error");
        }
    };

    json_data(
        StatusCode::OK,
        "token refreshed successfully",
        serde_json::json!({ "access_token": access_token }),
    )
}

/// Session cookie carrying the refresh token.
fn refresh_cookie(token: &str, expires_at: DateTime<Utc>) -> String {
    format!(
        "refresh_token={}; Path=/; Expires={}; HttpOnly; Secure",
        token,
        expires_at.format("%a, %d %b %Y %H:%M:%S GMT")
    )
}

/// Refresh token from the session cookie, falling back to the bearer header.
fn refresh_token_from(headers: &HeaderMap) -> Option<String> {
    if let Some(cookies) = headers.get(header::COOKIE).and_then(|v| v.to_str().ok()) {
        for pair in cookies.split(';') {
            if let Some((name, value)) = pair.trim().split_once('=') {
                if name == "refresh_token" && !value.is_empty() {
                    return Some(value.to_string());
                }
            }
        }
    }

    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}
