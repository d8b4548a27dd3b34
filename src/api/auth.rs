use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{ApiError, AppState, AuthUser};
use crate::auth::{create_access_token, hash_password, verify_password};
use crate::db::User;

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// POST /api/v1/auth/register
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(data): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    if state.db.user_by_email(&data.email)?.is_some() {
        return Err(ApiError::bad_request("Email already registered"));
    }

    let hashed = hash_password(&data.password)?;
    let user = state.db.create_user(&data.name, &data.email, &hashed)?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// POST /api/v1/auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(data): Json<LoginRequest>,
) -> Result<Json<Value>, ApiError> {
    let user = match state.db.user_by_email(&data.email)? {
        Some(user) if verify_password(&data.password, &user.password) => user,
        _ => return Err(ApiError::unauthorized("Invalid credentials")),
    };

    if !user.is_active {
        return Err(ApiError::bad_request("Account disabled"));
    }

    let token = create_access_token(
        &user.email,
        &state.config.secret_key,
        state.config.access_token_expire_minutes,
    )?;
    Ok(Json(json!({ "access_token": token, "token_type": "bearer" })))
}

/// GET /api/v1/auth/me
pub async fn me(AuthUser(user): AuthUser) -> Json<User> {
    Json(user)
}
