use axum::{
    extract::{FromRef, State},
    routing::post,
    Json, Router,
};
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::{
            AuthResponse, DetailResponse, PasswordResetConfirmRequest, PasswordResetRequest,
            PublicUser, RefreshRequest, TokenRequest, VerifyRequest,
        },
        jwt::JwtKeys,
        password::verify_password,
        reset,
    },
    error::ApiError,
    state::AppState,
    users::repo,
    users::status::InviteStatus,
};

pub fn token_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/token", post(obtain_token))
        .route("/auth/token/refresh", post(refresh))
        .route("/auth/token/verify", post(verify))
}

pub fn password_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/password/reset", post(request_password_reset))
        .route("/auth/password/reset/confirm", post(confirm_password_reset))
}

/// Only active users that have accepted their invite hold a usable password,
/// so authentication is implicitly gated on the invite lifecycle.
#[instrument(skip(state, payload))]
pub async fn obtain_token(
    State(state): State<AppState>,
    Json(payload): Json<TokenRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let invalid = || ApiError::unauthorized("Invalid credentials");

    let user = repo::find_by_username(&state.db, &payload.username)
        .await?
        .ok_or_else(|| {
            warn!(username = %payload.username, "login unknown username");
            invalid()
        })?;

    if !user.is_active || user.invite_status != InviteStatus::Accepted {
        warn!(user_id = %user.id, status = ?user.invite_status, "login for non-accepted account");
        return Err(invalid());
    }

    let hash = user.password_hash.as_deref().ok_or_else(invalid)?;
    if !verify_password(&payload.password, hash)? {
        warn!(user_id = %user.id, "login invalid password");
        return Err(invalid());
    }

    let keys = JwtKeys::from_ref(&state);
    let access_token = keys.sign_access(user.id)?;
    let refresh_token = keys.sign_refresh(user.id)?;

    info!(user_id = %user.id, username = %user.username, "user logged in");
    Ok(Json(AuthResponse {
        access_token,
        refresh_token,
        user: PublicUser {
            id: user.id,
            username: user.username,
            email: user.email,
        },
    }))
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let keys = JwtKeys::from_ref(&state);
    let claims = keys
        .verify_refresh(&payload.refresh_token)
        .map_err(|_| ApiError::unauthorized("Invalid or expired token"))?;

    let user = repo::find_by_id(&state.db, claims.sub)
        .await?
        .filter(|u| u.is_active)
        .ok_or_else(|| ApiError::unauthorized("User not found"))?;

    let access_token = keys.sign_access(user.id)?;
    let refresh_token = keys.sign_refresh(user.id)?;

    Ok(Json(AuthResponse {
        access_token,
        refresh_token,
        user: PublicUser {
            id: user.id,
            username: user.username,
            email: user.email,
        },
    }))
}

/// Always answers 200 with the same detail, whether or not the email matched
/// an eligible account.
#[instrument(skip(state, payload))]
pub async fn request_password_reset(
    State(state): State<AppState>,
    Json(payload): Json<PasswordResetRequest>,
) -> Result<Json<DetailResponse>, ApiError> {
    reset::request_reset(&state, &payload.email).await?;
    Ok(Json(DetailResponse {
        detail: "Password reset e-mail has been sent.".into(),
    }))
}

#[instrument(skip(state, payload))]
pub async fn confirm_password_reset(
    State(state): State<AppState>,
    Json(payload): Json<PasswordResetConfirmRequest>,
) -> Result<Json<DetailResponse>, ApiError> {
    reset::confirm_reset(&state, &payload.token, &payload.password).await?;
    Ok(Json(DetailResponse {
        detail: "Password has been reset with the new password.".into(),
    }))
}

#[instrument(skip(state, payload))]
pub async fn verify(
    State(state): State<AppState>,
    Json(payload): Json<VerifyRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let keys = JwtKeys::from_ref(&state);
    keys.verify(&payload.token)
        .map_err(|_| ApiError::unauthorized("Invalid or expired token"))?;
    Ok(Json(serde_json::json!({})))
}
