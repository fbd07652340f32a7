use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::extractors::AuthUser,
    error::ApiError,
    state::AppState,
    users::dto::{
        DetailResponse, InviteAcceptanceRequest, InviteRequest, InviteRequestResponse,
        InviteTokenResponse, IssueInvitesRequest, ProfileResponse, ProfileUpdateRequest,
    },
    users::invites::{self, IssueOutcome},
    users::repo,
};

pub fn registration_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/registration/invite", post(request_invite))
        .route(
            "/auth/registration/invite/:token",
            get(validate_invite_token).post(accept_invite),
        )
}

pub fn profile_routes() -> Router<AppState> {
    Router::new().route("/profile", get(get_profile).patch(update_profile))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new().route("/admin/invites", post(issue_invites))
}

#[instrument(skip(state, payload))]
pub async fn request_invite(
    State(state): State<AppState>,
    Json(payload): Json<InviteRequest>,
) -> Result<(StatusCode, Json<InviteRequestResponse>), ApiError> {
    let email = invites::request_invite(&state, &payload.email).await?;
    Ok((StatusCode::CREATED, Json(InviteRequestResponse { email })))
}

#[instrument(skip(state, token))]
pub async fn validate_invite_token(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<InviteTokenResponse>, ApiError> {
    invites::validate_token(&state, &token).await?;
    Ok(Json(InviteTokenResponse { token }))
}

#[instrument(skip(state, token, payload))]
pub async fn accept_invite(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(payload): Json<InviteAcceptanceRequest>,
) -> Result<Json<DetailResponse>, ApiError> {
    invites::accept_invite(&state, &token, &payload.username, &payload.password).await?;
    Ok(Json(DetailResponse {
        detail: "Invite accepted.".into(),
    }))
}

#[instrument(skip(state))]
pub async fn get_profile(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<ProfileResponse>, ApiError> {
    let user = repo::find_by_id(&state.db, user_id)
        .await?
        .ok_or_else(|| ApiError::unauthorized("User not found"))?;
    let profile = repo::get_or_create_profile(&state.db, user_id).await?;
    Ok(Json(ProfileResponse::from_parts(&user, &profile)))
}

#[instrument(skip(state, payload))]
pub async fn update_profile(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<ProfileUpdateRequest>,
) -> Result<Json<ProfileResponse>, ApiError> {
    if let Some(tz) = payload.timezone.as_deref() {
        if !is_known_timezone(tz) {
            return Err(ApiError::business("timezone", "Unknown timezone", "invalid"));
        }
    }
    if let Some(target) = payload.target_milestone_word_count {
        if target <= 0 {
            return Err(ApiError::validation(
                "target_milestone_word_count",
                "Ensure this value is greater than 0.",
            ));
        }
    }

    let user = repo::find_by_id(&state.db, user_id)
        .await?
        .ok_or_else(|| ApiError::unauthorized("User not found"))?;

    // Profile row must exist before the transactional update touches it.
    repo::get_or_create_profile(&state.db, user_id).await?;
    let profile = repo::update_profile(
        &state.db,
        user_id,
        payload.first_name.as_deref(),
        payload.last_name.as_deref(),
        payload.timezone.as_deref(),
        payload.target_milestone_word_count,
    )
    .await?;

    let user = repo::find_by_id(&state.db, user_id).await?.unwrap_or(user);
    Ok(Json(ProfileResponse::from_parts(&user, &profile)))
}

/// Bulk invite issuance; restricted to staff accounts.
#[instrument(skip(state, payload))]
pub async fn issue_invites(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<IssueInvitesRequest>,
) -> Result<Json<DetailResponse>, ApiError> {
    let actor = repo::find_by_id(&state.db, user_id)
        .await?
        .ok_or_else(|| ApiError::unauthorized("User not found"))?;
    if !actor.is_staff {
        return Err(ApiError::forbidden("Staff access required"));
    }

    let detail = match invites::issue_invites(&state, &payload.user_ids).await? {
        IssueOutcome::NoneSelected => "No users selected. Select users to invite them.".to_string(),
        IssueOutcome::Invited(count) => format!("Successfully invited {count} user(s)."),
    };
    Ok(Json(DetailResponse { detail }))
}

fn is_known_timezone(tz: &str) -> bool {
    tz.parse::<chrono_tz::Tz>().is_ok()
}

#[cfg(test)]
mod timezone_tests {
    use super::is_known_timezone;

    #[test]
    fn recognizes_iana_timezones() {
        assert!(is_known_timezone("UTC"));
        assert!(is_known_timezone("Australia/Sydney"));
        assert!(is_known_timezone("America/New_York"));
    }

    #[test]
    fn rejects_unknown_timezones() {
        assert!(!is_known_timezone("Mars/Olympus_Mons"));
        assert!(!is_known_timezone(""));
        assert!(!is_known_timezone("+10:00"));
    }
}
