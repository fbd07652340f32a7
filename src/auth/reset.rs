use axum::extract::FromRef;
use tracing::{error, info, instrument};

use crate::auth::jwt::JwtKeys;
use crate::auth::password::hash_password;
use crate::error::ApiError;
use crate::state::AppState;
use crate::users::invites::is_valid_email;
use crate::users::repo::{self, User};
use crate::users::status::InviteStatus;

/// Only active accounts that completed the invite lifecycle and hold a usable
/// password can reset it. Requested/invited accounts have no password yet and
/// must finish acceptance instead.
pub fn can_reset_password(user: &User) -> bool {
    user.is_active && user.invite_status == InviteStatus::Accepted && user.password_hash.is_some()
}

mod templates {
    pub fn password_reset(username: &str, reset_url: &str) -> (&'static str, String) {
        (
            "[Daily Writing] Password reset",
            format!(
                "Hi,\n\nYou're receiving this email because you requested a password reset \
                 for your Daily Writing account.\n\nPlease visit {reset_url}.\n\nYour \
                 username, in case you've forgotten: '{username}'\n\nRegards,\n\n\
                 Team Daily Writing"
            ),
        )
    }
}

fn reset_url(state: &AppState, token: &str) -> String {
    format!("{}/password/reset/{}/", state.config.site_base_url, token)
}

/// Handle a password-reset request. The outcome is identical for unknown,
/// ineligible and eligible emails so account existence never leaks; only an
/// eligible account actually receives mail.
#[instrument(skip(state))]
pub async fn request_reset(state: &AppState, email: &str) -> Result<(), ApiError> {
    let email = email.trim().to_lowercase();
    if !is_valid_email(&email) {
        return Err(ApiError::validation("email", "Enter a valid email address."));
    }

    match repo::find_by_email(&state.db, &email).await? {
        Some(user) if can_reset_password(&user) => {
            let keys = JwtKeys::from_ref(state);
            let token = keys.sign_reset(user.id)?;
            let (subject, body) = templates::password_reset(&user.username, &reset_url(state, &token));
            if let Err(e) = state.mailer.send(&user.email, subject, &body).await {
                error!(error = %e, user_id = %user.id, "error sending password reset email");
            }
            info!(user_id = %user.id, "password reset email dispatched");
        }
        Some(user) => {
            info!(user_id = %user.id, status = ?user.invite_status, "password reset for ineligible account ignored");
        }
        None => {
            info!("password reset for unknown email ignored");
        }
    }
    Ok(())
}

/// Complete the reset: the token must verify and the account must still be
/// eligible at confirmation time. All token failures look the same.
#[instrument(skip(state, token, password))]
pub async fn confirm_reset(state: &AppState, token: &str, password: &str) -> Result<(), ApiError> {
    let invalid = || ApiError::validation("token", "Invalid value.");

    let keys = JwtKeys::from_ref(state);
    let claims = keys.verify_reset(token).map_err(|_| invalid())?;

    let user = repo::find_by_id(&state.db, claims.sub)
        .await?
        .ok_or_else(invalid)?;
    if !can_reset_password(&user) {
        return Err(invalid());
    }

    if password.len() < 8 {
        return Err(ApiError::business(
            "password",
            "This password is too short. It must contain at least 8 characters.",
            "password_too_short",
        ));
    }

    let hash = hash_password(password)?;
    repo::set_password(&state.db, user.id, &hash).await?;
    info!(user_id = %user.id, "password reset completed");
    Ok(())
}
