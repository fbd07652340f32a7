use axum::extract::FromRef;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{error, info, instrument, warn};

use crate::auth::jwt::JwtKeys;
use crate::auth::password::hash_password;
use crate::error::ApiError;
use crate::state::AppState;
use crate::users::repo::{self, User};
use crate::users::status::InviteStatus;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Shallow username format check; uniqueness is checked separately and only
/// when the username actually changes.
pub(crate) fn is_valid_username(username: &str) -> bool {
    lazy_static! {
        static ref USERNAME_RE: Regex = Regex::new(r"^[A-Za-z0-9@.+_-]+$").unwrap();
    }
    !username.is_empty() && username.len() <= 150 && USERNAME_RE.is_match(username)
}

/// Derive an initial username from the email's local part, keeping only
/// characters the username format allows.
pub(crate) fn username_base_from_email(email: &str) -> String {
    let local = email.split('@').next().unwrap_or(email);
    let base: String = local
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '+'))
        .collect();
    if base.is_empty() {
        "user".to_string()
    } else {
        base
    }
}

async fn generate_username(state: &AppState, email: &str) -> anyhow::Result<String> {
    let base = username_base_from_email(email);
    if repo::find_by_username(&state.db, &base).await?.is_none() {
        return Ok(base);
    }
    for n in 1.. {
        let candidate = format!("{base}{n}");
        if repo::find_by_username(&state.db, &candidate).await?.is_none() {
            return Ok(candidate);
        }
    }
    unreachable!()
}

/// What to do for an incoming invite request, given the account that already
/// exists for the email (if any).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InviteRequestAction {
    /// Unknown email: create the account and notify requester + admins.
    CreateAndNotify,
    /// Still awaiting review: re-send the "request received" mail.
    ResendRequestReceived,
    /// Already invited: re-issue the invite token and re-send the invite.
    ResendInvite,
    /// Active account past the invite flow: send a username/email reminder,
    /// never a fresh invite.
    AccountReminder,
    /// Inactive account: no mail, no state change.
    Ignore,
}

pub fn plan_invite_request(existing: Option<&User>) -> InviteRequestAction {
    match existing {
        None => InviteRequestAction::CreateAndNotify,
        Some(user) if user.invite_status == InviteStatus::Requested => {
            InviteRequestAction::ResendRequestReceived
        }
        Some(user) if user.is_active && user.invite_status == InviteStatus::Invited => {
            InviteRequestAction::ResendInvite
        }
        Some(user) if user.is_active => InviteRequestAction::AccountReminder,
        Some(_) => InviteRequestAction::Ignore,
    }
}

/// Split a selection of users into those that may receive an invite and
/// those protected from re-invitation.
pub fn partition_invitable(users: Vec<User>) -> (Vec<User>, Vec<User>) {
    users.into_iter().partition(|u| {
        matches!(
            u.invite_status,
            InviteStatus::Requested | InviteStatus::Invited
        )
    })
}

mod templates {
    pub fn request_received() -> (&'static str, String) {
        (
            "[Daily Writing] Invitation request received",
            "Hi,\n\nWe've received your request for an invitation. We will review it \
             shortly and be in contact by email with updates.\n\nRegards,\n\nTeam Daily Writing"
                .to_string(),
        )
    }

    pub fn request_received_admin(email: &str) -> (&'static str, String) {
        (
            "[Daily Writing] Invite requested",
            format!("Invite requested by {email}."),
        )
    }

    pub fn invite(acceptance_url: &str) -> (&'static str, String) {
        (
            "[Daily Writing] Your invitation to Daily Writing",
            format!(
                "Hi,\n\nWe've approved your request for an invitation to Daily Writing.\n\n\
                 Please visit {acceptance_url}.\n\nRegards,\n\nTeam Daily Writing"
            ),
        )
    }

    pub fn account_reminder(username: &str, email: &str) -> (&'static str, String) {
        (
            "[Daily Writing] Account reminder",
            format!(
                "Hi,\n\nAs a quick reminder, your username is '{username}' and the primary \
                 email address associated with your account is '{email}'.\n\nRegards,\n\n\
                 Team Daily Writing"
            ),
        )
    }
}

/// Each mail send stands alone: a failure is logged and swallowed so it can
/// never block the lifecycle transition or a sibling send.
async fn send_best_effort(state: &AppState, to: &str, subject: &str, body: &str) {
    if let Err(e) = state.mailer.send(to, subject, body).await {
        error!(error = %e, to = %to, subject = %subject, "error sending user email");
    }
}

async fn send_admins_best_effort(state: &AppState, subject: &str, body: &str) {
    if let Err(e) = state.mailer.send_to_admins(subject, body).await {
        error!(error = %e, subject = %subject, "error sending admin email");
    }
}

async fn send_request_received_emails(state: &AppState, user: &User) {
    let (subject, body) = templates::request_received();
    send_best_effort(state, &user.email, subject, &body).await;
    let (subject, body) = templates::request_received_admin(&user.email);
    send_admins_best_effort(state, subject, &body).await;
}

fn invite_acceptance_url(state: &AppState, token: &str) -> String {
    format!("{}/invite/{}/", state.config.site_base_url, token)
}

/// Sign acceptance tokens for the whole batch up front, so a signing failure
/// surfaces before any mail leaves or any state changes.
fn sign_invite_batch(keys: &JwtKeys, users: Vec<User>) -> anyhow::Result<Vec<(User, String)>> {
    users
        .into_iter()
        .map(|user| {
            let token = keys.sign_invite(user.id, &user.email)?;
            Ok((user, token))
        })
        .collect()
}

async fn send_invite_email_with_token(state: &AppState, user: &User, token: &str) {
    let url = invite_acceptance_url(state, token);
    let (subject, body) = templates::invite(&url);
    send_best_effort(state, &user.email, subject, &body).await;
}

/// Send the invite mail with a freshly derived acceptance token.
async fn send_invite_email(state: &AppState, user: &User) -> anyhow::Result<()> {
    let keys = JwtKeys::from_ref(state);
    let token = keys.sign_invite(user.id, &user.email)?;
    send_invite_email_with_token(state, user, &token).await;
    Ok(())
}

/// Handle an invite request for `email`. Always returns the normalized email
/// so the response never reveals whether an account exists.
#[instrument(skip(state))]
pub async fn request_invite(state: &AppState, email: &str) -> Result<String, ApiError> {
    let email = email.trim().to_lowercase();
    if !is_valid_email(&email) {
        return Err(ApiError::validation("email", "Enter a valid email address."));
    }

    let existing = repo::find_by_email(&state.db, &email).await?;
    match (plan_invite_request(existing.as_ref()), existing) {
        (InviteRequestAction::CreateAndNotify, _) => {
            let username = generate_username(state, &email).await?;
            let user = repo::create_invite_requested(&state.db, &username, &email).await?;
            info!(user_id = %user.id, "invite requested for new account");
            send_request_received_emails(state, &user).await;
        }
        (InviteRequestAction::ResendRequestReceived, Some(user)) => {
            info!(user_id = %user.id, "invite request repeated, resending receipt");
            send_request_received_emails(state, &user).await;
        }
        (InviteRequestAction::ResendInvite, Some(user)) => {
            info!(user_id = %user.id, "re-sending invite");
            send_invite_email(state, &user).await?;
        }
        (InviteRequestAction::AccountReminder, Some(user)) => {
            info!(user_id = %user.id, "sending account reminder instead of invite");
            let (subject, body) = templates::account_reminder(&user.username, &user.email);
            send_best_effort(state, &user.email, subject, &body).await;
        }
        (InviteRequestAction::Ignore, _) => {
            warn!(email = %email, "invite request for inactive account ignored");
        }
        // Every action other than CreateAndNotify implies an existing user.
        (_, None) => {}
    }

    Ok(email)
}

/// Outcome of a bulk invite issuance.
#[derive(Debug, PartialEq, Eq)]
pub enum IssueOutcome {
    /// Nothing selected; nothing happened.
    NoneSelected,
    /// Number of users invited.
    Invited(usize),
}

/// Issue invites to every selected user in `Requested` or `Invited` state.
/// If any selected user has already accepted, the whole batch is refused.
#[instrument(skip(state))]
pub async fn issue_invites(
    state: &AppState,
    user_ids: &[uuid::Uuid],
) -> Result<IssueOutcome, ApiError> {
    if user_ids.is_empty() {
        return Ok(IssueOutcome::NoneSelected);
    }

    let users = repo::find_by_ids(&state.db, user_ids).await?;
    if users.is_empty() {
        return Ok(IssueOutcome::NoneSelected);
    }

    let (invitable, protected) = partition_invitable(users);
    if !protected.is_empty() {
        let names: Vec<&str> = protected.iter().map(|u| u.username.as_str()).collect();
        return Err(ApiError::business_detail(
            format!("Cannot invite users that already accepted: {}", names.join(", ")),
            "protected",
        ));
    }

    let keys = JwtKeys::from_ref(state);
    let invites = sign_invite_batch(&keys, invitable)?;
    let count = invites.len();
    for (user, token) in invites {
        send_invite_email_with_token(state, &user, &token).await;
        if user.invite_status.can_transition_to(InviteStatus::Invited) {
            repo::set_invite_status(&state.db, user.id, InviteStatus::Invited).await?;
        }
        info!(user_id = %user.id, username = %user.username, "invite sent");
    }
    Ok(IssueOutcome::Invited(count))
}

/// Resolve an invite token to its user, requiring the account to still be in
/// the `Invited` state. All failure modes collapse into the same generic
/// not-found error so token validity never leaks.
#[instrument(skip(state, token))]
pub async fn validate_token(state: &AppState, token: &str) -> Result<User, ApiError> {
    let invalid = || ApiError::not_found("Invalid token");

    let keys = JwtKeys::from_ref(state);
    let claims = keys.resolve_invite(token).map_err(|_| invalid())?;

    let user = repo::find_by_id(&state.db, claims.sub)
        .await?
        .ok_or_else(invalid)?;

    // A token issued for a previous email identity is no longer valid, and
    // acceptance is terminal: a used token must not replay.
    if user.email != claims.email || user.invite_status != InviteStatus::Invited {
        return Err(invalid());
    }
    Ok(user)
}

/// Complete the invite: set username and password, confirm the email address
/// and move to `Accepted`, all atomically.
#[instrument(skip(state, token, password))]
pub async fn accept_invite(
    state: &AppState,
    token: &str,
    username: &str,
    password: &str,
) -> Result<User, ApiError> {
    let user = validate_token(state, token).await?;

    if !is_valid_username(username) {
        return Err(ApiError::business(
            "username",
            "Enter a valid username. Letters, digits and @/./+/-/_ only.",
            "invalid",
        ));
    }

    // Same username as before only needs the format check; a changed one must
    // be unique across all other users.
    if username != user.username
        && repo::username_taken_by_other(&state.db, username, user.id).await?
    {
        return Err(ApiError::business(
            "username",
            "A user with that username already exists.",
            "unique",
        ));
    }

    if password.len() < 8 {
        return Err(ApiError::business(
            "password",
            "This password is too short. It must contain at least 8 characters.",
            "password_too_short",
        ));
    }

    let hash = hash_password(password)?;
    let transitioned = repo::accept_invite(&state.db, user.id, username, &hash).await?;
    if !transitioned {
        // State moved under us; the token is no longer acceptable.
        return Err(ApiError::not_found("Invalid token"));
    }

    info!(user_id = %user.id, username = %username, "invite accepted");
    repo::find_by_id(&state.db, user.id)
        .await?
        .ok_or_else(|| ApiError::not_found("Invalid token"))
}

#[cfg(test)]
mod invite_tests {
    use super::*;
    use time::OffsetDateTime;
    use uuid::Uuid;

    fn make_user(status: InviteStatus, is_active: bool) -> User {
        User {
            id: Uuid::new_v4(),
            username: "writer".into(),
            email: "writer@example.com".into(),
            password_hash: None,
            first_name: None,
            last_name: None,
            invite_status: status,
            email_confirmed: false,
            is_active,
            is_staff: false,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn unknown_email_creates_and_notifies() {
        assert_eq!(plan_invite_request(None), InviteRequestAction::CreateAndNotify);
    }

    #[test]
    fn requested_user_gets_receipt_resent() {
        let user = make_user(InviteStatus::Requested, true);
        assert_eq!(
            plan_invite_request(Some(&user)),
            InviteRequestAction::ResendRequestReceived
        );
    }

    #[test]
    fn invited_active_user_gets_invite_resent() {
        let user = make_user(InviteStatus::Invited, true);
        assert_eq!(plan_invite_request(Some(&user)), InviteRequestAction::ResendInvite);
    }

    #[test]
    fn accepted_user_gets_account_reminder_not_reinvite() {
        let user = make_user(InviteStatus::Accepted, true);
        assert_eq!(
            plan_invite_request(Some(&user)),
            InviteRequestAction::AccountReminder
        );
    }

    #[test]
    fn inactive_user_is_ignored() {
        let user = make_user(InviteStatus::Invited, false);
        assert_eq!(plan_invite_request(Some(&user)), InviteRequestAction::Ignore);
        let user = make_user(InviteStatus::Accepted, false);
        assert_eq!(plan_invite_request(Some(&user)), InviteRequestAction::Ignore);
    }

    #[test]
    fn partition_protects_accepted_users() {
        let users = vec![
            make_user(InviteStatus::Requested, true),
            make_user(InviteStatus::Invited, true),
            make_user(InviteStatus::Accepted, true),
        ];
        let (invitable, protected) = partition_invitable(users);
        assert_eq!(invitable.len(), 2);
        assert_eq!(protected.len(), 1);
        assert_eq!(protected[0].invite_status, InviteStatus::Accepted);
    }

    #[test]
    fn email_validation() {
        assert!(is_valid_email("writer@example.com"));
        assert!(!is_valid_email("writer"));
        assert!(!is_valid_email("writer@nodot"));
        assert!(!is_valid_email("spaces in@example.com"));
    }

    #[test]
    fn username_validation() {
        assert!(is_valid_username("writer"));
        assert!(is_valid_username("writer.2024_x+tag@host"));
        assert!(!is_valid_username(""));
        assert!(!is_valid_username("has space"));
        assert!(!is_valid_username(&"x".repeat(151)));
    }

    #[test]
    fn username_base_strips_disallowed_chars() {
        assert_eq!(username_base_from_email("writer@example.com"), "writer");
        assert_eq!(username_base_from_email("wri ter!@example.com"), "writer");
        assert_eq!(username_base_from_email("jane.doe+tag@example.com"), "jane.doe+tag");
        assert_eq!(username_base_from_email("!!!@example.com"), "user");
    }

    #[tokio::test]
    async fn invite_batch_is_fully_signed_up_front() {
        let state = AppState::fake();
        let keys = JwtKeys::from_ref(&state);
        let mut second = make_user(InviteStatus::Invited, true);
        second.email = "second@example.com".into();
        let users = vec![make_user(InviteStatus::Requested, true), second];

        let invites = sign_invite_batch(&keys, users).expect("sign batch");
        assert_eq!(invites.len(), 2);
        for (user, token) in &invites {
            let claims = keys.resolve_invite(token).expect("token resolvable");
            assert_eq!(claims.sub, user.id);
            assert_eq!(claims.email, user.email);
        }
    }

    #[test]
    fn invite_email_contains_acceptance_url() {
        let (subject, body) = templates::invite("http://localhost:8080/invite/abc/");
        assert!(subject.contains("invitation"));
        assert!(body.contains("http://localhost:8080/invite/abc/"));
    }

    #[test]
    fn account_reminder_contains_username_and_email() {
        let (_, body) = templates::account_reminder("tester", "tester@example.com");
        assert!(body.contains("'tester'"));
        assert!(body.contains("'tester@example.com'"));
    }
}
