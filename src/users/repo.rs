use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{map_unique_violation, ApiError};
use crate::users::status::InviteStatus;

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>, // None until the invite is accepted
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub invite_status: InviteStatus,
    pub email_confirmed: bool,
    pub is_active: bool,
    pub is_staff: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Per-user writing settings, distinct from the authentication identity.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WritingProfile {
    pub user_id: Uuid,
    pub timezone: String,
    pub target_milestone_word_count: i32,
}

pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<User>> {
    let user = sqlx::query_as::<_, User>(
        r#"
        SELECT id, username, email, password_hash, first_name, last_name,
               invite_status, email_confirmed, is_active, is_staff, created_at
          FROM users
         WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(db)
    .await?;
    Ok(user)
}

pub async fn find_by_username(db: &PgPool, username: &str) -> anyhow::Result<Option<User>> {
    let user = sqlx::query_as::<_, User>(
        r#"
        SELECT id, username, email, password_hash, first_name, last_name,
               invite_status, email_confirmed, is_active, is_staff, created_at
          FROM users
         WHERE username = $1
        "#,
    )
    .bind(username)
    .fetch_optional(db)
    .await?;
    Ok(user)
}

pub async fn find_by_email(db: &PgPool, email: &str) -> anyhow::Result<Option<User>> {
    let user = sqlx::query_as::<_, User>(
        r#"
        SELECT id, username, email, password_hash, first_name, last_name,
               invite_status, email_confirmed, is_active, is_staff, created_at
          FROM users
         WHERE email = $1
        "#,
    )
    .bind(email)
    .fetch_optional(db)
    .await?;
    Ok(user)
}

pub async fn find_by_ids(db: &PgPool, ids: &[Uuid]) -> anyhow::Result<Vec<User>> {
    let users = sqlx::query_as::<_, User>(
        r#"
        SELECT id, username, email, password_hash, first_name, last_name,
               invite_status, email_confirmed, is_active, is_staff, created_at
          FROM users
         WHERE id = ANY($1)
         ORDER BY username
        "#,
    )
    .bind(ids)
    .fetch_all(db)
    .await?;
    Ok(users)
}

/// Whether another user already holds this username.
pub async fn username_taken_by_other(
    db: &PgPool,
    username: &str,
    exclude: Uuid,
) -> anyhow::Result<bool> {
    let row: Option<(Uuid,)> =
        sqlx::query_as("SELECT id FROM users WHERE username = $1 AND id <> $2")
            .bind(username)
            .bind(exclude)
            .fetch_optional(db)
            .await?;
    Ok(row.is_some())
}

/// Create a user with no usable password, at the start of the invite
/// lifecycle.
pub async fn create_invite_requested(
    db: &PgPool,
    username: &str,
    email: &str,
) -> anyhow::Result<User> {
    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (username, email, invite_status)
        VALUES ($1, $2, 'requested')
        RETURNING id, username, email, password_hash, first_name, last_name,
                  invite_status, email_confirmed, is_active, is_staff, created_at
        "#,
    )
    .bind(username)
    .bind(email)
    .fetch_one(db)
    .await?;
    Ok(user)
}

pub async fn set_invite_status(
    db: &PgPool,
    user_id: Uuid,
    status: InviteStatus,
) -> anyhow::Result<()> {
    sqlx::query("UPDATE users SET invite_status = $1 WHERE id = $2")
        .bind(status)
        .bind(user_id)
        .execute(db)
        .await?;
    Ok(())
}

/// Complete invite acceptance as a single atomic update: username, password,
/// email confirmation and the `invited -> accepted` transition all land
/// together or not at all. Returns false if the user was no longer in the
/// `invited` state (e.g. a concurrent acceptance won).
pub async fn accept_invite(
    db: &PgPool,
    user_id: Uuid,
    username: &str,
    password_hash: &str,
) -> Result<bool, ApiError> {
    let result = sqlx::query(
        r#"
        UPDATE users
           SET username = $1,
               password_hash = $2,
               email_confirmed = TRUE,
               invite_status = 'accepted'
         WHERE id = $3 AND invite_status = 'invited'
        "#,
    )
    .bind(username)
    .bind(password_hash)
    .bind(user_id)
    .execute(db)
    .await
    .map_err(|e| map_unique_violation(e, duplicate_username_error()))?;
    Ok(result.rows_affected() == 1)
}

/// The 422 surfaced when the username unique constraint rejects an acceptance
/// that raced a pre-check.
pub(crate) fn duplicate_username_error() -> ApiError {
    ApiError::business(
        "username",
        "A user with that username already exists.",
        "unique",
    )
}

/// Overwrite the stored password hash, e.g. after a completed reset.
pub async fn set_password(db: &PgPool, user_id: Uuid, password_hash: &str) -> anyhow::Result<()> {
    sqlx::query("UPDATE users SET password_hash = $1 WHERE id = $2")
        .bind(password_hash)
        .bind(user_id)
        .execute(db)
        .await?;
    Ok(())
}

/// Fetch the user's writing profile, creating it with defaults on first
/// access.
pub async fn get_or_create_profile(db: &PgPool, user_id: Uuid) -> anyhow::Result<WritingProfile> {
    sqlx::query(
        "INSERT INTO writing_profiles (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING",
    )
    .bind(user_id)
    .execute(db)
    .await?;

    let profile = sqlx::query_as::<_, WritingProfile>(
        r#"
        SELECT user_id, timezone, target_milestone_word_count
          FROM writing_profiles
         WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_one(db)
    .await?;
    Ok(profile)
}

/// Apply profile and user-name changes in one transaction; partial updates
/// are never persisted.
pub async fn update_profile(
    db: &PgPool,
    user_id: Uuid,
    first_name: Option<&str>,
    last_name: Option<&str>,
    timezone: Option<&str>,
    target_milestone_word_count: Option<i32>,
) -> anyhow::Result<WritingProfile> {
    let mut tx = db.begin().await?;

    if first_name.is_some() || last_name.is_some() {
        sqlx::query(
            r#"
            UPDATE users
               SET first_name = COALESCE($1, first_name),
                   last_name = COALESCE($2, last_name)
             WHERE id = $3
            "#,
        )
        .bind(first_name)
        .bind(last_name)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    }

    let profile = sqlx::query_as::<_, WritingProfile>(
        r#"
        UPDATE writing_profiles
           SET timezone = COALESCE($1, timezone),
               target_milestone_word_count = COALESCE($2, target_milestone_word_count)
         WHERE user_id = $3
        RETURNING user_id, timezone, target_milestone_word_count
        "#,
    )
    .bind(timezone)
    .bind(target_milestone_word_count)
    .bind(user_id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(profile)
}

#[cfg(test)]
mod repo_tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    #[test]
    fn username_collision_is_a_field_scoped_unique_business_error() {
        match duplicate_username_error() {
            ApiError::Business(fields) => {
                let details = &fields["username"];
                assert_eq!(details[0].code, "unique");
                assert!(details[0].message.contains("already exists"));
            }
            other => panic!("expected business error, got {other:?}"),
        }
        assert_eq!(
            duplicate_username_error().into_response().status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }
}
