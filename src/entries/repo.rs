use sqlx::{FromRow, PgPool};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::entries::service::{EntryChanges, NewEntry};
use crate::error::{map_unique_violation, ApiError};

/// One author's journal entry for a single calendar date.
#[derive(Debug, Clone, FromRow)]
pub struct Entry {
    pub id: Uuid,
    pub author_id: Uuid,
    pub entry_date: Date,
    pub entry_timezone: String,
    pub words: String,
    pub word_count: i32,
    pub start_time: OffsetDateTime,
    pub finish_time: OffsetDateTime,
    pub milestone_word_count: i32,
    pub milestone_time: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Insert a new entry. The (author_id, entry_date) unique constraint is the
/// arbiter under concurrent creates; a losing insert surfaces as the 422
/// "unique" error rather than a server error.
pub async fn insert(
    db: &PgPool,
    author_id: Uuid,
    entry_date: Date,
    words: &str,
    new: &NewEntry,
) -> Result<Entry, ApiError> {
    let entry = sqlx::query_as::<_, Entry>(
        r#"
        INSERT INTO entries
            (author_id, entry_date, entry_timezone, words, word_count,
             start_time, finish_time, milestone_word_count, milestone_time)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING id, author_id, entry_date, entry_timezone, words, word_count,
                  start_time, finish_time, milestone_word_count, milestone_time,
                  created_at, updated_at
        "#,
    )
    .bind(author_id)
    .bind(entry_date)
    .bind(&new.entry_timezone)
    .bind(words)
    .bind(new.word_count)
    .bind(new.start_time)
    .bind(new.finish_time)
    .bind(new.milestone_word_count)
    .bind(new.milestone_time)
    .fetch_one(db)
    .await
    .map_err(|e| map_unique_violation(e, duplicate_entry_error()))?;
    Ok(entry)
}

/// The 422 surfaced when the (author, entry_date) unique constraint rejects a
/// second create for the same day.
pub(crate) fn duplicate_entry_error() -> ApiError {
    ApiError::business_detail(
        "The fields author, entry_date must make a unique set.",
        "unique",
    )
}

/// All of one author's entries, newest entry date first.
pub async fn list_by_author_username(db: &PgPool, username: &str) -> anyhow::Result<Vec<Entry>> {
    let rows = sqlx::query_as::<_, Entry>(
        r#"
        SELECT e.id, e.author_id, e.entry_date, e.entry_timezone, e.words, e.word_count,
               e.start_time, e.finish_time, e.milestone_word_count, e.milestone_time,
               e.created_at, e.updated_at
          FROM entries e
          JOIN users u ON u.id = e.author_id
         WHERE u.username = $1
         ORDER BY e.entry_date DESC
        "#,
    )
    .bind(username)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn find_by_author_and_date(
    db: &PgPool,
    username: &str,
    entry_date: Date,
) -> anyhow::Result<Option<Entry>> {
    let row = sqlx::query_as::<_, Entry>(
        r#"
        SELECT e.id, e.author_id, e.entry_date, e.entry_timezone, e.words, e.word_count,
               e.start_time, e.finish_time, e.milestone_word_count, e.milestone_time,
               e.created_at, e.updated_at
          FROM entries e
          JOIN users u ON u.id = e.author_id
         WHERE u.username = $1 AND e.entry_date = $2
        "#,
    )
    .bind(username)
    .bind(entry_date)
    .fetch_optional(db)
    .await?;
    Ok(row)
}

/// Persist recomputed fields for an existing entry. Immutable columns are
/// never part of the statement.
pub async fn update(
    db: &PgPool,
    entry_id: Uuid,
    words: &str,
    changes: &EntryChanges,
) -> anyhow::Result<Entry> {
    let entry = sqlx::query_as::<_, Entry>(
        r#"
        UPDATE entries
           SET words = $1,
               word_count = $2,
               finish_time = $3,
               milestone_time = $4,
               updated_at = now()
         WHERE id = $5
        RETURNING id, author_id, entry_date, entry_timezone, words, word_count,
                  start_time, finish_time, milestone_word_count, milestone_time,
                  created_at, updated_at
        "#,
    )
    .bind(words)
    .bind(changes.word_count)
    .bind(changes.finish_time)
    .bind(changes.milestone_time)
    .bind(entry_id)
    .fetch_one(db)
    .await?;
    Ok(entry)
}
