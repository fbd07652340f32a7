use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

use crate::entries::repo::Entry;

/// Request body for entry creation. Read-only fields such as
/// milestone_word_count are silently ignored if a client supplies them.
#[derive(Debug, Deserialize)]
pub struct CreateEntryRequest {
    pub author: String,
    pub entry_date: Date,
    #[serde(default)]
    pub words: String,
}

/// Request body for entry updates (PUT and PATCH). Absent fields are
/// treated as unchanged.
#[derive(Debug, Deserialize)]
pub struct UpdateEntryRequest {
    pub author: Option<String>,
    pub entry_date: Option<Date>,
    pub words: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub start_time: Option<OffsetDateTime>,
}

/// Full entry representation.
#[derive(Debug, Serialize)]
pub struct EntryResponse {
    pub author: String,
    pub entry_date: Date,
    pub entry_timezone: String,
    #[serde(with = "time::serde::rfc3339")]
    pub start_time: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub milestone_time: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub finish_time: OffsetDateTime,
    pub milestone_word_count: i32,
    pub words: String,
    pub word_count: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub created_date: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub modified_date: OffsetDateTime,
}

impl EntryResponse {
    pub fn from_entry(entry: Entry, author: String) -> Self {
        Self {
            author,
            entry_date: entry.entry_date,
            entry_timezone: entry.entry_timezone,
            start_time: entry.start_time,
            milestone_time: entry.milestone_time,
            finish_time: entry.finish_time,
            milestone_word_count: entry.milestone_word_count,
            words: entry.words,
            word_count: entry.word_count,
            created_date: entry.created_at,
            modified_date: entry.updated_at,
        }
    }
}

/// Compact representation used by the list endpoint.
#[derive(Debug, Serialize)]
pub struct EntryListItem {
    pub author: String,
    pub entry_date: Date,
    pub entry_timezone: String,
    #[serde(with = "time::serde::rfc3339")]
    pub start_time: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub milestone_time: Option<OffsetDateTime>,
}

impl EntryListItem {
    pub fn from_entry(entry: Entry, author: String) -> Self {
        Self {
            author,
            entry_date: entry.entry_date,
            entry_timezone: entry.entry_timezone,
            start_time: entry.start_time,
            milestone_time: entry.milestone_time,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EntryListResponse {
    pub count: usize,
    pub results: Vec<EntryListItem>,
}
