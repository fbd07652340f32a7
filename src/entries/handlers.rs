use axum::{
    extract::{Path, State},
    http::{HeaderMap, Method, StatusCode},
    routing::{get, post},
    Json, Router,
};
use time::{Date, OffsetDateTime};
use tracing::{info, instrument};

use crate::{
    auth::extractors::AuthUser,
    entries::dto::{
        CreateEntryRequest, EntryListItem, EntryListResponse, EntryResponse, UpdateEntryRequest,
    },
    entries::{repo, service},
    error::ApiError,
    state::AppState,
    users::repo as users_repo,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/entries", post(create_entry))
        .route("/entries/:username", get(list_entries))
        .route(
            "/entries/:username/:date",
            get(get_entry).put(update_entry).patch(update_entry),
        )
}

#[instrument(skip(state, payload))]
pub async fn create_entry(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<CreateEntryRequest>,
) -> Result<(StatusCode, HeaderMap, Json<EntryResponse>), ApiError> {
    let author = users_repo::find_by_id(&state.db, user_id)
        .await?
        .ok_or_else(|| ApiError::unauthorized("User not found"))?;
    if payload.author != author.username {
        return Err(ApiError::forbidden("You may only author your own entries"));
    }

    let profile = users_repo::get_or_create_profile(&state.db, author.id).await?;
    let new = service::prepare_create(
        payload.entry_date,
        &payload.words,
        &profile,
        OffsetDateTime::now_utc(),
    )?;
    let entry = repo::insert(&state.db, author.id, payload.entry_date, &payload.words, &new).await?;

    info!(author = %author.username, entry_date = %entry.entry_date, "entry created");

    let mut headers = HeaderMap::new();
    if let Ok(location) = format!("/entries/{}/{}", author.username, entry.entry_date).parse() {
        headers.insert(axum::http::header::LOCATION, location);
    }
    Ok((
        StatusCode::CREATED,
        headers,
        Json(EntryResponse::from_entry(entry, author.username)),
    ))
}

#[instrument(skip(state))]
pub async fn list_entries(
    State(state): State<AppState>,
    AuthUser(_user_id): AuthUser,
    Path(username): Path<String>,
) -> Result<Json<EntryListResponse>, ApiError> {
    let entries = repo::list_by_author_username(&state.db, &username).await?;
    let results: Vec<EntryListItem> = entries
        .into_iter()
        .map(|e| EntryListItem::from_entry(e, username.clone()))
        .collect();
    Ok(Json(EntryListResponse {
        count: results.len(),
        results,
    }))
}

#[instrument(skip(state))]
pub async fn get_entry(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path((username, date)): Path<(String, String)>,
) -> Result<Json<EntryResponse>, ApiError> {
    require_author(&state, user_id, &username).await?;
    let entry_date = parse_entry_date(&date)?;
    let entry = repo::find_by_author_and_date(&state.db, &username, entry_date)
        .await?
        .ok_or_else(|| ApiError::not_found("Entry not found"))?;
    Ok(Json(EntryResponse::from_entry(entry, username)))
}

#[instrument(skip(state, payload))]
pub async fn update_entry(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path((username, date)): Path<(String, String)>,
    method: Method,
    Json(payload): Json<UpdateEntryRequest>,
) -> Result<Json<EntryResponse>, ApiError> {
    require_author(&state, user_id, &username).await?;
    if let Some(author) = payload.author.as_deref() {
        if author != username {
            return Err(ApiError::forbidden("You may only author your own entries"));
        }
    }

    let entry_date = parse_entry_date(&date)?;
    let existing = repo::find_by_author_and_date(&state.db, &username, entry_date)
        .await?
        .ok_or_else(|| ApiError::not_found("Entry not found"))?;

    let words = words_for_update(&method, payload.words, &existing.words)?;
    let changes = service::prepare_update(
        &existing,
        payload.entry_date,
        payload.start_time,
        &words,
        OffsetDateTime::now_utc(),
    )?;
    let entry = repo::update(&state.db, existing.id, &words, &changes).await?;

    info!(author = %username, entry_date = %entry.entry_date, "entry updated");
    Ok(Json(EntryResponse::from_entry(entry, username)))
}

/// Writes and detail reads are restricted to the entry's author.
async fn require_author(state: &AppState, user_id: uuid::Uuid, username: &str) -> Result<(), ApiError> {
    let caller = users_repo::find_by_id(&state.db, user_id)
        .await?
        .ok_or_else(|| ApiError::unauthorized("User not found"))?;
    if caller.username != username {
        return Err(ApiError::forbidden(
            "You do not have permission to access this entry",
        ));
    }
    Ok(())
}

/// PUT is a full replacement and must carry `words`; PATCH falls back to the
/// stored text.
fn words_for_update(
    method: &Method,
    payload_words: Option<String>,
    existing: &str,
) -> Result<String, ApiError> {
    match payload_words {
        Some(words) => Ok(words),
        None if *method == Method::PUT => {
            Err(ApiError::validation("words", "This field is required."))
        }
        None => Ok(existing.to_string()),
    }
}

fn parse_entry_date(raw: &str) -> Result<Date, ApiError> {
    let format = time::macros::format_description!("[year]-[month]-[day]");
    Date::parse(raw, format).map_err(|_| ApiError::not_found("Entry not found"))
}
