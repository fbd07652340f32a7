use crate::state::AppState;
use axum::Router;

mod dto;
pub mod handlers;
pub mod invites;
pub mod repo;
pub mod status;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::registration_routes())
        .merge(handlers::profile_routes())
        .merge(handlers::admin_routes())
}
