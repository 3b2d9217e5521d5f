pub mod dto;
pub mod form;
pub mod handlers;
pub mod memory;
pub mod mirror;
pub mod repo;
pub mod repo_types;
pub mod seed;
pub mod store;

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::read_routes())
        .merge(handlers::write_routes())
}
