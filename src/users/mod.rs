mod dto;
pub mod handlers;
pub mod repo;
pub mod repo_types;
pub mod services;

use crate::state::AppState;
use axum::Router;

pub use services::UserService;

pub fn router() -> Router<AppState> {
    handlers::user_routes()
}
