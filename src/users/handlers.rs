use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use tracing::instrument;

use crate::error::{AppError, AppResult};
use crate::extract::{AppJson, AppPath, AppQuery};
use crate::state::AppState;

use super::dto::{CreateUserRequest, Pagination, SearchQuery, UpdateUserRequest};
use super::repo_types::User;

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route("/users/search", get(search_users))
        .route("/users/:id", get(get_user).put(update_user).delete(delete_user))
}

#[instrument(skip(state))]
pub async fn list_users(
    State(state): State<AppState>,
    AppQuery(p): AppQuery<Pagination>,
) -> AppResult<Json<Vec<User>>> {
    p.validate()?;
    Ok(Json(state.users.list(p.limit, p.offset).await?))
}

#[instrument(skip(state))]
pub async fn search_users(
    State(state): State<AppState>,
    AppQuery(q): AppQuery<SearchQuery>,
) -> AppResult<Json<Vec<User>>> {
    q.validate()?;
    Ok(Json(state.users.search(&q.q, q.limit).await?))
}

#[instrument(skip(state))]
pub async fn get_user(State(state): State<AppState>, AppPath(id): AppPath<i64>) -> AppResult<Json<User>> {
    Ok(Json(state.users.get_by_id(id).await?))
}

#[instrument(skip(state, body))]
pub async fn create_user(
    State(state): State<AppState>,
    AppJson(body): AppJson<CreateUserRequest>,
) -> AppResult<(StatusCode, Json<User>)> {
    let user = state.users.create(body.validate()?).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

#[instrument(skip(state, body))]
pub async fn update_user(
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
    AppJson(body): AppJson<UpdateUserRequest>,
) -> AppResult<Json<User>> {
    Ok(Json(state.users.update(id, body.validate()?).await?))
}

#[instrument(skip(state))]
pub async fn delete_user(State(state): State<AppState>, AppPath(id): AppPath<i64>) -> AppResult<StatusCode> {
    if state.users.delete(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(id))
    }
}
