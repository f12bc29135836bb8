use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::access::{require_tag_access, require_tag_delete};
use crate::auth::{ClientId, RequireUser};
use crate::form::Form;
use crate::server::AppState;
use crate::server::response::{ApiError, ApiResponse, StoreResultExt};
use crate::server::validation::SubmitResultExt;
use crate::types::Action;

pub async fn list_tags(auth: RequireUser, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let tags = state
        .store
        .list_tags_for_user(auth.user.id)
        .api_err("Failed to list tags")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(tags)))
}

pub async fn get_tag(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    let tag = require_tag_access(state.store.as_ref(), auth.user.id, id, Action::Read)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(tag)))
}

pub async fn list_tag_posts(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    let store = state.store.as_ref();

    require_tag_access(store, auth.user.id, id, Action::Read)?;

    let posts = store
        .list_posts_for_tag(id, auth.user.id)
        .api_err("Failed to list tag posts")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(posts)))
}

pub async fn delete_tag(
    ClientId(client): ClientId,
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    let limiter = state.mutation_limiter(&client);
    let store = state.store.as_ref();
    let mut form = Form::new();

    let tag = require_tag_delete(store, auth.user.id, id).or_reject(&mut form, &limiter)?;

    store.delete_tag(tag.id).or_reject(&mut form, &limiter)?;

    tracing::info!(tag_id = tag.id, title = %tag.title, "tag deleted");

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}
