use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::access::{require_access, require_post_access};
use crate::auth::{ClientId, RequireUser};
use crate::error::Error;
use crate::form::Form;
use crate::server::AppState;
use crate::server::dto::{AddPostTagRequest, CreatePostRequest, UpdatePostRequest};
use crate::server::response::{ApiError, ApiResponse, StoreOptionExt, StoreResultExt};
use crate::server::validation::{self, SubmitResultExt, reject, validate_id};
use crate::store::Store;
use crate::types::{Action, PostWithTags};

fn post_with_tags(store: &dyn Store, post_id: i64) -> Result<PostWithTags, ApiError> {
    let post = store
        .get_post(post_id)
        .api_err("Failed to get post")?
        .or_not_found()?;
    let tags = store
        .list_tags_for_post(post_id)
        .api_err("Failed to list post tags")?;
    Ok(PostWithTags { post, tags })
}

pub async fn create_post(
    ClientId(client): ClientId,
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreatePostRequest>,
) -> impl IntoResponse {
    let limiter = state.mutation_limiter(&client);
    let store = state.store.as_ref();

    let mut form = Form::new();
    let title = form.validate("title", &req.title, validation::title);
    let content = form.validate("content", &req.content, validation::content);
    let tags = form.validate("tags", &req.tags, validation::tag_list);
    let database_id = validate_id(&mut form, "database_id", req.database_id);

    let Some(database_id) = database_id.filter(|_| form.success()) else {
        return Err(reject(form, &limiter, StatusCode::UNPROCESSABLE_ENTITY));
    };

    require_access(store, auth.user.id, database_id, Action::CreatePost)
        .or_reject(&mut form, &limiter)?;

    let titles: Vec<String> = tags.split_whitespace().map(str::to_string).collect();
    let post_id = store
        .create_tagged_post(&title, &content, database_id, &titles)
        .or_reject(&mut form, &limiter)?;

    tracing::info!(post_id, database_id, "post created");

    let post = post_with_tags(store, post_id)?;
    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(post))))
}

pub async fn get_post(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    let store = state.store.as_ref();

    require_post_access(store, auth.user.id, id, Action::Read)?;

    let post = post_with_tags(store, id)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(post)))
}

pub async fn update_post(
    ClientId(client): ClientId,
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<UpdatePostRequest>,
) -> impl IntoResponse {
    let limiter = state.mutation_limiter(&client);
    let store = state.store.as_ref();

    let mut form = Form::new();
    let title = form.validate("title", &req.title, validation::title);
    let content = form.validate("content", &req.content, validation::content);

    if !form.success() {
        return Err(reject(form, &limiter, StatusCode::UNPROCESSABLE_ENTITY));
    }

    require_post_access(store, auth.user.id, id, Action::EditPost)
        .or_reject(&mut form, &limiter)?;

    store
        .edit_post(id, &title, &content)
        .or_reject(&mut form, &limiter)?;

    let post = post_with_tags(store, id)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(post)))
}

pub async fn delete_post(
    ClientId(client): ClientId,
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    let limiter = state.mutation_limiter(&client);
    let store = state.store.as_ref();
    let mut form = Form::new();

    require_post_access(store, auth.user.id, id, Action::DeletePost)
        .or_reject(&mut form, &limiter)?;

    store.delete_post(id).or_reject(&mut form, &limiter)?;

    tracing::info!(post_id = id, user_id = auth.user.id, "post deleted");

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}

pub async fn list_post_tags(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    let store = state.store.as_ref();

    require_post_access(store, auth.user.id, id, Action::Read)?;

    let tags = store
        .list_tags_for_post(id)
        .api_err("Failed to list post tags")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(tags)))
}

pub async fn add_post_tag(
    ClientId(client): ClientId,
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<AddPostTagRequest>,
) -> impl IntoResponse {
    let limiter = state.mutation_limiter(&client);
    let store = state.store.as_ref();

    let mut form = Form::new();
    let title = form.validate("title", &req.title, validation::tag_title);

    if !form.success() {
        return Err(reject(form, &limiter, StatusCode::UNPROCESSABLE_ENTITY));
    }

    let post = require_post_access(store, auth.user.id, id, Action::Tag)
        .or_reject(&mut form, &limiter)?;

    store
        .attach_tags(post.id, post.database_id, &[title])
        .or_reject(&mut form, &limiter)?;

    let tags = store
        .list_tags_for_post(post.id)
        .api_err("Failed to list post tags")?;

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(tags))))
}

pub async fn remove_post_tag(
    ClientId(client): ClientId,
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path((id, tag_id)): Path<(i64, i64)>,
) -> impl IntoResponse {
    let limiter = state.mutation_limiter(&client);
    let store = state.store.as_ref();
    let mut form = Form::new();

    require_post_access(store, auth.user.id, id, Action::Tag)
        .or_reject(&mut form, &limiter)?;

    store
        .get_tag(tag_id)
        .and_then(|tag| tag.ok_or(Error::NotFound))
        .or_reject(&mut form, &limiter)?;

    store
        .remove_tag_from_post(tag_id, id)
        .or_reject(&mut form, &limiter)?;

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}
