use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::access::require_access;
use crate::auth::{ClientId, RequireUser};
use crate::form::Form;
use crate::server::AppState;
use crate::server::dto::{CreateDatabaseRequest, CreatedResponse};
use crate::server::response::{ApiError, ApiResponse, StoreResultExt};
use crate::server::validation::{self, SubmitResultExt, reject};
use crate::types::Action;

pub async fn list_databases(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let databases = state
        .store
        .list_databases_for_user(auth.user.id)
        .api_err("Failed to list databases")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(databases)))
}

pub async fn list_owned_databases(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let databases = state
        .store
        .list_owned_databases(auth.user.id)
        .api_err("Failed to list owned databases")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(databases)))
}

pub async fn create_database(
    ClientId(client): ClientId,
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateDatabaseRequest>,
) -> impl IntoResponse {
    let limiter = state.mutation_limiter(&client);

    let mut form = Form::new();
    let name = form.validate("name", &req.name, validation::database_name);

    if !form.success() {
        return Err(reject(form, &limiter, StatusCode::UNPROCESSABLE_ENTITY));
    }

    let id = state
        .store
        .create_database(auth.user.id, &name)
        .or_reject(&mut form, &limiter)?;

    tracing::info!(database_id = id, user_id = auth.user.id, "database created");

    Ok::<_, ApiError>((
        StatusCode::CREATED,
        Json(ApiResponse::success(CreatedResponse { id })),
    ))
}

pub async fn delete_database(
    ClientId(client): ClientId,
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    let limiter = state.mutation_limiter(&client);
    let store = state.store.as_ref();
    let mut form = Form::new();

    require_access(store, auth.user.id, id, Action::DeleteDatabase)
        .or_reject(&mut form, &limiter)?;

    store
        .delete_database(id, auth.user.id)
        .or_reject(&mut form, &limiter)?;

    tracing::info!(database_id = id, user_id = auth.user.id, "database deleted");

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}
