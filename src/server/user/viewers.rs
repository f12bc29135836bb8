use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::access::require_access;
use crate::auth::{ClientId, RequireUser};
use crate::error::Error;
use crate::form::Form;
use crate::server::AppState;
use crate::server::dto::AddViewerRequest;
use crate::server::response::{ApiError, ApiResponse, StoreResultExt};
use crate::server::validation::{self, SubmitResultExt, reject};
use crate::types::{Action, Viewer};

pub async fn list_viewers(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    let store = state.store.as_ref();

    require_access(store, auth.user.id, id, Action::ManageViewers)?;

    let viewers = store
        .list_database_viewers(id)
        .api_err("Failed to list viewers")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(viewers)))
}

pub async fn add_viewer(
    ClientId(client): ClientId,
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<AddViewerRequest>,
) -> impl IntoResponse {
    let limiter = state.mutation_limiter(&client);
    let store = state.store.as_ref();

    let mut form = Form::new();
    let email = form.validate("email", &req.email, validation::email_shape);

    if !form.success() {
        return Err(reject(form, &limiter, StatusCode::UNPROCESSABLE_ENTITY));
    }

    require_access(store, auth.user.id, id, Action::ManageViewers)
        .or_reject(&mut form, &limiter)?;

    let user = store
        .add_viewer_by_email(id, &email, auth.user.id)
        .or_reject(&mut form, &limiter)?;

    tracing::info!(database_id = id, viewer_id = user.id, "viewer added");

    let viewer = Viewer {
        user_id: user.id,
        name: user.name,
        email: user.email,
    };
    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(viewer))))
}

pub async fn remove_viewer(
    ClientId(client): ClientId,
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path((id, user_id)): Path<(i64, i64)>,
) -> impl IntoResponse {
    let limiter = state.mutation_limiter(&client);
    let store = state.store.as_ref();
    let mut form = Form::new();

    require_access(store, auth.user.id, id, Action::ManageViewers)
        .or_reject(&mut form, &limiter)?;

    let removed = store
        .remove_viewer(id, user_id, auth.user.id)
        .or_reject(&mut form, &limiter)?;

    if !removed {
        return Err(validation::reject_error(form, &limiter, Error::NotFound));
    }

    tracing::info!(database_id = id, viewer_id = user_id, "viewer removed");

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}
