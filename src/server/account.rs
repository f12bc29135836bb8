use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::post,
};
use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::auth::{ClientId, CredentialHasher, RequireUser};
use crate::error::Error;
use crate::form::Form;
use crate::server::AppState;
use crate::server::dto::{LoginRequest, SessionResponse, SignupRequest};
use crate::server::response::{ApiError, ApiResponse, StoreOptionExt, StoreResultExt};
use crate::server::validation::{
    self, SubmitResultExt, ensure_not_limited, reject, reject_error,
};
use crate::types::{Session, User};

pub fn account_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/logout", post(logout))
}

fn open_session(state: &AppState, user: User) -> Result<SessionResponse, ApiError> {
    let (token, lookup, hash) = CredentialHasher::new().generate_token()?;
    let now = Utc::now();
    let session = Session {
        id: Uuid::new_v4().to_string(),
        user_id: user.id,
        token_hash: hash,
        token_lookup: lookup,
        created_at: now,
        expires_at: now + Duration::seconds(state.config.session_ttl_secs),
    };

    state
        .store
        .create_session(&session)
        .api_err("Failed to create session")?;

    tracing::info!(user_id = user.id, "session opened");

    Ok(SessionResponse {
        token,
        user,
        expires_at: session.expires_at,
    })
}

pub async fn signup(
    ClientId(client): ClientId,
    State(state): State<Arc<AppState>>,
    Json(req): Json<SignupRequest>,
) -> impl IntoResponse {
    let limiter = state.route_limiter(&client, "signup", state.config.rate_limits.signup);
    ensure_not_limited(&limiter)?;

    let mut form = Form::new();
    let name = form.validate("name", &req.name, validation::user_name);
    let email = form.validate("email", &req.email, validation::email_shape);
    let password = req.password.trim();
    if let Err(err) = validation::password(password) {
        form.reject("password", err, false);
    }

    if !form.success() {
        return Err(reject(form, &limiter, StatusCode::UNPROCESSABLE_ENTITY));
    }

    let hash = CredentialHasher::new().hash(password)?;

    let user_id = state
        .store
        .create_user(&name, &email, &hash)
        .or_reject(&mut form, &limiter)?;

    let user = state
        .store
        .get_user(user_id)
        .api_err("Failed to get user")?
        .or_not_found()?;

    tracing::info!(user_id, "user signed up");

    let session = open_session(&state, user)?;
    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(session))))
}

pub async fn login(
    ClientId(client): ClientId,
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> impl IntoResponse {
    let limiter = state.route_limiter(&client, "login", state.config.rate_limits.login);
    ensure_not_limited(&limiter)?;

    let mut form = Form::new();
    let identifier = form.validate("identifier", &req.identifier, validation::required);
    let password = req.password.trim();
    if let Err(err) = validation::required(password) {
        form.reject("password", err, false);
    }

    if !form.success() {
        return Err(reject(form, &limiter, StatusCode::UNPROCESSABLE_ENTITY));
    }

    let hasher = CredentialHasher::new();
    let user = state
        .store
        .get_user_by_identifier(&identifier)
        .api_err("Failed to get user")?;

    let verified = match &user {
        Some(user) => hasher.verify(password, &user.password_hash)?,
        None => false,
    };

    let Some(user) = user.filter(|_| verified) else {
        tracing::debug!(%client, "login rejected");
        return Err(reject_error(form, &limiter, Error::Unauthorized));
    };

    let session = open_session(&state, user)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(session)))
}

pub async fn logout(auth: RequireUser, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state
        .store
        .delete_session(&auth.session.id)
        .api_err("Failed to delete session")?;

    tracing::info!(user_id = auth.user.id, "session closed");

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}
