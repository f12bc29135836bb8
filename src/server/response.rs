use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::error::{Error, Result as StoreResult};
use crate::form::FormState;

/// Success envelope: `{"data": ..., "error": null}`.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub error: Option<&'static str>,
}

impl<T: Serialize> ApiResponse<T> {
    #[must_use]
    pub fn success(data: T) -> Self {
        Self { data, error: None }
    }
}

/// Failure envelope: `{"data": null, "error": code}`, plus the form bag for
/// rejected submissions.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    /// Boundary tag such as `userNotOwner` or `validation`.
    pub code: &'static str,
    pub fields: Option<FormState>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    data: Option<()>,
    error: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<&'a FormState>,
}

impl ApiError {
    #[must_use]
    pub fn new(status: StatusCode, code: &'static str) -> Self {
        Self {
            status,
            code,
            fields: None,
        }
    }

    #[must_use]
    pub fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal")
    }

    #[must_use]
    pub fn with_fields(mut self, fields: FormState) -> Self {
        self.fields = Some(fields);
        self
    }
}

/// HTTP status for a store error.
pub fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::NotFound | Error::UserNotExist => StatusCode::NOT_FOUND,
        Error::Forbidden | Error::UserNotOwner => StatusCode::FORBIDDEN,
        Error::UserAlreadyInDatabase | Error::UserConflict { .. } => StatusCode::CONFLICT,
        Error::Unauthorized => StatusCode::UNAUTHORIZED,
        Error::BadRequest(_) => StatusCode::BAD_REQUEST,
        Error::Database(_) | Error::Io(_) | Error::Config(_) | Error::Credential(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match status_for(&err) {
            StatusCode::INTERNAL_SERVER_ERROR => {
                tracing::error!("Internal error: {err}");
                ApiError::internal()
            }
            status => ApiError::new(status, err.tag().unwrap_or("badRequest")),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            data: None,
            error: self.code,
            fields: self.fields.as_ref(),
        };
        (self.status, Json(body)).into_response()
    }
}

/// Logs a failed store call and hides it behind a 500.
pub trait StoreResultExt<T> {
    fn api_err(self, context: &'static str) -> Result<T, ApiError>;
}

impl<T> StoreResultExt<T> for StoreResult<T> {
    fn api_err(self, context: &'static str) -> Result<T, ApiError> {
        self.map_err(|e| {
            tracing::error!("{context}: {e}");
            ApiError::internal()
        })
    }
}

pub trait StoreOptionExt<T> {
    fn or_not_found(self) -> Result<T, ApiError>;
}

impl<T> StoreOptionExt<T> for Option<T> {
    fn or_not_found(self) -> Result<T, ApiError> {
        self.ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "notFound"))
    }
}
