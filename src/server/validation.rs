use axum::http::StatusCode;

use crate::error::Error;
use crate::form::{FieldError, Form, GENERAL};
use crate::ratelimit::RateLimiter;
use crate::server::response::{ApiError, status_for};

const MAX_NAME_LEN: usize = 64;
const MAX_TITLE_LEN: usize = 200;
const MAX_CONTENT_LEN: usize = 20_000;
const MIN_PASSWORD_LEN: usize = 8;
const MAX_TAGS: usize = 10;

const REQUIRED: &str = "This field is required";
const TOO_MANY_ATTEMPTS: &str = "Too many failed attempts. Please wait a moment before trying again.";

pub fn required(value: &str) -> Result<(), FieldError> {
    if value.is_empty() {
        return Err(FieldError::invalid(REQUIRED));
    }
    Ok(())
}

pub fn max_len(value: &str, max: usize) -> Result<(), FieldError> {
    if value.chars().count() > max {
        return Err(FieldError::invalid(format!(
            "Cannot exceed {max} characters"
        )));
    }
    Ok(())
}

fn is_tag_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == ' ' || "åäöÅÄÖ".contains(c)
}

/// A space separated list of at most ten tags.
pub fn tag_list(value: &str) -> Result<(), FieldError> {
    required(value)?;
    if !value.chars().all(is_tag_char) {
        return Err(FieldError::invalid(
            "Tags can only contain letters, digits and spaces",
        ));
    }
    if value.split_whitespace().count() > MAX_TAGS {
        return Err(FieldError::invalid(format!(
            "You can use at most {MAX_TAGS} tags"
        )));
    }
    Ok(())
}

/// A single tag title, which may span several words.
pub fn tag_title(value: &str) -> Result<(), FieldError> {
    required(value)?;
    if !value.chars().all(is_tag_char) {
        return Err(FieldError::invalid(
            "Tags can only contain letters, digits and spaces",
        ));
    }
    max_len(value, MAX_NAME_LEN)
}

pub fn title(value: &str) -> Result<(), FieldError> {
    required(value)?;
    max_len(value, MAX_TITLE_LEN)
}

pub fn content(value: &str) -> Result<(), FieldError> {
    required(value)?;
    max_len(value, MAX_CONTENT_LEN)
}

pub fn database_name(value: &str) -> Result<(), FieldError> {
    required(value)?;
    max_len(value, MAX_NAME_LEN)
}

pub fn user_name(value: &str) -> Result<(), FieldError> {
    required(value)?;
    if value.contains('@') {
        return Err(FieldError::clear("Name cannot contain an @ sign"));
    }
    max_len(value, MAX_NAME_LEN)
}

pub fn email_shape(value: &str) -> Result<(), FieldError> {
    required(value)?;
    let valid = value
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if !valid || value.chars().any(char::is_whitespace) {
        return Err(FieldError::invalid("Enter a valid email address"));
    }
    Ok(())
}

pub fn min_len(value: &str, min: usize) -> Result<(), FieldError> {
    if value.chars().count() < min {
        return Err(FieldError::clear(format!(
            "Must be at least {min} characters"
        )));
    }
    Ok(())
}

pub fn password(value: &str) -> Result<(), FieldError> {
    required(value)?;
    min_len(value, MIN_PASSWORD_LEN)
}

pub fn positive_id(value: &str) -> Result<(), FieldError> {
    required(value)?;
    match value.parse::<i64>() {
        Ok(id) if id > 0 => Ok(()),
        _ => Err(FieldError::invalid("Invalid id")),
    }
}

/// Validates an optional numeric id field and returns it when well formed.
pub fn validate_id(form: &mut Form, field: &str, raw: Option<i64>) -> Option<i64> {
    let raw = raw.map(|id| id.to_string()).unwrap_or_default();
    let value = form.validate(field, &raw, positive_id);
    if form.errors().contains_key(field) {
        return None;
    }
    value.parse().ok()
}

/// Finishes a failed submission: records the failure against the client and,
/// once the threshold is crossed, replaces every field error with a general one.
pub fn reject(form: Form, limiter: &RateLimiter<'_>, status: StatusCode) -> ApiError {
    reject_with(form, limiter, status, "validation")
}

fn reject_with(
    mut form: Form,
    limiter: &RateLimiter<'_>,
    mut status: StatusCode,
    mut message: &'static str,
) -> ApiError {
    match limiter
        .record_failure()
        .and_then(|_| limiter.limit_exceeded())
    {
        Ok(true) => {
            tracing::warn!(key = limiter.key(), "rate limit exceeded");
            form.reject(GENERAL, FieldError::invalid(TOO_MANY_ATTEMPTS), true);
            status = StatusCode::TOO_MANY_REQUESTS;
            message = "tooManyAttempts";
        }
        Ok(false) => {}
        Err(e) => tracing::error!("Failed to record failed attempt: {e}"),
    }

    ApiError::new(status, message).with_fields(form.into_state())
}

/// Maps a domain error onto the form and rejects the submission.
///
/// Infrastructure failures are not the client's fault and are returned as a
/// plain 500 without touching the counter.
pub fn reject_error(mut form: Form, limiter: &RateLimiter<'_>, err: Error) -> ApiError {
    let status = status_for(&err);
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        return ApiError::from(err);
    }
    form.reject_error(&err);
    reject_with(form, limiter, status, err.tag().unwrap_or("badRequest"))
}

/// Extension for domain results inside a form submission.
pub trait SubmitResultExt<T> {
    fn or_reject(self, form: &mut Form, limiter: &RateLimiter<'_>) -> Result<T, ApiError>;
}

impl<T> SubmitResultExt<T> for crate::error::Result<T> {
    fn or_reject(self, form: &mut Form, limiter: &RateLimiter<'_>) -> Result<T, ApiError> {
        self.map_err(|e| reject_error(std::mem::take(form), limiter, e))
    }
}

/// Short-circuits a submission from a client that is already over its limit.
pub fn ensure_not_limited(limiter: &RateLimiter<'_>) -> Result<(), ApiError> {
    match limiter.limit_exceeded() {
        Ok(false) => Ok(()),
        Ok(true) => {
            let mut form = Form::new();
            form.reject(GENERAL, FieldError::invalid(TOO_MANY_ATTEMPTS), true);
            Err(ApiError::new(StatusCode::TOO_MANY_REQUESTS, "tooManyAttempts")
                .with_fields(form.into_state()))
        }
        Err(e) => Err(ApiError::from(e)),
    }
}
