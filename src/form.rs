//! Per-field request validation with an aggregated error/value bag.
//!
//! Each field is checked independently; a field keeps only the first failure
//! of its own check chain. After the first pass a handler may attempt the
//! store operation and map any domain error back onto fields with
//! [`Form::reject`] or [`Form::reject_error`].

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::Error;

/// Field that carries errors not tied to a single input.
pub const GENERAL: &str = "general";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldError {
    /// Record the message and keep the submitted value for redisplay.
    Invalid(String),
    /// Record the message and blank the submitted value.
    Clear(String),
}

impl FieldError {
    pub fn invalid(message: impl Into<String>) -> Self {
        FieldError::Invalid(message.into())
    }

    pub fn clear(message: impl Into<String>) -> Self {
        FieldError::Clear(message.into())
    }

    pub fn message(&self) -> &str {
        match self {
            FieldError::Invalid(m) | FieldError::Clear(m) => m,
        }
    }
}

/// The `{field -> message}` / `{field -> last value}` bag handed back to the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FormState {
    pub errors: BTreeMap<String, String>,
    pub values: BTreeMap<String, String>,
}

#[derive(Debug, Default)]
pub struct Form {
    state: FormState,
}

impl Form {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Trims `raw`, records it as the field's value, and runs `check` on it.
    /// Returns the trimmed value.
    pub fn validate<F>(&mut self, field: &str, raw: &str, check: F) -> String
    where
        F: FnOnce(&str) -> Result<(), FieldError>,
    {
        let value = raw.trim().to_string();
        self.state.values.insert(field.to_string(), value.clone());

        if let Err(err) = check(&value) {
            self.record(field, err, false);
        }
        value
    }

    /// Records a failure for `field` after validation, e.g. from a store error.
    /// With `clear_all` every previously recorded error is dropped first.
    pub fn reject(&mut self, field: &str, err: FieldError, clear_all: bool) {
        self.record(field, err, clear_all);
    }

    /// Maps a store error onto the field it concerns.
    pub fn reject_error(&mut self, err: &Error) {
        let (field, field_err) = match err {
            Error::UserConflict { name, email } => {
                if *name {
                    self.record("name", FieldError::clear("That name is already taken"), false);
                }
                if *email {
                    self.record(
                        "email",
                        FieldError::clear("That email address is already taken"),
                        false,
                    );
                }
                if *name || *email {
                    return;
                }
                (GENERAL, FieldError::invalid("Something went wrong, please try again"))
            }
            Error::UserNotOwner => (
                GENERAL,
                FieldError::invalid("Only an owner of this database can do that"),
            ),
            Error::UserNotExist => ("email", FieldError::invalid("No user has that email address")),
            Error::UserAlreadyInDatabase => (
                "email",
                FieldError::invalid("That user already has access to this database"),
            ),
            Error::Forbidden => (
                GENERAL,
                FieldError::invalid("You do not have access to this database"),
            ),
            Error::NotFound => (GENERAL, FieldError::invalid("Not found")),
            Error::Unauthorized => (GENERAL, FieldError::invalid("Wrong username or password")),
            Error::BadRequest(message) => (GENERAL, FieldError::invalid(message.clone())),
            Error::Database(_) | Error::Io(_) | Error::Config(_) | Error::Credential(_) => (
                GENERAL,
                FieldError::invalid("Something went wrong, please try again"),
            ),
        };
        self.record(field, field_err, false);
    }

    fn record(&mut self, field: &str, err: FieldError, clear_all: bool) {
        if clear_all {
            self.state.errors.clear();
        }
        if let FieldError::Clear(_) = err {
            self.state.values.insert(field.to_string(), String::new());
        }
        self.state
            .errors
            .insert(field.to_string(), err.message().to_string());
    }

    pub fn success(&self) -> bool {
        self.state.errors.is_empty()
    }

    pub fn errors(&self) -> &BTreeMap<String, String> {
        &self.state.errors
    }

    pub fn values(&self) -> &BTreeMap<String, String> {
        &self.state.values
    }

    pub fn into_state(self) -> FormState {
        self.state
    }
}
