use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("credential error: {0}")]
    Credential(String),

    #[error("not found")]
    NotFound,

    /// The acting user holds no relation to the target database.
    #[error("forbidden")]
    Forbidden,

    #[error("userNotOwner")]
    UserNotOwner,

    #[error("userNotExist")]
    UserNotExist,

    #[error("userAlreadyInDatabase")]
    UserAlreadyInDatabase,

    /// Signup collided with an existing user on name, email, or both.
    #[error("{}", conflict_tags(*.name, *.email))]
    UserConflict { name: bool, email: bool },

    #[error("unauthorized")]
    Unauthorized,

    #[error("bad request: {0}")]
    BadRequest(String),
}

impl Error {
    /// Boundary tag for domain errors, `None` for infrastructure failures.
    #[must_use]
    pub fn tag(&self) -> Option<&'static str> {
        match self {
            Error::UserNotOwner => Some("userNotOwner"),
            Error::UserNotExist => Some("userNotExist"),
            Error::UserAlreadyInDatabase => Some("userAlreadyInDatabase"),
            Error::UserConflict { name: true, .. } => Some("conflict:name"),
            Error::UserConflict { email: true, .. } => Some("conflict:email"),
            Error::NotFound => Some("notFound"),
            Error::Forbidden => Some("forbidden"),
            Error::Unauthorized => Some("unauthorized"),
            Error::UserConflict { .. }
            | Error::Database(_)
            | Error::Io(_)
            | Error::Config(_)
            | Error::Credential(_)
            | Error::BadRequest(_) => None,
        }
    }
}

fn conflict_tags(name: bool, email: bool) -> String {
    let mut tags = Vec::new();
    if name {
        tags.push("conflict:name");
    }
    if email {
        tags.push("conflict:email");
    }
    tags.join(", ")
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_display_lists_both_fields() {
        let err = Error::UserConflict {
            name: true,
            email: true,
        };
        assert_eq!(err.to_string(), "conflict:name, conflict:email");
        assert_eq!(err.tag(), Some("conflict:name"));
    }

    #[test]
    fn test_domain_tags() {
        assert_eq!(Error::UserNotOwner.tag(), Some("userNotOwner"));
        assert_eq!(Error::UserNotExist.tag(), Some("userNotExist"));
        assert_eq!(
            Error::UserAlreadyInDatabase.tag(),
            Some("userAlreadyInDatabase")
        );
        assert_eq!(
            Error::UserConflict {
                name: false,
                email: true
            }
            .tag(),
            Some("conflict:email")
        );
        assert_eq!(Error::Config("x".into()).tag(), None);
    }
}
