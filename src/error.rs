//! Error types for workqueue.

use thiserror::Error;

use crate::model::Status;

#[derive(Debug, Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition { from: Status, to: Status },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("parentage cycle: {child} -> {parent}")]
    Cycle { child: String, parent: String },

    #[error("integrity violation: {0}")]
    Integrity(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(#[source] sqlx::Error),

    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("{0}")]
    Other(String),
}

/// Coarse classification for callers that must tell a bad request apart
/// from an unavailable store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request itself was wrong (or raced with another writer).
    Client,
    /// The store or its configuration is unusable.
    Infrastructure,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound(_)
            | Error::InvalidTransition { .. }
            | Error::Conflict(_)
            | Error::Cycle { .. }
            | Error::Integrity(_)
            | Error::InvalidInput(_) => ErrorKind::Client,
            Error::Config(_) | Error::Storage(_) | Error::Migrate(_) | Error::Other(_) => {
                ErrorKind::Infrastructure
            }
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db) = err {
            match db.kind() {
                sqlx::error::ErrorKind::UniqueViolation
                | sqlx::error::ErrorKind::ForeignKeyViolation => {
                    return Error::Integrity(db.message().to_string());
                }
                _ => {}
            }
        }
        Error::Storage(err)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_are_classified_as_client() {
        let errors = [
            Error::NotFound("element 7".to_string()),
            Error::InvalidTransition {
                from: Status::Done,
                to: Status::Running,
            },
            Error::Conflict("bound".to_string()),
            Error::Cycle {
                child: "a".to_string(),
                parent: "b".to_string(),
            },
            Error::InvalidInput("bad name".to_string()),
        ];
        for err in errors {
            assert_eq!(err.kind(), ErrorKind::Client, "{err}");
        }
    }

    #[test]
    fn storage_errors_are_infrastructure() {
        let err: Error = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, Error::Storage(_)));
        assert_eq!(err.kind(), ErrorKind::Infrastructure);
    }

    #[test]
    fn transition_error_names_both_states() {
        let err = Error::InvalidTransition {
            from: Status::Available,
            to: Status::Done,
        };
        assert_eq!(
            err.to_string(),
            "invalid state transition: Available -> Done"
        );
    }

    #[test]
    fn constraint_violations_are_client_errors() {
        let err = Error::Integrity("duplicate block".to_string());
        assert_eq!(err.kind(), ErrorKind::Client);
    }
}
