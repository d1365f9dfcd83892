use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to access state file: {0}")]
    Io(#[from] std::io::Error),

    #[error("state file is not valid JSON: {0}")]
    Format(#[from] serde_json::Error),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("{0}")]
    Invalid(String),

    #[error("registration can only be submitted from the final step")]
    NotAtFinalStep,
}

/// Failure reported by the remote auth collaborator. The message is shown
/// to the user verbatim.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0}")]
    Rejected(String),

    #[error("auth backend unavailable: {0}")]
    Backend(#[from] sqlx::Error),
}

#[derive(Debug, Error)]
pub enum LoginError {
    #[error("too many failed attempts, try again in {remaining}")]
    Locked { remaining: String },

    #[error("{message} ({attempts_remaining} attempts remaining)")]
    Rejected {
        message: String,
        attempts_remaining: u32,
    },

    #[error(transparent)]
    Backend(AuthError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("failed to read content file: {0}")]
    Io(#[from] std::io::Error),

    #[error("content file is not valid JSON: {0}")]
    Format(#[from] serde_json::Error),
}
