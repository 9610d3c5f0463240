use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("Tourist {tourist_id} has not purchased tour {tour_id}")]
    NotEntitled { tourist_id: u64, tour_id: u64 },

    #[error("Tour already in progress (execution {execution_id})")]
    AlreadyActive { execution_id: u64 },

    #[error("{0} not found")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Missing or invalid user identity")]
    Unauthenticated,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Transient I/O error: {0}")]
    TransientIo(String),
}

impl ServiceError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::TransientIo(message.into())
    }

    /// Errors a periodic caller may retry on its next attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientIo(_))
    }

    /// The message without the kind prefix, for kinds that carry one.
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::NotFound(message)
            | Self::InvalidState(message)
            | Self::Validation(message)
            | Self::Conflict(message)
            | Self::Forbidden(message)
            | Self::TransientIo(message) => Some(message),
            Self::NotEntitled { .. } | Self::AlreadyActive { .. } | Self::Unauthenticated => None,
        }
    }

    /// Stable machine-readable kind, used as the `code` of error responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotEntitled { .. } => "not_entitled",
            Self::AlreadyActive { .. } => "already_active",
            Self::NotFound(_) => "not_found",
            Self::InvalidState(_) => "invalid_state",
            Self::Validation(_) => "validation_error",
            Self::Conflict(_) => "conflict",
            Self::Unauthenticated => "unauthenticated",
            Self::Forbidden(_) => "forbidden",
            Self::TransientIo(_) => "transient_io",
        }
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        Self::TransientIo(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;
