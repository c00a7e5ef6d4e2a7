use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Unauthorized,
    Forbidden,
    NotFound,
    Conflict,
    Validation,
    Internal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Everything a hub operation can refuse. None of these are fatal: callers
/// report them to the originating connection and carry on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HubError {
    #[error("invalid identity: {0}")]
    InvalidIdentity(String),
    #[error("invalid group name: {0}")]
    InvalidGroupName(String),
    #[error("Group \"{0}\" does not exist.")]
    NoSuchGroup(String),
    #[error("Group \"{0}\" already exists.")]
    DuplicateGroup(String),
    #[error("You are not a member of \"{0}\".")]
    NotAMember(String),
    #[error("Message text cannot be empty.")]
    EmptyMessage,
    #[error("Join with a display name first.")]
    NotIdentified,
    #[error("failed to persist snapshot: {0}")]
    PersistenceWriteFailure(String),
}

impl HubError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidIdentity(_) | Self::InvalidGroupName(_) | Self::EmptyMessage => {
                ErrorCode::Validation
            }
            Self::NoSuchGroup(_) => ErrorCode::NotFound,
            Self::DuplicateGroup(_) => ErrorCode::Conflict,
            Self::NotAMember(_) => ErrorCode::Forbidden,
            Self::NotIdentified => ErrorCode::Unauthorized,
            Self::PersistenceWriteFailure(_) => ErrorCode::Internal,
        }
    }
}

impl From<HubError> for ApiError {
    fn from(value: HubError) -> Self {
        Self::new(value.code(), value.to_string())
    }
}
