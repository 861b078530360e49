use thiserror::Error;

use super::store::StoreError;
use crate::modules::validation::ValidationVerdict;

/// Failures of the credential workflow and the invitation store
#[derive(Debug, Error)]
pub enum GateError {
    /// One or more fields broke a validation rule; the caller re-prompts
    #[error("{0}")]
    MalformedInput(ValidationVerdict),

    #[error("the username '{0}' is already taken")]
    DuplicateUsername(String),

    /// Unknown, expired and already-consumed codes are reported alike
    #[error("the invitation code is invalid, expired, or already used")]
    InvalidOrExpiredCode,

    #[error("record store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    #[error("could not find an unused invitation code after {0} attempts")]
    CodeSpaceExhausted(u32),

    #[error("unknown role '{0}'")]
    UnknownRole(String),

    #[error("at least one role must be selected")]
    EmptyRoleSet,

    #[error("no user named '{0}'")]
    UserNotFound(String),

    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("an administrator account already exists")]
    AdminAlreadyInitialized,
}

impl GateError {
    /// Whether the caller can recover by correcting its input
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, GateError::StoreUnavailable(_))
    }
}
