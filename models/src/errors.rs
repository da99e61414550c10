// models/src/errors.rs

use std::io;
pub use thiserror::Error;
use uuid::Uuid;
#[cfg(feature = "bincode-errors")]
use bincode::error::{DecodeError, EncodeError};

/// Coarse classification of a [`PortalError`], used by the HTTP layer to pick
/// a status code and by callers that only care about the family of failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Authorization,
    Conflict,
    UpstreamUnavailable,
    PartialFailure,
    Internal,
}

#[derive(Debug, Error)]
pub enum PortalError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{0}")]
    Unauthenticated(String),
    #[error("{0}")]
    Authorization(String),
    #[error("An account with email {0} already exists")]
    AccountExists(String),
    #[error("A patient with email {0} already exists")]
    PatientEmailExists(String),
    #[error("{operation} is unavailable: {reason}")]
    UpstreamUnavailable { operation: String, reason: String },

    #[error("Booking incomplete at stage '{stage}' for {email}: {reason}")]
    PartialBookingFailure {
        email: String,
        user_id: Uuid,
        stage: BookingStage,
        reason: String,
    },
    #[error("Record metadata insert failed after upload to {record_url}: {reason}")]
    MetadataInsertFailed { record_url: String, reason: String },

    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("An internal error occurred: {0}")]
    Internal(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl PortalError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PortalError::Validation(_) => ErrorKind::Validation,
            PortalError::Unauthenticated(_) | PortalError::Authorization(_) => ErrorKind::Authorization,
            PortalError::AccountExists(_) | PortalError::PatientEmailExists(_) => ErrorKind::Conflict,
            PortalError::UpstreamUnavailable { .. } => ErrorKind::UpstreamUnavailable,
            PortalError::PartialBookingFailure { .. } | PortalError::MetadataInsertFailed { .. } => {
                ErrorKind::PartialFailure
            }
            PortalError::Storage(_)
            | PortalError::Serialization(_)
            | PortalError::Internal(_)
            | PortalError::Io(_) => ErrorKind::Internal,
        }
    }

    pub fn upstream(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        PortalError::UpstreamUnavailable {
            operation: operation.into(),
            reason: reason.into(),
        }
    }
}

/// The step of a public booking that failed after the account was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingStage {
    PatientUpsert,
    AppointmentInsert,
}

impl std::fmt::Display for BookingStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BookingStage::PatientUpsert => write!(f, "patient"),
            BookingStage::AppointmentInsert => write!(f, "appointment"),
        }
    }
}

/// User-correctable input problems. Messages are shown to the caller verbatim.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Password must be at least 6 characters long")]
    WeakCredential,
    #[error("Passwords do not match")]
    CredentialMismatch,
    #[error("Doctor {0} was not found")]
    UnknownDoctor(String),
    #[error("Patient {0} was not found")]
    UnknownPatient(String),
    #[error("Missing required field: {0}")]
    MissingField(&'static str),
    #[error("Invalid value for {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
    #[error("Patient has no email address; records cannot be attached")]
    PatientHasNoEmail,
}

impl ValidationError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ValidationError::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}

#[cfg(feature = "bincode-errors")]
impl From<EncodeError> for PortalError {
    fn from(err: EncodeError) -> Self {
        PortalError::Serialization(format!("bincode encode error: {}", err))
    }
}

#[cfg(feature = "bincode-errors")]
impl From<DecodeError> for PortalError {
    fn from(err: DecodeError) -> Self {
        PortalError::Serialization(format!("bincode decode error: {}", err))
    }
}

#[cfg(feature = "sled-errors")]
impl From<sled::Error> for PortalError {
    fn from(err: sled::Error) -> Self {
        PortalError::Storage(format!("sled error: {}", err))
    }
}

/// A type alias for a `Result` that returns a `PortalError` on failure.
pub type PortalResult<T> = Result<T, PortalError>;

/// A type alias for a `Result` that returns a `ValidationError` on failure.
pub type ValidationResult<T> = Result<T, ValidationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_classify_errors_by_kind() {
        assert_eq!(PortalError::from(ValidationError::WeakCredential).kind(), ErrorKind::Validation);
        assert_eq!(PortalError::AccountExists("a@x.com".into()).kind(), ErrorKind::Conflict);
        assert_eq!(PortalError::upstream("store", "timed out").kind(), ErrorKind::UpstreamUnavailable);
        assert_eq!(
            PortalError::MetadataInsertFailed {
                record_url: "https://blob/1.pdf".into(),
                reason: "down".into(),
            }
            .kind(),
            ErrorKind::PartialFailure
        );
    }

    #[test]
    fn should_render_validation_messages_verbatim() {
        let err = PortalError::from(ValidationError::MissingField("reason"));
        assert_eq!(err.to_string(), "Missing required field: reason");
    }
}
