//! Service-level error taxonomy.
//!
//! Store and crypto failures are folded into these variants at the service
//! boundary. Anything a caller cannot act on becomes [`ServiceError::Internal`],
//! which logs the cause once and renders a generic message.
use crate::auth::AuthError;
use crate::cards::IssueError;
use crate::store::StoreError;
use crate::validation::ValidationErrors;
use reserva_crypto::CryptoError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("failed validation: {0}")]
    Validation(ValidationErrors),
    #[error("the requested resource could not be found")]
    NotFound,
    #[error("unable to update the record due to an edit conflict, please try again")]
    EditConflict,
    #[error("a bank with this email address already exists")]
    DuplicateEmail,
    #[error("invalid authentication credentials")]
    InvalidCredentials,
    #[error("invalid or missing authentication token")]
    InvalidAuthenticationToken,
    #[error("you must be authenticated to access this resource")]
    AuthenticationRequired,
    #[error("your bank account must be activated to access this resource")]
    InactiveBank,
    #[error("your bank account is frozen")]
    FrozenBank,
    #[error("the server encountered a problem and could not process your request")]
    Internal(#[source] anyhow::Error),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    /// Log `err` and hide it behind the generic internal error.
    pub fn internal(err: impl Into<anyhow::Error>) -> Self {
        let err = err.into();
        tracing::error!(error = ?err, "internal error");
        ServiceError::Internal(err)
    }

    /// Single-field validation failure.
    pub fn invalid(field: &str, message: &str) -> Self {
        let mut errors = ValidationErrors::new();
        errors.add(field, message);
        ServiceError::Validation(errors)
    }

    pub fn validation_errors(&self) -> Option<&ValidationErrors> {
        match self {
            ServiceError::Validation(errors) => Some(errors),
            _ => None,
        }
    }
}

impl From<ValidationErrors> for ServiceError {
    fn from(errors: ValidationErrors) -> Self {
        ServiceError::Validation(errors)
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => ServiceError::NotFound,
            StoreError::EditConflict(_) => ServiceError::EditConflict,
            StoreError::DuplicateEmail => ServiceError::DuplicateEmail,
            other => ServiceError::internal(other),
        }
    }
}

impl From<IssueError> for ServiceError {
    fn from(err: IssueError) -> Self {
        match err {
            IssueError::Store(store) => store.into(),
            exhausted @ IssueError::Exhausted { .. } => ServiceError::internal(exhausted),
        }
    }
}

impl From<AuthError> for ServiceError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidAuthenticationToken => ServiceError::InvalidAuthenticationToken,
            AuthError::Store(store) => store.into(),
        }
    }
}

impl From<CryptoError> for ServiceError {
    fn from(err: CryptoError) -> Self {
        ServiceError::internal(err)
    }
}
