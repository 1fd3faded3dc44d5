//! Token issuance and caller resolution.
use super::banks::activation_ttl;
use super::{ServiceError, ServiceResult, hash_password, verify_password};
use crate::app::AppState;
use crate::auth::Authenticated;
use crate::model::{Bank, IssuedToken, TokenScope};
use crate::store::StoreError;
use crate::validation::{
    ValidationErrors, validate_email, validate_password_plaintext, validate_token_plaintext,
};
use chrono::Duration;

pub fn authentication_ttl() -> Duration {
    Duration::hours(24)
}

pub fn password_reset_ttl() -> Duration {
    Duration::minutes(45)
}

/// Log in with email and password.
///
/// Unknown emails and wrong passwords are indistinguishable. Frozen and
/// inactive banks still get a token; [`require_activated_bank`] gates them
/// per request.
pub async fn create_authentication_token(
    state: &AppState,
    email: &str,
    password: &str,
) -> ServiceResult<IssuedToken> {
    let mut v = ValidationErrors::new();
    validate_email(&mut v, email);
    validate_password_plaintext(&mut v, "password", password);
    v.into_result()?;

    let bank = match state.store.get_bank_by_email(email).await {
        Ok(bank) => bank,
        Err(StoreError::NotFound(_)) => return Err(ServiceError::InvalidCredentials),
        Err(err) => return Err(err.into()),
    };
    if !verify_password(state, password, &bank.password).await? {
        tracing::info!(bank_id = bank.id, "authentication rejected");
        return Err(ServiceError::InvalidCredentials);
    }
    Ok(state
        .tokens
        .generate(
            state.store.as_ref(),
            bank.id,
            authentication_ttl(),
            TokenScope::Authentication,
        )
        .await?)
}

/// Reissue an activation token for a bank that has not activated yet.
///
/// Earlier activation tokens stay valid until they expire.
pub async fn create_activation_token(state: &AppState, email: &str) -> ServiceResult<IssuedToken> {
    let mut v = ValidationErrors::new();
    validate_email(&mut v, email);
    v.into_result()?;

    let bank = match state.store.get_bank_by_email(email).await {
        Ok(bank) => bank,
        Err(StoreError::NotFound(_)) => {
            return Err(ServiceError::invalid("email", "no matching email address found"));
        }
        Err(err) => return Err(err.into()),
    };
    if bank.activated {
        return Err(ServiceError::invalid("email", "bank has already been activated"));
    }
    let token = state
        .tokens
        .generate(state.store.as_ref(), bank.id, activation_ttl(), TokenScope::Activation)
        .await?;
    tracing::info!(bank_id = bank.id, "activation token reissued");
    Ok(token)
}

/// Issue a short-lived password reset token for an activated bank.
pub async fn create_password_reset_token(
    state: &AppState,
    email: &str,
) -> ServiceResult<IssuedToken> {
    let mut v = ValidationErrors::new();
    validate_email(&mut v, email);
    v.into_result()?;

    let bank = match state.store.get_bank_by_email(email).await {
        Ok(bank) => bank,
        Err(StoreError::NotFound(_)) => {
            return Err(ServiceError::invalid("email", "no matching email address found"));
        }
        Err(err) => return Err(err.into()),
    };
    if !bank.activated {
        return Err(ServiceError::invalid("email", "bank account must be activated"));
    }
    Ok(state
        .tokens
        .generate(
            state.store.as_ref(),
            bank.id,
            password_reset_ttl(),
            TokenScope::PasswordReset,
        )
        .await?)
}

/// Set a new password using a reset token, then revoke all reset tokens.
pub async fn reset_bank_password(
    state: &AppState,
    token: &str,
    new_password: &str,
) -> ServiceResult<Bank> {
    let mut v = ValidationErrors::new();
    validate_token_plaintext(&mut v, token);
    validate_password_plaintext(&mut v, "password", new_password);
    v.into_result()?;

    let mut bank = match state
        .tokens
        .resolve(state.store.as_ref(), TokenScope::PasswordReset, token)
        .await
    {
        Ok(bank) => bank,
        Err(StoreError::NotFound(_)) => {
            return Err(ServiceError::invalid(
                "token",
                "invalid or expired password reset token",
            ));
        }
        Err(err) => return Err(err.into()),
    };
    bank.password = hash_password(state, new_password).await?.into_hash();
    let bank = state.store.update_bank(&bank).await?;
    state
        .tokens
        .revoke(state.store.as_ref(), TokenScope::PasswordReset, bank.id)
        .await?;
    tracing::info!(bank_id = bank.id, "bank password reset");
    Ok(bank)
}

/// Resolve the caller from an optional `Authorization` header value.
pub async fn authenticate(
    state: &AppState,
    authorization: Option<&str>,
) -> ServiceResult<Authenticated> {
    Ok(state
        .tokens
        .authenticate(state.store.as_ref(), authorization)
        .await?)
}

pub fn require_authenticated_bank(caller: &Authenticated) -> ServiceResult<&Bank> {
    caller.bank().ok_or(ServiceError::AuthenticationRequired)
}

/// The acting bank, provided it is activated and not frozen.
pub fn require_activated_bank(caller: &Authenticated) -> ServiceResult<&Bank> {
    let bank = require_authenticated_bank(caller)?;
    if !bank.activated {
        return Err(ServiceError::InactiveBank);
    }
    if bank.frozen {
        return Err(ServiceError::FrozenBank);
    }
    Ok(bank)
}
