//! Bank registration, activation and self-service updates.
use super::{ServiceError, ServiceResult, hash_password};
use crate::app::AppState;
use crate::model::{Bank, BankPatch, IssuedToken, NewBank, TokenScope};
use crate::store::StoreError;
use crate::validation::{
    ValidationErrors, validate_email, validate_name, validate_password_plaintext,
    validate_token_plaintext,
};
use chrono::Duration;
use serde::Serialize;

/// How long a freshly registered bank has to activate.
pub fn activation_ttl() -> Duration {
    Duration::days(3)
}

#[derive(Debug, Clone)]
pub struct RegisterBank {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// A newly registered bank and the activation token to deliver to it.
#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    pub bank: Bank,
    pub activation_token: IssuedToken,
}

pub async fn register_bank(state: &AppState, input: RegisterBank) -> ServiceResult<Registration> {
    let mut v = ValidationErrors::new();
    validate_name(&mut v, &input.name);
    validate_email(&mut v, &input.email);
    validate_password_plaintext(&mut v, "password", &input.password);
    v.into_result()?;

    let password = hash_password(state, &input.password).await?;
    let bank = state
        .store
        .insert_bank(&NewBank {
            name: input.name,
            email: input.email,
            password,
        })
        .await?;
    let activation_token = state
        .tokens
        .generate(state.store.as_ref(), bank.id, activation_ttl(), TokenScope::Activation)
        .await?;
    tracing::info!(bank_id = bank.id, "bank registered");
    Ok(Registration {
        bank,
        activation_token,
    })
}

/// Exchange an activation token for an activated bank.
pub async fn activate_bank(state: &AppState, token: &str) -> ServiceResult<Bank> {
    let mut v = ValidationErrors::new();
    validate_token_plaintext(&mut v, token);
    v.into_result()?;

    let mut bank = match state
        .tokens
        .resolve(state.store.as_ref(), TokenScope::Activation, token)
        .await
    {
        Ok(bank) => bank,
        Err(StoreError::NotFound(_)) => {
            return Err(ServiceError::invalid(
                "token",
                "invalid or expired activation token",
            ));
        }
        Err(err) => return Err(err.into()),
    };
    bank.activated = true;
    let bank = state.store.update_bank(&bank).await?;
    state
        .tokens
        .revoke(state.store.as_ref(), TokenScope::Activation, bank.id)
        .await?;
    tracing::info!(bank_id = bank.id, "bank activated");
    Ok(bank)
}

/// Apply `patch` to the acting bank, conditioned on the version it was
/// loaded with.
pub async fn update_bank(state: &AppState, bank: &Bank, patch: BankPatch) -> ServiceResult<Bank> {
    let mut v = ValidationErrors::new();
    if let Some(name) = &patch.name {
        validate_name(&mut v, name);
    }
    if let Some(email) = &patch.email {
        validate_email(&mut v, email);
    }
    if let Some(password) = &patch.password {
        validate_password_plaintext(&mut v, "password", password);
    }
    v.check(!patch.is_empty(), "body", "must change at least one field");
    v.into_result()?;

    let mut updated = bank.clone();
    if let Some(name) = patch.name {
        updated.name = name;
    }
    if let Some(email) = patch.email {
        updated.email = email;
    }
    if let Some(password) = patch.password {
        updated.password = hash_password(state, &password).await?.into_hash();
    }
    let updated = state.store.update_bank(&updated).await?;
    tracing::info!(bank_id = updated.id, version = updated.version, "bank updated");
    Ok(updated)
}

/// Administrative freeze or thaw.
pub async fn set_bank_frozen(state: &AppState, bank_id: i64, frozen: bool) -> ServiceResult<Bank> {
    let mut bank = get_bank(state, bank_id).await?;
    if bank.frozen == frozen {
        return Ok(bank);
    }
    bank.frozen = frozen;
    let bank = state.store.update_bank(&bank).await?;
    tracing::warn!(bank_id = bank.id, frozen, "bank freeze state changed");
    Ok(bank)
}

pub async fn get_bank(state: &AppState, bank_id: i64) -> ServiceResult<Bank> {
    Ok(state.store.get_bank(bank_id).await?)
}
