//! Card issuance and management.
use super::{ServiceResult, hash_password};
use crate::app::AppState;
use crate::model::{Bank, Card, NewCard};
use crate::paging::{CARD_SORT_SAFELIST, Filters, Page};
use crate::validation::{
    ValidationErrors, validate_expiry_days, validate_id, validate_password_plaintext,
};
use chrono::Duration;
use reserva_crypto::CardSigningKey;

#[derive(Debug, Clone)]
pub struct IssueCard {
    pub account_id: i64,
    pub password: String,
    pub expiry_in_days: i64,
}

#[derive(Debug, Clone, Default)]
pub struct ListCards {
    /// Restrict to one account of the acting bank.
    pub account_id: Option<i64>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    pub sort: Option<String>,
}

/// Issue a card with a fresh number and signing key against one of the
/// bank's accounts.
pub async fn issue_card(state: &AppState, bank: &Bank, input: IssueCard) -> ServiceResult<Card> {
    let mut v = ValidationErrors::new();
    validate_id(&mut v, "account_id", input.account_id);
    validate_password_plaintext(&mut v, "password", &input.password);
    validate_expiry_days(&mut v, input.expiry_in_days);
    v.into_result()?;

    let password = hash_password(state, &input.password).await?.into_hash();
    let card = NewCard {
        account_id: input.account_id,
        signing_key: CardSigningKey::generate(),
        password,
        expiry: state.tokens.clock().now() + Duration::days(input.expiry_in_days),
    };
    let card = state.cards.issue(state.store.as_ref(), bank.id, &card).await?;
    tracing::info!(
        bank_id = bank.id,
        account_id = card.account_id,
        key = %card.signing_key.fingerprint(),
        "card issued"
    );
    Ok(card)
}

pub async fn get_card(state: &AppState, bank: &Bank, id: i64) -> ServiceResult<Card> {
    Ok(state.store.get_card(bank.id, id).await?)
}

pub async fn list_cards(
    state: &AppState,
    bank: &Bank,
    params: ListCards,
) -> ServiceResult<Page<Card>> {
    let mut v = ValidationErrors::new();
    if let Some(account_id) = params.account_id {
        validate_id(&mut v, "account_id", account_id);
    }
    let filters = match Filters::parse(
        params.page,
        params.page_size,
        params.sort.as_deref(),
        CARD_SORT_SAFELIST,
    ) {
        Ok(filters) => Some(filters),
        Err(errors) => {
            for (field, message) in errors.fields() {
                v.add(field, message);
            }
            None
        }
    };
    v.into_result()?;
    let filters = filters.unwrap_or_default();
    Ok(state
        .store
        .list_cards(bank.id, params.account_id, &filters)
        .await?)
}

/// Replace the card credential, conditioned on the version that was read.
pub async fn rotate_card_password(
    state: &AppState,
    bank: &Bank,
    id: i64,
    new_password: &str,
) -> ServiceResult<Card> {
    let mut v = ValidationErrors::new();
    validate_password_plaintext(&mut v, "password", new_password);
    v.into_result()?;

    let mut card = state.store.get_card(bank.id, id).await?;
    card.password = hash_password(state, new_password).await?.into_hash();
    let card = state.store.update_card(bank.id, &card).await?;
    tracing::info!(bank_id = bank.id, version = card.version, "card credential rotated");
    Ok(card)
}

pub async fn delete_card(state: &AppState, bank: &Bank, id: i64) -> ServiceResult<()> {
    state.store.delete_card(bank.id, id).await?;
    tracing::info!(bank_id = bank.id, "card deleted");
    Ok(())
}
