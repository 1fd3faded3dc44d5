//! In-memory implementation of the datastore.
//!
//! # Purpose
//! Implements every store trait with plain collections so the service layer
//! and its tests run without a database. The semantics match the Postgres
//! backend: versioned updates, case-insensitive unique emails, unique card
//! numbers, ownership filters and cascading deletes.
//!
//! # Durability and consistency
//! - **Not durable**: all state is lost on process restart.
//! - All tables sit behind one `tokio::sync::RwLock`, held only for the
//!   duration of a single operation. A version check and the write it guards
//!   happen under the same write guard, which is what makes them atomic here.
//! - There is no replica; reads observe the latest write.
use super::{
    AccountStore, BankStore, CardStore, Store, StoreError, StoreResult, TokenStore, edit_conflict,
};
use crate::model::{Account, Bank, Card, NewBank, Token, TokenScope};
use crate::paging::{Filters, Page};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reserva_crypto::TokenDigest;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Tables {
    banks: BTreeMap<i64, Bank>,
    accounts: BTreeMap<i64, Account>,
    cards: BTreeMap<i64, Card>,
    tokens: HashMap<TokenDigest, Token>,
    next_bank_id: i64,
    next_account_id: i64,
}

impl Tables {
    fn email_taken(&self, email: &str, except: Option<i64>) -> bool {
        self.banks
            .values()
            .any(|bank| Some(bank.id) != except && same_email(&bank.email, email))
    }

    fn owned_account(&self, bank_id: i64, account_id: i64) -> Option<&Account> {
        self.accounts
            .get(&account_id)
            .filter(|account| account.bank_id == bank_id)
    }

    fn owned_card(&self, bank_id: i64, card_id: i64) -> Option<&Card> {
        self.cards
            .get(&card_id)
            .filter(|card| self.owned_account(bank_id, card.account_id).is_some())
    }
}

/// Unicode lowercase comparison, matching `LOWER(email)` in Postgres.
fn same_email(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

/// Non-durable store for tests and local development.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Slice `rows` (already filtered to the caller's scope) into one page.
///
/// Matches the Postgres window-count behaviour: a page past the end reports a
/// total of zero.
fn paginate<T: Clone>(
    mut rows: Vec<T>,
    filters: &Filters,
    compare: impl Fn(&T, &T) -> Ordering,
) -> Page<T> {
    rows.sort_by(|a, b| {
        let ord = compare(a, b);
        if filters.sort.descending {
            ord.reverse()
        } else {
            ord
        }
    });
    let total = rows.len() as i64;
    let items: Vec<T> = rows
        .into_iter()
        .skip(filters.offset() as usize)
        .take(filters.limit() as usize)
        .collect();
    let total = if items.is_empty() { 0 } else { total };
    Page::new(items, total, filters)
}

#[async_trait]
impl BankStore for InMemoryStore {
    async fn insert_bank(&self, bank: &NewBank) -> StoreResult<Bank> {
        let mut tables = self.tables.write().await;
        if tables.email_taken(&bank.email, None) {
            return Err(StoreError::DuplicateEmail);
        }
        tables.next_bank_id += 1;
        let stored = Bank {
            id: tables.next_bank_id,
            created_at: Utc::now(),
            name: bank.name.clone(),
            email: bank.email.clone(),
            password: bank.password.hash().clone(),
            activated: false,
            frozen: false,
            balance_in_cents: 0,
            version: 1,
        };
        tables.banks.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn get_bank(&self, id: i64) -> StoreResult<Bank> {
        if id < 1 {
            return Err(StoreError::NotFound("bank"));
        }
        let tables = self.tables.read().await;
        tables.banks.get(&id).cloned().ok_or(StoreError::NotFound("bank"))
    }

    async fn get_bank_by_email(&self, email: &str) -> StoreResult<Bank> {
        let tables = self.tables.read().await;
        tables
            .banks
            .values()
            .find(|bank| same_email(&bank.email, email))
            .cloned()
            .ok_or(StoreError::NotFound("bank"))
    }

    async fn update_bank(&self, bank: &Bank) -> StoreResult<Bank> {
        let mut tables = self.tables.write().await;
        let current_version = match tables.banks.get(&bank.id) {
            Some(current) => current.version,
            None => return Err(edit_conflict("bank")),
        };
        if current_version != bank.version {
            return Err(edit_conflict("bank"));
        }
        if tables.email_taken(&bank.email, Some(bank.id)) {
            return Err(StoreError::DuplicateEmail);
        }
        let mut updated = bank.clone();
        updated.version += 1;
        tables.banks.insert(updated.id, updated.clone());
        Ok(updated)
    }

    async fn bank_for_token(
        &self,
        scope: TokenScope,
        hash: &TokenDigest,
        now: DateTime<Utc>,
    ) -> StoreResult<Bank> {
        let tables = self.tables.read().await;
        tables
            .tokens
            .get(hash)
            .filter(|token| token.scope == scope && token.expiry > now)
            .and_then(|token| tables.banks.get(&token.bank_id))
            .cloned()
            .ok_or(StoreError::NotFound("bank"))
    }
}

#[async_trait]
impl AccountStore for InMemoryStore {
    async fn insert_account(&self, bank_id: i64) -> StoreResult<Account> {
        let mut tables = self.tables.write().await;
        if !tables.banks.contains_key(&bank_id) {
            return Err(StoreError::NotFound("bank"));
        }
        tables.next_account_id += 1;
        let mut account = Account::opened_by(bank_id);
        account.id = tables.next_account_id;
        tables.accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn get_account(&self, bank_id: i64, id: i64) -> StoreResult<Account> {
        if id < 1 {
            return Err(StoreError::NotFound("account"));
        }
        let tables = self.tables.read().await;
        tables
            .owned_account(bank_id, id)
            .cloned()
            .ok_or(StoreError::NotFound("account"))
    }

    async fn update_account(&self, account: &Account) -> StoreResult<Account> {
        let mut tables = self.tables.write().await;
        let current_version = tables
            .owned_account(account.bank_id, account.id)
            .map(|current| current.version);
        if current_version != Some(account.version) {
            return Err(edit_conflict("account"));
        }
        let mut updated = account.clone();
        updated.version += 1;
        tables.accounts.insert(updated.id, updated.clone());
        Ok(updated)
    }

    async fn delete_account(&self, bank_id: i64, id: i64) -> StoreResult<()> {
        if id < 1 {
            return Err(StoreError::NotFound("account"));
        }
        let mut tables = self.tables.write().await;
        if tables.owned_account(bank_id, id).is_none() {
            return Err(StoreError::NotFound("account"));
        }
        tables.accounts.remove(&id);
        tables.cards.retain(|_, card| card.account_id != id);
        Ok(())
    }

    async fn list_accounts(&self, bank_id: i64, filters: &Filters) -> StoreResult<Page<Account>> {
        let tables = self.tables.read().await;
        let rows: Vec<Account> = tables
            .accounts
            .values()
            .filter(|account| account.bank_id == bank_id)
            .cloned()
            .collect();
        let column = filters.sort.column;
        Ok(paginate(rows, filters, |a, b| {
            let ord = match column {
                "balance_in_cents" => a.balance_in_cents.cmp(&b.balance_in_cents),
                "frozen" => a.frozen.cmp(&b.frozen),
                _ => Ordering::Equal,
            };
            // Ties on the sort column always fall back to ascending id.
            let tie = a.id.cmp(&b.id);
            if column == "id" {
                tie
            } else if filters.sort.descending {
                ord.then(tie.reverse())
            } else {
                ord.then(tie)
            }
        }))
    }
}

#[async_trait]
impl CardStore for InMemoryStore {
    async fn insert_card(&self, bank_id: i64, card: &Card) -> StoreResult<Card> {
        let mut tables = self.tables.write().await;
        if tables.owned_account(bank_id, card.account_id).is_none() {
            return Err(StoreError::NotFound("account"));
        }
        if tables.cards.contains_key(&card.id) {
            return Err(StoreError::DuplicateCardNumber);
        }
        let mut stored = card.clone();
        stored.version = 1;
        tables.cards.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn get_card(&self, bank_id: i64, id: i64) -> StoreResult<Card> {
        if id < 1 {
            return Err(StoreError::NotFound("card"));
        }
        let tables = self.tables.read().await;
        tables
            .owned_card(bank_id, id)
            .cloned()
            .ok_or(StoreError::NotFound("card"))
    }

    async fn update_card(&self, bank_id: i64, card: &Card) -> StoreResult<Card> {
        let mut tables = self.tables.write().await;
        let current_version = tables
            .owned_card(bank_id, card.id)
            .map(|current| current.version);
        if current_version != Some(card.version) {
            return Err(edit_conflict("card"));
        }
        let Some(current) = tables.cards.get_mut(&card.id) else {
            return Err(edit_conflict("card"));
        };
        current.password = card.password.clone();
        current.version += 1;
        Ok(current.clone())
    }

    async fn delete_card(&self, bank_id: i64, id: i64) -> StoreResult<()> {
        if id < 1 {
            return Err(StoreError::NotFound("card"));
        }
        let mut tables = self.tables.write().await;
        if tables.owned_card(bank_id, id).is_none() {
            return Err(StoreError::NotFound("card"));
        }
        tables.cards.remove(&id);
        Ok(())
    }

    async fn list_cards(
        &self,
        bank_id: i64,
        account_id: Option<i64>,
        filters: &Filters,
    ) -> StoreResult<Page<Card>> {
        let tables = self.tables.read().await;
        let rows: Vec<Card> = tables
            .cards
            .values()
            .filter(|card| account_id.is_none_or(|id| card.account_id == id))
            .filter(|card| tables.owned_account(bank_id, card.account_id).is_some())
            .cloned()
            .collect();
        let column = filters.sort.column;
        Ok(paginate(rows, filters, |a, b| {
            let tie = a.id.cmp(&b.id);
            match column {
                "expiry" if filters.sort.descending => a.expiry.cmp(&b.expiry).then(tie.reverse()),
                "expiry" => a.expiry.cmp(&b.expiry).then(tie),
                _ => tie,
            }
        }))
    }
}

#[async_trait]
impl TokenStore for InMemoryStore {
    async fn insert_token(&self, token: &Token) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if !tables.banks.contains_key(&token.bank_id) {
            return Err(StoreError::NotFound("bank"));
        }
        tables.tokens.insert(token.hash, token.clone());
        Ok(())
    }

    async fn delete_tokens_for_bank(&self, scope: TokenScope, bank_id: i64) -> StoreResult<u64> {
        let mut tables = self.tables.write().await;
        let before = tables.tokens.len();
        tables
            .tokens
            .retain(|_, token| !(token.bank_id == bank_id && token.scope == scope));
        Ok((before - tables.tokens.len()) as u64)
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }

    fn is_durable(&self) -> bool {
        false
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paging::ACCOUNT_SORT_SAFELIST;
    use reserva_crypto::{CardSigningKey, Password, PasswordHash};

    fn new_bank(email: &str) -> NewBank {
        NewBank {
            name: "Test Bank".to_string(),
            email: email.to_string(),
            password: Password::Stored(PasswordHash::from_phc("$argon2id$stub")),
        }
    }

    fn card(number: i64, account_id: i64) -> Card {
        Card {
            id: number,
            account_id,
            signing_key: CardSigningKey::generate(),
            password: PasswordHash::from_phc("$argon2id$stub"),
            expiry: Utc::now(),
            version: 1,
        }
    }

    #[tokio::test]
    async fn email_uniqueness_ignores_case() {
        let store = InMemoryStore::new();
        store.insert_bank(&new_bank("Ops@Example.com")).await.expect("insert");
        let err = store
            .insert_bank(&new_bank("ops@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateEmail));
        let found = store.get_bank_by_email("OPS@EXAMPLE.COM").await.expect("get");
        assert_eq!(found.id, 1);
    }

    #[tokio::test]
    async fn email_uniqueness_folds_non_ascii_letters() {
        let store = InMemoryStore::new();
        store.insert_bank(&new_bank("ÉLAN@example.com")).await.expect("insert");
        let err = store
            .insert_bank(&new_bank("élan@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateEmail));
        store.get_bank_by_email("Élan@Example.com").await.expect("get");
    }

    #[tokio::test]
    async fn update_bank_rejects_email_of_another_bank() {
        let store = InMemoryStore::new();
        store.insert_bank(&new_bank("a@example.com")).await.expect("a");
        let mut b = store.insert_bank(&new_bank("b@example.com")).await.expect("b");
        b.email = "A@example.com".to_string();
        let err = store.update_bank(&b).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateEmail));
        assert_eq!(store.get_bank(b.id).await.expect("get").version, 1);
    }

    #[tokio::test]
    async fn non_positive_ids_are_not_found() {
        let store = InMemoryStore::new();
        assert!(matches!(
            store.get_account(1, 0).await,
            Err(StoreError::NotFound("account"))
        ));
        assert!(matches!(
            store.delete_card(1, -5).await,
            Err(StoreError::NotFound("card"))
        ));
        assert!(matches!(store.get_bank(0).await, Err(StoreError::NotFound("bank"))));
    }

    #[tokio::test]
    async fn deleting_an_account_takes_its_cards() {
        let store = InMemoryStore::new();
        let bank = store.insert_bank(&new_bank("a@example.com")).await.expect("bank");
        let account = store.insert_account(bank.id).await.expect("account");
        store
            .insert_card(bank.id, &card(4000001234567899, account.id))
            .await
            .expect("card");
        store.delete_account(bank.id, account.id).await.expect("delete");
        assert!(matches!(
            store.get_card(bank.id, 4000001234567899).await,
            Err(StoreError::NotFound("card"))
        ));
    }

    #[tokio::test]
    async fn card_insert_checks_ownership_then_number() {
        let store = InMemoryStore::new();
        let a = store.insert_bank(&new_bank("a@example.com")).await.expect("a");
        let b = store.insert_bank(&new_bank("b@example.com")).await.expect("b");
        let account = store.insert_account(a.id).await.expect("account");

        let err = store
            .insert_card(b.id, &card(4000000000000002, account.id))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound("account")));

        store
            .insert_card(a.id, &card(4000000000000002, account.id))
            .await
            .expect("insert");
        let err = store
            .insert_card(a.id, &card(4000000000000002, account.id))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateCardNumber));
    }

    #[tokio::test]
    async fn accounts_sort_descending_with_id_tiebreak() {
        let store = InMemoryStore::new();
        let bank = store.insert_bank(&new_bank("a@example.com")).await.expect("bank");
        for balance in [50, 10, 50] {
            let mut account = store.insert_account(bank.id).await.expect("account");
            account.balance_in_cents = balance;
            store.update_account(&account).await.expect("update");
        }
        let filters = Filters::parse(None, None, Some("-balance_in_cents"), ACCOUNT_SORT_SAFELIST)
            .expect("filters");
        let page = store.list_accounts(bank.id, &filters).await.expect("list");
        let ids: Vec<i64> = page.items.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![1, 3, 2]);
    }

    #[tokio::test]
    async fn revoking_tokens_only_touches_one_scope() {
        let store = InMemoryStore::new();
        let bank = store.insert_bank(&new_bank("a@example.com")).await.expect("bank");
        let expiry = Utc::now() + chrono::Duration::hours(1);
        for (secret, scope) in [
            ("activation-secret", TokenScope::Activation),
            ("auth-secret", TokenScope::Authentication),
        ] {
            store
                .insert_token(&Token {
                    hash: TokenDigest::of(secret),
                    bank_id: bank.id,
                    expiry,
                    scope,
                })
                .await
                .expect("token");
        }
        let removed = store
            .delete_tokens_for_bank(TokenScope::Activation, bank.id)
            .await
            .expect("revoke");
        assert_eq!(removed, 1);
        store
            .bank_for_token(
                TokenScope::Authentication,
                &TokenDigest::of("auth-secret"),
                Utc::now(),
            )
            .await
            .expect("auth token survives");
    }
}
