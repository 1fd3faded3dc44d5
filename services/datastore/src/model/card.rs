use chrono::{DateTime, Utc};
use reserva_crypto::{CardSigningKey, PasswordHash};
use serde::Serialize;

/// A payment card. `id` is the externally visible card number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Card {
    pub id: i64,
    pub account_id: i64,
    #[serde(skip)]
    pub signing_key: CardSigningKey,
    #[serde(skip)]
    pub password: PasswordHash,
    pub expiry: DateTime<Utc>,
    pub version: i64,
}

/// Everything needed to persist a card except its number, which the issuer
/// picks per attempt.
#[derive(Debug, Clone)]
pub struct NewCard {
    pub account_id: i64,
    pub signing_key: CardSigningKey,
    pub password: PasswordHash,
    pub expiry: DateTime<Utc>,
}

impl NewCard {
    pub fn with_number(&self, number: i64) -> Card {
        Card {
            id: number,
            account_id: self.account_id,
            signing_key: self.signing_key.clone(),
            password: self.password.clone(),
            expiry: self.expiry,
            version: 1,
        }
    }
}
