use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Account {
    pub id: i64,
    pub bank_id: i64,
    pub balance_in_cents: i64,
    pub frozen: bool,
    pub version: i64,
}

impl Account {
    /// A freshly opened account before the store assigns its id.
    pub fn opened_by(bank_id: i64) -> Self {
        Self {
            id: 0,
            bank_id,
            balance_in_cents: 0,
            frozen: false,
            version: 1,
        }
    }

    pub fn apply(&mut self, patch: &AccountPatch) {
        if let Some(balance) = patch.balance_in_cents {
            self.balance_in_cents = balance;
        }
        if let Some(frozen) = patch.frozen {
            self.frozen = frozen;
        }
    }
}

/// Point mutation of a single account. `None` leaves the field as is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountPatch {
    pub balance_in_cents: Option<i64>,
    pub frozen: Option<bool>,
}
