//! Domain types shared by the store backends and the service layer.
//!
//! Secret fields (password hashes, card signing keys) are carried in these
//! structs but never serialized.
mod account;
mod bank;
mod card;
mod token;

pub use account::{Account, AccountPatch};
pub use bank::{Bank, BankPatch, NewBank};
pub use card::{Card, NewCard};
pub use token::{IssuedToken, Token, TokenScope};
