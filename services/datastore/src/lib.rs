//! Reserva datastore library crate.
//!
//! # Purpose
//! The transactional data layer for banks, their accounts and the cards issued
//! against those accounts: versioned entity storage, card number allocation,
//! bearer-token authentication and the service operations built on top.
//!
//! # Notes
//! Every record is scoped to an owning bank. Store backends enforce that scope
//! in every filter; the service layer never trusts a caller-supplied owner.
pub mod app;
pub mod auth;
pub mod cards;
pub mod config;
pub mod model;
pub mod observability;
pub mod paging;
pub mod service;
pub mod store;
pub mod validation;

pub use app::AppState;
pub use auth::{Authenticated, Clock, SystemClock, TokenAuthenticator};
pub use model::{
    Account, AccountPatch, Bank, BankPatch, Card, IssuedToken, NewBank, NewCard, Token, TokenScope,
};
pub use paging::{Filters, Metadata, Page};
pub use service::ServiceError;
pub use store::{Store, StoreError, StoreResult};
