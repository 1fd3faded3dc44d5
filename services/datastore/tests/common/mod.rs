#![allow(dead_code)]

use chrono::Utc;
use datastore::AppState;
use datastore::auth::{Authenticated, ManualClock};
use datastore::cards::{CardNumberGenerator, RandomCardNumbers};
use datastore::model::Bank;
use datastore::service::{banks, tokens};
use datastore::store::memory::InMemoryStore;
use reserva_crypto::CredentialHasher;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Hands out a fixed list of numbers, then repeats `fallback` forever.
pub struct ScriptedNumbers {
    queue: Mutex<VecDeque<i64>>,
    fallback: i64,
    draws: Arc<AtomicUsize>,
}

impl ScriptedNumbers {
    pub fn new(script: &[i64], fallback: i64) -> (Self, Arc<AtomicUsize>) {
        let draws = Arc::new(AtomicUsize::new(0));
        (
            Self {
                queue: Mutex::new(script.iter().copied().collect()),
                fallback,
                draws: draws.clone(),
            },
            draws,
        )
    }
}

impl CardNumberGenerator for ScriptedNumbers {
    fn next_number(&self) -> i64 {
        self.draws.fetch_add(1, Ordering::SeqCst);
        self.queue
            .lock()
            .expect("script lock")
            .pop_front()
            .unwrap_or(self.fallback)
    }
}

pub fn cheap_hasher() -> CredentialHasher {
    CredentialHasher::with_cost(1024, 1, 1).expect("cost")
}

pub struct Harness {
    pub state: AppState,
    pub store: Arc<InMemoryStore>,
    pub clock: Arc<ManualClock>,
}

pub fn harness_with_numbers(numbers: Box<dyn CardNumberGenerator>) -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let clock = Arc::new(ManualClock::starting_at(Utc::now()));
    let state = AppState::with_parts(store.clone(), cheap_hasher(), clock.clone(), numbers);
    Harness {
        state,
        store,
        clock,
    }
}

pub fn harness() -> Harness {
    harness_with_numbers(Box::new(RandomCardNumbers::default()))
}

/// Register, activate and log in a bank; returns it as an authenticated caller.
pub async fn activated_bank(state: &AppState, email: &str) -> (Bank, Authenticated) {
    let registration = banks::register_bank(
        state,
        banks::RegisterBank {
            name: "Harness Bank".to_string(),
            email: email.to_string(),
            password: "correct horse battery".to_string(),
        },
    )
    .await
    .expect("register");
    banks::activate_bank(state, &registration.activation_token.plaintext)
        .await
        .expect("activate");
    let token = tokens::create_authentication_token(state, email, "correct horse battery")
        .await
        .expect("login");
    let caller = tokens::authenticate(state, Some(&format!("Bearer {}", token.plaintext)))
        .await
        .expect("authenticate");
    let bank = tokens::require_activated_bank(&caller)
        .expect("activated")
        .clone();
    (bank, caller)
}
