use super::{Authenticated, Clock, SystemClock};
use crate::model::{Bank, IssuedToken, Token, TokenScope};
use crate::store::{BankStore, StoreError, StoreResult, TokenStore};
use chrono::Duration;
use reserva_crypto::{TOKEN_PLAINTEXT_LEN, TokenDigest, TokenSecret};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid or missing authentication token")]
    InvalidAuthenticationToken,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Issues, resolves and revokes scoped bearer tokens.
#[derive(Clone)]
pub struct TokenAuthenticator {
    clock: Arc<dyn Clock>,
}

impl Default for TokenAuthenticator {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl TokenAuthenticator {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Create a token for `bank_id` valid for `ttl` and persist its digest.
    pub async fn generate<S>(
        &self,
        store: &S,
        bank_id: i64,
        ttl: Duration,
        scope: TokenScope,
    ) -> StoreResult<IssuedToken>
    where
        S: TokenStore + ?Sized,
    {
        let secret = TokenSecret::generate();
        let expiry = self.clock.now() + ttl;
        store
            .insert_token(&Token {
                hash: secret.digest(),
                bank_id,
                expiry,
                scope,
            })
            .await?;
        metrics::counter!("reserva_tokens_issued_total", "scope" => scope.as_str()).increment(1);
        tracing::info!(bank_id, scope = %scope, %expiry, "token issued");
        Ok(IssuedToken {
            plaintext: secret.into_plaintext(),
            expiry,
            scope,
        })
    }

    /// Find the bank owning an unexpired `scope` token with this plaintext.
    ///
    /// # Errors
    /// - [`StoreError::NotFound`] for unknown, expired or wrong-scope tokens.
    pub async fn resolve<S>(
        &self,
        store: &S,
        scope: TokenScope,
        plaintext: &str,
    ) -> StoreResult<Bank>
    where
        S: BankStore + ?Sized,
    {
        let digest = TokenDigest::of(plaintext);
        store.bank_for_token(scope, &digest, self.clock.now()).await
    }

    /// Resolve the caller from an optional `Authorization` header value.
    pub async fn authenticate<S>(
        &self,
        store: &S,
        authorization: Option<&str>,
    ) -> Result<Authenticated, AuthError>
    where
        S: BankStore + ?Sized,
    {
        let Some(header) = authorization else {
            return Ok(Authenticated::Anonymous);
        };
        let mut parts = header.split_whitespace();
        let token = match (parts.next(), parts.next(), parts.next()) {
            (Some("Bearer"), Some(token), None) => token,
            _ => return Err(AuthError::InvalidAuthenticationToken),
        };
        if token.len() != TOKEN_PLAINTEXT_LEN {
            return Err(AuthError::InvalidAuthenticationToken);
        }
        match self.resolve(store, TokenScope::Authentication, token).await {
            Ok(bank) => Ok(Authenticated::Bank(bank)),
            Err(StoreError::NotFound(_)) => Err(AuthError::InvalidAuthenticationToken),
            Err(err) => Err(AuthError::Store(err)),
        }
    }

    /// Delete every `scope` token of `bank_id`.
    pub async fn revoke<S>(&self, store: &S, scope: TokenScope, bank_id: i64) -> StoreResult<u64>
    where
        S: TokenStore + ?Sized,
    {
        let removed = store.delete_tokens_for_bank(scope, bank_id).await?;
        tracing::debug!(bank_id, scope = %scope, removed, "tokens revoked");
        Ok(removed)
    }
}
