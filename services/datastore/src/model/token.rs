use chrono::{DateTime, Utc};
use reserva_crypto::TokenDigest;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// What a token may be exchanged for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TokenScope {
    Activation,
    Authentication,
    PasswordReset,
}

impl TokenScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenScope::Activation => "activation",
            TokenScope::Authentication => "authentication",
            TokenScope::PasswordReset => "password-reset",
        }
    }
}

impl fmt::Display for TokenScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TokenScope {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "activation" => Ok(TokenScope::Activation),
            "authentication" => Ok(TokenScope::Authentication),
            "password-reset" => Ok(TokenScope::PasswordReset),
            other => Err(anyhow::anyhow!("unknown token scope: {other}")),
        }
    }
}

/// Persisted token record. Only the digest of the secret is kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub hash: TokenDigest,
    pub bank_id: i64,
    pub expiry: DateTime<Utc>,
    pub scope: TokenScope,
}

/// A token handed back to the caller exactly once, plaintext included.
#[derive(Clone, Serialize)]
pub struct IssuedToken {
    #[serde(rename = "token")]
    pub plaintext: String,
    pub expiry: DateTime<Utc>,
    #[serde(skip)]
    pub scope: TokenScope,
}

impl fmt::Debug for IssuedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedToken")
            .field("plaintext", &"<redacted>")
            .field("expiry", &self.expiry)
            .field("scope", &self.scope)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_names_round_trip() {
        for scope in [
            TokenScope::Activation,
            TokenScope::Authentication,
            TokenScope::PasswordReset,
        ] {
            assert_eq!(scope.as_str().parse::<TokenScope>().expect("scope"), scope);
        }
        assert!("admin".parse::<TokenScope>().is_err());
    }

    #[test]
    fn issued_token_serializes_plaintext_once_and_redacts_debug() {
        let issued = IssuedToken {
            plaintext: "abcdefghijklmnopqrstuv".to_string(),
            expiry: DateTime::<Utc>::from_timestamp(0, 0).expect("epoch"),
            scope: TokenScope::Authentication,
        };
        let json = serde_json::to_value(&issued).expect("json");
        assert_eq!(json["token"], "abcdefghijklmnopqrstuv");
        assert!(json.get("scope").is_none());
        assert!(!format!("{issued:?}").contains("abcdefghijklmnopqrstuv"));
    }
}
