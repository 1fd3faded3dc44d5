use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid hashing cost: {0}")]
    InvalidCost(String),
    #[error("password hashing failed: {0}")]
    Hash(String),
    #[error("malformed password hash: {0}")]
    MalformedHash(String),
    #[error("invalid {label} length: expected {expected} bytes, got {actual}")]
    InvalidLength {
        label: &'static str,
        expected: usize,
        actual: usize,
    },
}

pub type CryptoResult<T> = Result<T, CryptoError>;
