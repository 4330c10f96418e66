//! Error types for the Santa shared core

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SantaError {
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Malformed token: {0}")]
    MalformedToken(String),

    #[error("Invalid NKey: {0}")]
    InvalidNKey(String),

    #[error("Issuer is not a trusted operator key: {0}")]
    UntrustedIssuer(String),

    #[error("User issuer {user_issuer} does not match account subject {account_subject}")]
    IssuerMismatch {
        user_issuer: String,
        account_subject: String,
    },

    #[error("Unsupported signing algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Signature verification failed for {0} token")]
    SignatureVerificationFailed(&'static str),

    #[error("Token expired at {0}")]
    TokenExpired(i64),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for SantaError {
    fn from(e: serde_json::Error) -> Self {
        SantaError::SerializationError(e.to_string())
    }
}
