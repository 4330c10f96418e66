//! NKey Token Chain Validation
//!
//! Verifies a delegated trust chain before any push/sync credential is
//! accepted:
//!
//! ```text
//! trusted operator key --signs--> account JWT --signs--> user JWT
//! ```
//!
//! Security properties:
//! - The account issuer must be one of the configured operator keys
//! - The user issuer must equal the account subject
//! - Both Ed25519 signatures must verify over the exact `header.payload` bytes
//! - Neither token may be expired (`exp` of 0 or absent never expires)
//!
//! Any failed check rejects the whole chain. Failures are logged with their
//! reason; `validate` only reports a boolean.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::Utc;
use ring::signature::{self, UnparsedPublicKey};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::{debug, warn};

use crate::config::TokenTrustConfig;
use crate::nkey::{self, PUBLIC_KEY_LEN};
use crate::{Result, SantaError};

/// Header algorithms that name an Ed25519 NKey signature
const SUPPORTED_ALGORITHMS: [&str; 2] = ["ed25519-nkey", "ed25519"];

/// Ed25519 signature length
const SIGNATURE_LEN: usize = 64;

/// JWT header
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Header {
    #[serde(default)]
    pub typ: Option<String>,
    pub alg: String,
}

/// Claims used for chain validation. Other claims are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Claims {
    #[serde(default)]
    pub iss: String,

    #[serde(default)]
    pub sub: String,

    /// Expiry as Unix seconds
    #[serde(default)]
    pub exp: Option<i64>,

    #[serde(default)]
    pub iat: Option<i64>,

    #[serde(default)]
    pub name: Option<String>,
}

/// A token split into its parts, not yet verified
struct DecodedToken<'a> {
    kind: &'static str,
    header_segment: &'a str,
    signing_input: &'a str,
    signature_segment: &'a str,
    claims: Claims,
}

/// Decode a base64url segment: pad to a multiple of 4, map the URL-safe
/// alphabet back to the standard one, then decode.
fn decode_segment(segment: &str) -> Option<Vec<u8>> {
    let mut standard: String = segment
        .chars()
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            c => c,
        })
        .collect();
    while standard.len() % 4 != 0 {
        standard.push('=');
    }
    BASE64.decode(standard).ok()
}

/// Decode a segment that must hold a JSON object
fn decode_json_object(kind: &str, part: &str, segment: &str) -> Result<Value> {
    let bytes = decode_segment(segment)
        .ok_or_else(|| SantaError::MalformedToken(format!("{kind} {part} is not valid base64url")))?;
    let value: Value = serde_json::from_slice(&bytes)
        .map_err(|e| SantaError::MalformedToken(format!("{kind} {part} is not JSON: {e}")))?;
    if !value.is_object() {
        return Err(SantaError::MalformedToken(format!(
            "{kind} {part} is not a JSON object"
        )));
    }
    Ok(value)
}

fn decode_token<'a>(kind: &'static str, token: &'a str) -> Result<DecodedToken<'a>> {
    let parts: Vec<&str> = token.split('.').collect();
    let &[header_segment, payload_segment, signature_segment] = parts.as_slice() else {
        return Err(SantaError::MalformedToken(format!(
            "{kind} token has {} segments, expected 3",
            parts.len()
        )));
    };

    let payload = decode_json_object(kind, "payload", payload_segment)?;
    let claims: Claims = serde_json::from_value(payload)
        .map_err(|e| SantaError::MalformedToken(format!("{kind} claims: {e}")))?;

    if claims.iss.is_empty() {
        return Err(SantaError::MalformedToken(format!("{kind} token has no issuer")));
    }
    if claims.sub.is_empty() {
        return Err(SantaError::MalformedToken(format!("{kind} token has no subject")));
    }

    let signing_input = &token[..header_segment.len() + 1 + payload_segment.len()];

    Ok(DecodedToken {
        kind,
        header_segment,
        signing_input,
        signature_segment,
        claims,
    })
}

impl DecodedToken<'_> {
    /// Verify the signature over the original `header.payload` bytes
    fn verify(&self, public_key: &[u8; PUBLIC_KEY_LEN]) -> Result<()> {
        let header: Header =
            serde_json::from_value(decode_json_object(self.kind, "header", self.header_segment)?)
                .map_err(|e| SantaError::MalformedToken(format!("{} header: {e}", self.kind)))?;
        if !SUPPORTED_ALGORITHMS.contains(&header.alg.as_str()) {
            return Err(SantaError::UnsupportedAlgorithm(header.alg));
        }

        let sig_bytes = decode_segment(self.signature_segment)
            .filter(|sig| sig.len() == SIGNATURE_LEN)
            .ok_or_else(|| {
                SantaError::MalformedToken(format!(
                    "{} signature must decode to {SIGNATURE_LEN} bytes",
                    self.kind
                ))
            })?;

        UnparsedPublicKey::new(&signature::ED25519, public_key)
            .verify(self.signing_input.as_bytes(), &sig_bytes)
            .map_err(|_| SantaError::SignatureVerificationFailed(self.kind))
    }

    fn check_expiry(&self, now: i64) -> Result<()> {
        match self.claims.exp {
            Some(exp) if exp != 0 && now > exp => Err(SantaError::TokenExpired(exp)),
            _ => Ok(()),
        }
    }
}

/// Validator for one account/user token pair
#[derive(Debug, Clone)]
pub struct NKeyTokenValidator {
    trusted_keys: BTreeSet<String>,
    account_jwt: String,
    user_jwt: String,
}

impl NKeyTokenValidator {
    pub fn new<I, S>(trusted_keys: I, account_jwt: impl Into<String>, user_jwt: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            trusted_keys: trusted_keys.into_iter().map(Into::into).collect(),
            account_jwt: account_jwt.into(),
            user_jwt: user_jwt.into(),
        }
    }

    /// Create a validator trusting the configured operator keys
    pub fn from_config(
        config: &TokenTrustConfig,
        account_jwt: impl Into<String>,
        user_jwt: impl Into<String>,
    ) -> Self {
        Self::new(config.trusted_operator_keys.iter().cloned(), account_jwt, user_jwt)
    }

    /// Validate the chain against the current time
    pub fn validate(&self) -> bool {
        self.validate_at(Utc::now().timestamp())
    }

    /// Validate the chain as of `now` (Unix seconds)
    pub fn validate_at(&self, now: i64) -> bool {
        match self.check_at(now) {
            Ok(()) => {
                debug!("token chain validated");
                true
            }
            Err(e) => {
                warn!(error = %e, "token chain rejected");
                false
            }
        }
    }

    /// Like [`validate`](Self::validate), but reports why the chain failed
    pub fn check(&self) -> Result<()> {
        self.check_at(Utc::now().timestamp())
    }

    pub fn check_at(&self, now: i64) -> Result<()> {
        if self.account_jwt.is_empty() || self.user_jwt.is_empty() {
            return Err(SantaError::MalformedToken("missing account or user token".to_string()));
        }

        // Operator -> account
        let account = decode_token("account", &self.account_jwt)?;
        if !self.trusted_keys.contains(&account.claims.iss) {
            return Err(SantaError::UntrustedIssuer(account.claims.iss.clone()));
        }
        let operator_key = nkey::decode_public_key(&account.claims.iss)?;
        account.verify(&operator_key.key)?;
        account.check_expiry(now)?;

        let account_key = nkey::decode_public_key(&account.claims.sub)?;

        // Account -> user
        let user = decode_token("user", &self.user_jwt)?;
        if user.claims.iss != account.claims.sub {
            return Err(SantaError::IssuerMismatch {
                user_issuer: user.claims.iss.clone(),
                account_subject: account.claims.sub.clone(),
            });
        }
        user.verify(&account_key.key)?;
        user.check_expiry(now)?;

        Ok(())
    }
}
