//! Code-signing identifier validation and normalization
//!
//! Every identifier that becomes a cache key or a persisted rule identifier
//! passes through here first. Validation is total: an identifier is either
//! accepted and normalized, or rejected.
//!
//! Normalization:
//! - Hash identifiers (binary, certificate, CDHash) are lowercase hex
//! - Team IDs are uppercase, except the `platform` sentinel
//! - Signing ID tails are kept verbatim

use data_encoding::HEXLOWER;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{Result, SantaError};

/// Length of a Team ID
pub const TEAM_ID_LEN: usize = 10;

/// Length of a raw code-directory hash
pub const CDHASH_LEN: usize = 20;

/// Length of a hex-encoded SHA-256 identifier
pub const SHA256_HEX_LEN: usize = 64;

/// Team ID sentinel for platform binaries
pub const PLATFORM_TEAM_ID: &str = "platform";

/// Kind of object a rule identifier names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleType {
    Binary,
    Certificate,
    #[serde(rename = "SIGNINGID")]
    SigningId,
    #[serde(rename = "TEAMID")]
    TeamId,
    #[serde(rename = "CDHASH")]
    CdHash,
}

impl std::fmt::Display for RuleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleType::Binary => write!(f, "binary"),
            RuleType::Certificate => write!(f, "certificate"),
            RuleType::SigningId => write!(f, "signing_id"),
            RuleType::TeamId => write!(f, "team_id"),
            RuleType::CdHash => write!(f, "cdhash"),
        }
    }
}

fn is_hex_of_len(s: &str, len: usize) -> bool {
    s.len() == len && s.bytes().all(|b| b.is_ascii_hexdigit())
}

fn is_platform(s: &str) -> bool {
    s.eq_ignore_ascii_case(PLATFORM_TEAM_ID)
}

/// Exactly 10 ASCII alphanumeric characters
pub fn is_valid_team_id(tid: &str) -> bool {
    tid.len() == TEAM_ID_LEN && tid.bytes().all(|b| b.is_ascii_alphanumeric())
}

/// `TeamID:rest` or `platform:rest`, split on the first colon, with a
/// non-empty tail
pub fn is_valid_signing_id(sid: &str) -> bool {
    split_signing_id(sid).is_some()
}

/// Hex string of `2 * CDHASH_LEN` characters
pub fn is_valid_cdhash(cdhash: &str) -> bool {
    is_hex_of_len(cdhash, CDHASH_LEN * 2)
}

/// Split a signing ID into its normalized Team ID and signing ID parts.
///
/// Only the first colon delimits; the tail may contain more colons.
/// Returns `None` if either part is invalid.
pub fn split_signing_id(sid: &str) -> Option<(String, String)> {
    let (team, rest) = sid.split_once(':')?;
    if rest.is_empty() {
        return None;
    }
    let team = normalize_team_id(team)?;
    Some((team, rest.to_string()))
}

/// Uppercase a valid Team ID. `platform` (any case) becomes lowercase.
pub fn normalize_team_id(tid: &str) -> Option<String> {
    if is_platform(tid) {
        Some(PLATFORM_TEAM_ID.to_string())
    } else if is_valid_team_id(tid) {
        Some(tid.to_ascii_uppercase())
    } else {
        None
    }
}

/// Normalize the Team ID half of a signing ID
pub fn normalize_signing_id(sid: &str) -> Option<String> {
    split_signing_id(sid).map(|(team, rest)| format!("{team}:{rest}"))
}

/// Lowercase a valid CDHash
pub fn normalize_cdhash(cdhash: &str) -> Option<String> {
    is_valid_cdhash(cdhash).then(|| cdhash.to_ascii_lowercase())
}

/// Lowercase a valid SHA-256 hex identifier
pub fn normalize_hash(hash: &str) -> Option<String> {
    is_hex_of_len(hash, SHA256_HEX_LEN).then(|| hash.to_ascii_lowercase())
}

/// Validate and normalize a rule identifier for its rule type
pub fn normalize_rule_identifier(rule_type: RuleType, identifier: &str) -> Result<String> {
    let normalized = match rule_type {
        RuleType::Binary | RuleType::Certificate => normalize_hash(identifier),
        RuleType::CdHash => normalize_cdhash(identifier),
        RuleType::TeamId => {
            // The platform sentinel only exists inside signing IDs
            if is_platform(identifier) {
                None
            } else {
                normalize_team_id(identifier)
            }
        }
        RuleType::SigningId => normalize_signing_id(identifier),
    };

    normalized.ok_or_else(|| {
        SantaError::InvalidIdentifier(format!("{identifier:?} is not a valid {rule_type} identifier"))
    })
}

/// SHA-256 identifier for binary or certificate contents, in the form
/// `normalize_rule_identifier` produces for `Binary` and `Certificate` rules
pub fn sha256_identifier(data: &[u8]) -> String {
    HEXLOWER.encode(&Sha256::digest(data))
}
