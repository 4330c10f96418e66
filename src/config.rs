//! Core configuration
//!
//! Sizing for the decision cache and the operator-controlled root of trust
//! for token chains. Parsed from JSON; reading the file is the caller's job.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::cache::{DEFAULT_MAX_SIZE, DEFAULT_PER_BUCKET};
use crate::{nkey, Result, SantaError};

/// Decision cache sizing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Entry cap; reaching it flushes the cache
    pub max_size: u64,

    /// Target entries per bucket at capacity
    pub per_bucket: u8,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE,
            per_bucket: DEFAULT_PER_BUCKET,
        }
    }
}

/// Trusted roots for push/sync credential chains
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenTrustConfig {
    /// NKey public keys allowed to issue account tokens
    pub trusted_operator_keys: BTreeSet<String>,
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub decision_cache: CacheConfig,
    pub trust: TokenTrustConfig,
}

impl CoreConfig {
    /// Parse from a JSON string
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Parse from raw JSON bytes
    pub fn from_json_slice(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }

    /// Reject trusted keys that aren't well-formed NKey public keys
    pub fn validate(&self) -> Result<()> {
        for key in &self.trust.trusted_operator_keys {
            nkey::decode_public_key(key).map_err(|e| {
                SantaError::Config(format!("trusted operator key {key:?}: {e}"))
            })?;
        }
        Ok(())
    }
}
