//! Santa Shared Core
//!
//! Support layer shared by the daemon, GUI and sync service.
//! Everything here runs on untrusted input or on the authorization hot path:
//! - Sharded decision cache (per-bucket locks, flush on overflow)
//! - Bounded set cache built on the decision cache
//! - Bounded ring buffer for recent-event history
//! - Code-signing identifier validation and normalization
//! - NKey token-chain verification for push/sync credentials
//!
//! Logging goes through `tracing`; install a subscriber in the binary.

pub mod cache;
pub mod config;
pub mod error;
pub mod identifiers;
pub mod nkey;
pub mod ring_buffer;
pub mod set_cache;
pub mod token;

pub use cache::{CacheStats, SantaCache};
pub use config::{CacheConfig, CoreConfig, TokenTrustConfig};
pub use error::SantaError;
pub use identifiers::{
    is_valid_cdhash, is_valid_signing_id, is_valid_team_id, normalize_rule_identifier,
    split_signing_id, RuleType,
};
pub use ring_buffer::RingBuffer;
pub use set_cache::SantaSetCache;
pub use token::NKeyTokenValidator;

/// Santa core version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Result type for core operations
pub type Result<T> = std::result::Result<T, SantaError>;
