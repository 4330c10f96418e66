//! NKey public-key codec
//!
//! NKeys are Ed25519 public keys in a self-checking text form:
//! `base32(prefix || key || crc16_le)` without padding, where `prefix`
//! names the key's role and the CRC16/XMODEM checksum covers the first
//! 33 bytes.

use data_encoding::BASE32_NOPAD;

use crate::{Result, SantaError};

/// Decoded length: 1-byte prefix, 32-byte key, 2-byte checksum
pub const DECODED_LEN: usize = 35;

/// Ed25519 public key length
pub const PUBLIC_KEY_LEN: usize = 32;

const CHECKSUMMED_LEN: usize = 1 + PUBLIC_KEY_LEN;

/// Role encoded in the leading prefix byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyRole {
    Operator,
    Account,
    User,
    Server,
    Cluster,
}

impl KeyRole {
    pub const fn prefix_byte(self) -> u8 {
        match self {
            KeyRole::Operator => 14 << 3,
            KeyRole::Account => 0,
            KeyRole::User => 20 << 3,
            KeyRole::Server => 13 << 3,
            KeyRole::Cluster => 2 << 3,
        }
    }

    pub fn from_prefix_byte(byte: u8) -> Option<Self> {
        [
            KeyRole::Operator,
            KeyRole::Account,
            KeyRole::User,
            KeyRole::Server,
            KeyRole::Cluster,
        ]
        .into_iter()
        .find(|role| role.prefix_byte() == byte)
    }
}

/// A decoded NKey public key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicNKey {
    /// `None` when the prefix byte isn't a known role
    pub role: Option<KeyRole>,
    pub key: [u8; PUBLIC_KEY_LEN],
}

/// CRC16/XMODEM (poly 0x1021, init 0)
fn crc16(data: &[u8]) -> u16 {
    data.iter().fold(0u16, |crc, &byte| {
        let mut crc = crc ^ (u16::from(byte) << 8);
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
        }
        crc
    })
}

/// Decode and checksum-verify an NKey public key string
pub fn decode_public_key(encoded: &str) -> Result<PublicNKey> {
    let raw = BASE32_NOPAD
        .decode(encoded.as_bytes())
        .map_err(|e| SantaError::InvalidNKey(format!("base32 decode failed: {e}")))?;

    if raw.len() != DECODED_LEN {
        return Err(SantaError::InvalidNKey(format!(
            "decoded to {} bytes, expected {DECODED_LEN}",
            raw.len()
        )));
    }

    let (body, trailer) = raw.split_at(CHECKSUMMED_LEN);
    let expected = u16::from_le_bytes([trailer[0], trailer[1]]);
    if crc16(body) != expected {
        return Err(SantaError::InvalidNKey("checksum mismatch".to_string()));
    }

    let mut key = [0u8; PUBLIC_KEY_LEN];
    key.copy_from_slice(&body[1..]);

    Ok(PublicNKey {
        role: KeyRole::from_prefix_byte(body[0]),
        key,
    })
}

/// Encode a raw Ed25519 public key as an NKey string
pub fn encode_public_key(role: KeyRole, key: &[u8; PUBLIC_KEY_LEN]) -> String {
    let mut raw = Vec::with_capacity(DECODED_LEN);
    raw.push(role.prefix_byte());
    raw.extend_from_slice(key);
    let checksum = crc16(&raw);
    raw.extend_from_slice(&checksum.to_le_bytes());
    BASE32_NOPAD.encode(&raw)
}
