/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Sources of randomness and time for the push pipeline.
//!
//! Everything else in the encryption path is deterministic, so swapping these
//! out is enough to reproduce RFC 8291 vectors byte for byte.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD as BASE64URL, Engine as _};
use p256::SecretKey;
use rand::RngCore as _;

use crate::error::{PushError, Result};

pub const SALT_LEN: usize = 16;

pub trait PushCrypto: Send + Sync {
    /// A fresh P-256 key for one message. Never reused.
    fn ephemeral_key(&self) -> Result<SecretKey>;
    /// A fresh random salt for one message.
    fn salt(&self) -> Result<[u8; SALT_LEN]>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct OsCrypto;

impl PushCrypto for OsCrypto {
    fn ephemeral_key(&self) -> Result<SecretKey> {
        Ok(SecretKey::random(&mut rand::rngs::OsRng))
    }

    fn salt(&self) -> Result<[u8; SALT_LEN]> {
        let mut salt = [0u8; SALT_LEN];
        rand::rngs::OsRng
            .try_fill_bytes(&mut salt)
            .map_err(|e| PushError::Crypto(format!("salt generation: {e}")))?;
        Ok(salt)
    }
}

pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;

    fn now_secs(&self) -> i64 {
        self.now_ms().div_euclid(1000)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64
    }
}

/// Decode browser-supplied base64url, tolerating `=` padding.
pub fn decode_base64url(value: &str) -> Result<Vec<u8>> {
    BASE64URL
        .decode(value.trim().trim_end_matches('='))
        .map_err(|e| PushError::InvalidKey(format!("base64url: {e}")))
}
