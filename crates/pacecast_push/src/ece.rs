/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! RFC 8291 message encryption framed as a single RFC 8188 `aes128gcm` record.

use aes_gcm::{aead::Aead, aead::KeyInit, Aes128Gcm, Nonce};
use hkdf::Hkdf;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::PublicKey;
use sha2::Sha256;

use crate::crypto::{decode_base64url, PushCrypto, SALT_LEN};
use crate::error::{PushError, Result};

pub const RECORD_SIZE: u32 = 4096;
pub const PUBLIC_KEY_LEN: usize = 65;
pub const AUTH_SECRET_LEN: usize = 16;
pub const TAG_LEN: usize = 16;
pub const HEADER_LEN: usize = SALT_LEN + 4 + 1 + PUBLIC_KEY_LEN;

const KEY_INFO: &[u8] = b"WebPush: info\0";
const CEK_INFO: &[u8] = b"Content-Encoding: aes128gcm\0";
const NONCE_INFO: &[u8] = b"Content-Encoding: nonce\0";
const PAD_DELIMITER: u8 = 0x02;

/// The user agent's half of a subscription, decoded and validated.
#[derive(Clone, Debug)]
pub struct SubscriberKeys {
    public_key: PublicKey,
    public_bytes: [u8; PUBLIC_KEY_LEN],
    auth: [u8; AUTH_SECRET_LEN],
}

impl SubscriberKeys {
    pub fn from_base64url(p256dh: &str, auth: &str) -> Result<Self> {
        let pub_bytes = decode_base64url(p256dh)?;
        let auth_bytes = decode_base64url(auth)?;
        Self::from_bytes(&pub_bytes, &auth_bytes)
    }

    pub fn from_bytes(p256dh: &[u8], auth: &[u8]) -> Result<Self> {
        let public_bytes: [u8; PUBLIC_KEY_LEN] = p256dh.try_into().map_err(|_| {
            PushError::InvalidKey(format!("p256dh must be {PUBLIC_KEY_LEN} bytes, got {}", p256dh.len()))
        })?;
        if public_bytes[0] != 0x04 {
            return Err(PushError::InvalidKey("p256dh is not an uncompressed point".into()));
        }
        let public_key = PublicKey::from_sec1_bytes(&public_bytes)
            .map_err(|_| PushError::InvalidKey("p256dh is not on P-256".into()))?;
        let auth: [u8; AUTH_SECRET_LEN] = auth.try_into().map_err(|_| {
            PushError::InvalidKey(format!("auth must be {AUTH_SECRET_LEN} bytes, got {}", auth.len()))
        })?;
        Ok(Self {
            public_key,
            public_bytes,
            auth,
        })
    }
}

/// Encrypt `plaintext` for one subscriber.
///
/// Output layout: `salt(16) | rs(u32 BE) | idlen(1) | keyid(65) | ciphertext+tag`.
pub fn encrypt(crypto: &dyn PushCrypto, keys: &SubscriberKeys, plaintext: &[u8]) -> Result<Vec<u8>> {
    if plaintext.len() + 1 + TAG_LEN > RECORD_SIZE as usize {
        return Err(PushError::Crypto(format!(
            "payload of {} bytes does not fit a single {RECORD_SIZE}-byte record",
            plaintext.len()
        )));
    }

    let ephemeral = crypto.ephemeral_key()?;
    let salt = crypto.salt()?;
    let as_public = ephemeral.public_key().to_encoded_point(false);
    let as_public = as_public.as_bytes();

    let shared = p256::ecdh::diffie_hellman(ephemeral.to_nonzero_scalar(), keys.public_key.as_affine());

    let mut key_info = Vec::with_capacity(KEY_INFO.len() + 2 * PUBLIC_KEY_LEN);
    key_info.extend_from_slice(KEY_INFO);
    key_info.extend_from_slice(&keys.public_bytes);
    key_info.extend_from_slice(as_public);
    let ikm: [u8; 32] = hkdf_sha256(&keys.auth, shared.raw_secret_bytes().as_slice(), &key_info)?;

    let cek: [u8; 16] = hkdf_sha256(&salt, &ikm, CEK_INFO)?;
    let nonce: [u8; 12] = hkdf_sha256(&salt, &ikm, NONCE_INFO)?;

    let mut padded = Vec::with_capacity(plaintext.len() + 1);
    padded.extend_from_slice(plaintext);
    padded.push(PAD_DELIMITER);

    let cipher = Aes128Gcm::new_from_slice(&cek).map_err(|e| PushError::Crypto(format!("aes key: {e}")))?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), padded.as_ref())
        .map_err(|e| PushError::Crypto(format!("aes-gcm encrypt: {e}")))?;

    let mut record = Vec::with_capacity(HEADER_LEN + ciphertext.len());
    record.extend_from_slice(&salt);
    record.extend_from_slice(&RECORD_SIZE.to_be_bytes());
    record.push(PUBLIC_KEY_LEN as u8);
    record.extend_from_slice(as_public);
    record.extend_from_slice(&ciphertext);
    Ok(record)
}

fn hkdf_sha256<const N: usize>(salt: &[u8], ikm: &[u8], info: &[u8]) -> Result<[u8; N]> {
    let hk = Hkdf::<Sha256>::new(Some(salt), ikm);
    let mut okm = [0u8; N];
    hk.expand(info, &mut okm)
        .map_err(|e| PushError::Crypto(format!("hkdf expand: {e}")))?;
    Ok(okm)
}
