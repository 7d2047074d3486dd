/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! VAPID (RFC 8292) application server identity and JWT signing.

use anyhow::{Context, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD as BASE64URL, Engine as _};
use p256::ecdsa::{signature::Signer as _, Signature, SigningKey};
use serde::{Deserialize, Serialize};

use crate::crypto::decode_base64url;
use crate::error::PushError;

/// Lifetime of a signed token. RFC 8292 caps it at 24h; push services
/// commonly reject anything longer than 12h.
pub const VAPID_TOKEN_TTL_SECS: i64 = 43_200;

const JWT_HEADER: &str = r#"{"typ":"JWT","alg":"ES256"}"#;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct VapidClaims {
    pub aud: String,
    pub exp: i64,
    pub sub: String,
}

/// Process-wide push credentials: a P-256 key pair plus a contact URI.
///
/// Keys use the raw encodings browsers expect for `applicationServerKey`:
/// the 65-byte uncompressed point and the 32-byte private scalar, both
/// base64url without padding.
#[derive(Clone)]
pub struct VapidCredentials {
    signing_key: SigningKey,
    public_key_b64: String,
    subject: String,
}

impl std::fmt::Debug for VapidCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VapidCredentials")
            .field("public_key", &self.public_key_b64)
            .field("subject", &self.subject)
            .finish_non_exhaustive()
    }
}

impl VapidCredentials {
    pub fn generate(subject: impl Into<String>) -> Self {
        let signing_key = SigningKey::random(&mut rand::rngs::OsRng);
        let public_key_b64 = encode_public(&signing_key);
        Self {
            signing_key,
            public_key_b64,
            subject: subject.into(),
        }
    }

    /// Load configured credentials, checking that both halves belong together.
    pub fn from_base64url(public_key_b64: &str, private_key_b64: &str, subject: &str) -> Result<Self> {
        let pub_bytes = decode_base64url(public_key_b64).context("invalid base64url for VAPID public key")?;
        anyhow::ensure!(
            pub_bytes.len() == 65 && pub_bytes[0] == 0x04,
            "VAPID public key must be a 65-byte uncompressed P-256 point"
        );

        let priv_bytes = decode_base64url(private_key_b64).context("invalid base64url for VAPID private key")?;
        anyhow::ensure!(
            priv_bytes.len() == 32,
            "VAPID private key must be a 32-byte P-256 scalar, got {} bytes",
            priv_bytes.len()
        );
        let signing_key = SigningKey::from_slice(&priv_bytes).context("VAPID private key is not a valid P-256 scalar")?;

        let derived = encode_public(&signing_key);
        anyhow::ensure!(
            derived == BASE64URL.encode(&pub_bytes),
            "VAPID public key does not match the private key"
        );

        let subject = subject.trim();
        anyhow::ensure!(!subject.is_empty(), "VAPID subject is empty");

        Ok(Self {
            signing_key,
            public_key_b64: derived,
            subject: subject.to_string(),
        })
    }

    pub fn public_key_base64url(&self) -> &str {
        &self.public_key_b64
    }

    pub fn private_key_base64url(&self) -> String {
        BASE64URL.encode(self.signing_key.to_bytes())
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Sign a compact ES256 JWT for `audience`, valid until `now + 12h`.
    pub fn sign_jwt(&self, audience: &str, now_secs: i64) -> String {
        let claims = VapidClaims {
            aud: audience.to_string(),
            exp: now_secs + VAPID_TOKEN_TTL_SECS,
            sub: self.subject.clone(),
        };
        // A struct of three strings/ints always serializes.
        let claims_json = serde_json::to_vec(&claims).unwrap_or_default();
        let signing_input = format!(
            "{}.{}",
            BASE64URL.encode(JWT_HEADER),
            BASE64URL.encode(claims_json)
        );
        let signature: Signature = self.signing_key.sign(signing_input.as_bytes());
        format!("{signing_input}.{}", BASE64URL.encode(signature.to_bytes()))
    }

    /// `Authorization` header value for a push to `endpoint`.
    pub fn authorization(&self, endpoint: &str, now_secs: i64) -> Result<String, PushError> {
        let aud = audience(endpoint)?;
        Ok(format!(
            "vapid t={},k={}",
            self.sign_jwt(&aud, now_secs),
            self.public_key_b64
        ))
    }
}

/// `scheme://host[:port]` of a push endpoint.
pub fn audience(endpoint: &str) -> Result<String, PushError> {
    let url = url::Url::parse(endpoint).map_err(|e| PushError::InvalidEndpoint(format!("{endpoint}: {e}")))?;
    match url.scheme() {
        "https" | "http" => {}
        other => return Err(PushError::InvalidEndpoint(format!("unsupported scheme {other}"))),
    }
    let origin = url.origin();
    if !origin.is_tuple() {
        return Err(PushError::InvalidEndpoint(format!("{endpoint}: no origin")));
    }
    Ok(origin.ascii_serialization())
}

fn encode_public(signing_key: &SigningKey) -> String {
    let point = signing_key.verifying_key().to_encoded_point(false);
    BASE64URL.encode(point.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use p256::ecdsa::{signature::Verifier as _, VerifyingKey};

    #[test]
    fn generated_keys_reload() {
        let keys = VapidCredentials::generate("mailto:ops@example.com");
        let pub_bytes = decode_base64url(keys.public_key_base64url()).unwrap();
        assert_eq!(pub_bytes.len(), 65);
        assert_eq!(pub_bytes[0], 0x04);
        assert_eq!(decode_base64url(&keys.private_key_base64url()).unwrap().len(), 32);

        let reloaded = VapidCredentials::from_base64url(
            keys.public_key_base64url(),
            &keys.private_key_base64url(),
            "mailto:ops@example.com",
        )
        .unwrap();
        assert_eq!(reloaded.public_key_base64url(), keys.public_key_base64url());
    }

    #[test]
    fn rejects_mismatched_or_malformed_keys() {
        let a = VapidCredentials::generate("mailto:a@example.com");
        let b = VapidCredentials::generate("mailto:b@example.com");
        assert!(VapidCredentials::from_base64url(a.public_key_base64url(), &b.private_key_base64url(), "mailto:x").is_err());
        assert!(VapidCredentials::from_base64url("not-valid-key", "also-bad", "mailto:x").is_err());
        assert!(VapidCredentials::from_base64url(a.public_key_base64url(), &a.private_key_base64url(), "  ").is_err());
    }

    #[test]
    fn jwt_claims_and_signature() {
        let keys = VapidCredentials::generate("mailto:ops@example.com");
        let now = 1_700_000_000;
        let aud = audience("https://fcm.googleapis.com/fcm/send/abc123").unwrap();
        assert_eq!(aud, "https://fcm.googleapis.com");

        let jwt = keys.sign_jwt(&aud, now);
        let parts: Vec<&str> = jwt.split('.').collect();
        assert_eq!(parts.len(), 3);
        assert!(parts.iter().all(|p| !p.contains('=')));

        let header: serde_json::Value = serde_json::from_slice(&BASE64URL.decode(parts[0]).unwrap()).unwrap();
        assert_eq!(header["alg"], "ES256");
        assert_eq!(header["typ"], "JWT");

        let claims: VapidClaims = serde_json::from_slice(&BASE64URL.decode(parts[1]).unwrap()).unwrap();
        assert_eq!(claims.aud, "https://fcm.googleapis.com");
        assert!(claims.exp > now && claims.exp <= now + VAPID_TOKEN_TTL_SECS);
        assert_eq!(claims.sub, "mailto:ops@example.com");

        let sig_bytes = BASE64URL.decode(parts[2]).unwrap();
        assert_eq!(sig_bytes.len(), 64, "raw r||s, not DER");
        let signature = Signature::from_slice(&sig_bytes).unwrap();
        let verifying = VerifyingKey::from_sec1_bytes(&decode_base64url(keys.public_key_base64url()).unwrap()).unwrap();
        verifying
            .verify(format!("{}.{}", parts[0], parts[1]).as_bytes(), &signature)
            .expect("signature verifies");
    }

    #[test]
    fn authorization_header_shape() {
        let keys = VapidCredentials::generate("mailto:ops@example.com");
        let value = keys
            .authorization("https://updates.push.services.mozilla.com/wpush/v2/xyz", 1_700_000_000)
            .unwrap();
        assert!(value.starts_with("vapid t="));
        assert!(value.ends_with(&format!(",k={}", keys.public_key_base64url())));
    }

    #[test]
    fn audience_keeps_non_default_port() {
        assert_eq!(audience("http://127.0.0.1:9000/push/1").unwrap(), "http://127.0.0.1:9000");
        assert_eq!(audience("https://push.example.com:443/x").unwrap(), "https://push.example.com");
        assert!(audience("not a url").is_err());
        assert!(audience("mailto:someone@example.com").is_err());
    }
}
