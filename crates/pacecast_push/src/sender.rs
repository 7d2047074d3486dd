/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use async_trait::async_trait;
use pacecast_protocol::PushSubscription;
use reqwest::header::{AUTHORIZATION, CONTENT_ENCODING, CONTENT_TYPE};
use reqwest::StatusCode;

use crate::engine::{self, PushEncryptionEngine};
use crate::error::{PushError, Result};

/// Delivers one payload to one subscription.
#[async_trait]
pub trait PushSender: Send + Sync {
    async fn send(&self, subscription: &PushSubscription, payload: &[u8]) -> Result<()>;
}

/// RFC 8030 delivery over HTTP.
#[derive(Clone)]
pub struct WebPushSender {
    http: reqwest::Client,
    engine: PushEncryptionEngine,
}

impl WebPushSender {
    pub fn new(http: reqwest::Client, engine: PushEncryptionEngine) -> Self {
        Self { http, engine }
    }

    pub fn engine(&self) -> &PushEncryptionEngine {
        &self.engine
    }
}

#[async_trait]
impl PushSender for WebPushSender {
    async fn send(&self, subscription: &PushSubscription, payload: &[u8]) -> Result<()> {
        let req = self.engine.seal(subscription, payload)?;
        let resp = self
            .http
            .post(req.endpoint.as_str())
            .header(AUTHORIZATION, req.authorization)
            .header(CONTENT_ENCODING, engine::CONTENT_ENCODING)
            .header(CONTENT_TYPE, engine::CONTENT_TYPE)
            .header("TTL", engine::PUSH_TTL_SECS.to_string())
            .body(req.body)
            .send()
            .await?;
        match resp.status() {
            StatusCode::CREATED => Ok(()),
            status => Err(PushError::Status(status.as_u16())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{OsCrypto, SystemClock};
    use crate::vapid::VapidCredentials;
    use pacecast_protocol::SubscriptionKeys;
    use std::sync::Arc;
    use wiremock::matchers::{header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    // RFC 8291 example user agent key.
    const UA_PUBLIC: &str =
        "BCVxsr7N_eNgVRqvHtD0zTZsEc6-VV-JvLexhqUzORcxaOzi6-AYWXvTBHm4bjyPjs7Vd8pZGH6SRpkNtoIAiw4";
    const UA_AUTH: &str = "BTBZMqHH6r4Tts7J_aSIgg";

    fn sender() -> WebPushSender {
        let engine = PushEncryptionEngine::new(
            Arc::new(VapidCredentials::generate("mailto:ops@example.com")),
            Arc::new(OsCrypto),
            Arc::new(SystemClock),
        );
        WebPushSender::new(reqwest::Client::new(), engine)
    }

    fn subscription(server: &MockServer, p: &str) -> PushSubscription {
        PushSubscription {
            endpoint: format!("{}{p}", server.uri()),
            keys: SubscriptionKeys {
                p256dh: UA_PUBLIC.into(),
                auth: UA_AUTH.into(),
            },
        }
    }

    #[tokio::test]
    async fn posts_encrypted_body_with_push_headers() {
        let server = MockServer::start().await;
        let sender = sender();
        let auth_prefix = "vapid t=";
        Mock::given(method("POST"))
            .and(path("/push/ok"))
            .and(header("content-encoding", "aes128gcm"))
            .and(header("content-type", "application/octet-stream"))
            .and(header("ttl", "86400"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        sender.send(&subscription(&server, "/push/ok"), b"{}").await.unwrap();

        let received = server.received_requests().await.unwrap();
        let req = &received[0];
        let authz = req.headers.get("authorization").unwrap().to_str().unwrap();
        assert!(authz.starts_with(auth_prefix));
        assert!(authz.ends_with(&format!(",k={}", sender.engine().vapid().public_key_base64url())));
        assert_eq!(req.body.len(), crate::ece::HEADER_LEN + 2 + 1 + crate::ece::TAG_LEN);
    }

    #[tokio::test]
    async fn non_created_statuses_are_failures() {
        let server = MockServer::start().await;
        for (p, code) in [("/push/gone", 410u16), ("/push/missing", 404), ("/push/busy", 500), ("/push/ok200", 200)] {
            Mock::given(method("POST"))
                .and(path(p))
                .respond_with(ResponseTemplate::new(code))
                .mount(&server)
                .await;
        }
        let sender = sender();

        let gone = sender.send(&subscription(&server, "/push/gone"), b"{}").await.unwrap_err();
        assert!(gone.is_gone());
        let missing = sender.send(&subscription(&server, "/push/missing"), b"{}").await.unwrap_err();
        assert!(missing.is_gone());
        let busy = sender.send(&subscription(&server, "/push/busy"), b"{}").await.unwrap_err();
        assert_eq!(busy.status(), Some(500));
        assert!(!busy.is_gone());
        // Only 201 counts as accepted.
        let ok200 = sender.send(&subscription(&server, "/push/ok200"), b"{}").await.unwrap_err();
        assert_eq!(ok200.status(), Some(200));
    }
}
