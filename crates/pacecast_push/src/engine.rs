/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use std::sync::Arc;

use pacecast_protocol::PushSubscription;

use crate::crypto::{Clock, PushCrypto};
use crate::ece::{self, SubscriberKeys};
use crate::error::Result;
use crate::vapid::VapidCredentials;

pub const CONTENT_ENCODING: &str = "aes128gcm";
pub const CONTENT_TYPE: &str = "application/octet-stream";
pub const PUSH_TTL_SECS: u32 = 86_400;

/// Everything needed to POST one encrypted message. Never persisted.
#[derive(Debug, Clone)]
pub struct EncryptedPushRequest {
    pub endpoint: String,
    pub authorization: String,
    pub body: Vec<u8>,
}

/// Turns a subscription plus payload into a ready-to-send request.
#[derive(Clone)]
pub struct PushEncryptionEngine {
    vapid: Arc<VapidCredentials>,
    crypto: Arc<dyn PushCrypto>,
    clock: Arc<dyn Clock>,
}

impl PushEncryptionEngine {
    pub fn new(vapid: Arc<VapidCredentials>, crypto: Arc<dyn PushCrypto>, clock: Arc<dyn Clock>) -> Self {
        Self { vapid, crypto, clock }
    }

    pub fn vapid(&self) -> &VapidCredentials {
        &self.vapid
    }

    pub fn seal(&self, subscription: &PushSubscription, payload: &[u8]) -> Result<EncryptedPushRequest> {
        let authorization = self
            .vapid
            .authorization(&subscription.endpoint, self.clock.now_secs())?;
        let keys = SubscriberKeys::from_base64url(&subscription.keys.p256dh, &subscription.keys.auth)?;
        let body = ece::encrypt(self.crypto.as_ref(), &keys, payload)?;
        Ok(EncryptedPushRequest {
            endpoint: subscription.endpoint.clone(),
            authorization,
            body,
        })
    }
}
