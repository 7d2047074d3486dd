/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use anyhow::Result;
use pacecast_protocol::PushSubscription;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::store::{ChannelState, SubscriptionMap};

/// Per-channel push subscriptions, keyed by endpoint.
#[derive(Clone)]
pub struct SubscriptionRegistry {
    state: ChannelState,
    write: Arc<Mutex<()>>,
}

impl SubscriptionRegistry {
    pub fn new(state: ChannelState) -> Self {
        Self {
            state,
            write: Arc::new(Mutex::new(())),
        }
    }

    /// Upsert by endpoint. Subscriptions without an endpoint are ignored.
    pub async fn register(&self, subscription: PushSubscription) -> Result<bool> {
        if subscription.endpoint.trim().is_empty() {
            debug!(channel = %self.state.channel(), "ignoring subscription without endpoint");
            return Ok(false);
        }
        let _guard = self.write.lock().await;
        let mut subs = self.state.subscriptions().await?;
        let endpoint = subscription.endpoint.clone();
        let replaced = subs.insert(endpoint.clone(), subscription).is_some();
        self.state.put_subscriptions(&subs).await?;
        info!(channel = %self.state.channel(), %endpoint, replaced, total = subs.len(), "push subscription registered");
        Ok(true)
    }

    /// Remove `endpoints` from the freshly persisted map, not from any copy
    /// taken earlier, so registrations made during a dispatch survive.
    pub async fn prune(&self, endpoints: &[String]) -> Result<usize> {
        if endpoints.is_empty() {
            return Ok(0);
        }
        let _guard = self.write.lock().await;
        let mut subs = self.state.subscriptions().await?;
        let before = subs.len();
        for endpoint in endpoints {
            subs.remove(endpoint);
        }
        let removed = before - subs.len();
        self.state.put_subscriptions(&subs).await?;
        if removed > 0 {
            info!(channel = %self.state.channel(), removed, remaining = subs.len(), "pruned dead push subscriptions");
        }
        Ok(removed)
    }

    pub async fn list(&self) -> Result<SubscriptionMap> {
        self.state.subscriptions().await
    }
}
