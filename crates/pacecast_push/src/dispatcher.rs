/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Rate-limited push fan-out for one channel.

use std::sync::Arc;

use futures_util::future::join_all;
use pacecast_protocol::{LocationMessage, PushNotification};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::crypto::Clock;
use crate::error::Result;
use crate::registry::SubscriptionRegistry;
use crate::sender::PushSender;
use crate::store::ChannelState;

/// One push window per channel, shared by all of its subscribers.
pub const PUSH_MIN_INTERVAL_MS: i64 = 30_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotConfigured,
    RateLimited,
    NoSubscribers,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub attempted: usize,
    pub delivered: usize,
    pub pruned: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Skipped(SkipReason),
    Dispatched(DispatchReport),
}

pub struct PushDispatcher {
    state: ChannelState,
    registry: SubscriptionRegistry,
    sender: Option<Arc<dyn PushSender>>,
    clock: Arc<dyn Clock>,
    min_interval_ms: i64,
    claim: Mutex<()>,
}

impl PushDispatcher {
    /// `sender` is `None` when VAPID credentials are not configured.
    pub fn new(
        state: ChannelState,
        registry: SubscriptionRegistry,
        sender: Option<Arc<dyn PushSender>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            state,
            registry,
            sender,
            clock,
            min_interval_ms: PUSH_MIN_INTERVAL_MS,
            claim: Mutex::new(()),
        }
    }

    pub async fn notify(&self, msg: &LocationMessage) -> Result<DispatchOutcome> {
        let Some(sender) = self.sender.clone() else {
            return Ok(DispatchOutcome::Skipped(SkipReason::NotConfigured));
        };
        let channel = self.state.channel();

        {
            let _guard = self.claim.lock().await;
            let now = self.clock.now_ms();
            let last = self.state.last_push_at().await?;
            if now - last < self.min_interval_ms {
                debug!(%channel, since_last_ms = now - last, "push suppressed by rate limit");
                return Ok(DispatchOutcome::Skipped(SkipReason::RateLimited));
            }
            // Claimed before any network I/O, so slow or failing sends still
            // hold the window.
            self.state.set_last_push_at(now).await?;
        }

        let subs = self.registry.list().await?;
        if subs.is_empty() {
            return Ok(DispatchOutcome::Skipped(SkipReason::NoSubscribers));
        }

        let notification = PushNotification::for_location(msg);
        let payload = serde_json::to_vec(&notification).unwrap_or_default();

        let sends = subs.values().map(|sub| {
            let sender = sender.clone();
            let payload = payload.as_slice();
            async move { (sub.endpoint.as_str(), sender.send(sub, payload).await) }
        });
        let results = join_all(sends).await;

        let mut report = DispatchReport {
            attempted: results.len(),
            ..DispatchReport::default()
        };
        let mut dead = Vec::new();
        for (endpoint, result) in results {
            match result {
                Ok(()) => report.delivered += 1,
                Err(e) if e.is_gone() => {
                    debug!(%channel, %endpoint, "push subscription gone: {e}");
                    dead.push(endpoint.to_string());
                }
                Err(e) => {
                    warn!(%channel, %endpoint, "push send failed: {e}");
                    report.failed += 1;
                }
            }
        }

        if !dead.is_empty() {
            report.pruned = self.registry.prune(&dead).await?;
        }
        info!(
            %channel,
            attempted = report.attempted,
            delivered = report.delivered,
            pruned = report.pruned,
            failed = report.failed,
            "push fan-out complete"
        );
        Ok(DispatchOutcome::Dispatched(report))
    }
}
