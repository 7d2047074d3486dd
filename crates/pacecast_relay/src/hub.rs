/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use pacecast_push::crypto::Clock;
use pacecast_push::{ChannelState, KvStore, PushDispatcher, PushSender, SubscriptionRegistry};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::channel::{ChannelRelay, ConnectionId, Outbox};

/// Live channels, created on first join and dropped when the last socket leaves.
#[derive(Clone)]
pub struct ChannelHub {
    channels: Arc<RwLock<HashMap<String, Arc<ChannelRelay>>>>,
    store: Arc<dyn KvStore>,
    sender: Option<Arc<dyn PushSender>>,
    clock: Arc<dyn Clock>,
    next_conn: Arc<AtomicU64>,
}

impl ChannelHub {
    pub fn new(store: Arc<dyn KvStore>, sender: Option<Arc<dyn PushSender>>, clock: Arc<dyn Clock>) -> Self {
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
            store,
            sender,
            clock,
            next_conn: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn next_connection_id(&self) -> ConnectionId {
        self.next_conn.fetch_add(1, Ordering::Relaxed)
    }

    pub async fn live_channels(&self) -> usize {
        self.channels.read().await.len()
    }

    /// Join `channel`, creating its relay if needed. The map lock is held only
    /// for lookup and insert; a relay retired by its last `leave` is replaced.
    pub async fn join(&self, channel: &str, conn: ConnectionId, outbox: Outbox) -> Arc<ChannelRelay> {
        loop {
            let relay = self.get_or_create(channel).await;
            if relay.on_join(conn, outbox.clone()).await {
                return relay;
            }
            self.release(&relay).await;
        }
    }

    pub async fn leave(&self, relay: &Arc<ChannelRelay>, conn: ConnectionId) {
        if relay.on_leave(conn).await {
            self.release(relay).await;
        }
    }

    async fn get_or_create(&self, channel: &str) -> Arc<ChannelRelay> {
        if let Some(relay) = self.channels.read().await.get(channel) {
            if !relay.is_retired() {
                return relay.clone();
            }
        }
        let mut channels = self.channels.write().await;
        match channels.get(channel) {
            Some(relay) if !relay.is_retired() => relay.clone(),
            _ => {
                let relay = Arc::new(self.build_relay(channel));
                channels.insert(channel.to_string(), relay.clone());
                relay
            }
        }
    }

    /// Drop `relay` from the map unless it was already replaced.
    async fn release(&self, relay: &Arc<ChannelRelay>) {
        let mut channels = self.channels.write().await;
        if channels.get(relay.id()).is_some_and(|current| Arc::ptr_eq(current, relay)) {
            channels.remove(relay.id());
            debug!(channel = %relay.id(), "channel idle, released");
        }
    }

    fn build_relay(&self, channel: &str) -> ChannelRelay {
        let state = ChannelState::new(channel, self.store.clone());
        let registry = SubscriptionRegistry::new(state.clone());
        let dispatcher = Arc::new(PushDispatcher::new(
            state.clone(),
            registry.clone(),
            self.sender.clone(),
            self.clock.clone(),
        ));
        ChannelRelay::new(state, registry, dispatcher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{Frame, MessageOutcome, OUTBOX_CAPACITY};
    use pacecast_push::crypto::SystemClock;
    use pacecast_push::MemoryStore;
    use tokio::sync::mpsc;

    fn hub(store: Arc<dyn KvStore>) -> ChannelHub {
        ChannelHub::new(store, None, Arc::new(SystemClock))
    }

    #[tokio::test]
    async fn channels_do_not_cross_talk() {
        let hub = hub(Arc::new(MemoryStore::new()));
        let (tx_a, _rx_a) = mpsc::channel(OUTBOX_CAPACITY);
        let (tx_b, mut rx_b) = mpsc::channel(OUTBOX_CAPACITY);
        let a = hub.join("alpha", hub.next_connection_id(), tx_a).await;
        let _b = hub.join("beta", hub.next_connection_id(), tx_b).await;

        let raw = r#"{"type":"location","coords":[1,2]}"#;
        let MessageOutcome::Relayed { recipients, .. } = a.on_message(Frame::Text(raw), 999).await else {
            panic!("expected relay");
        };
        assert_eq!(recipients, 1);
        assert!(rx_b.try_recv().is_err());
        assert_eq!(hub.live_channels().await, 2);
    }

    #[tokio::test]
    async fn idle_channel_is_released_but_state_survives() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let hub = hub(store.clone());
        let (tx, _rx) = mpsc::channel(OUTBOX_CAPACITY);
        let conn = hub.next_connection_id();
        let relay = hub.join("alpha", conn, tx).await;
        let raw = r#"{"type":"location","coords":[5,6]}"#;
        relay.on_message(Frame::Text(raw), conn).await;

        hub.leave(&relay, conn).await;
        assert_eq!(hub.live_channels().await, 0);

        let (tx, mut rx) = mpsc::channel(OUTBOX_CAPACITY);
        let _again = hub.join("alpha", hub.next_connection_id(), tx).await;
        assert_eq!(rx.try_recv().unwrap(), raw);
    }

    #[tokio::test]
    async fn retired_relay_is_replaced_on_join() {
        let hub = hub(Arc::new(MemoryStore::new()));
        let (tx, _rx) = mpsc::channel(OUTBOX_CAPACITY);
        let conn = hub.next_connection_id();
        let old = hub.join("alpha", conn, tx).await;

        // Last socket gone but the map still points at the relay.
        assert!(old.on_leave(conn).await);
        assert_eq!(hub.live_channels().await, 1);

        let (tx, _rx) = mpsc::channel(OUTBOX_CAPACITY);
        let fresh = hub.join("alpha", hub.next_connection_id(), tx).await;
        assert!(!Arc::ptr_eq(&old, &fresh));
        assert_eq!(fresh.connection_count().await, 1);
        assert_eq!(hub.live_channels().await, 1);

        // A stale release for the old relay leaves the fresh one in place.
        hub.leave(&old, conn).await;
        assert_eq!(hub.live_channels().await, 1);
    }
}
