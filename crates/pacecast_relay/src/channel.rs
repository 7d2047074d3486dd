/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use pacecast_protocol::{ChannelMessage, MAX_FRAME_BYTES, MAX_LOCATION_BYTES};
use pacecast_push::{ChannelState, PushDispatcher, SubscriptionRegistry};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub type ConnectionId = u64;
pub type Outbox = mpsc::Sender<String>;

/// Frames queued per socket before further broadcasts to it are dropped.
pub const OUTBOX_CAPACITY: usize = 64;

/// A raw inbound WebSocket frame.
#[derive(Debug, Clone, Copy)]
pub enum Frame<'a> {
    Text(&'a str),
    Binary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    NotText,
    TooLarge,
    InvalidJson,
    UnknownType,
    Store,
}

#[derive(Debug)]
pub enum MessageOutcome {
    Dropped(DropReason),
    Subscribed,
    Relayed {
        recipients: usize,
        push: JoinHandle<()>,
    },
}

/// One channel: durable state plus the set of live sockets.
pub struct ChannelRelay {
    state: ChannelState,
    registry: SubscriptionRegistry,
    dispatcher: Arc<PushDispatcher>,
    connections: RwLock<HashMap<ConnectionId, Outbox>>,
    retired: AtomicBool,
}

impl ChannelRelay {
    pub fn new(state: ChannelState, registry: SubscriptionRegistry, dispatcher: Arc<PushDispatcher>) -> Self {
        Self {
            state,
            registry,
            dispatcher,
            connections: RwLock::new(HashMap::new()),
            retired: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &str {
        self.state.channel()
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Register a socket and catch it up with the last stored location.
    ///
    /// The catch-up read and the insert happen under the connection lock, so a
    /// location persisted meanwhile reaches the socket through the broadcast
    /// that follows it. Returns false if the relay was already retired.
    pub async fn on_join(&self, conn: ConnectionId, outbox: Outbox) -> bool {
        let mut conns = self.connections.write().await;
        if self.retired.load(Ordering::Acquire) {
            return false;
        }
        match self.state.last_location().await {
            Ok(Some(raw)) => {
                let _ = outbox.try_send(raw);
            }
            Ok(None) => {}
            Err(e) => warn!(channel = %self.id(), "load last location failed: {e:#}"),
        }
        conns.insert(conn, outbox);
        true
    }

    /// Returns true when the last socket left. The relay is then retired and
    /// refuses further joins.
    pub async fn on_leave(&self, conn: ConnectionId) -> bool {
        let mut conns = self.connections.write().await;
        conns.remove(&conn);
        if conns.is_empty() {
            self.retired.store(true, Ordering::Release);
        }
        conns.is_empty()
    }

    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    pub async fn on_message(&self, frame: Frame<'_>, sender: ConnectionId) -> MessageOutcome {
        let raw = match frame {
            Frame::Text(raw) => raw,
            Frame::Binary => return self.reject(sender, DropReason::NotText),
        };
        if raw.len() > MAX_FRAME_BYTES {
            return self.reject(sender, DropReason::TooLarge);
        }
        let Ok(value) = serde_json::from_str::<serde_json::Value>(raw) else {
            return self.reject(sender, DropReason::InvalidJson);
        };

        let location = match ChannelMessage::classify(&value) {
            ChannelMessage::PushSubscribe(sub) => {
                if let Some(sub) = sub {
                    if let Err(e) = self.registry.register(sub).await {
                        warn!(channel = %self.id(), "register subscription failed: {e:#}");
                    }
                }
                return MessageOutcome::Subscribed;
            }
            _ if raw.len() > MAX_LOCATION_BYTES => return self.reject(sender, DropReason::TooLarge),
            ChannelMessage::Location(location) => location,
            ChannelMessage::Other => return self.reject(sender, DropReason::UnknownType),
        };

        if let Err(e) = self.state.set_last_location(raw).await {
            warn!(channel = %self.id(), "persist location failed: {e:#}");
            return MessageOutcome::Dropped(DropReason::Store);
        }

        let recipients = self.broadcast(raw, sender).await;

        let dispatcher = self.dispatcher.clone();
        let channel = self.id().to_string();
        let push = tokio::spawn(async move {
            if let Err(e) = dispatcher.notify(&location).await {
                warn!(%channel, "push dispatch failed: {e}");
            }
        });

        MessageOutcome::Relayed { recipients, push }
    }

    /// Best-effort delivery to every live socket except `sender`. A socket
    /// whose queue is full misses this frame.
    async fn broadcast(&self, raw: &str, sender: ConnectionId) -> usize {
        let conns = self.connections.read().await;
        let mut delivered = 0;
        for (id, outbox) in conns.iter().filter(|(id, _)| **id != sender) {
            match outbox.try_send(raw.to_string()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    debug!(channel = %self.id(), conn = *id, "outbox full, frame dropped");
                }
                Err(TrySendError::Closed(_)) => {}
            }
        }
        delivered
    }

    fn reject(&self, sender: ConnectionId, reason: DropReason) -> MessageOutcome {
        debug!(channel = %self.id(), conn = sender, ?reason, "dropping inbound message");
        MessageOutcome::Dropped(reason)
    }
}
