/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Durable per-channel state.
//!
//! The store contract is a plain string key-value map scoped by channel.
//! [`ChannelState`] layers the three well-known keys on top of it.

use anyhow::{Context, Result};
use async_trait::async_trait;
use pacecast_protocol::PushSubscription;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::warn;

pub const KEY_LAST_LOCATION: &str = "lastLocation";
pub const KEY_PUSH_SUBS: &str = "pushSubs";
pub const KEY_LAST_PUSH_AT: &str = "lastPushAt";

/// Subscriptions keyed by endpoint.
pub type SubscriptionMap = BTreeMap<String, PushSubscription>;

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, channel: &str, key: &str) -> Result<Option<String>>;
    async fn put(&self, channel: &str, key: &str, value: &str) -> Result<()>;
}

#[derive(Clone)]
pub struct SqliteStore {
    db_path: PathBuf,
    busy_timeout: Duration,
}

impl SqliteStore {
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();
        init_db(&db_path)?;
        Ok(Self {
            db_path,
            busy_timeout: Duration::from_millis(5_000),
        })
    }

    fn connect(db_path: &Path, busy_timeout: Duration) -> Result<Connection> {
        let conn = Connection::open(db_path).with_context(|| format!("open db: {}", db_path.display()))?;
        conn.busy_timeout(busy_timeout)?;
        Ok(conn)
    }
}

#[async_trait]
impl KvStore for SqliteStore {
    async fn get(&self, channel: &str, key: &str) -> Result<Option<String>> {
        let db_path = self.db_path.clone();
        let busy_timeout = self.busy_timeout;
        let channel = channel.to_string();
        let key = key.to_string();
        let value = tokio::task::spawn_blocking(move || -> Result<Option<String>> {
            let conn = Self::connect(&db_path, busy_timeout)?;
            let value = conn
                .query_row(
                    "SELECT value FROM channel_state WHERE channel = ?1 AND key = ?2",
                    params![channel, key],
                    |r| r.get::<_, String>(0),
                )
                .optional()?;
            Ok(value)
        })
        .await??;
        Ok(value)
    }

    async fn put(&self, channel: &str, key: &str, value: &str) -> Result<()> {
        let db_path = self.db_path.clone();
        let busy_timeout = self.busy_timeout;
        let channel = channel.to_string();
        let key = key.to_string();
        let value = value.to_string();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let conn = Self::connect(&db_path, busy_timeout)?;
            conn.execute(
                r#"
                INSERT INTO channel_state (channel, key, value, updated_at_ms)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(channel, key) DO UPDATE SET value = excluded.value, updated_at_ms = excluded.updated_at_ms
                "#,
                params![channel, key, value, now_ms()],
            )?;
            Ok(())
        })
        .await??;
        Ok(())
    }
}

fn init_db(path: &Path) -> Result<()> {
    let conn = Connection::open(path).with_context(|| format!("open db: {}", path.display()))?;
    conn.execute_batch(
        r#"
        PRAGMA journal_mode=WAL;
        CREATE TABLE IF NOT EXISTS channel_state (
          channel TEXT NOT NULL,
          key TEXT NOT NULL,
          value TEXT NOT NULL,
          updated_at_ms INTEGER NOT NULL,
          PRIMARY KEY(channel, key)
        );
        "#,
    )?;
    Ok(())
}

/// Volatile store for tests and ephemeral deployments.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<HashMap<(String, String), String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, channel: &str, key: &str) -> Result<Option<String>> {
        let map = self.inner.lock().map_err(|_| anyhow::anyhow!("memory store poisoned"))?;
        Ok(map.get(&(channel.to_string(), key.to_string())).cloned())
    }

    async fn put(&self, channel: &str, key: &str, value: &str) -> Result<()> {
        let mut map = self.inner.lock().map_err(|_| anyhow::anyhow!("memory store poisoned"))?;
        map.insert((channel.to_string(), key.to_string()), value.to_string());
        Ok(())
    }
}

/// Typed view over one channel's durable keys.
#[derive(Clone)]
pub struct ChannelState {
    channel: String,
    store: Arc<dyn KvStore>,
}

impl ChannelState {
    pub fn new(channel: impl Into<String>, store: Arc<dyn KvStore>) -> Self {
        Self {
            channel: channel.into(),
            store,
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub async fn last_location(&self) -> Result<Option<String>> {
        self.store.get(&self.channel, KEY_LAST_LOCATION).await
    }

    pub async fn set_last_location(&self, raw: &str) -> Result<()> {
        self.store.put(&self.channel, KEY_LAST_LOCATION, raw).await
    }

    /// Milliseconds since epoch of the last claimed push window, 0 if never.
    pub async fn last_push_at(&self) -> Result<i64> {
        let raw = self.store.get(&self.channel, KEY_LAST_PUSH_AT).await?;
        Ok(raw.and_then(|v| v.trim().parse::<i64>().ok()).unwrap_or(0))
    }

    pub async fn set_last_push_at(&self, ts_ms: i64) -> Result<()> {
        self.store
            .put(&self.channel, KEY_LAST_PUSH_AT, &ts_ms.to_string())
            .await
    }

    pub async fn subscriptions(&self) -> Result<SubscriptionMap> {
        let Some(raw) = self.store.get(&self.channel, KEY_PUSH_SUBS).await? else {
            return Ok(SubscriptionMap::new());
        };
        match serde_json::from_str::<SubscriptionMap>(&raw) {
            Ok(map) => Ok(map),
            Err(e) => {
                warn!(channel = %self.channel, "stored subscriptions unreadable, starting empty: {e}");
                Ok(SubscriptionMap::new())
            }
        }
    }

    pub async fn put_subscriptions(&self, subs: &SubscriptionMap) -> Result<()> {
        let json = serde_json::to_string(subs).context("serialize subscriptions")?;
        self.store.put(&self.channel, KEY_PUSH_SUBS, &json).await
    }
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
