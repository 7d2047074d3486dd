/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

pub mod crypto;
pub mod dispatcher;
pub mod ece;
pub mod engine;
pub mod error;
pub mod registry;
pub mod sender;
pub mod store;
pub mod vapid;

pub use dispatcher::{DispatchOutcome, DispatchReport, PushDispatcher, SkipReason};
pub use engine::{EncryptedPushRequest, PushEncryptionEngine};
pub use error::PushError;
pub use registry::SubscriptionRegistry;
pub use sender::{PushSender, WebPushSender};
pub use store::{ChannelState, KvStore, MemoryStore, SqliteStore};
pub use vapid::VapidCredentials;
