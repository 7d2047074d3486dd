/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PushError {
    #[error("invalid key material: {0}")]
    InvalidKey(String),
    #[error("crypto failure: {0}")]
    Crypto(String),
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("push transport error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("push service responded with HTTP {0}")]
    Status(u16),
    #[error("store error: {0:#}")]
    Store(#[from] anyhow::Error),
}

impl PushError {
    /// The push service reported the subscription as permanently gone.
    pub fn is_gone(&self) -> bool {
        matches!(self, PushError::Status(404) | PushError::Status(410))
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            PushError::Status(code) => Some(*code),
            PushError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

pub type Result<T, E = PushError> = std::result::Result<T, E>;
