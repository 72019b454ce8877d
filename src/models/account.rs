// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Account and OAuth credential models.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A tracked account: who to notify, how to authenticate, and how far we got.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Account identity (also the store key)
    pub user_id: i64,
    /// Telegram chat that receives release notifications
    pub chat_id: i64,
    /// Spotify credential owned by this account
    pub token: OAuth2Token,
    /// Watermark: releases up to this instant have been fully checked
    pub last_check: DateTime<Utc>,
}

/// Spotify OAuth2 credential.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct OAuth2Token {
    pub access_token: String,
    pub token_type: String,
    pub scope: String,
    /// Absolute expiry of `access_token`
    pub expires_at: DateTime<Utc>,
    /// Never cleared once set
    pub refresh_token: String,
}

impl OAuth2Token {
    /// True if the access token must not be used at `now` (with `margin` of slack).
    pub fn is_expired(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        now + margin >= self.expires_at
    }
}

// Keep secrets out of logs.
impl std::fmt::Debug for OAuth2Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuth2Token")
            .field("token_type", &self.token_type)
            .field("scope", &self.scope)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}
