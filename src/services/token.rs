// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! OAuth token lifecycle seam and the per-sweep token supplier.

use crate::error::AppError;
use crate::models::{Account, OAuth2Token};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Keeps a credential usable.
#[async_trait]
pub trait TokenLifecycle: Send + Sync {
    /// Return a credential that is not expired now.
    ///
    /// An unexpired input is returned unchanged; an expired one is refreshed.
    /// Refresh failures are returned as-is; there is no retry here.
    async fn ensure_valid(&self, token: &OAuth2Token) -> Result<OAuth2Token, AppError>;
}

/// Hands out bearer tokens for one sweep, refreshing through a
/// [`TokenLifecycle`] when needed.
///
/// The current credential lives here and nowhere else during the sweep, so the
/// caller can persist a refreshed token once the sweep ends, successful or not.
pub struct TokenSupplier {
    lifecycle: Arc<dyn TokenLifecycle>,
    token: OAuth2Token,
    /// Refresh token the supplier started from.
    initial_refresh_token: String,
    refreshed: bool,
}

impl TokenSupplier {
    pub fn new(lifecycle: Arc<dyn TokenLifecycle>, token: OAuth2Token) -> Self {
        Self {
            lifecycle,
            initial_refresh_token: token.refresh_token.clone(),
            token,
            refreshed: false,
        }
    }

    /// Get an access token that is valid right now.
    ///
    /// A refresh in progress is abandoned as soon as `cancel` fires.
    pub async fn access_token(&mut self, cancel: &CancellationToken) -> Result<String, AppError> {
        let current = tokio::select! {
            _ = cancel.cancelled() => return Err(AppError::Cancelled),
            current = self.lifecycle.ensure_valid(&self.token) => current?,
        };
        if current != self.token {
            self.token = current;
            self.refreshed = true;
        }
        Ok(self.token.access_token.clone())
    }

    /// The latest credential.
    pub fn token(&self) -> &OAuth2Token {
        &self.token
    }

    /// True once any refresh happened through this supplier.
    pub fn was_refreshed(&self) -> bool {
        self.refreshed
    }

    /// The refreshed credential as a store update, if there was a refresh.
    pub fn pending_update(&self) -> Option<TokenUpdate> {
        self.refreshed.then(|| TokenUpdate {
            replaces: self.initial_refresh_token.clone(),
            token: self.token.clone(),
        })
    }
}

/// A refreshed credential waiting to be written back to its account.
#[derive(Debug, Clone)]
pub struct TokenUpdate {
    replaces: String,
    token: OAuth2Token,
}

impl TokenUpdate {
    /// Write the credential onto `account` unless the account was given a
    /// different credential (reauthorization) since the refresh started.
    ///
    /// Returns whether the token was written.
    pub fn apply(self, account: &mut Account) -> bool {
        if account.token.refresh_token != self.replaces {
            tracing::info!(
                user_id = account.user_id,
                "Account reauthorized meanwhile, discarding refreshed token"
            );
            return false;
        }
        account.token = self.token;
        true
    }
}
