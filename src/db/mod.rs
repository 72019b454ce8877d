// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Account persistence.

pub mod json_file;

pub use json_file::JsonFileStore;

use crate::error::AppError;
use crate::models::Account;
use async_trait::async_trait;

/// An in-place edit of one stored account.
pub type AccountChange = Box<dyn FnOnce(&mut Account) + Send>;

/// Storage for tracked accounts.
///
/// Implementations may fail on any call; callers must not assume a save is
/// durable unless it returned `Ok`.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Get an account by user ID.
    async fn load(&self, user_id: i64) -> Result<Option<Account>, AppError>;

    /// All accounts, ordered by user ID.
    async fn list(&self) -> Result<Vec<Account>, AppError>;

    /// Create or replace an account.
    async fn save(&self, account: &Account) -> Result<(), AppError>;

    /// Apply `change` to the current stored account and persist it, with no
    /// other write in between. Returns the result, or `None` (and does
    /// nothing) if the account does not exist.
    async fn update(
        &self,
        user_id: i64,
        change: AccountChange,
    ) -> Result<Option<Account>, AppError>;
}
