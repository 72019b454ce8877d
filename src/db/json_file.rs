// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! JSON file account store.
//!
//! The whole document is kept in memory and rewritten on every save. Writes go
//! to a sibling temp file which is then renamed over the original, so a crash
//! mid-write leaves the previous document intact.

use crate::db::{AccountChange, AccountStore};
use crate::error::AppError;
use crate::models::Account;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// On-disk document layout.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreDocument {
    accounts: Vec<Account>,
}

/// Account store backed by a single JSON file.
pub struct JsonFileStore {
    path: PathBuf,
    accounts: Mutex<BTreeMap<i64, Account>>,
}

impl JsonFileStore {
    /// Open the store, reading `path` if it exists.
    ///
    /// A missing file is an empty store; a malformed one is an error.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let path = path.as_ref().to_path_buf();

        let accounts = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let doc: StoreDocument = serde_json::from_slice(&bytes).map_err(|e| {
                    AppError::Storage(format!("Malformed store file {}: {}", path.display(), e))
                })?;
                doc.accounts
                    .into_iter()
                    .map(|a| (a.user_id, a))
                    .collect::<BTreeMap<_, _>>()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "Store file not found, starting empty");
                BTreeMap::new()
            }
            Err(e) => {
                return Err(AppError::Storage(format!(
                    "Failed to read store file {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        tracing::info!(
            path = %path.display(),
            count = accounts.len(),
            "Account store loaded"
        );

        Ok(Self {
            path,
            accounts: Mutex::new(accounts),
        })
    }

    /// Serialize `accounts` and atomically replace the store file.
    async fn persist(&self, accounts: &BTreeMap<i64, Account>) -> Result<(), AppError> {
        let doc = StoreDocument {
            accounts: accounts.values().cloned().collect(),
        };
        let bytes = serde_json::to_vec_pretty(&doc)
            .map_err(|e| AppError::Storage(format!("Failed to serialize accounts: {}", e)))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::Storage(format!("Failed to create data dir: {}", e)))?;
        }

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to write {}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|e| {
            AppError::Storage(format!("Failed to replace {}: {}", self.path.display(), e))
        })?;

        Ok(())
    }
}

#[async_trait]
impl AccountStore for JsonFileStore {
    async fn load(&self, user_id: i64) -> Result<Option<Account>, AppError> {
        Ok(self.accounts.lock().await.get(&user_id).cloned())
    }

    async fn list(&self) -> Result<Vec<Account>, AppError> {
        Ok(self.accounts.lock().await.values().cloned().collect())
    }

    async fn save(&self, account: &Account) -> Result<(), AppError> {
        let mut accounts = self.accounts.lock().await;
        let previous = accounts.insert(account.user_id, account.clone());

        if let Err(e) = self.persist(&accounts).await {
            // Keep memory in line with what is on disk.
            match previous {
                Some(prev) => accounts.insert(account.user_id, prev),
                None => accounts.remove(&account.user_id),
            };
            return Err(e);
        }

        tracing::debug!(user_id = account.user_id, "Account saved");
        Ok(())
    }

    async fn update(
        &self,
        user_id: i64,
        change: AccountChange,
    ) -> Result<Option<Account>, AppError> {
        let mut accounts = self.accounts.lock().await;
        let Some(current) = accounts.get(&user_id).cloned() else {
            return Ok(None);
        };

        let mut updated = current.clone();
        change(&mut updated);
        if updated == current {
            return Ok(Some(updated));
        }

        accounts.insert(user_id, updated.clone());
        if let Err(e) = self.persist(&accounts).await {
            accounts.insert(user_id, current);
            return Err(e);
        }

        tracing::debug!(user_id, "Account updated");
        Ok(Some(updated))
    }
}
