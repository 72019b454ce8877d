// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! One release sweep for one account.
//!
//! Workflow:
//! 1. Snapshot the window `(start, now]` and throttle sweeps that are too close
//! 2. List followed artists (failure aborts the sweep)
//! 3. For each artist in order: list releases, select new ones, notify
//! 4. Advance the watermark only if every artist was checked
//!
//! A token refreshed along the way is saved even when the sweep fails.

use crate::config::Config;
use crate::db::{AccountChange, AccountStore};
use crate::error::{AppError, Result};
use crate::models::{Account, Release};
use crate::services::releases::select_new;
use crate::services::spotify::Catalog;
use crate::services::telegram::NotificationDispatcher;
use crate::services::token::{TokenLifecycle, TokenSupplier};
use crate::time_utils::{format_utc_rfc3339, Clock};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Wait before the single retry of a failed notification.
const NOTIFY_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Where a sweep window starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowStart {
    /// The account's stored watermark (scheduled sweeps).
    Watermark,
    /// An explicit instant (force checks).
    Since(DateTime<Utc>),
}

/// Summary of a finished sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Skipped because the window was too short.
    pub throttled: bool,
    pub artists_checked: usize,
    pub releases_found: usize,
    pub notifications_sent: usize,
    pub notifications_dropped: usize,
    pub watermark_advanced: bool,
}

/// Runs one sweep for one account.
#[async_trait]
pub trait SweepRunner: Send + Sync {
    async fn run(
        &self,
        user_id: i64,
        start: WindowStart,
        cancel: CancellationToken,
    ) -> Result<SweepReport>;
}

/// Tunables for [`PollRun`].
#[derive(Debug, Clone)]
pub struct PollSettings {
    /// Pause between artists to stay under upstream rate limits.
    pub artist_delay: Duration,
    /// Windows shorter than this are not swept.
    pub min_sweep_gap: Duration,
    pub notify_retry_delay: Duration,
}

impl PollSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            artist_delay: config.artist_delay,
            min_sweep_gap: config.min_sweep_gap,
            notify_retry_delay: NOTIFY_RETRY_DELAY,
        }
    }
}

/// Sweeps an account's followed artists for new releases.
pub struct PollRun {
    catalog: Arc<dyn Catalog>,
    tokens: Arc<dyn TokenLifecycle>,
    notifier: Arc<dyn NotificationDispatcher>,
    store: Arc<dyn AccountStore>,
    clock: Arc<dyn Clock>,
    settings: PollSettings,
    /// Per-account mutex guarding the watermark read-modify-write.
    account_locks: DashMap<i64, Arc<Mutex<()>>>,
}

impl PollRun {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        tokens: Arc<dyn TokenLifecycle>,
        notifier: Arc<dyn NotificationDispatcher>,
        store: Arc<dyn AccountStore>,
        clock: Arc<dyn Clock>,
        settings: PollSettings,
    ) -> Self {
        Self {
            catalog,
            tokens,
            notifier,
            store,
            clock,
            settings,
            account_locks: DashMap::new(),
        }
    }

    /// Walk every followed artist and notify about releases in the window.
    ///
    /// Returns `PartialSweep` if any artist could not be checked.
    async fn sweep(
        &self,
        account: &Account,
        tokens: &mut TokenSupplier,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<SweepReport> {
        let user_id = account.user_id;

        let artists = self.catalog.followed_artists(tokens, cancel).await?;
        tracing::info!(user_id, count = artists.len(), "Checking followed artists");

        let mut report = SweepReport::default();
        let mut failures = 0usize;
        let mut notified = HashSet::new();

        for (i, artist) in artists.iter().enumerate() {
            if i > 0 {
                self.pause(self.settings.artist_delay, cancel).await?;
            }
            if cancel.is_cancelled() {
                return Err(AppError::Cancelled);
            }

            let releases = match self.catalog.artist_releases(artist, tokens, cancel).await {
                Ok(releases) => releases,
                // Every later request would fail the same way.
                Err(e) if e.is_cancelled() || e.is_token_error() => return Err(e),
                Err(e) => {
                    failures += 1;
                    // One warning per sweep; the rest only at debug level.
                    if failures == 1 {
                        tracing::warn!(
                            user_id,
                            artist_id = %artist.id,
                            artist = %artist.name,
                            rate_limited = e.is_rate_limited(),
                            error = %e,
                            "Failed to fetch releases, continuing with next artist"
                        );
                    } else {
                        tracing::debug!(
                            user_id,
                            artist_id = %artist.id,
                            error = %e,
                            "Failed to fetch releases"
                        );
                    }
                    continue;
                }
            };
            report.artists_checked += 1;

            for release in select_new(releases, window_start, window_end) {
                // Collaborations show up under every participating artist.
                if !notified.insert(release.id.clone()) {
                    continue;
                }
                report.releases_found += 1;

                tracing::info!(
                    user_id,
                    release_id = %release.id,
                    name = %release.name,
                    album_type = %release.album_type,
                    album_group = release.album_group.as_deref().unwrap_or("-"),
                    artists = %release.artist_names(),
                    release_date = %format_utc_rfc3339(release.release_date),
                    "New release"
                );

                if self.deliver(account.chat_id, &release, cancel).await? {
                    report.notifications_sent += 1;
                } else {
                    report.notifications_dropped += 1;
                }
            }
        }

        if failures > 0 {
            tracing::warn!(
                user_id,
                failed = failures,
                total = artists.len(),
                "Sweep incomplete, watermark not advanced"
            );
            return Err(AppError::PartialSweep {
                failed: failures,
                total: artists.len(),
            });
        }

        Ok(report)
    }

    /// Send one notification, retrying once. Returns false if it was dropped.
    async fn deliver(
        &self,
        chat_id: i64,
        release: &Release,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        let first = match self.notifier.send(chat_id, release).await {
            Ok(()) => return Ok(true),
            Err(e) => e,
        };
        tracing::warn!(release_id = %release.id, error = %first, "Notification failed, retrying");

        self.pause(self.settings.notify_retry_delay, cancel).await?;

        match self.notifier.send(chat_id, release).await {
            Ok(()) => Ok(true),
            Err(e) => {
                tracing::error!(release_id = %release.id, error = %e, "Notification dropped");
                Ok(false)
            }
        }
    }

    /// Sleep unless cancelled first.
    async fn pause(&self, duration: Duration, cancel: &CancellationToken) -> Result<()> {
        tokio::select! {
            _ = cancel.cancelled() => Err(AppError::Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}

#[async_trait]
impl SweepRunner for PollRun {
    async fn run(
        &self,
        user_id: i64,
        start: WindowStart,
        cancel: CancellationToken,
    ) -> Result<SweepReport> {
        let lock = self
            .account_locks
            .entry(user_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let _guard = tokio::select! {
            _ = cancel.cancelled() => return Err(AppError::Cancelled),
            guard = lock.lock() => guard,
        };

        let account = self
            .store
            .load(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Account {}", user_id)))?;

        let window_start = match start {
            WindowStart::Watermark => account.last_check,
            WindowStart::Since(at) => at,
        };
        let window_end = self.clock.now();

        let long_enough = (window_end - window_start)
            .to_std()
            .is_ok_and(|gap| gap >= self.settings.min_sweep_gap);
        if !long_enough {
            tracing::debug!(
                user_id,
                window_start = %format_utc_rfc3339(window_start),
                "Checked recently, skipping sweep"
            );
            return Ok(SweepReport {
                throttled: true,
                ..SweepReport::default()
            });
        }

        tracing::info!(
            user_id,
            window_start = %format_utc_rfc3339(window_start),
            window_end = %format_utc_rfc3339(window_end),
            "Checking for new releases"
        );

        let mut tokens = TokenSupplier::new(self.tokens.clone(), account.token.clone());
        let result = self
            .sweep(&account, &mut tokens, window_start, window_end, &cancel)
            .await;

        // A window that starts after the watermark leaves a gap behind it, and
        // the watermark never moves backwards.
        let covers_watermark =
            result.is_ok() && window_start <= account.last_check && window_end > account.last_check;
        let token_update = tokens.pending_update();

        let mut advance = false;
        if covers_watermark || token_update.is_some() {
            // Edit the stored account as it is now: a reauthorization may have
            // replaced the credential or chat while the sweep ran.
            let change: AccountChange = Box::new(move |current: &mut Account| {
                if let Some(update) = token_update {
                    update.apply(current);
                }
                if covers_watermark && window_end > current.last_check {
                    current.last_check = window_end;
                }
            });

            match self.store.update(user_id, change).await {
                Ok(saved) => {
                    advance = covers_watermark
                        && saved.is_some_and(|saved| saved.last_check == window_end);
                }
                Err(e) => {
                    if result.is_ok() {
                        return Err(e);
                    }
                    tracing::error!(user_id, error = %e, "Failed to save refreshed token");
                }
            }
        }

        match result {
            Ok(mut report) => {
                report.watermark_advanced = advance;
                tracing::info!(
                    user_id,
                    artists = report.artists_checked,
                    releases = report.releases_found,
                    dropped = report.notifications_dropped,
                    "Finished checking for new releases"
                );
                Ok(report)
            }
            Err(e) => Err(e),
        }
    }
}
