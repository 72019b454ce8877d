// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared test doubles and fixtures.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use release_notifier::config::Config;
use release_notifier::db::{AccountChange, AccountStore, JsonFileStore};
use release_notifier::error::AppError;
use release_notifier::models::{Account, Artist, DatePrecision, OAuth2Token, Release};
use release_notifier::routes::create_router;
use release_notifier::services::{
    Catalog, NotificationDispatcher, PollScheduler, SchedulerHandle, SchedulerSettings,
    SpotifyAuth, SpotifyPlayer, SweepReport, SweepRunner, TokenLifecycle, TokenSupplier, WindowStart,
};
use release_notifier::time_utils::Clock;
use release_notifier::AppState;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// A fixed "now" used across tests.
pub fn test_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
}

// ─── Clock ───────────────────────────────────────────────────

/// Clock that only moves when told to.
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(now),
        })
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = now;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

// ─── Fixtures ────────────────────────────────────────────────

pub fn token(access: &str, refresh: &str, expires_at: DateTime<Utc>) -> OAuth2Token {
    OAuth2Token {
        access_token: access.to_string(),
        token_type: "Bearer".to_string(),
        scope: "user-follow-read".to_string(),
        expires_at,
        refresh_token: refresh.to_string(),
    }
}

/// Account with a valid token and the given watermark.
pub fn account(user_id: i64, last_check: DateTime<Utc>) -> Account {
    Account {
        user_id,
        chat_id: user_id * 100,
        token: token("valid", "R1", test_now() + Duration::hours(1)),
        last_check,
    }
}

pub fn artist(id: &str) -> Artist {
    Artist {
        id: id.to_string(),
        name: format!("Artist {}", id),
    }
}

pub fn release(id: &str, date: DateTime<Utc>) -> Release {
    Release {
        id: id.to_string(),
        name: format!("Release {}", id),
        album_type: "album".to_string(),
        album_group: Some("album".to_string()),
        url: format!("https://open.spotify.com/album/{}", id),
        uri: format!("spotify:album:{}", id),
        image_url: None,
        release_date: date,
        precision: DatePrecision::Day,
        artists: vec![artist("x")],
    }
}

// ─── Store ───────────────────────────────────────────────────

/// In-memory store that can be told to fail saves.
#[derive(Default)]
pub struct MemoryStore {
    accounts: Mutex<BTreeMap<i64, Account>>,
    fail_saves: Mutex<bool>,
}

impl MemoryStore {
    pub fn with(accounts: Vec<Account>) -> Arc<Self> {
        Arc::new(Self {
            accounts: Mutex::new(accounts.into_iter().map(|a| (a.user_id, a)).collect()),
            fail_saves: Mutex::new(false),
        })
    }

    pub fn fail_saves(&self, fail: bool) {
        *self.fail_saves.lock().unwrap() = fail;
    }

    pub fn get(&self, user_id: i64) -> Option<Account> {
        self.accounts.lock().unwrap().get(&user_id).cloned()
    }

    /// Replace an account outside of any store call.
    pub fn put(&self, account: Account) {
        self.accounts
            .lock()
            .unwrap()
            .insert(account.user_id, account);
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn load(&self, user_id: i64) -> Result<Option<Account>, AppError> {
        Ok(self.get(user_id))
    }

    async fn list(&self) -> Result<Vec<Account>, AppError> {
        Ok(self.accounts.lock().unwrap().values().cloned().collect())
    }

    async fn save(&self, account: &Account) -> Result<(), AppError> {
        if *self.fail_saves.lock().unwrap() {
            return Err(AppError::Storage("disk full".to_string()));
        }
        self.accounts
            .lock()
            .unwrap()
            .insert(account.user_id, account.clone());
        Ok(())
    }

    async fn update(
        &self,
        user_id: i64,
        change: AccountChange,
    ) -> Result<Option<Account>, AppError> {
        if *self.fail_saves.lock().unwrap() {
            return Err(AppError::Storage("disk full".to_string()));
        }
        let mut accounts = self.accounts.lock().unwrap();
        Ok(accounts.get_mut(&user_id).map(|account| {
            change(account);
            account.clone()
        }))
    }
}

// ─── Tokens ──────────────────────────────────────────────────

/// Refreshes any token whose access token is `"expired"`.
#[derive(Default)]
pub struct FakeTokens {
    pub fail: bool,
    pub refreshes: Mutex<usize>,
}

#[async_trait]
impl TokenLifecycle for FakeTokens {
    async fn ensure_valid(&self, token: &OAuth2Token) -> Result<OAuth2Token, AppError> {
        if token.access_token != "expired" {
            return Ok(token.clone());
        }
        if self.fail {
            return Err(AppError::TokenRefresh("HTTP 400: invalid_grant".to_string()));
        }
        *self.refreshes.lock().unwrap() += 1;
        Ok(OAuth2Token {
            access_token: "fresh".to_string(),
            expires_at: test_now() + Duration::hours(1),
            ..token.clone()
        })
    }
}

// ─── Catalog ─────────────────────────────────────────────────

/// Catalog serving canned listings and recording what was asked.
#[derive(Default)]
pub struct FakeCatalog {
    pub artists: Vec<Artist>,
    /// Releases by artist id; artists missing here fail.
    pub releases: HashMap<String, Vec<Release>>,
    pub fail_following: bool,
    /// Cancel the sweep right after this artist's releases are fetched.
    pub cancel_after: Option<String>,
    /// Answer this artist's listing as if the access token was revoked.
    pub revoked: Option<String>,
    /// Runs once while the followed artists are listed.
    pub on_following: Mutex<Option<Box<dyn FnOnce() + Send>>>,
    pub requested: Mutex<Vec<String>>,
}

impl FakeCatalog {
    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl Catalog for FakeCatalog {
    async fn followed_artists(
        &self,
        tokens: &mut TokenSupplier,
        cancel: &CancellationToken,
    ) -> Result<Vec<Artist>, AppError> {
        tokens.access_token(cancel).await?;
        if let Some(hook) = self.on_following.lock().unwrap().take() {
            hook();
        }
        if self.fail_following {
            return Err(AppError::CatalogApi("HTTP 503: unavailable".to_string()));
        }
        Ok(self.artists.clone())
    }

    async fn artist_releases(
        &self,
        artist: &Artist,
        tokens: &mut TokenSupplier,
        cancel: &CancellationToken,
    ) -> Result<Vec<Release>, AppError> {
        tokens.access_token(cancel).await?;
        self.requested.lock().unwrap().push(artist.id.clone());

        if self.revoked.as_deref() == Some(artist.id.as_str()) {
            return Err(AppError::CatalogApi(AppError::CATALOG_TOKEN_ERROR.to_string()));
        }

        if self.cancel_after.as_deref() == Some(artist.id.as_str()) {
            cancel.cancel();
        }

        self.releases
            .get(&artist.id)
            .cloned()
            .ok_or_else(|| AppError::CatalogApi("HTTP 500: boom".to_string()))
    }
}

// ─── Notifier ────────────────────────────────────────────────

/// Notifier that records deliveries and can fail a release a number of times.
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(i64, String)>>,
    pub texts: Mutex<Vec<(i64, String)>>,
    pub attempts: Mutex<HashMap<String, usize>>,
    /// Release id → how many attempts fail before one succeeds.
    pub failures: Mutex<HashMap<String, usize>>,
}

impl RecordingNotifier {
    pub fn fail(&self, release_id: &str, times: usize) {
        self.failures
            .lock()
            .unwrap()
            .insert(release_id.to_string(), times);
    }

    pub fn sent_ids(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, id)| id.clone())
            .collect()
    }

    pub fn attempts(&self, release_id: &str) -> usize {
        self.attempts
            .lock()
            .unwrap()
            .get(release_id)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingNotifier {
    async fn send(&self, chat_id: i64, release: &Release) -> Result<(), AppError> {
        *self
            .attempts
            .lock()
            .unwrap()
            .entry(release.id.clone())
            .or_default() += 1;

        let mut failures = self.failures.lock().unwrap();
        if let Some(remaining) = failures.get_mut(&release.id) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(AppError::Messaging("HTTP 502: bad gateway".to_string()));
            }
        }
        drop(failures);

        self.sent.lock().unwrap().push((chat_id, release.id.clone()));
        Ok(())
    }

    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), AppError> {
        self.texts.lock().unwrap().push((chat_id, text.to_string()));
        Ok(())
    }
}

// ─── Sweep runner ────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepEvent {
    Started(i64, WindowStart),
    Finished(i64, WindowStart, bool),
}

/// Runner that records sweeps. When `block` is set, each sweep runs until
/// it is cancelled.
#[derive(Default)]
pub struct RecordingRunner {
    pub block: bool,
    pub events: Mutex<Vec<SweepEvent>>,
}

impl RecordingRunner {
    pub fn blocking() -> Arc<Self> {
        Arc::new(Self {
            block: true,
            events: Mutex::new(Vec::new()),
        })
    }

    pub fn events(&self) -> Vec<SweepEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Wait until `pred` holds for the recorded events.
    pub async fn wait_for(&self, pred: impl Fn(&[SweepEvent]) -> bool) {
        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            loop {
                if pred(&self.events()) {
                    return;
                }
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("timed out waiting for sweep events");
    }
}

#[async_trait]
impl SweepRunner for RecordingRunner {
    async fn run(
        &self,
        user_id: i64,
        start: WindowStart,
        cancel: CancellationToken,
    ) -> Result<SweepReport, AppError> {
        self.events
            .lock()
            .unwrap()
            .push(SweepEvent::Started(user_id, start));

        if self.block {
            cancel.cancelled().await;
        }

        let cancelled = cancel.is_cancelled();
        self.events
            .lock()
            .unwrap()
            .push(SweepEvent::Finished(user_id, start, cancelled));

        if cancelled {
            Err(AppError::Cancelled)
        } else {
            Ok(SweepReport::default())
        }
    }
}

// ─── App ─────────────────────────────────────────────────────

/// A test app and handles to its doubles.
pub struct TestApp {
    pub router: axum::Router,
    pub state: Arc<AppState>,
    pub store: Arc<JsonFileStore>,
    pub runner: Arc<RecordingRunner>,
    pub notifier: Arc<RecordingNotifier>,
    pub clock: Arc<FixedClock>,
    pub scheduler: SchedulerHandle,
    _dir: tempfile::TempDir,
}

/// Create a test app backed by a temporary JSON store.
pub async fn create_test_app() -> TestApp {
    create_test_app_with(Config::test_default()).await
}

pub async fn create_test_app_with(mut config: Config) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    config.data_file = dir
        .path()
        .join("accounts.json")
        .to_string_lossy()
        .into_owned();

    let store = Arc::new(JsonFileStore::open(&config.data_file).await.unwrap());
    let clock = FixedClock::new(test_now());
    let notifier = Arc::new(RecordingNotifier::default());
    let runner = Arc::new(RecordingRunner::default());

    let scheduler = PollScheduler::spawn(
        runner.clone(),
        store.clone(),
        SchedulerSettings {
            interval: std::time::Duration::from_secs(3600),
            sweep_timeout: std::time::Duration::from_secs(60),
        },
    );

    let state = Arc::new(AppState {
        spotify_auth: SpotifyAuth::new(&config, reqwest::Client::new(), clock.clone()),
        player: Arc::new(SpotifyPlayer::new(&config, reqwest::Client::new())),
        config,
        store: store.clone(),
        notifier: notifier.clone(),
        scheduler: scheduler.clone(),
        clock: clock.clone(),
        used_states: Default::default(),
    });

    TestApp {
        router: create_router(state.clone()),
        state,
        store,
        runner,
        notifier,
        clock,
        scheduler,
        _dir: dir,
    }
}
