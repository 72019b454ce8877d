// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Release Notifier: watch followed Spotify artists for new releases
//!
//! This crate polls the Spotify Web API on behalf of a few authorized
//! accounts and announces each new release in a Telegram chat.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::AccountStore;
use routes::auth::UsedStates;
use services::{NotificationDispatcher, Player, SchedulerHandle, SpotifyAuth};
use std::sync::Arc;
use time_utils::Clock;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn AccountStore>,
    pub spotify_auth: SpotifyAuth,
    pub notifier: Arc<dyn NotificationDispatcher>,
    pub player: Arc<dyn Player>,
    pub scheduler: SchedulerHandle,
    pub clock: Arc<dyn Clock>,
    /// OAuth states already redeemed at the callback.
    pub used_states: UsedStates,
}
