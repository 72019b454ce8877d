// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! A `.env` file in the working directory is honored for local development.

use crate::services::pager::DEFAULT_MAX_PAGES;
use std::env;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_ACCOUNTS_URL: &str = "https://accounts.spotify.com";
const DEFAULT_API_URL: &str = "https://api.spotify.com/v1";
const DEFAULT_TELEGRAM_URL: &str = "https://api.telegram.org";

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Spotify ---
    /// Spotify OAuth client ID (public)
    pub spotify_client_id: String,
    /// Spotify OAuth client secret
    pub spotify_client_secret: String,
    /// Redirect URI registered with the Spotify app
    pub spotify_redirect_uri: String,
    /// Space-separated OAuth scopes
    pub spotify_scope: String,
    /// Base URL of the Spotify accounts service (token + authorize)
    pub spotify_accounts_url: String,
    /// Base URL of the Spotify Web API, including the `/v1` prefix
    pub spotify_api_url: String,
    /// Value for the `include_groups` release filter
    pub release_groups: String,

    // --- Telegram ---
    pub telegram_bot_token: String,
    pub telegram_api_url: String,

    // --- Server ---
    pub port: u16,
    /// Bearer token required on admin routes
    pub admin_token: String,
    /// HMAC key for signing the OAuth `state` parameter
    pub oauth_state_key: Vec<u8>,

    // --- Storage ---
    pub data_file: String,

    // --- Polling ---
    pub poll_interval: Duration,
    pub artist_delay: Duration,
    pub sweep_timeout: Duration,
    pub min_sweep_gap: Duration,
    pub max_pages: usize,
}

impl Config {
    /// Default config for testing only.
    pub fn test_default() -> Self {
        Self {
            spotify_client_id: "test_client_id".to_string(),
            spotify_client_secret: "test_secret".to_string(),
            spotify_redirect_uri: "http://localhost:8080/auth/spotify/callback".to_string(),
            spotify_scope: "user-follow-read".to_string(),
            spotify_accounts_url: DEFAULT_ACCOUNTS_URL.to_string(),
            spotify_api_url: DEFAULT_API_URL.to_string(),
            release_groups: "album,single".to_string(),
            telegram_bot_token: "test_bot_token".to_string(),
            telegram_api_url: DEFAULT_TELEGRAM_URL.to_string(),
            port: 8080,
            admin_token: "test_admin_token".to_string(),
            oauth_state_key: b"test_state_key_32_bytes_minimum!".to_vec(),
            data_file: "data/accounts.json".to_string(),
            poll_interval: Duration::from_secs(3600),
            artist_delay: Duration::from_millis(1000),
            sweep_timeout: Duration::from_secs(1800),
            min_sweep_gap: Duration::from_secs(60),
            max_pages: DEFAULT_MAX_PAGES,
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Ok(Self {
            spotify_client_id: required("SPOTIFY_CLIENT_ID")?,
            spotify_client_secret: required("SPOTIFY_CLIENT_SECRET")?,
            spotify_redirect_uri: env::var("SPOTIFY_REDIRECT_URI").unwrap_or_else(|_| {
                "http://localhost:8080/auth/spotify/callback".to_string()
            }),
            spotify_scope: env::var("SPOTIFY_SCOPE")
                .unwrap_or_else(|_| "user-follow-read".to_string()),
            spotify_accounts_url: env::var("SPOTIFY_ACCOUNTS_URL")
                .unwrap_or_else(|_| DEFAULT_ACCOUNTS_URL.to_string()),
            spotify_api_url: env::var("SPOTIFY_API_URL")
                .unwrap_or_else(|_| DEFAULT_API_URL.to_string()),
            release_groups: env::var("RELEASE_GROUPS")
                .unwrap_or_else(|_| "album,single".to_string()),

            telegram_bot_token: required("TELEGRAM_BOT_TOKEN")?,
            telegram_api_url: env::var("TELEGRAM_API_URL")
                .unwrap_or_else(|_| DEFAULT_TELEGRAM_URL.to_string()),

            port: parsed("PORT", 8080)?,
            admin_token: required("ADMIN_TOKEN")?,
            oauth_state_key: required("OAUTH_STATE_KEY")?.into_bytes(),

            data_file: env::var("DATA_FILE").unwrap_or_else(|_| "data/accounts.json".to_string()),

            poll_interval: Duration::from_secs(parsed("POLL_INTERVAL_SECS", 3600)?),
            artist_delay: Duration::from_millis(parsed("ARTIST_DELAY_MS", 1000)?),
            sweep_timeout: Duration::from_secs(parsed("SWEEP_TIMEOUT_SECS", 1800)?),
            min_sweep_gap: Duration::from_secs(parsed("MIN_SWEEP_GAP_SECS", 60)?),
            max_pages: parsed("MAX_PAGES", DEFAULT_MAX_PAGES)?,
        })
    }
}

/// Read a required variable, trimming stray whitespace from secret bindings.
fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .map(|v| v.trim().to_string())
        .map_err(|_| ConfigError::Missing(name))
}

/// Read an optional numeric variable, falling back to `default` when unset.
fn parsed<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(name, raw)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1:?}")]
    Invalid(&'static str, String),
}
