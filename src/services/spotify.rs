// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Spotify API clients.
//!
//! Handles:
//! - Authorization URL generation and code exchange (bootstrap)
//! - Token refresh, keeping the old refresh token when none is returned
//! - Followed-artist and artist-release listings via cursor pagination

use crate::config::Config;
use crate::error::AppError;
use crate::models::{
    parse_release_date, Artist, DatePrecision, OAuth2Token, Release, ReleaseDateError,
};
use crate::services::pager::{Page, PagedReader};
use crate::services::token::{TokenLifecycle, TokenSupplier};
use crate::time_utils::Clock;
use async_trait::async_trait;
use chrono::Duration;
use serde::Deserialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Margin before token expiration when we proactively refresh.
const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

/// Page size for list endpoints (Spotify maximum).
const PAGE_LIMIT: u32 = 50;

// ─────────────────────────────────────────────────────────────────────────────
// SpotifyAuth - token endpoint client
// ─────────────────────────────────────────────────────────────────────────────

/// Client for the Spotify accounts service.
#[derive(Clone)]
pub struct SpotifyAuth {
    http: reqwest::Client,
    accounts_url: String,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    scope: String,
    clock: Arc<dyn Clock>,
}

impl SpotifyAuth {
    pub fn new(config: &Config, http: reqwest::Client, clock: Arc<dyn Clock>) -> Self {
        Self {
            http,
            accounts_url: config.spotify_accounts_url.trim_end_matches('/').to_string(),
            client_id: config.spotify_client_id.clone(),
            client_secret: config.spotify_client_secret.clone(),
            redirect_uri: config.spotify_redirect_uri.clone(),
            scope: config.spotify_scope.clone(),
            clock,
        }
    }

    /// Build the URL the user visits to grant access.
    pub fn authorize_url(&self, state: &str) -> String {
        format!(
            "{}/authorize?client_id={}&response_type=code&redirect_uri={}&scope={}&state={}",
            self.accounts_url,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(&self.redirect_uri),
            urlencoding::encode(&self.scope),
            urlencoding::encode(state),
        )
    }

    /// Exchange an authorization code for the first credential.
    pub async fn exchange_code(&self, code: &str) -> Result<OAuth2Token, AppError> {
        let response = self
            .request_token(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.redirect_uri.as_str()),
            ])
            .await
            .map_err(|e| AppError::CatalogApi(format!("Token exchange failed: {}", e)))?;

        let token = self
            .to_token(response, None)
            .map_err(|e| AppError::CatalogApi(format!("Token exchange failed: {}", e)))?;

        tracing::info!(expires_at = %token.expires_at, "Authorization code exchanged");
        Ok(token)
    }

    /// Refresh `token` unconditionally.
    ///
    /// If Spotify does not rotate the refresh token, the old one is kept.
    pub async fn refresh(&self, token: &OAuth2Token) -> Result<OAuth2Token, AppError> {
        let response = self
            .request_token(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", token.refresh_token.as_str()),
            ])
            .await
            .map_err(AppError::TokenRefresh)?;

        self.to_token(response, Some(token))
            .map_err(AppError::TokenRefresh)
    }

    /// POST a grant to the token endpoint with Basic client authentication.
    async fn request_token(&self, form: &[(&str, &str)]) -> Result<TokenResponse, String> {
        let response = self
            .http
            .post(format!("{}/api/token", self.accounts_url))
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(form)
            .send()
            .await
            .map_err(|e| format!("request failed: {}", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Spotify token endpoint rejected grant");
            return Err(format!("HTTP {}: {}", status, body));
        }

        response
            .json()
            .await
            .map_err(|e| format!("malformed token response: {}", e))
    }

    /// Turn a token response into a credential, inheriting from `previous`
    /// whatever the response leaves out.
    fn to_token(
        &self,
        response: TokenResponse,
        previous: Option<&OAuth2Token>,
    ) -> Result<OAuth2Token, String> {
        if response.expires_in <= 0 {
            return Err(format!("non-positive expires_in {}", response.expires_in));
        }

        let refresh_token = match (response.refresh_token, previous) {
            (Some(new), _) if !new.is_empty() => new,
            (_, Some(prev)) => prev.refresh_token.clone(),
            (_, None) => return Err("response has no refresh_token".to_string()),
        };

        let scope = match (response.scope, previous) {
            (Some(s), _) if !s.is_empty() => s,
            (_, Some(prev)) => prev.scope.clone(),
            (_, None) => self.scope.clone(),
        };

        Ok(OAuth2Token {
            access_token: response.access_token,
            token_type: response.token_type.unwrap_or_else(|| "Bearer".to_string()),
            scope,
            expires_at: self.clock.now() + Duration::seconds(response.expires_in),
            refresh_token,
        })
    }
}

#[async_trait]
impl TokenLifecycle for SpotifyAuth {
    async fn ensure_valid(&self, token: &OAuth2Token) -> Result<OAuth2Token, AppError> {
        let margin = Duration::seconds(TOKEN_REFRESH_MARGIN_SECS);
        if !token.is_expired(self.clock.now(), margin) {
            return Ok(token.clone());
        }

        tracing::info!(expires_at = %token.expires_at, "Access token expired, refreshing");
        let refreshed = self.refresh(token).await?;
        tracing::info!(expires_at = %refreshed.expires_at, "Token refreshed");
        Ok(refreshed)
    }
}

/// Token endpoint response body.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    scope: Option<String>,
    expires_in: i64,
    #[serde(default)]
    refresh_token: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Catalog - followed artists and their releases
// ─────────────────────────────────────────────────────────────────────────────

/// The listings a sweep needs from the catalog.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Every followed artist, in listing order.
    async fn followed_artists(
        &self,
        tokens: &mut TokenSupplier,
        cancel: &CancellationToken,
    ) -> Result<Vec<Artist>, AppError>;

    /// Every release of `artist` matching the configured release groups.
    async fn artist_releases(
        &self,
        artist: &Artist,
        tokens: &mut TokenSupplier,
        cancel: &CancellationToken,
    ) -> Result<Vec<Release>, AppError>;
}

/// Spotify Web API catalog.
#[derive(Clone)]
pub struct SpotifyCatalog {
    reader: PagedReader,
    api_url: String,
    release_groups: String,
}

impl SpotifyCatalog {
    pub fn new(config: &Config, http: reqwest::Client) -> Self {
        Self {
            reader: PagedReader::new(http, config.max_pages),
            api_url: config.spotify_api_url.trim_end_matches('/').to_string(),
            release_groups: config.release_groups.clone(),
        }
    }
}

#[async_trait]
impl Catalog for SpotifyCatalog {
    async fn followed_artists(
        &self,
        tokens: &mut TokenSupplier,
        cancel: &CancellationToken,
    ) -> Result<Vec<Artist>, AppError> {
        let url = format!("{}/me/following?type=artist&limit={}", self.api_url, PAGE_LIMIT);
        self.reader
            .fetch_all::<FollowedArtistsPage>(&url, tokens, cancel)
            .await
    }

    async fn artist_releases(
        &self,
        artist: &Artist,
        tokens: &mut TokenSupplier,
        cancel: &CancellationToken,
    ) -> Result<Vec<Release>, AppError> {
        let url = format!(
            "{}/artists/{}/albums?include_groups={}&limit={}",
            self.api_url,
            urlencoding::encode(&artist.id),
            urlencoding::encode(&self.release_groups),
            PAGE_LIMIT
        );
        let albums = self
            .reader
            .fetch_all::<AlbumsPage>(&url, tokens, cancel)
            .await?;

        Ok(albums
            .into_iter()
            .filter_map(|album| match album.into_release() {
                Ok(release) => Some(release),
                Err(e) => {
                    tracing::warn!(artist_id = %artist.id, error = %e, "Skipping release with unusable date");
                    None
                }
            })
            .collect())
    }
}

/// `GET /me/following?type=artist` page.
#[derive(Debug, Deserialize)]
struct FollowedArtistsPage {
    artists: ArtistsCursor,
}

#[derive(Debug, Deserialize)]
struct ArtistsCursor {
    items: Vec<Artist>,
    next: Option<String>,
}

impl Page for FollowedArtistsPage {
    type Item = Artist;

    fn into_parts(self) -> (Vec<Artist>, Option<String>) {
        (self.artists.items, self.artists.next)
    }
}

/// `GET /artists/{id}/albums` page.
#[derive(Debug, Deserialize)]
struct AlbumsPage {
    items: Vec<SpotifyAlbum>,
    next: Option<String>,
}

impl Page for AlbumsPage {
    type Item = SpotifyAlbum;

    fn into_parts(self) -> (Vec<SpotifyAlbum>, Option<String>) {
        (self.items, self.next)
    }
}

/// Simplified album object as returned in listings.
#[derive(Debug, Deserialize)]
struct SpotifyAlbum {
    id: String,
    name: String,
    album_type: String,
    #[serde(default)]
    album_group: Option<String>,
    #[serde(default)]
    external_urls: ExternalUrls,
    uri: String,
    #[serde(default)]
    images: Vec<SpotifyImage>,
    // Kept loose so one odd item is skipped instead of failing the page.
    #[serde(default)]
    release_date: Option<String>,
    #[serde(default)]
    release_date_precision: Option<String>,
    #[serde(default)]
    artists: Vec<Artist>,
}

#[derive(Debug, Default, Deserialize)]
struct ExternalUrls {
    spotify: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SpotifyImage {
    url: String,
}

/// Why a listed album could not become a [`Release`].
#[derive(Debug, thiserror::Error)]
enum SkippedAlbum {
    #[error("missing release date")]
    MissingDate,
    #[error("{0}")]
    UnknownPrecision(String),
    #[error(transparent)]
    BadDate(#[from] ReleaseDateError),
}

impl SpotifyAlbum {
    fn into_release(self) -> Result<Release, SkippedAlbum> {
        let raw_date = self.release_date.ok_or(SkippedAlbum::MissingDate)?;
        let precision: DatePrecision = self
            .release_date_precision
            .as_deref()
            .ok_or(SkippedAlbum::MissingDate)?
            .parse()
            .map_err(SkippedAlbum::UnknownPrecision)?;
        let release_date = parse_release_date(&raw_date, precision)?;
        let url = self
            .external_urls
            .spotify
            .unwrap_or_else(|| format!("https://open.spotify.com/album/{}", self.id));

        Ok(Release {
            id: self.id,
            name: self.name,
            album_type: self.album_type,
            album_group: self.album_group,
            url,
            uri: self.uri,
            // Spotify lists images widest first.
            image_url: self.images.into_iter().next().map(|i| i.url),
            release_date,
            precision,
            artists: self.artists,
        })
    }
}
