// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Spotify playback control for an account's active device.
//!
//! Playing an album starts it as the playback context. Queueing an album
//! lists its tracks and appends them one by one, stopping at the first
//! rejected track.

use crate::config::Config;
use crate::error::AppError;
use crate::services::pager::{status_error, Page, PagedReader};
use crate::services::token::TokenSupplier;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;

/// Page size for the album tracks listing (Spotify maximum).
const TRACKS_PAGE_LIMIT: u32 = 50;

/// Playback actions on the account's active device.
#[async_trait]
pub trait Player: Send + Sync {
    /// Start playing the album from its first track.
    async fn play_album(
        &self,
        album_id: &str,
        tokens: &mut TokenSupplier,
        cancel: &CancellationToken,
    ) -> Result<(), AppError>;

    /// Append every track of the album to the playback queue, in album
    /// order. Returns how many tracks were queued.
    async fn queue_album(
        &self,
        album_id: &str,
        tokens: &mut TokenSupplier,
        cancel: &CancellationToken,
    ) -> Result<usize, AppError>;
}

/// Spotify Web API player client.
#[derive(Clone)]
pub struct SpotifyPlayer {
    http: reqwest::Client,
    reader: PagedReader,
    api_url: String,
}

impl SpotifyPlayer {
    pub fn new(config: &Config, http: reqwest::Client) -> Self {
        Self {
            reader: PagedReader::new(http.clone(), config.max_pages),
            http,
            api_url: config.spotify_api_url.trim_end_matches('/').to_string(),
        }
    }

    /// Every track URI of the album, in album order.
    async fn album_tracks(
        &self,
        album_id: &str,
        tokens: &mut TokenSupplier,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, AppError> {
        let url = format!(
            "{}/albums/{}/tracks?limit={}",
            self.api_url,
            urlencoding::encode(album_id),
            TRACKS_PAGE_LIMIT
        );
        let tracks = self
            .reader
            .fetch_all::<TracksPage>(&url, tokens, cancel)
            .await?;
        Ok(tracks.into_iter().map(|t| t.uri).collect())
    }

    /// Send a player request and check the response status.
    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        tokens: &mut TokenSupplier,
        cancel: &CancellationToken,
    ) -> Result<(), AppError> {
        let access_token = tokens.access_token(cancel).await?;

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(AppError::Cancelled),
            response = request.bearer_auth(access_token).send() => {
                response.map_err(|e| AppError::CatalogApi(e.to_string()))?
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }
        Ok(())
    }
}

#[async_trait]
impl Player for SpotifyPlayer {
    async fn play_album(
        &self,
        album_id: &str,
        tokens: &mut TokenSupplier,
        cancel: &CancellationToken,
    ) -> Result<(), AppError> {
        let request = self
            .http
            .put(format!("{}/me/player/play", self.api_url))
            .json(&json!({ "context_uri": format!("spotify:album:{}", album_id) }));
        self.send(request, tokens, cancel).await?;

        tracing::info!(album_id, "Started album playback");
        Ok(())
    }

    async fn queue_album(
        &self,
        album_id: &str,
        tokens: &mut TokenSupplier,
        cancel: &CancellationToken,
    ) -> Result<usize, AppError> {
        let tracks = self.album_tracks(album_id, tokens, cancel).await?;

        for (queued, uri) in tracks.iter().enumerate() {
            let request = self.http.post(format!(
                "{}/me/player/queue?uri={}",
                self.api_url,
                urlencoding::encode(uri)
            ));
            if let Err(e) = self.send(request, tokens, cancel).await {
                tracing::warn!(album_id, queued, error = %e, "Failed to queue track");
                return Err(e);
            }
        }

        tracing::info!(album_id, tracks = tracks.len(), "Queued album");
        Ok(tracks.len())
    }
}

/// `GET /albums/{id}/tracks` page.
#[derive(Debug, Deserialize)]
struct TracksPage {
    items: Vec<SpotifyTrack>,
    next: Option<String>,
}

/// Simplified track object; only the URI is needed to queue it.
#[derive(Debug, Deserialize)]
struct SpotifyTrack {
    uri: String,
}

impl Page for TracksPage {
    type Item = SpotifyTrack;

    fn into_parts(self) -> (Vec<SpotifyTrack>, Option<String>) {
        (self.items, self.next)
    }
}
