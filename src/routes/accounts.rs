// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Admin routes for inspecting accounts and forcing checks.

use crate::error::{AppError, Result};
use crate::models::Account;
use crate::services::TokenSupplier;
use crate::time_utils::format_utc_rfc3339;
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const DEFAULT_CHECK_DAYS: i64 = 7;
const MAX_CHECK_DAYS: i64 = 365;

/// Admin routes. The bearer-token middleware is applied in routes/mod.rs.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/accounts", get(list_accounts))
        .route("/accounts/{user_id}/check", post(force_check))
        .route("/accounts/{user_id}/play/{album_id}", post(play_album))
        .route("/accounts/{user_id}/queue/{album_id}", post(queue_album))
}

/// Account summary; never includes token material.
#[derive(Serialize)]
pub struct AccountSummary {
    pub user_id: i64,
    pub chat_id: i64,
    pub last_check: String,
    pub token_expires_at: String,
}

async fn list_accounts(State(state): State<Arc<AppState>>) -> Result<Json<Vec<AccountSummary>>> {
    let accounts = state.store.list().await?;

    Ok(Json(
        accounts
            .into_iter()
            .map(|a| AccountSummary {
                user_id: a.user_id,
                chat_id: a.chat_id,
                last_check: format_utc_rfc3339(a.last_check),
                token_expires_at: format_utc_rfc3339(a.token.expires_at),
            })
            .collect(),
    ))
}

#[derive(Deserialize)]
pub struct CheckParams {
    #[serde(default)]
    days: Option<i64>,
}

#[derive(Serialize)]
pub struct CheckResponse {
    pub user_id: i64,
    pub since: String,
}

/// Force a check over the last `days` days, replacing any running sweep.
async fn force_check(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
    Query(params): Query<CheckParams>,
) -> Result<(StatusCode, Json<CheckResponse>)> {
    let days = params.days.unwrap_or(DEFAULT_CHECK_DAYS);
    if !(1..=MAX_CHECK_DAYS).contains(&days) {
        return Err(AppError::BadRequest(format!(
            "days must be between 1 and {}",
            MAX_CHECK_DAYS
        )));
    }

    if state.store.load(user_id).await?.is_none() {
        return Err(AppError::NotFound(format!("Account {} not found", user_id)));
    }

    let since = state.clock.now() - Duration::days(days);
    state.scheduler.force_check(user_id, since).await?;

    tracing::info!(user_id, days, "Forced check scheduled");

    Ok((
        StatusCode::ACCEPTED,
        Json(CheckResponse {
            user_id,
            since: format_utc_rfc3339(since),
        }),
    ))
}

#[derive(Serialize)]
pub struct QueueResponse {
    pub user_id: i64,
    pub album_id: String,
    pub queued: usize,
}

/// Play an album on the account's active Spotify device.
async fn play_album(
    State(state): State<Arc<AppState>>,
    Path((user_id, album_id)): Path<(i64, String)>,
) -> Result<StatusCode> {
    check_album_id(&album_id)?;
    let account = load_account(&state, user_id).await?;

    let mut tokens = TokenSupplier::new(Arc::new(state.spotify_auth.clone()), account.token);
    let result = state
        .player
        .play_album(&album_id, &mut tokens, &CancellationToken::new())
        .await;
    save_refreshed_token(&state, user_id, &tokens).await;
    result?;

    Ok(StatusCode::NO_CONTENT)
}

/// Append an album's tracks to the account's playback queue.
async fn queue_album(
    State(state): State<Arc<AppState>>,
    Path((user_id, album_id)): Path<(i64, String)>,
) -> Result<Json<QueueResponse>> {
    check_album_id(&album_id)?;
    let account = load_account(&state, user_id).await?;

    let mut tokens = TokenSupplier::new(Arc::new(state.spotify_auth.clone()), account.token);
    let result = state
        .player
        .queue_album(&album_id, &mut tokens, &CancellationToken::new())
        .await;
    save_refreshed_token(&state, user_id, &tokens).await;

    Ok(Json(QueueResponse {
        user_id,
        album_id,
        queued: result?,
    }))
}

async fn load_account(state: &AppState, user_id: i64) -> Result<Account> {
    state
        .store
        .load(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Account {} not found", user_id)))
}

/// Spotify IDs are base62.
fn check_album_id(album_id: &str) -> Result<()> {
    if album_id.is_empty() || !album_id.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(AppError::BadRequest(format!("Invalid album ID: {}", album_id)));
    }
    Ok(())
}

/// Persist a token refreshed during a player request.
async fn save_refreshed_token(state: &AppState, user_id: i64, tokens: &TokenSupplier) {
    let Some(update) = tokens.pending_update() else {
        return;
    };
    let change = Box::new(move |account: &mut Account| {
        update.apply(account);
    });
    if let Err(e) = state.store.update(user_id, change).await {
        tracing::error!(user_id, error = %e, "Failed to save refreshed token");
    }
}
