// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Spotify OAuth authorization routes.
//!
//! The authorization code grant is a one-time bootstrap: it creates the
//! account and its first credential. Failures are reported to the caller and
//! never reach the scheduler.
//!
//! Only an admin can mint an authorization link, since the link decides which
//! chat the account's releases go to. Each signed `state` is accepted once.

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::Duration;
use dashmap::{mapref::entry::Entry, DashMap};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;

use crate::db::AccountChange;
use crate::error::{AppError, Result};
use crate::models::Account;
use crate::time_utils::format_utc_rfc3339;
use crate::AppState;

// Type alias for HMAC-SHA256
type HmacSha256 = Hmac<Sha256>;

/// How long a signed `state` stays valid.
const STATE_MAX_AGE_MS: i64 = 10 * 60 * 1000;

/// Public routes: Spotify redirects the user's browser here.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/auth/spotify/callback", get(auth_callback))
}

/// Admin routes. The bearer-token middleware is applied in routes/mod.rs.
pub fn admin_routes() -> Router<Arc<AppState>> {
    Router::new().route("/auth/spotify", get(auth_start))
}

/// Signed states that were already redeemed, with when they were redeemed.
#[derive(Default)]
pub struct UsedStates {
    used: DashMap<String, i64>,
}

impl UsedStates {
    /// Mark `state` as redeemed. Returns false if it already was.
    pub fn claim(&self, state: &str, now_ms: i64) -> bool {
        // Anything older than the max age fails verification anyway.
        self.used
            .retain(|_, redeemed_at| now_ms - *redeemed_at <= STATE_MAX_AGE_MS);

        match self.used.entry(state.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(now_ms);
                true
            }
        }
    }
}

/// Query parameters for starting the OAuth flow.
#[derive(Deserialize)]
pub struct AuthStartParams {
    user_id: i64,
    chat_id: i64,
}

/// A Spotify authorization link to hand to the user.
#[derive(Serialize)]
pub struct AuthLinkResponse {
    pub user_id: i64,
    pub chat_id: i64,
    pub url: String,
    pub expires_at: String,
}

/// Start OAuth flow - mint a signed Spotify authorization link.
async fn auth_start(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AuthStartParams>,
) -> Result<Json<AuthLinkResponse>> {
    let now = state.clock.now();
    let oauth_state = sign_state(
        &state.config.oauth_state_key,
        params.user_id,
        params.chat_id,
        now.timestamp_millis(),
    )?;

    tracing::info!(
        user_id = params.user_id,
        chat_id = params.chat_id,
        "Issued Spotify authorization link"
    );

    Ok(Json(AuthLinkResponse {
        user_id: params.user_id,
        chat_id: params.chat_id,
        url: state.spotify_auth.authorize_url(&oauth_state),
        expires_at: format_utc_rfc3339(now + Duration::milliseconds(STATE_MAX_AGE_MS)),
    }))
}

#[derive(Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    code: Option<String>,
    state: String,
    #[serde(default)]
    error: Option<String>,
}

/// OAuth callback - exchange code for tokens and create the account.
async fn auth_callback(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CallbackParams>,
) -> Result<&'static str> {
    let now = state.clock.now();
    let (user_id, chat_id) = verify_state(
        &state.config.oauth_state_key,
        &params.state,
        now.timestamp_millis(),
    )?;
    if !state
        .used_states
        .claim(&params.state, now.timestamp_millis())
    {
        tracing::warn!(user_id, "OAuth state replayed");
        return Err(AppError::BadRequest("OAuth state already used".to_string()));
    }

    if let Some(error) = params.error {
        tracing::warn!(user_id, error = %error, "User denied Spotify authorization");
        return Err(AppError::BadRequest(format!(
            "Authorization denied: {}",
            error
        )));
    }
    let code = params
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AppError::BadRequest("Missing authorization code".to_string()))?;

    let token = state.spotify_auth.exchange_code(&code).await?;

    // Re-authorizing keeps the watermark so nothing is announced twice.
    let credential = token.clone();
    let change: AccountChange = Box::new(move |existing: &mut Account| {
        existing.chat_id = chat_id;
        existing.token = credential;
    });
    if state.store.update(user_id, change).await?.is_none() {
        state
            .store
            .save(&Account {
                user_id,
                chat_id,
                token,
                last_check: now,
            })
            .await?;
    }

    if let Err(e) = state
        .notifier
        .send_text(chat_id, "Successful authentication")
        .await
    {
        tracing::warn!(user_id, error = %e, "Failed to send authentication confirmation");
    }

    tracing::info!(user_id, chat_id, "Account authorized");
    Ok("Authentication successful. You can close this window.")
}

/// Encode and sign `user_id|chat_id|issued_at_hex` for the OAuth `state`.
pub fn sign_state(key: &[u8], user_id: i64, chat_id: i64, issued_at_ms: i64) -> Result<String> {
    let payload = format!("{}|{}|{:x}", user_id, chat_id, issued_at_ms);
    let signature = hex::encode(mac(key, &payload)?.finalize().into_bytes());
    Ok(URL_SAFE_NO_PAD.encode(format!("{}|{}", payload, signature)))
}

/// Check a signed `state` and return `(user_id, chat_id)`.
pub fn verify_state(key: &[u8], state: &str, now_ms: i64) -> Result<(i64, i64)> {
    let invalid = || AppError::BadRequest("Invalid OAuth state".to_string());

    let bytes = URL_SAFE_NO_PAD.decode(state).map_err(|_| invalid())?;
    let decoded = String::from_utf8(bytes).map_err(|_| invalid())?;
    let (payload, signature) = decoded.rsplit_once('|').ok_or_else(invalid)?;

    let signature = hex::decode(signature).map_err(|_| invalid())?;
    mac(key, payload)?
        .verify_slice(&signature)
        .map_err(|_| invalid())?;

    let mut parts = payload.split('|');
    let user_id: i64 = parts.next().and_then(|p| p.parse().ok()).ok_or_else(invalid)?;
    let chat_id: i64 = parts.next().and_then(|p| p.parse().ok()).ok_or_else(invalid)?;
    let issued_at = parts
        .next()
        .and_then(|p| i64::from_str_radix(p, 16).ok())
        .ok_or_else(invalid)?;
    if parts.next().is_some() {
        return Err(invalid());
    }

    let age = now_ms - issued_at;
    if !(0..=STATE_MAX_AGE_MS).contains(&age) {
        return Err(AppError::BadRequest("OAuth state expired".to_string()));
    }

    Ok((user_id, chat_id))
}

fn mac(key: &[u8], payload: &str) -> Result<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("HMAC init failed: {}", e)))?;
    mac.update(payload.as_bytes());
    Ok(mac)
}
