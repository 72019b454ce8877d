// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type shared by the polling engine and HTTP handlers.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Spotify API error: {0}")]
    CatalogApi(String),

    #[error("Token refresh failed: {0}")]
    TokenRefresh(String),

    #[error("Pagination error: {0}")]
    Pagination(String),

    #[error("Telegram API error: {0}")]
    Messaging(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Sweep incomplete: {failed} of {total} artists could not be checked")]
    PartialSweep { failed: usize, total: usize },

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Message used when Spotify answers 429.
    pub const CATALOG_RATE_LIMIT: &'static str = "Rate limit exceeded";
    /// Message used when Spotify rejects the bearer token.
    pub const CATALOG_TOKEN_ERROR: &'static str = "Invalid or expired access token";

    /// True for the cooperative-cancellation error.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AppError::Cancelled)
    }

    /// True if Spotify rejected our credentials (refresh or bearer).
    pub fn is_token_error(&self) -> bool {
        match self {
            AppError::TokenRefresh(_) => true,
            AppError::CatalogApi(msg) => msg == Self::CATALOG_TOKEN_ERROR,
            _ => false,
        }
    }

    /// True if Spotify throttled the request.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, AppError::CatalogApi(msg) if msg == Self::CATALOG_RATE_LIMIT)
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", None),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            AppError::CatalogApi(msg) | AppError::TokenRefresh(msg) => {
                (StatusCode::BAD_GATEWAY, "spotify_error", Some(msg.clone()))
            }
            AppError::Messaging(msg) => {
                (StatusCode::BAD_GATEWAY, "telegram_error", Some(msg.clone()))
            }
            AppError::Storage(msg) => {
                tracing::error!(error = %msg, "Storage error");
                (StatusCode::INTERNAL_SERVER_ERROR, "storage_error", None)
            }
            AppError::Cancelled => (StatusCode::SERVICE_UNAVAILABLE, "cancelled", None),
            AppError::Pagination(_) | AppError::PartialSweep { .. } => {
                tracing::error!(error = %self, "Sweep error reached HTTP layer");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias used across the crate
pub type Result<T> = std::result::Result<T, AppError>;
