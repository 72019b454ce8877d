// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Follow-the-cursor page reader for Spotify list endpoints.
//!
//! Each page names the next one by absolute URL; a page without a next URL is
//! the last. Any failure aborts the whole fetch and discards what was read.

use crate::error::AppError;
use crate::services::token::TokenSupplier;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

/// Upper bound on pages per fetch, in case the upstream loops its cursors.
pub const DEFAULT_MAX_PAGES: usize = 200;

/// One decoded page of a cursor-paginated listing.
pub trait Page: DeserializeOwned + Send {
    type Item: Send;

    /// Split into this page's records and the next page URL, if any.
    fn into_parts(self) -> (Vec<Self::Item>, Option<String>);
}

/// Reads every page of a listing.
#[derive(Clone)]
pub struct PagedReader {
    http: reqwest::Client,
    max_pages: usize,
}

impl PagedReader {
    pub fn new(http: reqwest::Client, max_pages: usize) -> Self {
        Self { http, max_pages }
    }

    /// Fetch `first_url` and every page after it, concatenating records in
    /// page order.
    ///
    /// A bearer token is taken from `tokens` before every request, and
    /// cancellation is checked before and during every request.
    pub async fn fetch_all<P: Page>(
        &self,
        first_url: &str,
        tokens: &mut TokenSupplier,
        cancel: &CancellationToken,
    ) -> Result<Vec<P::Item>, AppError> {
        let mut records = Vec::new();
        let mut next = Some(first_url.to_string());
        let mut pages = 0usize;

        while let Some(url) = next.take() {
            if cancel.is_cancelled() {
                return Err(AppError::Cancelled);
            }
            if pages >= self.max_pages {
                return Err(AppError::Pagination(format!(
                    "Exceeded {} pages starting at {}",
                    self.max_pages, first_url
                )));
            }

            let access_token = tokens.access_token(cancel).await?;

            let page: P = tokio::select! {
                _ = cancel.cancelled() => return Err(AppError::Cancelled),
                page = self.get_page(&url, &access_token) => page?,
            };
            pages += 1;

            let (items, next_url) = page.into_parts();
            tracing::trace!(url = %url, count = items.len(), "Fetched page");
            records.extend(items);
            next = next_url;
        }

        tracing::debug!(url = %first_url, pages, count = records.len(), "Fetched all pages");
        Ok(records)
    }

    /// GET one page and decode it.
    async fn get_page<P: Page>(&self, url: &str, access_token: &str) -> Result<P, AppError> {
        let response = self
            .http
            .get(url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AppError::CatalogApi(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| AppError::CatalogApi(format!("Failed to read body: {}", e)))?;

        serde_json::from_slice(&body)
            .map_err(|e| AppError::Pagination(format!("Undecodable page from {}: {}", url, e)))
    }
}

/// Classify a failed Web API response.
pub(crate) fn status_error(status: reqwest::StatusCode, body: &str) -> AppError {
    match status.as_u16() {
        429 => {
            tracing::warn!("Spotify rate limit hit (429)");
            AppError::CatalogApi(AppError::CATALOG_RATE_LIMIT.to_string())
        }
        401 => AppError::CatalogApi(AppError::CATALOG_TOKEN_ERROR.to_string()),
        _ => AppError::CatalogApi(format!("HTTP {}: {}", status, body)),
    }
}
