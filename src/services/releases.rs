// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! New-release detection over a sweep window.

use crate::models::Release;
use chrono::{DateTime, Utc};

/// Select releases dated inside the half-open window `(start, end]`.
///
/// A release dated exactly at `start` was covered by the previous sweep; one
/// dated after `end` is not current yet. Input order is preserved.
pub fn select_new(
    releases: Vec<Release>,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
) -> Vec<Release> {
    releases
        .into_iter()
        .filter(|r| in_window(r.release_date, window_start, window_end))
        .collect()
}

/// Window membership test shared with callers that only have a date.
pub fn in_window(date: DateTime<Utc>, window_start: DateTime<Utc>, window_end: DateTime<Utc>) -> bool {
    window_start < date && date <= window_end
}
