// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod account;
pub mod release;

pub use account::{Account, OAuth2Token};
pub use release::{parse_release_date, Artist, DatePrecision, Release, ReleaseDateError};
