// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Catalog models: artists and their releases.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A followed artist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artist {
    pub id: String,
    pub name: String,
}

/// Granularity at which Spotify knows a release date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatePrecision {
    Day,
    Month,
    Year,
}

impl std::str::FromStr for DatePrecision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "day" => Ok(DatePrecision::Day),
            "month" => Ok(DatePrecision::Month),
            "year" => Ok(DatePrecision::Year),
            other => Err(format!("unknown date precision {:?}", other)),
        }
    }
}

/// A release (album, single, ...) with its date normalized to an instant.
#[derive(Debug, Clone, PartialEq)]
pub struct Release {
    pub id: String,
    pub name: String,
    pub album_type: String,
    pub album_group: Option<String>,
    /// Public web URL
    pub url: String,
    /// `spotify:album:...` URI
    pub uri: String,
    pub image_url: Option<String>,
    /// Start of the day/month/year the release is dated at, UTC
    pub release_date: DateTime<Utc>,
    pub precision: DatePrecision,
    pub artists: Vec<Artist>,
}

impl Release {
    /// Artist names joined for display.
    pub fn artist_names(&self) -> String {
        self.artists
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Error for release dates that do not match their declared precision.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {precision:?} release date {value:?}")]
pub struct ReleaseDateError {
    pub value: String,
    pub precision: DatePrecision,
}

/// Normalize a `(date, precision)` pair to midnight UTC of the earliest day it
/// can denote. A coarser precision can only move the instant earlier.
pub fn parse_release_date(
    value: &str,
    precision: DatePrecision,
) -> Result<DateTime<Utc>, ReleaseDateError> {
    let err = || ReleaseDateError {
        value: value.to_string(),
        precision,
    };

    let date = match precision {
        DatePrecision::Day => NaiveDate::parse_from_str(value, "%Y-%m-%d").ok(),
        DatePrecision::Month => {
            let (year, month) = value.split_once('-').ok_or_else(err)?;
            if month.len() != 2 {
                return Err(err());
            }
            let year = parse_year(year).ok_or_else(err)?;
            let month: u32 = month.parse().map_err(|_| err())?;
            NaiveDate::from_ymd_opt(year, month, 1)
        }
        DatePrecision::Year => {
            let year = parse_year(value).ok_or_else(err)?;
            NaiveDate::from_ymd_opt(year, 1, 1)
        }
    };

    date.and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(err)
}

fn parse_year(value: &str) -> Option<i32> {
    if value.len() != 4 || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    value.parse().ok()
}
