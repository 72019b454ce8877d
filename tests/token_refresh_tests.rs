// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Spotify token endpoint contract tests.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Duration;
use release_notifier::config::Config;
use release_notifier::error::AppError;
use release_notifier::services::{SpotifyAuth, TokenLifecycle};
use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod common;
use common::*;

fn auth_for(server: &MockServer) -> SpotifyAuth {
    let mut config = Config::test_default();
    config.spotify_accounts_url = server.uri();
    SpotifyAuth::new(&config, reqwest::Client::new(), FixedClock::new(test_now()))
}

fn basic_auth() -> String {
    format!("Basic {}", STANDARD.encode("test_client_id:test_secret"))
}

#[tokio::test]
async fn test_refresh_keeps_refresh_token_when_not_rotated() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/token"))
        .and(header("authorization", basic_auth().as_str()))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=R1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "A2",
            "token_type": "Bearer",
            "scope": "user-follow-read",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&server)
        .await;

    let expired = token("A1", "R1", test_now() - Duration::seconds(1));
    let refreshed = auth_for(&server).ensure_valid(&expired).await.unwrap();

    assert_eq!(refreshed.access_token, "A2");
    assert_eq!(refreshed.refresh_token, "R1");
    assert_eq!(refreshed.expires_at, test_now() + Duration::seconds(3600));
}

#[tokio::test]
async fn test_refresh_takes_rotated_refresh_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "A2",
            "token_type": "Bearer",
            "expires_in": 3600,
            "refresh_token": "R2"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let expired = token("A1", "R1", test_now() - Duration::seconds(1));
    let refreshed = auth_for(&server).ensure_valid(&expired).await.unwrap();

    assert_eq!(refreshed.refresh_token, "R2");
    // Scope missing from the response is inherited.
    assert_eq!(refreshed.scope, "user-follow-read");
}

#[tokio::test]
async fn test_token_inside_margin_is_refreshed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "A2",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&server)
        .await;

    let nearly_expired = token("A1", "R1", test_now() + Duration::seconds(30));
    let refreshed = auth_for(&server)
        .ensure_valid(&nearly_expired)
        .await
        .unwrap();

    assert_eq!(refreshed.access_token, "A2");
}

#[tokio::test]
async fn test_valid_token_makes_no_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/token"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let valid = token("A1", "R1", test_now() + Duration::hours(1));
    let same = auth_for(&server).ensure_valid(&valid).await.unwrap();

    assert_eq!(same, valid);
}

#[tokio::test]
async fn test_refresh_rejected_is_token_refresh_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Refresh token revoked"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let expired = token("A1", "R1", test_now() - Duration::seconds(1));
    let err = auth_for(&server).ensure_valid(&expired).await.unwrap_err();

    assert!(matches!(err, AppError::TokenRefresh(_)));
    assert!(err.is_token_error());
}

#[tokio::test]
async fn test_refresh_with_bad_lifetime_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "A2",
            "expires_in": 0
        })))
        .mount(&server)
        .await;

    let expired = token("A1", "R1", test_now() - Duration::seconds(1));
    let err = auth_for(&server).ensure_valid(&expired).await.unwrap_err();

    assert!(matches!(err, AppError::TokenRefresh(_)));
}

#[tokio::test]
async fn test_exchange_code_creates_credential() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/token"))
        .and(header("authorization", basic_auth().as_str()))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=the-code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "A1",
            "token_type": "Bearer",
            "scope": "user-follow-read",
            "expires_in": 3600,
            "refresh_token": "R1"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let token = auth_for(&server).exchange_code("the-code").await.unwrap();

    assert_eq!(token.access_token, "A1");
    assert_eq!(token.refresh_token, "R1");
    assert_eq!(token.expires_at, test_now() + Duration::hours(1));
}

#[tokio::test]
async fn test_exchange_code_without_refresh_token_fails() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "A1",
            "expires_in": 3600
        })))
        .mount(&server)
        .await;

    let err = auth_for(&server).exchange_code("the-code").await.unwrap_err();

    assert!(matches!(err, AppError::CatalogApi(_)));
}
