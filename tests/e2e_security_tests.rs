//! End-to-end tests for the security middleware
//!
//! Tests hardening headers, per-IP rate limiting and CSRF enforcement.

mod common;

use chathub_admin_server::security::{RateLimitPolicy, SECURITY_HEADERS};
use common::{TestClient, TestServer, TestServerOptions, COMPANY_1_ID};
use reqwest::StatusCode;
use serde_json::{json, Value};

fn strict_server_options() -> TestServerOptions {
    TestServerOptions {
        enforce_csrf: true,
        ..TestServerOptions::default()
    }
}

#[tokio::test]
async fn test_security_headers_on_every_response() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    for response in [
        client.get_home().await,
        client.list_backups().await,
        client.get_csrf_token().await,
    ] {
        for (name, value) in SECURITY_HEADERS {
            assert_eq!(
                response.headers()[*name],
                *value,
                "{} on {}",
                name,
                response.url()
            );
        }
    }
}

#[tokio::test]
async fn test_rate_limit_is_per_client_ip() {
    let server = TestServer::spawn_with(TestServerOptions {
        rate_limit: RateLimitPolicy {
            max_requests: 3,
            ..RateLimitPolicy::default()
        },
        ..TestServerOptions::default()
    })
    .await;
    let noisy = TestClient::authenticated_admin(&server).forwarded_for("203.0.113.7");
    let quiet = TestClient::authenticated_admin(&server).forwarded_for("203.0.113.8");

    for expected_remaining in ["2", "1", "0"] {
        let response = noisy.list_cache_clear_jobs().await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-ratelimit-remaining"], expected_remaining);
    }

    let response = noisy.list_cache_clear_jobs().await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers()["retry-after"], "3600");
    assert_eq!(response.headers()["x-ratelimit-remaining"], "0");
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], false);

    // Blocked clients stay blocked even on routes they have not hit yet.
    let response = noisy.list_backups().await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    let response = quiet.list_cache_clear_jobs().await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-ratelimit-remaining"], "2");

    // The home page sits outside the limited routes.
    let response = noisy.get_home().await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_csrf_token_requires_session() {
    let server = TestServer::spawn().await;

    let anonymous = TestClient::new(server.base_url.clone());
    let response = anonymous.get_csrf_token().await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let member = TestClient::authenticated_member(&server);
    let response = member.get_csrf_token().await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert!(body["csrfToken"].as_str().is_some_and(|t| !t.is_empty()));
    assert!(body["expiresAt"].is_string());
}

#[tokio::test]
async fn test_missing_csrf_token_is_tolerated_when_not_enforced() {
    let server = TestServer::spawn().await;
    let client = TestClient::authenticated_admin(&server);

    let response = client.cleanup_backups().await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_enforced_csrf_blocks_mutations_without_token() {
    let server = TestServer::spawn_with(strict_server_options()).await;
    let client = TestClient::authenticated_admin(&server);

    let response = client.soft_delete("company", COMPANY_1_ID).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], false);

    let response = client.start_cache_clear(json!({})).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Reads are never checked.
    let response = client.list_backups().await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_enforced_csrf_accepts_issued_token() {
    let server = TestServer::spawn_with(strict_server_options()).await;
    let mut client = TestClient::authenticated_admin(&server);
    client.acquire_csrf_token().await;

    let response = client.soft_delete("company", COMPANY_1_ID).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = client.cleanup_backups().await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_enforced_csrf_rejects_token_of_another_user() {
    let server = TestServer::spawn_with(strict_server_options()).await;

    let mut member = TestClient::authenticated_member(&server);
    let member_csrf = member.acquire_csrf_token().await;

    let admin = TestClient::authenticated_admin(&server);
    let response = admin
        .client
        .post(format!("{}/v1/admin/backup-management", server.base_url))
        .header("Cookie", format!("session_token={}", server.admin_token))
        .header("X-CSRF-Token", member_csrf)
        .json(&json!({ "action": "cleanup" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_enforced_csrf_reads_token_from_form_body() {
    let server = TestServer::spawn_with(strict_server_options()).await;
    let mut client = TestClient::authenticated_admin(&server);
    let csrf = client.acquire_csrf_token().await;

    // Without the header the form field alone has to carry the token. The
    // handler then rejects the non-JSON body, which proves the check passed.
    let response = client
        .client
        .post(format!("{}/v1/admin/backup-management", server.base_url))
        .header("Cookie", format!("session_token={}", server.admin_token))
        .header("Content-Type", "application/x-www-form-urlencoded")
        .body(format!("action=cleanup&csrf_token={}", urlencoding::encode(&csrf)))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = client
        .client
        .post(format!("{}/v1/admin/backup-management", server.base_url))
        .header("Cookie", format!("session_token={}", server.admin_token))
        .header("Content-Type", "application/x-www-form-urlencoded")
        .body("action=cleanup&csrf_token=forged")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_revoked_csrf_token_stops_working() {
    let server = TestServer::spawn_with(strict_server_options()).await;
    let mut client = TestClient::authenticated_admin(&server);
    client.acquire_csrf_token().await;

    let response = client.revoke_csrf_token().await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["revoked"], true);

    let response = client.cleanup_backups().await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
