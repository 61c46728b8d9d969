//! HTTP client for end-to-end tests
//!
//! Wraps reqwest and provides one method per admin endpoint.
//! When API routes or request formats change, update only this file.

use super::constants::*;
use super::server::TestServer;
use reqwest::{RequestBuilder, Response};
use serde_json::{json, Value};
use std::time::{Duration, Instant};

/// HTTP test client carrying an optional session cookie
pub struct TestClient {
    /// The underlying reqwest client (public for custom requests in tests)
    pub client: reqwest::Client,
    /// The base URL of the test server
    pub base_url: String,
    session_token: Option<String>,
    csrf_token: Option<String>,
    forwarded_for: Option<String>,
}

impl TestClient {
    /// Creates an unauthenticated client
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build reqwest client");

        Self {
            client,
            base_url,
            session_token: None,
            csrf_token: None,
            forwarded_for: None,
        }
    }

    /// Creates a client sending the given token as the session cookie
    pub fn with_token(base_url: String, token: &str) -> Self {
        let mut client = Self::new(base_url);
        client.session_token = Some(token.to_string());
        client
    }

    /// Creates a client authenticated as the seeded admin user
    pub fn authenticated_admin(server: &TestServer) -> Self {
        Self::with_token(server.base_url.clone(), &server.admin_token)
    }

    /// Creates a client authenticated as the seeded non-admin user
    #[allow(dead_code)]
    pub fn authenticated_member(server: &TestServer) -> Self {
        Self::with_token(server.base_url.clone(), &server.member_token)
    }

    /// Makes every request appear to come from `ip`
    #[allow(dead_code)]
    pub fn forwarded_for(mut self, ip: &str) -> Self {
        self.forwarded_for = Some(ip.to_string());
        self
    }

    fn prepare(&self, builder: RequestBuilder) -> RequestBuilder {
        let mut builder = builder;
        if let Some(token) = &self.session_token {
            builder = builder.header("Cookie", format!("session_token={}", token));
        }
        if let Some(csrf) = &self.csrf_token {
            builder = builder.header("X-CSRF-Token", csrf);
        }
        if let Some(ip) = &self.forwarded_for {
            builder = builder.header("X-Forwarded-For", ip);
        }
        builder
    }

    async fn send(&self, builder: RequestBuilder, what: &str) -> Response {
        self.prepare(builder)
            .send()
            .await
            .unwrap_or_else(|e| panic!("{} request failed: {}", what, e))
    }

    // ========================================================================
    // Server
    // ========================================================================

    /// GET /
    #[allow(dead_code)]
    pub async fn get_home(&self) -> Response {
        self.send(self.client.get(format!("{}/", self.base_url)), "Home")
            .await
    }

    // ========================================================================
    // CSRF
    // ========================================================================

    /// GET /v1/auth/csrf
    #[allow(dead_code)]
    pub async fn get_csrf_token(&self) -> Response {
        self.send(
            self.client.get(format!("{}/v1/auth/csrf", self.base_url)),
            "CSRF token",
        )
        .await
    }

    /// DELETE /v1/auth/csrf
    #[allow(dead_code)]
    pub async fn revoke_csrf_token(&self) -> Response {
        self.send(
            self.client.delete(format!("{}/v1/auth/csrf", self.base_url)),
            "Revoke CSRF token",
        )
        .await
    }

    /// Fetches a CSRF token and attaches it to every following request
    ///
    /// # Panics
    ///
    /// Panics if the token cannot be issued.
    #[allow(dead_code)]
    pub async fn acquire_csrf_token(&mut self) -> String {
        let response = self.get_csrf_token().await;
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        let body: Value = response.json().await.expect("Invalid CSRF response");
        let token = body["csrfToken"]
            .as_str()
            .expect("Missing csrfToken")
            .to_string();
        self.csrf_token = Some(token.clone());
        token
    }

    // ========================================================================
    // Cache clear
    // ========================================================================

    /// POST /v1/admin/cache/clear
    #[allow(dead_code)]
    pub async fn start_cache_clear(&self, body: Value) -> Response {
        self.send(
            self.client
                .post(format!("{}/v1/admin/cache/clear", self.base_url))
                .json(&body),
            "Start cache clear",
        )
        .await
    }

    /// GET /v1/admin/cache/clear?id=
    #[allow(dead_code)]
    pub async fn get_cache_clear_job(&self, id: &str) -> Response {
        self.send(
            self.client
                .get(format!("{}/v1/admin/cache/clear", self.base_url))
                .query(&[("id", id)]),
            "Get cache clear job",
        )
        .await
    }

    /// GET /v1/admin/cache/clear
    #[allow(dead_code)]
    pub async fn list_cache_clear_jobs(&self) -> Response {
        self.send(
            self.client
                .get(format!("{}/v1/admin/cache/clear", self.base_url)),
            "List cache clear jobs",
        )
        .await
    }

    /// DELETE /v1/admin/cache/clear?id=
    #[allow(dead_code)]
    pub async fn delete_cache_clear_job(&self, id: &str) -> Response {
        self.send(
            self.client
                .delete(format!("{}/v1/admin/cache/clear", self.base_url))
                .query(&[("id", id)]),
            "Delete cache clear job",
        )
        .await
    }

    /// Polls a job until it is no longer `in_progress` and returns it
    ///
    /// # Panics
    ///
    /// Panics if the job does not finish within [`JOB_COMPLETION_TIMEOUT_MS`].
    #[allow(dead_code)]
    pub async fn wait_for_job(&self, id: &str) -> Value {
        let start = Instant::now();
        loop {
            let response = self.get_cache_clear_job(id).await;
            assert_eq!(response.status(), reqwest::StatusCode::OK);
            let job: Value = response.json().await.expect("Invalid job response");
            if job["status"] != "in_progress" {
                return job;
            }
            if start.elapsed() > Duration::from_millis(JOB_COMPLETION_TIMEOUT_MS) {
                panic!("Job {} still in progress: {}", id, job);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    // ========================================================================
    // Backups
    // ========================================================================

    /// GET /v1/admin/backup-management
    #[allow(dead_code)]
    pub async fn list_backups(&self) -> Response {
        self.send(
            self.client
                .get(format!("{}/v1/admin/backup-management", self.base_url)),
            "List backups",
        )
        .await
    }

    /// POST /v1/admin/backup-management with a raw body
    #[allow(dead_code)]
    pub async fn backup_action(&self, body: Value) -> Response {
        self.send(
            self.client
                .post(format!("{}/v1/admin/backup-management", self.base_url))
                .json(&body),
            "Backup action",
        )
        .await
    }

    /// POST /v1/admin/backup-management `{"action": "recover"}`
    #[allow(dead_code)]
    pub async fn recover_backup(&self, backup_id: &str, entity_type: &str) -> Response {
        self.backup_action(json!({
            "action": "recover",
            "backupId": backup_id,
            "type": entity_type,
        }))
        .await
    }

    /// POST /v1/admin/backup-management `{"action": "cleanup"}`
    #[allow(dead_code)]
    pub async fn cleanup_backups(&self) -> Response {
        self.backup_action(json!({ "action": "cleanup" })).await
    }

    /// DELETE /v1/admin/entities/{type}/{id}
    #[allow(dead_code)]
    pub async fn soft_delete(&self, entity_type: &str, id: &str) -> Response {
        self.send(
            self.client.delete(format!(
                "{}/v1/admin/entities/{}/{}",
                self.base_url, entity_type, id
            )),
            "Soft delete",
        )
        .await
    }
}
