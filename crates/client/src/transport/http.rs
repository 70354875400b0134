// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authorized HTTP client with refresh coalescing.
//!
//! Attaches the bearer token to every request. A 403 triggers the
//! refresh-and-retry protocol: at most one refresh call is in flight at
//! a time, and every request that failed authorization while it was
//! pending is replayed (in arrival order) against that single refresh's
//! outcome. A failed refresh forces logout and fails all waiters
//! together with the original authorization error.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::error::ApiError;
use crate::session::AuthSession;

pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    session: Arc<AuthSession>,
    /// Serializes refresh attempts. Waiters queue here in arrival order.
    refresh_gate: Mutex<()>,
    /// Bumped after every stored refresh; a waiter that observes a bump
    /// knows its token was already renewed by someone else.
    refresh_generation: AtomicU64,
}

impl ApiClient {
    pub fn new(
        base_url: impl Into<String>,
        session: Arc<AuthSession>,
        timeout: Duration,
    ) -> Self {
        Self {
            http: crate::transport::http_client(timeout),
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            session,
            refresh_gate: Mutex::new(()),
            refresh_generation: AtomicU64::new(0),
        }
    }

    pub fn session(&self) -> &Arc<AuthSession> {
        &self.session
    }

    // -- Typed helpers ---------------------------------------------------------

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.request_json(Method::GET, path, &[], None).await
    }

    pub async fn get_query_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ApiError> {
        self.request_json(Method::GET, path, query, None).await
    }

    pub async fn post_json<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let body = serde_json::to_value(body).map_err(|e| ApiError::Transport(e.to_string()))?;
        self.request_json(Method::POST, path, &[], Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.send_with_auth(Method::DELETE, path, &[], None).await.map(|_| ())
    }

    async fn request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<serde_json::Value>,
    ) -> Result<T, ApiError> {
        let resp = self.send_with_auth(method, path, query, body).await?;
        resp.json::<T>().await.map_err(|e| ApiError::Transport(e.to_string()))
    }

    // -- Interceptor core ------------------------------------------------------

    /// Dispatch with bearer attachment and the coalesced refresh-retry
    /// protocol.
    async fn send_with_auth(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<serde_json::Value>,
    ) -> Result<reqwest::Response, ApiError> {
        let generation = self.refresh_generation.load(Ordering::Acquire);
        let token = self.session.access_token();

        let resp = self.dispatch(method.clone(), path, query, body.as_ref(), token).await?;
        if resp.status().as_u16() != 403 {
            return classify(resp).await;
        }

        // Authorization failed: join the (single-flight) refresh, then
        // replay exactly once.
        let token = self.refreshed_token(generation).await?;
        let resp = self.dispatch(method, path, query, body.as_ref(), Some(token)).await?;
        if resp.status().as_u16() == 403 {
            return Err(ApiError::AuthorizationExpired);
        }
        classify(resp).await
    }

    async fn dispatch(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&serde_json::Value>,
        token: Option<String>,
    ) -> Result<reqwest::Response, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self.http.request(method, &url);
        if !query.is_empty() {
            req = req.query(query);
        }
        if let Some(body) = body {
            req = req.json(body);
        }
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        Ok(req.send().await?)
    }

    /// Resolve a usable token after an authorization failure observed at
    /// `generation`. The first caller through the gate performs the
    /// refresh; everyone queued behind it reuses the outcome.
    async fn refreshed_token(&self, generation: u64) -> Result<String, ApiError> {
        let _guard = self.refresh_gate.lock().await;

        if self.refresh_generation.load(Ordering::Acquire) != generation {
            // Someone ahead of us in the queue already refreshed.
            return self.session.access_token().ok_or(ApiError::AuthorizationExpired);
        }
        if !self.session.is_logged_in() {
            // The refresh ahead of us failed and forced logout.
            return Err(ApiError::AuthorizationExpired);
        }

        match self.session.refresh_access_token().await {
            Ok(token) => {
                self.session.store_access_token(&token);
                self.refresh_generation.fetch_add(1, Ordering::Release);
                tracing::debug!("access token refreshed");
                Ok(token)
            }
            Err(e) => {
                tracing::warn!(err = %e, "token refresh failed, forcing logout");
                self.session.logout().await;
                Err(ApiError::AuthorizationExpired)
            }
        }
    }
}

/// Map the final HTTP status: success passes the response through, any
/// other status propagates unchanged as a status error.
async fn classify(resp: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ApiError::Status { code: status.as_u16(), body })
}
