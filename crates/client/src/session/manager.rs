// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Auth session manager: owns the stored session and its lifecycle.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::domain::UserProfile;
use crate::error::ApiError;
use crate::session::claims;
use crate::storage::Storage;

const KEY_TOKEN: &str = "token";
const KEY_REFRESH_TOKEN: &str = "refresh_token";
const KEY_ROLE: &str = "role";
const KEY_USERNAME: &str = "username";
const KEY_GUEST_ID: &str = "guestId";

/// Stored session fields. Invariant: `access_token` is present iff the
/// user counts as logged in.
#[derive(Debug, Clone, Default)]
struct SessionData {
    access_token: Option<String>,
    refresh_token: Option<String>,
    role: Option<String>,
    username: Option<String>,
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: String,
    #[serde(rename = "refreshToken")]
    refresh_token: String,
    ruolo: String,
}

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    #[serde(rename = "refreshToken")]
    refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    token: String,
}

/// Owns login/logout/refresh and exposes login state and current user as
/// observable values. Stored fields mirror persisted storage; the mirror
/// is authoritative within the process, storage failures only cost
/// durability.
pub struct AuthSession {
    http: reqwest::Client,
    base_url: String,
    storage: Arc<dyn Storage>,
    data: RwLock<SessionData>,
    logged_in: watch::Sender<bool>,
    current_user: watch::Sender<Option<UserProfile>>,
}

impl AuthSession {
    /// Create a session manager, deriving the initial login state from
    /// the persisted token's expiry claim.
    pub fn new(base_url: impl Into<String>, storage: Arc<dyn Storage>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        let data = SessionData {
            access_token: storage.get(KEY_TOKEN),
            refresh_token: storage.get(KEY_REFRESH_TOKEN),
            role: storage.get(KEY_ROLE),
            username: storage.get(KEY_USERNAME),
        };
        let initially_logged_in = data
            .access_token
            .as_deref()
            .map(|t| claims::token_is_valid(t, epoch_secs()))
            .unwrap_or(false);
        let (logged_in, _) = watch::channel(initially_logged_in);
        let (current_user, _) = watch::channel(None);
        Self {
            http: crate::transport::http_client(std::time::Duration::from_secs(10)),
            base_url,
            storage,
            data: RwLock::new(data),
            logged_in,
            current_user,
        }
    }

    // -- Observables -----------------------------------------------------------

    pub fn is_logged_in(&self) -> bool {
        *self.logged_in.borrow()
    }

    pub fn watch_logged_in(&self) -> watch::Receiver<bool> {
        self.logged_in.subscribe()
    }

    pub fn current_user(&self) -> Option<UserProfile> {
        self.current_user.borrow().clone()
    }

    pub fn watch_current_user(&self) -> watch::Receiver<Option<UserProfile>> {
        self.current_user.subscribe()
    }

    // -- Stored fields ---------------------------------------------------------

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn access_token(&self) -> Option<String> {
        self.data.read().access_token.clone()
    }

    pub fn username(&self) -> Option<String> {
        self.data.read().username.clone()
    }

    pub fn role(&self) -> Option<String> {
        self.data.read().role.clone()
    }

    /// Local numeric identity, decoded from the stored token.
    pub fn user_id(&self) -> Option<u64> {
        let data = self.data.read();
        let token = data.access_token.as_deref()?;
        claims::decode_claims(token)?.user_id
    }

    /// Stable pre-login identity, generated on first use.
    pub fn guest_id(&self) -> String {
        if let Some(id) = self.storage.get(KEY_GUEST_ID) {
            return id;
        }
        let id = uuid::Uuid::new_v4().to_string();
        self.persist(KEY_GUEST_ID, &id);
        id
    }

    /// Store a freshly refreshed access token (memory + storage).
    pub fn store_access_token(&self, token: &str) {
        self.data.write().access_token = Some(token.to_owned());
        self.persist(KEY_TOKEN, token);
        self.logged_in.send_replace(true);
    }

    // -- Lifecycle -------------------------------------------------------------

    /// Log in. On success stores tokens, role, and username, flips the
    /// login state, and refreshes the cached profile in the background.
    /// Rejected credentials leave the stored state untouched.
    pub async fn login(
        self: &Arc<Self>,
        username: &str,
        password: &str,
    ) -> Result<(), ApiError> {
        let url = format!("{}/auth/login", self.base_url);
        let resp =
            self.http.post(&url).json(&LoginRequest { username, password }).send().await?;
        let status = resp.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(ApiError::InvalidCredentials);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::Status { code: status.as_u16(), body });
        }
        let login: LoginResponse = resp.json().await?;

        {
            let mut data = self.data.write();
            data.access_token = Some(login.token.clone());
            data.refresh_token = Some(login.refresh_token.clone());
            data.role = Some(login.ruolo.clone());
            data.username = Some(username.to_owned());
        }
        self.persist(KEY_TOKEN, &login.token);
        self.persist(KEY_REFRESH_TOKEN, &login.refresh_token);
        self.persist(KEY_ROLE, &login.ruolo);
        self.persist(KEY_USERNAME, username);
        self.logged_in.send_replace(true);
        tracing::info!(username, "logged in");

        // Profile fetch is asynchronous; login does not wait on it.
        let session = Arc::clone(self);
        tokio::spawn(async move {
            session.refresh_profile().await;
        });
        Ok(())
    }

    /// Exchange the stored refresh token for a new access token.
    ///
    /// Deliberately does not store the result — the request layer owns
    /// replay ordering and stores via [`AuthSession::store_access_token`].
    pub async fn refresh_access_token(&self) -> Result<String, ApiError> {
        let refresh_token = self
            .data
            .read()
            .refresh_token
            .clone()
            .ok_or_else(|| ApiError::RefreshFailed("no refresh token".to_owned()))?;

        let url = format!("{}/auth/token", self.base_url);
        let resp = self
            .http
            .post(&url)
            .json(&RefreshRequest { refresh_token: &refresh_token })
            .send()
            .await
            .map_err(|e| ApiError::RefreshFailed(e.to_string()))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::RefreshFailed(format!("{status}: {body}")));
        }
        let refreshed: RefreshResponse =
            resp.json().await.map_err(|e| ApiError::RefreshFailed(e.to_string()))?;
        Ok(refreshed.token)
    }

    /// Log out: best-effort backend notification, then unconditionally
    /// clear the stored session. The guest id survives.
    pub async fn logout(&self) {
        let (username, refresh_token) = {
            let data = self.data.read();
            (data.username.clone(), data.refresh_token.clone())
        };

        if let (Some(username), Some(refresh_token)) = (username, refresh_token) {
            let url = format!("{}/auth/logout", self.base_url);
            let body = serde_json::json!({
                "username": username,
                "refreshToken": refresh_token,
            });
            if let Err(e) = self.http.post(&url).json(&body).send().await {
                tracing::debug!(err = %e, "logout notification failed");
            }
        }

        *self.data.write() = SessionData::default();
        self.storage.remove(KEY_TOKEN);
        self.storage.remove(KEY_REFRESH_TOKEN);
        self.storage.remove(KEY_ROLE);
        self.storage.remove(KEY_USERNAME);
        self.current_user.send_replace(None);
        self.logged_in.send_replace(false);
        tracing::info!("logged out");
    }

    /// Fetch `/users/me` with the current token and update the cached
    /// current-user observable. Failures are logged, not surfaced.
    pub async fn refresh_profile(&self) {
        let Some(token) = self.access_token() else { return };
        let url = format!("{}/users/me", self.base_url);
        let result = async {
            let resp = self.http.get(&url).bearer_auth(&token).send().await?;
            resp.error_for_status()?.json::<UserProfile>().await
        }
        .await;
        match result {
            Ok(profile) => {
                self.current_user.send_replace(Some(profile));
            }
            Err(e) => tracing::debug!(err = %e, "profile refresh failed"),
        }
    }

    fn persist(&self, key: &str, value: &str) {
        if let Err(e) = self.storage.set(key, value) {
            tracing::warn!(key, err = %e, "failed to persist session field");
        }
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
