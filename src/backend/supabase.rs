// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Supabase client for auth (GoTrue) and the profiles table (PostgREST).
//!
//! Handles:
//! - Password sign-in, sign-up, sign-out and password recovery
//! - Session refresh when the access token is close to expiry
//! - Identity metadata updates
//! - Profile row select and upsert
//!
//! The session lives in memory only; a new process starts signed out.

use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

use super::{AuthBackend, AuthListeners, AuthStateHandler, Subscription};
use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::{
    AuthChangeEvent, AuthEvent, AuthResponse, AuthSession, Identity, Profile, ProfilePatch,
    UserMetadata,
};

/// Margin before token expiration when we proactively refresh (5 minutes).
const TOKEN_REFRESH_MARGIN_SECS: i64 = 5 * 60;

/// Lifetime assumed when the service omits `expires_at`.
const DEFAULT_TOKEN_TTL_SECS: i64 = 3600;

/// PostgREST media type for "exactly one row as a JSON object".
const PGRST_OBJECT: &str = "application/vnd.pgrst.object+json";

/// Hosted Supabase project client.
pub struct SupabaseBackend {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
    profiles_table: String,
    session: RwLock<Option<AuthSession>>,
    /// Serializes token refreshes so concurrent callers refresh once.
    refresh_lock: Mutex<()>,
    listeners: Arc<AuthListeners>,
}

impl SupabaseBackend {
    /// Create a client for the project in `config`.
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: config.supabase_url.trim_end_matches('/').to_string(),
            anon_key: config.supabase_anon_key.clone(),
            profiles_table: config.profiles_table.clone(),
            session: RwLock::new(None),
            refresh_lock: Mutex::new(()),
            listeners: AuthListeners::new(),
        })
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base_url, path)
    }

    fn rest_url(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, self.profiles_table)
    }

    /// Bearer for row requests: the user's access token (refreshed first
    /// if it is about to expire), else the anon key.
    async fn bearer(&self) -> Result<String> {
        Ok(self
            .current_session()
            .await?
            .map(|s| s.access_token)
            .unwrap_or_else(|| self.anon_key.clone()))
    }

    /// Store a fresh session and notify listeners.
    async fn set_session(&self, session: AuthSession, kind: AuthChangeEvent) {
        let identity = session.user.clone();
        *self.session.write().await = Some(session);
        self.listeners.emit(&AuthEvent {
            kind,
            identity: Some(identity),
        });
    }

    /// Drop the local session and notify listeners.
    async fn clear_session(&self) {
        self.session.write().await.take();
        self.listeners.emit(&AuthEvent::signed_out());
    }

    /// Exchange a refresh token for a new session.
    async fn refresh_session(&self, refresh_token: &str) -> Result<AuthSession> {
        let response = self
            .http
            .post(self.auth_url("token"))
            .query(&[("grant_type", "refresh_token")])
            .header("apikey", &self.anon_key)
            .json(&serde_json::json!({ "refresh_token": refresh_token }))
            .send()
            .await
            .map_err(|e| AppError::Backend(format!("Token refresh request failed: {}", e)))?;

        let token: TokenResponse = check_auth_response_json(response).await?;
        Ok(token.into_session())
    }

    /// Return the stored session, refreshing it first if it is about to expire.
    async fn current_session(&self) -> Result<Option<AuthSession>> {
        let margin = TOKEN_REFRESH_MARGIN_SECS;

        // Fast path: no session, or token still comfortably valid
        match self.session.read().await.as_ref() {
            None => return Ok(None),
            Some(s) if Utc::now().timestamp() + margin < s.expires_at => {
                return Ok(Some(s.clone()));
            }
            Some(_) => {}
        }

        let _guard = self.refresh_lock.lock().await;

        // Re-check: another task may have refreshed while we waited
        let refresh_token = match self.session.read().await.as_ref() {
            None => return Ok(None),
            Some(s) if Utc::now().timestamp() + margin < s.expires_at => {
                return Ok(Some(s.clone()));
            }
            Some(s) => s.refresh_token.clone(),
        };

        tracing::info!("Access token expiring, refreshing session");

        match self.refresh_session(&refresh_token).await {
            Ok(session) => {
                self.set_session(session.clone(), AuthChangeEvent::TokenRefreshed)
                    .await;
                Ok(Some(session))
            }
            Err(e) if e.is_auth_rejected() => {
                tracing::warn!(error = %e, "Refresh token rejected, signing out locally");
                self.clear_session().await;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl AuthBackend for SupabaseBackend {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<AuthResponse> {
        let response = self
            .http
            .post(self.auth_url("token"))
            .query(&[("grant_type", "password")])
            .header("apikey", &self.anon_key)
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await?;

        let token: TokenResponse = check_auth_response_json(response).await?;
        let session = token.into_session();
        self.set_session(session.clone(), AuthChangeEvent::SignedIn)
            .await;

        Ok(AuthResponse {
            user: Some(session.user.clone()),
            session: Some(session),
        })
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: Option<&UserMetadata>,
    ) -> Result<AuthResponse> {
        let data = match metadata {
            Some(m) => serde_json::to_value(m)
                .map_err(|e| AppError::Internal(anyhow::anyhow!("Metadata encode: {}", e)))?,
            None => serde_json::json!({}),
        };

        let response = self
            .http
            .post(self.auth_url("signup"))
            .header("apikey", &self.anon_key)
            .json(&serde_json::json!({ "email": email, "password": password, "data": data }))
            .send()
            .await?;

        let body: serde_json::Value = check_auth_response_json(response).await?;

        // With autoconfirm the service answers with a full session,
        // otherwise with the bare (unconfirmed) user.
        if body.get("access_token").is_some() {
            let token: TokenResponse = serde_json::from_value(body)
                .map_err(|e| AppError::Backend(format!("Malformed sign-up session: {}", e)))?;
            let session = token.into_session();
            self.set_session(session.clone(), AuthChangeEvent::SignedIn)
                .await;
            return Ok(AuthResponse {
                user: Some(session.user.clone()),
                session: Some(session),
            });
        }

        let user = match body.get("id") {
            Some(_) => Some(
                serde_json::from_value::<Identity>(body)
                    .map_err(|e| AppError::Backend(format!("Malformed sign-up user: {}", e)))?,
            ),
            None => None,
        };

        Ok(AuthResponse {
            user,
            session: None,
        })
    }

    async fn sign_out(&self) -> Result<()> {
        let access_token = self
            .session
            .read()
            .await
            .as_ref()
            .map(|s| s.access_token.clone());
        let Some(access_token) = access_token else {
            self.clear_session().await;
            return Ok(());
        };

        let result = self
            .http
            .post(self.auth_url("logout"))
            .header("apikey", &self.anon_key)
            .bearer_auth(&access_token)
            .send()
            .await;

        // The local session ends whatever the service says.
        self.clear_session().await;

        let response = result?;
        let status = response.status();
        // 401/404: the session was already gone server-side
        if status.is_success() || status.as_u16() == 401 || status.as_u16() == 404 {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(AppError::Backend(format!("Sign-out failed: HTTP {}: {}", status, body)))
    }

    async fn get_session(&self) -> Result<Option<AuthSession>> {
        self.current_session().await
    }

    fn on_auth_state_change(&self, handler: AuthStateHandler) -> Subscription {
        self.listeners.subscribe(handler)
    }

    async fn update_user_metadata(&self, metadata: &UserMetadata) -> Result<Identity> {
        let session = self.current_session().await?.ok_or(AppError::Unauthorized)?;

        let response = self
            .http
            .put(self.auth_url("user"))
            .header("apikey", &self.anon_key)
            .bearer_auth(&session.access_token)
            .json(&serde_json::json!({ "data": metadata }))
            .send()
            .await?;

        let identity: Identity = check_auth_response_json(response).await?;

        if let Some(current) = self.session.write().await.as_mut() {
            current.user = identity.clone();
        }
        self.listeners.emit(&AuthEvent {
            kind: AuthChangeEvent::UserUpdated,
            identity: Some(identity.clone()),
        });

        Ok(identity)
    }

    async fn reset_password_for_email(&self, email: &str) -> Result<()> {
        let response = self
            .http
            .post(self.auth_url("recover"))
            .header("apikey", &self.anon_key)
            .json(&serde_json::json!({ "email": email }))
            .send()
            .await?;

        check_auth_response(response).await?;
        tracing::info!("Password recovery email requested");
        Ok(())
    }

    async fn select_profile_by_id(&self, id: &str) -> Result<Profile> {
        let url = format!(
            "{}?id=eq.{}&select=*",
            self.rest_url(),
            urlencoding::encode(id)
        );

        let response = self
            .http
            .get(&url)
            .header("apikey", &self.anon_key)
            .bearer_auth(self.bearer().await?)
            .header(reqwest::header::ACCEPT, PGRST_OBJECT)
            .send()
            .await?;

        check_rest_response_json(response).await
    }

    async fn upsert_profile(&self, id: &str, patch: &ProfilePatch) -> Result<Profile> {
        let mut row = serde_json::to_value(patch)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Profile encode: {}", e)))?;
        if let Some(fields) = row.as_object_mut() {
            fields.insert("id".to_string(), serde_json::Value::String(id.to_string()));
        }

        let response = self
            .http
            .post(format!("{}?on_conflict=id", self.rest_url()))
            .header("apikey", &self.anon_key)
            .bearer_auth(self.bearer().await?)
            .header(reqwest::header::ACCEPT, PGRST_OBJECT)
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .json(&row)
            .send()
            .await?;

        check_rest_response_json(response).await
    }
}

// ─── Wire types ──────────────────────────────────────────────────────

/// Session payload from `/auth/v1/token` and autoconfirmed sign-up.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: Identity,
}

impl TokenResponse {
    fn into_session(self) -> AuthSession {
        let expires_at = self.expires_at.unwrap_or_else(|| {
            Utc::now().timestamp() + self.expires_in.unwrap_or(DEFAULT_TOKEN_TTL_SECS)
        });
        AuthSession {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            user: self.user,
        }
    }
}

/// Error body shapes used by GoTrue and PostgREST.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<serde_json::Value>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

impl ErrorBody {
    fn parse(body: &str) -> Self {
        serde_json::from_str(body).unwrap_or_default()
    }

    fn text(&self) -> Option<String> {
        self.msg
            .clone()
            .or_else(|| self.error_description.clone())
            .or_else(|| self.message.clone())
            .or_else(|| self.error.clone())
    }

    fn code_str(&self) -> Option<&str> {
        self.code.as_ref().and_then(|c| c.as_str())
    }
}

/// Check an auth response status. Client errors are credential rejections.
async fn check_auth_response(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let error = ErrorBody::parse(&body);

    if status.as_u16() == 429 {
        tracing::warn!("Auth rate limit hit (429)");
        return Err(AppError::Backend("Too many requests".to_string()));
    }

    if status.is_client_error() {
        let msg = error
            .text()
            .unwrap_or_else(|| format!("Request rejected ({})", status));
        return Err(AppError::AuthRejected(msg));
    }

    Err(AppError::Backend(format!("HTTP {}: {}", status, body)))
}

/// Check an auth response and parse its JSON body.
async fn check_auth_response_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    check_auth_response(response)
        .await?
        .json()
        .await
        .map_err(|e| AppError::Backend(format!("JSON parse error: {}", e)))
}

/// Check a PostgREST response and parse its JSON body.
async fn check_rest_response_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if status.is_success() {
        return response
            .json()
            .await
            .map_err(|e| AppError::Backend(format!("Malformed row: {}", e)));
    }

    let body = response.text().await.unwrap_or_default();
    let error = ErrorBody::parse(&body);

    if error.code_str() == Some(AppError::PROFILE_NOT_FOUND_CODE) {
        return Err(AppError::NotFound(
            error.text().unwrap_or_else(|| "no rows".to_string()),
        ));
    }

    Err(AppError::Database(format!(
        "HTTP {}: {}",
        status,
        error.text().unwrap_or(body)
    )))
}
