// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Credential operations: login, register, logout and password reset.
//!
//! The `Result` variants carry the reason for the UI layer; the boolean
//! variants log it and only report success.

use std::sync::Arc;
use validator::Validate;

use crate::backend::AuthBackend;
use crate::error::{AppError, Result};
use crate::models::{Identity, UserMetadata};
use crate::services::{ProfileSync, SessionStore};

/// Sign-up input checked before anything is sent. Format and strength
/// rules belong to the service.
#[derive(Debug, Validate)]
struct SignUpRequest {
    #[validate(length(min = 1, message = "is required"))]
    email: String,
    #[validate(length(min = 1, message = "is required"))]
    password: String,
}

/// Credential operations against the auth service.
#[derive(Clone)]
pub struct AuthService {
    backend: Arc<dyn AuthBackend>,
    session: SessionStore,
    profiles: ProfileSync,
}

impl AuthService {
    pub fn new(backend: Arc<dyn AuthBackend>, session: SessionStore, profiles: ProfileSync) -> Self {
        Self {
            backend,
            session,
            profiles,
        }
    }

    // ─── Login ───────────────────────────────────────────────────────

    /// Sign in and load (or create) the profile. Profile failures are
    /// logged and do not fail the sign-in.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Identity> {
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            return Err(AppError::BadRequest(
                "Email and password are required".to_string(),
            ));
        }

        let response = self.backend.sign_in_with_password(email, password).await?;
        let identity = response
            .user
            .ok_or_else(|| AppError::AuthRejected("Sign-in returned no user".to_string()))?;

        self.session.set_identity(Some(identity.clone()));
        tracing::info!(user_id = %identity.id, "Signed in");

        if self.profiles.fetch_or_create(&identity).await.is_none() {
            tracing::warn!(user_id = %identity.id, "Signed in without a profile");
        }

        Ok(identity)
    }

    /// Boolean form of [`sign_in`](Self::sign_in).
    pub async fn login(&self, email: &str, password: &str) -> bool {
        match self.sign_in(email, password).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Login failed");
                false
            }
        }
    }

    // ─── Register ────────────────────────────────────────────────────

    /// Create the identity and its default profile.
    ///
    /// Succeeds only if both the identity and the profile row were created.
    /// The identity becomes the held one only when the service issued a
    /// session (no email confirmation pending). If the profile write fails
    /// after a session was issued, that session is ended again, so a failed
    /// registration never leaves the new identity signed in.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        full_name: Option<&str>,
    ) -> Result<Identity> {
        let email = email.trim();
        SignUpRequest {
            email: email.to_string(),
            password: password.to_string(),
        }
        .validate()?;

        let full_name = full_name.map(str::trim).filter(|n| !n.is_empty());
        let metadata = full_name.map(UserMetadata::with_full_name);

        let response = self
            .backend
            .sign_up(email, password, metadata.as_ref())
            .await?;
        let identity = response
            .user
            .ok_or_else(|| AppError::AuthRejected("Sign-up returned no user".to_string()))?;

        let signed_in = response.session.is_some();
        if signed_in {
            self.session.set_identity(Some(identity.clone()));
        } else {
            tracing::info!(user_id = %identity.id, "Sign-up pending email confirmation");
        }

        let profile = match self.profiles.create_default(&identity, full_name).await {
            Ok(profile) => profile,
            Err(e) => {
                if signed_in {
                    tracing::warn!(
                        user_id = %identity.id,
                        "Default profile write failed, ending new session"
                    );
                    self.logout().await;
                }
                return Err(e);
            }
        };
        // Pending confirmation keeps whoever was signed in before.
        self.profiles.cache_if_current(&profile);

        tracing::info!(user_id = %identity.id, "Registered");
        Ok(identity)
    }

    /// Boolean form of [`sign_up`](Self::sign_up).
    pub async fn register(&self, email: &str, password: &str, full_name: Option<&str>) -> bool {
        match self.sign_up(email, password, full_name).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Registration failed");
                false
            }
        }
    }

    // ─── Logout ──────────────────────────────────────────────────────

    /// End the session. Local state is cleared even if the service call
    /// fails, and calling it while signed out is harmless.
    pub async fn logout(&self) {
        if let Err(e) = self.backend.sign_out().await {
            tracing::warn!(error = %e, "Remote sign-out failed, clearing local session anyway");
        }

        self.session.set_identity(None);
        self.profiles.clear();
        tracing::info!("Signed out");
    }

    // ─── Password reset ──────────────────────────────────────────────

    /// Ask the service to email reset instructions to `email`.
    pub async fn send_password_reset(&self, email: &str) -> Result<()> {
        let email = email.trim();
        if email.is_empty() {
            return Err(AppError::BadRequest("Email is required".to_string()));
        }
        self.backend.reset_password_for_email(email).await
    }

    /// Boolean form of [`send_password_reset`](Self::send_password_reset).
    pub async fn request_password_reset(&self, email: &str) -> bool {
        match self.send_password_reset(email).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Password reset request failed");
                false
            }
        }
    }
}
