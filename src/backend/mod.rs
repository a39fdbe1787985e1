// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Boundary with the hosted auth/database service.
//!
//! [`AuthBackend`] is the whole surface the session core relies on.
//! [`SupabaseBackend`] talks to a real project over HTTP; [`MemoryBackend`]
//! keeps everything in process and seeds the fixture accounts.

pub mod memory;
pub mod supabase;

pub use memory::MemoryBackend;
pub use supabase::SupabaseBackend;

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use crate::config::{BackendKind, Config};
use crate::error::Result;
use crate::models::{AuthEvent, AuthResponse, AuthSession, Identity, Profile, ProfilePatch, UserMetadata};

/// Table names as constants.
pub mod tables {
    /// One row per identity, keyed by identity ID
    pub const PROFILES: &str = "profiles";
}

/// Callback invoked for every session change.
pub type AuthStateHandler = Arc<dyn Fn(&AuthEvent) + Send + Sync>;

/// Operations offered by the remote auth/database service.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// Exchange email + password for a session.
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<AuthResponse>;

    /// Create an identity. The session is absent when the service requires
    /// email confirmation first.
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: Option<&UserMetadata>,
    ) -> Result<AuthResponse>;

    /// End the current session.
    async fn sign_out(&self) -> Result<()>;

    /// Current session, if any.
    async fn get_session(&self) -> Result<Option<AuthSession>>;

    /// Register a session-change handler. Dropping the returned
    /// subscription unregisters it.
    fn on_auth_state_change(&self, handler: AuthStateHandler) -> Subscription;

    /// Merge `metadata` into the signed-in identity's metadata.
    async fn update_user_metadata(&self, metadata: &UserMetadata) -> Result<Identity>;

    /// Ask the service to email password-reset instructions.
    async fn reset_password_for_email(&self, email: &str) -> Result<()>;

    /// Fetch the profile row. A missing row is `AppError::NotFound`.
    async fn select_profile_by_id(&self, id: &str) -> Result<Profile>;

    /// Insert or merge a profile row and return the stored row.
    async fn upsert_profile(&self, id: &str, patch: &ProfilePatch) -> Result<Profile>;
}

/// Build the backend selected by configuration.
pub fn connect(config: &Config) -> Result<Arc<dyn AuthBackend>> {
    match config.backend {
        BackendKind::Supabase => {
            let backend = SupabaseBackend::new(config)?;
            tracing::info!(url = %config.supabase_url, "Using Supabase backend");
            Ok(Arc::new(backend))
        }
        BackendKind::Memory => {
            tracing::info!("Using in-memory backend with fixture accounts");
            Ok(Arc::new(MemoryBackend::new(&config.memory_jwt_key)))
        }
    }
}

// ─── Session-change notification ─────────────────────────────────────

/// Registry of session-change handlers shared by the backends.
#[derive(Default)]
pub struct AuthListeners {
    next_id: AtomicU64,
    handlers: DashMap<u64, AuthStateHandler>,
}

impl AuthListeners {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register `handler` and return the subscription that owns it.
    pub fn subscribe(self: &Arc<Self>, handler: AuthStateHandler) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.handlers.insert(id, handler);
        Subscription {
            id,
            listeners: Arc::downgrade(self),
        }
    }

    /// Deliver `event` to every handler in registration order.
    pub fn emit(&self, event: &AuthEvent) {
        // Snapshot first: handlers may unsubscribe while running.
        let mut handlers: Vec<(u64, AuthStateHandler)> = self
            .handlers
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        handlers.sort_by_key(|(id, _)| *id);

        tracing::debug!(
            kind = ?event.kind,
            listeners = handlers.len(),
            "Emitting auth state change"
        );

        for (_, handler) in handlers {
            handler(event);
        }
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    fn remove(&self, id: u64) {
        self.handlers.remove(&id);
    }
}

/// Handle for a registered session-change handler.
pub struct Subscription {
    id: u64,
    listeners: Weak<AuthListeners>,
}

impl Subscription {
    /// Stop receiving notifications.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners.remove(self.id);
        }
    }
}
