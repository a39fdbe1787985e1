// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Profile synchronization.
//!
//! The remote row is the source of truth. The cached copy only changes
//! after the service confirms a write, and a fetch that finishes after the
//! session moved on to another identity is discarded.

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::watch;

use crate::backend::AuthBackend;
use crate::error::{AppError, Result};
use crate::models::{Identity, Profile, ProfileForm, ProfilePatch, UserMetadata};
use crate::services::SessionStore;

/// Fetches, lazily creates and updates the profile of the held identity.
#[derive(Clone)]
pub struct ProfileSync {
    inner: Arc<ProfileInner>,
}

struct ProfileInner {
    backend: Arc<dyn AuthBackend>,
    session: SessionStore,
    cache: watch::Sender<Option<Profile>>,
}

impl ProfileSync {
    pub fn new(backend: Arc<dyn AuthBackend>, session: SessionStore) -> Self {
        let (cache, _) = watch::channel(None);
        Self {
            inner: Arc::new(ProfileInner {
                backend,
                session,
                cache,
            }),
        }
    }

    // ─── Fetch ───────────────────────────────────────────────────────

    /// Load the profile for `identity`, creating the default row if none
    /// exists yet.
    ///
    /// Returns `None` on any other failure, leaving the cache untouched.
    pub async fn fetch_or_create(&self, identity: &Identity) -> Option<Profile> {
        match self.try_fetch_or_create(identity).await {
            Ok(profile) => {
                self.cache_if_current(&profile);
                Some(profile)
            }
            Err(e) => {
                tracing::warn!(user_id = %identity.id, error = %e, "Profile unavailable");
                None
            }
        }
    }

    async fn try_fetch_or_create(&self, identity: &Identity) -> Result<Profile> {
        match self.inner.backend.select_profile_by_id(&identity.id).await {
            Ok(profile) => Ok(profile),
            Err(e) if e.is_not_found() => {
                tracing::info!(user_id = %identity.id, "No profile row, creating default");
                self.create_default(identity, None).await
            }
            Err(e) => Err(e),
        }
    }

    /// Upsert the default profile for `identity` and return the stored row.
    /// Does not touch the cache.
    pub async fn create_default(
        &self,
        identity: &Identity,
        full_name: Option<&str>,
    ) -> Result<Profile> {
        let profile = Profile::new_default(identity, full_name, Utc::now());
        let stored = self
            .inner
            .backend
            .upsert_profile(&identity.id, &ProfilePatch::from(&profile))
            .await?;

        tracing::info!(
            user_id = %identity.id,
            full_name = %stored.full_name,
            "Default profile created"
        );
        Ok(stored)
    }

    /// Re-fetch the profile of the held identity. No-op when signed out.
    pub async fn refresh(&self) {
        if let Some(identity) = self.inner.session.identity() {
            self.fetch_or_create(&identity).await;
        }
    }

    // ─── Update ──────────────────────────────────────────────────────

    /// Write `patch` to the held identity's row and merge it into the cache.
    ///
    /// Returns true iff the row write succeeded.
    pub async fn update(&self, patch: &ProfilePatch) -> bool {
        match self.try_update(patch).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Profile update failed");
                false
            }
        }
    }

    /// Same as [`update`](Self::update) but reports why it failed.
    pub async fn try_update(&self, patch: &ProfilePatch) -> Result<()> {
        let identity = self.inner.session.identity().ok_or(AppError::Unauthorized)?;

        let stored = self
            .inner
            .backend
            .upsert_profile(&identity.id, &patch.stamped(Utc::now()))
            .await?;

        let current = self.is_current(&identity.id);
        self.inner.cache.send_modify(|cache| {
            let merged = match cache.as_mut() {
                Some(p) if p.id == identity.id => {
                    p.apply(patch);
                    true
                }
                _ => false,
            };
            if !merged && current {
                *cache = Some(stored);
            }
        });

        tracing::debug!(user_id = %identity.id, "Profile updated");

        if let Some(name) = &patch.full_name {
            let metadata = UserMetadata::with_full_name(name.clone());
            if let Err(e) = self.inner.backend.update_user_metadata(&metadata).await {
                // Secondary effect only; the row write already succeeded.
                tracing::warn!(
                    user_id = %identity.id,
                    error = %e,
                    "Display name metadata sync failed"
                );
            }
        }

        Ok(())
    }

    /// Validate an edit-profile form and save it.
    ///
    /// Validation errors are returned; otherwise the result of
    /// [`update`](Self::update).
    pub async fn save_form(&self, form: ProfileForm) -> Result<bool> {
        let patch = form.into_patch()?;
        Ok(self.update(&patch).await)
    }

    // ─── Cache ───────────────────────────────────────────────────────

    /// Cached profile of the currently held identity.
    pub fn profile(&self) -> Option<Profile> {
        let identity = self.inner.session.identity()?;
        self.inner
            .cache
            .borrow()
            .as_ref()
            .filter(|p| p.id == identity.id)
            .cloned()
    }

    /// Receiver observing every change to the cached profile.
    pub fn watch(&self) -> watch::Receiver<Option<Profile>> {
        self.inner.cache.subscribe()
    }

    pub fn clear(&self) {
        self.inner.cache.send_replace(None);
    }

    fn store(&self, profile: Profile) {
        self.inner.cache.send_replace(Some(profile));
    }

    fn is_current(&self, id: &str) -> bool {
        self.inner
            .session
            .identity()
            .is_some_and(|identity| identity.id == id)
    }

    /// Cache `profile` only if it belongs to the held identity.
    pub(crate) fn cache_if_current(&self, profile: &Profile) {
        if self.is_current(&profile.id) {
            self.store(profile.clone());
        } else {
            tracing::debug!(user_id = %profile.id, "Discarding profile for stale identity");
        }
    }
}
