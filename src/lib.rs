// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! BetMaster: session and profile core for the BetMaster app
//!
//! This crate keeps the signed-in identity and its profile row in sync
//! with a hosted auth/database service.

pub mod backend;
pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod time_utils;

use std::sync::Arc;

use backend::AuthBackend;
use config::Config;
use models::Identity;
use services::{AuthService, ProfileSync, SessionStore};

/// Shared application state, built once at startup and passed by reference
/// to whatever needs the session.
pub struct AppContext {
    pub config: Config,
    pub backend: Arc<dyn AuthBackend>,
    pub session: SessionStore,
    pub profiles: ProfileSync,
    pub auth: AuthService,
}

impl AppContext {
    /// Wire the services around `backend`.
    pub fn new(config: Config, backend: Arc<dyn AuthBackend>) -> Self {
        let session = SessionStore::new(backend.clone());
        let profiles = ProfileSync::new(backend.clone(), session.clone());
        let auth = AuthService::new(backend.clone(), session.clone(), profiles.clone());

        Self {
            config,
            backend,
            session,
            profiles,
            auth,
        }
    }

    /// Build the backend named in `config` and wire the services around it.
    pub fn from_config(config: Config) -> error::Result<Self> {
        let backend = backend::connect(&config)?;
        Ok(Self::new(config, backend))
    }

    /// Restore any existing session and load its profile.
    pub async fn start(&self) -> Option<Identity> {
        let identity = self.session.initialize().await;
        if identity.is_some() {
            self.profiles.refresh().await;
        }
        identity
    }

    /// Stop listening for session changes.
    pub fn shutdown(&self) {
        self.session.teardown();
    }
}
