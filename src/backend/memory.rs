// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process auth/database service.
//!
//! Seeds the fixture accounts (none of which has a profile row yet),
//! issues HS256 access tokens and keeps profile rows in memory. Test hooks
//! allow injecting faults, counting calls, pausing profile reads and
//! pushing session-change notifications from "elsewhere".

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify, RwLock, Semaphore};

use super::{AuthBackend, AuthListeners, AuthStateHandler, Subscription};
use crate::error::{AppError, Result};
use crate::models::{
    AuthChangeEvent, AuthEvent, AuthResponse, AuthSession, Identity, Profile, ProfilePatch,
    UserMetadata,
};

/// Accounts present in every fresh memory backend: (email, password, name).
pub const FIXTURE_ACCOUNTS: &[(&str, &str, &str)] = &[
    ("test@test.com", "12345678", "TEST"),
    ("test1@test.com", "12345678", "TEST"),
    ("test2@test.com", "12345678", "TEST"),
    ("a", "a", "a"),
];

/// Access token lifetime (1 hour).
const DEFAULT_TOKEN_TTL_SECS: i64 = 60 * 60;

/// Operation that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    SessionLookup,
    SignOut,
    ProfileRead,
    ProfileWrite,
    MetadataUpdate,
}

/// Operation whose invocations are counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    SignIn,
    SignUp,
    SignOut,
    GetSession,
    UpdateMetadata,
    ResetPassword,
    SelectProfile,
    UpsertProfile,
}

const CALL_KINDS: usize = 8;
const FAULT_KINDS: usize = 5;

/// JWT claims for memory-issued access tokens.
#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    /// Subject (identity ID)
    sub: String,
    email: Option<String>,
    /// Expiration time (Unix timestamp)
    exp: i64,
    /// Issued at (Unix timestamp)
    iat: i64,
}

struct StoredUser {
    identity: Identity,
    password: String,
}

/// Pause point for profile reads; see [`MemoryBackend::hold_profile_reads`].
pub struct ProfileReadHold {
    reached: Notify,
    released: Semaphore,
}

impl ProfileReadHold {
    /// Wait until a profile read is parked at the hold.
    pub async fn reached(&self) {
        self.reached.notified().await;
    }

    /// Let every parked and future read through.
    pub fn release(&self) {
        self.released.close();
    }

    async fn park(&self) {
        self.reached.notify_one();
        // Closed semaphore means released.
        let _ = self.released.acquire().await;
    }
}

/// In-memory [`AuthBackend`].
pub struct MemoryBackend {
    /// Users keyed by lowercase email
    users: DashMap<String, StoredUser>,
    /// Profile rows keyed by identity ID
    profiles: DashMap<String, Profile>,
    session: RwLock<Option<AuthSession>>,
    listeners: Arc<AuthListeners>,
    signing_key: Vec<u8>,
    token_ttl_secs: AtomicI64,
    require_confirmation: AtomicBool,
    next_user: AtomicU64,
    faults: [AtomicBool; FAULT_KINDS],
    calls: [AtomicUsize; CALL_KINDS],
    read_hold: Mutex<Option<Arc<ProfileReadHold>>>,
}

impl MemoryBackend {
    /// Create a backend seeded with [`FIXTURE_ACCOUNTS`].
    pub fn new(signing_key: &[u8]) -> Self {
        let backend = Self {
            users: DashMap::new(),
            profiles: DashMap::new(),
            session: RwLock::new(None),
            listeners: AuthListeners::new(),
            signing_key: signing_key.to_vec(),
            token_ttl_secs: AtomicI64::new(DEFAULT_TOKEN_TTL_SECS),
            require_confirmation: AtomicBool::new(false),
            next_user: AtomicU64::new(1),
            faults: Default::default(),
            calls: Default::default(),
            read_hold: Mutex::new(None),
        };

        for (email, password, name) in FIXTURE_ACCOUNTS {
            backend.insert_user(email, password, UserMetadata::with_full_name(*name));
        }

        backend
    }

    fn insert_user(&self, email: &str, password: &str, metadata: UserMetadata) -> Identity {
        let n = self.next_user.fetch_add(1, Ordering::Relaxed);
        let identity = Identity {
            id: format!("00000000-0000-4000-8000-{:012}", n),
            email: Some(email.to_string()),
            user_metadata: metadata,
        };
        self.users.insert(
            email.to_ascii_lowercase(),
            StoredUser {
                identity: identity.clone(),
                password: password.to_string(),
            },
        );
        identity
    }

    // ─── Test hooks ──────────────────────────────────────────────────

    /// Make `fault` fail (or stop failing).
    pub fn set_fault(&self, fault: Fault, failing: bool) {
        self.faults[fault as usize].store(failing, Ordering::SeqCst);
    }

    fn failing(&self, fault: Fault) -> bool {
        self.faults[fault as usize].load(Ordering::SeqCst)
    }

    /// How many times `call` has been invoked.
    pub fn call_count(&self, call: Call) -> usize {
        self.calls[call as usize].load(Ordering::SeqCst)
    }

    fn record(&self, call: Call) {
        self.calls[call as usize].fetch_add(1, Ordering::SeqCst);
    }

    /// Lifetime of access tokens issued from now on. Negative values issue
    /// already-expired tokens.
    pub fn set_token_ttl_secs(&self, secs: i64) {
        self.token_ttl_secs.store(secs, Ordering::SeqCst);
    }

    /// When set, sign-up returns the new user without a session.
    pub fn set_require_email_confirmation(&self, required: bool) {
        self.require_confirmation.store(required, Ordering::SeqCst);
    }

    /// Park every profile read until the returned hold is released.
    pub async fn hold_profile_reads(&self) -> Arc<ProfileReadHold> {
        let hold = Arc::new(ProfileReadHold {
            reached: Notify::new(),
            released: Semaphore::new(0),
        });
        *self.read_hold.lock().await = Some(hold.clone());
        hold
    }

    /// Push a notification as if the session changed elsewhere.
    /// A notification without identity also ends the stored session.
    pub async fn emit_auth_change(&self, event: AuthEvent) {
        if event.identity.is_none() {
            self.session.write().await.take();
        }
        self.listeners.emit(&event);
    }

    /// Stored profile row, bypassing faults and counters.
    pub fn profile_row(&self, id: &str) -> Option<Profile> {
        self.profiles.get(id).map(|p| p.value().clone())
    }

    /// Number of stored profile rows.
    pub fn profile_count(&self) -> usize {
        self.profiles.len()
    }

    /// Store a profile row directly.
    pub fn insert_profile(&self, profile: Profile) {
        self.profiles.insert(profile.id.clone(), profile);
    }

    /// Number of registered session-change handlers.
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Identity registered under `email`.
    pub fn identity_for(&self, email: &str) -> Option<Identity> {
        self.users
            .get(&email.to_ascii_lowercase())
            .map(|u| u.identity.clone())
    }

    // ─── Tokens ──────────────────────────────────────────────────────

    fn issue_session(&self, identity: &Identity) -> Result<AuthSession> {
        let now = Utc::now().timestamp();
        let exp = now + self.token_ttl_secs.load(Ordering::SeqCst);

        let claims = Claims {
            sub: identity.id.clone(),
            email: identity.email.clone(),
            iat: now,
            exp,
        };

        let access_token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(&self.signing_key),
        )
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Token signing failed: {}", e)))?;

        Ok(AuthSession {
            access_token,
            refresh_token: format!("refresh-{}-{}", identity.id, now),
            expires_at: exp,
            user: identity.clone(),
        })
    }

    fn token_valid(&self, session: &AuthSession) -> bool {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        decode::<Claims>(
            &session.access_token,
            &DecodingKey::from_secret(&self.signing_key),
            &validation,
        )
        .map(|data| data.claims.sub == session.user.id)
        .unwrap_or(false)
    }
}

#[async_trait]
impl AuthBackend for MemoryBackend {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<AuthResponse> {
        self.record(Call::SignIn);

        let identity = match self.users.get(&email.to_ascii_lowercase()) {
            Some(user) if user.password == password => user.identity.clone(),
            _ => {
                return Err(AppError::AuthRejected(
                    "Invalid login credentials".to_string(),
                ))
            }
        };

        let session = self.issue_session(&identity)?;
        *self.session.write().await = Some(session.clone());
        self.listeners.emit(&AuthEvent::signed_in(identity.clone()));

        Ok(AuthResponse {
            user: Some(identity),
            session: Some(session),
        })
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: Option<&UserMetadata>,
    ) -> Result<AuthResponse> {
        self.record(Call::SignUp);

        if self.users.contains_key(&email.to_ascii_lowercase()) {
            return Err(AppError::AuthRejected("User already registered".to_string()));
        }

        let identity = self.insert_user(email, password, metadata.cloned().unwrap_or_default());

        if self.require_confirmation.load(Ordering::SeqCst) {
            return Ok(AuthResponse {
                user: Some(identity),
                session: None,
            });
        }

        let session = self.issue_session(&identity)?;
        *self.session.write().await = Some(session.clone());
        self.listeners.emit(&AuthEvent::signed_in(identity.clone()));

        Ok(AuthResponse {
            user: Some(identity),
            session: Some(session),
        })
    }

    async fn sign_out(&self) -> Result<()> {
        self.record(Call::SignOut);

        if self.failing(Fault::SignOut) {
            return Err(AppError::Backend("connection reset by peer".to_string()));
        }

        self.session.write().await.take();
        self.listeners.emit(&AuthEvent::signed_out());
        Ok(())
    }

    async fn get_session(&self) -> Result<Option<AuthSession>> {
        self.record(Call::GetSession);

        if self.failing(Fault::SessionLookup) {
            return Err(AppError::Backend("connection refused".to_string()));
        }

        let mut session = self.session.write().await;
        match session.as_ref() {
            Some(s) if self.token_valid(s) => Ok(Some(s.clone())),
            Some(_) => {
                tracing::debug!("Stored session expired, discarding");
                session.take();
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn on_auth_state_change(&self, handler: AuthStateHandler) -> Subscription {
        self.listeners.subscribe(handler)
    }

    async fn update_user_metadata(&self, metadata: &UserMetadata) -> Result<Identity> {
        self.record(Call::UpdateMetadata);

        if self.failing(Fault::MetadataUpdate) {
            return Err(AppError::Backend("metadata update timed out".to_string()));
        }

        let mut session = self.session.write().await;
        let current = session.as_mut().ok_or(AppError::Unauthorized)?;

        let key = current
            .user
            .email
            .as_deref()
            .unwrap_or_default()
            .to_ascii_lowercase();
        let mut user = self
            .users
            .get_mut(&key)
            .ok_or_else(|| AppError::NotFound(format!("user {}", current.user.id)))?;

        let stored = &mut user.identity.user_metadata;
        if metadata.full_name.is_some() {
            stored.full_name = metadata.full_name.clone();
        }
        if metadata.display_name.is_some() {
            stored.display_name = metadata.display_name.clone();
        }
        stored
            .extra
            .extend(metadata.extra.iter().map(|(k, v)| (k.clone(), v.clone())));

        let identity = user.identity.clone();
        drop(user);
        current.user = identity.clone();
        drop(session);

        self.listeners.emit(&AuthEvent {
            kind: AuthChangeEvent::UserUpdated,
            identity: Some(identity.clone()),
        });

        Ok(identity)
    }

    async fn reset_password_for_email(&self, email: &str) -> Result<()> {
        self.record(Call::ResetPassword);
        // Same answer for unknown addresses, so accounts can't be probed.
        tracing::debug!(
            known = self.users.contains_key(&email.to_ascii_lowercase()),
            "Password reset requested"
        );
        Ok(())
    }

    async fn select_profile_by_id(&self, id: &str) -> Result<Profile> {
        self.record(Call::SelectProfile);

        let hold = self.read_hold.lock().await.clone();
        if let Some(hold) = hold {
            hold.park().await;
        }

        if self.failing(Fault::ProfileRead) {
            return Err(AppError::Database("connection reset by peer".to_string()));
        }

        self.profiles.get(id).map(|p| p.value().clone()).ok_or_else(|| {
            AppError::NotFound(format!(
                "{}: no profile row for {}",
                AppError::PROFILE_NOT_FOUND_CODE,
                id
            ))
        })
    }

    async fn upsert_profile(&self, id: &str, patch: &ProfilePatch) -> Result<Profile> {
        self.record(Call::UpsertProfile);

        if self.failing(Fault::ProfileWrite) {
            return Err(AppError::Database(
                "new row violates row-level security policy".to_string(),
            ));
        }

        let mut row = self
            .profiles
            .entry(id.to_string())
            .or_insert_with(|| Profile::empty(id));
        row.apply(patch);
        Ok(row.value().clone())
    }
}
