// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session state holder.
//!
//! Holds the current identity (or none) plus a loading flag. The state
//! lives in a `watch` channel so the UI layer can await changes, and is
//! replaced by every session-change notification (last one wins).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

use crate::backend::{AuthBackend, AuthStateHandler, Subscription};
use crate::models::{AuthEvent, Identity};

/// Snapshot of the session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub identity: Option<Identity>,
    /// True until `initialize` has finished
    pub loading: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            identity: None,
            loading: true,
        }
    }
}

/// Owner of the in-memory identity. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    backend: Arc<dyn AuthBackend>,
    state: watch::Sender<SessionState>,
    subscription: Mutex<Option<Subscription>>,
    initialized: AtomicBool,
}

impl SessionStore {
    pub fn new(backend: Arc<dyn AuthBackend>) -> Self {
        let (state, _) = watch::channel(SessionState::default());
        Self {
            inner: Arc::new(SessionInner {
                backend,
                state,
                subscription: Mutex::new(None),
                initialized: AtomicBool::new(false),
            }),
        }
    }

    /// Subscribe to session changes, then load any existing session.
    ///
    /// Lookup failures are logged and treated as "no session". Only the
    /// first call does any work; later calls return the current identity.
    pub async fn initialize(&self) -> Option<Identity> {
        if self.inner.initialized.swap(true, Ordering::SeqCst) {
            return self.identity();
        }

        // Subscribe first so a change during the lookup is not lost.
        self.subscribe_to_changes();

        match self.inner.backend.get_session().await {
            Ok(Some(session)) => {
                tracing::info!(user_id = %session.user.id, "Restored existing session");
                self.set_identity(Some(session.user));
            }
            Ok(None) => {
                tracing::debug!("No existing session");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Session lookup failed, continuing signed out");
            }
        }

        self.inner.state.send_modify(|s| s.loading = false);
        self.identity()
    }

    fn subscribe_to_changes(&self) {
        // Weak: a discarded store must never be acted on.
        let weak = Arc::downgrade(&self.inner);
        let handler: AuthStateHandler = Arc::new(move |event: &AuthEvent| {
            if let Some(inner) = weak.upgrade() {
                tracing::debug!(kind = ?event.kind, "Session change notification");
                SessionStore { inner }.on_session_changed(event.identity.clone());
            }
        });

        let subscription = self.inner.backend.on_auth_state_change(handler);
        *lock(&self.inner.subscription) = Some(subscription);
    }

    /// Replace the held identity unconditionally.
    pub fn on_session_changed(&self, identity: Option<Identity>) {
        self.set_identity(identity);
    }

    /// Stop listening for session changes. Safe to call repeatedly.
    pub fn teardown(&self) {
        if let Some(subscription) = lock(&self.inner.subscription).take() {
            subscription.unsubscribe();
            tracing::debug!("Unsubscribed from session changes");
        }
    }

    pub(crate) fn set_identity(&self, identity: Option<Identity>) {
        self.inner.state.send_if_modified(|s| {
            if s.identity == identity {
                return false;
            }
            s.identity = identity;
            true
        });
    }

    pub fn identity(&self) -> Option<Identity> {
        self.inner.state.borrow().identity.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.inner.state.borrow().loading
    }

    pub fn state(&self) -> SessionState {
        self.inner.state.borrow().clone()
    }

    /// Receiver that observes every future state change.
    pub fn watch(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }
}

/// Lock ignoring poisoning; the guarded value is a plain handle.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
