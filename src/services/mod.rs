// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - session, profile and credential logic.

pub mod auth;
pub mod profile;
pub mod session;

pub use auth::AuthService;
pub use profile::ProfileSync;
pub use session::{SessionState, SessionStore};
