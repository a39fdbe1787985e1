// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Data models for the application.

pub mod identity;
pub mod profile;

pub use identity::{AuthChangeEvent, AuthEvent, AuthResponse, AuthSession, Identity, UserMetadata};
pub use profile::{Profile, ProfileForm, ProfilePatch};
