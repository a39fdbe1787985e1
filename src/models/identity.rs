// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Identity and session models as issued by the auth service.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Authenticated identity, owned by the remote service.
///
/// The app only ever holds a read-only cached copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    /// Service-issued user ID (also the profile row key)
    pub id: String,
    /// Email address (absent for phone-only accounts)
    #[serde(default)]
    pub email: Option<String>,
    /// Free-form metadata supplied at sign-up or via metadata updates
    #[serde(default)]
    pub user_metadata: UserMetadata,
}

impl Identity {
    /// Part of the email before `@`, or empty if there is no email.
    pub fn email_local_part(&self) -> &str {
        self.email
            .as_deref()
            .and_then(|e| e.split('@').next())
            .unwrap_or_default()
    }

    /// Name to show for this identity: metadata full name, then display
    /// name, then the email local-part.
    pub fn derived_name(&self) -> String {
        self.user_metadata
            .full_name
            .as_deref()
            .or(self.user_metadata.display_name.as_deref())
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| self.email_local_part())
            .to_string()
    }
}

/// Identity metadata. Unknown keys are kept so a round trip never drops them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl UserMetadata {
    /// Metadata carrying only a display name, as sent on sign-up and on
    /// profile name changes.
    pub fn with_full_name(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            full_name: Some(name.clone()),
            display_name: Some(name),
            extra: HashMap::new(),
        }
    }
}

/// A signed-in session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token expiry (Unix timestamp)
    pub expires_at: i64,
    pub user: Identity,
}

/// Result of a sign-in or sign-up exchange.
///
/// Either half may be missing: sign-up with email confirmation enabled
/// returns a user but no session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthResponse {
    pub user: Option<Identity>,
    pub session: Option<AuthSession>,
}

/// Kind of session change reported by the notification channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthChangeEvent {
    InitialSession,
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
}

/// A session-change notification.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthEvent {
    pub kind: AuthChangeEvent,
    pub identity: Option<Identity>,
}

impl AuthEvent {
    pub fn signed_in(identity: Identity) -> Self {
        Self {
            kind: AuthChangeEvent::SignedIn,
            identity: Some(identity),
        }
    }

    pub fn signed_out() -> Self {
        Self {
            kind: AuthChangeEvent::SignedOut,
            identity: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(email: Option<&str>, metadata: UserMetadata) -> Identity {
        Identity {
            id: "u1".to_string(),
            email: email.map(String::from),
            user_metadata: metadata,
        }
    }

    #[test]
    fn test_derived_name_prefers_metadata() {
        let id = identity(
            Some("juan.cruz@example.com"),
            UserMetadata::with_full_name("Juan Cruz"),
        );
        assert_eq!(id.derived_name(), "Juan Cruz");
    }

    #[test]
    fn test_derived_name_falls_back_to_email() {
        let id = identity(Some("juan.cruz@example.com"), UserMetadata::default());
        assert_eq!(id.derived_name(), "juan.cruz");

        let blank = UserMetadata {
            full_name: Some("   ".to_string()),
            ..Default::default()
        };
        let id = identity(Some("a@b.c"), blank);
        assert_eq!(id.derived_name(), "a");
    }

    #[test]
    fn test_email_local_part_without_email() {
        let id = identity(None, UserMetadata::default());
        assert_eq!(id.email_local_part(), "");
        assert_eq!(id.derived_name(), "");
    }

    #[test]
    fn test_metadata_keeps_unknown_keys() {
        let json = r#"{"full_name":"Ana","avatar":"x.png"}"#;
        let meta: UserMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(meta.full_name.as_deref(), Some("Ana"));
        assert_eq!(meta.extra.get("avatar").and_then(|v| v.as_str()), Some("x.png"));

        let back = serde_json::to_value(&meta).unwrap();
        assert_eq!(back["avatar"], "x.png");
    }
}
