// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent user-facing messages.

/// Application error type shared by the backends and services.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("No active session")]
    Unauthorized,

    #[error("Authentication rejected: {0}")]
    AuthRejected(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// PostgREST code for "single object requested, zero rows returned".
    pub const PROFILE_NOT_FOUND_CODE: &'static str = "PGRST116";

    /// Whether this error means the requested row does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::NotFound(_))
    }

    /// Whether the remote service refused the supplied credentials.
    pub fn is_auth_rejected(&self) -> bool {
        matches!(self, AppError::AuthRejected(_))
    }

    /// Short message suitable for showing to the person using the app.
    ///
    /// Transport and storage details are logged, not shown.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Unauthorized => "Please sign in first.".to_string(),
            AppError::AuthRejected(msg) => msg.clone(),
            AppError::NotFound(_) => "Profile not found.".to_string(),
            AppError::BadRequest(msg) => msg.clone(),
            AppError::Backend(msg) => {
                tracing::error!(error = %msg, "Backend error");
                "The service is unreachable. Try again later.".to_string()
            }
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                "Could not save your changes. Try again.".to_string()
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal error");
                "Something went wrong.".to_string()
            }
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Backend(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields: Vec<String> = errors
            .field_errors()
            .into_iter()
            .map(|(field, errs)| {
                let reason = errs
                    .first()
                    .and_then(|e| e.message.as_ref())
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| "is invalid".to_string());
                format!("{} {}", field, reason)
            })
            .collect();
        fields.sort();
        AppError::BadRequest(fields.join(", "))
    }
}

/// Result type alias for backend and service operations.
pub type Result<T> = std::result::Result<T, AppError>;
