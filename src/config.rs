// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! A `.env` file in the working directory is honored for local development.

use std::env;
use std::str::FromStr;

/// Which implementation of the remote auth/database service to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Hosted Supabase project over HTTP.
    Supabase,
    /// In-process backend with the fixture accounts.
    Memory,
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "supabase" => Ok(BackendKind::Supabase),
            "memory" => Ok(BackendKind::Memory),
            other => Err(ConfigError::Invalid {
                var: "BETMASTER_BACKEND",
                value: other.to_string(),
            }),
        }
    }
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Backend implementation to construct
    pub backend: BackendKind,
    /// Project base URL, e.g. `https://xyz.supabase.co`
    pub supabase_url: String,
    /// Public anon key sent as `apikey` on every request
    pub supabase_anon_key: String,
    /// Table holding one profile row per identity
    pub profiles_table: String,
    /// HTTP request timeout in seconds
    pub request_timeout_secs: u64,
    /// HS256 key the memory backend signs its access tokens with (raw bytes)
    pub memory_jwt_key: Vec<u8>,
}

impl Config {
    /// Config for tests: memory backend, local URLs.
    pub fn test_default() -> Self {
        Self {
            backend: BackendKind::Memory,
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test_anon_key".to_string(),
            profiles_table: crate::backend::tables::PROFILES.to_string(),
            request_timeout_secs: 5,
            memory_jwt_key: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// `SUPABASE_URL` and `SUPABASE_ANON_KEY` are only required when the
    /// Supabase backend is selected.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Like [`from_env`](Self::from_env), with the backend chosen by the
    /// caller instead of `BETMASTER_BACKEND` when `backend` is given.
    pub fn load(backend: Option<BackendKind>) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let backend = match (backend, env::var("BETMASTER_BACKEND")) {
            (Some(kind), _) => kind,
            (None, Ok(v)) => v.parse()?,
            (None, Err(_)) => BackendKind::Supabase,
        };

        let required = |var: &'static str| -> Result<String, ConfigError> {
            match env::var(var) {
                Ok(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
                _ if backend == BackendKind::Memory => Ok(String::new()),
                _ => Err(ConfigError::Missing(var)),
            }
        };

        Ok(Self {
            backend,
            supabase_url: required("SUPABASE_URL")?
                .trim_end_matches('/')
                .to_string(),
            supabase_anon_key: required("SUPABASE_ANON_KEY")?,
            profiles_table: env::var("PROFILES_TABLE")
                .unwrap_or_else(|_| crate::backend::tables::PROFILES.to_string()),
            request_timeout_secs: env::var("REQUEST_TIMEOUT_SECS")
                .unwrap_or_else(|_| "15".to_string())
                .parse()
                .unwrap_or(15),
            memory_jwt_key: env::var("MEMORY_JWT_KEY")
                .unwrap_or_else(|_| "betmaster-local-memory-signing-key".to_string())
                .into_bytes(),
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {var}: {value}")]
    Invalid { var: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_kind_parse() {
        assert_eq!(
            "memory".parse::<BackendKind>().unwrap(),
            BackendKind::Memory
        );
        assert_eq!(
            " Supabase ".parse::<BackendKind>().unwrap(),
            BackendKind::Supabase
        );
        assert!(matches!(
            "firebase".parse::<BackendKind>(),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn test_config_from_env() {
        // Set required env vars for test
        env::set_var("BETMASTER_BACKEND", "supabase");
        env::set_var("SUPABASE_URL", "https://example.supabase.co/");
        env::set_var("SUPABASE_ANON_KEY", "anon");

        let config = Config::from_env().expect("Config should load");

        assert_eq!(config.backend, BackendKind::Supabase);
        assert_eq!(config.supabase_url, "https://example.supabase.co");
        assert_eq!(config.supabase_anon_key, "anon");
        assert_eq!(config.profiles_table, "profiles");
        assert_eq!(config.request_timeout_secs, 15);
    }

    #[test]
    fn test_explicit_memory_backend_needs_no_project() {
        let config = Config::load(Some(BackendKind::Memory)).expect("Config should load");
        assert_eq!(config.backend, BackendKind::Memory);
        assert!(!config.memory_jwt_key.is_empty());
    }
}
