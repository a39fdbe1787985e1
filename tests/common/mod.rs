// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json, Router,
};
use betmaster::backend::MemoryBackend;
use betmaster::config::{BackendKind, Config};
use betmaster::AppContext;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Fixture account present in every memory backend.
#[allow(dead_code)]
pub const TEST_EMAIL: &str = "test@test.com";
#[allow(dead_code)]
pub const TEST_PASSWORD: &str = "12345678";

/// Create a memory backend with the fixture accounts.
#[allow(dead_code)]
pub fn test_backend() -> Arc<MemoryBackend> {
    Arc::new(MemoryBackend::new(&Config::test_default().memory_jwt_key))
}

/// Create a test app around a fresh memory backend.
/// Returns the context and the backend for fault injection.
#[allow(dead_code)]
pub fn create_test_app() -> (AppContext, Arc<MemoryBackend>) {
    let backend = test_backend();
    let ctx = AppContext::new(Config::test_default(), backend.clone());
    (ctx, backend)
}

/// Same as [`create_test_app`], with the session already initialized.
#[allow(dead_code)]
pub async fn create_started_app() -> (AppContext, Arc<MemoryBackend>) {
    let (ctx, backend) = create_test_app();
    ctx.start().await;
    (ctx, backend)
}

// ─── Fake Supabase service ───────────────────────────────────────────

/// Account the fake service accepts: (email, password, id).
#[allow(dead_code)]
pub const FAKE_USER: (&str, &str, &str) = ("test@test.com", "12345678", "user-1");

/// Account whose access tokens expire inside the refresh margin.
#[allow(dead_code)]
pub const FAKE_SHORT_LIVED_USER: (&str, &str, &str) = ("short@test.com", "12345678", "user-9");

/// A request as seen by the fake service.
#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub query: String,
    pub headers: HeaderMap,
    pub body: Value,
}

/// State behind the fake service.
#[derive(Default)]
pub struct FakeSupabase {
    pub requests: Mutex<Vec<RecordedRequest>>,
    /// Profile rows keyed by id
    pub profiles: Mutex<HashMap<String, Value>>,
    /// Answer profile writes with a row-level security violation
    pub reject_profile_writes: Mutex<bool>,
    /// Answer sign-ups with a full session instead of a bare user
    pub autoconfirm_signups: Mutex<bool>,
    /// Answer refresh grants as if the refresh token was revoked
    pub reject_refresh: Mutex<bool>,
}

#[allow(dead_code)]
impl FakeSupabase {
    /// Requests received for `path`, oldest first.
    pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.path == path)
            .cloned()
            .collect()
    }

    pub fn profile_row(&self, id: &str) -> Option<Value> {
        self.profiles.lock().unwrap().get(id).cloned()
    }

    pub fn insert_profile(&self, row: Value) {
        let id = row["id"].as_str().unwrap().to_string();
        self.profiles.lock().unwrap().insert(id, row);
    }
}

/// Start the fake service on a random local port.
/// Returns a config pointing at it and the shared fake state.
#[allow(dead_code)]
pub async fn start_fake_supabase() -> (Config, Arc<FakeSupabase>) {
    let state = Arc::new(FakeSupabase::default());
    let app = Router::new().fallback(handle).with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind fake service");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let config = Config {
        backend: BackendKind::Supabase,
        supabase_url: format!("http://{}", addr),
        ..Config::test_default()
    };
    (config, state)
}

async fn handle(
    State(state): State<Arc<FakeSupabase>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let body: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    let path = uri.path().to_string();
    let query = uri.query().unwrap_or_default().to_string();

    state.requests.lock().unwrap().push(RecordedRequest {
        method: method.clone(),
        path: path.clone(),
        query: query.clone(),
        headers: headers.clone(),
        body: body.clone(),
    });

    if headers.get("apikey").and_then(|v| v.to_str().ok()) != Some("test_anon_key") {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "message": "No API key found in request" })),
        )
            .into_response();
    }

    match (method, path.as_str()) {
        (Method::POST, "/auth/v1/token") if query.contains("grant_type=password") => {
            password_grant(&body)
        }
        (Method::POST, "/auth/v1/token") if query.contains("grant_type=refresh_token") => {
            if *state.reject_refresh.lock().unwrap() {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({
                        "code": 400,
                        "error_code": "refresh_token_not_found",
                        "msg": "Invalid Refresh Token: Refresh Token Not Found",
                    })),
                )
                    .into_response();
            }
            let (email, _, id) = FAKE_SHORT_LIVED_USER;
            Json(token_body("access-refreshed", 3600, id, email)).into_response()
        }
        (Method::POST, "/auth/v1/signup") => sign_up(&state, &body),
        (Method::POST, "/auth/v1/logout") => StatusCode::NO_CONTENT.into_response(),
        (Method::POST, "/auth/v1/recover") => Json(json!({})).into_response(),
        (Method::PUT, "/auth/v1/user") => {
            let (email, _, id) = FAKE_USER;
            Json(json!({ "id": id, "email": email, "user_metadata": body["data"] }))
                .into_response()
        }
        (Method::GET, "/rest/v1/profiles") => select_profile(&state, &query),
        (Method::POST, "/rest/v1/profiles") => upsert_profile(&state, body),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

fn token_body(access_token: &str, expires_in: i64, id: &str, email: &str) -> Value {
    json!({
        "access_token": access_token,
        "token_type": "bearer",
        "expires_in": expires_in,
        "refresh_token": format!("refresh-{}", id),
        "user": {
            "id": id,
            "email": email,
            "user_metadata": { "full_name": "TEST" },
        },
    })
}

fn sign_up(state: &FakeSupabase, body: &Value) -> Response {
    let user = json!({
        "id": "user-2",
        "email": body["email"],
        "user_metadata": body["data"],
    });

    if *state.autoconfirm_signups.lock().unwrap() {
        let mut session = token_body("access-user-2", 3600, "user-2", "");
        session["user"] = user;
        return Json(session).into_response();
    }
    Json(user).into_response()
}

fn password_grant(body: &Value) -> Response {
    let email = body["email"].as_str().unwrap_or_default();
    let password = body["password"].as_str().unwrap_or_default();

    for (user, expires_in) in [(FAKE_USER, 3600), (FAKE_SHORT_LIVED_USER, 60)] {
        let (known_email, known_password, id) = user;
        if email == known_email && password == known_password {
            let token = format!("access-{}", id);
            return Json(token_body(&token, expires_in, id, email)).into_response();
        }
    }

    (
        StatusCode::BAD_REQUEST,
        Json(json!({
            "code": 400,
            "error_code": "invalid_credentials",
            "msg": "Invalid login credentials",
        })),
    )
        .into_response()
}

fn select_profile(state: &FakeSupabase, query: &str) -> Response {
    let id = query
        .split('&')
        .find_map(|pair| pair.strip_prefix("id=eq."))
        .map(|id| urlencoding::decode(id).unwrap().into_owned())
        .unwrap_or_default();

    match state.profile_row(&id) {
        Some(row) => Json(row).into_response(),
        None => (
            StatusCode::NOT_ACCEPTABLE,
            Json(json!({
                "code": "PGRST116",
                "details": "The result contains 0 rows",
                "hint": null,
                "message": "JSON object requested, multiple (or no) rows returned",
            })),
        )
            .into_response(),
    }
}

fn upsert_profile(state: &FakeSupabase, body: Value) -> Response {
    if *state.reject_profile_writes.lock().unwrap() {
        return (
            StatusCode::FORBIDDEN,
            Json(json!({
                "code": "42501",
                "message": "new row violates row-level security policy for table \"profiles\"",
            })),
        )
            .into_response();
    }

    let Some(fields) = body.as_object() else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    let id = fields["id"].as_str().unwrap_or_default().to_string();

    let mut profiles = state.profiles.lock().unwrap();
    let row = profiles.entry(id.clone()).or_insert_with(|| {
        json!({
            "id": id,
            "full_name": "",
            "balance": 0,
            "bets_open": 0,
            "win_rate": 0,
            "is_verified": false,
        })
    });
    for (key, value) in fields {
        row[key] = value.clone();
    }

    (StatusCode::CREATED, Json(row.clone())).into_response()
}
