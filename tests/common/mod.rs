// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared test helpers: scratch database, stub identity provider, and a
//! recording sheet appender.

use async_trait::async_trait;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use sheetfin::config::ClientRegistration;
use sheetfin::conversation::ConversationEngine;
use sheetfin::db::Database;
use sheetfin::error::AppError;
use sheetfin::models::{CategoryCatalog, Credential, CredentialRow};
use sheetfin::services::{OAuthManager, SheetAppender, TokenCipher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Create a scratch database in a temp directory.
#[allow(dead_code)]
pub async fn test_db() -> (Database, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("test.db");
    let db = Database::open(path.to_str().unwrap())
        .await
        .expect("open test db");
    (db, dir)
}

/// Cipher with a fixed test key.
#[allow(dead_code)]
pub fn test_cipher() -> TokenCipher {
    TokenCipher::new(&[0x42; 32]).expect("cipher")
}

/// Registration whose endpoints all point at the stub provider.
#[allow(dead_code)]
pub fn stub_registration(base_url: &str) -> ClientRegistration {
    ClientRegistration {
        client_id: "test-client".to_string(),
        client_secret: "test-secret".to_string(),
        auth_uri: format!("{}/auth", base_url),
        token_uri: format!("{}/token", base_url),
        revocation_uri: format!("{}/revoke", base_url),
    }
}

/// Authorization manager wired to the stub provider.
#[allow(dead_code)]
pub fn test_manager(db: &Database, base_url: &str) -> OAuthManager {
    OAuthManager::new(
        stub_registration(base_url),
        "http://localhost:8000/oauth2callback".to_string(),
        db.clone(),
        test_cipher(),
    )
    .expect("manager")
}

/// Store an encrypted credential directly, as a past exchange would have.
#[allow(dead_code)]
pub async fn seed_credential(
    db: &Database,
    cipher: &TokenCipher,
    user_id: &str,
    token_uri: &str,
    expiry: DateTime<Utc>,
) {
    let credential = Credential {
        access_token: "seeded-access".to_string(),
        refresh_token: "seeded-refresh".to_string(),
        token_uri: token_uri.to_string(),
        client_id: "test-client".to_string(),
        scopes: vec!["https://www.googleapis.com/auth/spreadsheets".to_string()],
        expiry,
    };
    let payload = serde_json::to_string(&credential).unwrap();
    let encrypted_payload = cipher.seal(user_id, &payload).unwrap();

    db.put_credential(&CredentialRow {
        user_id: user_id.to_string(),
        encrypted_payload,
        expiry: expiry.to_rfc3339(),
        updated_at: Utc::now().to_rfc3339(),
    })
    .await
    .unwrap();
}

// ─── Stub identity provider ──────────────────────────────────────────────────

/// How the stub token endpoint answers.
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub enum TokenMode {
    /// 200 with fresh tokens; `refresh_token` controls whether one is issued
    Success { refresh_token: Option<String> },
    /// 400 `invalid_grant` (permanent rejection)
    InvalidGrant,
    /// 503 (transient failure)
    Unavailable,
}

struct StubState {
    mode: Mutex<TokenMode>,
    token_calls: AtomicUsize,
    revoke_calls: AtomicUsize,
}

/// In-process identity provider with `/token` and `/revoke` endpoints.
#[allow(dead_code)]
pub struct StubProvider {
    pub base_url: String,
    state: Arc<StubState>,
}

#[allow(dead_code)]
impl StubProvider {
    pub fn set_mode(&self, mode: TokenMode) {
        *self.state.mode.lock().unwrap() = mode;
    }

    pub fn token_calls(&self) -> usize {
        self.state.token_calls.load(Ordering::SeqCst)
    }

    pub fn revoke_calls(&self) -> usize {
        self.state.revoke_calls.load(Ordering::SeqCst)
    }
}

async fn token_endpoint(State(state): State<Arc<StubState>>) -> Response {
    let call = state.token_calls.fetch_add(1, Ordering::SeqCst) + 1;
    let mode = state.mode.lock().unwrap().clone();

    match mode {
        TokenMode::Success { refresh_token } => {
            let mut body = json!({
                "access_token": format!("access-{}", call),
                "expires_in": 3600,
                "scope": "https://www.googleapis.com/auth/spreadsheets",
                "token_type": "Bearer",
            });
            if let Some(refresh) = refresh_token {
                body["refresh_token"] = json!(refresh);
            }
            Json(body).into_response()
        }
        TokenMode::InvalidGrant => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "invalid_grant", "error_description": "Token revoked" })),
        )
            .into_response(),
        TokenMode::Unavailable => StatusCode::SERVICE_UNAVAILABLE.into_response(),
    }
}

async fn revoke_endpoint(State(state): State<Arc<StubState>>) -> StatusCode {
    state.revoke_calls.fetch_add(1, Ordering::SeqCst);
    StatusCode::OK
}

/// Bind the stub provider on an ephemeral port.
#[allow(dead_code)]
pub async fn spawn_provider(mode: TokenMode) -> StubProvider {
    let state = Arc::new(StubState {
        mode: Mutex::new(mode),
        token_calls: AtomicUsize::new(0),
        revoke_calls: AtomicUsize::new(0),
    });

    let app = Router::new()
        .route("/token", post(token_endpoint))
        .route("/revoke", post(revoke_endpoint))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind stub provider");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("stub provider");
    });

    StubProvider {
        base_url: format!("http://{}", addr),
        state,
    }
}

// ─── Recording sheet appender ────────────────────────────────────────────────

/// One appended row captured by `MockSheets`.
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub struct AppendedRow {
    pub user_id: String,
    pub sheet: String,
    pub values: Vec<Value>,
}

/// `SheetAppender` that records instead of talking to the spreadsheet API.
#[derive(Clone, Default)]
#[allow(dead_code)]
pub struct MockSheets {
    rows: Arc<Mutex<Vec<AppendedRow>>>,
    fail_next: Arc<Mutex<Option<String>>>,
}

#[allow(dead_code)]
impl MockSheets {
    pub fn rows(&self) -> Vec<AppendedRow> {
        self.rows.lock().unwrap().clone()
    }

    /// Make the next append fail with a sheet-access error.
    pub fn fail_next(&self, reason: &str) {
        *self.fail_next.lock().unwrap() = Some(reason.to_string());
    }
}

#[async_trait]
impl SheetAppender for MockSheets {
    async fn append_row(
        &self,
        user_id: &str,
        sheet_name: &str,
        values: Vec<Value>,
    ) -> Result<(), AppError> {
        if let Some(reason) = self.fail_next.lock().unwrap().take() {
            return Err(AppError::SheetAccess(reason));
        }
        self.rows.lock().unwrap().push(AppendedRow {
            user_id: user_id.to_string(),
            sheet: sheet_name.to_string(),
            values,
        });
        Ok(())
    }
}

/// Conversation engine over the stub provider and recording appender.
#[allow(dead_code)]
pub fn test_engine(db: &Database, manager: &OAuthManager, sheets: &MockSheets) -> ConversationEngine {
    ConversationEngine::new(
        manager.clone(),
        Arc::new(sheets.clone()),
        db.clone(),
        CategoryCatalog::default(),
    )
}
