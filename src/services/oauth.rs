// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Delegated authorization manager for the spreadsheet provider.
//!
//! Handles:
//! - Authorization URL issuance with single-use state tokens
//! - Authorization-code exchange and credential persistence
//! - Proactive token refresh with refresh-or-delete semantics
//! - Best-effort revocation (remote call advisory, local deletion primary)

use crate::config::ClientRegistration;
use crate::db::Database;
use crate::error::AppError;
use crate::models::{Credential, CredentialRow};
use crate::services::crypto::TokenCipher;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use ring::rand::{SecureRandom, SystemRandom};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Margin before token expiration when we proactively refresh (5 minutes).
const TOKEN_REFRESH_MARGIN_SECS: i64 = 5 * 60;

/// Window within which an issued authorization state stays consumable.
const AUTH_STATE_TTL_SECS: i64 = 10 * 60;

/// Conservative timeout for identity-provider calls.
const PROVIDER_TIMEOUT_SECS: u64 = 10;

/// Scopes requested at consent time.
const SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/spreadsheets",
    "https://www.googleapis.com/auth/drive.file",
    "https://www.googleapis.com/auth/drive.readonly",
];

// ─────────────────────────────────────────────────────────────────────────────
// ProviderClient - raw token endpoint calls
// ─────────────────────────────────────────────────────────────────────────────

/// Successful token response from the provider.
#[derive(Debug, Clone, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    /// Lifetime of the access token in seconds
    expires_in: i64,
    /// Space-delimited granted scopes
    #[serde(default)]
    scope: Option<String>,
}

/// OAuth error body (`{"error": "...", "error_description": "..."}`).
#[derive(Debug, Deserialize)]
struct OAuthErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

/// Error codes that mean the grant itself is dead, not the network.
const PERMANENT_REFRESH_ERRORS: &[&str] =
    &["invalid_grant", "invalid_client", "unauthorized_client"];

/// Classify a non-success refresh response.
///
/// Only a definite OAuth error code on a 400/401 counts as a permanent
/// rejection; everything ambiguous is treated as transient so the stored
/// credential survives for a later retry.
fn classify_refresh_failure(status: u16, body: &str) -> AppError {
    if status == 400 || status == 401 {
        if let Ok(parsed) = serde_json::from_str::<OAuthErrorBody>(body) {
            if let Some(code) = parsed.error {
                if PERMANENT_REFRESH_ERRORS.contains(&code.as_str()) {
                    let detail = parsed.error_description.unwrap_or_default();
                    return AppError::RefreshRejected(format!("{} {}", code, detail));
                }
                return AppError::TransientAuth(format!("HTTP {}: {}", status, code));
            }
        }
    }
    AppError::TransientAuth(format!("HTTP {}", status))
}

/// Raw HTTP client for the identity provider's token endpoints.
#[derive(Clone)]
struct ProviderClient {
    http: reqwest::Client,
    registration: ClientRegistration,
}

impl ProviderClient {
    fn new(registration: ClientRegistration) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(PROVIDER_TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("HTTP client build: {}", e)))?;
        Ok(Self { http, registration })
    }

    /// Exchange an authorization code for tokens.
    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenResponse, AppError> {
        let response = self
            .http
            .post(&self.registration.token_uri)
            .form(&[
                ("client_id", self.registration.client_id.as_str()),
                ("client_secret", self.registration.client_secret.as_str()),
                ("code", code),
                ("redirect_uri", redirect_uri),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .map_err(|e| AppError::Exchange(format!("token exchange request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Token exchange failed");
            return Err(AppError::Exchange(format!(
                "provider rejected code with status {}",
                status
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Exchange(format!("token response parse error: {}", e)))
    }

    /// Refresh an expired access token.
    ///
    /// `token_uri` comes from the stored credential, not the registration, so
    /// a credential issued against an older registration keeps working.
    async fn refresh(&self, token_uri: &str, refresh_token: &str) -> Result<TokenResponse, AppError> {
        let response = self
            .http
            .post(token_uri)
            .form(&[
                ("client_id", self.registration.client_id.as_str()),
                ("client_secret", self.registration.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| AppError::TransientAuth(format!("refresh request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(classify_refresh_failure(status, &body));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::TransientAuth(format!("refresh response parse error: {}", e)))
    }

    /// Revoke a token with the provider. Advisory; callers must not let a
    /// failure here block local deletion.
    async fn revoke(&self, token: &str) -> Result<(), AppError> {
        let response = self
            .http
            .post(&self.registration.revocation_uri)
            .form(&[("token", token)])
            .send()
            .await
            .map_err(|e| AppError::TransientAuth(format!("revocation request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::TransientAuth(format!(
                "revocation returned HTTP {}",
                response.status()
            )));
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// OAuthManager - authorization lifecycle
// ─────────────────────────────────────────────────────────────────────────────

/// One outstanding authorization attempt, keyed by its state token.
#[derive(Debug, Clone)]
struct PendingAuthorization {
    user_id: String,
    issued_at: DateTime<Utc>,
}

/// Shared per-user refresh locks.
type RefreshLocks = Arc<DashMap<String, Arc<Mutex<()>>>>;

/// Manages the full authorization-code-grant lifecycle and hands out valid,
/// non-expired credentials on demand.
#[derive(Clone)]
pub struct OAuthManager {
    provider: ProviderClient,
    db: Database,
    cipher: TokenCipher,
    redirect_uri: String,
    /// state token -> pending attempt; entries are single-use
    pending: Arc<DashMap<String, PendingAuthorization>>,
    /// Per-user mutex to serialize credential load/refresh/store.
    refresh_locks: RefreshLocks,
    rng: SystemRandom,
}

impl OAuthManager {
    pub fn new(
        registration: ClientRegistration,
        redirect_uri: String,
        db: Database,
        cipher: TokenCipher,
    ) -> Result<Self, AppError> {
        Ok(Self {
            provider: ProviderClient::new(registration)?,
            db,
            cipher,
            redirect_uri,
            pending: Arc::new(DashMap::new()),
            refresh_locks: Arc::new(DashMap::new()),
            rng: SystemRandom::new(),
        })
    }

    /// Build an authorization URL for `user_id` and record the state token.
    ///
    /// The URL requests offline access and forces the consent screen so the
    /// provider always issues a refresh token.
    pub fn begin_authorization(&self, user_id: &str) -> Result<(String, String), AppError> {
        let registration = &self.provider.registration;
        if registration.auth_uri.is_empty() || registration.client_id.is_empty() {
            return Err(AppError::Configuration(
                "client registration has no usable authorization endpoint".to_string(),
            ));
        }

        self.prune_expired_states();

        let state = self.random_state()?;
        self.pending.insert(
            state.clone(),
            PendingAuthorization {
                user_id: user_id.to_string(),
                issued_at: Utc::now(),
            },
        );

        let auth_url = format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&\
             access_type=offline&include_granted_scopes=true&prompt=consent&state={}",
            registration.auth_uri,
            urlencoding::encode(&registration.client_id),
            urlencoding::encode(&self.redirect_uri),
            urlencoding::encode(&SCOPES.join(" ")),
            state,
        );

        tracing::info!(user_id, "Authorization URL issued");
        Ok((auth_url, state))
    }

    /// Consume a state token and exchange the authorization code.
    ///
    /// The state entry is removed atomically before the network call, so a
    /// replayed callback fails with `InvalidState` even if the first exchange
    /// is still in flight. An exchange failure does not restore the entry;
    /// the user must restart authorization.
    pub async fn exchange_code(&self, state: &str, code: &str) -> Result<String, AppError> {
        let (_, entry) = self.pending.remove(state).ok_or(AppError::InvalidState)?;

        if Utc::now() - entry.issued_at > Duration::seconds(AUTH_STATE_TTL_SECS) {
            tracing::warn!(user_id = %entry.user_id, "Expired authorization state presented");
            return Err(AppError::InvalidState);
        }

        let token = self.provider.exchange_code(code, &self.redirect_uri).await?;

        let refresh_token = match token.refresh_token.as_deref() {
            Some(t) if !t.is_empty() => t.to_string(),
            _ => {
                // Without a refresh token the credential dies with its first
                // expiry; refuse to persist it.
                return Err(AppError::Exchange(
                    "provider did not return a refresh token".to_string(),
                ));
            }
        };

        let credential = Credential {
            access_token: token.access_token,
            refresh_token,
            token_uri: self.provider.registration.token_uri.clone(),
            client_id: self.provider.registration.client_id.clone(),
            scopes: parse_scopes(token.scope.as_deref()),
            expiry: Utc::now() + Duration::seconds(token.expires_in),
        };

        self.save_credential(&entry.user_id, &credential).await?;

        tracing::info!(user_id = %entry.user_id, "Authorization code exchanged, credential stored");
        Ok(entry.user_id)
    }

    /// Load a valid credential for `user_id`, refreshing if needed.
    ///
    /// Returns `None` when the user has no stored credential, when the
    /// stored blob is corrupted (row is deleted), when the provider rejects
    /// the refresh token (row is deleted via `revoke`), or when a transient
    /// failure prevents refreshing (row is preserved for a later retry).
    pub async fn get_credential(&self, user_id: &str) -> Result<Option<Credential>, AppError> {
        // Serialize load/refresh/store per user so a double-tap cannot run
        // two refreshes against the same refresh token.
        let lock = self
            .refresh_locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        let row = match self.db.get_credential(user_id).await? {
            Some(row) => row,
            None => return Ok(None),
        };

        let credential = match self
            .cipher
            .open(user_id, &row.encrypted_payload)
            .and_then(|json| {
                serde_json::from_str::<Credential>(&json)
                    .map_err(|e| AppError::Internal(anyhow::anyhow!("credential parse: {}", e)))
            }) {
            Ok(credential) => credential,
            Err(e) => {
                // Undecryptable rows are useless; delete instead of crashing
                // on every interaction.
                tracing::warn!(user_id, error = %e, "Stored credential unreadable, deleting");
                self.db.delete_credential(user_id).await?;
                return Ok(None);
            }
        };

        if !credential.expires_within(Duration::seconds(TOKEN_REFRESH_MARGIN_SECS)) {
            return Ok(Some(credential));
        }

        tracing::info!(user_id, "Access token expired or expiring, refreshing");

        match self
            .provider
            .refresh(&credential.token_uri, &credential.refresh_token)
            .await
        {
            Ok(token) => {
                let mut updated = credential;
                updated.access_token = token.access_token;
                updated.expiry = Utc::now() + Duration::seconds(token.expires_in);
                // Providers may rotate the refresh token; keep ours otherwise.
                if let Some(t) = token.refresh_token {
                    if !t.is_empty() {
                        updated.refresh_token = t;
                    }
                }
                self.save_credential(user_id, &updated).await?;
                tracing::info!(user_id, "Credential refreshed");
                Ok(Some(updated))
            }
            Err(AppError::RefreshRejected(reason)) => {
                tracing::warn!(user_id, %reason, "Refresh token rejected, revoking credential");
                self.revoke(user_id, Some(credential.refresh_token.as_str()))
                    .await?;
                Ok(None)
            }
            Err(AppError::TransientAuth(reason)) => {
                tracing::warn!(user_id, %reason, "Transient refresh failure, credential preserved");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Revoke a user's credential.
    ///
    /// Remote revocation and local deletion are independent outcomes; the
    /// row is deleted regardless of what the provider said. Returns true if
    /// either succeeded.
    pub async fn revoke(&self, user_id: &str, token_override: Option<&str>) -> Result<bool, AppError> {
        let token = match token_override {
            Some(t) => Some(t.to_string()),
            None => self.stored_refresh_token(user_id).await,
        };

        let remote_ok = match token {
            Some(t) => match self.provider.revoke(&t).await {
                Ok(()) => {
                    tracing::info!(user_id, "Provider revocation succeeded");
                    true
                }
                Err(e) => {
                    tracing::warn!(user_id, error = %e, "Provider revocation failed, deleting locally anyway");
                    false
                }
            },
            None => false,
        };

        let local_ok = self.db.delete_credential(user_id).await?;
        if local_ok {
            tracing::info!(user_id, "Local credential deleted");
        }

        Ok(remote_ok || local_ok)
    }

    /// True iff the user currently holds a valid (refreshable) credential.
    pub async fn is_authenticated(&self, user_id: &str) -> bool {
        match self.get_credential(user_id).await {
            Ok(Some(_)) => true,
            Ok(None) => false,
            Err(e) => {
                tracing::error!(user_id, error = %e, "Credential lookup failed");
                false
            }
        }
    }

    // ─── Internals ───────────────────────────────────────────────────────────

    /// Encrypt and persist a credential. Refuses to store one without a
    /// refresh token (it would be unusable after the first expiry).
    async fn save_credential(&self, user_id: &str, credential: &Credential) -> Result<(), AppError> {
        if credential.refresh_token.is_empty() {
            return Err(AppError::Internal(anyhow::anyhow!(
                "refusing to persist credential without refresh token"
            )));
        }

        let json = serde_json::to_string(credential)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("credential serialize: {}", e)))?;
        let encrypted_payload = self.cipher.seal(user_id, &json)?;

        self.db
            .put_credential(&CredentialRow {
                user_id: user_id.to_string(),
                encrypted_payload,
                expiry: credential.expiry.to_rfc3339(),
                updated_at: Utc::now().to_rfc3339(),
            })
            .await
    }

    /// Best-effort read of the stored refresh token for revocation.
    async fn stored_refresh_token(&self, user_id: &str) -> Option<String> {
        let row = self.db.get_credential(user_id).await.ok()??;
        let json = self.cipher.open(user_id, &row.encrypted_payload).ok()?;
        let credential: Credential = serde_json::from_str(&json).ok()?;
        Some(credential.refresh_token)
    }

    /// Cryptographically random, URL-safe state token.
    fn random_state(&self) -> Result<String, AppError> {
        let mut bytes = [0u8; 32];
        self.rng
            .fill(&mut bytes)
            .map_err(|_| AppError::Internal(anyhow::anyhow!("state token generation failed")))?;
        Ok(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Drop state entries past their consumption window.
    fn prune_expired_states(&self) {
        let cutoff = Utc::now() - Duration::seconds(AUTH_STATE_TTL_SECS);
        self.pending.retain(|_, entry| entry.issued_at > cutoff);
    }

    /// Number of outstanding authorization attempts (test observability).
    pub fn pending_states(&self) -> usize {
        self.pending.len()
    }
}

fn parse_scopes(scope: Option<&str>) -> Vec<String> {
    match scope {
        Some(s) if !s.trim().is_empty() => s.split_whitespace().map(|s| s.to_string()).collect(),
        _ => SCOPES.iter().map(|s| s.to_string()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_invalid_grant_is_permanent() {
        let err = classify_refresh_failure(400, r#"{"error":"invalid_grant"}"#);
        assert!(matches!(err, AppError::RefreshRejected(_)));

        let err = classify_refresh_failure(
            401,
            r#"{"error":"invalid_client","error_description":"bad client"}"#,
        );
        assert!(matches!(err, AppError::RefreshRejected(_)));
    }

    #[test]
    fn test_classify_unknown_code_is_transient() {
        let err = classify_refresh_failure(400, r#"{"error":"temporarily_unavailable"}"#);
        assert!(matches!(err, AppError::TransientAuth(_)));
    }

    #[test]
    fn test_classify_server_errors_are_transient() {
        assert!(matches!(
            classify_refresh_failure(500, "boom"),
            AppError::TransientAuth(_)
        ));
        assert!(matches!(
            classify_refresh_failure(503, ""),
            AppError::TransientAuth(_)
        ));
    }

    #[test]
    fn test_classify_unparseable_body_is_transient() {
        assert!(matches!(
            classify_refresh_failure(400, "<html>not json</html>"),
            AppError::TransientAuth(_)
        ));
    }

    #[test]
    fn test_parse_scopes() {
        assert_eq!(
            parse_scopes(Some("a b  c")),
            vec!["a".to_string(), "b".to_string(), "c".to_string()]
        );
        assert_eq!(parse_scopes(None).len(), SCOPES.len());
        assert_eq!(parse_scopes(Some("  ")).len(), SCOPES.len());
    }
}
