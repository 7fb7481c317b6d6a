//! User and credential models for storage.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// User profile stored in the `users` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Stable chat-platform identifier (also the primary key)
    pub user_id: String,
    /// Display name as reported by the chat platform
    pub display_name: String,
    /// When the user first interacted (RFC 3339)
    pub created_at: String,
    /// Last profile update (RFC 3339)
    pub updated_at: String,
}

impl User {
    /// Build a fresh profile row for a first interaction.
    pub fn new(user_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

/// Decrypted delegated-authorization credential.
///
/// This is the plaintext that the credential cipher seals before it reaches
/// the `auth_tokens` table. It is never persisted unencrypted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: String,
    /// Token endpoint the refresh grant must be sent to
    pub token_uri: String,
    pub client_id: String,
    /// Scopes granted at consent time
    pub scopes: Vec<String>,
    /// Access token expiry
    pub expiry: DateTime<Utc>,
}

impl Credential {
    /// True if the access token is expired or will expire within `margin`.
    pub fn expires_within(&self, margin: Duration) -> bool {
        Utc::now() + margin >= self.expiry
    }
}

/// Encrypted credential row as stored in `auth_tokens`.
#[derive(Debug, Clone)]
pub struct CredentialRow {
    pub user_id: String,
    pub encrypted_payload: Vec<u8>,
    /// Expiry mirrored unencrypted for observability (RFC 3339)
    pub expiry: String,
    pub updated_at: String,
}
