//! Application configuration loaded from environment variables and the
//! identity-provider client registration file.
//!
//! Everything is loaded once at startup; a missing or malformed value is a
//! fatal `ConfigError`, never a runtime surprise.

use std::env;
use std::path::Path;

use base64::{
    engine::general_purpose::{STANDARD, URL_SAFE},
    Engine as _,
};
use serde::Deserialize;

/// Minimum accepted length (bytes) for the decoded credential cipher key.
const MIN_KEY_BYTES: usize = 32;

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Parsed identity-provider client registration
    pub registration: ClientRegistration,
    /// Redirect URI registered with the provider (callback receiver)
    pub redirect_uri: String,
    /// Decoded symmetric key for credential storage
    pub encryption_key: Vec<u8>,
    /// SQLite database path
    pub database_path: String,
    /// Callback server bind host
    pub host: String,
    /// Callback server port
    pub port: u16,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Reads the client registration file eagerly so a bad deployment fails
    /// here rather than on the first `/auth`.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let secrets_path = env::var("GOOGLE_CLIENT_SECRETS")
            .map_err(|_| ConfigError::Missing("GOOGLE_CLIENT_SECRETS"))?;
        let registration = ClientRegistration::from_file(Path::new(&secrets_path))?;

        let host = env::var("OAUTH_SERVER_HOST").unwrap_or_else(|_| "localhost".to_string());
        let port = env::var("OAUTH_SERVER_PORT")
            .unwrap_or_else(|_| "8000".to_string())
            .parse()
            .unwrap_or(8000);

        let redirect_uri = env::var("OAUTH_REDIRECT_URI")
            .unwrap_or_else(|_| format!("http://{}:{}/oauth2callback", host, port));

        let encryption_key = decode_key(
            &env::var("CREDENTIAL_ENCRYPTION_KEY")
                .map_err(|_| ConfigError::Missing("CREDENTIAL_ENCRYPTION_KEY"))?,
        )?;

        let database_path =
            env::var("DATABASE_PATH").map_err(|_| ConfigError::Missing("DATABASE_PATH"))?;

        Ok(Self {
            registration,
            redirect_uri,
            encryption_key,
            database_path,
            host,
            port,
        })
    }

    /// Default config for testing only.
    pub fn test_default() -> Self {
        Self {
            registration: ClientRegistration::test_default(),
            redirect_uri: "http://localhost:8000/oauth2callback".to_string(),
            encryption_key: vec![0x42; 32],
            database_path: ":memory:".to_string(),
            host: "localhost".to_string(),
            port: 8000,
        }
    }
}

/// Identity-provider client registration, parsed from the standard
/// `client_secret.json` download (`"web"` or `"installed"` key).
#[derive(Debug, Clone, Deserialize)]
pub struct ClientRegistration {
    pub client_id: String,
    pub client_secret: String,
    pub auth_uri: String,
    pub token_uri: String,
    /// Not part of the provider download; defaults to Google's endpoint.
    #[serde(default = "default_revocation_uri")]
    pub revocation_uri: String,
}

fn default_revocation_uri() -> String {
    "https://oauth2.googleapis.com/revoke".to_string()
}

#[derive(Deserialize)]
struct RegistrationFile {
    web: Option<ClientRegistration>,
    installed: Option<ClientRegistration>,
}

impl ClientRegistration {
    /// Parse a registration from the JSON file contents.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let file: RegistrationFile = serde_json::from_str(raw)
            .map_err(|e| ConfigError::Invalid(format!("client registration parse error: {}", e)))?;

        let registration = file.web.or(file.installed).ok_or_else(|| {
            ConfigError::Invalid("client registration has neither 'web' nor 'installed' key".into())
        })?;

        if registration.client_id.is_empty() || registration.client_secret.is_empty() {
            return Err(ConfigError::Invalid(
                "client registration is missing client_id or client_secret".into(),
            ));
        }

        Ok(registration)
    }

    /// Read and parse the registration file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::Invalid(format!(
                "cannot read client registration {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&raw)
    }

    /// Registration pointing at nothing, for tests that never hit the network.
    pub fn test_default() -> Self {
        Self {
            client_id: "test-client-id".to_string(),
            client_secret: "test-client-secret".to_string(),
            auth_uri: "https://accounts.google.com/o/oauth2/auth".to_string(),
            token_uri: "https://oauth2.googleapis.com/token".to_string(),
            revocation_uri: default_revocation_uri(),
        }
    }
}

/// Decode the credential cipher key (URL-safe or standard base64).
fn decode_key(raw: &str) -> Result<Vec<u8>, ConfigError> {
    let trimmed = raw.trim();
    let decoded = URL_SAFE
        .decode(trimmed)
        .or_else(|_| STANDARD.decode(trimmed))
        .map_err(|e| ConfigError::Invalid(format!("CREDENTIAL_ENCRYPTION_KEY decode: {}", e)))?;

    if decoded.len() < MIN_KEY_BYTES {
        return Err(ConfigError::Invalid(format!(
            "CREDENTIAL_ENCRYPTION_KEY must decode to at least {} bytes, got {}",
            MIN_KEY_BYTES,
            decoded.len()
        )));
    }
    Ok(decoded)
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
