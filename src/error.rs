// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type that converts to HTTP responses.
///
/// Provider/network failures are classified into this taxonomy at the
/// authorization-manager boundary; callers above it never inspect raw
/// provider error text.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid or expired authorization state")]
    InvalidState,

    #[error("Authorization code exchange failed: {0}")]
    Exchange(String),

    #[error("Refresh token rejected by provider: {0}")]
    RefreshRejected(String),

    #[error("Transient authorization failure: {0}")]
    TransientAuth(String),

    #[error("Spreadsheet access error: {0}")]
    SheetAccess(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Marker for spreadsheet-API 401s (credential no longer accepted).
    pub const SHEET_TOKEN_ERROR: &'static str = "Invalid or expired credential";

    /// True if this error means the spreadsheet API rejected our credential,
    /// i.e. the cached client must be evicted and the user re-authorized.
    pub fn is_sheet_token_error(&self) -> bool {
        match self {
            AppError::SheetAccess(msg) => msg.contains(Self::SHEET_TOKEN_ERROR),
            AppError::RefreshRejected(_) => true,
            _ => false,
        }
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::Configuration(msg) => {
                tracing::error!(error = %msg, "Configuration error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "configuration_error",
                    None,
                )
            }
            AppError::InvalidState => (StatusCode::BAD_REQUEST, "invalid_state", None),
            AppError::Exchange(msg) => {
                (StatusCode::BAD_GATEWAY, "exchange_failed", Some(msg.clone()))
            }
            AppError::RefreshRejected(_) => (StatusCode::UNAUTHORIZED, "refresh_rejected", None),
            AppError::TransientAuth(msg) => (
                StatusCode::BAD_GATEWAY,
                "transient_auth_error",
                Some(msg.clone()),
            ),
            AppError::SheetAccess(msg) => {
                (StatusCode::BAD_GATEWAY, "sheet_error", Some(msg.clone()))
            }
            AppError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
