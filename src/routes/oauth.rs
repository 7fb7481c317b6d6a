// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! OAuth redirect callback route.
//!
//! The identity provider redirects the user's browser here with
//! `(state, code)` on success or `(error, error_description)` on refusal.
//! This handler forwards to the authorization manager and renders a small
//! result page; it has no other business logic.

use axum::{
    extract::{Query, State},
    response::Html,
    routing::get,
    Router,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::error::AppError;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/oauth2callback", get(oauth_callback))
}

/// Query parameters of the provider redirect.
#[derive(Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

/// OAuth callback - consume the state token, exchange the code.
async fn oauth_callback(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CallbackParams>,
) -> Html<String> {
    if let Some(error) = params.error {
        let description = params.error_description.unwrap_or_default();
        tracing::warn!(%error, %description, "Provider returned an OAuth error");
        return error_page(&format!("The provider reported: {} {}", error, description));
    }

    let (Some(auth_state), Some(code)) = (params.state, params.code) else {
        tracing::warn!("Callback missing 'state' or 'code' parameter");
        return error_page("Missing 'state' or 'code' parameter in the callback.");
    };

    match state.auth.exchange_code(&auth_state, &code).await {
        Ok(user_id) => {
            tracing::info!(user_id, "OAuth callback processed, credential stored");
            success_page()
        }
        Err(AppError::InvalidState) => error_page(
            "This authorization link has expired or was already used. \
             Ask the bot for a fresh one and try again.",
        ),
        Err(e) => {
            tracing::error!(error = %e, "OAuth callback failed");
            error_page("An error occurred while completing authorization. Please try again.")
        }
    }
}

fn success_page() -> Html<String> {
    Html(page(
        "Authorization Successful",
        "#2e7d32",
        "<h1>Authorization Successful</h1>\
         <p>Your spreadsheet account is now connected.</p>\
         <p>You can close this window and return to the chat.</p>"
            .to_string(),
    ))
}

fn error_page(message: &str) -> Html<String> {
    Html(page(
        "Authorization Error",
        "#c62828",
        format!(
            "<h1>Authorization Error</h1>\
             <p>Something went wrong during authorization:</p>\
             <p class=\"detail\">{}</p>\
             <p>Please restart authorization from the chat.</p>",
            escape_html(message)
        ),
    ))
}

fn page(title: &str, accent: &str, body: String) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<title>{}</title>\n<style>\n\
         body {{ font-family: sans-serif; text-align: center; padding: 40px; background: #f0f2f5; }}\n\
         .card {{ background: white; border-radius: 8px; padding: 24px; max-width: 480px; margin: 0 auto; }}\n\
         h1 {{ color: {}; }}\n\
         .detail {{ font-weight: bold; word-wrap: break-word; }}\n\
         </style>\n</head>\n<body>\n<div class=\"card\">{}</div>\n</body>\n</html>",
        escape_html(title),
        accent,
        body
    )
}

fn escape_html(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<script>"a" & b</script>"#),
            "&lt;script&gt;&quot;a&quot; &amp; b&lt;/script&gt;"
        );
    }

    #[test]
    fn test_error_page_escapes_message() {
        let Html(body) = error_page("<img src=x>");
        assert!(!body.contains("<img"));
        assert!(body.contains("&lt;img"));
    }
}
