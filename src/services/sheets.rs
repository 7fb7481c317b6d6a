// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Spreadsheet API client, per-user client cache, and high-level operations.
//!
//! Handles:
//! - Raw spreadsheet REST calls (metadata, header reads, row appends)
//! - A per-user cache of authenticated clients that re-validates the
//!   credential on every lookup instead of trusting a TTL
//! - Worksheet bootstrap and header validation for a selected spreadsheet

use crate::db::Database;
use crate::error::AppError;
use crate::services::oauth::OAuthManager;
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{json, Value};
use std::sync::Arc;

/// Conservative timeout for spreadsheet-service calls.
const SHEETS_TIMEOUT_SECS: u64 = 15;

/// Worksheet receiving expense rows.
pub const EXPENSES_SHEET: &str = "expenses";
/// Worksheet receiving income rows.
pub const INCOME_SHEET: &str = "income";

/// Expected header row of the expenses worksheet.
pub const EXPENSE_HEADERS: &[&str] = &[
    "Date",
    "User",
    "Category",
    "Subcategory",
    "Amount",
    "Timestamp",
    "Comment",
];
/// Expected header row of the income worksheet (no subcategory dimension).
pub const INCOME_HEADERS: &[&str] =
    &["Date", "User", "Category", "Amount", "Timestamp", "Comment"];

// ─────────────────────────────────────────────────────────────────────────────
// SheetsApi - raw REST calls
// ─────────────────────────────────────────────────────────────────────────────

/// Spreadsheet metadata needed by the operations layer.
#[derive(Debug, Clone)]
pub struct SpreadsheetInfo {
    pub title: String,
    pub sheet_titles: Vec<String>,
}

/// Raw spreadsheet REST client.
#[derive(Clone)]
pub struct SheetsApi {
    http: reqwest::Client,
    base_url: String,
}

impl SheetsApi {
    pub fn new() -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(SHEETS_TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("HTTP client build: {}", e)))?;
        Ok(Self {
            http,
            base_url: "https://sheets.googleapis.com/v4".to_string(),
        })
    }

    /// Fetch spreadsheet title and worksheet names.
    pub async fn get_spreadsheet(
        &self,
        access_token: &str,
        spreadsheet_id: &str,
    ) -> Result<SpreadsheetInfo, AppError> {
        let url = format!(
            "{}/spreadsheets/{}?fields=properties.title,sheets.properties.title",
            self.base_url, spreadsheet_id
        );
        let body: Value = self.get_json(&url, access_token).await?;

        let title = body["properties"]["title"]
            .as_str()
            .unwrap_or(spreadsheet_id)
            .to_string();
        let sheet_titles = body["sheets"]
            .as_array()
            .map(|sheets| {
                sheets
                    .iter()
                    .filter_map(|s| s["properties"]["title"].as_str())
                    .map(|s| s.to_string())
                    .collect()
            })
            .unwrap_or_default();

        Ok(SpreadsheetInfo {
            title,
            sheet_titles,
        })
    }

    /// Read the first row of a worksheet (its headers).
    pub async fn header_row(
        &self,
        access_token: &str,
        spreadsheet_id: &str,
        sheet_name: &str,
    ) -> Result<Vec<String>, AppError> {
        let range = format!("{}!1:1", sheet_name);
        let url = format!(
            "{}/spreadsheets/{}/values/{}",
            self.base_url,
            spreadsheet_id,
            urlencoding::encode(&range)
        );
        let body: Value = self.get_json(&url, access_token).await?;

        Ok(body["values"][0]
            .as_array()
            .map(|row| {
                row.iter()
                    .filter_map(|v| v.as_str())
                    .map(|v| v.to_string())
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Append one row to a worksheet.
    pub async fn append_row(
        &self,
        access_token: &str,
        spreadsheet_id: &str,
        sheet_name: &str,
        values: &[Value],
    ) -> Result<(), AppError> {
        let range = format!("{}!A1", sheet_name);
        let url = format!(
            "{}/spreadsheets/{}/values/{}:append?valueInputOption=USER_ENTERED&insertDataOption=INSERT_ROWS",
            self.base_url,
            spreadsheet_id,
            urlencoding::encode(&range)
        );

        let response = self
            .http
            .post(&url)
            .bearer_auth(access_token)
            .json(&json!({ "values": [values] }))
            .send()
            .await
            .map_err(|e| AppError::SheetAccess(format!("append request failed: {}", e)))?;

        self.check_response(response).await
    }

    /// Create a new worksheet in the spreadsheet.
    pub async fn add_sheet(
        &self,
        access_token: &str,
        spreadsheet_id: &str,
        title: &str,
    ) -> Result<(), AppError> {
        let url = format!("{}/spreadsheets/{}:batchUpdate", self.base_url, spreadsheet_id);

        let response = self
            .http
            .post(&url)
            .bearer_auth(access_token)
            .json(&json!({
                "requests": [{ "addSheet": { "properties": { "title": title } } }]
            }))
            .send()
            .await
            .map_err(|e| AppError::SheetAccess(format!("addSheet request failed: {}", e)))?;

        self.check_response(response).await
    }

    /// Generic GET with JSON response.
    async fn get_json(&self, url: &str, access_token: &str) -> Result<Value, AppError> {
        let response = self
            .http
            .get(url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AppError::SheetAccess(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Self::classify_status(response).await);
        }

        response
            .json()
            .await
            .map_err(|e| AppError::SheetAccess(format!("JSON parse error: {}", e)))
    }

    /// Check response status and discard the body.
    async fn check_response(&self, response: reqwest::Response) -> Result<(), AppError> {
        if response.status().is_success() {
            return Ok(());
        }
        Err(Self::classify_status(response).await)
    }

    /// Map spreadsheet-service failures onto the error taxonomy.
    async fn classify_status(response: reqwest::Response) -> AppError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        match status.as_u16() {
            401 => AppError::SheetAccess(AppError::SHEET_TOKEN_ERROR.to_string()),
            403 => AppError::SheetAccess("Permission denied for this spreadsheet".to_string()),
            404 => AppError::SheetAccess("Spreadsheet not found".to_string()),
            _ => AppError::SheetAccess(format!("HTTP {}: {}", status, body)),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SheetsService - per-user authenticated client cache
// ─────────────────────────────────────────────────────────────────────────────

/// An authenticated spreadsheet client bound to one credential snapshot.
#[derive(Clone)]
pub struct SheetsClient {
    api: SheetsApi,
    access_token: String,
}

impl SheetsClient {
    pub async fn get_spreadsheet(&self, spreadsheet_id: &str) -> Result<SpreadsheetInfo, AppError> {
        self.api
            .get_spreadsheet(&self.access_token, spreadsheet_id)
            .await
    }

    pub async fn header_row(
        &self,
        spreadsheet_id: &str,
        sheet_name: &str,
    ) -> Result<Vec<String>, AppError> {
        self.api
            .header_row(&self.access_token, spreadsheet_id, sheet_name)
            .await
    }

    pub async fn append_row(
        &self,
        spreadsheet_id: &str,
        sheet_name: &str,
        values: &[Value],
    ) -> Result<(), AppError> {
        self.api
            .append_row(&self.access_token, spreadsheet_id, sheet_name, values)
            .await
    }

    pub async fn add_sheet(&self, spreadsheet_id: &str, title: &str) -> Result<(), AppError> {
        self.api
            .add_sheet(&self.access_token, spreadsheet_id, title)
            .await
    }
}

/// Per-user cache of authenticated clients.
///
/// The cache never serves a client built from a stale credential: every
/// lookup asks the authorization manager first (which may refresh), and a
/// missing credential evicts the entry. Provider client objects are cheap,
/// but a failed API call from a silently expired token is worse than the
/// re-validation round trip.
#[derive(Clone)]
pub struct SheetsService {
    api: SheetsApi,
    auth: OAuthManager,
    clients: Arc<DashMap<String, SheetsClient>>,
}

impl SheetsService {
    pub fn new(auth: OAuthManager) -> Result<Self, AppError> {
        Ok(Self {
            api: SheetsApi::new()?,
            auth,
            clients: Arc::new(DashMap::new()),
        })
    }

    /// Get an authenticated client for `user_id`, or `None` if the user
    /// holds no valid credential (any cached entry is evicted).
    pub async fn client_for(&self, user_id: &str) -> Result<Option<SheetsClient>, AppError> {
        let credential = match self.auth.get_credential(user_id).await? {
            Some(c) => c,
            None => {
                self.clients.remove(user_id);
                return Ok(None);
            }
        };

        let client = SheetsClient {
            api: self.api.clone(),
            access_token: credential.access_token,
        };
        self.clients.insert(user_id.to_string(), client.clone());
        Ok(Some(client))
    }

    /// Explicitly evict a user's cached client (logout).
    pub fn clear_cache(&self, user_id: &str) {
        self.clients.remove(user_id);
    }

    /// Whether a client is currently cached (observability/tests).
    pub fn has_cached_client(&self, user_id: &str) -> bool {
        self.clients.contains_key(user_id)
    }

    /// Probe authentication by attempting to obtain a client.
    pub async fn is_authenticated(&self, user_id: &str) -> bool {
        matches!(self.client_for(user_id).await, Ok(Some(_)))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SheetsOperations - worksheet bootstrap and appends
// ─────────────────────────────────────────────────────────────────────────────

/// Narrow seam the conversation engine commits through.
#[async_trait]
pub trait SheetAppender: Send + Sync {
    /// Append `values` as one row to the named worksheet of the user's
    /// active spreadsheet.
    async fn append_row(
        &self,
        user_id: &str,
        sheet_name: &str,
        values: Vec<Value>,
    ) -> Result<(), AppError>;
}

/// High-level operations against a user's active spreadsheet.
#[derive(Clone)]
pub struct SheetsOperations {
    service: SheetsService,
    db: Database,
}

impl SheetsOperations {
    pub fn new(service: SheetsService, db: Database) -> Self {
        Self { service, db }
    }

    pub fn service(&self) -> &SheetsService {
        &self.service
    }

    /// Validate access to `spreadsheet_id`, bootstrap the worksheets, and
    /// persist it as the user's active selection. Returns the title.
    pub async fn setup_for_user(
        &self,
        user_id: &str,
        spreadsheet_id: &str,
    ) -> Result<String, AppError> {
        let client = self.require_client(user_id).await?;

        let info = client.get_spreadsheet(spreadsheet_id).await?;
        self.ensure_worksheets(&client, spreadsheet_id, &info.sheet_titles)
            .await?;

        self.db
            .set_active_sheet(user_id, spreadsheet_id, Some(&info.title))
            .await?;

        tracing::info!(user_id, spreadsheet_id, title = %info.title, "Active spreadsheet selected");
        Ok(info.title)
    }

    /// Create missing worksheets and backfill headers on empty ones.
    /// Sheets with unexpected headers are left alone (never rewrite data).
    async fn ensure_worksheets(
        &self,
        client: &SheetsClient,
        spreadsheet_id: &str,
        existing: &[String],
    ) -> Result<(), AppError> {
        for (sheet_name, headers) in [
            (EXPENSES_SHEET, EXPENSE_HEADERS),
            (INCOME_SHEET, INCOME_HEADERS),
        ] {
            let header_values: Vec<Value> = headers.iter().map(|h| json!(h)).collect();

            if !existing.iter().any(|s| s == sheet_name) {
                client.add_sheet(spreadsheet_id, sheet_name).await?;
                client
                    .append_row(spreadsheet_id, sheet_name, &header_values)
                    .await?;
                tracing::info!(sheet_name, "Worksheet created");
                continue;
            }

            let current = client.header_row(spreadsheet_id, sheet_name).await?;
            if current.is_empty() {
                client
                    .append_row(spreadsheet_id, sheet_name, &header_values)
                    .await?;
                tracing::info!(sheet_name, "Headers added to empty worksheet");
            } else if current != headers {
                tracing::warn!(
                    sheet_name,
                    ?current,
                    "Worksheet headers do not match the expected layout"
                );
            }
        }
        Ok(())
    }

    /// Client for the user, or a typed error telling the UI to re-authorize.
    async fn require_client(&self, user_id: &str) -> Result<SheetsClient, AppError> {
        self.service
            .client_for(user_id)
            .await?
            .ok_or_else(|| AppError::SheetAccess(AppError::SHEET_TOKEN_ERROR.to_string()))
    }
}

#[async_trait]
impl SheetAppender for SheetsOperations {
    async fn append_row(
        &self,
        user_id: &str,
        sheet_name: &str,
        values: Vec<Value>,
    ) -> Result<(), AppError> {
        let selection = self.db.get_active_sheet(user_id).await?.ok_or_else(|| {
            AppError::SheetAccess("No active spreadsheet selected".to_string())
        })?;

        let client = self.require_client(user_id).await?;

        match client
            .append_row(&selection.spreadsheet_id, sheet_name, &values)
            .await
        {
            Err(e) if e.is_sheet_token_error() => {
                // The provider rejected a token we just validated; drop the
                // cached client so the next attempt rebuilds from scratch.
                self.service.clear_cache(user_id);
                Err(e)
            }
            other => {
                if other.is_ok() {
                    tracing::info!(user_id, sheet_name, "Row appended");
                }
                other
            }
        }
    }
}
