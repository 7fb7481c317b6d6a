// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Sheetfin: chat-driven personal-finance recorder backed by a spreadsheet.
//!
//! This crate provides the authorization lifecycle, the per-user API client
//! cache, and the guided transaction conversation that appends rows to each
//! user's active spreadsheet. The chat transport itself is an external
//! adapter over [`conversation::ConversationEngine`].

pub mod config;
pub mod conversation;
pub mod db;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;

use config::Config;
use conversation::ConversationEngine;
use db::Database;
use services::{OAuthManager, SheetsOperations};

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: Database,
    pub auth: OAuthManager,
    pub sheets: SheetsOperations,
    pub engine: ConversationEngine,
}
