// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod crypto;
pub mod oauth;
pub mod sheets;

pub use crypto::TokenCipher;
pub use oauth::OAuthManager;
pub use sheets::{SheetAppender, SheetsOperations, SheetsService};
