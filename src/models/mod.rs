// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod category;
pub mod sheet;
pub mod user;

pub use category::CategoryCatalog;
pub use sheet::UserSheet;
pub use user::{Credential, CredentialRow, User};
