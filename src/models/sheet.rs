//! Active spreadsheet selection model.

use serde::{Deserialize, Serialize};

/// A spreadsheet a user has selected at some point.
///
/// At most one row per user is active; activating a new spreadsheet
/// deactivates the previous one (enforced in the database layer, not by a
/// constraint).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSheet {
    pub user_id: String,
    pub spreadsheet_id: String,
    /// Title cached at selection time
    pub spreadsheet_title: Option<String>,
    pub is_active: bool,
    pub updated_at: String,
}
