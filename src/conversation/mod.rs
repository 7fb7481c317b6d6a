// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Conversation engine: one guided entry flow per user.
//!
//! The engine owns the per-user `PendingTransaction` map, gates every
//! transition on authorization, serializes events per user, and performs
//! the terminal commit through the `SheetAppender` seam.

pub mod event;
pub mod state;

pub use event::{Action, Event, TxKind};
pub use state::{PendingTransaction, Reply, Step};

use crate::db::Database;
use crate::error::AppError;
use crate::models::{CategoryCatalog, User};
use crate::services::oauth::OAuthManager;
use crate::services::sheets::SheetAppender;
use dashmap::DashMap;
use state::{category_keyboard, transition, Outcome};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Per-user slot holding the (at most one) pending transaction.
type Session = Arc<Mutex<Option<PendingTransaction>>>;

/// Turns inbound events into at most one committed row per flow.
#[derive(Clone)]
pub struct ConversationEngine {
    auth: OAuthManager,
    sheets: Arc<dyn SheetAppender>,
    db: Database,
    catalog: CategoryCatalog,
    /// user id -> serialized conversation session
    sessions: Arc<DashMap<String, Session>>,
}

impl ConversationEngine {
    pub fn new(
        auth: OAuthManager,
        sheets: Arc<dyn SheetAppender>,
        db: Database,
        catalog: CategoryCatalog,
    ) -> Self {
        Self {
            auth,
            sheets,
            db,
            catalog,
            sessions: Arc::new(DashMap::new()),
        }
    }

    /// Handle one inbound event for a user.
    ///
    /// Returns `None` when the event is not for this machine (no pending
    /// transaction and not an entry event); other handlers may claim it.
    /// Events for the same user are serialized on a per-user mutex, so a
    /// "back" tap racing a stray text message cannot interleave.
    pub async fn handle_event(
        &self,
        user_id: &str,
        display_name: &str,
        event: Event,
    ) -> Result<Option<Reply>, AppError> {
        let session = self
            .sessions
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone();
        let mut slot = session.lock().await;

        if let Event::StartTransaction = event {
            return self.start_flow(user_id, display_name, &mut slot).await;
        }

        // No pending transaction: nothing here is ours. A bare amount, a
        // stale button tap or a /cancel with nothing to cancel all fall
        // through to other handlers.
        if slot.is_none() {
            return Ok(None);
        }

        // Every transition beyond Idle requires a live credential.
        if !self.auth.is_authenticated(user_id).await {
            tracing::info!(user_id, "Authorization lapsed mid-flow, dropping transaction");
            *slot = None;
            return Ok(Some(Reply::AuthRequired));
        }

        let tx = slot.as_mut().expect("pending transaction checked above");
        match transition(tx, &event, &self.catalog) {
            Outcome::Continue(reply) => Ok(Some(reply)),
            Outcome::Cancel => {
                *slot = None;
                tracing::info!(user_id, "Guided flow cancelled");
                Ok(Some(Reply::Cancelled))
            }
            Outcome::Commit => {
                // Destroy first: whatever the append does, no zombie state
                // survives and no automatic retry can double-post.
                let tx = slot.take().expect("pending transaction checked above");
                Ok(Some(self.commit(user_id, display_name, tx).await))
            }
        }
    }

    /// Entry event: auth-gate, then create (or explicitly reset) the flow.
    async fn start_flow(
        &self,
        user_id: &str,
        display_name: &str,
        slot: &mut Option<PendingTransaction>,
    ) -> Result<Option<Reply>, AppError> {
        if let Err(e) = self.db.upsert_user(&User::new(user_id, display_name)).await {
            tracing::warn!(user_id, error = %e, "User upsert failed, continuing");
        }

        if !self.auth.is_authenticated(user_id).await {
            // Never create a PendingTransaction for an unauthorized user;
            // an abandoned one from an earlier session dies here too.
            *slot = None;
            return Ok(Some(Reply::AuthRequired));
        }

        let restarted = slot.is_some();
        if restarted {
            tracing::info!(user_id, "Discarding in-flight transaction on explicit restart");
        }
        let tx = PendingTransaction::new();
        let reply = category_keyboard(tx.kind, &self.catalog, restarted);
        *slot = Some(tx);
        Ok(Some(reply))
    }

    /// Terminal transition: append the assembled row.
    async fn commit(&self, user_id: &str, display_name: &str, tx: PendingTransaction) -> Reply {
        let sheet = tx.sheet_name();
        let category = tx.category.clone().unwrap_or_default();
        let amount = tx.amount.unwrap_or_default();
        let row = tx.to_row(display_name, chrono::Utc::now());

        match self.sheets.append_row(user_id, sheet, row).await {
            Ok(()) => {
                tracing::info!(user_id, sheet, amount, "Transaction committed");
                Reply::Committed {
                    sheet,
                    category,
                    amount,
                }
            }
            Err(e) => {
                tracing::error!(user_id, sheet, error = %e, "Commit failed, flow must be restarted");
                Reply::CommitFailed {
                    needs_reauthorization: e.is_sheet_token_error(),
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Snapshot of a user's pending transaction (observability/tests).
    pub async fn pending_transaction(&self, user_id: &str) -> Option<PendingTransaction> {
        let session = self.sessions.get(user_id)?.clone();
        let slot = session.lock().await;
        slot.clone()
    }
}
