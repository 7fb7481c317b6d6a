// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Guided-entry flow state and the pure transition function.
//!
//! One `PendingTransaction` per user captures everything collected so far
//! plus an explicit `Step`. Transitions never perform I/O; the engine in
//! `conversation::mod` applies their `Outcome` (including the terminal
//! commit) against the outside world.

use crate::conversation::event::{Action, Event, TxKind};
use crate::models::CategoryCatalog;
use crate::services::sheets::{EXPENSES_SHEET, INCOME_SHEET};
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{json, Value};

/// Sentinel text that maps a requested comment to the empty string.
const COMMENT_SKIP_SENTINEL: &str = "-";

/// Where the guided flow currently rests.
///
/// Idle is represented by the absence of a `PendingTransaction`, and the
/// recorded-subcategory moment is pass-through (the selection event lands
/// directly in `AwaitingAmount`), so neither appears here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Type selector + category keyboard shown
    TypeSelected,
    /// Category chosen; subcategory keyboard shown (expense only)
    CategorySelected,
    /// Waiting for a free-text amount
    AwaitingAmount,
    /// Waiting for the yes/no comment choice
    AwaitingCommentDecision,
    /// Waiting for free-text comment
    AwaitingComment,
}

/// One in-progress guided entry.
#[derive(Debug, Clone)]
pub struct PendingTransaction {
    pub kind: TxKind,
    pub category: Option<String>,
    /// Equal to `category` for income
    pub subcategory: Option<String>,
    /// Entry date, fixed when the flow starts
    pub date: NaiveDate,
    pub amount: Option<f64>,
    pub comment: String,
    pub step: Step,
}

impl PendingTransaction {
    /// Fresh transaction; the flow opens on the expense keyboard.
    pub fn new() -> Self {
        Self {
            kind: TxKind::Expense,
            category: None,
            subcategory: None,
            date: Utc::now().date_naive(),
            amount: None,
            comment: String::new(),
            step: Step::TypeSelected,
        }
    }

    /// Worksheet this transaction commits to.
    pub fn sheet_name(&self) -> &'static str {
        match self.kind {
            TxKind::Expense => EXPENSES_SHEET,
            TxKind::Income => INCOME_SHEET,
        }
    }

    /// Assemble the row to append.
    ///
    /// Expense: `[date, user, category, subcategory, amount, timestamp, comment]`
    /// Income:  `[date, user, category, amount, timestamp, comment]`
    ///
    /// Only called at commit time, when category and amount are guaranteed
    /// to be filled by the transition function.
    pub fn to_row(&self, display_name: &str, committed_at: DateTime<Utc>) -> Vec<Value> {
        let date = self.date.format("%Y-%m-%d").to_string();
        let category = self.category.clone().unwrap_or_default();
        let amount = self.amount.unwrap_or_default();
        let timestamp = committed_at.to_rfc3339();

        match self.kind {
            TxKind::Expense => vec![
                json!(date),
                json!(display_name),
                json!(category),
                json!(self.subcategory.clone().unwrap_or_default()),
                json!(amount),
                json!(timestamp),
                json!(self.comment),
            ],
            TxKind::Income => vec![
                json!(date),
                json!(display_name),
                json!(category),
                json!(amount),
                json!(timestamp),
                json!(self.comment),
            ],
        }
    }
}

impl Default for PendingTransaction {
    fn default() -> Self {
        Self::new()
    }
}

/// What the engine should send back to the user; rendering is the transport
/// adapter's problem.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Start (or re-start) authorization before anything else
    AuthRequired,
    /// Show type selector + categories for `kind`
    CategoryKeyboard {
        kind: TxKind,
        categories: Vec<String>,
        /// True when an in-flight transaction was discarded to start over
        restarted: bool,
    },
    /// Show subcategories of the chosen category
    SubcategoryKeyboard {
        category: String,
        subcategories: Vec<String>,
    },
    AskAmount,
    /// Amount didn't parse as strictly positive; same prompt again
    AmountRejected { input: String },
    AskCommentDecision,
    AskComment,
    Committed {
        sheet: &'static str,
        category: String,
        amount: f64,
    },
    CommitFailed {
        reason: String,
        needs_reauthorization: bool,
    },
    Cancelled,
}

/// Result of applying one event to a pending transaction.
#[derive(Debug)]
pub(crate) enum Outcome {
    /// Flow continues (fields possibly updated); send this reply
    Continue(Reply),
    /// Terminal: assemble the row and append it
    Commit,
    /// Terminal: destroy the transaction
    Cancel,
}

/// Apply `event` to `tx`. No I/O; commits and cancellations are signalled
/// through the outcome and performed by the engine.
pub(crate) fn transition(
    tx: &mut PendingTransaction,
    event: &Event,
    catalog: &CategoryCatalog,
) -> Outcome {
    match event {
        Event::StartTransaction => {
            // Handled by the engine (explicit restart); unreachable here.
            Outcome::Continue(reprompt(tx, catalog))
        }
        Event::Cancel | Event::Button(Action::Cancel) => Outcome::Cancel,
        Event::Button(Action::Back) => back(tx, catalog),
        Event::Button(Action::Selector(kind)) => select_kind(tx, *kind, catalog),
        Event::Button(Action::Category(name)) => select_category(tx, name, catalog),
        Event::Button(Action::Subcategory(name)) => select_subcategory(tx, name, catalog),
        Event::Button(Action::CommentDecision(wants_comment)) => {
            comment_decision(tx, *wants_comment, catalog)
        }
        // Free text is claimed by the comment state before the amount state;
        // the two are mutually exclusive, so the priority only matters for
        // readers of this match.
        Event::Text(text) => match tx.step {
            Step::AwaitingComment => {
                tx.comment = if is_comment_skip(text) {
                    String::new()
                } else {
                    text.trim().to_string()
                };
                Outcome::Commit
            }
            Step::AwaitingAmount => match parse_amount(text) {
                Some(amount) => {
                    tx.amount = Some(amount);
                    tx.step = Step::AwaitingCommentDecision;
                    Outcome::Continue(Reply::AskCommentDecision)
                }
                None => Outcome::Continue(Reply::AmountRejected {
                    input: text.trim().to_string(),
                }),
            },
            // Stray text during keyboard steps: nudge with the current prompt.
            _ => Outcome::Continue(reprompt(tx, catalog)),
        },
    }
}

fn select_kind(tx: &mut PendingTransaction, kind: TxKind, catalog: &CategoryCatalog) -> Outcome {
    if tx.step != Step::TypeSelected {
        return Outcome::Continue(reprompt(tx, catalog));
    }
    tx.kind = kind;
    tx.category = None;
    tx.subcategory = None;
    Outcome::Continue(category_keyboard(kind, catalog, false))
}

fn select_category(tx: &mut PendingTransaction, name: &str, catalog: &CategoryCatalog) -> Outcome {
    if tx.step != Step::TypeSelected {
        return Outcome::Continue(reprompt(tx, catalog));
    }

    match tx.kind {
        TxKind::Income => {
            if !catalog.has_income_category(name) {
                return Outcome::Continue(category_keyboard(tx.kind, catalog, false));
            }
            tx.category = Some(name.to_string());
            // Income has no subcategory dimension; mirror the category and
            // skip straight to the amount.
            tx.subcategory = Some(name.to_string());
            tx.step = Step::AwaitingAmount;
            Outcome::Continue(Reply::AskAmount)
        }
        TxKind::Expense => {
            let Some(subcategories) = catalog.subcategories_of(name) else {
                return Outcome::Continue(category_keyboard(tx.kind, catalog, false));
            };
            tx.category = Some(name.to_string());
            tx.step = Step::CategorySelected;
            Outcome::Continue(Reply::SubcategoryKeyboard {
                category: name.to_string(),
                subcategories: subcategories.to_vec(),
            })
        }
    }
}

fn select_subcategory(
    tx: &mut PendingTransaction,
    name: &str,
    catalog: &CategoryCatalog,
) -> Outcome {
    if tx.step != Step::CategorySelected || tx.kind != TxKind::Expense {
        return Outcome::Continue(reprompt(tx, catalog));
    }
    let category = tx.category.clone().unwrap_or_default();
    if !catalog.has_subcategory(&category, name) {
        return Outcome::Continue(reprompt(tx, catalog));
    }
    tx.subcategory = Some(name.to_string());
    tx.step = Step::AwaitingAmount;
    Outcome::Continue(Reply::AskAmount)
}

fn comment_decision(
    tx: &mut PendingTransaction,
    wants_comment: bool,
    catalog: &CategoryCatalog,
) -> Outcome {
    if tx.step != Step::AwaitingCommentDecision {
        return Outcome::Continue(reprompt(tx, catalog));
    }
    if wants_comment {
        tx.step = Step::AwaitingComment;
        Outcome::Continue(Reply::AskComment)
    } else {
        tx.comment = String::new();
        Outcome::Commit
    }
}

/// One step back, clearing only the fields downstream of the landing point.
fn back(tx: &mut PendingTransaction, catalog: &CategoryCatalog) -> Outcome {
    match tx.step {
        Step::TypeSelected => Outcome::Continue(category_keyboard(tx.kind, catalog, false)),
        Step::CategorySelected => {
            tx.category = None;
            tx.subcategory = None;
            tx.step = Step::TypeSelected;
            Outcome::Continue(category_keyboard(tx.kind, catalog, false))
        }
        Step::AwaitingAmount => {
            tx.amount = None;
            match tx.kind {
                TxKind::Expense => {
                    tx.subcategory = None;
                    tx.step = Step::CategorySelected;
                    let category = tx.category.clone().unwrap_or_default();
                    let subcategories = catalog
                        .subcategories_of(&category)
                        .map(|s| s.to_vec())
                        .unwrap_or_default();
                    Outcome::Continue(Reply::SubcategoryKeyboard {
                        category,
                        subcategories,
                    })
                }
                TxKind::Income => {
                    tx.category = None;
                    tx.subcategory = None;
                    tx.step = Step::TypeSelected;
                    Outcome::Continue(category_keyboard(tx.kind, catalog, false))
                }
            }
        }
        Step::AwaitingCommentDecision => {
            tx.amount = None;
            tx.step = Step::AwaitingAmount;
            Outcome::Continue(Reply::AskAmount)
        }
        Step::AwaitingComment => {
            tx.step = Step::AwaitingCommentDecision;
            Outcome::Continue(Reply::AskCommentDecision)
        }
    }
}

/// The prompt matching the current step, for in-place re-prompts.
fn reprompt(tx: &PendingTransaction, catalog: &CategoryCatalog) -> Reply {
    match tx.step {
        Step::TypeSelected => category_keyboard(tx.kind, catalog, false),
        Step::CategorySelected => {
            let category = tx.category.clone().unwrap_or_default();
            Reply::SubcategoryKeyboard {
                subcategories: catalog
                    .subcategories_of(&category)
                    .map(|s| s.to_vec())
                    .unwrap_or_default(),
                category,
            }
        }
        Step::AwaitingAmount => Reply::AskAmount,
        Step::AwaitingCommentDecision => Reply::AskCommentDecision,
        Step::AwaitingComment => Reply::AskComment,
    }
}

pub(crate) fn category_keyboard(
    kind: TxKind,
    catalog: &CategoryCatalog,
    restarted: bool,
) -> Reply {
    let categories = match kind {
        TxKind::Expense => catalog
            .expense_names()
            .into_iter()
            .map(|s| s.to_string())
            .collect(),
        TxKind::Income => catalog.income.clone(),
    };
    Reply::CategoryKeyboard {
        kind,
        categories,
        restarted,
    }
}

/// Strictly positive, finite amount; `,` accepted as decimal separator.
fn parse_amount(input: &str) -> Option<f64> {
    let normalized = input.trim().replace(',', ".");
    let amount: f64 = normalized.parse().ok()?;
    (amount.is_finite() && amount > 0.0).then_some(amount)
}

fn is_comment_skip(input: &str) -> bool {
    let trimmed = input.trim();
    trimmed == COMMENT_SKIP_SENTINEL || trimmed.eq_ignore_ascii_case("skip")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_amount_accepts_positive() {
        assert_eq!(parse_amount("123.45"), Some(123.45));
        assert_eq!(parse_amount(" 75,20 "), Some(75.20));
        assert_eq!(parse_amount("2000"), Some(2000.0));
    }

    #[test]
    fn test_parse_amount_rejects_nonpositive_and_garbage() {
        assert_eq!(parse_amount("abc"), None);
        assert_eq!(parse_amount("-5"), None);
        assert_eq!(parse_amount("0"), None);
        assert_eq!(parse_amount(""), None);
        assert_eq!(parse_amount("inf"), None);
        assert_eq!(parse_amount("NaN"), None);
    }

    #[test]
    fn test_comment_skip_sentinel() {
        assert!(is_comment_skip("-"));
        assert!(is_comment_skip("  Skip "));
        assert!(!is_comment_skip("no comment"));
    }

    #[test]
    fn test_expense_row_shape() {
        let mut tx = PendingTransaction::new();
        tx.category = Some("HOME".to_string());
        tx.subcategory = Some("Electricity".to_string());
        tx.amount = Some(75.20);
        tx.date = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();

        let row = tx.to_row("alice", Utc::now());
        assert_eq!(row.len(), 7);
        assert_eq!(row[0], json!("2026-03-14"));
        assert_eq!(row[1], json!("alice"));
        assert_eq!(row[2], json!("HOME"));
        assert_eq!(row[3], json!("Electricity"));
        assert_eq!(row[4], json!(75.20));
        assert_eq!(row[6], json!(""));
    }

    #[test]
    fn test_income_row_has_no_subcategory_column() {
        let mut tx = PendingTransaction::new();
        tx.kind = TxKind::Income;
        tx.category = Some("Salary / Wages".to_string());
        tx.subcategory = Some("Salary / Wages".to_string());
        tx.amount = Some(2000.0);

        let row = tx.to_row("bob", Utc::now());
        assert_eq!(row.len(), 6);
        assert_eq!(row[2], json!("Salary / Wages"));
        assert_eq!(row[3], json!(2000.0));
    }

    #[test]
    fn test_back_from_amount_keeps_category_for_expense() {
        let catalog = CategoryCatalog::default();
        let mut tx = PendingTransaction::new();
        tx.category = Some("HOME".to_string());
        tx.subcategory = Some("Electricity".to_string());
        tx.step = Step::AwaitingAmount;

        let outcome = transition(&mut tx, &Event::Button(Action::Back), &catalog);
        assert!(matches!(outcome, Outcome::Continue(_)));
        assert_eq!(tx.step, Step::CategorySelected);
        assert_eq!(tx.category.as_deref(), Some("HOME"));
        assert_eq!(tx.subcategory, None);
    }

    #[test]
    fn test_unknown_category_represents_keyboard() {
        let catalog = CategoryCatalog::default();
        let mut tx = PendingTransaction::new();

        let outcome = transition(
            &mut tx,
            &Event::Button(Action::Category("NOT_A_CATEGORY".to_string())),
            &catalog,
        );
        assert!(matches!(
            outcome,
            Outcome::Continue(Reply::CategoryKeyboard { .. })
        ));
        assert_eq!(tx.step, Step::TypeSelected);
        assert_eq!(tx.category, None);
    }
}
