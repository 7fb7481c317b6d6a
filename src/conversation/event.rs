// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Inbound conversation events and button-payload decoding.
//!
//! Button presses arrive from the transport as `|`-delimited tag strings
//! (`selector|expense`, `category|HOME`, `back`). They are decoded exactly
//! once, here, into a closed `Action` enum; the state machine only ever
//! matches on variants.

use crate::error::AppError;

/// Transaction type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxKind {
    Expense,
    Income,
}

impl TxKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxKind::Expense => "expense",
            TxKind::Income => "income",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "expense" => Some(TxKind::Expense),
            "income" => Some(TxKind::Income),
            _ => None,
        }
    }
}

/// A decoded button press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Switch the transaction type selector
    Selector(TxKind),
    /// Pick a category
    Category(String),
    /// Pick a subcategory (expense flow only)
    Subcategory(String),
    /// Answer the "add a comment?" question
    CommentDecision(bool),
    /// Go back one step
    Back,
    /// Abandon the flow
    Cancel,
}

impl Action {
    /// Decode a raw callback payload.
    ///
    /// The first `|`-segment is the action discriminant; the remainder (if
    /// any) is the argument, taken verbatim so category names may contain
    /// `|`-free punctuation like "Salary / Wages".
    pub fn parse(data: &str) -> Result<Self, AppError> {
        let mut parts = data.splitn(2, '|');
        let tag = parts.next().unwrap_or_default();
        let arg = parts.next();

        match (tag, arg) {
            ("selector", Some(kind)) => TxKind::parse(kind)
                .map(Action::Selector)
                .ok_or_else(|| AppError::Validation(format!("unknown transaction type: {}", kind))),
            ("category", Some(name)) if !name.is_empty() => {
                Ok(Action::Category(name.to_string()))
            }
            ("subcategory", Some(name)) if !name.is_empty() => {
                Ok(Action::Subcategory(name.to_string()))
            }
            ("comment", Some("yes")) => Ok(Action::CommentDecision(true)),
            ("comment", Some("no")) => Ok(Action::CommentDecision(false)),
            ("back", None) => Ok(Action::Back),
            ("cancel", None) => Ok(Action::Cancel),
            _ => Err(AppError::Validation(format!(
                "unrecognized button payload: {}",
                data
            ))),
        }
    }
}

/// One inbound conversation event, already normalized by the transport
/// adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Explicit "add transaction" command
    StartTransaction,
    /// Explicit cancellation command
    Cancel,
    /// A decoded button press
    Button(Action),
    /// Free-text message (amount or comment, depending on state)
    Text(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_selector() {
        assert_eq!(
            Action::parse("selector|expense").unwrap(),
            Action::Selector(TxKind::Expense)
        );
        assert_eq!(
            Action::parse("selector|income").unwrap(),
            Action::Selector(TxKind::Income)
        );
        assert!(Action::parse("selector|refund").is_err());
    }

    #[test]
    fn test_parse_category_keeps_argument_verbatim() {
        assert_eq!(
            Action::parse("category|Salary / Wages").unwrap(),
            Action::Category("Salary / Wages".to_string())
        );
        assert_eq!(
            Action::parse("subcategory|Electricity").unwrap(),
            Action::Subcategory("Electricity".to_string())
        );
    }

    #[test]
    fn test_parse_bare_tags() {
        assert_eq!(Action::parse("back").unwrap(), Action::Back);
        assert_eq!(Action::parse("cancel").unwrap(), Action::Cancel);
        assert_eq!(
            Action::parse("comment|yes").unwrap(),
            Action::CommentDecision(true)
        );
        assert_eq!(
            Action::parse("comment|no").unwrap(),
            Action::CommentDecision(false)
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Action::parse("").is_err());
        assert!(Action::parse("category|").is_err());
        assert!(Action::parse("comment|maybe").is_err());
        assert!(Action::parse("back|extra").is_err());
        assert!(Action::parse("launch|missiles").is_err());
    }
}
