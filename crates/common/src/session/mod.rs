//! Per-document chat session state
//!
//! Every uploaded document name owns an append-only conversation history.
//! Exactly one document is active at a time; the active document decides
//! which history is shown and which one new turns are appended to.
//!
//! Fallback mode (answering over the pre-seeded folder without an upload)
//! uses a single anonymous history that is never listed by name.

use crate::errors::{AppError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Author of a chat turn
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One message in a conversation. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatTurn {
    role: Role,
    content: String,
    created_at: DateTime<Utc>,
}

impl ChatTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Chronological, append-only history for one document
#[derive(Debug, Clone, Default, Serialize)]
pub struct DocumentSession {
    turns: Vec<ChatTurn>,
}

impl DocumentSession {
    pub fn append(&mut self, turn: ChatTurn) {
        self.turns.push(turn);
    }

    /// Turns in insertion (chronological) order
    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    /// Turns newest first, for display. The stored order is untouched.
    pub fn newest_first(&self) -> impl Iterator<Item = &ChatTurn> {
        self.turns.iter().rev()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

/// Which history an interaction writes to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryTarget {
    /// The active document's session
    Active,
    /// The single anonymous session used in fallback mode
    Anonymous,
}

/// Registry of document sessions plus the active-document pointer.
///
/// Invariant: `active`, when set, is always a key of `sessions`.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<String, DocumentSession>,
    /// Document names in first-seen order, for the sidebar listing
    order: Vec<String>,
    active: Option<String>,
    anonymous: DocumentSession,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure(&mut self, name: &str) -> &mut DocumentSession {
        if !self.sessions.contains_key(name) {
            self.order.push(name.to_string());
        }
        self.sessions.entry(name.to_string()).or_default()
    }

    /// Make `name` active after an upload, creating an empty session if it is new.
    ///
    /// An existing history under the same name is kept as-is.
    pub fn activate(&mut self, name: &str) {
        let created = !self.sessions.contains_key(name);
        self.ensure(name);
        self.active = Some(name.to_string());
        tracing::debug!(document = %name, created, "Document activated");
    }

    /// Append a turn to the named session, creating it if absent.
    pub fn record_turn(&mut self, name: &str, turn: ChatTurn) {
        self.ensure(name).append(turn);
    }

    /// Append a turn to the anonymous fallback session.
    pub fn record_anonymous_turn(&mut self, turn: ChatTurn) {
        self.anonymous.append(turn);
    }

    /// Append a turn to whichever history `target` names.
    ///
    /// With no active document, an `Active` turn falls through to the
    /// anonymous session so a question is never dropped.
    pub fn record(&mut self, target: HistoryTarget, turn: ChatTurn) {
        match (target, self.active.clone()) {
            (HistoryTarget::Active, Some(name)) => self.record_turn(&name, turn),
            _ => self.record_anonymous_turn(turn),
        }
    }

    /// Switch the active document. Unknown names leave the pointer untouched.
    pub fn select(&mut self, name: &str) -> Result<()> {
        if !self.sessions.contains_key(name) {
            return Err(AppError::Selection {
                name: name.to_string(),
            });
        }
        self.active = Some(name.to_string());
        Ok(())
    }

    pub fn active_document(&self) -> Option<&str> {
        self.active.as_deref()
    }

    /// History of the active document, or empty if none is active
    pub fn active_history(&self) -> &[ChatTurn] {
        self.active
            .as_ref()
            .and_then(|name| self.sessions.get(name))
            .map(DocumentSession::turns)
            .unwrap_or(&[])
    }

    pub fn anonymous_history(&self) -> &[ChatTurn] {
        self.anonymous.turns()
    }

    /// The session `target` resolves to; `None` only if `active` names no session
    fn session_for(&self, target: HistoryTarget) -> Option<&DocumentSession> {
        match (target, self.active.as_deref()) {
            (HistoryTarget::Active, Some(name)) => self.sessions.get(name),
            _ => Some(&self.anonymous),
        }
    }

    /// History for `target`, chronological
    pub fn history(&self, target: HistoryTarget) -> &[ChatTurn] {
        self.session_for(target)
            .map(DocumentSession::turns)
            .unwrap_or(&[])
    }

    /// History for `target`, newest first, as owned values for rendering
    pub fn display_history(&self, target: HistoryTarget) -> Vec<ChatTurn> {
        self.session_for(target)
            .map(|session| session.newest_first().cloned().collect())
            .unwrap_or_default()
    }

    pub fn session(&self, name: &str) -> Option<&DocumentSession> {
        self.sessions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sessions.contains_key(name)
    }

    /// Known document names in first-seen order
    pub fn documents(&self) -> &[String] {
        &self.order
    }
}
