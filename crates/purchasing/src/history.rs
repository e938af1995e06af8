//! Append-only audit trail attached to each order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryAction {
    Created,
    Sent,
    Updated,
    Received,
}

impl core::fmt::Display for HistoryAction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            HistoryAction::Created => "created",
            HistoryAction::Sent => "sent",
            HistoryAction::Updated => "updated",
            HistoryAction::Received => "received",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryLogEntry {
    pub timestamp: DateTime<Utc>,
    pub action: HistoryAction,
    pub actor: String,
    pub note: String,
}

/// Entries are kept in the order transitions were accepted. Timestamps come
/// from the acting party's clock and may be out of order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HistoryLog(Vec<HistoryLogEntry>);

impl HistoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(
        &mut self,
        timestamp: DateTime<Utc>,
        action: HistoryAction,
        actor: impl Into<String>,
        note: impl Into<String>,
    ) {
        self.0.push(HistoryLogEntry {
            timestamp,
            action,
            actor: actor.into(),
            note: note.into(),
        });
    }

    pub fn entries(&self) -> &[HistoryLogEntry] {
        &self.0
    }

    pub fn last(&self) -> Option<&HistoryLogEntry> {
        self.0.last()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
