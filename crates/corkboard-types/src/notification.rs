//! Notification hints: "block X in workspace W changed, notify at time T".
//!
//! A hint is written whenever a block with subscribers changes. The deferred
//! scheduler consumes it once `notify_at` has elapsed, or replaces it when a
//! newer change to the same block arrives first. That replacement is what
//! debounces a burst of edits into a single notification.

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from validating a hint before it is scheduled.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HintError {
    /// The hint is missing something it needs to be scheduled.
    #[error("invalid notification hint: {0}")]
    Invalid(String),
}

impl HintError {
    fn invalid(reason: &str) -> Self {
        Self::Invalid(reason.to_string())
    }

    /// The human-readable reason the hint was rejected.
    pub fn reason(&self) -> &str {
        match self {
            Self::Invalid(reason) => reason,
        }
    }
}

/// A scheduled-delivery record for a changed block with subscribers.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationHint {
    /// Block type of the changed entity (e.g. `card`).
    pub block_type: String,
    /// Id of the changed entity.
    pub block_id: String,
    /// Workspace (team) the block belongs to.
    pub workspace_id: String,
    /// User who made the change.
    pub modified_by_id: String,
    /// When the hint was first created (Unix millis).
    pub create_at: i64,
    /// When the notification should fire (Unix millis).
    pub notify_at: i64,
}

impl NotificationHint {
    /// Validate a possibly-absent hint.
    pub fn check(hint: Option<&NotificationHint>) -> Result<(), HintError> {
        match hint {
            None => Err(HintError::invalid("cannot be nil")),
            Some(hint) => hint.is_valid(),
        }
    }

    /// Check every required field is populated.
    pub fn is_valid(&self) -> Result<(), HintError> {
        if self.block_id.is_empty() {
            return Err(HintError::invalid("missing block id"));
        }
        if self.workspace_id.is_empty() {
            return Err(HintError::invalid("missing workspace id"));
        }
        if self.block_type.is_empty() {
            return Err(HintError::invalid("missing block type"));
        }
        if self.modified_by_id.is_empty() {
            return Err(HintError::invalid("missing modified_by id"));
        }
        Ok(())
    }

    /// Log-friendly copy with human-readable timestamps.
    pub fn log_view(&self) -> HintLogView {
        HintLogView {
            block_type: self.block_type.clone(),
            block_id: self.block_id.clone(),
            workspace_id: self.workspace_id.clone(),
            modified_by_id: self.modified_by_id.clone(),
            create_at: stamp_millis(self.create_at),
            notify_at: stamp_millis(self.notify_at),
        }
    }
}

/// A [`NotificationHint`] with its timestamps rendered for logs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HintLogView {
    pub block_type: String,
    pub block_id: String,
    pub workspace_id: String,
    pub modified_by_id: String,
    pub create_at: String,
    pub notify_at: String,
}

impl std::fmt::Display for HintLogView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} ws={} by={} created={} notify={}",
            self.block_type,
            self.block_id,
            self.workspace_id,
            self.modified_by_id,
            self.create_at,
            self.notify_at
        )
    }
}

/// `Jan _2 15:04:05.000` in UTC.
fn stamp_millis(millis: i64) -> String {
    match DateTime::from_timestamp_millis(millis) {
        Some(t) => t.format("%b %e %H:%M:%S%.3f").to_string(),
        None => millis.to_string(),
    }
}
