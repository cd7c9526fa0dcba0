//! Structural before/after comparison of a block.
//!
//! A [`Diff`] with only `new_block` describes a creation, only `old_block` a
//! deletion, both a modification. A diff with neither is degenerate and is
//! skipped by the renderer.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use corkboard_types::{Block, BlockType, Board};

/// One changed named property.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropDiff {
    pub name: String,
    pub old_value: String,
    pub new_value: String,
}

impl PropDiff {
    pub fn new(
        name: impl Into<String>,
        old_value: impl Into<String>,
        new_value: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            old_value: old_value.into(),
            new_value: new_value.into(),
        }
    }

    /// Check if the value actually changed.
    pub fn is_changed(&self) -> bool {
        self.old_value != self.new_value
    }
}

/// What kind of change a diff describes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Change<'a> {
    Added(&'a Block),
    Deleted(&'a Block),
    Modified { old: &'a Block, new: &'a Block },
}

/// Before/after state of one block plus its relevant children.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Diff {
    /// Board the block lives on, when known (used for links).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub board: Option<Board>,
    /// Card the block belongs to, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card: Option<Block>,
    /// Users who contributed to the change.
    #[serde(default)]
    pub authors: BTreeSet<String>,
    pub block_type: BlockType,
    /// Unix millis of the latest change folded into this diff.
    #[serde(default)]
    pub update_at: i64,
    /// State after the change; absent when the block was deleted.
    #[serde(default)]
    pub new_block: Option<Block>,
    /// State before the change; absent when the block was created.
    #[serde(default)]
    pub old_block: Option<Block>,
    /// Changed named properties, ordered by name.
    #[serde(default)]
    pub prop_diffs: Vec<PropDiff>,
    /// Child diffs (comments, content), in the order they were collected.
    #[serde(default)]
    pub diffs: Vec<Diff>,
}

impl Diff {
    /// Compare two states of one block.
    ///
    /// Returns `None` when both states are absent. Property differences are
    /// only computed when both states are present.
    pub fn between(old: Option<Block>, new: Option<Block>) -> Option<Self> {
        let block_type = new.as_ref().or(old.as_ref())?.block_type;
        let update_at = new.as_ref().or(old.as_ref()).map_or(0, |b| b.update_at);
        let prop_diffs = match (&old, &new) {
            (Some(old), Some(new)) => prop_diffs(&old.properties, &new.properties),
            _ => Vec::new(),
        };
        let mut authors = BTreeSet::new();
        if let Some(by) = new
            .as_ref()
            .map(|b| b.modified_by.as_str())
            .filter(|by| !by.is_empty())
        {
            authors.insert(by.to_string());
        }
        Some(Self {
            board: None,
            card: None,
            authors,
            block_type,
            update_at,
            new_block: new,
            old_block: old,
            prop_diffs,
            diffs: Vec::new(),
        })
    }

    /// Attach the board (used for links).
    pub fn with_board(mut self, board: Board) -> Self {
        self.board = Some(board);
        self
    }

    /// Record a contributing user.
    pub fn with_author(mut self, user_id: impl Into<String>) -> Self {
        self.authors.insert(user_id.into());
        self
    }

    /// Append a child diff.
    pub fn with_child(mut self, child: Diff) -> Self {
        self.diffs.push(child);
        self
    }

    /// Classify the change, or `None` for a degenerate diff.
    pub fn change(&self) -> Option<Change<'_>> {
        match (&self.old_block, &self.new_block) {
            (None, None) => None,
            (None, Some(new)) => Some(Change::Added(new)),
            (Some(old), None) => Some(Change::Deleted(old)),
            (Some(old), Some(new)) => Some(Change::Modified { old, new }),
        }
    }

    /// The most recent known state of the block.
    pub fn latest(&self) -> Option<&Block> {
        self.new_block.as_ref().or(self.old_block.as_ref())
    }
}

/// Changed properties between two property maps, ordered by name.
pub fn prop_diffs(old: &BTreeMap<String, Value>, new: &BTreeMap<String, Value>) -> Vec<PropDiff> {
    let names: BTreeSet<&String> = old.keys().chain(new.keys()).collect();
    names
        .into_iter()
        .filter_map(|name| {
            let old_value = old.get(name).map(display_value).unwrap_or_default();
            let new_value = new.get(name).map(display_value).unwrap_or_default();
            let diff = PropDiff::new(name.clone(), old_value, new_value);
            diff.is_changed().then_some(diff)
        })
        .collect()
}

/// Render a property value the way a person would read it.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(display_value)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}
