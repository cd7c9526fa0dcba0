//! Blocks: the typed content units that live on a board.
//!
//! A card is a block; its comments and content (text, images, checkboxes) are
//! child blocks whose `parent_id` is the card id. Every block carries the id of
//! the board it belongs to.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::EnumString;

use crate::ids::{IdKind, new_id};

/// What a block *is*.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum BlockType {
    /// Legacy board block (boards are first-class entities now).
    Board,
    /// A card on a board.
    #[default]
    Card,
    /// A comment on a card.
    Comment,
    /// Markdown content of a card.
    Text,
    /// Image content of a card.
    Image,
    /// Horizontal rule content of a card.
    Divider,
    /// Checkbox content of a card.
    Checkbox,
    /// A board view (table, kanban, gallery).
    View,
    /// Anything this build does not know about.
    #[serde(other)]
    Unknown,
}

impl BlockType {
    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockType::Board => "board",
            BlockType::Card => "card",
            BlockType::Comment => "comment",
            BlockType::Text => "text",
            BlockType::Image => "image",
            BlockType::Divider => "divider",
            BlockType::Checkbox => "checkbox",
            BlockType::View => "view",
            BlockType::Unknown => "unknown",
        }
    }

    /// Check if blocks of this type hang off a card (comments and content).
    pub fn is_card_child(&self) -> bool {
        matches!(
            self,
            BlockType::Comment
                | BlockType::Text
                | BlockType::Image
                | BlockType::Divider
                | BlockType::Checkbox
        )
    }
}

impl std::fmt::Display for BlockType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A typed content unit belonging to exactly one board.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: String,
    /// Parent block id (the card for comments and content). Empty for top-level blocks.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub parent_id: String,
    pub board_id: String,
    #[serde(default)]
    pub created_by: String,
    #[serde(default)]
    pub modified_by: String,
    #[serde(rename = "type")]
    pub block_type: BlockType,
    #[serde(default)]
    pub title: String,
    /// Named, arbitrarily typed card properties.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, Value>,
    /// Unix millis.
    pub create_at: i64,
    /// Unix millis.
    pub update_at: i64,
    /// Unix millis, zero while the block is live.
    #[serde(default)]
    pub delete_at: i64,
}

impl Block {
    /// Create a block of the given type with a freshly generated id.
    pub fn new(block_type: BlockType, board_id: impl Into<String>, title: impl Into<String>) -> Self {
        let kind = match block_type {
            BlockType::Card => IdKind::Card,
            _ => IdKind::Block,
        };
        let now = crate::now_millis();
        Self {
            id: new_id(kind),
            parent_id: String::new(),
            board_id: board_id.into(),
            created_by: String::new(),
            modified_by: String::new(),
            block_type,
            title: title.into(),
            properties: BTreeMap::new(),
            create_at: now,
            update_at: now,
            delete_at: 0,
        }
    }

    /// Create a card.
    pub fn card(board_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self::new(BlockType::Card, board_id, title)
    }

    /// Create a comment on a card.
    pub fn comment(card: &Block, text: impl Into<String>) -> Self {
        Self::new(BlockType::Comment, card.board_id.clone(), text).with_parent(&card.id)
    }

    /// Set the block id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Set the parent block id.
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = parent_id.into();
        self
    }

    /// Set a named property.
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Set the author (both creator and last modifier).
    pub fn with_author(mut self, user_id: impl Into<String>) -> Self {
        let user_id = user_id.into();
        self.created_by = user_id.clone();
        self.modified_by = user_id;
        self
    }

    /// Check if this block has a parent block.
    pub fn has_parent(&self) -> bool {
        !self.parent_id.is_empty()
    }
}

/// A partial update to a block.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub updated_properties: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deleted_properties: Vec<String>,
}

impl BlockPatch {
    /// Set the new title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set a property value.
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.updated_properties.insert(name.into(), value.into());
        self
    }

    /// Remove a property.
    pub fn without_property(mut self, name: impl Into<String>) -> Self {
        self.deleted_properties.push(name.into());
        self
    }

    /// Apply this patch to a block, stamping the modifier and update time.
    pub fn apply(&self, block: &mut Block, user_id: &str, now: i64) {
        if let Some(title) = &self.title {
            block.title = title.clone();
        }
        if let Some(parent_id) = &self.parent_id {
            block.parent_id = parent_id.clone();
        }
        for (name, value) in &self.updated_properties {
            block.properties.insert(name.clone(), value.clone());
        }
        for name in &self.deleted_properties {
            block.properties.remove(name);
        }
        block.modified_by = user_id.to_string();
        block.update_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_type_parsing() {
        assert_eq!("card".parse::<BlockType>(), Ok(BlockType::Card));
        assert_eq!("COMMENT".parse::<BlockType>(), Ok(BlockType::Comment));
        assert!("nope".parse::<BlockType>().is_err());
    }

    #[test]
    fn test_block_type_serde() {
        let json = serde_json::to_string(&BlockType::Comment).unwrap();
        assert_eq!(json, "\"comment\"");
        let parsed: BlockType = serde_json::from_str("\"somethingnew\"").unwrap();
        assert_eq!(parsed, BlockType::Unknown);
    }

    #[test]
    fn test_card_child_kinds() {
        assert!(BlockType::Comment.is_card_child());
        assert!(BlockType::Text.is_card_child());
        assert!(!BlockType::Card.is_card_child());
        assert!(!BlockType::View.is_card_child());
    }

    #[test]
    fn test_comment_hangs_off_card() {
        let card = Block::card("b1", "Buy milk");
        let comment = Block::comment(&card, "on it");
        assert_eq!(comment.parent_id, card.id);
        assert_eq!(comment.board_id, "b1");
        assert_eq!(comment.block_type, BlockType::Comment);
        assert!(comment.has_parent());
        assert!(!card.has_parent());
    }

    #[test]
    fn test_block_serde_uses_type_key() {
        let block = Block::card("b1", "Title").with_id("c1");
        let json = serde_json::to_value(&block).unwrap();
        assert_eq!(json["type"], "card");
        assert_eq!(json["id"], "c1");
        assert!(json.get("parent_id").is_none());
    }

    #[test]
    fn test_patch_apply() {
        let mut block = Block::card("b1", "Old")
            .with_property("Status", "Todo")
            .with_property("Priority", "High");
        let patch = BlockPatch::default()
            .with_title("New")
            .with_property("Status", "Done")
            .without_property("Priority");

        patch.apply(&mut block, "u1", 42);

        assert_eq!(block.title, "New");
        assert_eq!(block.properties["Status"], "Done");
        assert!(!block.properties.contains_key("Priority"));
        assert_eq!(block.modified_by, "u1");
        assert_eq!(block.update_at, 42);
    }
}
