//! Boards, board members, and the batch shapes mutations operate on.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::block::{Block, BlockPatch};
use crate::ids::{IdKind, new_id};

/// A team-scoped container of blocks and members.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Board {
    pub id: String,
    pub team_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub created_by: String,
    #[serde(default)]
    pub modified_by: String,
    /// Unix millis.
    pub create_at: i64,
    /// Unix millis.
    pub update_at: i64,
    /// Unix millis, zero while the board is live.
    #[serde(default)]
    pub delete_at: i64,
}

impl Board {
    /// Create a board in a team with a freshly generated id.
    pub fn new(team_id: impl Into<String>, title: impl Into<String>) -> Self {
        let now = crate::now_millis();
        Self {
            id: new_id(IdKind::Board),
            team_id: team_id.into(),
            title: title.into(),
            created_by: String::new(),
            modified_by: String::new(),
            create_at: now,
            update_at: now,
            delete_at: 0,
        }
    }

    /// Set the board id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

/// A partial update to a board.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BoardPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl BoardPatch {
    /// Set the new title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Apply this patch to a board, stamping the modifier and update time.
    pub fn apply(&self, board: &mut Board, user_id: &str, now: i64) {
        if let Some(title) = &self.title {
            board.title = title.clone();
        }
        board.modified_by = user_id.to_string();
        board.update_at = now;
    }
}

/// User-to-board role association.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardMember {
    pub board_id: String,
    pub user_id: String,
    #[serde(default)]
    pub scheme_admin: bool,
    #[serde(default)]
    pub scheme_editor: bool,
    #[serde(default)]
    pub scheme_commenter: bool,
    #[serde(default)]
    pub scheme_viewer: bool,
}

impl BoardMember {
    /// A member with every role flag set, as added for a board's creator.
    pub fn admin(board_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            board_id: board_id.into(),
            user_id: user_id.into(),
            scheme_admin: true,
            scheme_editor: true,
            scheme_commenter: true,
            scheme_viewer: true,
        }
    }
}

/// Errors from validating a batch before it reaches the store.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BatchError {
    /// A create batch must contain at least one board.
    #[error("batch contains no boards")]
    NoBoards,

    /// Every board in one batch must belong to the same team.
    #[error("batch mixes teams: {first} and {other}")]
    MixedTeams { first: String, other: String },

    /// A board in the batch has no team.
    #[error("board {0} has no team id")]
    MissingTeam(String),

    /// Parallel id/patch arrays differ in length.
    #[error("{what}: {ids} ids but {patches} patches")]
    LengthMismatch {
        what: &'static str,
        ids: usize,
        patches: usize,
    },

    /// A batch references nothing.
    #[error("batch is empty")]
    Empty,
}

/// A set of boards and blocks created or returned together.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BoardsAndBlocks {
    #[serde(default)]
    pub boards: Vec<Board>,
    #[serde(default)]
    pub blocks: Vec<Block>,
}

impl BoardsAndBlocks {
    /// Create a batch.
    pub fn new(boards: Vec<Board>, blocks: Vec<Block>) -> Self {
        Self { boards, blocks }
    }

    /// The single team every board in the batch belongs to.
    ///
    /// Fails when the batch has no boards, a board lacks a team, or the
    /// boards span more than one team.
    pub fn team_id(&self) -> Result<&str, BatchError> {
        let first = self.boards.first().ok_or(BatchError::NoBoards)?;
        for board in &self.boards {
            if board.team_id.is_empty() {
                return Err(BatchError::MissingTeam(board.id.clone()));
            }
            if board.team_id != first.team_id {
                return Err(BatchError::MixedTeams {
                    first: first.team_id.clone(),
                    other: board.team_id.clone(),
                });
            }
        }
        Ok(&first.team_id)
    }
}

/// A patch over several boards and blocks, applied atomically.
///
/// `board_ids[i]` is patched with `board_patches[i]`; likewise for blocks.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PatchBoardsAndBlocks {
    #[serde(default)]
    pub board_ids: Vec<String>,
    #[serde(default)]
    pub board_patches: Vec<BoardPatch>,
    #[serde(default)]
    pub block_ids: Vec<String>,
    #[serde(default)]
    pub block_patches: Vec<BlockPatch>,
}

impl PatchBoardsAndBlocks {
    /// Add a board patch.
    pub fn patch_board(mut self, board_id: impl Into<String>, patch: BoardPatch) -> Self {
        self.board_ids.push(board_id.into());
        self.board_patches.push(patch);
        self
    }

    /// Add a block patch.
    pub fn patch_block(mut self, block_id: impl Into<String>, patch: BlockPatch) -> Self {
        self.block_ids.push(block_id.into());
        self.block_patches.push(patch);
        self
    }

    /// Check the parallel arrays line up and something is patched.
    pub fn validate(&self) -> Result<(), BatchError> {
        if self.board_ids.len() != self.board_patches.len() {
            return Err(BatchError::LengthMismatch {
                what: "boards",
                ids: self.board_ids.len(),
                patches: self.board_patches.len(),
            });
        }
        if self.block_ids.len() != self.block_patches.len() {
            return Err(BatchError::LengthMismatch {
                what: "blocks",
                ids: self.block_ids.len(),
                patches: self.block_patches.len(),
            });
        }
        if self.board_ids.is_empty() && self.block_ids.is_empty() {
            return Err(BatchError::Empty);
        }
        Ok(())
    }
}

/// Ids of boards and blocks to delete atomically.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteBoardsAndBlocks {
    #[serde(default)]
    pub boards: Vec<String>,
    #[serde(default)]
    pub blocks: Vec<String>,
}

impl DeleteBoardsAndBlocks {
    /// Create a delete batch.
    pub fn new(boards: Vec<String>, blocks: Vec<String>) -> Self {
        Self { boards, blocks }
    }

    /// Check something is deleted.
    pub fn validate(&self) -> Result<(), BatchError> {
        if self.boards.is_empty() && self.blocks.is_empty() {
            return Err(BatchError::Empty);
        }
        Ok(())
    }
}
