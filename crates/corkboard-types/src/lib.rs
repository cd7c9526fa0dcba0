//! Shared board, block and notification types for corkboard.
//!
//! This crate is the data foundation: generated ids, boards, blocks, board
//! members, the batch shapes the mutation coordinator accepts, and the
//! notification hint record the subscription engine schedules. It has **no
//! internal corkboard dependencies**.
//!
//! # Entity-Relationship Overview
//!
//! ```text
//! Team (team_id)
//!     └── owns Board (BoardId)
//!             └── contains Block (card, view, ...)
//!             │       └── parent of Block (comment, text, ...)
//!             └── has BoardMember (user_id + role flags)
//! ```
//!
//! # Key Types
//!
//! |------------------------|------------------------------------------------|
//! | Type                   | Purpose                                        |
//! |------------------------|------------------------------------------------|
//! | [`Block`]              | Typed content unit with properties             |
//! | [`Board`]              | Team-scoped container of blocks                |
//! | [`BoardMember`]        | User-to-board role association                 |
//! | [`BoardsAndBlocks`]    | Create batch / mutation result                 |
//! | [`PatchBoardsAndBlocks`] | Patch batch (parallel id/patch arrays)       |
//! | [`DeleteBoardsAndBlocks`] | Delete batch (id lists)                     |
//! | [`NotificationHint`]   | Deferred notification schedule record          |
//! |------------------------|------------------------------------------------|

pub mod block;
pub mod board;
pub mod ids;
pub mod notification;

pub use block::{Block, BlockPatch, BlockType};
pub use board::{
    BatchError, Board, BoardMember, BoardPatch, BoardsAndBlocks, DeleteBoardsAndBlocks,
    PatchBoardsAndBlocks,
};
pub use ids::{IdKind, new_id};
pub use notification::{HintError, HintLogView, NotificationHint};

/// Current time as Unix milliseconds. Used by constructors throughout the crate.
pub fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
