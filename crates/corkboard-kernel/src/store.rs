//! Board and block storage.
//!
//! [`Store`] is the single source of truth the coordinator mutates. Every
//! mutation is atomic across its whole batch: either every board, block and
//! member in it is applied, or none is.
//!
//! # Concurrency Model
//!
//! - DashMap for concurrent per-entity reads
//! - A parking_lot RwLock held for writing across a whole batch, and for
//!   reading by single-entity lookups, so readers never observe half a batch

use std::collections::HashSet;

use dashmap::DashMap;
use parking_lot::RwLock;

use corkboard_types::{
    Block, Board, BoardMember, BoardsAndBlocks, DeleteBoardsAndBlocks, IdKind,
    PatchBoardsAndBlocks, new_id, now_millis,
};

use crate::error::{StoreError, StoreResult};

/// Persistent board/block/member storage.
///
/// Calls are blocking. Implementations own their own concurrency control.
pub trait Store: Send + Sync {
    /// Fetch one block.
    fn get_block(&self, id: &str) -> StoreResult<Block>;

    /// Fetch one board.
    fn get_board(&self, id: &str) -> StoreResult<Board>;

    /// Create boards and blocks, returning them with ids and timestamps resolved.
    fn create_boards_and_blocks(
        &self,
        batch: &BoardsAndBlocks,
        user_id: &str,
    ) -> StoreResult<BoardsAndBlocks>;

    /// Create boards and blocks and add the user as admin of every new board.
    fn create_boards_and_blocks_with_admin(
        &self,
        batch: &BoardsAndBlocks,
        user_id: &str,
    ) -> StoreResult<(BoardsAndBlocks, Vec<BoardMember>)>;

    /// Apply every board and block patch, returning the patched entities.
    fn patch_boards_and_blocks(
        &self,
        patch: &PatchBoardsAndBlocks,
        user_id: &str,
    ) -> StoreResult<BoardsAndBlocks>;

    /// Delete the listed boards (with their blocks and members) and blocks.
    fn delete_boards_and_blocks(&self, del: &DeleteBoardsAndBlocks, user_id: &str) -> StoreResult<()>;
}

/// In-memory [`Store`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    boards: DashMap<String, Board>,
    blocks: DashMap<String, Block>,
    /// Keyed by (board_id, user_id).
    members: DashMap<(String, String), BoardMember>,
    batch_lock: RwLock<()>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Members of a board, ordered by user id.
    pub fn members(&self, board_id: &str) -> Vec<BoardMember> {
        let _guard = self.batch_lock.read();
        let mut members: Vec<BoardMember> = self
            .members
            .iter()
            .filter(|m| m.board_id == board_id)
            .map(|m| m.value().clone())
            .collect();
        members.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        members
    }

    /// Blocks whose parent is the given block.
    pub fn children(&self, parent_id: &str) -> Vec<Block> {
        let _guard = self.batch_lock.read();
        let mut children: Vec<Block> = self
            .blocks
            .iter()
            .filter(|b| b.parent_id == parent_id)
            .map(|b| b.value().clone())
            .collect();
        children.sort_by_key(|b| b.create_at);
        children
    }

    /// Number of stored blocks.
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Number of stored boards.
    pub fn board_count(&self) -> usize {
        self.boards.len()
    }

    fn create_locked(
        &self,
        batch: &BoardsAndBlocks,
        user_id: &str,
        add_admin: bool,
    ) -> StoreResult<(BoardsAndBlocks, Vec<BoardMember>)> {
        let _guard = self.batch_lock.write();
        let now = now_millis();

        let boards: Vec<Board> = batch
            .boards
            .iter()
            .map(|board| {
                let mut board = board.clone();
                if board.id.is_empty() {
                    board.id = new_id(IdKind::Board);
                }
                board.created_by = user_id.to_string();
                board.modified_by = user_id.to_string();
                board.create_at = now;
                board.update_at = now;
                board
            })
            .collect();

        let blocks: Vec<Block> = batch
            .blocks
            .iter()
            .map(|block| {
                let mut block = block.clone();
                if block.id.is_empty() {
                    block.id = new_id(IdKind::Block);
                }
                block.created_by = user_id.to_string();
                block.modified_by = user_id.to_string();
                block.create_at = now;
                block.update_at = now;
                block
            })
            .collect();

        // Validate the whole batch before touching anything.
        let mut new_board_ids = HashSet::new();
        for board in &boards {
            if self.boards.contains_key(&board.id) || !new_board_ids.insert(board.id.as_str()) {
                return Err(StoreError::Conflict(board.id.clone()));
            }
        }
        let mut new_block_ids = HashSet::new();
        for block in &blocks {
            if self.blocks.contains_key(&block.id) || !new_block_ids.insert(block.id.as_str()) {
                return Err(StoreError::Conflict(block.id.clone()));
            }
            if !new_board_ids.contains(block.board_id.as_str())
                && !self.boards.contains_key(&block.board_id)
            {
                return Err(StoreError::Invalid(format!(
                    "block {} references unknown board {}",
                    block.id, block.board_id
                )));
            }
        }

        let members: Vec<BoardMember> = if add_admin {
            boards
                .iter()
                .map(|b| BoardMember::admin(b.id.clone(), user_id))
                .collect()
        } else {
            Vec::new()
        };

        for board in &boards {
            self.boards.insert(board.id.clone(), board.clone());
        }
        for block in &blocks {
            self.blocks.insert(block.id.clone(), block.clone());
        }
        for member in &members {
            self.members
                .insert((member.board_id.clone(), member.user_id.clone()), member.clone());
        }

        Ok((BoardsAndBlocks::new(boards, blocks), members))
    }
}

impl Store for MemoryStore {
    fn get_block(&self, id: &str) -> StoreResult<Block> {
        let _guard = self.batch_lock.read();
        self.blocks
            .get(id)
            .map(|b| b.value().clone())
            .ok_or_else(|| StoreError::BlockNotFound(id.to_string()))
    }

    fn get_board(&self, id: &str) -> StoreResult<Board> {
        let _guard = self.batch_lock.read();
        self.boards
            .get(id)
            .map(|b| b.value().clone())
            .ok_or_else(|| StoreError::BoardNotFound(id.to_string()))
    }

    fn create_boards_and_blocks(
        &self,
        batch: &BoardsAndBlocks,
        user_id: &str,
    ) -> StoreResult<BoardsAndBlocks> {
        self.create_locked(batch, user_id, false).map(|(bab, _)| bab)
    }

    fn create_boards_and_blocks_with_admin(
        &self,
        batch: &BoardsAndBlocks,
        user_id: &str,
    ) -> StoreResult<(BoardsAndBlocks, Vec<BoardMember>)> {
        self.create_locked(batch, user_id, true)
    }

    fn patch_boards_and_blocks(
        &self,
        patch: &PatchBoardsAndBlocks,
        user_id: &str,
    ) -> StoreResult<BoardsAndBlocks> {
        patch
            .validate()
            .map_err(|e| StoreError::Invalid(e.to_string()))?;

        let _guard = self.batch_lock.write();
        let now = now_millis();

        let mut boards: Vec<Board> = Vec::with_capacity(patch.board_ids.len());
        for (id, board_patch) in patch.board_ids.iter().zip(&patch.board_patches) {
            if let Some(board) = boards.iter_mut().find(|b| &b.id == id) {
                board_patch.apply(board, user_id, now);
                continue;
            }
            let mut board = self
                .boards
                .get(id)
                .map(|b| b.value().clone())
                .ok_or_else(|| StoreError::BoardNotFound(id.clone()))?;
            board_patch.apply(&mut board, user_id, now);
            boards.push(board);
        }

        // Repeated ids compose: later patches apply on top of earlier ones.
        let mut blocks: Vec<Block> = Vec::with_capacity(patch.block_ids.len());
        for (id, block_patch) in patch.block_ids.iter().zip(&patch.block_patches) {
            if let Some(block) = blocks.iter_mut().find(|b| &b.id == id) {
                block_patch.apply(block, user_id, now);
                continue;
            }
            let mut block = self
                .blocks
                .get(id)
                .map(|b| b.value().clone())
                .ok_or_else(|| StoreError::BlockNotFound(id.clone()))?;
            block_patch.apply(&mut block, user_id, now);
            blocks.push(block);
        }

        for board in &boards {
            self.boards.insert(board.id.clone(), board.clone());
        }
        for block in &blocks {
            self.blocks.insert(block.id.clone(), block.clone());
        }

        Ok(BoardsAndBlocks::new(boards, blocks))
    }

    fn delete_boards_and_blocks(&self, del: &DeleteBoardsAndBlocks, user_id: &str) -> StoreResult<()> {
        del.validate().map_err(|e| StoreError::Invalid(e.to_string()))?;

        let _guard = self.batch_lock.write();

        if let Some(missing) = del.boards.iter().find(|id| !self.boards.contains_key(*id)) {
            return Err(StoreError::BoardNotFound(missing.clone()));
        }
        if let Some(missing) = del.blocks.iter().find(|id| !self.blocks.contains_key(*id)) {
            return Err(StoreError::BlockNotFound(missing.clone()));
        }

        for id in &del.blocks {
            self.blocks.remove(id);
        }
        for board_id in &del.boards {
            self.boards.remove(board_id);
            self.blocks.retain(|_, b| &b.board_id != board_id);
            self.members.retain(|(member_board, _), _| member_board != board_id);
        }

        tracing::debug!(
            user_id,
            boards = del.boards.len(),
            blocks = del.blocks.len(),
            "deleted boards and blocks"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corkboard_types::{BlockPatch, BoardPatch};

    fn seeded() -> (MemoryStore, BoardsAndBlocks) {
        let store = MemoryStore::new();
        let board = Board::new("t1", "Groceries");
        let card = Block::card(board.id.clone(), "Buy milk");
        let created = store
            .create_boards_and_blocks(&BoardsAndBlocks::new(vec![board], vec![card]), "u1")
            .unwrap();
        (store, created)
    }

    #[test]
    fn test_create_stamps_author() {
        let (store, created) = seeded();
        let card = store.get_block(&created.blocks[0].id).unwrap();
        assert_eq!(card.created_by, "u1");
        assert_eq!(card.modified_by, "u1");
        assert!(store.members(&created.boards[0].id).is_empty());
    }

    #[test]
    fn test_create_resolves_empty_ids() {
        let store = MemoryStore::new();
        let board = Board::new("t1", "A").with_id("");
        let created = store
            .create_boards_and_blocks(&BoardsAndBlocks::new(vec![board], vec![]), "u1")
            .unwrap();
        assert!(created.boards[0].id.starts_with('b'));
    }

    #[test]
    fn test_create_with_admin_adds_members() {
        let store = MemoryStore::new();
        let board = Board::new("t1", "A");
        let (bab, members) = store
            .create_boards_and_blocks_with_admin(&BoardsAndBlocks::new(vec![board], vec![]), "u1")
            .unwrap();
        assert_eq!(members, vec![BoardMember::admin(bab.boards[0].id.clone(), "u1")]);
        assert_eq!(store.members(&bab.boards[0].id), members);
    }

    #[test]
    fn test_create_is_atomic() {
        let (store, created) = seeded();
        let fresh = Board::new("t1", "Fresh");
        let dup = created.blocks[0].clone();
        let err = store
            .create_boards_and_blocks(&BoardsAndBlocks::new(vec![fresh.clone()], vec![dup]), "u1")
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert!(store.get_board(&fresh.id).is_err());
        assert_eq!(store.board_count(), 1);
    }

    #[test]
    fn test_create_rejects_unknown_board() {
        let store = MemoryStore::new();
        let orphan = Block::card("b_nowhere", "Lost");
        let err = store
            .create_boards_and_blocks(&BoardsAndBlocks::new(vec![], vec![orphan]), "u1")
            .unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));
    }

    #[test]
    fn test_patch_applies_all_or_nothing() {
        let (store, created) = seeded();
        let card_id = created.blocks[0].id.clone();
        let board_id = created.boards[0].id.clone();

        let bad = PatchBoardsAndBlocks::default()
            .patch_board(board_id.clone(), BoardPatch::default().with_title("Renamed"))
            .patch_block("missing", BlockPatch::default().with_title("x"));
        assert_eq!(
            store.patch_boards_and_blocks(&bad, "u2"),
            Err(StoreError::BlockNotFound("missing".into()))
        );
        assert_eq!(store.get_board(&board_id).unwrap().title, "Groceries");

        let good = PatchBoardsAndBlocks::default()
            .patch_block(card_id.clone(), BlockPatch::default().with_title("Buy oat milk"));
        let patched = store.patch_boards_and_blocks(&good, "u2").unwrap();
        assert_eq!(patched.blocks[0].title, "Buy oat milk");
        assert_eq!(store.get_block(&card_id).unwrap().modified_by, "u2");
    }

    #[test]
    fn test_patch_repeated_block_composes() {
        let (store, created) = seeded();
        let card_id = created.blocks[0].id.clone();

        let patch = PatchBoardsAndBlocks::default()
            .patch_block(card_id.clone(), BlockPatch::default().with_title("Buy oat milk"))
            .patch_block(card_id.clone(), BlockPatch::default().with_property("Status", "Done"));
        let patched = store.patch_boards_and_blocks(&patch, "u2").unwrap();

        assert_eq!(patched.blocks.len(), 1);
        let card = store.get_block(&card_id).unwrap();
        assert_eq!(card.title, "Buy oat milk");
        assert_eq!(card.properties["Status"], "Done");
    }

    #[test]
    fn test_delete_board_cascades() {
        let (store, created) = seeded();
        let board_id = created.boards[0].id.clone();
        store
            .delete_boards_and_blocks(&DeleteBoardsAndBlocks::new(vec![board_id.clone()], vec![]), "u1")
            .unwrap();
        assert_eq!(store.board_count(), 0);
        assert_eq!(store.block_count(), 0);
    }

    #[test]
    fn test_delete_missing_block_changes_nothing() {
        let (store, created) = seeded();
        let del = DeleteBoardsAndBlocks::new(
            vec![created.boards[0].id.clone()],
            vec!["missing".into()],
        );
        assert_eq!(
            store.delete_boards_and_blocks(&del, "u1"),
            Err(StoreError::BlockNotFound("missing".into()))
        );
        assert_eq!(store.board_count(), 1);
        assert_eq!(store.block_count(), 1);
    }

    #[test]
    fn test_children() {
        let (store, created) = seeded();
        let card = &created.blocks[0];
        let comment = Block::comment(card, "hi");
        store
            .create_boards_and_blocks(&BoardsAndBlocks::new(vec![], vec![comment.clone()]), "u1")
            .unwrap();
        let children = store.children(&card.id);
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].id, comment.id);
    }
}
