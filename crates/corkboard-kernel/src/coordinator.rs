//! Mutation coordinator for boards and blocks.
//!
//! Each operation has the same shape:
//!
//! 1. validate the batch and fetch any prior state it needs (sync)
//! 2. apply the mutation through the [`Store`] (sync, atomic)
//! 3. submit one fan-out job to the [`FanoutDispatcher`] and return
//!
//! Steps 1 and 2 can fail; either failure aborts with nothing mutated and no
//! job submitted. Once step 2 succeeds the call succeeds. The fan-out job
//! calls the sinks serially in a fixed order and only ever logs problems.
//!
//! | Operation | Fan-out order                          |
//! |-----------|----------------------------------------|
//! | create    | boards, then blocks, then members      |
//! | patch     | blocks, then boards                    |
//! | delete    | blocks, then boards                    |

use std::collections::HashMap;
use std::sync::Arc;

use corkboard_types::{
    BatchError, Block, BoardMember, BoardsAndBlocks, DeleteBoardsAndBlocks, PatchBoardsAndBlocks,
};

use crate::dispatch::FanoutDispatcher;
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::flows::BroadcastSink;
use crate::metrics::Metrics;
use crate::store::Store;
use crate::subscriptions::{BlockChangeNotifier, NotifyAction};
use crate::webhook::Webhook;

/// Everything a mutation fans out to.
#[derive(Clone)]
pub struct Sinks {
    pub broadcast: Arc<dyn BroadcastSink>,
    pub metrics: Arc<dyn Metrics>,
    pub webhook: Arc<dyn Webhook>,
    pub notifier: Arc<dyn BlockChangeNotifier>,
}

/// Applies board/block mutations and fans out their side effects.
pub struct MutationCoordinator {
    store: Arc<dyn Store>,
    sinks: Sinks,
    dispatcher: FanoutDispatcher,
}

impl MutationCoordinator {
    pub fn new(store: Arc<dyn Store>, sinks: Sinks, dispatcher: FanoutDispatcher) -> Self {
        Self {
            store,
            sinks,
            dispatcher,
        }
    }

    /// The dispatcher fan-out jobs run on.
    pub fn dispatcher(&self) -> &FanoutDispatcher {
        &self.dispatcher
    }

    /// Create boards and blocks, optionally adding the user as admin of every
    /// new board.
    ///
    /// Every board in the batch must belong to the same team.
    #[tracing::instrument(
        skip(self, batch),
        fields(boards = batch.boards.len(), blocks = batch.blocks.len())
    )]
    pub fn create_boards_and_blocks(
        &self,
        batch: &BoardsAndBlocks,
        user_id: &str,
        add_member: bool,
    ) -> CoordinatorResult<BoardsAndBlocks> {
        let team_id = batch.team_id()?.to_string();

        let (created, members) = if add_member {
            self.store
                .create_boards_and_blocks_with_admin(batch, user_id)
                .map_err(CoordinatorError::Mutation)?
        } else {
            let created = self
                .store
                .create_boards_and_blocks(batch, user_id)
                .map_err(CoordinatorError::Mutation)?;
            (created, Vec::new())
        };

        let sinks = self.sinks.clone();
        let result = created.clone();
        let user_id = user_id.to_string();
        self.dispatcher.submit("create_boards_and_blocks", move || {
            fanout_created(&sinks, &team_id, &result, &members, &user_id);
        });

        Ok(created)
    }

    /// Patch boards and blocks.
    ///
    /// Every referenced block is fetched before anything is patched; a missing
    /// block aborts with [`CoordinatorError::NotFound`].
    #[tracing::instrument(
        skip(self, patch),
        fields(boards = patch.board_ids.len(), blocks = patch.block_ids.len())
    )]
    pub fn patch_boards_and_blocks(
        &self,
        patch: &PatchBoardsAndBlocks,
        user_id: &str,
    ) -> CoordinatorResult<BoardsAndBlocks> {
        patch.validate()?;

        let mut old_blocks: HashMap<String, Block> = HashMap::with_capacity(patch.block_ids.len());
        for id in &patch.block_ids {
            if old_blocks.contains_key(id) {
                continue;
            }
            let block = self.store.get_block(id).map_err(CoordinatorError::NotFound)?;
            old_blocks.insert(id.clone(), block);
        }

        // Without patched boards, blocks are routed to the team of the first
        // block's board.
        let fallback_team = match (patch.board_ids.is_empty(), patch.block_ids.first()) {
            (true, Some(first)) => {
                let board_id = old_blocks
                    .get(first)
                    .map(|b| b.board_id.clone())
                    .unwrap_or_default();
                Some(
                    self.store
                        .get_board(&board_id)
                        .map_err(CoordinatorError::NotFound)?
                        .team_id,
                )
            }
            _ => None,
        };

        let patched = self
            .store
            .patch_boards_and_blocks(patch, user_id)
            .map_err(CoordinatorError::Mutation)?;

        let team_id = patched
            .boards
            .first()
            .map(|b| b.team_id.clone())
            .or(fallback_team)
            .unwrap_or_default();
        let sinks = self.sinks.clone();
        let result = patched.clone();
        let user_id = user_id.to_string();
        self.dispatcher.submit("patch_boards_and_blocks", move || {
            fanout_patched(&sinks, &team_id, &result, &old_blocks, &user_id);
        });

        Ok(patched)
    }

    /// Delete boards and blocks.
    ///
    /// The team and every block snapshot are resolved before anything is
    /// deleted; any miss aborts with [`CoordinatorError::NotFound`].
    #[tracing::instrument(
        skip(self, del),
        fields(boards = del.boards.len(), blocks = del.blocks.len())
    )]
    pub fn delete_boards_and_blocks(
        &self,
        del: &DeleteBoardsAndBlocks,
        user_id: &str,
    ) -> CoordinatorResult<()> {
        del.validate()?;

        let first_board = del
            .boards
            .first()
            .map(|id| self.store.get_board(id))
            .transpose()
            .map_err(CoordinatorError::NotFound)?;

        let blocks = del
            .blocks
            .iter()
            .map(|id| self.store.get_block(id))
            .collect::<Result<Vec<_>, _>>()
            .map_err(CoordinatorError::NotFound)?;

        let team_id = match first_board {
            Some(board) => board.team_id,
            None => {
                let first = blocks.first().ok_or(BatchError::Empty)?;
                self.store
                    .get_board(&first.board_id)
                    .map_err(CoordinatorError::NotFound)?
                    .team_id
            }
        };

        self.store
            .delete_boards_and_blocks(del, user_id)
            .map_err(CoordinatorError::Mutation)?;

        let sinks = self.sinks.clone();
        let board_ids = del.boards.clone();
        let user_id = user_id.to_string();
        self.dispatcher.submit("delete_boards_and_blocks", move || {
            fanout_deleted(&sinks, &team_id, &blocks, &board_ids, &user_id);
        });

        Ok(())
    }
}

impl std::fmt::Debug for MutationCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationCoordinator")
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

fn fanout_created(
    sinks: &Sinks,
    team_id: &str,
    created: &BoardsAndBlocks,
    members: &[BoardMember],
    user_id: &str,
) {
    for board in &created.boards {
        sinks.broadcast.broadcast_board_change(team_id, board);
    }

    for block in &created.blocks {
        sinks.broadcast.broadcast_block_change(team_id, block);
        sinks.metrics.increment_blocks_inserted(1);
        sinks.webhook.notify_update(block);
        sinks
            .notifier
            .notify_block_changed(NotifyAction::Add, Some(block), None, user_id);
    }

    for member in members {
        sinks
            .broadcast
            .broadcast_member_change(team_id, &member.board_id, member);
    }
}

fn fanout_patched(
    sinks: &Sinks,
    team_id: &str,
    patched: &BoardsAndBlocks,
    old_blocks: &HashMap<String, Block>,
    user_id: &str,
) {
    for block in &patched.blocks {
        let Some(old) = old_blocks.get(&block.id) else {
            tracing::error!(
                block_id = %block.id,
                "cannot notify for patched block: no pre-patch snapshot"
            );
            continue;
        };

        sinks.metrics.increment_blocks_patched(1);
        sinks.broadcast.broadcast_block_change(team_id, block);
        sinks.webhook.notify_update(block);
        sinks
            .notifier
            .notify_block_changed(NotifyAction::Update, Some(block), Some(old), user_id);
    }

    for board in &patched.boards {
        sinks.broadcast.broadcast_board_change(&board.team_id, board);
    }
}

fn fanout_deleted(
    sinks: &Sinks,
    team_id: &str,
    blocks: &[Block],
    board_ids: &[String],
    user_id: &str,
) {
    for block in blocks {
        sinks
            .broadcast
            .broadcast_block_delete(team_id, &block.id, &block.board_id);
        sinks.metrics.increment_blocks_deleted(1);
        sinks
            .notifier
            .notify_block_changed(NotifyAction::Removed, None, Some(block), user_id);
    }

    for board_id in board_ids {
        sinks.broadcast.broadcast_board_delete(team_id, board_id);
    }
}
