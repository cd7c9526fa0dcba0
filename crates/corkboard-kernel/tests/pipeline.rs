//! End-to-end tests through a fully wired [`Kernel`].
//!
//! Mutations go through the coordinator, the dispatcher is drained, and the
//! results are read back from the flow bus, metrics, webhook channel and the
//! rendered deliveries.

use corkboard_kernel::{BoardFlow, CorkboardConfig, Kernel, KernelChannels, MetricsSnapshot};
use corkboard_types::{
    Block, BlockPatch, Board, BoardsAndBlocks, DeleteBoardsAndBlocks, PatchBoardsAndBlocks,
};

// ============================================================================
// Shared test setup
// ============================================================================

const ROOT: &str = "https://boards.example";

fn kernel() -> (Kernel, KernelChannels) {
    Kernel::current(CorkboardConfig::default().with_server_root(ROOT))
}

/// Create one board in team `t1` holding a single card, authored by `u1`.
async fn seed(kernel: &Kernel) -> (Board, Block) {
    let board = Board::new("t1", "Groceries");
    let card = Block::card(board.id.clone(), "Buy milk");
    let created = kernel
        .coordinator()
        .create_boards_and_blocks(&BoardsAndBlocks::new(vec![board], vec![card]), "u1", true)
        .unwrap();
    kernel.drain().await;
    (created.boards[0].clone(), created.blocks[0].clone())
}

fn retitle(card: &Block, title: &str) -> PatchBoardsAndBlocks {
    PatchBoardsAndBlocks::default().patch_block(card.id.clone(), BlockPatch::default().with_title(title))
}

fn card_url(board: &Board, card: &Block) -> String {
    format!("{}/{}/{}/{}", ROOT, board.team_id, board.id, card.id)
}

// ============================================================================
// Live updates and counters
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn test_flow_bus_sees_every_change() {
    let (kernel, _channels) = kernel();
    let mut all = kernel.flows().subscribe(">");
    let mut blocks = kernel.flows().subscribe("block.*");

    let (board, card) = seed(&kernel).await;
    kernel.coordinator().patch_boards_and_blocks(&retitle(&card, "Buy oat milk"), "u2").unwrap();
    kernel.drain().await;

    let subjects: Vec<String> = all.drain().into_iter().map(|m| m.subject).collect();
    assert_eq!(
        subjects,
        ["board.changed", "block.changed", "member.changed", "block.changed"]
    );

    let block_events = blocks.drain();
    assert_eq!(block_events.len(), 2);
    match &block_events[1].payload {
        BoardFlow::BlockChanged { team_id, block } => {
            assert_eq!(team_id, "t1");
            assert_eq!(block.title, "Buy oat milk");
            assert_eq!(block.board_id, board.id);
        }
        other => panic!("unexpected event: {:?}", other),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_metrics_and_webhooks() {
    let (kernel, mut channels) = kernel();
    let (_, card) = seed(&kernel).await;

    kernel.coordinator().patch_boards_and_blocks(&retitle(&card, "Buy oat milk"), "u2").unwrap();
    kernel
        .coordinator()
        .delete_boards_and_blocks(&DeleteBoardsAndBlocks::new(vec![], vec![card.id.clone()]), "u2")
        .unwrap();
    kernel.drain().await;

    assert_eq!(
        kernel.metrics().snapshot(),
        MetricsSnapshot {
            blocks_inserted: 1,
            blocks_patched: 1,
            blocks_deleted: 1,
        }
    );

    // Created and patched blocks hit the webhook; deletions do not.
    let first = channels.webhooks.try_recv().unwrap();
    let second = channels.webhooks.try_recv().unwrap();
    assert!(channels.webhooks.try_recv().is_err());
    assert_eq!(first.block_id, card.id);
    let body: serde_json::Value = serde_json::from_str(&second.body).unwrap();
    assert_eq!(body["title"], "Buy oat milk");
    assert_eq!(body["modified_by"], "u2");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_delete_board_cascades_in_store() {
    let (kernel, _channels) = kernel();
    let (board, _) = seed(&kernel).await;

    kernel
        .coordinator()
        .delete_boards_and_blocks(&DeleteBoardsAndBlocks::new(vec![board.id.clone()], vec![]), "u1")
        .unwrap();
    kernel.drain().await;

    assert!(kernel.store().children(&board.id).is_empty());
    assert_eq!(kernel.store().block_count(), 0);
    assert_eq!(kernel.store().board_count(), 0);
    assert!(kernel.store().members(&board.id).is_empty());
}

// ============================================================================
// Card notifications
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn test_card_subscriber_gets_merged_modification() {
    let (kernel, mut channels) = kernel();
    let (board, card) = seed(&kernel).await;
    kernel.notifier().subscribe(card.id.clone(), "watcher");

    let coordinator = kernel.coordinator();
    coordinator.patch_boards_and_blocks(&retitle(&card, "Buy oat milk"), "u2").unwrap();
    kernel.drain().await;
    coordinator.patch_boards_and_blocks(&retitle(&card, "Buy soy milk"), "u3").unwrap();
    kernel.drain().await;

    // Both changes collapse into one pending hint.
    assert_eq!(kernel.notifier().hints().len(), 1);
    assert_eq!(kernel.notifier().flush_due(i64::MAX), 1);
    assert!(kernel.notifier().hints().is_empty());

    let delivery = channels.deliveries.try_recv().unwrap();
    assert_eq!(delivery.card_id, card.id);
    assert_eq!(delivery.board_id, board.id);
    assert_eq!(delivery.recipients, ["watcher"]);
    assert_eq!(delivery.attachments.len(), 1);

    let attachment = &delivery.attachments[0];
    assert_eq!(
        attachment.pretext,
        format!(
            "###### @u2, @u3 has modified the card [Buy soy milk]({}) on the board [Groceries]({}/t1/{})\n",
            card_url(&board, &card),
            ROOT,
            board.id
        )
    );
    assert_eq!(attachment.fields.len(), 1);
    assert_eq!(attachment.fields[0].title, "Title");
    assert_eq!(attachment.fields[0].value, "Buy soy milk  ~~`Buy milk`~~");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_card_subscriber_gets_deletion() {
    let (kernel, mut channels) = kernel();
    let (board, card) = seed(&kernel).await;
    kernel.notifier().subscribe(card.id.clone(), "watcher");

    kernel
        .coordinator()
        .delete_boards_and_blocks(&DeleteBoardsAndBlocks::new(vec![], vec![card.id.clone()]), "u2")
        .unwrap();
    kernel.drain().await;
    assert_eq!(kernel.notifier().flush_due(i64::MAX), 1);

    let delivery = channels.deliveries.try_recv().unwrap();
    assert_eq!(
        delivery.attachments[0].pretext,
        format!("@u2 has deleted the card [Buy milk]({})\n", card_url(&board, &card))
    );
    assert!(delivery.attachments[0].fields.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_author_is_not_notified_of_own_change() {
    let (kernel, mut channels) = kernel();
    let (_, card) = seed(&kernel).await;
    kernel.notifier().subscribe(card.id.clone(), "u2");

    kernel.coordinator().patch_boards_and_blocks(&retitle(&card, "Buy oat milk"), "u2").unwrap();
    kernel.drain().await;

    assert_eq!(kernel.notifier().flush_due(i64::MAX), 0);
    assert!(channels.deliveries.try_recv().is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unsubscribed_card_schedules_nothing() {
    let (kernel, _channels) = kernel();
    let (_, card) = seed(&kernel).await;

    kernel.coordinator().patch_boards_and_blocks(&retitle(&card, "Buy oat milk"), "u2").unwrap();
    kernel.drain().await;

    assert!(kernel.notifier().hints().is_empty());
    assert_eq!(kernel.notifier().next_notify_at(), None);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_board_subscription_uses_board_frequency() {
    let config = CorkboardConfig {
        notify_freq_card_ms: 1_000,
        notify_freq_board_ms: 60_000,
        ..CorkboardConfig::default().with_server_root(ROOT)
    };
    let (kernel, mut channels) = Kernel::current(config);
    let (board, card) = seed(&kernel).await;
    kernel.notifier().subscribe(board.id.clone(), "board-watcher");

    kernel.coordinator().patch_boards_and_blocks(&retitle(&card, "Buy oat milk"), "u2").unwrap();
    kernel.drain().await;

    let hint = kernel.notifier().hints().pop().unwrap();
    assert_eq!(hint.notify_at - hint.create_at, 60_000);
    assert_eq!(hint.block_id, card.id);
    assert_eq!(hint.workspace_id, "t1");
    assert_eq!(hint.modified_by_id, "u2");

    // Not yet due.
    assert_eq!(kernel.notifier().flush_due(hint.create_at), 0);
    assert_eq!(kernel.notifier().flush_due(hint.notify_at), 1);
    assert_eq!(channels.deliveries.try_recv().unwrap().recipients, ["board-watcher"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_flush_loop_delivers_due_hints() {
    let config = CorkboardConfig {
        notify_freq_card_ms: 0,
        ..CorkboardConfig::default().with_server_root(ROOT)
    };
    let (kernel, mut channels) = Kernel::current(config);
    let (_, card) = seed(&kernel).await;
    kernel.notifier().subscribe(card.id.clone(), "watcher");

    kernel.coordinator().patch_boards_and_blocks(&retitle(&card, "Buy oat milk"), "u2").unwrap();
    kernel.drain().await;

    let flusher = kernel
        .notifier()
        .spawn_flush_loop(std::time::Duration::from_millis(10));
    let delivery = tokio::time::timeout(std::time::Duration::from_secs(5), channels.deliveries.recv())
        .await
        .unwrap()
        .unwrap();
    flusher.abort();
    assert_eq!(delivery.card_id, card.id);
}
