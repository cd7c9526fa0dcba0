//! FlowBus pub/sub for live board updates.
//!
//! The FlowBus is the broadcast sink: every board, block and member change the
//! coordinator fans out is published here as a [`BoardFlow`], and live clients
//! subscribe with NATS-style subject patterns.
//!
//! # Pattern Matching
//!
//! Patterns use dot-separated tokens with wildcards:
//! - `*` matches exactly one token: `block.*` matches `block.changed` and `block.deleted`
//!   but not `board.changed`; `*.deleted` matches both deletions
//! - `>` matches one or more tokens (only at end): `>` alone matches every event
//! - Exact match: `member.changed` only matches `member.changed`
//!
//! The subjects published are `board.changed`, `block.changed`, `member.changed`,
//! `board.deleted` and `block.deleted`.
//!
//! # Example
//!
//! ```ignore
//! let bus = shared_board_flow_bus(1024);
//!
//! // Subscribe to everything that happens to blocks
//! let mut sub = bus.subscribe("block.*");
//!
//! bus.broadcast_block_change("t1", &card);
//!
//! while let Some(msg) = sub.recv().await {
//!     println!("{} for team {}", msg.subject, msg.payload.team_id());
//! }
//! ```

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use corkboard_types::{Block, Board, BoardMember};

// ============================================================================
// Pattern Matching
// ============================================================================

/// Check if a subject matches a pattern.
///
/// Patterns use NATS-style wildcards:
/// - `*` matches exactly one token
/// - `>` matches one or more tokens (only at end)
///
/// # Examples
///
/// ```ignore
/// assert!(matches_pattern("block.*", "block.changed"));
/// assert!(matches_pattern("*.deleted", "board.deleted"));
/// assert!(matches_pattern(">", "member.changed"));
/// assert!(!matches_pattern("block.*", "board.changed"));
/// ```
pub fn matches_pattern(pattern: &str, subject: &str) -> bool {
    let pattern_tokens: Vec<&str> = pattern.split('.').collect();
    let subject_tokens: Vec<&str> = subject.split('.').collect();

    let mut pi = 0;
    let mut si = 0;

    while pi < pattern_tokens.len() && si < subject_tokens.len() {
        match pattern_tokens[pi] {
            ">" => {
                // `>` must be last and swallows the rest
                return pi == pattern_tokens.len() - 1;
            }
            "*" => {
                pi += 1;
                si += 1;
            }
            token => {
                if token != subject_tokens[si] {
                    return false;
                }
                pi += 1;
                si += 1;
            }
        }
    }

    pi == pattern_tokens.len() && si == subject_tokens.len()
}

// ============================================================================
// Flow Message Types
// ============================================================================

/// Trait for payloads that know their subject.
pub trait HasSubject {
    /// Get the subject string for this payload.
    fn subject(&self) -> &str;
}

/// A message published to the flow bus.
#[derive(Clone, Debug)]
pub struct FlowMessage<T> {
    /// The subject (derived from payload).
    pub subject: String,
    /// The payload data.
    pub payload: T,
    /// When this message was created.
    pub timestamp: Instant,
}

impl<T: HasSubject> FlowMessage<T> {
    /// Create a new flow message.
    pub fn new(payload: T) -> Self {
        Self {
            subject: payload.subject().to_string(),
            payload,
            timestamp: Instant::now(),
        }
    }
}

// ============================================================================
// Board Flow Events
// ============================================================================

/// Live-update events for boards, blocks and members.
///
/// Every event carries the team it is routed to.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum BoardFlow {
    /// A board was created or changed.
    BoardChanged { team_id: String, board: Board },

    /// A block was created or changed.
    BlockChanged { team_id: String, block: Block },

    /// A user's membership of a board was created or changed.
    MemberChanged {
        team_id: String,
        board_id: String,
        member: BoardMember,
    },

    /// A board was deleted.
    BoardDeleted { team_id: String, board_id: String },

    /// A block was deleted.
    BlockDeleted {
        team_id: String,
        block_id: String,
        board_id: String,
    },
}

impl BoardFlow {
    /// Get the subject string for this event.
    pub fn subject(&self) -> &'static str {
        match self {
            Self::BoardChanged { .. } => "board.changed",
            Self::BlockChanged { .. } => "block.changed",
            Self::MemberChanged { .. } => "member.changed",
            Self::BoardDeleted { .. } => "board.deleted",
            Self::BlockDeleted { .. } => "block.deleted",
        }
    }

    /// Get the team this event is routed to.
    pub fn team_id(&self) -> &str {
        match self {
            Self::BoardChanged { team_id, .. }
            | Self::BlockChanged { team_id, .. }
            | Self::MemberChanged { team_id, .. }
            | Self::BoardDeleted { team_id, .. }
            | Self::BlockDeleted { team_id, .. } => team_id,
        }
    }

    /// Get the board this event concerns.
    pub fn board_id(&self) -> &str {
        match self {
            Self::BoardChanged { board, .. } => &board.id,
            Self::BlockChanged { block, .. } => &block.board_id,
            Self::MemberChanged { board_id, .. }
            | Self::BoardDeleted { board_id, .. }
            | Self::BlockDeleted { board_id, .. } => board_id,
        }
    }

    /// Get the block ID for block events.
    pub fn block_id(&self) -> Option<&str> {
        match self {
            Self::BlockChanged { block, .. } => Some(&block.id),
            Self::BlockDeleted { block_id, .. } => Some(block_id),
            _ => None,
        }
    }
}

impl HasSubject for BoardFlow {
    fn subject(&self) -> &str {
        BoardFlow::subject(self)
    }
}

// ============================================================================
// Broadcast Sink
// ============================================================================

/// Live-update transport the coordinator fans changes out to.
///
/// Fire-and-forget: implementations must not block on slow consumers.
pub trait BroadcastSink: Send + Sync {
    fn broadcast_board_change(&self, team_id: &str, board: &Board);
    fn broadcast_block_change(&self, team_id: &str, block: &Block);
    fn broadcast_member_change(&self, team_id: &str, board_id: &str, member: &BoardMember);
    fn broadcast_board_delete(&self, team_id: &str, board_id: &str);
    fn broadcast_block_delete(&self, team_id: &str, block_id: &str, board_id: &str);
}

// ============================================================================
// FlowBus
// ============================================================================

/// Type-parameterized pub/sub bus for a specific flow domain.
///
/// Uses a broadcast channel internally for multi-subscriber delivery.
/// Subscribers receive only messages matching their pattern.
#[derive(Debug)]
pub struct FlowBus<T: Clone + Send + 'static> {
    tx: broadcast::Sender<FlowMessage<T>>,
    capacity: usize,
}

impl<T: Clone + Send + 'static> FlowBus<T> {
    /// Create a new flow bus with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Get the channel capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl<T: Clone + Send + HasSubject + 'static> FlowBus<T> {
    /// Publish a payload to the bus.
    ///
    /// Returns the number of subscribers that received the message.
    pub fn publish(&self, payload: T) -> usize {
        self.tx.send(FlowMessage::new(payload)).unwrap_or(0)
    }

    /// Subscribe to messages matching a pattern.
    pub fn subscribe(&self, pattern: &str) -> Subscription<T> {
        Subscription {
            pattern: pattern.to_string(),
            rx: self.tx.subscribe(),
        }
    }
}

impl<T: Clone + Send + 'static> Clone for FlowBus<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            capacity: self.capacity,
        }
    }
}

impl BroadcastSink for FlowBus<BoardFlow> {
    fn broadcast_board_change(&self, team_id: &str, board: &Board) {
        self.publish(BoardFlow::BoardChanged {
            team_id: team_id.to_string(),
            board: board.clone(),
        });
    }

    fn broadcast_block_change(&self, team_id: &str, block: &Block) {
        self.publish(BoardFlow::BlockChanged {
            team_id: team_id.to_string(),
            block: block.clone(),
        });
    }

    fn broadcast_member_change(&self, team_id: &str, board_id: &str, member: &BoardMember) {
        self.publish(BoardFlow::MemberChanged {
            team_id: team_id.to_string(),
            board_id: board_id.to_string(),
            member: member.clone(),
        });
    }

    fn broadcast_board_delete(&self, team_id: &str, board_id: &str) {
        self.publish(BoardFlow::BoardDeleted {
            team_id: team_id.to_string(),
            board_id: board_id.to_string(),
        });
    }

    fn broadcast_block_delete(&self, team_id: &str, block_id: &str, board_id: &str) {
        self.publish(BoardFlow::BlockDeleted {
            team_id: team_id.to_string(),
            block_id: block_id.to_string(),
            board_id: board_id.to_string(),
        });
    }
}

// ============================================================================
// Subscription
// ============================================================================

/// A subscription to a FlowBus with pattern filtering.
///
/// Only messages whose subject matches the subscription pattern are delivered.
pub struct Subscription<T: Clone> {
    pattern: String,
    rx: broadcast::Receiver<FlowMessage<T>>,
}

impl<T: Clone> Subscription<T> {
    /// Get the subscription pattern.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Receive the next matching message, waiting if necessary.
    ///
    /// Returns None if the channel is closed.
    pub async fn recv(&mut self) -> Option<FlowMessage<T>> {
        loop {
            match self.rx.recv().await {
                Ok(msg) => {
                    if matches_pattern(&self.pattern, &msg.subject) {
                        return Some(msg);
                    }
                }
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(
                        pattern = %self.pattern,
                        lagged = n,
                        "Flow subscription lagged behind"
                    );
                }
            }
        }
    }

    /// Try to receive the next matching message without blocking.
    ///
    /// Returns None if no matching message is available.
    pub fn try_recv(&mut self) -> Option<FlowMessage<T>> {
        loop {
            match self.rx.try_recv() {
                Ok(msg) => {
                    if matches_pattern(&self.pattern, &msg.subject) {
                        return Some(msg);
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Closed) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    tracing::warn!(
                        pattern = %self.pattern,
                        lagged = n,
                        "Flow subscription lagged behind"
                    );
                }
            }
        }
    }

    /// Drain every matching message currently queued.
    pub fn drain(&mut self) -> Vec<FlowMessage<T>> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

impl<T: Clone> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("pattern", &self.pattern)
            .finish_non_exhaustive()
    }
}

/// Shared board flow bus.
pub type SharedBoardFlowBus = Arc<FlowBus<BoardFlow>>;

/// Create a shared board flow bus.
pub fn shared_board_flow_bus(capacity: usize) -> SharedBoardFlowBus {
    Arc::new(FlowBus::new(capacity))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_matching_exact() {
        assert!(matches_pattern("block.changed", "block.changed"));
        assert!(!matches_pattern("block.changed", "block.deleted"));
        assert!(!matches_pattern("block.changed", "block.changed.extra"));
    }

    #[test]
    fn test_pattern_matching_single_wildcard() {
        assert!(matches_pattern("block.*", "block.changed"));
        assert!(matches_pattern("block.*", "block.deleted"));
        assert!(!matches_pattern("block.*", "block.content.changed"));
        assert!(!matches_pattern("block.*", "board.changed"));
    }

    #[test]
    fn test_pattern_matching_multi_wildcard() {
        assert!(matches_pattern("board.>", "board.changed"));
        assert!(matches_pattern("board.>", "board.a.b.c"));
        assert!(!matches_pattern("board.>", "board"));
        assert!(!matches_pattern("board.>", "block.changed"));
    }

    #[test]
    fn test_pattern_matching_mixed() {
        assert!(matches_pattern("*.deleted", "block.deleted"));
        assert!(matches_pattern("*.deleted", "board.deleted"));
        assert!(!matches_pattern("*.deleted", "member.changed"));
    }

    #[test]
    fn test_board_flow_subjects() {
        let board = Board::new("t1", "A");
        let card = Block::card(board.id.clone(), "c");
        let member = BoardMember::admin(board.id.clone(), "u1");

        let flows = [
            BoardFlow::BoardChanged { team_id: "t1".into(), board: board.clone() },
            BoardFlow::BlockChanged { team_id: "t1".into(), block: card.clone() },
            BoardFlow::MemberChanged {
                team_id: "t1".into(),
                board_id: board.id.clone(),
                member,
            },
            BoardFlow::BoardDeleted { team_id: "t1".into(), board_id: board.id.clone() },
            BoardFlow::BlockDeleted {
                team_id: "t1".into(),
                block_id: card.id.clone(),
                board_id: board.id.clone(),
            },
        ];
        let subjects: Vec<&str> = flows.iter().map(|f| f.subject()).collect();
        assert_eq!(
            subjects,
            ["board.changed", "block.changed", "member.changed", "board.deleted", "block.deleted"]
        );
        for flow in &flows {
            assert_eq!(flow.team_id(), "t1");
            assert_eq!(flow.board_id(), board.id);
        }
        assert_eq!(flows[1].block_id(), Some(card.id.as_str()));
        assert_eq!(flows[0].block_id(), None);
    }

    #[test]
    fn test_wildcards_over_published_subjects() {
        let subjects =
            ["board.changed", "block.changed", "member.changed", "board.deleted", "block.deleted"];
        let matching = |pattern: &str| {
            subjects
                .iter()
                .copied()
                .filter(|s| matches_pattern(pattern, s))
                .collect::<Vec<&'static str>>()
        };
        assert_eq!(matching(">"), subjects);
        assert_eq!(matching("block.*"), ["block.changed", "block.deleted"]);
        assert_eq!(matching("*.deleted"), ["board.deleted", "block.deleted"]);
        assert_eq!(matching("member.changed"), ["member.changed"]);
    }

    #[tokio::test]
    async fn test_flow_bus_publish_subscribe() {
        let bus = shared_board_flow_bus(16);
        let mut sub = bus.subscribe("board.*");

        let board = Board::new("t1", "A");
        let bus_clone = bus.clone();
        let board_clone = board.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            bus_clone.broadcast_board_change("t1", &board_clone);
        });

        let msg = tokio::time::timeout(std::time::Duration::from_millis(100), sub.recv())
            .await
            .expect("timeout")
            .expect("no message");

        assert_eq!(msg.subject, "board.changed");
        assert_eq!(msg.payload, BoardFlow::BoardChanged { team_id: "t1".into(), board });
    }

    #[test]
    fn test_subscription_pattern_filtering() {
        let bus: FlowBus<BoardFlow> = FlowBus::new(16);
        let mut deletes = bus.subscribe("*.deleted");
        let mut members = bus.subscribe("member.changed");

        bus.broadcast_board_change("t1", &Board::new("t1", "A"));
        bus.broadcast_block_delete("t1", "a1", "b1");
        bus.broadcast_board_delete("t1", "b1");

        let subjects: Vec<String> = deletes.drain().into_iter().map(|m| m.subject).collect();
        assert_eq!(subjects, ["block.deleted", "board.deleted"]);
        assert!(members.try_recv().is_none());
    }

    #[test]
    fn test_shared_board_flow_bus() {
        let bus = shared_board_flow_bus(1024);
        assert_eq!(bus.capacity(), 1024);
        assert_eq!(bus.subscriber_count(), 0);

        let _sub = bus.subscribe("block.*");
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus: FlowBus<BoardFlow> = FlowBus::new(4);
        assert_eq!(
            bus.publish(BoardFlow::BoardDeleted { team_id: "t1".into(), board_id: "b1".into() }),
            0
        );
    }
}
