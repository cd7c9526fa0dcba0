//! Card subscriptions and debounced change notifications.
//!
//! Users subscribe to a card or to a whole board. When a card (or a comment
//! or content block hanging off it) changes, the [`SubscriptionNotifier`]
//! folds the change into that card's pending record and upserts a
//! [`NotificationHint`] whose `notify_at` is pushed out by the notify
//! frequency. A burst of edits therefore collapses into one notification.
//!
//! [`SubscriptionNotifier::flush_due`] turns every elapsed hint into a card
//! [`Diff`], renders it to attachments and hands them to an
//! [`AttachmentDelivery`].
//!
//! # Pending state
//!
//! Per card the notifier keeps the first-seen old state and the latest new
//! state, of the card itself and of each child block. Intermediate states in
//! between are dropped: a title edited twice shows as one change from the
//! original to the final title.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tokio::sync::mpsc;

use corkboard_notify::{Attachment, Diff, MarkdownOpts, diffs_to_attachments};
use corkboard_types::{Block, BlockType, Board, NotificationHint, now_millis};

use crate::config::{DEFAULT_NOTIFY_FREQ_BOARD_MS, DEFAULT_NOTIFY_FREQ_CARD_MS};
use crate::store::Store;

/// What happened to a block.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum NotifyAction {
    /// The block was created; there is no old state.
    Add,
    /// The block changed from old to new.
    Update,
    /// The block was deleted; old is its final state.
    Removed,
}

/// Receives every block change the coordinator fans out.
pub trait BlockChangeNotifier: Send + Sync {
    fn notify_block_changed(
        &self,
        action: NotifyAction,
        new: Option<&Block>,
        old: Option<&Block>,
        user_id: &str,
    );
}

/// Rendered attachments for one card, addressed to its subscribers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Delivery {
    pub card_id: String,
    pub board_id: String,
    pub recipients: Vec<String>,
    pub attachments: Vec<Attachment>,
}

/// Chat-side transport for rendered attachments.
pub trait AttachmentDelivery: Send + Sync {
    fn deliver(&self, delivery: Delivery);
}

/// [`AttachmentDelivery`] that queues deliveries on an mpsc channel.
#[derive(Clone, Debug)]
pub struct ChannelDelivery {
    tx: mpsc::UnboundedSender<Delivery>,
}

impl ChannelDelivery {
    /// Create a delivery sink and the receiver that drains it.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Delivery>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl AttachmentDelivery for ChannelDelivery {
    fn deliver(&self, delivery: Delivery) {
        if self.tx.send(delivery).is_err() {
            tracing::debug!("delivery receiver closed, dropping attachments");
        }
    }
}

#[derive(Clone, Debug)]
struct PendingChild {
    id: String,
    old: Option<Block>,
    new: Option<Block>,
}

#[derive(Clone, Debug)]
struct PendingCard {
    hint: NotificationHint,
    board: Board,
    /// Latest known state of the card.
    snapshot: Block,
    /// Whether the card itself changed, not just its children.
    card_changed: bool,
    card_old: Option<Block>,
    card_new: Option<Block>,
    children: Vec<PendingChild>,
    authors: BTreeSet<String>,
}

impl PendingCard {
    fn new(hint: NotificationHint, board: Board, card: Block) -> Self {
        Self {
            hint,
            board,
            snapshot: card,
            card_changed: false,
            card_old: None,
            card_new: None,
            children: Vec::new(),
            authors: BTreeSet::new(),
        }
    }

    fn merge(&mut self, new: Option<&Block>, old: Option<&Block>, user_id: &str) {
        self.authors.insert(user_id.to_string());
        let Some(block) = new.or(old) else {
            return;
        };

        if block.id == self.snapshot.id {
            if !self.card_changed {
                self.card_changed = true;
                self.card_old = old.cloned();
            }
            self.card_new = new.cloned();
            self.snapshot = block.clone();
            return;
        }

        match self.children.iter_mut().find(|c| c.id == block.id) {
            Some(child) => child.new = new.cloned(),
            None => self.children.push(PendingChild {
                id: block.id.clone(),
                old: old.cloned(),
                new: new.cloned(),
            }),
        }
    }

    fn into_diff(self) -> Option<Diff> {
        let (old, new) = if self.card_changed {
            (self.card_old, self.card_new)
        } else {
            (Some(self.snapshot.clone()), Some(self.snapshot.clone()))
        };
        let mut diff = Diff::between(old, new)?.with_board(self.board);
        diff.card = Some(self.snapshot);
        // Only users who took part in this pending change are credited.
        diff.authors = self.authors;
        for child in self.children {
            if let Some(child_diff) = Diff::between(child.old, child.new) {
                diff = diff.with_child(child_diff);
            }
        }
        Some(diff)
    }
}

/// Subscription registry plus debounced card notifications.
pub struct SubscriptionNotifier {
    store: Arc<dyn Store>,
    delivery: Arc<dyn AttachmentDelivery>,
    opts: MarkdownOpts,
    notify_freq_card_ms: i64,
    notify_freq_board_ms: i64,
    /// Block or board id -> subscribed user ids.
    subscribers: DashMap<String, BTreeSet<String>>,
    /// Card id -> pending changes and hint.
    pending: DashMap<String, PendingCard>,
}

impl SubscriptionNotifier {
    pub fn new(
        store: Arc<dyn Store>,
        delivery: Arc<dyn AttachmentDelivery>,
        opts: MarkdownOpts,
    ) -> Self {
        Self {
            store,
            delivery,
            opts,
            notify_freq_card_ms: DEFAULT_NOTIFY_FREQ_CARD_MS,
            notify_freq_board_ms: DEFAULT_NOTIFY_FREQ_BOARD_MS,
            subscribers: DashMap::new(),
            pending: DashMap::new(),
        }
    }

    /// Set how long a hint waits for further edits, for card and board
    /// subscriptions respectively.
    pub fn with_notify_freq(mut self, card_ms: i64, board_ms: i64) -> Self {
        self.notify_freq_card_ms = card_ms;
        self.notify_freq_board_ms = board_ms;
        self
    }

    /// Subscribe a user to a card or board.
    pub fn subscribe(&self, block_id: impl Into<String>, user_id: impl Into<String>) {
        self.subscribers
            .entry(block_id.into())
            .or_default()
            .insert(user_id.into());
    }

    /// Remove a subscription. Returns whether it existed.
    pub fn unsubscribe(&self, block_id: &str, user_id: &str) -> bool {
        let removed = self
            .subscribers
            .get_mut(block_id)
            .map(|mut users| users.remove(user_id))
            .unwrap_or(false);
        self.subscribers.remove_if(block_id, |_, users| users.is_empty());
        removed
    }

    /// Users subscribed directly to a card or board.
    pub fn subscribers(&self, block_id: &str) -> Vec<String> {
        self.subscribers
            .get(block_id)
            .map(|users| users.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Every scheduled hint, soonest first.
    pub fn hints(&self) -> Vec<NotificationHint> {
        let mut hints: Vec<NotificationHint> =
            self.pending.iter().map(|p| p.hint.clone()).collect();
        hints.sort_by_key(|h| h.notify_at);
        hints
    }

    /// When the next hint fires, if any is scheduled.
    pub fn next_notify_at(&self) -> Option<i64> {
        self.pending.iter().map(|p| p.hint.notify_at).min()
    }

    /// Deliver every card whose hint is due at `now`. Returns how many
    /// deliveries were made.
    pub fn flush_due(&self, now: i64) -> usize {
        let due: Vec<String> = self
            .pending
            .iter()
            .filter(|p| p.hint.notify_at <= now)
            .map(|p| p.key().clone())
            .collect();

        let mut delivered = 0;
        for card_id in due {
            let Some((_, pending)) = self
                .pending
                .remove_if(&card_id, |_, p| p.hint.notify_at <= now)
            else {
                continue;
            };
            tracing::debug!(hint = %pending.hint.log_view(), "notification hint due");
            if self.deliver_pending(pending) {
                delivered += 1;
            }
        }
        delivered
    }

    /// Flush due hints on a fixed period until the runtime shuts down.
    pub fn spawn_flush_loop(self: &Arc<Self>, period: Duration) -> tokio::task::JoinHandle<()> {
        let notifier = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let delivered = notifier.flush_due(now_millis());
                if delivered > 0 {
                    tracing::debug!(delivered, "flushed notification hints");
                }
            }
        })
    }

    fn deliver_pending(&self, pending: PendingCard) -> bool {
        let card_id = pending.snapshot.id.clone();
        let board_id = pending.board.id.clone();
        let authors = pending.authors.clone();

        let Some(diff) = pending.into_diff() else {
            tracing::debug!(%card_id, "card created and removed before notifying");
            return false;
        };

        let outcome = diffs_to_attachments(std::slice::from_ref(&diff), &self.opts);
        for err in outcome.errors.iter() {
            tracing::warn!(%card_id, error = %err, "failed to render card notification");
        }
        if outcome.attachments.is_empty() {
            return false;
        }

        let recipients: Vec<String> = self
            .recipients(&card_id, &board_id)
            .into_iter()
            .filter(|user| !authors.contains(user))
            .collect();
        if recipients.is_empty() {
            return false;
        }

        self.delivery.deliver(Delivery {
            card_id,
            board_id,
            recipients,
            attachments: outcome.attachments,
        });
        true
    }

    fn recipients(&self, card_id: &str, board_id: &str) -> BTreeSet<String> {
        let mut users: BTreeSet<String> = self.subscribers(card_id).into_iter().collect();
        users.extend(self.subscribers(board_id));
        users
    }

    /// The debounce delay for a card, or `None` when nobody is subscribed.
    fn notify_freq(&self, card: &Block) -> Option<i64> {
        let has = |id: &str| self.subscribers.get(id).is_some_and(|u| !u.is_empty());
        if has(&card.id) {
            Some(self.notify_freq_card_ms)
        } else if has(&card.board_id) {
            Some(self.notify_freq_board_ms)
        } else {
            None
        }
    }

    /// The card a changed block belongs to.
    fn resolve_card(&self, block: &Block) -> Option<Block> {
        match block.block_type {
            BlockType::Card => Some(block.clone()),
            t if t.is_card_child() && block.has_parent() => {
                if let Some(pending) = self.pending.get(&block.parent_id) {
                    return Some(pending.snapshot.clone());
                }
                match self.store.get_block(&block.parent_id) {
                    Ok(card) if card.block_type == BlockType::Card => Some(card),
                    Ok(_) => None,
                    Err(e) => {
                        tracing::debug!(block_id = %block.id, error = %e, "no card for changed block");
                        None
                    }
                }
            }
            _ => None,
        }
    }

    fn resolve_board(&self, card: &Block) -> Option<Board> {
        if let Some(pending) = self.pending.get(&card.id) {
            return Some(pending.board.clone());
        }
        match self.store.get_board(&card.board_id) {
            Ok(board) => Some(board),
            Err(e) => {
                tracing::warn!(card_id = %card.id, error = %e, "cannot notify: board lookup failed");
                None
            }
        }
    }
}

impl BlockChangeNotifier for SubscriptionNotifier {
    fn notify_block_changed(
        &self,
        action: NotifyAction,
        new: Option<&Block>,
        old: Option<&Block>,
        user_id: &str,
    ) {
        let (new, old) = match action {
            NotifyAction::Add => (new, None),
            NotifyAction::Update => (new, old),
            NotifyAction::Removed => (None, old.or(new)),
        };
        let Some(block) = new.or(old) else {
            return;
        };
        let Some(card) = self.resolve_card(block) else {
            return;
        };
        let Some(freq) = self.notify_freq(&card) else {
            return;
        };
        let Some(board) = self.resolve_board(&card) else {
            return;
        };

        let now = now_millis();
        let hint = NotificationHint {
            block_type: BlockType::Card.as_str().to_string(),
            block_id: card.id.clone(),
            workspace_id: board.team_id.clone(),
            modified_by_id: user_id.to_string(),
            create_at: now,
            notify_at: now + freq,
        };
        if let Err(e) = hint.is_valid() {
            tracing::warn!(card_id = %card.id, reason = e.reason(), "dropping notification hint");
            return;
        }

        let scheduled = match self.pending.entry(card.id.clone()) {
            Entry::Occupied(mut entry) => {
                let pending = entry.get_mut();
                pending.hint = NotificationHint {
                    create_at: pending.hint.create_at,
                    ..hint
                };
                pending.merge(new, old, user_id);
                pending.hint.clone()
            }
            Entry::Vacant(entry) => {
                let mut pending = PendingCard::new(hint, board, card);
                pending.merge(new, old, user_id);
                let hint = pending.hint.clone();
                entry.insert(pending);
                hint
            }
        };
        tracing::debug!(%action, hint = %scheduled.log_view(), "notification hint scheduled");
    }
}

impl std::fmt::Debug for SubscriptionNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionNotifier")
            .field("server_root", &self.opts.server_root)
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}
