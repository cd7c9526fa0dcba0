//! # corkboard-kernel
//!
//! The mutation-and-notification pipeline for corkboard.
//!
//! A mutation is applied synchronously and atomically through a [`Store`],
//! then one detached fan-out job tells every interested party about it:
//! - live clients, through the board [`FlowBus`]
//! - [`Metrics`] counters
//! - an outbound [`Webhook`]
//! - the [`SubscriptionNotifier`], which debounces changes per card and
//!   later renders them into chat attachments
//!
//! The caller only ever sees the synchronous outcome. Fan-out problems are
//! logged through `tracing` and never surfaced.

pub mod config;
pub mod coordinator;
pub mod dispatch;
pub mod error;
pub mod flows;
pub mod kernel;
pub mod metrics;
pub mod store;
pub mod subscriptions;
pub mod webhook;

pub use config::CorkboardConfig;
pub use coordinator::{MutationCoordinator, Sinks};
pub use dispatch::FanoutDispatcher;
pub use error::{ConfigError, CoordinatorError, CoordinatorResult, StoreError, StoreResult};
pub use flows::{
    BoardFlow, BroadcastSink, FlowBus, FlowMessage, HasSubject, SharedBoardFlowBus, Subscription,
    matches_pattern, shared_board_flow_bus,
};
pub use kernel::{Kernel, KernelChannels};
pub use metrics::{AtomicMetrics, Metrics, MetricsSnapshot};
pub use store::{MemoryStore, Store};
pub use subscriptions::{
    AttachmentDelivery, BlockChangeNotifier, ChannelDelivery, Delivery, NotifyAction,
    SubscriptionNotifier,
};
pub use webhook::{ChannelWebhook, Webhook, WebhookPayload};
