//! The Kernel: a fully wired corkboard instance.
//!
//! A kernel owns:
//! - The store (in-memory)
//! - The board flow bus (live updates)
//! - Metrics counters
//! - The subscription notifier
//! - The mutation coordinator and its fan-out dispatcher
//!
//! Webhook payloads and rendered deliveries leave the kernel through
//! channels returned alongside it in [`KernelChannels`].

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::mpsc;

use corkboard_notify::MarkdownOpts;

use crate::config::CorkboardConfig;
use crate::coordinator::{MutationCoordinator, Sinks};
use crate::dispatch::FanoutDispatcher;
use crate::flows::{SharedBoardFlowBus, shared_board_flow_bus};
use crate::metrics::AtomicMetrics;
use crate::store::MemoryStore;
use crate::subscriptions::{ChannelDelivery, Delivery, SubscriptionNotifier};
use crate::webhook::{ChannelWebhook, WebhookPayload};

/// Receiving ends of the kernel's outbound channels.
#[derive(Debug)]
pub struct KernelChannels {
    pub webhooks: mpsc::UnboundedReceiver<WebhookPayload>,
    pub deliveries: mpsc::UnboundedReceiver<Delivery>,
}

/// A corkboard kernel.
pub struct Kernel {
    config: CorkboardConfig,
    store: Arc<MemoryStore>,
    flows: SharedBoardFlowBus,
    metrics: Arc<AtomicMetrics>,
    notifier: Arc<SubscriptionNotifier>,
    coordinator: MutationCoordinator,
}

impl std::fmt::Debug for Kernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kernel")
            .field("config", &self.config)
            .field("coordinator", &self.coordinator)
            .finish_non_exhaustive()
    }
}

impl Kernel {
    /// Wire a kernel whose fan-out jobs run on the given runtime.
    pub fn new(config: CorkboardConfig, handle: Handle) -> (Self, KernelChannels) {
        let store = Arc::new(MemoryStore::new());
        let flows = shared_board_flow_bus(config.flow_capacity);
        let metrics = Arc::new(AtomicMetrics::new());
        let (webhook, webhooks) = ChannelWebhook::channel();
        let (delivery, deliveries) = ChannelDelivery::channel();

        let notifier = Arc::new(
            SubscriptionNotifier::new(
                store.clone(),
                Arc::new(delivery),
                MarkdownOpts::new(config.server_root.clone()),
            )
            .with_notify_freq(config.notify_freq_card_ms, config.notify_freq_board_ms),
        );

        let sinks = Sinks {
            broadcast: flows.clone(),
            metrics: metrics.clone(),
            webhook: Arc::new(webhook),
            notifier: notifier.clone(),
        };
        let dispatcher = FanoutDispatcher::new(handle, config.fanout_workers);
        let coordinator = MutationCoordinator::new(store.clone(), sinks, dispatcher);

        tracing::info!(
            workers = config.fanout_workers,
            server_root = %config.server_root,
            "kernel ready"
        );

        let kernel = Self {
            config,
            store,
            flows,
            metrics,
            notifier,
            coordinator,
        };
        (kernel, KernelChannels { webhooks, deliveries })
    }

    /// Wire a kernel on the runtime of the calling context.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn current(config: CorkboardConfig) -> (Self, KernelChannels) {
        Self::new(config, Handle::current())
    }

    pub fn config(&self) -> &CorkboardConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    /// The live-update bus; subscribe here for board flow events.
    pub fn flows(&self) -> &SharedBoardFlowBus {
        &self.flows
    }

    pub fn metrics(&self) -> &Arc<AtomicMetrics> {
        &self.metrics
    }

    pub fn notifier(&self) -> &Arc<SubscriptionNotifier> {
        &self.notifier
    }

    pub fn coordinator(&self) -> &MutationCoordinator {
        &self.coordinator
    }

    /// Wait until every fan-out job submitted so far has finished.
    pub async fn drain(&self) {
        self.coordinator.dispatcher().drain().await;
    }
}
