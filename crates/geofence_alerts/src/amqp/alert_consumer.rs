use crate::domain::AlertHandler;
use anyhow::{Context, Result};
use backon::{BackoffBuilder, ExponentialBuilder};
use common::domain::GeofenceEvent;
use common::retry::reconnect_backoff;
use common::transport::{Delivery, DeliveryHandler, FanoutTopology, PubSubTransport, Subscription};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(30);

/// Connection lifecycle of an [`AlertConsumer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Disconnected,
    Connecting,
    Subscribed,
}

#[derive(Debug, Clone)]
pub struct AlertConsumerConfig {
    pub exchange: String,
    pub queue: String,
}

/// Drains the geofence alert queue into an [`AlertHandler`]
///
/// Declares the fanout topology, subscribes to the queue and waits. When the
/// subscription ends without shutdown having been requested, the consumer
/// reconnects with exponential backoff.
pub struct AlertConsumer {
    transport: Arc<dyn PubSubTransport>,
    topology: Arc<dyn FanoutTopology>,
    handler: Arc<dyn AlertHandler>,
    config: AlertConsumerConfig,
    backoff: ExponentialBuilder,
    state: watch::Sender<ConsumerState>,
}

impl AlertConsumer {
    pub fn new(
        transport: Arc<dyn PubSubTransport>,
        topology: Arc<dyn FanoutTopology>,
        handler: Arc<dyn AlertHandler>,
        config: AlertConsumerConfig,
    ) -> Self {
        let (state, _) = watch::channel(ConsumerState::Disconnected);
        Self {
            transport,
            topology,
            handler,
            config,
            backoff: reconnect_backoff(),
            state,
        }
    }

    /// Override the reconnect backoff
    pub fn with_backoff(mut self, backoff: ExponentialBuilder) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn state(&self) -> ConsumerState {
        *self.state.borrow()
    }

    /// Receiver that observes every state change
    pub fn state_receiver(&self) -> watch::Receiver<ConsumerState> {
        self.state.subscribe()
    }

    pub async fn run(self, ctx: CancellationToken) -> Result<()> {
        let mut delays = self.backoff.build();

        loop {
            self.set_state(ConsumerState::Connecting);

            match self.connect().await {
                Ok(subscription) => {
                    self.set_state(ConsumerState::Subscribed);
                    delays = self.backoff.build();

                    tokio::select! {
                        _ = ctx.cancelled() => break,
                        _ = subscription.ended() => {
                            warn!(queue = %self.config.queue, "alert subscription ended, reconnecting");
                        }
                    }
                }
                Err(e) => {
                    error!(queue = %self.config.queue, error = %e, "failed to subscribe to alert queue");
                }
            }

            self.set_state(ConsumerState::Disconnected);

            let delay = delays.next().unwrap_or(MAX_RECONNECT_DELAY);
            debug!(backoff_ms = delay.as_millis() as u64, "waiting before reconnect");
            tokio::select! {
                _ = ctx.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.set_state(ConsumerState::Disconnected);
        info!(queue = %self.config.queue, "alert consumer stopped");
        Ok(())
    }

    async fn connect(&self) -> Result<Subscription> {
        self.topology
            .declare_topology(&self.config.exchange, &self.config.queue)
            .await
            .context("Failed to declare alert topology")?;

        let subscription = self
            .transport
            .subscribe(
                &self.config.queue,
                create_alert_delivery_handler(Arc::clone(&self.handler)),
            )
            .await?;

        info!(
            exchange = %self.config.exchange,
            queue = %self.config.queue,
            "alert consumer subscribed"
        );
        Ok(subscription)
    }

    fn set_state(&self, state: ConsumerState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(from = ?previous, to = ?state, "alert consumer state changed");
        }
    }
}

/// Decode each delivery and pass it to `handler`; undecodable deliveries are discarded
pub fn create_alert_delivery_handler(handler: Arc<dyn AlertHandler>) -> DeliveryHandler {
    Arc::new(move |delivery: Delivery| {
        let handler = Arc::clone(&handler);
        Box::pin(async move {
            let event = match GeofenceEvent::decode(&delivery.payload) {
                Ok(event) => event,
                Err(e) => {
                    warn!(
                        queue = %delivery.topic,
                        payload_size = delivery.payload.len(),
                        error = %e,
                        "discarding undecodable geofence event"
                    );
                    return;
                }
            };

            if let Err(e) = handler.handle_alert(&event).await {
                error!(
                    vehicle_id = %event.vehicle_id,
                    error = %e,
                    "alert handler failed"
                );
            }
        })
    })
}
