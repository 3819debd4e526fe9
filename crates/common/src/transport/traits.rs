use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures::future::BoxFuture;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// A payload handed over by a transport for a subscribed topic or queue
#[derive(Debug, Clone)]
pub struct Delivery {
    pub topic: String,
    pub payload: Bytes,
}

/// Callback invoked once per delivery
///
/// Transports await the returned future before handing over the next delivery
/// on the same subscription.
pub type DeliveryHandler = Arc<dyn Fn(Delivery) -> BoxFuture<'static, ()> + Send + Sync>;

/// Handle for an active subscription
///
/// Resolves [`Subscription::ended`] once the transport stops delivering for it,
/// either because the transport was closed or because the connection was lost.
#[derive(Debug, Clone)]
pub struct Subscription {
    ended: CancellationToken,
}

impl Subscription {
    pub fn new(ended: CancellationToken) -> Self {
        Self { ended }
    }

    pub fn is_ended(&self) -> bool {
        self.ended.is_cancelled()
    }

    /// Wait until no further deliveries will arrive
    pub async fn ended(&self) {
        self.ended.cancelled().await
    }
}

/// Publish/subscribe capability offered by a broker client
/// Abstracts the broker wire protocol away from the ingestion and alerting pipelines
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait PubSubTransport: Send + Sync {
    /// Register a handler for deliveries on a topic (or queue, for AMQP)
    async fn subscribe(&self, topic: &str, handler: DeliveryHandler) -> Result<Subscription>;

    /// Publish a payload to a topic (or exchange, for AMQP)
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<()>;

    /// Stop all deliveries and release the connection
    async fn close(&self) -> Result<()>;
}

/// Broker-side routing setup for the geofence event fanout
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait FanoutTopology: Send + Sync {
    /// Declare a durable fanout exchange and a durable queue bound to it
    ///
    /// Idempotent: repeating the call with the same names changes nothing.
    async fn declare_topology(&self, exchange: &str, queue: &str) -> Result<()>;
}
