use async_trait::async_trait;
use common::domain::{DomainError, DomainResult, GeofenceEvent, GeofenceEventProducer};
use common::transport::PubSubTransport;
use std::sync::Arc;
use tracing::{debug, info};

/// Publishes geofence events as JSON to the fanout exchange
pub struct AmqpGeofenceEventProducer {
    transport: Arc<dyn PubSubTransport>,
    exchange: String,
}

impl AmqpGeofenceEventProducer {
    pub fn new(transport: Arc<dyn PubSubTransport>, exchange: String) -> Self {
        info!(exchange = %exchange, "created geofence event producer");
        Self {
            transport,
            exchange,
        }
    }
}

#[async_trait]
impl GeofenceEventProducer for AmqpGeofenceEventProducer {
    async fn publish_event(&self, event: &GeofenceEvent) -> DomainResult<()> {
        let payload = event.encode()?;

        debug!(
            exchange = %self.exchange,
            vehicle_id = %event.vehicle_id,
            size_bytes = payload.len(),
            "publishing geofence event"
        );

        self.transport
            .publish(&self.exchange, payload.into())
            .await
            .map_err(|source| DomainError::EventPublishFailed {
                vehicle_id: event.vehicle_id.clone(),
                source,
            })?;

        info!(
            exchange = %self.exchange,
            vehicle_id = %event.vehicle_id,
            "published geofence event"
        );

        Ok(())
    }
}
