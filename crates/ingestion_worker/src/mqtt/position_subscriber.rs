use crate::queue::{EnqueueOutcome, QueueProducer};
use common::transport::{Delivery, DeliveryHandler};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Create the handler the MQTT transport invokes for every position message
///
/// The payload is handed to the ingestion queue as-is; decoding happens on
/// the worker side. A payload that cannot be queued within
/// `enqueue_timeout` is dropped with a warning.
pub fn create_position_delivery_handler(
    producer: QueueProducer,
    enqueue_timeout: Duration,
) -> DeliveryHandler {
    Arc::new(move |delivery: Delivery| {
        let producer = producer.clone();
        Box::pin(async move {
            let payload_size = delivery.payload.len();
            debug!(topic = %delivery.topic, payload_size, "received position message");

            match producer.enqueue(delivery.payload, enqueue_timeout).await {
                EnqueueOutcome::Accepted { sequence } => {
                    debug!(sequence, "queued position payload");
                }
                EnqueueOutcome::Dropped { sequence, reason } => {
                    warn!(
                        sequence,
                        topic = %delivery.topic,
                        payload_size,
                        reason = %reason,
                        "dropping position payload"
                    );
                }
            }
        })
    })
}
