use crate::domain::PositionService;
use crate::mqtt::create_position_delivery_handler;
use crate::queue::{ingestion_queue, QueuedPayload};
use anyhow::{Context, Result};
use common::domain::DomainError;
use common::transport::PubSubTransport;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

enum WorkerStep {
    Shutdown,
    Process(QueuedPayload),
    Drained,
}

#[derive(Debug, Clone)]
pub struct IngestionWorkerConfig {
    pub topic: String,
    pub queue_capacity: NonZeroUsize,
    pub enqueue_timeout: Duration,
}

/// Drains the ingestion queue into the position service
///
/// Subscribes to the position topic, then processes queued payloads one at a
/// time until cancelled. On cancellation the queue is closed and every
/// payload already buffered is still processed before `run` returns.
pub struct IngestionWorker {
    transport: Arc<dyn PubSubTransport>,
    service: Arc<PositionService>,
    config: IngestionWorkerConfig,
}

impl IngestionWorker {
    pub fn new(
        transport: Arc<dyn PubSubTransport>,
        service: Arc<PositionService>,
        config: IngestionWorkerConfig,
    ) -> Self {
        Self {
            transport,
            service,
            config,
        }
    }

    pub async fn run(self, ctx: CancellationToken) -> Result<()> {
        let (producer, mut consumer) = ingestion_queue(self.config.queue_capacity);
        let handler = create_position_delivery_handler(producer, self.config.enqueue_timeout);

        self.transport
            .subscribe(&self.config.topic, handler)
            .await
            .with_context(|| format!("Failed to subscribe to '{}'", self.config.topic))?;

        info!(
            topic = %self.config.topic,
            capacity = consumer.capacity().get(),
            "ingestion worker started"
        );

        let mut closing = false;
        loop {
            let step = tokio::select! {
                biased;
                _ = ctx.cancelled(), if !closing => WorkerStep::Shutdown,
                next = consumer.dequeue() => match next {
                    Some(item) => WorkerStep::Process(item),
                    None => WorkerStep::Drained,
                },
            };

            match step {
                WorkerStep::Shutdown => {
                    info!(
                        buffered = consumer.len(),
                        "closing ingestion queue, draining buffered payloads"
                    );
                    consumer.close();
                    closing = true;
                }
                WorkerStep::Process(item) => self.process(item).await,
                WorkerStep::Drained => break,
            }
        }

        info!("ingestion worker stopped");
        Ok(())
    }

    async fn process(&self, item: QueuedPayload) {
        match self.service.process_payload(&item.payload).await {
            Ok(report) => {
                debug!(
                    sequence = item.sequence,
                    vehicle_id = %report.vehicle_id,
                    "processed position report"
                );
            }
            Err(DomainError::PositionPersistenceFailed { vehicle_id, source }) => {
                error!(
                    sequence = item.sequence,
                    vehicle_id = %vehicle_id,
                    error = %source,
                    "failed to persist position report"
                );
            }
            Err(e) => {
                warn!(
                    sequence = item.sequence,
                    payload_size = item.payload.len(),
                    error = %e,
                    "discarding invalid position payload"
                );
            }
        }
    }
}
