//! Bounded FIFO between the MQTT delivery callback and the ingestion worker.
//!
//! The producer side never blocks longer than the deadline passed to
//! [`QueueProducer::enqueue`]; payloads that cannot be queued in time are
//! dropped and reported to the caller. Closing the consumer side stops new
//! enqueues while still letting buffered payloads drain.

use bytes::Bytes;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::SendTimeoutError, error::TrySendError};

/// A raw payload waiting to be processed, tagged with its arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedPayload {
    pub sequence: u64,
    pub payload: Bytes,
}

/// Why a payload was not queued
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DropReason {
    #[error("queue full")]
    QueueFull,
    #[error("queue closed")]
    QueueClosed,
}

/// Result of a single enqueue attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Accepted { sequence: u64 },
    Dropped { sequence: u64, reason: DropReason },
}

impl EnqueueOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, EnqueueOutcome::Accepted { .. })
    }
}

/// Creates a queue holding at most `capacity` payloads
pub fn ingestion_queue(capacity: NonZeroUsize) -> (QueueProducer, QueueConsumer) {
    let (sender, receiver) = mpsc::channel(capacity.get());
    (
        QueueProducer {
            sender,
            next_sequence: Arc::new(AtomicU64::new(0)),
        },
        QueueConsumer { receiver, capacity },
    )
}

/// Enqueueing side, held by the transport delivery handler
#[derive(Clone)]
pub struct QueueProducer {
    sender: mpsc::Sender<QueuedPayload>,
    next_sequence: Arc<AtomicU64>,
}

impl QueueProducer {
    /// Queue a payload, waiting at most `deadline` for a free slot
    pub async fn enqueue(&self, payload: Bytes, deadline: Duration) -> EnqueueOutcome {
        let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
        let item = QueuedPayload { sequence, payload };

        let item = match self.sender.try_send(item) {
            Ok(()) => return EnqueueOutcome::Accepted { sequence },
            Err(TrySendError::Closed(_)) => {
                return EnqueueOutcome::Dropped {
                    sequence,
                    reason: DropReason::QueueClosed,
                }
            }
            Err(TrySendError::Full(item)) => item,
        };

        match self.sender.send_timeout(item, deadline).await {
            Ok(()) => EnqueueOutcome::Accepted { sequence },
            Err(SendTimeoutError::Timeout(_)) => EnqueueOutcome::Dropped {
                sequence,
                reason: DropReason::QueueFull,
            },
            Err(SendTimeoutError::Closed(_)) => EnqueueOutcome::Dropped {
                sequence,
                reason: DropReason::QueueClosed,
            },
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Dequeueing side, owned by the single ingestion worker
pub struct QueueConsumer {
    receiver: mpsc::Receiver<QueuedPayload>,
    capacity: NonZeroUsize,
}

impl QueueConsumer {
    /// Wait for the next payload
    ///
    /// Returns `None` once the queue is closed and every buffered payload
    /// has been handed out, or when every producer is gone.
    pub async fn dequeue(&mut self) -> Option<QueuedPayload> {
        self.receiver.recv().await
    }

    /// Reject further enqueues; buffered payloads remain available
    pub fn close(&mut self) {
        self.receiver.close();
    }

    pub fn capacity(&self) -> NonZeroUsize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capacity(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    fn payload(n: usize) -> Bytes {
        Bytes::from(format!("payload-{}", n))
    }

    #[tokio::test]
    async fn test_fifo_order_with_concurrent_consumer() {
        let (producer, mut consumer) = ingestion_queue(capacity(8));

        let producer_task = tokio::spawn(async move {
            for i in 0..500 {
                let outcome = producer.enqueue(payload(i), Duration::from_secs(5)).await;
                assert!(outcome.is_accepted());
            }
        });

        let mut received = Vec::new();
        while received.len() < 500 {
            let item = consumer.dequeue().await.unwrap();
            received.push(item);
        }
        producer_task.await.unwrap();

        for (i, item) in received.iter().enumerate() {
            assert_eq!(item.sequence, i as u64);
            assert_eq!(item.payload, payload(i));
        }
    }

    #[tokio::test]
    async fn test_overflow_without_consumer_drops_excess() {
        let (producer, mut consumer) = ingestion_queue(capacity(100));

        let mut accepted = 0;
        let mut dropped = Vec::new();
        for i in 0..150 {
            match producer.enqueue(payload(i), Duration::from_millis(5)).await {
                EnqueueOutcome::Accepted { .. } => accepted += 1,
                EnqueueOutcome::Dropped { sequence, reason } => {
                    assert_eq!(reason, DropReason::QueueFull);
                    dropped.push(sequence);
                }
            }
        }

        assert_eq!(accepted, 100);
        assert_eq!(dropped, (100..150).collect::<Vec<u64>>());
        assert_eq!(consumer.len(), 100);

        consumer.close();
        for i in 0..100 {
            let item = consumer.dequeue().await.unwrap();
            assert_eq!(item.sequence, i as u64);
            assert_eq!(item.payload, payload(i));
        }
        assert!(consumer.dequeue().await.is_none());
    }

    #[tokio::test]
    async fn test_full_queue_accepts_once_slot_frees_before_deadline() {
        let (producer, mut consumer) = ingestion_queue(capacity(1));

        assert!(producer
            .enqueue(payload(0), Duration::from_millis(10))
            .await
            .is_accepted());

        let waiter = {
            let producer = producer.clone();
            tokio::spawn(async move { producer.enqueue(payload(1), Duration::from_secs(5)).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(consumer.dequeue().await.unwrap().sequence, 0);

        assert_eq!(
            waiter.await.unwrap(),
            EnqueueOutcome::Accepted { sequence: 1 }
        );
        assert_eq!(consumer.dequeue().await.unwrap().payload, payload(1));
    }

    #[tokio::test]
    async fn test_close_drains_buffered_then_returns_none() {
        let (producer, mut consumer) = ingestion_queue(capacity(10));

        for i in 0..3 {
            producer.enqueue(payload(i), Duration::from_millis(10)).await;
        }
        consumer.close();

        assert!(producer.is_closed());
        for i in 0..3 {
            assert_eq!(consumer.dequeue().await.unwrap().payload, payload(i));
        }
        assert!(consumer.dequeue().await.is_none());
    }

    #[tokio::test]
    async fn test_enqueue_after_close_reports_closed() {
        let (producer, mut consumer) = ingestion_queue(capacity(10));
        consumer.close();

        let outcome = producer.enqueue(payload(0), Duration::from_millis(10)).await;
        assert_eq!(
            outcome,
            EnqueueOutcome::Dropped {
                sequence: 0,
                reason: DropReason::QueueClosed
            }
        );
    }

    #[tokio::test]
    async fn test_enqueue_on_full_queue_after_close_reports_closed() {
        let (producer, mut consumer) = ingestion_queue(capacity(1));
        producer.enqueue(payload(0), Duration::from_millis(10)).await;

        let waiter = {
            let producer = producer.clone();
            tokio::spawn(async move { producer.enqueue(payload(1), Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        consumer.close();

        assert_eq!(
            waiter.await.unwrap(),
            EnqueueOutcome::Dropped {
                sequence: 1,
                reason: DropReason::QueueClosed
            }
        );
    }

    #[test]
    fn test_capacity_is_reported() {
        let (_producer, consumer) = ingestion_queue(capacity(100));
        assert_eq!(consumer.capacity().get(), 100);
        assert!(consumer.is_empty());
    }
}
