//! Bounded hand-off from the ingestion worker to the geofence monitor.
//!
//! The worker side forwards each decoded report with `try_send` and returns
//! at once; a separate task runs the monitor. When the relay is full the
//! report skips geofence evaluation and a warning is logged. Persistence is
//! never held up by alert publishing.

use anyhow::Result;
use async_trait::async_trait;
use common::domain::{GeofenceMonitor, PositionReport};
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

enum RelayStep {
    Stopping,
    Observe(PositionReport),
    Finished,
}

/// Creates a relay buffering at most `capacity` reports for `monitor`
pub fn geofence_relay(
    capacity: NonZeroUsize,
    monitor: Arc<dyn GeofenceMonitor>,
) -> (GeofenceRelayHandle, GeofenceRelay) {
    let (sender, receiver) = mpsc::channel(capacity.get());
    (
        GeofenceRelayHandle { sender },
        GeofenceRelay {
            receiver,
            monitor,
            capacity,
        },
    )
}

/// Worker-side end; stands in for the monitor inside the position service
#[derive(Clone)]
pub struct GeofenceRelayHandle {
    sender: mpsc::Sender<PositionReport>,
}

#[async_trait]
impl GeofenceMonitor for GeofenceRelayHandle {
    async fn observe(&self, report: &PositionReport) {
        match self.sender.try_send(report.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(report)) => {
                warn!(
                    vehicle_id = %report.vehicle_id,
                    timestamp = report.timestamp,
                    "geofence relay full, skipping geofence check"
                );
            }
            Err(TrySendError::Closed(report)) => {
                debug!(
                    vehicle_id = %report.vehicle_id,
                    "geofence relay stopped, skipping geofence check"
                );
            }
        }
    }
}

/// Monitor-side end, registered on the runner as its own process
pub struct GeofenceRelay {
    receiver: mpsc::Receiver<PositionReport>,
    monitor: Arc<dyn GeofenceMonitor>,
    capacity: NonZeroUsize,
}

impl GeofenceRelay {
    /// Feed buffered reports to the monitor one at a time
    ///
    /// Returns once every handle is dropped. After cancellation it keeps
    /// evaluating what the ingestion worker forwards while it drains.
    pub async fn run(mut self, ctx: CancellationToken) -> Result<()> {
        info!(capacity = self.capacity.get(), "geofence relay started");

        let mut stopping = false;
        loop {
            let step = tokio::select! {
                biased;
                _ = ctx.cancelled(), if !stopping => RelayStep::Stopping,
                next = self.receiver.recv() => match next {
                    Some(report) => RelayStep::Observe(report),
                    None => RelayStep::Finished,
                },
            };

            match step {
                RelayStep::Stopping => {
                    info!(
                        buffered = self.receiver.len(),
                        "geofence relay draining until the ingestion worker stops"
                    );
                    stopping = true;
                }
                RelayStep::Observe(report) => self.monitor.observe(&report).await,
                RelayStep::Finished => break,
            }
        }

        info!("geofence relay stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::domain::MockGeofenceMonitor;
    use std::sync::Mutex;
    use std::time::Duration;

    fn report(vehicle_id: &str) -> PositionReport {
        PositionReport {
            vehicle_id: vehicle_id.to_string(),
            latitude: -6.2088,
            longitude: 106.8456,
            timestamp: 1715003456,
        }
    }

    fn recording_monitor(seen: Arc<Mutex<Vec<String>>>) -> MockGeofenceMonitor {
        let mut monitor = MockGeofenceMonitor::new();
        monitor.expect_observe().returning(move |report| {
            seen.lock().unwrap().push(report.vehicle_id.clone());
        });
        monitor
    }

    #[tokio::test]
    async fn test_relay_forwards_reports_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (handle, relay) = geofence_relay(
            NonZeroUsize::new(8).unwrap(),
            Arc::new(recording_monitor(seen.clone())),
        );

        let task = tokio::spawn(relay.run(CancellationToken::new()));

        handle.observe(&report("B1111AAA")).await;
        handle.observe(&report("B2222BBB")).await;
        handle.observe(&report("B3333CCC")).await;
        drop(handle);

        task.await.unwrap().unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["B1111AAA", "B2222BBB", "B3333CCC"]);
    }

    #[tokio::test]
    async fn test_full_relay_skips_report_without_waiting() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (handle, relay) = geofence_relay(
            NonZeroUsize::new(1).unwrap(),
            Arc::new(recording_monitor(seen.clone())),
        );

        // Relay not running yet, so the second report finds it full
        tokio::time::timeout(Duration::from_millis(100), async {
            handle.observe(&report("B1111AAA")).await;
            handle.observe(&report("B2222BBB")).await;
        })
        .await
        .unwrap();
        drop(handle);

        relay.run(CancellationToken::new()).await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["B1111AAA"]);
    }

    #[tokio::test]
    async fn test_relay_keeps_draining_after_cancellation() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (handle, relay) = geofence_relay(
            NonZeroUsize::new(8).unwrap(),
            Arc::new(recording_monitor(seen.clone())),
        );

        let ctx = CancellationToken::new();
        ctx.cancel();
        let task = tokio::spawn(relay.run(ctx));

        handle.observe(&report("B1111AAA")).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!task.is_finished());

        drop(handle);
        task.await.unwrap().unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["B1111AAA"]);
    }

    #[tokio::test]
    async fn test_observe_after_relay_stopped_is_ignored() {
        let (handle, relay) = geofence_relay(
            NonZeroUsize::new(4).unwrap(),
            Arc::new(MockGeofenceMonitor::new()),
        );
        drop(relay);

        handle.observe(&report("B1111AAA")).await;
    }
}
