use common::domain::{DomainResult, GeofenceMonitor, PositionReport, PositionRepository};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Domain service that turns a raw position payload into a stored report
///
/// Flow:
/// 1. Decode and validate the JSON payload
/// 2. Record the report in one transaction
/// 3. Hand the report to the geofence monitor, whether or not it was stored
pub struct PositionService {
    repository: Arc<dyn PositionRepository>,
    geofence_monitor: Arc<dyn GeofenceMonitor>,
}

impl PositionService {
    pub fn new(
        repository: Arc<dyn PositionRepository>,
        geofence_monitor: Arc<dyn GeofenceMonitor>,
    ) -> Self {
        Self {
            repository,
            geofence_monitor,
        }
    }

    /// Process one queued payload
    ///
    /// Decode errors are returned before anything is stored. A persistence
    /// error is returned after the geofence monitor has seen the report.
    #[instrument(skip_all, fields(payload_size = payload.len()))]
    pub async fn process_payload(&self, payload: &[u8]) -> DomainResult<PositionReport> {
        let report = PositionReport::decode(payload)?;

        debug!(
            vehicle_id = %report.vehicle_id,
            timestamp = report.timestamp,
            "decoded position report"
        );

        let persisted = self.repository.record_position(&report).await;
        self.geofence_monitor.observe(&report).await;

        persisted.map(|()| report)
    }
}
