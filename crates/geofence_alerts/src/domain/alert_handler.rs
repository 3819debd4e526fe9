use async_trait::async_trait;
use common::domain::{DomainResult, GeofenceEvent};
use tracing::info;

/// Reaction to a geofence alert taken by the alert consumer
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AlertHandler: Send + Sync {
    /// Failures are reported as `DomainError::AlertHandlingFailed`; the consumer
    /// logs them and moves on to the next delivery
    async fn handle_alert(&self, event: &GeofenceEvent) -> DomainResult<()>;
}

/// Default reaction: one structured log line per alert
#[derive(Debug, Default, Clone)]
pub struct LoggingAlertHandler;

#[async_trait]
impl AlertHandler for LoggingAlertHandler {
    async fn handle_alert(&self, event: &GeofenceEvent) -> DomainResult<()> {
        info!(
            vehicle_id = %event.vehicle_id,
            event = ?event.event,
            latitude = event.location.latitude,
            longitude = event.location.longitude,
            timestamp = event.timestamp,
            "geofence alert received"
        );
        Ok(())
    }
}
