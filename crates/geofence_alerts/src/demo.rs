use crate::domain::GeofenceService;
use common::domain::{DomainResult, GeofenceEvent, PositionReport};
use tracing::{info, instrument};

/// Fixed report inside the default Jakarta boundary
pub fn demonstration_report() -> PositionReport {
    PositionReport {
        vehicle_id: "B1234XYZ".to_string(),
        latitude: -6.2088,
        longitude: 106.8456,
        timestamp: 1715003456,
    }
}

/// Evaluate the demonstration report and publish whatever it triggers
///
/// Publish failures are returned; callers treat them as fatal.
#[instrument(skip_all)]
pub async fn run_geofence_demo(service: &GeofenceService) -> DomainResult<Vec<GeofenceEvent>> {
    let report = demonstration_report();
    let events = service.check_position(&report).await?;

    info!(
        vehicle_id = %report.vehicle_id,
        events = events.len(),
        "geofence demonstration complete"
    );
    Ok(events)
}
