use crate::domain::evaluate;
use async_trait::async_trait;
use common::domain::{
    DomainResult, GeofenceBoundary, GeofenceEvent, GeofenceEventProducer, GeofenceMonitor,
    PositionReport,
};
use std::sync::Arc;
use tracing::{debug, error, info, instrument};

/// Checks positions against the configured boundaries and fans out entries
pub struct GeofenceService {
    boundaries: Vec<GeofenceBoundary>,
    producer: Arc<dyn GeofenceEventProducer>,
}

impl GeofenceService {
    pub fn new(boundaries: Vec<GeofenceBoundary>, producer: Arc<dyn GeofenceEventProducer>) -> Self {
        Self {
            boundaries,
            producer,
        }
    }

    /// Events for every boundary the report falls inside
    fn entries<'a>(
        &'a self,
        report: &'a PositionReport,
    ) -> impl Iterator<Item = (&'a GeofenceBoundary, GeofenceEvent)> + 'a {
        self.boundaries.iter().filter_map(move |boundary| {
            let event = evaluate(report, boundary)?;
            info!(
                boundary = boundary.name(),
                latitude = report.latitude,
                longitude = report.longitude,
                "vehicle inside geofence"
            );
            Some((boundary, event))
        })
    }

    /// Evaluate a report against every boundary and publish each resulting event
    ///
    /// Stops at the first publish failure and returns it.
    #[instrument(skip(self, report), fields(vehicle_id = %report.vehicle_id))]
    pub async fn check_position(&self, report: &PositionReport) -> DomainResult<Vec<GeofenceEvent>> {
        let mut events = Vec::new();

        for (_, event) in self.entries(report) {
            self.producer.publish_event(&event).await?;
            events.push(event);
        }

        debug!(events = events.len(), "geofence check complete");
        Ok(events)
    }
}

#[async_trait]
impl GeofenceMonitor for GeofenceService {
    /// Publish every entry event; a failed boundary does not skip the rest
    async fn observe(&self, report: &PositionReport) {
        for (boundary, event) in self.entries(report) {
            if let Err(e) = self.producer.publish_event(&event).await {
                error!(
                    vehicle_id = %report.vehicle_id,
                    boundary = boundary.name(),
                    error = %e,
                    "failed to publish geofence event"
                );
            }
        }
    }
}
