use crate::domain::position::PositionReport;
use crate::domain::result::{DomainError, DomainResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A latitude/longitude pair in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// Kind of boundary crossing carried by a [`GeofenceEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeofenceEventKind {
    #[serde(rename = "geofence_entry")]
    Entry,
}

/// Boundary-crossing notification fanned out to alert consumers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeofenceEvent {
    #[serde(rename = "vehicleID")]
    pub vehicle_id: String,
    pub event: GeofenceEventKind,
    pub location: Location,
    pub timestamp: i64,
}

impl GeofenceEvent {
    /// Build an entry event carrying the report's vehicle, location and time
    pub fn entry(report: &PositionReport) -> Self {
        Self {
            vehicle_id: report.vehicle_id.clone(),
            event: GeofenceEventKind::Entry,
            location: Location::new(report.latitude, report.longitude),
            timestamp: report.timestamp,
        }
    }

    pub fn decode(payload: &[u8]) -> DomainResult<Self> {
        serde_json::from_slice(payload)
            .map_err(|e| DomainError::InvalidGeofenceEventPayload(e.to_string()))
    }

    pub fn encode(&self) -> DomainResult<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| DomainError::InvalidGeofenceEventPayload(e.to_string()))
    }
}

/// A named circular region, read-only once constructed
#[derive(Debug, Clone, PartialEq)]
pub struct GeofenceBoundary {
    name: String,
    center: Location,
    radius_km: f64,
}

impl GeofenceBoundary {
    pub fn new(name: impl Into<String>, center: Location, radius_km: f64) -> DomainResult<Self> {
        let name = name.into();

        if !radius_km.is_finite() || radius_km < 0.0 {
            return Err(DomainError::InvalidGeofenceBoundary(format!(
                "radius for '{}' must be a finite, non-negative number of kilometers, got {}",
                name, radius_km
            )));
        }

        if !center.latitude.is_finite() || !center.longitude.is_finite() {
            return Err(DomainError::InvalidGeofenceBoundary(format!(
                "center for '{}' must have finite coordinates",
                name
            )));
        }

        Ok(Self {
            name,
            center,
            radius_km,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn center(&self) -> Location {
        self.center
    }

    pub fn radius_km(&self) -> f64 {
        self.radius_km
    }
}

/// Trait for publishing geofence events to the fanout exchange
///
/// Implementations should:
/// - Serialize the event as self-describing JSON
/// - Hand it to the broker without waiting for consumers
/// - Return error if the broker rejects the publish
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait GeofenceEventProducer: Send + Sync {
    async fn publish_event(&self, event: &GeofenceEvent) -> DomainResult<()>;
}

/// Observer of every persisted position; evaluates boundaries and raises alerts
///
/// Never fails: publish problems are logged by the implementation so the
/// ingestion worker keeps draining.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait GeofenceMonitor: Send + Sync {
    async fn observe(&self, report: &PositionReport);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_format() {
        let event = GeofenceEvent {
            vehicle_id: "B1234XYZ".to_string(),
            event: GeofenceEventKind::Entry,
            location: Location::new(-6.2088, 106.8456),
            timestamp: 1715003456,
        };

        let value: serde_json::Value = serde_json::from_slice(&event.encode().unwrap()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "vehicleID": "B1234XYZ",
                "event": "geofence_entry",
                "location": {"latitude": -6.2088, "longitude": 106.8456},
                "timestamp": 1715003456
            })
        );
    }

    #[test]
    fn test_event_decode() {
        let payload = br#"{"vehicleID":"V9","event":"geofence_entry","location":{"latitude":1.5,"longitude":2.5},"timestamp":42}"#;
        let event = GeofenceEvent::decode(payload).unwrap();
        assert_eq!(event.vehicle_id, "V9");
        assert_eq!(event.location, Location::new(1.5, 2.5));
        assert_eq!(event.timestamp, 42);
    }

    #[test]
    fn test_event_decode_rejects_unknown_kind() {
        let payload = br#"{"vehicleID":"V9","event":"geofence_exit","location":{"latitude":1.5,"longitude":2.5},"timestamp":42}"#;
        assert!(matches!(
            GeofenceEvent::decode(payload),
            Err(DomainError::InvalidGeofenceEventPayload(_))
        ));
    }

    #[test]
    fn test_entry_copies_report_fields() {
        let report = PositionReport {
            vehicle_id: "V1".to_string(),
            latitude: 10.0,
            longitude: 20.0,
            timestamp: 99,
        };
        let event = GeofenceEvent::entry(&report);
        assert_eq!(event.vehicle_id, "V1");
        assert_eq!(event.event, GeofenceEventKind::Entry);
        assert_eq!(event.location, Location::new(10.0, 20.0));
        assert_eq!(event.timestamp, 99);
    }

    #[test]
    fn test_boundary_rejects_negative_radius() {
        let result = GeofenceBoundary::new("depot", Location::new(0.0, 0.0), -1.0);
        assert!(matches!(result, Err(DomainError::InvalidGeofenceBoundary(_))));
    }

    #[test]
    fn test_boundary_rejects_nan_center() {
        let result = GeofenceBoundary::new("depot", Location::new(f64::NAN, 0.0), 1.0);
        assert!(result.is_err());
    }

    #[test]
    fn test_boundary_accepts_zero_radius() {
        let boundary = GeofenceBoundary::new("pin", Location::new(1.0, 2.0), 0.0).unwrap();
        assert_eq!(boundary.name(), "pin");
        assert_eq!(boundary.radius_km(), 0.0);
        assert_eq!(boundary.center(), Location::new(1.0, 2.0));
    }
}
