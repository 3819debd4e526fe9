use common::domain::{GeofenceBoundary, GeofenceEvent, Location, PositionReport};

/// Mean Earth radius used for great-circle distances
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two points using the haversine formula
pub fn haversine_distance_km(from: Location, to: Location) -> f64 {
    let lat1 = from.latitude.to_radians();
    let lat2 = to.latitude.to_radians();
    let delta_lat = (to.latitude - from.latitude).to_radians();
    let delta_lon = (to.longitude - from.longitude).to_radians();

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lon / 2.0).sin().powi(2);

    // Rounding can push h just past 1 for antipodal points
    2.0 * EARTH_RADIUS_KM * h.min(1.0).sqrt().asin()
}

/// Emit an entry event when the report lies within the boundary
///
/// The boundary edge counts as inside. Reports with non-finite coordinates
/// never produce an event.
pub fn evaluate(report: &PositionReport, boundary: &GeofenceBoundary) -> Option<GeofenceEvent> {
    let position = Location::new(report.latitude, report.longitude);
    let distance = haversine_distance_km(position, boundary.center());

    if distance.is_finite() && distance <= boundary.radius_km() {
        Some(GeofenceEvent::entry(report))
    } else {
        None
    }
}
