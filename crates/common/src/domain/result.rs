use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Invalid position payload: {0}")]
    InvalidPositionPayload(String),

    #[error("Invalid geofence event payload: {0}")]
    InvalidGeofenceEventPayload(String),

    #[error("Invalid geofence boundary: {0}")]
    InvalidGeofenceBoundary(String),

    #[error("Failed to persist position for vehicle {vehicle_id}: {source}")]
    PositionPersistenceFailed {
        vehicle_id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to publish geofence event for vehicle {vehicle_id}: {source}")]
    EventPublishFailed {
        vehicle_id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Alert handling failed: {0}")]
    AlertHandlingFailed(String),

    #[error("Repository error: {0}")]
    RepositoryError(#[from] anyhow::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),
}
