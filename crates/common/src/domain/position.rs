use crate::domain::result::{DomainError, DomainResult};
use crate::garde::validate_struct;
use async_trait::async_trait;
use garde::Validate;
use serde::{Deserialize, Serialize};

/// One vehicle's instantaneous location as reported over the position channel.
///
/// Coordinates are not range-checked: a report at latitude 120 decodes and
/// persists like any other. Only the vehicle id is validated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct PositionReport {
    #[serde(rename = "vehicleID")]
    #[garde(length(min = 1))]
    pub vehicle_id: String,
    #[garde(skip)]
    pub latitude: f64,
    #[garde(skip)]
    pub longitude: f64,
    /// Seconds since the Unix epoch
    #[garde(skip)]
    pub timestamp: i64,
}

impl PositionReport {
    /// Decode a transport payload (UTF-8 JSON) into a report
    ///
    /// Fails on malformed JSON, missing or unknown fields, a non-integer
    /// timestamp, or an empty vehicle id.
    pub fn decode(payload: &[u8]) -> DomainResult<Self> {
        let report: PositionReport = serde_json::from_slice(payload)
            .map_err(|e| DomainError::InvalidPositionPayload(e.to_string()))?;
        validate_struct(&report)?;
        Ok(report)
    }

    /// Encode as the JSON payload published on the position channel
    pub fn encode(&self) -> DomainResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| DomainError::InvalidPositionPayload(e.to_string()))
    }
}

/// Repository trait for position storage
/// Infrastructure layer (e.g., postgres) implements this trait
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait PositionRepository: Send + Sync {
    /// Record one position report
    ///
    /// Runs as a single unit of work: either the row is committed or storage
    /// is left untouched.
    async fn record_position(&self, report: &PositionReport) -> DomainResult<()>;
}

/// Read side of position storage, backing the vehicle query API
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait PositionQueryRepository: Send + Sync {
    /// Most recent report for a vehicle by report timestamp, if any
    async fn latest_position(&self, vehicle_id: &str) -> DomainResult<Option<PositionReport>>;

    /// Reports with `start <= timestamp <= end`, newest first
    async fn position_history(
        &self,
        vehicle_id: &str,
        start: i64,
        end: i64,
    ) -> DomainResult<Vec<PositionReport>>;
}
