use crate::domain::{
    DomainError, DomainResult, PositionQueryRepository, PositionReport, PositionRepository,
};
use crate::postgres::PostgresClient;
use anyhow::Context;
use async_trait::async_trait;
use tokio_postgres::Row;
use tracing::{debug, instrument};

/// PostgreSQL implementation of the position write and query traits
#[derive(Clone)]
pub struct PostgresPositionRepository {
    client: PostgresClient,
}

impl PostgresPositionRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PositionRepository for PostgresPositionRepository {
    #[instrument(skip(self, report), fields(vehicle_id = %report.vehicle_id))]
    async fn record_position(&self, report: &PositionReport) -> DomainResult<()> {
        let persistence_failed = |source: anyhow::Error| DomainError::PositionPersistenceFailed {
            vehicle_id: report.vehicle_id.clone(),
            source,
        };

        let mut conn = self
            .client
            .get_connection()
            .await
            .map_err(persistence_failed)?;

        // Rolled back on drop unless committed
        let tx = conn
            .transaction()
            .await
            .map_err(|e| persistence_failed(e.into()))?;

        tx.execute(
            "INSERT INTO vehicle_locations (vehicle_id, latitude, longitude, timestamp)
             VALUES ($1, $2, $3, $4)",
            &[
                &report.vehicle_id,
                &report.latitude,
                &report.longitude,
                &report.timestamp,
            ],
        )
        .await
        .map_err(|e| persistence_failed(e.into()))?;

        tx.commit()
            .await
            .map_err(|e| persistence_failed(e.into()))?;

        debug!(
            latitude = report.latitude,
            longitude = report.longitude,
            timestamp = report.timestamp,
            "recorded vehicle position"
        );
        Ok(())
    }
}

fn report_from_row(row: &Row) -> PositionReport {
    PositionReport {
        vehicle_id: row.get("vehicle_id"),
        latitude: row.get("latitude"),
        longitude: row.get("longitude"),
        timestamp: row.get("timestamp"),
    }
}

#[async_trait]
impl PositionQueryRepository for PostgresPositionRepository {
    #[instrument(skip(self))]
    async fn latest_position(&self, vehicle_id: &str) -> DomainResult<Option<PositionReport>> {
        let conn = self.client.get_connection().await?;

        let row = conn
            .query_opt(
                "SELECT vehicle_id, latitude, longitude, timestamp
                 FROM vehicle_locations
                 WHERE vehicle_id = $1
                 ORDER BY timestamp DESC
                 LIMIT 1",
                &[&vehicle_id],
            )
            .await
            .context("Failed to query latest vehicle position")?;

        Ok(row.as_ref().map(report_from_row))
    }

    #[instrument(skip(self))]
    async fn position_history(
        &self,
        vehicle_id: &str,
        start: i64,
        end: i64,
    ) -> DomainResult<Vec<PositionReport>> {
        let conn = self.client.get_connection().await?;

        let rows = conn
            .query(
                "SELECT vehicle_id, latitude, longitude, timestamp
                 FROM vehicle_locations
                 WHERE vehicle_id = $1 AND timestamp BETWEEN $2 AND $3
                 ORDER BY timestamp DESC",
                &[&vehicle_id, &start, &end],
            )
            .await
            .context("Failed to query vehicle position history")?;

        debug!(rows = rows.len(), "loaded vehicle position history");
        Ok(rows.iter().map(report_from_row).collect())
    }
}
