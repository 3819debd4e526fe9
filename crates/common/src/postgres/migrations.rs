use crate::postgres::PostgresClient;
use anyhow::{Context, Result};
use std::collections::HashSet;
use tracing::{debug, info, instrument};

/// A versioned schema change compiled into the binary
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: i64,
    pub name: &'static str,
    pub sql: &'static str,
}

/// Schema migrations in application order
pub const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "vehicle_locations",
    sql: include_str!("../../migrations/0001_vehicle_locations.sql"),
}];

const CREATE_SCHEMA_MIGRATIONS: &str = "CREATE TABLE IF NOT EXISTS schema_migrations (
    version BIGINT PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at TIMESTAMPTZ NOT NULL DEFAULT now()
)";

/// Applies pending migrations, each in its own transaction
///
/// Returns the number of migrations applied by this call.
#[instrument(skip_all)]
pub async fn run_migrations(client: &PostgresClient) -> Result<usize> {
    let mut conn = client.get_connection().await?;

    conn.batch_execute(CREATE_SCHEMA_MIGRATIONS)
        .await
        .context("Failed to create schema_migrations table")?;

    let applied: HashSet<i64> = conn
        .query("SELECT version FROM schema_migrations", &[])
        .await
        .context("Failed to read applied migrations")?
        .iter()
        .map(|row| row.get(0))
        .collect();

    let mut count = 0;
    for migration in pending(MIGRATIONS, &applied) {
        let tx = conn.transaction().await?;

        tx.batch_execute(migration.sql).await.with_context(|| {
            format!(
                "Migration {} ({}) failed",
                migration.version, migration.name
            )
        })?;
        tx.execute(
            "INSERT INTO schema_migrations (version, name) VALUES ($1, $2)",
            &[&migration.version, &migration.name],
        )
        .await?;
        tx.commit().await?;

        info!(
            version = migration.version,
            name = migration.name,
            "applied migration"
        );
        count += 1;
    }

    debug!(applied = count, "migrations up to date");
    Ok(count)
}

fn pending<'a>(
    migrations: &'a [Migration],
    applied: &'a HashSet<i64>,
) -> impl Iterator<Item = &'a Migration> {
    migrations
        .iter()
        .filter(move |m| !applied.contains(&m.version))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_versions_are_strictly_increasing() {
        let versions: Vec<i64> = MIGRATIONS.iter().map(|m| m.version).collect();
        assert!(versions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_vehicle_locations_migration_creates_query_index() {
        let sql = MIGRATIONS[0].sql;
        assert!(sql.contains("CREATE TABLE IF NOT EXISTS vehicle_locations"));
        assert!(sql.contains("(vehicle_id, timestamp DESC)"));
    }

    #[test]
    fn test_pending_skips_applied_versions() {
        let migrations = [
            Migration {
                version: 1,
                name: "first",
                sql: "",
            },
            Migration {
                version: 2,
                name: "second",
                sql: "",
            },
        ];
        let applied: HashSet<i64> = [1].into_iter().collect();

        let names: Vec<&str> = pending(&migrations, &applied).map(|m| m.name).collect();
        assert_eq!(names, vec!["second"]);
    }
}
