//! Database schema migrations
//!
//! Versioned, idempotent upgrades tracked in the `schema_version` table.
//! Never modify an existing migration; add a new one and bump
//! `CURRENT_SCHEMA_VERSION`.

use crate::Result;
use sqlx::SqlitePool;
use tracing::{info, warn};

/// Current schema version
///
/// **IMPORTANT:** Increment this when adding new migrations
pub const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Current schema version recorded in the database, 0 when none
pub async fn get_schema_version(pool: &SqlitePool) -> Result<i32> {
    let table_exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM sqlite_master
            WHERE type='table' AND name='schema_version'
        )
        "#,
    )
    .fetch_one(pool)
    .await?;

    if !table_exists {
        return Ok(0);
    }

    let version: Option<i32> =
        sqlx::query_scalar("SELECT version FROM schema_version ORDER BY version DESC LIMIT 1")
            .fetch_optional(pool)
            .await?;

    Ok(version.unwrap_or(0))
}

async fn set_schema_version(pool: &SqlitePool, version: i32) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;

    Ok(())
}

/// Run all pending migrations
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    let current_version = get_schema_version(pool).await?;

    if current_version == CURRENT_SCHEMA_VERSION {
        info!("Database schema is up to date (v{})", current_version);
        return Ok(());
    }

    if current_version > CURRENT_SCHEMA_VERSION {
        warn!(
            "Database schema version ({}) is newer than code version ({})",
            current_version, CURRENT_SCHEMA_VERSION
        );
        return Ok(());
    }

    info!(
        "Running database migrations: v{} -> v{}",
        current_version, CURRENT_SCHEMA_VERSION
    );

    if current_version < 1 {
        migrate_v1(pool).await?;
        set_schema_version(pool, 1).await?;
        info!("Migration v1 completed");
    }

    if current_version < 2 {
        migrate_v2(pool).await?;
        set_schema_version(pool, 2).await?;
        info!("Migration v2 completed");
    }

    Ok(())
}

/// Migration v1: claim ownership columns on refresh_queue
///
/// Early queues recorded only `in_progress`. The reaper needs to know when a
/// claim was taken and by which worker.
async fn migrate_v1(pool: &SqlitePool) -> Result<()> {
    for column in ["claimed_at", "claimed_by"] {
        let has_column: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM pragma_table_info('refresh_queue') WHERE name = ?",
        )
        .bind(column)
        .fetch_one(pool)
        .await?;

        if has_column > 0 {
            continue;
        }

        let sql = format!("ALTER TABLE refresh_queue ADD COLUMN {} TEXT", column);
        match sqlx::query(&sql).execute(pool).await {
            Ok(_) => info!("  Added {} column to refresh_queue", column),
            Err(sqlx::Error::Database(db_err)) if db_err.message().contains("duplicate column") => {
                info!("  {} column added by concurrent initializer - skipping", column);
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// Migration v2: at most one pending entry per observation
///
/// Collapses existing duplicate pending entries onto the oldest one before
/// adding the partial unique index.
async fn migrate_v2(pool: &SqlitePool) -> Result<()> {
    let removed = sqlx::query(
        r#"
        DELETE FROM refresh_queue
        WHERE in_progress = 0 AND failed = 0
          AND id NOT IN (
              SELECT MIN(id) FROM refresh_queue
              WHERE in_progress = 0 AND failed = 0
              GROUP BY observation_id
          )
        "#,
    )
    .execute(pool)
    .await?
    .rows_affected();

    if removed > 0 {
        info!("  Collapsed {} duplicate pending queue entries", removed);
    }

    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_refresh_queue_pending
         ON refresh_queue(observation_id)
         WHERE in_progress = 0 AND failed = 0",
    )
    .execute(pool)
    .await?;

    Ok(())
}
