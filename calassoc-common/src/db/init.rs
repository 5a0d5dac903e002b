//! Database initialization
//!
//! Creates the database file on first run, applies connection pragmas, creates
//! tables idempotently and then runs versioned migrations.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Busy timeout applied to every connection
const BUSY_TIMEOUT_MS: u32 = 5000;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(16)
        .min_connections(2)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                // Per-connection pragmas; the pool may open connections later
                sqlx::query("PRAGMA foreign_keys = ON").execute(&mut *conn).await?;
                sqlx::query(&format!("PRAGMA busy_timeout = {}", BUSY_TIMEOUT_MS))
                    .execute(&mut *conn)
                    .await?;
                Ok(())
            })
        })
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // WAL allows concurrent readers with one writer; persists in the file
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;

    create_schema_version_table(&pool).await?;
    create_observations_table(&pool).await?;
    create_association_cache_table(&pool).await?;
    create_refresh_queue_table(&pool).await?;

    crate::db::migrations::run_migrations(&pool).await?;

    Ok(pool)
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Observation read model
///
/// Common attributes are columns so the store can push instrument, canonical,
/// QA and time-window filters into SQL. The instrument block and type tags are
/// JSON text. `ut_datetime` only accepts the fixed-width UTC form, since the
/// window pushdown compares it as text.
pub async fn create_observations_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS observations (
            id INTEGER PRIMARY KEY,
            data_label TEXT,
            instrument TEXT NOT NULL,
            observation_type TEXT NOT NULL,
            observation_class TEXT,
            spectroscopy INTEGER NOT NULL DEFAULT 0,
            object TEXT,
            ut_datetime TEXT CHECK (
                ut_datetime IS NULL
                OR ut_datetime GLOB
                   '[0-9][0-9][0-9][0-9]-[0-9][0-9]-[0-9][0-9]T[0-9][0-9]:[0-9][0-9]:[0-9][0-9].[0-9][0-9][0-9][0-9][0-9][0-9]Z'
            ),
            exposure_time REAL,
            central_wavelength REAL,
            filter_name TEXT,
            disperser TEXT,
            focal_plane_mask TEXT,
            detector_roi_setting TEXT,
            detector_binning TEXT,
            elevation REAL,
            cass_rotator_pa REAL,
            gcal_lamp TEXT,
            program_id TEXT,
            types TEXT NOT NULL DEFAULT '[]',
            reduction_state TEXT NOT NULL DEFAULT 'RAW',
            qa_state TEXT NOT NULL DEFAULT 'Undefined',
            canonical INTEGER NOT NULL DEFAULT 1,
            instrument_block TEXT NOT NULL DEFAULT '{"block":"None"}'
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_observations_candidates
         ON observations(instrument, canonical, ut_datetime)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_observations_canonical_label
         ON observations(data_label)
         WHERE canonical = 1 AND data_label IS NOT NULL",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Association cache: ranked candidate list per (observation, category)
pub async fn create_association_cache_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS association_cache (
            observation_id INTEGER NOT NULL,
            category TEXT NOT NULL,
            rank INTEGER NOT NULL CHECK (rank >= 0),
            candidate_id INTEGER NOT NULL,
            PRIMARY KEY (observation_id, category, rank)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_association_cache_candidate
         ON association_cache(candidate_id, category)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Durable refresh queue
pub async fn create_refresh_queue_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS refresh_queue (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            observation_id INTEGER NOT NULL,
            enqueued_at TEXT NOT NULL,
            in_progress INTEGER NOT NULL DEFAULT 0,
            failed INTEGER NOT NULL DEFAULT 0,
            last_error TEXT,
            claimed_at TEXT,
            claimed_by TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_refresh_queue_state
         ON refresh_queue(in_progress, failed, enqueued_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
