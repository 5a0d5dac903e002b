//! SQLite-backed metadata store
//!
//! Reads the `observations` table. Instrument, canonical, QA, time window and
//! any pinned observation type / reduction state / class are pushed into SQL;
//! the remaining predicates run in `QueryPlan::select`.

use super::MetadataStore;
use crate::query::QueryPlan;
use async_trait::async_trait;
use calassoc_common::db::{
    load_observation, observation_from_row, save_observation, set_canonical, OBSERVATION_COLUMNS,
};
use calassoc_common::time::format_utc;
use calassoc_common::{Descriptor, Error, Instrument, Observation, ObservationId, Result};
use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;
use tracing::debug;

/// Text columns a plan may pin with a top-level equality
const PUSHDOWN_COLUMNS: &[(Descriptor, &str)] = &[
    (Descriptor::ObservationType, "observation_type"),
    (Descriptor::ReductionState, "reduction_state"),
    (Descriptor::ObservationClass, "observation_class"),
];

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert or replace a record
    pub async fn insert(&self, observation: &Observation) -> Result<()> {
        save_observation(&self.pool, observation).await
    }

    pub async fn set_canonical(&self, id: ObservationId, canonical: bool) -> Result<()> {
        if set_canonical(&self.pool, id, canonical).await? {
            Ok(())
        } else {
            Err(Error::NotFound(format!("observation {}", id)))
        }
    }

    /// Retire `old` and store `new` as the canonical record, in one transaction
    pub async fn supersede(&self, old: ObservationId, new: &Observation) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        set_canonical(&mut *tx, old, false).await?;
        save_observation(&mut *tx, new).await?;
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn get_observation(&self, id: ObservationId) -> Result<Option<Observation>> {
        load_observation(&self.pool, id).await
    }

    async fn query(&self, plan: &QueryPlan) -> Result<Vec<ObservationId>> {
        let mut sql = format!(
            "SELECT {} FROM observations \
             WHERE instrument = ? AND canonical = 1 AND qa_state != 'Fail' AND id != ?",
            OBSERVATION_COLUMNS
        );
        let mut binds: Vec<String> = Vec::new();

        let bounds = plan.time_bounds();
        if bounds.is_some() {
            sql.push_str(" AND ut_datetime >= ? AND ut_datetime <= ?");
        }

        for (descriptor, column) in PUSHDOWN_COLUMNS {
            if let Some(text) = plan.pinned_text(*descriptor) {
                sql.push_str(&format!(" AND {} = ?", column));
                binds.push(text.to_string());
            }
        }

        let mut query = sqlx::query(&sql)
            .bind(plan.instrument())
            .bind(plan.reference_id().0);
        if let Some((lower, upper)) = bounds {
            query = query.bind(format_utc(&lower)).bind(format_utc(&upper));
        }
        for value in &binds {
            query = query.bind(value.as_str());
        }

        let rows = query.fetch_all(&self.pool).await?;
        let pool = rows
            .iter()
            .map(observation_from_row)
            .collect::<Result<Vec<_>>>()?;
        debug!(
            instrument = plan.instrument(),
            prefiltered = pool.len(),
            "Candidate pool loaded"
        );

        Ok(plan.select(pool))
    }

    async fn observations_near(
        &self,
        instrument: &Instrument,
        around: DateTime<Utc>,
        window: Duration,
    ) -> Result<Vec<Observation>> {
        let sql = format!(
            "SELECT {} FROM observations \
             WHERE instrument = ? AND canonical = 1 AND ut_datetime >= ? AND ut_datetime <= ? \
             ORDER BY id",
            OBSERVATION_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(instrument.as_str())
            .bind(format_utc(&(around - window)))
            .bind(format_utc(&(around + window)))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(observation_from_row).collect()
    }
}
