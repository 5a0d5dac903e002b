//! Metadata store port
//!
//! The read side of the observation archive as the engine sees it. Rule
//! evaluation produces `QueryPlan`s; a store narrows its candidate pool and
//! applies `QueryPlan::select` to the rest.

mod memory;
mod sqlite;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

use crate::query::QueryPlan;
use async_trait::async_trait;
use calassoc_common::{Instrument, Observation, ObservationId, Result};
use chrono::{DateTime, Duration, Utc};

#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Record by id, canonical or not
    async fn get_observation(&self, id: ObservationId) -> Result<Option<Observation>>;

    /// Ranked candidate ids for a plan
    async fn query(&self, plan: &QueryPlan) -> Result<Vec<ObservationId>>;

    /// Canonical records of `instrument` within `window` of `around`
    ///
    /// Used by ingest to find observations that may adopt a new calibration.
    async fn observations_near(
        &self,
        instrument: &Instrument,
        around: DateTime<Utc>,
        window: Duration,
    ) -> Result<Vec<Observation>>;
}
