//! In-memory metadata store
//!
//! Holds records in an ordered map. Used by tests and by batch tools that load
//! a slice of the archive up front.

use super::MetadataStore;
use crate::query::QueryPlan;
use async_trait::async_trait;
use calassoc_common::{Error, Instrument, Observation, ObservationId, Result};
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct InMemoryStore {
    records: RwLock<BTreeMap<ObservationId, Observation>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_observations(observations: impl IntoIterator<Item = Observation>) -> Self {
        let records = observations.into_iter().map(|o| (o.id, o)).collect();
        Self {
            records: RwLock::new(records),
        }
    }

    /// Insert or replace a record
    pub async fn insert(&self, observation: Observation) {
        self.records.write().await.insert(observation.id, observation);
    }

    pub async fn remove(&self, id: ObservationId) -> Option<Observation> {
        self.records.write().await.remove(&id)
    }

    pub async fn set_canonical(&self, id: ObservationId, canonical: bool) -> Result<()> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("observation {}", id)))?;
        record.canonical = canonical;
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl MetadataStore for InMemoryStore {
    async fn get_observation(&self, id: ObservationId) -> Result<Option<Observation>> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn query(&self, plan: &QueryPlan) -> Result<Vec<ObservationId>> {
        let records = self.records.read().await;
        let pool = records
            .values()
            .filter(|o| o.instrument.as_str() == plan.instrument())
            .cloned();
        Ok(plan.select(pool))
    }

    async fn observations_near(
        &self,
        instrument: &Instrument,
        around: DateTime<Utc>,
        window: Duration,
    ) -> Result<Vec<Observation>> {
        let (lower, upper) = (around - window, around + window);
        let records = self.records.read().await;
        Ok(records
            .values()
            .filter(|o| o.canonical && &o.instrument == instrument)
            .filter(|o| o.ut_datetime.is_some_and(|t| t >= lower && t <= upper))
            .cloned()
            .collect())
    }
}
