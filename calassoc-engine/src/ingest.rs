//! Ingest hooks
//!
//! Called by the ingest collaborator after it has written to the metadata
//! store. The hooks only decide what to enqueue; workers do the rest.

use crate::query::Lookup;
use crate::worker::EngineContext;
use calassoc_common::{Observation, ObservationId, Result};
use chrono::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct IngestHooks {
    ctx: EngineContext,
}

impl IngestHooks {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    /// A new canonical record appeared
    ///
    /// Enqueues the record itself and every canonical observation of the same
    /// instrument within its module's reverse window with at least one
    /// category lookup that admits the new record. Returns the number of
    /// entries added.
    pub async fn observation_added(&self, observation: &Observation) -> Result<usize> {
        let mut added = usize::from(self.ctx.queue.enqueue(observation.id).await?);

        if !observation.is_candidate() {
            return Ok(added);
        }
        let Some(around) = observation.ut_datetime else {
            debug!(
                observation_id = %observation.id,
                "No ut_datetime, neighbours not enqueued"
            );
            return Ok(added);
        };

        let module = self.ctx.evaluator.module_for(observation);
        if module.reverse_window_days <= 0 {
            return Ok(added);
        }

        let neighbours = self
            .ctx
            .store
            .observations_near(
                &observation.instrument,
                around,
                Duration::days(module.reverse_window_days),
            )
            .await?;

        let scanned = neighbours.len();
        let affected: Vec<ObservationId> = neighbours
            .iter()
            .filter(|o| o.id != observation.id)
            .filter(|o| self.could_adopt(o, observation))
            .map(|o| o.id)
            .collect();
        added += self.ctx.queue.enqueue_all(affected).await?;

        info!(
            observation_id = %observation.id,
            module = module.name,
            scanned,
            enqueued = added,
            "Observation added"
        );
        Ok(added)
    }

    /// Whether any applicable lookup of `neighbour` admits `candidate`
    ///
    /// A lookup that cannot be built counts as a match so the worker records
    /// the failure on the neighbour's entry.
    fn could_adopt(&self, neighbour: &Observation, candidate: &Observation) -> bool {
        let evaluator = &self.ctx.evaluator;
        let (module, descriptors) = evaluator.descriptors(neighbour);
        let (_, categories) = evaluator.applicable(neighbour);
        categories.into_iter().any(|category| {
            match evaluator.lookup(module, &descriptors, category, None) {
                Ok(Lookup::Query(plan)) => plan.admits(candidate),
                Ok(Lookup::Empty) => false,
                Err(e) => {
                    debug!(
                        observation_id = %neighbour.id,
                        category = %category,
                        error = %e,
                        "Lookup failed, enqueueing anyway"
                    );
                    true
                }
            }
        })
    }

    /// A record stopped being canonical or was deleted
    ///
    /// Its own rows are dropped immediately and every observation that
    /// currently uses it as a calibration is enqueued.
    pub async fn observation_withdrawn(&self, observation_id: ObservationId) -> Result<usize> {
        self.ctx.cache.invalidate(observation_id).await?;

        let mut added = usize::from(self.ctx.queue.enqueue(observation_id).await?);
        let referencing = self
            .ctx
            .cache
            .observations_referencing(observation_id)
            .await?;
        let dependants = referencing.len();
        added += self.ctx.queue.enqueue_all(referencing).await?;

        info!(
            observation_id = %observation_id,
            dependants,
            enqueued = added,
            "Observation withdrawn"
        );
        Ok(added)
    }

    /// `new` replaced `old` as the canonical version of a file
    pub async fn observation_superseded(
        &self,
        old: ObservationId,
        new: &Observation,
    ) -> Result<usize> {
        let withdrawn = self.observation_withdrawn(old).await?;
        let added = self.observation_added(new).await?;
        Ok(withdrawn + added)
    }
}
