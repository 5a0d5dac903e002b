//! Association cache
//!
//! Persistent `(observation_id, category) -> ranked candidate ids` table.
//! An observation's rows are only ever replaced as a whole set, inside one
//! transaction, so readers see either the old or the new set.

use crate::evaluator::Associations;
use crate::rules::Category;
use calassoc_common::db::AssociationRow;
use calassoc_common::{ObservationId, Result};
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct AssociationCache {
    pool: SqlitePool,
}

impl AssociationCache {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Replace every row of `observation_id` with `associations`
    ///
    /// Rows for categories absent from `associations` are removed, including
    /// ones left over from a previous applicability set.
    pub async fn replace_associations(
        &self,
        observation_id: ObservationId,
        associations: &Associations,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let removed = sqlx::query("DELETE FROM association_cache WHERE observation_id = ?")
            .bind(observation_id.0)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let mut inserted = 0usize;
        for (category, candidates) in associations {
            let category = category.to_string();
            for (rank, candidate) in candidates.iter().enumerate() {
                sqlx::query(
                    r#"
                    INSERT INTO association_cache (observation_id, category, rank, candidate_id)
                    VALUES (?, ?, ?, ?)
                    "#,
                )
                .bind(observation_id.0)
                .bind(category.as_str())
                .bind(rank as i64)
                .bind(candidate.0)
                .execute(&mut *tx)
                .await?;
                inserted += 1;
            }
        }

        tx.commit().await?;

        debug!(
            observation_id = %observation_id,
            removed,
            inserted,
            "Associations replaced"
        );
        Ok(())
    }

    /// Candidates for one category, best first
    pub async fn get_associations(
        &self,
        observation_id: ObservationId,
        category: Category,
    ) -> Result<Vec<ObservationId>> {
        let ids: Vec<i64> = sqlx::query_scalar(
            r#"
            SELECT candidate_id FROM association_cache
            WHERE observation_id = ? AND category = ?
            ORDER BY rank ASC
            "#,
        )
        .bind(observation_id.0)
        .bind(category.to_string())
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().map(ObservationId).collect())
    }

    /// Every cached category of an observation
    pub async fn associations_for(&self, observation_id: ObservationId) -> Result<Associations> {
        let mut associations: Associations = BTreeMap::new();
        for row in self.rows(observation_id).await? {
            let category: Category = row.category.parse()?;
            associations
                .entry(category)
                .or_default()
                .push(row.candidate_id);
        }
        Ok(associations)
    }

    /// Observations that currently use `candidate_id` as a `category` calibration
    pub async fn observations_associated_as(
        &self,
        candidate_id: ObservationId,
        category: Category,
    ) -> Result<Vec<ObservationId>> {
        let ids: Vec<i64> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT observation_id FROM association_cache
            WHERE candidate_id = ? AND category = ?
            ORDER BY observation_id
            "#,
        )
        .bind(candidate_id.0)
        .bind(category.to_string())
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().map(ObservationId).collect())
    }

    /// Observations that reference `candidate_id` in any category
    pub async fn observations_referencing(
        &self,
        candidate_id: ObservationId,
    ) -> Result<Vec<ObservationId>> {
        let ids: Vec<i64> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT observation_id FROM association_cache
            WHERE candidate_id = ?
            ORDER BY observation_id
            "#,
        )
        .bind(candidate_id.0)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().map(ObservationId).collect())
    }

    /// Drop every row of an observation; returns the number removed
    pub async fn invalidate(&self, observation_id: ObservationId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM association_cache WHERE observation_id = ?")
            .bind(observation_id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Raw rows of an observation ordered by category then rank
    pub async fn rows(&self, observation_id: ObservationId) -> Result<Vec<AssociationRow>> {
        let rows = sqlx::query_as::<_, (i64, String, i64, i64)>(
            r#"
            SELECT observation_id, category, rank, candidate_id
            FROM association_cache
            WHERE observation_id = ?
            ORDER BY category ASC, rank ASC
            "#,
        )
        .bind(observation_id.0)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| AssociationRow {
                observation_id: ObservationId(row.0),
                category: row.1,
                rank: row.2,
                candidate_id: ObservationId(row.3),
            })
            .collect())
    }

    /// Every row in the cache, for snapshots and consistency checks
    pub async fn all_rows(&self) -> Result<Vec<AssociationRow>> {
        let rows = sqlx::query_as::<_, (i64, String, i64, i64)>(
            r#"
            SELECT observation_id, category, rank, candidate_id
            FROM association_cache
            ORDER BY observation_id ASC, category ASC, rank ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| AssociationRow {
                observation_id: ObservationId(row.0),
                category: row.1,
                rank: row.2,
                candidate_id: ObservationId(row.3),
            })
            .collect())
    }
}
