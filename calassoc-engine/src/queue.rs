//! Durable refresh queue
//!
//! FIFO of observation ids whose cache rows must be recomputed. At most one
//! pending entry exists per observation (enforced by a partial unique index).
//! Entries move pending -> in progress -> deleted, or in progress -> failed.
//! Failed entries stay for operator inspection.

use calassoc_common::db::QueueEntry;
use calassoc_common::time::{format_utc, parse_utc};
use calassoc_common::{Clock, ObservationId, Result, SystemClock};
use chrono::Duration;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{debug, info};

const ENTRY_COLUMNS: &str =
    "id, observation_id, enqueued_at, in_progress, failed, last_error, claimed_at, claimed_by";

type EntryRow = (
    i64,
    i64,
    String,
    bool,
    bool,
    Option<String>,
    Option<String>,
    Option<String>,
);

fn entry_from_row(row: EntryRow) -> Result<QueueEntry> {
    Ok(QueueEntry {
        id: row.0,
        observation_id: ObservationId(row.1),
        enqueued_at: parse_utc(&row.2)?,
        in_progress: row.3,
        failed: row.4,
        last_error: row.5,
        claimed_at: row.6.as_deref().map(parse_utc).transpose()?,
        claimed_by: row.7,
    })
}

#[derive(Clone)]
pub struct RefreshQueue {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for RefreshQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshQueue").finish_non_exhaustive()
    }
}

impl RefreshQueue {
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_clock(pool, Arc::new(SystemClock))
    }

    pub fn with_clock(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    /// Add a pending entry; `false` if one was already pending
    pub async fn enqueue(&self, observation_id: ObservationId) -> Result<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO refresh_queue (observation_id, enqueued_at) VALUES (?, ?)",
        )
        .bind(observation_id.0)
        .bind(format_utc(&self.clock.now()))
        .execute(&self.pool)
        .await?;

        let added = result.rows_affected() == 1;
        debug!(observation_id = %observation_id, added, "Enqueue");
        Ok(added)
    }

    /// Enqueue several observations; returns how many new entries were added
    pub async fn enqueue_all(
        &self,
        observation_ids: impl IntoIterator<Item = ObservationId>,
    ) -> Result<usize> {
        let mut added = 0;
        for id in observation_ids {
            if self.enqueue(id).await? {
                added += 1;
            }
        }
        Ok(added)
    }

    /// Atomically claim the oldest pending entry
    ///
    /// Entries whose observation already has an in-progress entry are
    /// skipped. A single UPDATE ... RETURNING, so two workers can never
    /// claim the same row.
    pub async fn claim_next(&self, worker_id: &str) -> Result<Option<QueueEntry>> {
        let sql = format!(
            r#"
            UPDATE refresh_queue
            SET in_progress = 1, claimed_at = ?, claimed_by = ?
            WHERE id = (
                SELECT q.id FROM refresh_queue q
                WHERE q.in_progress = 0 AND q.failed = 0
                  AND NOT EXISTS (
                      SELECT 1 FROM refresh_queue r
                      WHERE r.observation_id = q.observation_id AND r.in_progress = 1
                  )
                ORDER BY q.enqueued_at ASC, q.id ASC
                LIMIT 1
            )
            RETURNING {}
            "#,
            ENTRY_COLUMNS
        );

        let row = sqlx::query_as::<_, EntryRow>(&sql)
            .bind(format_utc(&self.clock.now()))
            .bind(worker_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(entry_from_row).transpose()
    }

    /// Delete a processed entry still claimed by `worker_id`
    ///
    /// Returns `false` when the claim was lost (reaped and possibly claimed
    /// by another worker); the entry is left alone in that case.
    pub async fn complete(&self, entry_id: i64, worker_id: &str) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM refresh_queue WHERE id = ? AND in_progress = 1 AND claimed_by = ?",
        )
        .bind(entry_id)
        .bind(worker_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Mark an entry claimed by `worker_id` failed and keep its error text
    ///
    /// Returns `false` when the claim was lost.
    pub async fn fail(&self, entry_id: i64, worker_id: &str, error: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_queue
            SET in_progress = 0, failed = 1, last_error = ?
            WHERE id = ? AND in_progress = 1 AND claimed_by = ?
            "#,
        )
        .bind(error)
        .bind(entry_id)
        .bind(worker_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Return claims older than `timeout` to pending
    ///
    /// A stale claim whose observation already has a pending entry is
    /// dropped instead. Returns the number of entries recovered.
    pub async fn reap_stale(&self, timeout: Duration) -> Result<u64> {
        let cutoff = format_utc(&(self.clock.now() - timeout));
        let mut tx = self.pool.begin().await?;

        let dropped = sqlx::query(
            r#"
            DELETE FROM refresh_queue
            WHERE in_progress = 1
              AND (claimed_at IS NULL OR claimed_at < ?)
              AND EXISTS (
                  SELECT 1 FROM refresh_queue p
                  WHERE p.observation_id = refresh_queue.observation_id
                    AND p.in_progress = 0 AND p.failed = 0
              )
            "#,
        )
        .bind(cutoff.as_str())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let released = sqlx::query(
            r#"
            UPDATE refresh_queue
            SET in_progress = 0, claimed_at = NULL, claimed_by = NULL
            WHERE in_progress = 1 AND (claimed_at IS NULL OR claimed_at < ?)
            "#,
        )
        .bind(cutoff.as_str())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;

        let recovered = dropped + released;
        if recovered > 0 {
            info!(released, dropped, "Recovered stale queue claims");
        }
        Ok(recovered)
    }

    /// Failed entries, oldest first
    pub async fn list_failed(&self) -> Result<Vec<QueueEntry>> {
        let sql = format!(
            "SELECT {} FROM refresh_queue WHERE failed = 1 ORDER BY enqueued_at ASC, id ASC",
            ENTRY_COLUMNS
        );
        let rows = sqlx::query_as::<_, EntryRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(entry_from_row).collect()
    }

    /// Move failed entries back to pending
    ///
    /// Failures for an observation that is already pending are discarded.
    /// Returns the number of entries made pending again.
    pub async fn retry_failed(&self) -> Result<u64> {
        let now = format_utc(&self.clock.now());
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            DELETE FROM refresh_queue
            WHERE failed = 1
              AND (
                  EXISTS (
                      SELECT 1 FROM refresh_queue p
                      WHERE p.observation_id = refresh_queue.observation_id
                        AND p.in_progress = 0 AND p.failed = 0
                  )
                  OR id NOT IN (
                      SELECT MIN(id) FROM refresh_queue WHERE failed = 1 GROUP BY observation_id
                  )
              )
            "#,
        )
        .execute(&mut *tx)
        .await?;

        let retried = sqlx::query(
            r#"
            UPDATE refresh_queue
            SET failed = 0, in_progress = 0, last_error = NULL,
                claimed_at = NULL, claimed_by = NULL, enqueued_at = ?
            WHERE failed = 1
            "#,
        )
        .bind(now.as_str())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;

        if retried > 0 {
            info!(retried, "Failed queue entries returned to pending");
        }
        Ok(retried)
    }

    pub async fn pending_count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM refresh_queue WHERE in_progress = 0 AND failed = 0",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    pub async fn in_progress_count(&self) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM refresh_queue WHERE in_progress = 1")
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    pub async fn get(&self, entry_id: i64) -> Result<Option<QueueEntry>> {
        let sql = format!("SELECT {} FROM refresh_queue WHERE id = ?", ENTRY_COLUMNS);
        let row = sqlx::query_as::<_, EntryRow>(&sql)
            .bind(entry_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(entry_from_row).transpose()
    }
}
