//! Database models

use crate::observation::ObservationId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One row of `association_cache`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociationRow {
    pub observation_id: ObservationId,
    pub category: String,
    pub rank: i64,
    pub candidate_id: ObservationId,
}

/// One row of `refresh_queue`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: i64,
    pub observation_id: ObservationId,
    pub enqueued_at: DateTime<Utc>,
    pub in_progress: bool,
    pub failed: bool,
    pub last_error: Option<String>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub claimed_by: Option<String>,
}
