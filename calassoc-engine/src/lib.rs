//! # Calibration Association Engine (calassoc-engine)
//!
//! Decides which calibration categories apply to an observation, finds the
//! best-matching calibration frames for each, and keeps the results in a
//! persistent association cache.
//!
//! **Pieces:**
//! - `query`: chainable candidate-lookup builder and executable plans
//! - `rules`: one rule module per instrument family plus the registry
//! - `evaluator`: dispatcher running applicable lookups against a store
//! - `cache`: `(observation, category) -> ranked candidates` table
//! - `queue` / `worker`: durable refresh queue, worker pool and reaper
//! - `ingest`: hooks deciding what to enqueue when records change

pub mod cache;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod ingest;
pub mod query;
pub mod queue;
pub mod rules;
pub mod store;
pub mod worker;

pub use cache::AssociationCache;
pub use config::{EngineSettings, WorkerSettings};
pub use error::{EvalError, EvalResult};
pub use evaluator::{Associations, Evaluator, Limits};
pub use ingest::IngestHooks;
pub use queue::RefreshQueue;
pub use rules::{CalKind, Category, Registry};
pub use store::{InMemoryStore, MetadataStore, SqliteStore};
pub use worker::{DrainStats, EngineContext, Outcome, RefreshWorker, WorkerPool};
