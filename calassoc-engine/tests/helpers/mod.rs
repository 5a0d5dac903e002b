//! Test Helper Utilities
//!
//! Temporary databases, engine wiring and observation builders shared by the
//! calassoc-engine integration tests.

#![allow(dead_code)]

use calassoc_common::db::init_database;
use calassoc_common::observation::{F2Block, GmosBlock, InstrumentBlock};
use calassoc_common::{
    Clock, Instrument, Observation, ObservationClass, ObservationType, RoiSetting,
};
use calassoc_engine::{
    AssociationCache, EngineContext, Evaluator, RefreshQueue, SqliteStore,
};
use chrono::{DateTime, TimeZone, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use tempfile::TempDir;

/// Temporary database with schema and migrations applied
///
/// The `TempDir` must outlive the pool.
pub async fn create_test_db() -> (TempDir, SqlitePool) {
    let temp_dir = TempDir::new().unwrap();
    let pool = init_database(&temp_dir.path().join("calassoc_test.db"))
        .await
        .unwrap();
    (temp_dir, pool)
}

/// Engine wired to a SQLite store, cache and queue on one pool
pub struct TestEngine {
    pub _dir: TempDir,
    pub pool: SqlitePool,
    pub store: Arc<SqliteStore>,
    pub ctx: EngineContext,
}

impl TestEngine {
    pub async fn new() -> Self {
        let (dir, pool) = create_test_db().await;
        let queue = RefreshQueue::new(pool.clone());
        Self::assemble(dir, pool, queue)
    }

    pub async fn with_clock(clock: Arc<dyn Clock>) -> Self {
        let (dir, pool) = create_test_db().await;
        let queue = RefreshQueue::with_clock(pool.clone(), clock);
        Self::assemble(dir, pool, queue)
    }

    fn assemble(dir: TempDir, pool: SqlitePool, queue: RefreshQueue) -> Self {
        let store = Arc::new(SqliteStore::new(pool.clone()));
        let ctx = EngineContext {
            store: store.clone(),
            evaluator: Arc::new(Evaluator::default()),
            cache: AssociationCache::new(pool.clone()),
            queue,
        };
        Self {
            _dir: dir,
            pool,
            store,
            ctx,
        }
    }

    pub async fn seed(&self, observations: &[Observation]) {
        for obs in observations {
            self.store.insert(obs).await.unwrap();
        }
    }
}

pub fn utc(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).unwrap()
}

pub fn gmos_block(obs: &mut Observation) -> &mut GmosBlock {
    if !matches!(obs.block, InstrumentBlock::Gmos(_)) {
        obs.block = InstrumentBlock::Gmos(GmosBlock::default());
    }
    match &mut obs.block {
        InstrumentBlock::Gmos(block) => block,
        _ => unreachable!(),
    }
}

pub fn f2_block(obs: &mut Observation) -> &mut F2Block {
    if !matches!(obs.block, InstrumentBlock::F2(_)) {
        obs.block = InstrumentBlock::F2(F2Block::default());
    }
    match &mut obs.block {
        InstrumentBlock::F2(block) => block,
        _ => unreachable!(),
    }
}

/// GMOS science imaging frame, full-frame readout, 2x2, four amps
pub fn gmos_science(id: i64, instrument: Instrument, at: DateTime<Utc>) -> Observation {
    let mut obs = Observation::new(id, instrument, ObservationType::Object);
    obs.observation_class = Some(ObservationClass::Science);
    obs.object = Some("M51".to_string());
    obs.ut_datetime = Some(at);
    obs.filter_name = Some("r_G0303".to_string());
    obs.focal_plane_mask = Some("Imaging".to_string());
    obs.detector_binning = Some("2x2".to_string());
    obs.detector_roi_setting = Some(RoiSetting::FullFrame);
    gmos_block(&mut obs).amp_read_area = Some("a+b+c+d".to_string());
    obs
}

/// Raw GMOS bias frame
pub fn gmos_bias(
    id: i64,
    instrument: Instrument,
    at: DateTime<Utc>,
    binning: &str,
    amps: &str,
) -> Observation {
    let mut obs = Observation::new(id, instrument, ObservationType::Bias);
    obs.observation_class = Some(ObservationClass::DayCal);
    obs.ut_datetime = Some(at);
    obs.detector_binning = Some(binning.to_string());
    obs.detector_roi_setting = Some(RoiSetting::FullFrame);
    gmos_block(&mut obs).amp_read_area = Some(amps.to_string());
    obs
}

/// F2 frame with a read mode and exposure time
pub fn f2_frame(
    id: i64,
    observation_type: ObservationType,
    at: DateTime<Utc>,
    read_mode: &str,
    exposure_time: f64,
) -> Observation {
    let mut obs = Observation::new(id, Instrument::F2, observation_type);
    obs.ut_datetime = Some(at);
    obs.exposure_time = Some(exposure_time);
    f2_block(&mut obs).read_mode = Some(read_mode.to_string());
    obs
}
