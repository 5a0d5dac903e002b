//! Observation record persistence
//!
//! Mapping between `Observation` and the `observations` table. Writes belong
//! to the ingest collaborator; the engine only reads.

use crate::observation::{
    GcalLamp, Instrument, InstrumentBlock, Observation, ObservationClass, ObservationId,
    ObservationType, QaState, ReductionState, RoiSetting,
};
use crate::time::{format_utc, parse_utc};
use crate::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteExecutor, SqlitePool};
use std::collections::BTreeSet;
use std::str::FromStr;

/// Column list shared by every observation SELECT
pub const OBSERVATION_COLUMNS: &str = "id, data_label, instrument, observation_type, \
    observation_class, spectroscopy, object, ut_datetime, exposure_time, central_wavelength, \
    filter_name, disperser, focal_plane_mask, detector_roi_setting, detector_binning, elevation, \
    cass_rotator_pa, gcal_lamp, program_id, types, reduction_state, qa_state, canonical, \
    instrument_block";

fn parse_enum<T: FromStr<Err = Error>>(text: Option<String>) -> Result<Option<T>> {
    text.map(|t| t.parse()).transpose()
}

fn required<T: FromStr<Err = Error>>(row: &SqliteRow, column: &str) -> Result<T> {
    let text: String = row.try_get(column)?;
    text.parse()
}

/// Decode one `observations` row
pub fn observation_from_row(row: &SqliteRow) -> Result<Observation> {
    let ut_datetime = row
        .try_get::<Option<String>, _>("ut_datetime")?
        .map(|t| parse_utc(&t))
        .transpose()?;
    let types: BTreeSet<String> = serde_json::from_str(&row.try_get::<String, _>("types")?)?;
    let block: InstrumentBlock =
        serde_json::from_str(&row.try_get::<String, _>("instrument_block")?)?;

    Ok(Observation {
        id: ObservationId(row.try_get("id")?),
        data_label: row.try_get("data_label")?,
        instrument: Instrument::from(row.try_get::<String, _>("instrument")?),
        observation_type: required::<ObservationType>(row, "observation_type")?,
        observation_class: parse_enum::<ObservationClass>(row.try_get("observation_class")?)?,
        spectroscopy: row.try_get::<i64, _>("spectroscopy")? != 0,
        object: row.try_get("object")?,
        ut_datetime,
        exposure_time: row.try_get("exposure_time")?,
        central_wavelength: row.try_get("central_wavelength")?,
        filter_name: row.try_get("filter_name")?,
        disperser: row.try_get("disperser")?,
        focal_plane_mask: row.try_get("focal_plane_mask")?,
        detector_roi_setting: parse_enum::<RoiSetting>(row.try_get("detector_roi_setting")?)?,
        detector_binning: row.try_get("detector_binning")?,
        elevation: row.try_get("elevation")?,
        cass_rotator_pa: row.try_get("cass_rotator_pa")?,
        gcal_lamp: row
            .try_get::<Option<String>, _>("gcal_lamp")?
            .map(GcalLamp::from),
        program_id: row.try_get("program_id")?,
        types,
        reduction_state: required::<ReductionState>(row, "reduction_state")?,
        qa_state: required::<QaState>(row, "qa_state")?,
        canonical: row.try_get::<i64, _>("canonical")? != 0,
        block,
    })
}

/// Insert or replace an observation record
pub async fn save_observation<'e, E>(executor: E, obs: &Observation) -> Result<()>
where
    E: SqliteExecutor<'e>,
{
    let types = serde_json::to_string(&obs.types)?;
    let block = serde_json::to_string(&obs.block)?;

    sqlx::query(
        r#"
        INSERT OR REPLACE INTO observations (
            id, data_label, instrument, observation_type, observation_class, spectroscopy,
            object, ut_datetime, exposure_time, central_wavelength, filter_name, disperser,
            focal_plane_mask, detector_roi_setting, detector_binning, elevation,
            cass_rotator_pa, gcal_lamp, program_id, types, reduction_state, qa_state,
            canonical, instrument_block
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(obs.id.0)
    .bind(&obs.data_label)
    .bind(obs.instrument.as_str())
    .bind(obs.observation_type.as_str())
    .bind(obs.observation_class.map(|c| c.as_str()))
    .bind(obs.spectroscopy as i64)
    .bind(&obs.object)
    .bind(obs.ut_datetime.as_ref().map(format_utc))
    .bind(obs.exposure_time)
    .bind(obs.central_wavelength)
    .bind(&obs.filter_name)
    .bind(&obs.disperser)
    .bind(&obs.focal_plane_mask)
    .bind(obs.detector_roi_setting.map(|r| r.as_str()))
    .bind(&obs.detector_binning)
    .bind(obs.elevation)
    .bind(obs.cass_rotator_pa)
    .bind(obs.gcal_lamp.as_ref().map(|l| l.as_str().to_string()))
    .bind(&obs.program_id)
    .bind(types)
    .bind(obs.reduction_state.as_str())
    .bind(obs.qa_state.as_str())
    .bind(obs.canonical as i64)
    .bind(block)
    .execute(executor)
    .await?;

    Ok(())
}

/// Load one record by id
pub async fn load_observation(pool: &SqlitePool, id: ObservationId) -> Result<Option<Observation>> {
    let sql = format!("SELECT {} FROM observations WHERE id = ?", OBSERVATION_COLUMNS);
    let row = sqlx::query(&sql).bind(id.0).fetch_optional(pool).await?;
    row.as_ref().map(observation_from_row).transpose()
}

/// Flip the canonical flag; returns false when the record does not exist
pub async fn set_canonical<'e, E>(executor: E, id: ObservationId, canonical: bool) -> Result<bool>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query("UPDATE observations SET canonical = ? WHERE id = ?")
        .bind(canonical as i64)
        .bind(id.0)
        .execute(executor)
        .await?;
    Ok(result.rows_affected() > 0)
}
