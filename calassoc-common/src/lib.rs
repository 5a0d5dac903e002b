//! # Calibration Association Common Library
//!
//! Shared code for the calibration association engine and the ingest
//! collaborator that feeds it:
//! - Observation records, enumerations and instrument attribute blocks
//! - Flat descriptor mapping used by rule evaluation
//! - SQLite schema initialization and migrations
//! - TOML configuration loading
//! - Clock abstraction and UTC timestamp encoding

#[macro_use]
mod macros;

pub mod config;
pub mod db;
pub mod descriptors;
pub mod error;
pub mod observation;
pub mod time;

pub use descriptors::{Descriptor, DescriptorSet, Value};
pub use error::{Error, Result};
pub use observation::{
    GcalLamp, Instrument, InstrumentBlock, Observation, ObservationClass, ObservationId,
    ObservationType, QaState, ReductionState, RoiSetting,
};
pub use time::{Clock, ManualClock, SystemClock};
