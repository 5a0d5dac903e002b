//! Flat descriptor mapping
//!
//! Rule modules never look at an `Observation` directly. The dispatcher
//! flattens the common attributes plus the instrument block into a
//! `DescriptorSet`, and matching rules read and compare named descriptors.
//!
//! A descriptor that the set does not carry at all is *unknown* (a rule asked
//! for something its module never surfaced). A descriptor that is carried but
//! has no value is *missing*. The two are deliberately distinct.

use crate::observation::{InstrumentBlock, Observation, ObservationId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

string_enum! {
    /// Name of an observation attribute usable in matching rules
    Descriptor {
        // Common attributes
        DataLabel => "data_label",
        Instrument => "instrument",
        ObservationType => "observation_type",
        ObservationClass => "observation_class",
        Spectroscopy => "spectroscopy",
        Object => "object",
        UtDatetime => "ut_datetime",
        ExposureTime => "exposure_time",
        CentralWavelength => "central_wavelength",
        FilterName => "filter_name",
        Disperser => "disperser",
        FocalPlaneMask => "focal_plane_mask",
        DetectorRoiSetting => "detector_roi_setting",
        DetectorBinning => "detector_binning",
        DetectorXBin => "detector_x_bin",
        DetectorYBin => "detector_y_bin",
        Elevation => "elevation",
        CassRotatorPa => "cass_rotator_pa",
        GcalLamp => "gcal_lamp",
        ProgramId => "program_id",
        ReductionState => "reduction_state",
        QaState => "qa_state",
        Canonical => "canonical",
        // Instrument block attributes
        AmpReadArea => "amp_read_area",
        ReadSpeedSetting => "read_speed_setting",
        GainSetting => "gain_setting",
        NodAndShuffle => "nodandshuffle",
        NodCount => "nod_count",
        NodPixels => "nod_pixels",
        Prepared => "prepared",
        OverscanTrimmed => "overscan_trimmed",
        OverscanSubtracted => "overscan_subtracted",
        ResMode => "res_mode",
        DetectorName => "detector_name",
        WantBeforeArc => "want_before_arc",
        ReadMode => "read_mode",
        LyotStop => "lyot_stop",
        WellDepthSetting => "well_depth_setting",
        Coadds => "coadds",
        Camera => "camera",
        DataSection => "data_section",
        PhotStandard => "phot_standard",
        Apodizer => "apodizer",
        AstrometricStandard => "astrometric_standard",
    }
}

/// A descriptor value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Integer(i64),
    Number(f64),
    Time(DateTime<Utc>),
    Text(String),
}

impl Value {
    /// Numeric view; integers widen to f64
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Time(t) => Some(*t),
            _ => None,
        }
    }

    /// Ordering between comparable values; `None` when the kinds differ
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Time(a), Value::Time(b)) => Some(a.cmp(b)),
            (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x.partial_cmp(&y),
                _ => None,
            },
        }
    }

    /// Equality that treats 2 and 2.0 as the same value
    pub fn matches(&self, other: &Value) -> bool {
        self.compare(other) == Some(Ordering::Equal)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Number(n) => write!(f, "{}", n),
            Value::Time(t) => write!(f, "{}", t.to_rfc3339()),
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Value::Time(value)
    }
}

fn text(value: &Option<String>) -> Option<Value> {
    value.as_ref().map(|s| Value::Text(s.clone()))
}

fn number(value: Option<f64>) -> Option<Value> {
    value.map(Value::Number)
}

fn integer(value: Option<i64>) -> Option<Value> {
    value.map(Value::Integer)
}

fn flag(value: Option<bool>) -> Option<Value> {
    value.map(Value::Bool)
}

/// Common attributes of a record, including derived binning
fn common_descriptors(obs: &Observation) -> Vec<(Descriptor, Option<Value>)> {
    let binning = obs.binning();
    vec![
        (Descriptor::DataLabel, text(&obs.data_label)),
        (Descriptor::Instrument, Some(Value::from(obs.instrument.as_str()))),
        (Descriptor::ObservationType, Some(Value::from(obs.observation_type.as_str()))),
        (
            Descriptor::ObservationClass,
            obs.observation_class.map(|c| Value::from(c.as_str())),
        ),
        (Descriptor::Spectroscopy, Some(Value::Bool(obs.spectroscopy))),
        (Descriptor::Object, text(&obs.object)),
        (Descriptor::UtDatetime, obs.ut_datetime.map(Value::Time)),
        (Descriptor::ExposureTime, number(obs.exposure_time)),
        (Descriptor::CentralWavelength, number(obs.central_wavelength)),
        (Descriptor::FilterName, text(&obs.filter_name)),
        (Descriptor::Disperser, text(&obs.disperser)),
        (Descriptor::FocalPlaneMask, text(&obs.focal_plane_mask)),
        (
            Descriptor::DetectorRoiSetting,
            obs.detector_roi_setting.map(|r| Value::from(r.as_str())),
        ),
        (Descriptor::DetectorBinning, text(&obs.detector_binning)),
        (Descriptor::DetectorXBin, binning.map(|(x, _)| Value::Integer(x))),
        (Descriptor::DetectorYBin, binning.map(|(_, y)| Value::Integer(y))),
        (Descriptor::Elevation, number(obs.elevation)),
        (Descriptor::CassRotatorPa, number(obs.cass_rotator_pa)),
        (
            Descriptor::GcalLamp,
            obs.gcal_lamp.as_ref().map(|l| Value::from(l.as_str())),
        ),
        (Descriptor::ProgramId, text(&obs.program_id)),
        (Descriptor::ReductionState, Some(Value::from(obs.reduction_state.as_str()))),
        (Descriptor::QaState, Some(Value::from(obs.qa_state.as_str()))),
        (Descriptor::Canonical, Some(Value::Bool(obs.canonical))),
    ]
}

/// Attributes carried by an instrument block
fn block_descriptors(block: &InstrumentBlock) -> Vec<(Descriptor, Option<Value>)> {
    match block {
        InstrumentBlock::Gmos(b) => vec![
            (Descriptor::AmpReadArea, text(&b.amp_read_area)),
            (Descriptor::ReadSpeedSetting, text(&b.read_speed_setting)),
            (Descriptor::GainSetting, text(&b.gain_setting)),
            (Descriptor::NodAndShuffle, flag(b.nodandshuffle)),
            (Descriptor::NodCount, integer(b.nod_count)),
            (Descriptor::NodPixels, integer(b.nod_pixels)),
            (Descriptor::Prepared, flag(b.prepared)),
            (Descriptor::OverscanTrimmed, flag(b.overscan_trimmed)),
            (Descriptor::OverscanSubtracted, flag(b.overscan_subtracted)),
        ],
        InstrumentBlock::Ghost(b) => vec![
            (Descriptor::ResMode, text(&b.res_mode)),
            (Descriptor::DetectorName, text(&b.detector_name)),
            (Descriptor::AmpReadArea, text(&b.amp_read_area)),
            (Descriptor::ReadSpeedSetting, text(&b.read_speed_setting)),
            (Descriptor::GainSetting, text(&b.gain_setting)),
            (Descriptor::WantBeforeArc, flag(b.want_before_arc)),
            (Descriptor::Prepared, flag(b.prepared)),
            (Descriptor::OverscanTrimmed, flag(b.overscan_trimmed)),
            (Descriptor::OverscanSubtracted, flag(b.overscan_subtracted)),
        ],
        InstrumentBlock::F2(b) => vec![
            (Descriptor::ReadMode, text(&b.read_mode)),
            (Descriptor::LyotStop, text(&b.lyot_stop)),
        ],
        InstrumentBlock::Gnirs(b) => vec![
            (Descriptor::ReadMode, text(&b.read_mode)),
            (Descriptor::WellDepthSetting, text(&b.well_depth_setting)),
            (Descriptor::Coadds, integer(b.coadds)),
            (Descriptor::Camera, text(&b.camera)),
        ],
        InstrumentBlock::Niri(b) => vec![
            (Descriptor::DataSection, text(&b.data_section)),
            (Descriptor::ReadMode, text(&b.read_mode)),
            (Descriptor::WellDepthSetting, text(&b.well_depth_setting)),
            (Descriptor::Coadds, integer(b.coadds)),
            (Descriptor::Camera, text(&b.camera)),
            (Descriptor::PhotStandard, flag(b.phot_standard)),
        ],
        InstrumentBlock::Nifs(b) => vec![
            (Descriptor::ReadMode, text(&b.read_mode)),
            (Descriptor::Coadds, integer(b.coadds)),
        ],
        InstrumentBlock::Gsaoi(b) => vec![(Descriptor::ReadMode, text(&b.read_mode))],
        InstrumentBlock::Gpi(b) => vec![
            (Descriptor::Apodizer, text(&b.apodizer)),
            (Descriptor::LyotStop, text(&b.lyot_stop)),
            (Descriptor::AstrometricStandard, flag(b.astrometric_standard)),
        ],
        InstrumentBlock::Michelle(b) => vec![(Descriptor::ReadMode, text(&b.read_mode))],
        InstrumentBlock::Nici | InstrumentBlock::None => Vec::new(),
    }
}

/// Flat mapping of descriptor name to value for one observation
#[derive(Debug, Clone, PartialEq)]
pub struct DescriptorSet {
    id: ObservationId,
    values: BTreeMap<Descriptor, Option<Value>>,
    types: BTreeSet<String>,
}

impl DescriptorSet {
    /// Every common attribute plus the whole instrument block
    ///
    /// Used for candidates, whose full record is always available.
    pub fn from_observation(obs: &Observation) -> Self {
        let mut values: BTreeMap<_, _> = common_descriptors(obs).into_iter().collect();
        values.extend(block_descriptors(&obs.block));
        Self {
            id: obs.id,
            values,
            types: obs.types.clone(),
        }
    }

    /// Common attributes plus only the block attributes a rule module declares
    ///
    /// Declared attributes absent from the record's block are surfaced as
    /// missing rather than unknown.
    pub fn surfaced(obs: &Observation, instr_descriptors: &[Descriptor]) -> Self {
        let mut values: BTreeMap<_, _> = common_descriptors(obs).into_iter().collect();
        let block: BTreeMap<_, _> = block_descriptors(&obs.block).into_iter().collect();
        for descriptor in instr_descriptors {
            let value = block.get(descriptor).cloned().flatten();
            values.insert(*descriptor, value);
        }
        Self {
            id: obs.id,
            values,
            types: obs.types.clone(),
        }
    }

    pub fn id(&self) -> ObservationId {
        self.id
    }

    /// `None` when the descriptor is unknown to this set, `Some(None)` when missing
    pub fn lookup(&self, descriptor: Descriptor) -> Option<Option<&Value>> {
        self.values.get(&descriptor).map(|v| v.as_ref())
    }

    pub fn knows(&self, descriptor: Descriptor) -> bool {
        self.values.contains_key(&descriptor)
    }

    /// Value if present; unknown and missing both read as `None`
    pub fn get(&self, descriptor: Descriptor) -> Option<&Value> {
        self.values.get(&descriptor).and_then(|v| v.as_ref())
    }

    pub fn text(&self, descriptor: Descriptor) -> Option<&str> {
        self.get(descriptor).and_then(Value::as_str)
    }

    pub fn number(&self, descriptor: Descriptor) -> Option<f64> {
        self.get(descriptor).and_then(Value::as_f64)
    }

    pub fn flag(&self, descriptor: Descriptor) -> Option<bool> {
        self.get(descriptor).and_then(Value::as_bool)
    }

    pub fn time(&self, descriptor: Descriptor) -> Option<DateTime<Utc>> {
        self.get(descriptor).and_then(Value::as_time)
    }

    /// Compare a text descriptor against a literal
    pub fn is(&self, descriptor: Descriptor, expected: &str) -> bool {
        self.text(descriptor) == Some(expected)
    }

    pub fn has_type(&self, tag: &str) -> bool {
        self.types.contains(tag)
    }

    /// Override or add a value (fixtures and derived rules)
    pub fn set(&mut self, descriptor: Descriptor, value: Option<Value>) {
        self.values.insert(descriptor, value);
    }
}
