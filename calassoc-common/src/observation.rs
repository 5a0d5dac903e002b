//! Observation records
//!
//! The read model the engine reasons over: a fixed common attribute set plus an
//! instrument-specific attribute block. Records are written by the ingest
//! collaborator and are read-only from the engine's point of view.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

string_enum! {
    /// Kind of exposure
    ObservationType {
        Object => "OBJECT",
        Bias => "BIAS",
        Dark => "DARK",
        Flat => "FLAT",
        Arc => "ARC",
        Mask => "MASK",
        Pinhole => "PINHOLE",
        Ronchi => "RONCHI",
    }
}

string_enum! {
    /// Why the exposure was taken
    ObservationClass {
        Science => "science",
        DayCal => "dayCal",
        PartnerCal => "partnerCal",
        ProgCal => "progCal",
        Acq => "acq",
        AcqCal => "acqCal",
    }
}

string_enum! {
    /// Detector region-of-interest preset
    RoiSetting {
        FullFrame => "Full Frame",
        CentralSpectrum => "Central Spectrum",
        CentralStamp => "Central Stamp",
        Custom => "Custom",
    }
}

string_enum! {
    /// Pipeline state of a record; anything other than RAW is a reduced product
    ReductionState {
        Raw => "RAW",
        ProcessedBias => "PROCESSED_BIAS",
        ProcessedDark => "PROCESSED_DARK",
        ProcessedFlat => "PROCESSED_FLAT",
        ProcessedArc => "PROCESSED_ARC",
        ProcessedFringe => "PROCESSED_FRINGE",
        ProcessedPinhole => "PROCESSED_PINHOLE",
        ProcessedStandard => "PROCESSED_STANDARD",
        ProcessedSlit => "PROCESSED_SLIT",
        ProcessedSlitflat => "PROCESSED_SLITFLAT",
        ProcessedScience => "PROCESSED_SCIENCE",
    }
}

string_enum! {
    /// Quality assessment; `Fail` frames are never calibration candidates
    QaState {
        Pass => "Pass",
        Usable => "Usable",
        Fail => "Fail",
        Check => "CHECK",
        Undefined => "Undefined",
    }
}

/// Stable archive key of an observation record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObservationId(pub i64);

impl fmt::Display for ObservationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ObservationId {
    fn from(value: i64) -> Self {
        ObservationId(value)
    }
}

/// Instrument identifier
///
/// Known instruments select a rule module; anything else is carried through as
/// `Other` and dispatches to the no-op module.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Instrument {
    GmosN,
    GmosS,
    Niri,
    Gnirs,
    Nifs,
    Nici,
    Gsaoi,
    Gpi,
    F2,
    Michelle,
    Ghost,
    Other(String),
}

impl Instrument {
    pub fn as_str(&self) -> &str {
        match self {
            Instrument::GmosN => "GMOS-N",
            Instrument::GmosS => "GMOS-S",
            Instrument::Niri => "NIRI",
            Instrument::Gnirs => "GNIRS",
            Instrument::Nifs => "NIFS",
            Instrument::Nici => "NICI",
            Instrument::Gsaoi => "GSAOI",
            Instrument::Gpi => "GPI",
            Instrument::F2 => "F2",
            Instrument::Michelle => "michelle",
            Instrument::Ghost => "GHOST",
            Instrument::Other(name) => name,
        }
    }

    pub fn is_gmos(&self) -> bool {
        matches!(self, Instrument::GmosN | Instrument::GmosS)
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for Instrument {
    fn from(value: String) -> Self {
        match value.as_str() {
            "GMOS-N" => Instrument::GmosN,
            "GMOS-S" => Instrument::GmosS,
            "NIRI" => Instrument::Niri,
            "GNIRS" => Instrument::Gnirs,
            "NIFS" => Instrument::Nifs,
            "NICI" => Instrument::Nici,
            "GSAOI" => Instrument::Gsaoi,
            "GPI" => Instrument::Gpi,
            "F2" => Instrument::F2,
            "GHOST" => Instrument::Ghost,
            _ if value.eq_ignore_ascii_case("michelle") => Instrument::Michelle,
            _ => Instrument::Other(value),
        }
    }
}

impl From<&str> for Instrument {
    fn from(value: &str) -> Self {
        Instrument::from(value.to_string())
    }
}

impl From<Instrument> for String {
    fn from(value: Instrument) -> String {
        value.as_str().to_string()
    }
}

/// GCAL calibration unit lamp
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum GcalLamp {
    IrHigh,
    IrLow,
    Qh,
    Off,
    Other(String),
}

impl GcalLamp {
    pub fn as_str(&self) -> &str {
        match self {
            GcalLamp::IrHigh => "IRhigh",
            GcalLamp::IrLow => "IRlow",
            GcalLamp::Qh => "QH",
            GcalLamp::Off => "Off",
            GcalLamp::Other(name) => name,
        }
    }
}

impl fmt::Display for GcalLamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for GcalLamp {
    fn from(value: String) -> Self {
        match value.as_str() {
            "IRhigh" => GcalLamp::IrHigh,
            "IRlow" => GcalLamp::IrLow,
            "QH" => GcalLamp::Qh,
            "Off" => GcalLamp::Off,
            _ => GcalLamp::Other(value),
        }
    }
}

impl From<GcalLamp> for String {
    fn from(value: GcalLamp) -> String {
        value.as_str().to_string()
    }
}

/// GMOS detector and readout attributes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GmosBlock {
    pub amp_read_area: Option<String>,
    pub read_speed_setting: Option<String>,
    pub gain_setting: Option<String>,
    pub nodandshuffle: Option<bool>,
    pub nod_count: Option<i64>,
    pub nod_pixels: Option<i64>,
    pub prepared: Option<bool>,
    pub overscan_trimmed: Option<bool>,
    pub overscan_subtracted: Option<bool>,
}

/// GHOST spectrograph and slit-viewer attributes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GhostBlock {
    pub res_mode: Option<String>,
    pub detector_name: Option<String>,
    pub amp_read_area: Option<String>,
    pub read_speed_setting: Option<String>,
    pub gain_setting: Option<String>,
    pub want_before_arc: Option<bool>,
    pub prepared: Option<bool>,
    pub overscan_trimmed: Option<bool>,
    pub overscan_subtracted: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct F2Block {
    pub read_mode: Option<String>,
    pub lyot_stop: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GnirsBlock {
    pub read_mode: Option<String>,
    pub well_depth_setting: Option<String>,
    pub coadds: Option<i64>,
    pub camera: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NiriBlock {
    pub data_section: Option<String>,
    pub read_mode: Option<String>,
    pub well_depth_setting: Option<String>,
    pub coadds: Option<i64>,
    pub camera: Option<String>,
    pub phot_standard: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NifsBlock {
    pub read_mode: Option<String>,
    pub coadds: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GsaoiBlock {
    pub read_mode: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GpiBlock {
    pub apodizer: Option<String>,
    pub lyot_stop: Option<String>,
    pub astrometric_standard: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MichelleBlock {
    pub read_mode: Option<String>,
}

/// Instrument-specific attribute block, selected by `instrument`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "block")]
pub enum InstrumentBlock {
    Gmos(GmosBlock),
    Ghost(GhostBlock),
    F2(F2Block),
    Gnirs(GnirsBlock),
    Niri(NiriBlock),
    Nifs(NifsBlock),
    Nici,
    Gsaoi(GsaoiBlock),
    Gpi(GpiBlock),
    Michelle(MichelleBlock),
    #[default]
    None,
}

impl InstrumentBlock {
    /// Empty block of the right shape for an instrument
    pub fn default_for(instrument: &Instrument) -> Self {
        match instrument {
            Instrument::GmosN | Instrument::GmosS => InstrumentBlock::Gmos(GmosBlock::default()),
            Instrument::Ghost => InstrumentBlock::Ghost(GhostBlock::default()),
            Instrument::F2 => InstrumentBlock::F2(F2Block::default()),
            Instrument::Gnirs => InstrumentBlock::Gnirs(GnirsBlock::default()),
            Instrument::Niri => InstrumentBlock::Niri(NiriBlock::default()),
            Instrument::Nifs => InstrumentBlock::Nifs(NifsBlock::default()),
            Instrument::Nici => InstrumentBlock::Nici,
            Instrument::Gsaoi => InstrumentBlock::Gsaoi(GsaoiBlock::default()),
            Instrument::Gpi => InstrumentBlock::Gpi(GpiBlock::default()),
            Instrument::Michelle => InstrumentBlock::Michelle(MichelleBlock::default()),
            Instrument::Other(_) => InstrumentBlock::None,
        }
    }
}

/// One exposure's metadata record (raw or processed)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub id: ObservationId,
    /// Logical file key; at most one canonical record per data label
    pub data_label: Option<String>,
    pub instrument: Instrument,
    pub observation_type: ObservationType,
    pub observation_class: Option<ObservationClass>,
    pub spectroscopy: bool,
    pub object: Option<String>,
    pub ut_datetime: Option<DateTime<Utc>>,
    /// Seconds
    pub exposure_time: Option<f64>,
    /// Microns
    pub central_wavelength: Option<f64>,
    pub filter_name: Option<String>,
    pub disperser: Option<String>,
    pub focal_plane_mask: Option<String>,
    pub detector_roi_setting: Option<RoiSetting>,
    /// e.g. "2x2"
    pub detector_binning: Option<String>,
    /// Degrees
    pub elevation: Option<f64>,
    /// Degrees
    pub cass_rotator_pa: Option<f64>,
    pub gcal_lamp: Option<GcalLamp>,
    pub program_id: Option<String>,
    /// Type tags such as MOS, IFU, LS
    pub types: BTreeSet<String>,
    pub reduction_state: ReductionState,
    pub qa_state: QaState,
    pub canonical: bool,
    pub block: InstrumentBlock,
}

impl Observation {
    /// New canonical RAW record with all optional attributes unset
    pub fn new(id: i64, instrument: Instrument, observation_type: ObservationType) -> Self {
        let block = InstrumentBlock::default_for(&instrument);
        Self {
            id: ObservationId(id),
            data_label: None,
            instrument,
            observation_type,
            observation_class: None,
            spectroscopy: false,
            object: None,
            ut_datetime: None,
            exposure_time: None,
            central_wavelength: None,
            filter_name: None,
            disperser: None,
            focal_plane_mask: None,
            detector_roi_setting: None,
            detector_binning: None,
            elevation: None,
            cass_rotator_pa: None,
            gcal_lamp: None,
            program_id: None,
            types: BTreeSet::new(),
            reduction_state: ReductionState::Raw,
            qa_state: QaState::Undefined,
            canonical: true,
            block,
        }
    }

    /// Parse `detector_binning` ("2x2") into (x, y)
    pub fn binning(&self) -> Option<(i64, i64)> {
        let text = self.detector_binning.as_deref()?;
        let (x, y) = text.trim().split_once(|c| c == 'x' || c == 'X')?;
        Some((x.trim().parse().ok()?, y.trim().parse().ok()?))
    }

    pub fn has_type(&self, tag: &str) -> bool {
        self.types.contains(tag)
    }

    /// Eligible to appear in any candidate set
    pub fn is_candidate(&self) -> bool {
        self.canonical && self.qa_state != QaState::Fail
    }
}
