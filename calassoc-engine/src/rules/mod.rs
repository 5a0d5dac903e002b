//! Instrument rule modules
//!
//! Each instrument family is a plain `RuleModule` value: the block descriptors
//! it surfaces, an applicability function, and a table of per-category
//! lookups with their guards and default caps. The registry maps instrument
//! identifiers to these values.

pub mod common;
pub mod registry;

mod f2;
mod ghost;
mod gmos;
mod gnirs;
mod gpi;
mod gsaoi;
mod michelle;
mod nici;
mod nifs;
mod niri;

pub use f2::F2;
pub use ghost::GHOST;
pub use gmos::GMOS;
pub use gnirs::GNIRS;
pub use gpi::GPI;
pub use gsaoi::GSAOI;
pub use michelle::MICHELLE;
pub use nici::NICI;
pub use nifs::NIFS;
pub use niri::NIRI;
pub use registry::{Registry, NULL_MODULE};

use crate::error::EvalResult;
use crate::query::{CalQuery, Lookup};
use calassoc_common::{Descriptor, DescriptorSet, Error, ReductionState};
use std::fmt;
use std::str::FromStr;

/// Calibration family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CalKind {
    Bias,
    Dark,
    Flat,
    LampoffFlat,
    QhFlat,
    Domeflat,
    Arc,
    Fringe,
    Spectwilight,
    Specphot,
    PhotometricStandard,
    TelluricStandard,
    Mask,
    PinholeMask,
    RonchiMask,
    Slitflat,
    Slit,
    PolarizationFlat,
    PolarizationStandard,
    AstrometricStandard,
}

impl CalKind {
    pub const ALL: &'static [CalKind] = &[
        CalKind::Bias,
        CalKind::Dark,
        CalKind::Flat,
        CalKind::LampoffFlat,
        CalKind::QhFlat,
        CalKind::Domeflat,
        CalKind::Arc,
        CalKind::Fringe,
        CalKind::Spectwilight,
        CalKind::Specphot,
        CalKind::PhotometricStandard,
        CalKind::TelluricStandard,
        CalKind::Mask,
        CalKind::PinholeMask,
        CalKind::RonchiMask,
        CalKind::Slitflat,
        CalKind::Slit,
        CalKind::PolarizationFlat,
        CalKind::PolarizationStandard,
        CalKind::AstrometricStandard,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CalKind::Bias => "bias",
            CalKind::Dark => "dark",
            CalKind::Flat => "flat",
            CalKind::LampoffFlat => "lampoff_flat",
            CalKind::QhFlat => "qh_flat",
            CalKind::Domeflat => "domeflat",
            CalKind::Arc => "arc",
            CalKind::Fringe => "fringe",
            CalKind::Spectwilight => "spectwilight",
            CalKind::Specphot => "specphot",
            CalKind::PhotometricStandard => "photometric_standard",
            CalKind::TelluricStandard => "telluric_standard",
            CalKind::Mask => "mask",
            CalKind::PinholeMask => "pinhole_mask",
            CalKind::RonchiMask => "ronchi_mask",
            CalKind::Slitflat => "slitflat",
            CalKind::Slit => "slit",
            CalKind::PolarizationFlat => "polarization_flat",
            CalKind::PolarizationStandard => "polarization_standard",
            CalKind::AstrometricStandard => "astrometric_standard",
        }
    }

    /// Reduction state of this family's pipeline product
    pub fn processed_state(&self) -> ReductionState {
        match self {
            CalKind::Bias => ReductionState::ProcessedBias,
            CalKind::Dark => ReductionState::ProcessedDark,
            CalKind::Flat
            | CalKind::LampoffFlat
            | CalKind::QhFlat
            | CalKind::Domeflat
            | CalKind::Spectwilight
            | CalKind::PolarizationFlat => ReductionState::ProcessedFlat,
            CalKind::Arc => ReductionState::ProcessedArc,
            CalKind::Fringe => ReductionState::ProcessedFringe,
            CalKind::PinholeMask => ReductionState::ProcessedPinhole,
            CalKind::Slitflat => ReductionState::ProcessedSlitflat,
            CalKind::Slit => ReductionState::ProcessedSlit,
            CalKind::Specphot
            | CalKind::PhotometricStandard
            | CalKind::TelluricStandard
            | CalKind::PolarizationStandard
            | CalKind::AstrometricStandard
            | CalKind::Mask
            | CalKind::RonchiMask => ReductionState::ProcessedStandard,
        }
    }
}

impl fmt::Display for CalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A calibration category: a family, raw or processed
///
/// Written as the family name, with a `processed_` prefix for pipeline
/// products (`bias`, `processed_bias`, `processed_fringe`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Category {
    pub kind: CalKind,
    pub processed: bool,
}

impl Category {
    pub const fn raw(kind: CalKind) -> Self {
        Self {
            kind,
            processed: false,
        }
    }

    pub const fn processed(kind: CalKind) -> Self {
        Self {
            kind,
            processed: true,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.processed {
            write!(f, "processed_{}", self.kind)
        } else {
            write!(f, "{}", self.kind)
        }
    }
}

impl FromStr for Category {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, processed) = match s.strip_prefix("processed_") {
            Some(rest) => (rest, true),
            None => (s, false),
        };
        CalKind::ALL
            .iter()
            .find(|k| k.as_str() == name)
            .map(|kind| Category {
                kind: *kind,
                processed,
            })
            .ok_or_else(|| Error::InvalidInput(format!("Unknown calibration category '{}'", s)))
    }
}

/// Pre-condition checked before a category lookup is built
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    /// Processed products are not looked up for this category
    NotProcessed,
    /// Only processed products exist for this category
    OnlyProcessed,
    /// Reference must be spectroscopy
    NotImaging,
    /// Reference must be imaging
    NotSpectroscopy,
}

impl Guard {
    pub fn allows(&self, reference: &DescriptorSet, processed: bool) -> bool {
        let spectroscopy = reference.flag(Descriptor::Spectroscopy).unwrap_or(false);
        match self {
            Guard::NotProcessed => !processed,
            Guard::OnlyProcessed => processed,
            Guard::NotImaging => spectroscopy,
            Guard::NotSpectroscopy => !spectroscopy,
        }
    }
}

/// Inputs to one category lookup
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    pub module: &'static str,
    pub reference: &'a DescriptorSet,
    pub processed: bool,
    pub howmany: usize,
}

impl<'a> RuleContext<'a> {
    /// Fresh query anchored on the reference
    pub fn query(&self) -> CalQuery<'a> {
        CalQuery::base(self.module, self.reference)
    }
}

pub type BuildFn = for<'a> fn(&RuleContext<'a>) -> EvalResult<Lookup>;

/// Lookup for one calibration family
#[derive(Clone, Copy)]
pub struct CategoryRule {
    pub kind: CalKind,
    pub guards: &'static [Guard],
    /// Default cap for raw frames
    pub raw_limit: usize,
    /// Default cap for processed products
    pub processed_limit: usize,
    pub build: BuildFn,
}

impl fmt::Debug for CategoryRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CategoryRule")
            .field("kind", &self.kind)
            .field("guards", &self.guards)
            .field("raw_limit", &self.raw_limit)
            .field("processed_limit", &self.processed_limit)
            .finish()
    }
}

impl CategoryRule {
    pub fn default_limit(&self, processed: bool) -> usize {
        if processed {
            self.processed_limit
        } else {
            self.raw_limit
        }
    }
}

/// Matching policy for one instrument family
pub struct RuleModule {
    pub name: &'static str,
    /// Instrument-block attributes surfaced into the descriptor mapping
    pub instr_descriptors: &'static [Descriptor],
    pub set_applicable: fn(&DescriptorSet) -> Vec<Category>,
    pub categories: &'static [CategoryRule],
    /// Widest temporal window any lookup uses, in days
    pub reverse_window_days: i64,
}

impl fmt::Debug for RuleModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleModule")
            .field("name", &self.name)
            .field("categories", &self.categories.len())
            .finish()
    }
}

impl RuleModule {
    pub fn rule(&self, kind: CalKind) -> Option<&CategoryRule> {
        self.categories.iter().find(|r| r.kind == kind)
    }

    /// Every category this module can produce
    pub fn categories(&self) -> impl Iterator<Item = Category> + '_ {
        self.categories.iter().flat_map(|rule| {
            let raw = (!rule.guards.contains(&Guard::OnlyProcessed)).then(|| Category::raw(rule.kind));
            let processed =
                (!rule.guards.contains(&Guard::NotProcessed)).then(|| Category::processed(rule.kind));
            raw.into_iter().chain(processed)
        })
    }

    pub fn applicable(&self, reference: &DescriptorSet) -> Vec<Category> {
        (self.set_applicable)(reference)
    }
}
