//! GMOS-N / GMOS-S rules
//!
//! Optical imager and spectrograph with a CCD bias. Both sites share one
//! module; the instrument string still has to match between science and
//! calibration.

use super::common::{
    amp_read_area, bias_applicable, both, days, imaging_object, is_object, is_opaque,
    is_science, overscan, spectroscopy_flat_clamp, spectroscopy_object, TWILIGHT,
};
use super::{CalKind, Category, CategoryRule, Guard, RuleContext, RuleModule};
use crate::error::EvalResult;
use crate::query::{Lookup, OrderKey, Predicate};
use calassoc_common::Descriptor::{self, *};
use calassoc_common::{DescriptorSet, ObservationClass, ObservationType, ReductionState};

/// Mask tag of multi-object spectroscopy
const MOS: &str = "MOS";

/// Wide slit whose arcs are taken through any slit
const WIDE_SLIT: &str = "5.0arcsec";

/// Program ids of the baseline standard-star programs
const CAL_PROGRAM_PATTERN: &str = "G_-CAL%";

const READOUT: &[Descriptor] = &[DetectorXBin, DetectorYBin, ReadSpeedSetting, GainSetting];

pub static GMOS: RuleModule = RuleModule {
    name: "GMOS",
    instr_descriptors: &[
        AmpReadArea,
        ReadSpeedSetting,
        GainSetting,
        NodAndShuffle,
        NodCount,
        NodPixels,
        Prepared,
        OverscanTrimmed,
        OverscanSubtracted,
    ],
    set_applicable,
    categories: &[
        CategoryRule {
            kind: CalKind::Bias,
            guards: &[],
            raw_limit: 50,
            processed_limit: 1,
            build: bias,
        },
        CategoryRule {
            kind: CalKind::Dark,
            guards: &[],
            raw_limit: 15,
            processed_limit: 1,
            build: dark,
        },
        CategoryRule {
            kind: CalKind::Arc,
            guards: &[Guard::NotImaging],
            raw_limit: 1,
            processed_limit: 1,
            build: arc,
        },
        CategoryRule {
            kind: CalKind::Flat,
            guards: &[],
            raw_limit: 10,
            processed_limit: 1,
            build: flat,
        },
        CategoryRule {
            kind: CalKind::Fringe,
            guards: &[Guard::OnlyProcessed, Guard::NotSpectroscopy],
            raw_limit: 0,
            processed_limit: 1,
            build: fringe,
        },
        CategoryRule {
            kind: CalKind::Spectwilight,
            guards: &[Guard::NotProcessed, Guard::NotImaging],
            raw_limit: 2,
            processed_limit: 0,
            build: spectwilight,
        },
        CategoryRule {
            kind: CalKind::Specphot,
            guards: &[Guard::NotProcessed, Guard::NotImaging],
            raw_limit: 4,
            processed_limit: 0,
            build: specphot,
        },
        CategoryRule {
            kind: CalKind::PhotometricStandard,
            guards: &[Guard::NotProcessed, Guard::NotSpectroscopy],
            raw_limit: 4,
            processed_limit: 0,
            build: photometric_standard,
        },
        CategoryRule {
            kind: CalKind::Mask,
            guards: &[Guard::NotProcessed],
            raw_limit: 1,
            processed_limit: 0,
            build: mask,
        },
    ],
    reverse_window_days: 365,
};

fn set_applicable(d: &DescriptorSet) -> Vec<Category> {
    if is_opaque(d) {
        return Vec::new();
    }

    let mut categories = Vec::new();

    if bias_applicable(d, true) {
        categories.extend(both(CalKind::Bias));
    }

    if spectroscopy_object(d) {
        categories.extend(both(CalKind::Arc));
        categories.extend(both(CalKind::Flat));
        categories.push(Category::raw(CalKind::Spectwilight));
        categories.push(Category::raw(CalKind::Specphot));
    }

    if imaging_object(d) {
        categories.extend(both(CalKind::Flat));
        categories.push(Category::processed(CalKind::Fringe));
        if is_science(d) {
            categories.push(Category::raw(CalKind::PhotometricStandard));
        }
    }

    if is_object(d) && d.flag(NodAndShuffle) == Some(true) {
        categories.extend(both(CalKind::Dark));
    }

    if d.has_type(MOS) {
        categories.push(Category::raw(CalKind::Mask));
    }

    categories
}

fn bias(ctx: &RuleContext<'_>) -> EvalResult<Lookup> {
    let q = ctx.query().bias(ctx.processed).match_descriptors(READOUT);
    let (q, default_order) = overscan(amp_read_area(q), ctx.processed);
    q.max_interval(days(90)).all(ctx.howmany, default_order)
}

fn dark(ctx: &RuleContext<'_>) -> EvalResult<Lookup> {
    let nod_and_shuffle = ctx.reference.flag(NodAndShuffle) == Some(true);
    let q = ctx
        .query()
        .dark(ctx.processed)
        .match_descriptors(READOUT)
        .match_descriptors(&[NodAndShuffle])
        .when(nod_and_shuffle, |q| q.match_descriptors(&[NodCount, NodPixels]))
        .tolerance(&[(ExposureTime, 50.0)], true);
    amp_read_area(q)
        .max_interval(days(365))
        .all(ctx.howmany, true)
}

fn arc(ctx: &RuleContext<'_>) -> EvalResult<Lookup> {
    let wide_slit = ctx.reference.is(FocalPlaneMask, WIDE_SLIT);
    let q = ctx
        .query()
        .arc(ctx.processed)
        .match_descriptors(&[Disperser, FilterName, DetectorXBin, DetectorYBin])
        .when(wide_slit, |q| q.filter(Predicate::like(FocalPlaneMask, "%arcsec")))
        .when(!wide_slit, |q| q.match_descriptors(&[FocalPlaneMask]))
        .tolerance(&[(CentralWavelength, 0.001)], true);
    amp_read_area(q)
        .max_interval(days(365))
        .all(ctx.howmany, true)
}

/// Twilight sky flats for imaging, GCAL flats for spectroscopy
fn flat(ctx: &RuleContext<'_>) -> EvalResult<Lookup> {
    let spectroscopy = ctx.reference.flag(Spectroscopy).unwrap_or(false);
    let q = ctx
        .query()
        .match_descriptors(&[
            DetectorXBin,
            DetectorYBin,
            FilterName,
            ReadSpeedSetting,
            GainSetting,
            FocalPlaneMask,
        ])
        .spectroscopy(spectroscopy);

    let q = if ctx.processed {
        q.reduction(ReductionState::ProcessedFlat)
    } else if spectroscopy {
        q.flat(false)
    } else {
        q.raw()
            .observation_class(ObservationClass::DayCal)
            .observation_type(ObservationType::Object)
            .object(TWILIGHT)
    };

    let q = q.when(spectroscopy, |q| {
        spectroscopy_flat_clamp(
            q.match_descriptors(&[Disperser])
                .tolerance(&[(CentralWavelength, 0.001)], true),
        )
    });
    q.max_interval(days(180)).all(ctx.howmany, true)
}

fn fringe(ctx: &RuleContext<'_>) -> EvalResult<Lookup> {
    let q = ctx
        .query()
        .reduction(ReductionState::ProcessedFringe)
        .match_descriptors(&[DetectorXBin, DetectorYBin, FilterName]);
    amp_read_area(q)
        .max_interval(days(365))
        .all(ctx.howmany, true)
}

fn spectwilight(ctx: &RuleContext<'_>) -> EvalResult<Lookup> {
    ctx.query()
        .raw()
        .observation_type(ObservationType::Object)
        .spectroscopy(true)
        .object(TWILIGHT)
        .match_descriptors(&[Disperser, FilterName, FocalPlaneMask, DetectorXBin, DetectorYBin])
        .tolerance(&[(CentralWavelength, 0.02)], true)
        .max_interval(days(365))
        .all(ctx.howmany, true)
}

/// Spectrophotometric standards; MOS science takes any longslit standard
fn specphot(ctx: &RuleContext<'_>) -> EvalResult<Lookup> {
    let mos = ctx.reference.has_type(MOS);
    let wavelength_tolerance = if mos { 0.10 } else { 0.05 };
    ctx.query()
        .raw()
        .observation_type(ObservationType::Object)
        .spectroscopy(true)
        .observation_classes(&[ObservationClass::PartnerCal, ObservationClass::ProgCal])
        .filter(Predicate::ne(Object, TWILIGHT))
        .match_descriptors(&[FilterName, Disperser])
        .when(mos, |q| q.filter(Predicate::contains(FocalPlaneMask, "arcsec")))
        .when(!mos, |q| q.match_descriptors(&[FocalPlaneMask]))
        .tolerance(&[(CentralWavelength, wavelength_tolerance)], true)
        .max_interval(days(365))
        .all(ctx.howmany, true)
}

fn photometric_standard(ctx: &RuleContext<'_>) -> EvalResult<Lookup> {
    ctx.query()
        .photometric_standard(false)
        .observation_class(ObservationClass::PartnerCal)
        .filter(Predicate::like(ProgramId, CAL_PROGRAM_PATTERN))
        .match_descriptors(&[FilterName])
        .max_interval(days(1))
        .all(ctx.howmany, true)
}

/// MOS mask definition frames, most recent first
fn mask(ctx: &RuleContext<'_>) -> EvalResult<Lookup> {
    ctx.query()
        .raw()
        .observation_type(ObservationType::Mask)
        .match_descriptors(&[FocalPlaneMask])
        .order_by(vec![OrderKey::Descending(UtDatetime)])
        .all(ctx.howmany, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use calassoc_common::observation::{GmosBlock, InstrumentBlock};
    use calassoc_common::{Instrument, Observation, ReductionState, RoiSetting};

    fn surfaced(obs: &Observation) -> DescriptorSet {
        DescriptorSet::surfaced(obs, GMOS.instr_descriptors)
    }

    fn science(spectroscopy: bool) -> Observation {
        let mut obs = Observation::new(1, Instrument::GmosS, ObservationType::Object);
        obs.observation_class = Some(ObservationClass::Science);
        obs.object = Some("NGC 1068".to_string());
        obs.spectroscopy = spectroscopy;
        obs.focal_plane_mask = Some(if spectroscopy { "1.0arcsec" } else { "Imaging" }.to_string());
        obs.detector_roi_setting = Some(RoiSetting::FullFrame);
        obs
    }

    #[test]
    fn test_imaging_science_applicability() {
        let set = GMOS.applicable(&surfaced(&science(false)));
        let names: Vec<String> = set.iter().map(|c| c.to_string()).collect();
        assert_eq!(
            names,
            vec![
                "bias",
                "processed_bias",
                "flat",
                "processed_flat",
                "processed_fringe",
                "photometric_standard"
            ]
        );
    }

    #[test]
    fn test_spectroscopy_science_applicability() {
        let mut obs = science(true);
        obs.types.insert("MOS".to_string());
        let set = GMOS.applicable(&surfaced(&obs));
        for kind in [CalKind::Arc, CalKind::Flat] {
            assert!(set.contains(&Category::raw(kind)));
            assert!(set.contains(&Category::processed(kind)));
        }
        assert!(set.contains(&Category::raw(CalKind::Spectwilight)));
        assert!(set.contains(&Category::raw(CalKind::Specphot)));
        assert!(set.contains(&Category::raw(CalKind::Mask)));
        assert!(!set.contains(&Category::raw(CalKind::Dark)));
    }

    #[test]
    fn test_opaque_and_twilight() {
        let mut processed = science(false);
        processed.reduction_state = ReductionState::ProcessedScience;
        assert!(GMOS.applicable(&surfaced(&processed)).is_empty());

        let mask = Observation::new(2, Instrument::GmosN, ObservationType::Mask);
        assert!(GMOS.applicable(&surfaced(&mask)).is_empty());

        let mut twilight = science(false);
        twilight.object = Some(TWILIGHT.to_string());
        twilight.observation_class = Some(ObservationClass::DayCal);
        let set = GMOS.applicable(&surfaced(&twilight));
        assert_eq!(set, both(CalKind::Bias).to_vec());
    }

    #[test]
    fn test_nod_and_shuffle_requires_dark() {
        let mut obs = science(true);
        obs.block = InstrumentBlock::Gmos(GmosBlock {
            nodandshuffle: Some(true),
            nod_count: Some(2),
            nod_pixels: Some(1500),
            ..Default::default()
        });
        let set = GMOS.applicable(&surfaced(&obs));
        assert!(set.contains(&Category::raw(CalKind::Dark)));
        assert!(set.contains(&Category::processed(CalKind::Dark)));
    }

    #[test]
    fn test_applicable_categories_have_rules() {
        let mut obs = science(true);
        obs.types.insert("MOS".to_string());
        let declared: Vec<Category> = GMOS.categories().collect();
        for category in GMOS.applicable(&surfaced(&obs)) {
            assert!(declared.contains(&category), "{} not declared", category);
        }
    }
}
