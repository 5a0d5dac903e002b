//! GNIRS rules
//!
//! Near-IR spectrograph with an imaging mode. Flats are GCAL frames selected
//! by lamp; cross-dispersed setups also need QH flats for the bluer orders.

use super::common::{
    both, days, is_object, is_opaque, is_science, is_spectroscopy, is_twilight,
};
use super::{CalKind, Category, CategoryRule, Guard, RuleContext, RuleModule};
use crate::error::EvalResult;
use crate::query::{CalQuery, Lookup};
use calassoc_common::Descriptor::*;
use calassoc_common::{DescriptorSet, ObservationClass};
use chrono::Duration;

/// Disperser tag of cross-dispersed setups
const CROSS_DISPERSED: &str = "XD";

pub static GNIRS: RuleModule = RuleModule {
    name: "GNIRS",
    instr_descriptors: &[ReadMode, WellDepthSetting, Coadds, Camera],
    set_applicable,
    categories: &[
        CategoryRule {
            kind: CalKind::Dark,
            guards: &[],
            raw_limit: 15,
            processed_limit: 1,
            build: dark,
        },
        CategoryRule {
            kind: CalKind::Flat,
            guards: &[],
            raw_limit: 10,
            processed_limit: 1,
            build: flat,
        },
        CategoryRule {
            kind: CalKind::LampoffFlat,
            guards: &[Guard::NotProcessed],
            raw_limit: 10,
            processed_limit: 0,
            build: lampoff_flat,
        },
        CategoryRule {
            kind: CalKind::QhFlat,
            guards: &[Guard::NotProcessed, Guard::NotImaging],
            raw_limit: 10,
            processed_limit: 0,
            build: qh_flat,
        },
        CategoryRule {
            kind: CalKind::Arc,
            guards: &[Guard::NotImaging],
            raw_limit: 1,
            processed_limit: 1,
            build: arc,
        },
        CategoryRule {
            kind: CalKind::PinholeMask,
            guards: &[Guard::NotImaging],
            raw_limit: 5,
            processed_limit: 1,
            build: pinhole_mask,
        },
        CategoryRule {
            kind: CalKind::TelluricStandard,
            guards: &[Guard::NotProcessed, Guard::NotImaging],
            raw_limit: 8,
            processed_limit: 0,
            build: telluric_standard,
        },
    ],
    reverse_window_days: 365,
};

fn set_applicable(d: &DescriptorSet) -> Vec<Category> {
    if is_opaque(d) || !is_object(d) || is_twilight(d) {
        return Vec::new();
    }

    let mut categories = Vec::new();

    if is_spectroscopy(d) {
        categories.extend(both(CalKind::Flat));
        categories.extend(both(CalKind::Arc));
        categories.push(Category::raw(CalKind::PinholeMask));
        if is_science(d) {
            categories.push(Category::raw(CalKind::TelluricStandard));
        }
        let cross_dispersed = d
            .text(Disperser)
            .is_some_and(|disperser| disperser.contains(CROSS_DISPERSED));
        if cross_dispersed {
            categories.push(Category::raw(CalKind::QhFlat));
        }
    } else {
        categories.extend(both(CalKind::Dark));
        categories.extend(both(CalKind::Flat));
        categories.push(Category::raw(CalKind::LampoffFlat));
    }

    categories
}

/// GCAL flats of the reference configuration taken with one of `lamps`
fn flat_query<'a>(ctx: &RuleContext<'a>, processed: bool, lamps: &[&str]) -> CalQuery<'a> {
    let spectroscopy = is_spectroscopy(ctx.reference);
    ctx.query()
        .flat(processed)
        .when(!processed, |q| q.gcal_lamp(lamps))
        .match_descriptors(&[Disperser, FocalPlaneMask, Camera, FilterName, WellDepthSetting])
        .tolerance(&[(CentralWavelength, 0.001)], spectroscopy)
}

fn lamp_flat(ctx: &RuleContext<'_>, lamps: &[&str], window: Duration) -> EvalResult<Lookup> {
    flat_query(ctx, ctx.processed, lamps)
        .max_interval(window)
        .all(ctx.howmany, true)
}

fn dark(ctx: &RuleContext<'_>) -> EvalResult<Lookup> {
    ctx.query()
        .dark(ctx.processed)
        .match_descriptors(&[ExposureTime, ReadMode, WellDepthSetting, Coadds])
        .max_interval(days(90))
        .all(ctx.howmany, true)
}

fn flat(ctx: &RuleContext<'_>) -> EvalResult<Lookup> {
    lamp_flat(ctx, &["IRhigh"], days(90))
}

fn lampoff_flat(ctx: &RuleContext<'_>) -> EvalResult<Lookup> {
    lamp_flat(ctx, &["Off"], days(1))
}

fn qh_flat(ctx: &RuleContext<'_>) -> EvalResult<Lookup> {
    lamp_flat(ctx, &["QH"], days(90))
}

fn arc(ctx: &RuleContext<'_>) -> EvalResult<Lookup> {
    ctx.query()
        .arc(ctx.processed)
        .match_descriptors(&[CentralWavelength, Disperser, FocalPlaneMask, FilterName, Camera])
        .max_interval(days(365))
        .all(ctx.howmany, true)
}

fn pinhole_mask(ctx: &RuleContext<'_>) -> EvalResult<Lookup> {
    ctx.query()
        .pinhole(ctx.processed)
        .match_descriptors(&[CentralWavelength, Disperser, Camera])
        .max_interval(days(365))
        .all(ctx.howmany, true)
}

fn telluric_standard(ctx: &RuleContext<'_>) -> EvalResult<Lookup> {
    ctx.query()
        .telluric_standard(false)
        .observation_class(ObservationClass::PartnerCal)
        .match_descriptors(&[CentralWavelength, Disperser, FocalPlaneMask, Camera, FilterName])
        .max_interval(days(1))
        .all(ctx.howmany, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use calassoc_common::{Instrument, Observation, ObservationType};

    fn spectroscopy(disperser: &str) -> Observation {
        let mut obs = Observation::new(1, Instrument::Gnirs, ObservationType::Object);
        obs.observation_class = Some(ObservationClass::Science);
        obs.spectroscopy = true;
        obs.disperser = Some(disperser.to_string());
        obs
    }

    #[test]
    fn test_cross_dispersed_adds_qh_flat() {
        let obs = spectroscopy("32_mm&SXD");
        let set = GNIRS.applicable(&DescriptorSet::surfaced(&obs, GNIRS.instr_descriptors));
        for category in ["flat", "arc", "pinhole_mask", "telluric_standard", "qh_flat"] {
            let category: Category = category.parse().unwrap();
            assert!(set.contains(&category), "missing {}", category);
        }

        let obs = spectroscopy("32_mm&LB");
        let set = GNIRS.applicable(&DescriptorSet::surfaced(&obs, GNIRS.instr_descriptors));
        assert!(!set.contains(&Category::raw(CalKind::QhFlat)));
    }

    #[test]
    fn test_imaging_gets_lamp_pair() {
        let mut obs = Observation::new(2, Instrument::Gnirs, ObservationType::Object);
        obs.observation_class = Some(ObservationClass::Science);
        let set = GNIRS.applicable(&DescriptorSet::surfaced(&obs, GNIRS.instr_descriptors));
        assert!(set.contains(&Category::raw(CalKind::Flat)));
        assert!(set.contains(&Category::raw(CalKind::LampoffFlat)));
        assert!(set.contains(&Category::raw(CalKind::Dark)));
    }

    #[test]
    fn test_telluric_standard_only_for_science() {
        for class in [
            Some(ObservationClass::Acq),
            Some(ObservationClass::DayCal),
            Some(ObservationClass::PartnerCal),
            None,
        ] {
            let mut obs = spectroscopy("32_mm&SB");
            obs.observation_class = class;
            let set = GNIRS.applicable(&DescriptorSet::surfaced(&obs, GNIRS.instr_descriptors));
            assert!(
                !set.contains(&Category::raw(CalKind::TelluricStandard)),
                "telluric standard for {:?}",
                class
            );
            assert!(set.contains(&Category::raw(CalKind::Arc)));
        }
    }
}
