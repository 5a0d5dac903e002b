//! FLAMINGOS-2 rules

use super::common::{both, days, is_object, is_opaque, is_science, is_spectroscopy, is_type};
use super::{CalKind, Category, CategoryRule, Guard, RuleContext, RuleModule};
use crate::error::EvalResult;
use crate::query::Lookup;
use calassoc_common::Descriptor::*;
use calassoc_common::{DescriptorSet, ObservationClass, ObservationType};

pub static F2: RuleModule = RuleModule {
    name: "F2",
    instr_descriptors: &[ReadMode, LyotStop],
    set_applicable,
    categories: &[
        CategoryRule {
            kind: CalKind::Dark,
            guards: &[],
            raw_limit: 10,
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
            kind: CalKind::Arc,
            guards: &[Guard::NotImaging],
            raw_limit: 1,
            processed_limit: 1,
            build: arc,
        },
        CategoryRule {
            kind: CalKind::PhotometricStandard,
            guards: &[Guard::NotProcessed, Guard::NotSpectroscopy],
            raw_limit: 10,
            processed_limit: 0,
            build: photometric_standard,
        },
        CategoryRule {
            kind: CalKind::TelluricStandard,
            guards: &[Guard::NotProcessed, Guard::NotImaging],
            raw_limit: 10,
            processed_limit: 0,
            build: telluric_standard,
        },
    ],
    reverse_window_days: 90,
};

fn set_applicable(d: &DescriptorSet) -> Vec<Category> {
    if is_opaque(d) {
        return Vec::new();
    }

    let mut categories = Vec::new();

    if is_object(d) {
        categories.extend(both(CalKind::Dark));
        categories.extend(both(CalKind::Flat));
        if is_spectroscopy(d) {
            categories.extend(both(CalKind::Arc));
            if is_science(d) {
                categories.push(Category::raw(CalKind::TelluricStandard));
            }
        } else if is_science(d) {
            categories.push(Category::raw(CalKind::PhotometricStandard));
        }
    }

    if is_type(d, ObservationType::Flat) {
        categories.extend(both(CalKind::Dark));
    }

    if is_type(d, ObservationType::Arc) {
        categories.extend(both(CalKind::Dark));
        categories.extend(both(CalKind::Flat));
    }

    categories
}

fn dark(ctx: &RuleContext<'_>) -> EvalResult<Lookup> {
    ctx.query()
        .dark(ctx.processed)
        .match_descriptors(&[ReadMode, ExposureTime])
        .max_interval(days(90))
        .all(ctx.howmany, true)
}

fn flat(ctx: &RuleContext<'_>) -> EvalResult<Lookup> {
    let spectroscopy = is_spectroscopy(ctx.reference);
    ctx.query()
        .flat(ctx.processed)
        .match_descriptors(&[Disperser, FocalPlaneMask, FilterName, LyotStop, ReadMode])
        .tolerance(&[(CentralWavelength, 0.001)], spectroscopy)
        .max_interval(days(90))
        .all(ctx.howmany, true)
}

fn arc(ctx: &RuleContext<'_>) -> EvalResult<Lookup> {
    ctx.query()
        .arc(ctx.processed)
        .match_descriptors(&[Disperser, FocalPlaneMask, FilterName, LyotStop])
        .tolerance(&[(CentralWavelength, 0.001)], true)
        .max_interval(days(90))
        .all(ctx.howmany, true)
}

fn photometric_standard(ctx: &RuleContext<'_>) -> EvalResult<Lookup> {
    ctx.query()
        .photometric_standard(false)
        .observation_class(ObservationClass::PartnerCal)
        .match_descriptors(&[FilterName, LyotStop])
        .max_interval(days(1))
        .all(ctx.howmany, true)
}

fn telluric_standard(ctx: &RuleContext<'_>) -> EvalResult<Lookup> {
    ctx.query()
        .telluric_standard(false)
        .observation_class(ObservationClass::PartnerCal)
        .match_descriptors(&[FilterName, LyotStop, FocalPlaneMask, Disperser])
        .tolerance(&[(CentralWavelength, 0.001)], true)
        .max_interval(days(1))
        .all(ctx.howmany, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use calassoc_common::{Instrument, Observation};

    fn applicable(obs: &Observation) -> Vec<Category> {
        F2.applicable(&DescriptorSet::surfaced(obs, F2.instr_descriptors))
    }

    #[test]
    fn test_arc_frame_needs_dark_and_flat() {
        let arc = Observation::new(3, Instrument::F2, ObservationType::Arc);
        let set = applicable(&arc);
        assert!(set.contains(&Category::raw(CalKind::Dark)));
        assert!(set.contains(&Category::raw(CalKind::Flat)));
        assert!(!set.contains(&Category::raw(CalKind::Arc)));
    }

    #[test]
    fn test_science_standards_by_mode() {
        let mut obs = Observation::new(4, Instrument::F2, ObservationType::Object);
        obs.observation_class = Some(ObservationClass::Science);
        assert!(applicable(&obs).contains(&Category::raw(CalKind::PhotometricStandard)));

        obs.spectroscopy = true;
        let set = applicable(&obs);
        assert!(set.contains(&Category::raw(CalKind::TelluricStandard)));
        assert!(set.contains(&Category::processed(CalKind::Arc)));
        assert!(!set.contains(&Category::raw(CalKind::PhotometricStandard)));
    }
}
