//! GPI rules
//!
//! Coronagraphic integral field unit with a spectral mode (prism) and a
//! polarimetric mode (Wollaston prism). The disperser selects which set of
//! calibrations applies.

use super::common::{both, days, is_object, is_opaque, is_science, is_twilight};
use super::{CalKind, Category, CategoryRule, Guard, RuleContext, RuleModule};
use crate::error::EvalResult;
use crate::query::{Lookup, Predicate};
use calassoc_common::Descriptor::*;
use calassoc_common::{DescriptorSet, ObservationClass, ObservationType};

const WOLLASTON: &str = "WOLLASTON";

pub static GPI: RuleModule = RuleModule {
    name: "GPI",
    instr_descriptors: &[Apodizer, LyotStop, AstrometricStandard],
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
            kind: CalKind::Arc,
            guards: &[],
            raw_limit: 1,
            processed_limit: 1,
            build: arc,
        },
        CategoryRule {
            kind: CalKind::TelluricStandard,
            guards: &[Guard::NotProcessed],
            raw_limit: 8,
            processed_limit: 0,
            build: telluric_standard,
        },
        CategoryRule {
            kind: CalKind::PolarizationFlat,
            guards: &[],
            raw_limit: 10,
            processed_limit: 1,
            build: polarization_flat,
        },
        CategoryRule {
            kind: CalKind::PolarizationStandard,
            guards: &[Guard::NotProcessed],
            raw_limit: 4,
            processed_limit: 0,
            build: polarization_standard,
        },
        CategoryRule {
            kind: CalKind::AstrometricStandard,
            guards: &[Guard::NotProcessed],
            raw_limit: 4,
            processed_limit: 0,
            build: astrometric_standard,
        },
    ],
    reverse_window_days: 365,
};

fn polarimetry(d: &DescriptorSet) -> bool {
    d.text(Disperser)
        .is_some_and(|disperser| disperser.contains(WOLLASTON))
}

fn set_applicable(d: &DescriptorSet) -> Vec<Category> {
    if is_opaque(d) || !is_object(d) || is_twilight(d) {
        return Vec::new();
    }

    let science = is_science(d);
    let mut categories = both(CalKind::Dark).to_vec();

    if polarimetry(d) {
        categories.extend(both(CalKind::PolarizationFlat));
        if science {
            categories.push(Category::raw(CalKind::PolarizationStandard));
        }
    } else {
        categories.extend(both(CalKind::Arc));
        if science {
            categories.push(Category::raw(CalKind::TelluricStandard));
        }
    }

    if science {
        categories.push(Category::raw(CalKind::AstrometricStandard));
    }

    categories
}

fn dark(ctx: &RuleContext<'_>) -> EvalResult<Lookup> {
    ctx.query()
        .dark(ctx.processed)
        .tolerance(&[(ExposureTime, 0.1)], true)
        .max_interval(days(365))
        .all(ctx.howmany, true)
}

fn arc(ctx: &RuleContext<'_>) -> EvalResult<Lookup> {
    ctx.query()
        .arc(ctx.processed)
        .match_descriptors(&[Disperser, FilterName])
        .max_interval(days(365))
        .all(ctx.howmany, true)
}

fn telluric_standard(ctx: &RuleContext<'_>) -> EvalResult<Lookup> {
    ctx.query()
        .telluric_standard(false)
        .observation_class(ObservationClass::PartnerCal)
        .match_descriptors(&[Disperser, FilterName])
        .max_interval(days(365))
        .all(ctx.howmany, true)
}

fn polarization_flat(ctx: &RuleContext<'_>) -> EvalResult<Lookup> {
    ctx.query()
        .flat(ctx.processed)
        .filter(Predicate::contains(Disperser, WOLLASTON))
        .match_descriptors(&[FilterName])
        .max_interval(days(365))
        .all(ctx.howmany, true)
}

fn polarization_standard(ctx: &RuleContext<'_>) -> EvalResult<Lookup> {
    ctx.query()
        .raw()
        .observation_type(ObservationType::Object)
        .observation_class(ObservationClass::PartnerCal)
        .filter(Predicate::contains(Disperser, WOLLASTON))
        .match_descriptors(&[FilterName])
        .max_interval(days(365))
        .all(ctx.howmany, true)
}

fn astrometric_standard(ctx: &RuleContext<'_>) -> EvalResult<Lookup> {
    ctx.query()
        .raw()
        .observation_type(ObservationType::Object)
        .filter(Predicate::eq(AstrometricStandard, true))
        .max_interval(days(365))
        .all(ctx.howmany, true)
}
