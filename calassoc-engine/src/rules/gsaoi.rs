//! GSAOI rules
//!
//! Adaptive-optics imager flattened with dome flats taken as OBJECT frames.

use super::common::{days, is_object, is_opaque, is_science, is_twilight};
use super::{CalKind, Category, CategoryRule, Guard, RuleContext, RuleModule};
use crate::error::EvalResult;
use crate::query::Lookup;
use calassoc_common::Descriptor::*;
use calassoc_common::{DescriptorSet, ObservationClass, ObservationType, ReductionState};

const DOMEFLAT: &str = "Domeflat";

pub static GSAOI: RuleModule = RuleModule {
    name: "GSAOI",
    instr_descriptors: &[ReadMode],
    set_applicable,
    categories: &[
        CategoryRule {
            kind: CalKind::Domeflat,
            guards: &[Guard::NotProcessed],
            raw_limit: 20,
            processed_limit: 0,
            build: domeflat,
        },
        CategoryRule {
            kind: CalKind::Flat,
            guards: &[Guard::OnlyProcessed],
            raw_limit: 0,
            processed_limit: 1,
            build: processed_flat,
        },
        CategoryRule {
            kind: CalKind::PhotometricStandard,
            guards: &[Guard::NotProcessed],
            raw_limit: 8,
            processed_limit: 0,
            build: photometric_standard,
        },
    ],
    reverse_window_days: 30,
};

fn set_applicable(d: &DescriptorSet) -> Vec<Category> {
    if is_opaque(d) || !is_object(d) || is_twilight(d) || d.is(Object, DOMEFLAT) {
        return Vec::new();
    }

    let mut categories = vec![
        Category::raw(CalKind::Domeflat),
        Category::processed(CalKind::Flat),
    ];
    if is_science(d) {
        categories.push(Category::raw(CalKind::PhotometricStandard));
    }
    categories
}

fn domeflat(ctx: &RuleContext<'_>) -> EvalResult<Lookup> {
    ctx.query()
        .raw()
        .observation_type(ObservationType::Object)
        .observation_class(ObservationClass::DayCal)
        .object(DOMEFLAT)
        .match_descriptors(&[FilterName])
        .max_interval(days(30))
        .all(ctx.howmany, true)
}

fn processed_flat(ctx: &RuleContext<'_>) -> EvalResult<Lookup> {
    ctx.query()
        .reduction(ReductionState::ProcessedFlat)
        .match_descriptors(&[FilterName])
        .max_interval(days(30))
        .all(ctx.howmany, true)
}

fn photometric_standard(ctx: &RuleContext<'_>) -> EvalResult<Lookup> {
    ctx.query()
        .raw()
        .observation_type(ObservationType::Object)
        .observation_class(ObservationClass::PartnerCal)
        .match_descriptors(&[FilterName])
        .max_interval(days(30))
        .all(ctx.howmany, true)
}
