//! NICI rules

use super::common::{both, days, hours, is_object, is_opaque, is_twilight, is_type, lamp_in};
use super::{CalKind, Category, CategoryRule, Guard, RuleContext, RuleModule};
use crate::error::EvalResult;
use crate::query::Lookup;
use calassoc_common::Descriptor::*;
use calassoc_common::{DescriptorSet, ObservationType};

pub static NICI: RuleModule = RuleModule {
    name: "NICI",
    instr_descriptors: &[],
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
            kind: CalKind::LampoffFlat,
            guards: &[Guard::NotProcessed],
            raw_limit: 10,
            processed_limit: 0,
            build: lampoff_flat,
        },
    ],
    reverse_window_days: 1,
};

fn set_applicable(d: &DescriptorSet) -> Vec<Category> {
    if is_opaque(d) {
        return Vec::new();
    }

    let mut categories = Vec::new();
    if is_object(d) && !is_twilight(d) {
        categories.extend(both(CalKind::Dark));
        categories.extend(both(CalKind::Flat));
    }
    if is_type(d, ObservationType::Flat) && lamp_in(d, &["IRhigh"]) {
        categories.push(Category::raw(CalKind::LampoffFlat));
    }
    categories
}

fn dark(ctx: &RuleContext<'_>) -> EvalResult<Lookup> {
    ctx.query()
        .dark(ctx.processed)
        .tolerance(&[(ExposureTime, 0.01)], true)
        .max_interval(days(1))
        .all(ctx.howmany, true)
}

fn flat(ctx: &RuleContext<'_>) -> EvalResult<Lookup> {
    ctx.query()
        .flat(ctx.processed)
        .when(!ctx.processed, |q| q.gcal_lamp(&["IRhigh"]))
        .match_descriptors(&[FilterName, FocalPlaneMask, Disperser])
        .max_interval(days(1))
        .all(ctx.howmany, true)
}

fn lampoff_flat(ctx: &RuleContext<'_>) -> EvalResult<Lookup> {
    ctx.query()
        .flat(false)
        .gcal_lamp(&["Off"])
        .match_descriptors(&[FilterName, FocalPlaneMask, Disperser])
        .max_interval(hours(1))
        .all(ctx.howmany, true)
}
