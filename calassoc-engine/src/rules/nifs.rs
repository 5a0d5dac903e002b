//! NIFS rules
//!
//! Near-IR integral field spectrograph. Flats are lamp-on/lamp-off pairs
//! taken close together; Ronchi mask frames trace the slitlets and are
//! reused for as long as the configuration exists.

use super::common::{
    both, days, hours, is_object, is_opaque, is_science, is_spectroscopy, is_twilight, is_type,
    lamp_in,
};
use super::{CalKind, Category, CategoryRule, Guard, RuleContext, RuleModule};
use crate::error::EvalResult;
use crate::query::{CalQuery, Lookup};
use calassoc_common::Descriptor::{self, *};
use calassoc_common::{DescriptorSet, ObservationClass, ObservationType};

const FLAT_DESCRIPTORS: &[Descriptor] = &[CentralWavelength, Disperser, FocalPlaneMask, FilterName];

pub static NIFS: RuleModule = RuleModule {
    name: "NIFS",
    instr_descriptors: &[ReadMode, Coadds],
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
        CategoryRule {
            kind: CalKind::Arc,
            guards: &[Guard::NotImaging],
            raw_limit: 1,
            processed_limit: 1,
            build: arc,
        },
        CategoryRule {
            kind: CalKind::RonchiMask,
            guards: &[Guard::NotProcessed, Guard::NotImaging],
            raw_limit: 1,
            processed_limit: 0,
            build: ronchi_mask,
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
    if is_opaque(d) {
        return Vec::new();
    }

    let mut categories = Vec::new();

    if is_object(d) && !is_twilight(d) {
        categories.extend(both(CalKind::Dark));
        categories.extend(both(CalKind::Flat));
        categories.push(Category::raw(CalKind::LampoffFlat));
        if is_spectroscopy(d) {
            categories.extend(both(CalKind::Arc));
            categories.push(Category::raw(CalKind::RonchiMask));
            if is_science(d) {
                categories.push(Category::raw(CalKind::TelluricStandard));
            }
        }
    }

    if is_type(d, ObservationType::Flat) && !lamp_in(d, &["Off"]) {
        categories.push(Category::raw(CalKind::LampoffFlat));
    }

    categories
}

fn flat_query<'a>(ctx: &RuleContext<'a>) -> CalQuery<'a> {
    ctx.query().match_descriptors(FLAT_DESCRIPTORS)
}

fn dark(ctx: &RuleContext<'_>) -> EvalResult<Lookup> {
    ctx.query()
        .dark(ctx.processed)
        .match_descriptors(&[ExposureTime, ReadMode, Coadds, Disperser])
        .max_interval(days(90))
        .all(ctx.howmany, true)
}

fn flat(ctx: &RuleContext<'_>) -> EvalResult<Lookup> {
    flat_query(ctx)
        .flat(ctx.processed)
        .when(!ctx.processed, |q| q.gcal_lamp(&["IRhigh", "QH"]))
        .max_interval(days(10))
        .all(ctx.howmany, true)
}

fn lampoff_flat(ctx: &RuleContext<'_>) -> EvalResult<Lookup> {
    flat_query(ctx)
        .flat(false)
        .gcal_lamp(&["Off"])
        .max_interval(hours(1))
        .all(ctx.howmany, true)
}

fn arc(ctx: &RuleContext<'_>) -> EvalResult<Lookup> {
    flat_query(ctx)
        .arc(ctx.processed)
        .max_interval(days(365))
        .all(ctx.howmany, true)
}

/// No temporal window: any Ronchi frame of the configuration will do
fn ronchi_mask(ctx: &RuleContext<'_>) -> EvalResult<Lookup> {
    ctx.query()
        .raw()
        .observation_type(ObservationType::Ronchi)
        .match_descriptors(&[CentralWavelength, Disperser])
        .all(ctx.howmany, true)
}

fn telluric_standard(ctx: &RuleContext<'_>) -> EvalResult<Lookup> {
    flat_query(ctx)
        .telluric_standard(false)
        .observation_class(ObservationClass::PartnerCal)
        .max_interval(days(1))
        .all(ctx.howmany, true)
}
