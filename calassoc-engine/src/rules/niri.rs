//! NIRI rules

use super::common::{
    both, days, hours, is_object, is_opaque, is_science, is_spectroscopy, is_twilight, is_type,
    lamp_in,
};
use super::{CalKind, Category, CategoryRule, Guard, RuleContext, RuleModule};
use crate::error::EvalResult;
use crate::query::{Lookup, Predicate};
use calassoc_common::Descriptor::*;
use calassoc_common::{DescriptorSet, ObservationClass, ObservationType};

const LAMP_ON: &[&str] = &["IRhigh", "IRlow"];

pub static NIRI: RuleModule = RuleModule {
    name: "NIRI",
    instr_descriptors: &[DataSection, ReadMode, WellDepthSetting, Coadds, Camera, PhotStandard],
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
            kind: CalKind::PhotometricStandard,
            guards: &[Guard::NotProcessed, Guard::NotSpectroscopy],
            raw_limit: 10,
            processed_limit: 0,
            build: photometric_standard,
        },
        CategoryRule {
            kind: CalKind::TelluricStandard,
            guards: &[Guard::NotProcessed, Guard::NotImaging],
            raw_limit: 8,
            processed_limit: 0,
            build: telluric_standard,
        },
    ],
    reverse_window_days: 180,
};

fn set_applicable(d: &DescriptorSet) -> Vec<Category> {
    if is_opaque(d) {
        return Vec::new();
    }

    let mut categories = Vec::new();

    if is_object(d) && !is_twilight(d) {
        categories.extend(both(CalKind::Flat));
        if is_spectroscopy(d) {
            categories.extend(both(CalKind::Arc));
            if is_science(d) {
                categories.push(Category::raw(CalKind::TelluricStandard));
            }
        } else {
            categories.extend(both(CalKind::Dark));
            if is_science(d) {
                categories.push(Category::raw(CalKind::PhotometricStandard));
            }
        }
    }

    // Lamp-on imaging flats are paired with lamp-off frames
    if is_type(d, ObservationType::Flat) && !is_spectroscopy(d) && lamp_in(d, LAMP_ON) {
        categories.push(Category::raw(CalKind::LampoffFlat));
    }

    categories
}

fn dark(ctx: &RuleContext<'_>) -> EvalResult<Lookup> {
    ctx.query()
        .dark(ctx.processed)
        .match_descriptors(&[DataSection, ReadMode, WellDepthSetting, Coadds])
        .tolerance(&[(ExposureTime, 0.01)], true)
        .max_interval(days(180))
        .all(ctx.howmany, true)
}

fn flat(ctx: &RuleContext<'_>) -> EvalResult<Lookup> {
    let spectroscopy = is_spectroscopy(ctx.reference);
    ctx.query()
        .flat(ctx.processed)
        .when(!ctx.processed, |q| q.gcal_lamp(LAMP_ON))
        .match_descriptors(&[
            DataSection,
            WellDepthSetting,
            FilterName,
            Camera,
            FocalPlaneMask,
            Disperser,
        ])
        .tolerance(&[(CentralWavelength, 0.001)], spectroscopy)
        .max_interval(days(180))
        .all(ctx.howmany, true)
}

fn lampoff_flat(ctx: &RuleContext<'_>) -> EvalResult<Lookup> {
    ctx.query()
        .flat(false)
        .gcal_lamp(&["Off"])
        .match_descriptors(&[DataSection, WellDepthSetting, FilterName, Camera, Disperser])
        .max_interval(hours(1))
        .all(ctx.howmany, true)
}

fn arc(ctx: &RuleContext<'_>) -> EvalResult<Lookup> {
    ctx.query()
        .arc(ctx.processed)
        .match_descriptors(&[DataSection, FilterName, Camera, FocalPlaneMask, Disperser])
        .tolerance(&[(CentralWavelength, 0.001)], true)
        .max_interval(days(180))
        .all(ctx.howmany, true)
}

fn photometric_standard(ctx: &RuleContext<'_>) -> EvalResult<Lookup> {
    ctx.query()
        .photometric_standard(false)
        .filter(Predicate::eq(PhotStandard, true))
        .match_descriptors(&[FilterName, Camera])
        .max_interval(days(1))
        .all(ctx.howmany, true)
}

fn telluric_standard(ctx: &RuleContext<'_>) -> EvalResult<Lookup> {
    ctx.query()
        .telluric_standard(false)
        .observation_class(ObservationClass::PartnerCal)
        .match_descriptors(&[FilterName, Camera, FocalPlaneMask, Disperser])
        .tolerance(&[(CentralWavelength, 0.001)], true)
        .max_interval(days(1))
        .all(ctx.howmany, true)
}
