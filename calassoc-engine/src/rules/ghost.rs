//! GHOST rules
//!
//! Fibre-fed echelle spectrograph. Calibrations follow the GMOS families,
//! matched on resolution mode, plus the slit-viewer products.

use super::common::{
    amp_read_area, bias_applicable, both, class_in, days, is_opaque, overscan, seconds,
    spectroscopy_flat_clamp, spectroscopy_object, TWILIGHT,
};
use super::{CalKind, Category, CategoryRule, Guard, RuleContext, RuleModule};
use crate::error::EvalResult;
use crate::query::{Lookup, Predicate};
use calassoc_common::Descriptor::*;
use calassoc_common::{DescriptorSet, ObservationClass, ObservationType, ReductionState};

/// Detector name prefix of the slit-viewing camera
const SLIT_CAMERA: &str = "Sony-ICX674";

const STANDARD_CLASSES: &[ObservationClass] =
    &[ObservationClass::PartnerCal, ObservationClass::ProgCal];

pub static GHOST: RuleModule = RuleModule {
    name: "GHOST",
    instr_descriptors: &[
        ResMode,
        DetectorName,
        AmpReadArea,
        ReadSpeedSetting,
        GainSetting,
        WantBeforeArc,
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
            kind: CalKind::Flat,
            guards: &[],
            raw_limit: 10,
            processed_limit: 1,
            build: flat,
        },
        CategoryRule {
            kind: CalKind::Arc,
            guards: &[],
            raw_limit: 1,
            processed_limit: 1,
            build: arc,
        },
        CategoryRule {
            kind: CalKind::Slitflat,
            guards: &[Guard::OnlyProcessed],
            raw_limit: 0,
            processed_limit: 1,
            build: slitflat,
        },
        CategoryRule {
            kind: CalKind::Slit,
            guards: &[Guard::OnlyProcessed],
            raw_limit: 0,
            processed_limit: 1,
            build: slit,
        },
        CategoryRule {
            kind: CalKind::Specphot,
            guards: &[Guard::NotProcessed, Guard::NotImaging],
            raw_limit: 4,
            processed_limit: 0,
            build: specphot,
        },
    ],
    reverse_window_days: 365,
};

fn set_applicable(d: &DescriptorSet) -> Vec<Category> {
    if is_opaque(d) {
        return Vec::new();
    }

    let mut categories = Vec::new();

    if bias_applicable(d, false) {
        categories.extend(both(CalKind::Bias));
    }

    if spectroscopy_object(d) && !class_in(d, STANDARD_CLASSES) {
        categories.extend(both(CalKind::Arc));
        categories.extend(both(CalKind::Flat));
        categories.push(Category::processed(CalKind::Slitflat));
        categories.push(Category::processed(CalKind::Slit));
        categories.push(Category::raw(CalKind::Specphot));
    }

    categories
}

fn bias(ctx: &RuleContext<'_>) -> EvalResult<Lookup> {
    let q = ctx
        .query()
        .bias(ctx.processed)
        .match_descriptors(&[DetectorXBin, DetectorYBin, ReadSpeedSetting, GainSetting]);
    let (q, default_order) = overscan(amp_read_area(q), ctx.processed);
    q.max_interval(days(90)).all(ctx.howmany, default_order)
}

fn flat(ctx: &RuleContext<'_>) -> EvalResult<Lookup> {
    let q = ctx
        .query()
        .flat(ctx.processed)
        .match_descriptors(&[ResMode, DetectorXBin, DetectorYBin, ReadSpeedSetting]);
    spectroscopy_flat_clamp(q)
        .max_interval(days(180))
        .all(ctx.howmany, true)
}

/// Arcs bracket the science: `want_before_arc` picks the side
fn arc(ctx: &RuleContext<'_>) -> EvalResult<Lookup> {
    let want_before = ctx.reference.flag(WantBeforeArc);
    ctx.query()
        .arc(ctx.processed)
        .match_descriptors(&[ResMode, DetectorXBin, DetectorYBin])
        .when(want_before == Some(true), |q| q.before_reference())
        .when(want_before == Some(false), |q| q.after_reference())
        .max_interval(days(365))
        .all(ctx.howmany, true)
}

fn slitflat(ctx: &RuleContext<'_>) -> EvalResult<Lookup> {
    ctx.query()
        .reduction(ReductionState::ProcessedSlitflat)
        .match_descriptors(&[ResMode])
        .max_interval(days(180))
        .all(ctx.howmany, true)
}

/// Slit-viewer product taken alongside the science exposure
fn slit(ctx: &RuleContext<'_>) -> EvalResult<Lookup> {
    ctx.query()
        .reduction(ReductionState::ProcessedSlit)
        .filter(Predicate::starts_with(DetectorName, SLIT_CAMERA))
        .max_interval(seconds(30))
        .all(ctx.howmany, true)
}

fn specphot(ctx: &RuleContext<'_>) -> EvalResult<Lookup> {
    ctx.query()
        .raw()
        .observation_type(ObservationType::Object)
        .spectroscopy(true)
        .observation_classes(STANDARD_CLASSES)
        .filter(Predicate::ne(Object, TWILIGHT))
        .match_descriptors(&[ResMode])
        .max_interval(days(365))
        .all(ctx.howmany, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QueryPlan;
    use calassoc_common::observation::{GhostBlock, InstrumentBlock};
    use calassoc_common::{Instrument, Observation};
    use chrono::{TimeZone, Utc};

    fn science() -> Observation {
        let mut obs = Observation::new(1, Instrument::Ghost, ObservationType::Object);
        obs.observation_class = Some(ObservationClass::Science);
        obs.object = Some("HD 1234".to_string());
        obs.spectroscopy = true;
        obs.ut_datetime = Some(Utc.with_ymd_and_hms(2023, 3, 1, 4, 0, 0).unwrap());
        obs.block = InstrumentBlock::Ghost(GhostBlock {
            res_mode: Some("std".to_string()),
            want_before_arc: Some(true),
            ..Default::default()
        });
        obs
    }

    fn plan(lookup: Lookup) -> QueryPlan {
        match lookup {
            Lookup::Query(plan) => plan,
            Lookup::Empty => panic!("expected a query"),
        }
    }

    #[test]
    fn test_partner_cal_is_not_science_set() {
        let obs = science();
        let d = DescriptorSet::surfaced(&obs, GHOST.instr_descriptors);
        assert!(GHOST.applicable(&d).contains(&Category::processed(CalKind::Slit)));

        let mut standard = science();
        standard.observation_class = Some(ObservationClass::PartnerCal);
        let d = DescriptorSet::surfaced(&standard, GHOST.instr_descriptors);
        assert_eq!(GHOST.applicable(&d), both(CalKind::Bias).to_vec());
    }

    #[test]
    fn test_arc_side_follows_want_before_arc() {
        let obs = science();
        let d = DescriptorSet::surfaced(&obs, GHOST.instr_descriptors);
        let ctx = RuleContext {
            module: GHOST.name,
            reference: &d,
            processed: false,
            howmany: 1,
        };
        let before = plan(arc(&ctx).unwrap());
        assert!(before
            .predicates()
            .contains(&Predicate::lt(UtDatetime, obs.ut_datetime.unwrap())));

        let mut after = science();
        after.block = InstrumentBlock::Ghost(GhostBlock {
            res_mode: Some("std".to_string()),
            want_before_arc: Some(false),
            ..Default::default()
        });
        let d = DescriptorSet::surfaced(&after, GHOST.instr_descriptors);
        let ctx = RuleContext { reference: &d, ..ctx };
        let plan = plan(arc(&ctx).unwrap());
        assert!(plan
            .predicates()
            .contains(&Predicate::gt(UtDatetime, after.ut_datetime.unwrap())));
    }

    #[test]
    fn test_slit_window_is_thirty_seconds() {
        let obs = science();
        let d = DescriptorSet::surfaced(&obs, GHOST.instr_descriptors);
        let ctx = RuleContext {
            module: GHOST.name,
            reference: &d,
            processed: true,
            howmany: 1,
        };
        let plan = plan(slit(&ctx).unwrap());
        let (lower, upper) = plan.time_bounds().unwrap();
        assert_eq!(upper - lower, chrono::Duration::seconds(60));
    }
}
