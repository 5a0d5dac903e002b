//! MICHELLE rules
//!
//! Mid-IR imager/spectrometer. Only flats are associated.

use super::common::{both, days, is_object, is_opaque, is_twilight};
use super::{CalKind, Category, CategoryRule, RuleContext, RuleModule};
use crate::error::EvalResult;
use crate::query::Lookup;
use calassoc_common::Descriptor::*;
use calassoc_common::DescriptorSet;

pub static MICHELLE: RuleModule = RuleModule {
    name: "MICHELLE",
    instr_descriptors: &[ReadMode],
    set_applicable,
    categories: &[CategoryRule {
        kind: CalKind::Flat,
        guards: &[],
        raw_limit: 10,
        processed_limit: 1,
        build: flat,
    }],
    reverse_window_days: 365,
};

fn set_applicable(d: &DescriptorSet) -> Vec<Category> {
    if is_opaque(d) || !is_object(d) || is_twilight(d) {
        return Vec::new();
    }
    both(CalKind::Flat).to_vec()
}

fn flat(ctx: &RuleContext<'_>) -> EvalResult<Lookup> {
    ctx.query()
        .flat(ctx.processed)
        .match_descriptors(&[Disperser, FocalPlaneMask, FilterName, ReadMode])
        .max_interval(days(365))
        .all(ctx.howmany, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use calassoc_common::{Instrument, Observation, ObservationType, ReductionState};

    fn applicable(obs: &Observation) -> Vec<Category> {
        MICHELLE.applicable(&DescriptorSet::surfaced(obs, MICHELLE.instr_descriptors))
    }

    #[test]
    fn test_only_objects_get_flats() {
        let mut obs = Observation::new(1, Instrument::Michelle, ObservationType::Object);
        obs.spectroscopy = true;
        assert_eq!(applicable(&obs), both(CalKind::Flat).to_vec());

        let flat = Observation::new(2, Instrument::Michelle, ObservationType::Flat);
        assert!(applicable(&flat).is_empty());

        obs.reduction_state = ReductionState::ProcessedScience;
        assert!(applicable(&obs).is_empty());
    }
}
