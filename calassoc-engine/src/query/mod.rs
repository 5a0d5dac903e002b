//! Candidate query builder
//!
//! Rule modules describe a calibration lookup as a chain on `CalQuery`:
//! exact descriptor matches against the reference, numeric tolerances,
//! literal filters, a temporal window and an ordering. `all()` turns the chain
//! into a `Lookup` the evaluator executes against a metadata store.
//!
//! Builder methods never fail mid-chain. The first error (an unknown
//! descriptor, a temporal rule on a reference without `ut_datetime`) is held
//! and returned by `all()`, so rule code stays a single expression.

mod plan;
mod predicate;

pub use plan::{OrderKey, QueryPlan};
pub use predicate::{like_match, Predicate};

use crate::error::{EvalError, EvalResult};
use calassoc_common::{
    Descriptor, DescriptorSet, ObservationClass, ObservationType, ReductionState, Value,
};
use chrono::{DateTime, Duration, Utc};
use tracing::trace;

/// Result of building a category lookup
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    /// Nothing to look up (guarded out or not meaningful for this reference)
    Empty,
    Query(QueryPlan),
}

/// Chainable lookup description anchored on a reference observation
#[derive(Debug)]
pub struct CalQuery<'a> {
    module: &'static str,
    reference: &'a DescriptorSet,
    predicates: Vec<Predicate>,
    window: Option<Duration>,
    order: Vec<OrderKey>,
    needs_time: bool,
    error: Option<EvalError>,
}

impl<'a> CalQuery<'a> {
    /// Canonical, non-Fail observations of the reference's instrument
    pub fn base(module: &'static str, reference: &'a DescriptorSet) -> Self {
        Self {
            module,
            reference,
            predicates: Vec::new(),
            window: None,
            order: Vec::new(),
            needs_time: false,
            error: None,
        }
    }

    pub fn reference(&self) -> &'a DescriptorSet {
        self.reference
    }

    pub fn module(&self) -> &'static str {
        self.module
    }

    fn fail(mut self, error: EvalError) -> Self {
        if self.error.is_none() {
            self.error = Some(error);
        }
        self
    }

    /// Reference value, or an error if the module never surfaced it
    fn reference_value(&self, descriptor: Descriptor) -> Result<Option<&'a Value>, EvalError> {
        self.reference
            .lookup(descriptor)
            .ok_or(EvalError::UnknownDescriptor {
                descriptor,
                module: self.module,
            })
    }

    fn reference_time(&self) -> Option<DateTime<Utc>> {
        self.reference.time(Descriptor::UtDatetime)
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn add_filters(mut self, predicates: impl IntoIterator<Item = Predicate>) -> Self {
        self.predicates.extend(predicates);
        self
    }

    pub fn reduction(self, state: ReductionState) -> Self {
        self.filter(Predicate::eq(Descriptor::ReductionState, state.as_str()))
    }

    pub fn raw(self) -> Self {
        self.reduction(ReductionState::Raw)
    }

    pub fn observation_type(self, observation_type: ObservationType) -> Self {
        self.filter(Predicate::eq(
            Descriptor::ObservationType,
            observation_type.as_str(),
        ))
    }

    pub fn observation_class(self, class: ObservationClass) -> Self {
        self.filter(Predicate::eq(Descriptor::ObservationClass, class.as_str()))
    }

    pub fn observation_classes(self, classes: &[ObservationClass]) -> Self {
        self.filter(Predicate::one_of(
            Descriptor::ObservationClass,
            classes.iter().map(|c| c.as_str()),
        ))
    }

    pub fn object(self, name: &str) -> Self {
        self.filter(Predicate::eq(Descriptor::Object, name))
    }

    pub fn spectroscopy(self, flag: bool) -> Self {
        self.filter(Predicate::eq(Descriptor::Spectroscopy, flag))
    }

    /// GCAL lamp is one of `lamps`
    pub fn gcal_lamp(self, lamps: &[&str]) -> Self {
        self.filter(Predicate::one_of(Descriptor::GcalLamp, lamps.iter().copied()))
    }

    /// Candidate value equals the reference value for each descriptor
    ///
    /// A missing reference value matches candidates that are also missing it.
    pub fn match_descriptors(mut self, descriptors: &[Descriptor]) -> Self {
        for descriptor in descriptors {
            match self.reference_value(*descriptor) {
                Ok(value) => {
                    self.predicates
                        .push(Predicate::Eq(*descriptor, value.cloned()));
                }
                Err(e) => return self.fail(e),
            }
        }
        self
    }

    /// Candidate text contains the reference text
    ///
    /// Dropped when the reference has no value.
    pub fn match_containing(self, descriptor: Descriptor) -> Self {
        match self.reference_value(descriptor) {
            Ok(Some(Value::Text(needle))) => {
                let needle = needle.clone();
                self.filter(Predicate::contains(descriptor, needle))
            }
            Ok(_) => self,
            Err(e) => self.fail(e),
        }
    }

    /// `|candidate - reference| < delta` for each numeric descriptor
    ///
    /// `condition = false` disables the whole group. A missing reference value
    /// silently drops that descriptor's clause.
    pub fn tolerance(mut self, clauses: &[(Descriptor, f64)], condition: bool) -> Self {
        if !condition {
            return self;
        }
        for (descriptor, delta) in clauses {
            match self.reference_value(*descriptor) {
                Ok(Some(value)) => match value.as_f64() {
                    Some(center) => self.predicates.push(Predicate::Within {
                        descriptor: *descriptor,
                        center,
                        delta: *delta,
                    }),
                    None => trace!(
                        descriptor = %descriptor,
                        "Non-numeric reference value, tolerance clause dropped"
                    ),
                },
                Ok(None) => trace!(
                    descriptor = %descriptor,
                    "Reference value missing, tolerance clause dropped"
                ),
                Err(e) => return self.fail(e),
            }
        }
        self
    }

    /// Candidates taken strictly before the reference
    pub fn before_reference(mut self) -> Self {
        self.needs_time = true;
        match self.reference_time() {
            Some(t) => self.filter(Predicate::lt(Descriptor::UtDatetime, t)),
            None => self,
        }
    }

    /// Candidates taken strictly after the reference
    pub fn after_reference(mut self) -> Self {
        self.needs_time = true;
        match self.reference_time() {
            Some(t) => self.filter(Predicate::gt(Descriptor::UtDatetime, t)),
            None => self,
        }
    }

    /// `|candidate.ut_datetime - reference.ut_datetime| <= window`
    pub fn max_interval(mut self, window: Duration) -> Self {
        self.window = Some(window);
        self
    }

    /// Caller ordering, used verbatim by `all(_, false)`
    pub fn order_by(mut self, keys: Vec<OrderKey>) -> Self {
        self.order = keys;
        self
    }

    /// Apply `f` only when `condition` holds
    pub fn when(self, condition: bool, f: impl FnOnce(Self) -> Self) -> Self {
        if condition {
            f(self)
        } else {
            self
        }
    }

    /// Raw frames of `raw_type`, or the processed product `processed_state`
    pub fn category(self, processed: bool, raw_type: ObservationType, processed_state: ReductionState) -> Self {
        if processed {
            self.reduction(processed_state)
        } else {
            self.raw().observation_type(raw_type)
        }
    }

    pub fn bias(self, processed: bool) -> Self {
        self.category(processed, ObservationType::Bias, ReductionState::ProcessedBias)
    }

    pub fn dark(self, processed: bool) -> Self {
        self.category(processed, ObservationType::Dark, ReductionState::ProcessedDark)
    }

    pub fn flat(self, processed: bool) -> Self {
        self.category(processed, ObservationType::Flat, ReductionState::ProcessedFlat)
    }

    pub fn arc(self, processed: bool) -> Self {
        self.category(processed, ObservationType::Arc, ReductionState::ProcessedArc)
    }

    pub fn pinhole(self, processed: bool) -> Self {
        self.category(processed, ObservationType::Pinhole, ReductionState::ProcessedPinhole)
    }

    /// Standard star frames; `spectroscopy` selects spectroscopic or imaging standards
    fn standard(self, processed: bool, spectroscopy: bool) -> Self {
        self.category(processed, ObservationType::Object, ReductionState::ProcessedStandard)
            .spectroscopy(spectroscopy)
    }

    pub fn photometric_standard(self, processed: bool) -> Self {
        self.standard(processed, false)
    }

    pub fn telluric_standard(self, processed: bool) -> Self {
        self.standard(processed, true)
    }

    /// Finish the chain
    ///
    /// `default_order = true` ranks by temporal proximity; otherwise the
    /// `order_by` keys are used verbatim. Either way id ascending breaks ties.
    pub fn all(self, limit: usize, default_order: bool) -> EvalResult<Lookup> {
        if let Some(error) = self.error {
            return Err(error);
        }

        let order = if default_order {
            vec![OrderKey::TimeProximity]
        } else {
            self.order
        };

        let reference_time = self.reference.time(Descriptor::UtDatetime);
        let temporal = self.needs_time
            || self.window.is_some()
            || order.iter().any(|k| *k == OrderKey::TimeProximity);
        if temporal && reference_time.is_none() {
            return Err(EvalError::MissingTemporal {
                observation: self.reference.id(),
            });
        }

        if limit == 0 {
            return Ok(Lookup::Empty);
        }

        let instrument = self
            .reference
            .text(Descriptor::Instrument)
            .unwrap_or_default()
            .to_string();

        Ok(Lookup::Query(QueryPlan {
            instrument,
            reference_id: self.reference.id(),
            reference_time,
            predicates: self.predicates,
            window: self.window,
            order,
            limit,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calassoc_common::observation::{GmosBlock, InstrumentBlock};
    use calassoc_common::{Instrument, Observation, ObservationId};
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn reference() -> Observation {
        let mut obs = Observation::new(1, Instrument::GmosN, ObservationType::Object);
        obs.ut_datetime = Some(at(2014, 6, 1));
        obs.detector_binning = Some("2x2".to_string());
        obs.exposure_time = Some(300.0);
        obs.block = InstrumentBlock::Gmos(GmosBlock {
            amp_read_area: Some("a+b+c+d".to_string()),
            ..Default::default()
        });
        obs
    }

    fn bias(id: i64, when: DateTime<Utc>, binning: &str) -> Observation {
        let mut obs = Observation::new(id, Instrument::GmosN, ObservationType::Bias);
        obs.ut_datetime = Some(when);
        obs.detector_binning = Some(binning.to_string());
        obs
    }

    fn plan(lookup: Lookup) -> QueryPlan {
        match lookup {
            Lookup::Query(plan) => plan,
            Lookup::Empty => panic!("expected a query"),
        }
    }

    #[test]
    fn test_unknown_descriptor_is_held_until_all() {
        let obs = reference();
        let desc = DescriptorSet::surfaced(&obs, &[Descriptor::AmpReadArea]);
        let result = CalQuery::base("GMOS", &desc)
            .bias(false)
            .match_descriptors(&[Descriptor::ReadMode])
            .tolerance(&[(Descriptor::Coadds, 1.0)], true)
            .all(10, true);
        match result {
            Err(EvalError::UnknownDescriptor { descriptor, module }) => {
                assert_eq!(descriptor, Descriptor::ReadMode);
                assert_eq!(module, "GMOS");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_tolerance_dropped_for_missing_reference_or_condition() {
        let obs = reference();
        let desc = DescriptorSet::surfaced(&obs, &[]);
        let plan = plan(
            CalQuery::base("GMOS", &desc)
                .tolerance(&[(Descriptor::CentralWavelength, 0.001)], true)
                .tolerance(&[(Descriptor::ExposureTime, 50.0)], false)
                .all(5, true)
                .unwrap(),
        );
        assert!(plan.predicates().is_empty());
    }

    #[test]
    fn test_missing_reference_time_is_error() {
        let mut obs = reference();
        obs.ut_datetime = None;
        let desc = DescriptorSet::surfaced(&obs, &[]);
        let result = CalQuery::base("GMOS", &desc).bias(false).all(5, true);
        assert!(matches!(result, Err(EvalError::MissingTemporal { .. })));

        // Purely attribute-ordered lookups do not need a time
        let ok = CalQuery::base("GMOS", &desc)
            .bias(false)
            .order_by(vec![OrderKey::Ascending(Descriptor::ExposureTime)])
            .all(5, false);
        assert!(ok.is_ok());
    }

    #[test]
    fn test_window_is_inclusive_and_ordering_is_by_proximity() {
        let obs = reference();
        let desc = DescriptorSet::surfaced(&obs, &[]);
        let plan = plan(
            CalQuery::base("GMOS", &desc)
                .bias(false)
                .match_descriptors(&[Descriptor::DetectorXBin, Descriptor::DetectorYBin])
                .max_interval(Duration::days(10))
                .all(10, true)
                .unwrap(),
        );

        let pool = vec![
            bias(10, at(2014, 5, 22), "2x2"), // exactly 10 days
            bias(11, at(2014, 5, 21), "2x2"), // 11 days
            bias(12, at(2014, 6, 3), "2x2"),
            bias(13, at(2014, 5, 28), "2x2"),
            bias(14, at(2014, 6, 3), "2x2"), // tie with 12
            bias(15, at(2014, 6, 1), "1x1"),
            reference(),
        ];
        let selected = plan.select(pool);
        assert_eq!(
            selected,
            vec![ObservationId(12), ObservationId(14), ObservationId(13), ObservationId(10)]
        );
    }

    #[test]
    fn test_limit_and_caller_order() {
        let obs = reference();
        let desc = DescriptorSet::surfaced(&obs, &[]);
        let plan = plan(
            CalQuery::base("GMOS", &desc)
                .bias(false)
                .order_by(vec![
                    OrderKey::Prefer(Predicate::eq(Descriptor::DetectorBinning, "1x1")),
                    OrderKey::TimeProximity,
                ])
                .all(2, false)
                .unwrap(),
        );
        let pool = vec![
            bias(20, at(2014, 5, 31), "2x2"),
            bias(21, at(2014, 1, 1), "1x1"),
            bias(22, at(2014, 5, 1), "1x1"),
        ];
        assert_eq!(plan.select(pool), vec![ObservationId(22), ObservationId(21)]);
    }

    #[test]
    fn test_when_and_containment() {
        let obs = reference();
        let desc = DescriptorSet::surfaced(&obs, &[Descriptor::AmpReadArea]);
        let plan = plan(
            CalQuery::base("GMOS", &desc)
                .when(false, |q| q.object("Twilight"))
                .when(true, |q| q.match_containing(Descriptor::AmpReadArea))
                .all(1, true)
                .unwrap(),
        );
        assert_eq!(
            plan.predicates(),
            &[Predicate::contains(Descriptor::AmpReadArea, "a+b+c+d")]
        );
    }

    #[test]
    fn test_zero_limit_is_empty() {
        let obs = reference();
        let desc = DescriptorSet::surfaced(&obs, &[]);
        assert_eq!(CalQuery::base("GMOS", &desc).bias(true).all(0, true).unwrap(), Lookup::Empty);
    }
}
