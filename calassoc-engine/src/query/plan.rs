//! Executable candidate query
//!
//! A `QueryPlan` is what the builder hands to a metadata store. Stores are free
//! to narrow the candidate pool however they like (the SQLite store pushes
//! instrument, canonical and time bounds into SQL) but must finish with
//! `QueryPlan::select`, which applies the full semantics.

use super::predicate::Predicate;
use calassoc_common::{Descriptor, DescriptorSet, Observation, ObservationId};
use chrono::{DateTime, Duration, Utc};
use std::cmp::Ordering;

/// One sort key; id ascending is always appended as the final tie-breaker
#[derive(Debug, Clone, PartialEq)]
pub enum OrderKey {
    /// Absolute separation from the reference `ut_datetime`, nearest first
    TimeProximity,
    Ascending(Descriptor),
    Descending(Descriptor),
    /// Candidates satisfying the predicate first
    Prefer(Predicate),
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    pub(crate) instrument: String,
    pub(crate) reference_id: ObservationId,
    pub(crate) reference_time: Option<DateTime<Utc>>,
    pub(crate) predicates: Vec<Predicate>,
    pub(crate) window: Option<Duration>,
    pub(crate) order: Vec<OrderKey>,
    pub(crate) limit: usize,
}

impl QueryPlan {
    /// Instrument string candidates must carry
    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    pub fn reference_id(&self) -> ObservationId {
        self.reference_id
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn order(&self) -> &[OrderKey] {
        &self.order
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Inclusive `ut_datetime` bounds implied by `max_interval`
    pub fn time_bounds(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let (time, window) = (self.reference_time?, self.window?);
        Some((time - window, time + window))
    }

    /// Text a top-level equality pins `descriptor` to
    pub fn pinned_text(&self, descriptor: Descriptor) -> Option<&str> {
        self.predicates.iter().find_map(|p| p.pinned_text(descriptor))
    }

    fn is_temporal(&self) -> bool {
        self.window.is_some() || self.order.iter().any(|k| *k == OrderKey::TimeProximity)
    }

    /// Full filter for one candidate
    pub fn admits(&self, candidate: &Observation) -> bool {
        self.admits_with(candidate, &DescriptorSet::from_observation(candidate))
    }

    fn admits_with(&self, candidate: &Observation, descriptors: &DescriptorSet) -> bool {
        if !candidate.is_candidate()
            || candidate.id == self.reference_id
            || candidate.instrument.as_str() != self.instrument
        {
            return false;
        }

        if self.is_temporal() && candidate.ut_datetime.is_none() {
            return false;
        }

        if let Some((lower, upper)) = self.time_bounds() {
            match candidate.ut_datetime {
                Some(t) if t >= lower && t <= upper => {}
                _ => return false,
            }
        }

        self.predicates.iter().all(|p| p.matches(descriptors))
    }

    /// Filter, order and cap a candidate pool
    pub fn select<I>(&self, pool: I) -> Vec<ObservationId>
    where
        I: IntoIterator<Item = Observation>,
    {
        let mut admitted: Vec<(Observation, DescriptorSet)> = pool
            .into_iter()
            .map(|obs| {
                let descriptors = DescriptorSet::from_observation(&obs);
                (obs, descriptors)
            })
            .filter(|(obs, descriptors)| self.admits_with(obs, descriptors))
            .collect();

        admitted.sort_by(|a, b| self.compare(a, b));
        admitted
            .into_iter()
            .take(self.limit)
            .map(|(obs, _)| obs.id)
            .collect()
    }

    fn compare(&self, a: &(Observation, DescriptorSet), b: &(Observation, DescriptorSet)) -> Ordering {
        for key in &self.order {
            let ordering = match key {
                OrderKey::TimeProximity => {
                    missing_last(self.separation(&a.0), self.separation(&b.0), |x, y| x.cmp(y))
                }
                OrderKey::Ascending(d) => missing_last(a.1.get(*d), b.1.get(*d), |x, y| {
                    x.compare(y).unwrap_or(Ordering::Equal)
                }),
                OrderKey::Descending(d) => missing_last(a.1.get(*d), b.1.get(*d), |x, y| {
                    y.compare(x).unwrap_or(Ordering::Equal)
                }),
                OrderKey::Prefer(p) => p.matches(&b.1).cmp(&p.matches(&a.1)),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        a.0.id.cmp(&b.0.id)
    }

    fn separation(&self, candidate: &Observation) -> Option<Duration> {
        let reference = self.reference_time?;
        let time = candidate.ut_datetime?;
        Some((time - reference).abs())
    }
}

fn missing_last<T>(a: Option<T>, b: Option<T>, cmp: impl Fn(&T, &T) -> Ordering) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => cmp(&x, &y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
