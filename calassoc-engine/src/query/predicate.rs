//! Candidate predicates
//!
//! The closed set of clauses a query can carry. Every predicate is evaluated
//! against a candidate's full descriptor set; literals and reference values
//! are captured when the predicate is built.
//!
//! Comparisons follow SQL NULL semantics: a candidate with no value for the
//! descriptor fails every comparison except `Eq(_, None)`.

use calassoc_common::{Descriptor, DescriptorSet, Value};
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Equal to the value; `None` matches only candidates with no value
    Eq(Descriptor, Option<Value>),
    Ne(Descriptor, Value),
    In(Descriptor, Vec<Value>),
    NotIn(Descriptor, Vec<Value>),
    /// Text contains the substring
    Contains(Descriptor, String),
    StartsWith(Descriptor, String),
    /// SQL LIKE: `%` any run, `_` one character, case-sensitive
    Like(Descriptor, String),
    Lt(Descriptor, Value),
    Gt(Descriptor, Value),
    /// `|candidate - center| < delta`
    Within {
        descriptor: Descriptor,
        center: f64,
        delta: f64,
    },
    /// Type tag present
    HasType(String),
    Not(Box<Predicate>),
    Any(Vec<Predicate>),
    All(Vec<Predicate>),
}

impl Predicate {
    pub fn eq(descriptor: Descriptor, value: impl Into<Value>) -> Self {
        Predicate::Eq(descriptor, Some(value.into()))
    }

    pub fn ne(descriptor: Descriptor, value: impl Into<Value>) -> Self {
        Predicate::Ne(descriptor, value.into())
    }

    pub fn one_of<V: Into<Value>>(descriptor: Descriptor, values: impl IntoIterator<Item = V>) -> Self {
        Predicate::In(descriptor, values.into_iter().map(Into::into).collect())
    }

    pub fn none_of<V: Into<Value>>(descriptor: Descriptor, values: impl IntoIterator<Item = V>) -> Self {
        Predicate::NotIn(descriptor, values.into_iter().map(Into::into).collect())
    }

    pub fn contains(descriptor: Descriptor, needle: impl Into<String>) -> Self {
        Predicate::Contains(descriptor, needle.into())
    }

    pub fn starts_with(descriptor: Descriptor, prefix: impl Into<String>) -> Self {
        Predicate::StartsWith(descriptor, prefix.into())
    }

    pub fn like(descriptor: Descriptor, pattern: impl Into<String>) -> Self {
        Predicate::Like(descriptor, pattern.into())
    }

    pub fn lt(descriptor: Descriptor, value: impl Into<Value>) -> Self {
        Predicate::Lt(descriptor, value.into())
    }

    pub fn gt(descriptor: Descriptor, value: impl Into<Value>) -> Self {
        Predicate::Gt(descriptor, value.into())
    }

    pub fn has_type(tag: impl Into<String>) -> Self {
        Predicate::HasType(tag.into())
    }

    pub fn not(inner: Predicate) -> Self {
        Predicate::Not(Box::new(inner))
    }

    /// Does the candidate satisfy this clause
    pub fn matches(&self, candidate: &DescriptorSet) -> bool {
        match self {
            Predicate::Eq(d, Some(expected)) => candidate
                .get(*d)
                .is_some_and(|v| v.matches(expected)),
            Predicate::Eq(d, None) => candidate.get(*d).is_none(),
            Predicate::Ne(d, other) => candidate.get(*d).is_some_and(|v| !v.matches(other)),
            Predicate::In(d, set) => candidate
                .get(*d)
                .is_some_and(|v| set.iter().any(|s| v.matches(s))),
            Predicate::NotIn(d, set) => candidate
                .get(*d)
                .is_some_and(|v| !set.iter().any(|s| v.matches(s))),
            Predicate::Contains(d, needle) => candidate
                .text(*d)
                .is_some_and(|t| t.contains(needle.as_str())),
            Predicate::StartsWith(d, prefix) => candidate
                .text(*d)
                .is_some_and(|t| t.starts_with(prefix.as_str())),
            Predicate::Like(d, pattern) => candidate
                .text(*d)
                .is_some_and(|t| like_match(t, pattern)),
            Predicate::Lt(d, bound) => candidate
                .get(*d)
                .is_some_and(|v| v.compare(bound) == Some(Ordering::Less)),
            Predicate::Gt(d, bound) => candidate
                .get(*d)
                .is_some_and(|v| v.compare(bound) == Some(Ordering::Greater)),
            Predicate::Within {
                descriptor,
                center,
                delta,
            } => candidate
                .number(*descriptor)
                .is_some_and(|v| (v - center).abs() < *delta),
            Predicate::HasType(tag) => candidate.has_type(tag),
            Predicate::Not(inner) => !inner.matches(candidate),
            Predicate::Any(options) => options.iter().any(|p| p.matches(candidate)),
            Predicate::All(parts) => parts.iter().all(|p| p.matches(candidate)),
        }
    }

    /// Text literal this predicate pins a descriptor to, if it is a plain equality
    pub fn pinned_text(&self, descriptor: Descriptor) -> Option<&str> {
        match self {
            Predicate::Eq(d, Some(Value::Text(text))) if *d == descriptor => Some(text),
            _ => None,
        }
    }
}

/// SQL LIKE matching over characters
pub fn like_match(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();

    // Greedy two-pointer match with backtracking to the last '%'
    let (mut t, mut p) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '_' || pattern[p] == text[t]) {
            t += 1;
            p += 1;
        } else if p < pattern.len() && pattern[p] == '%' {
            star = Some((p, t));
            p += 1;
        } else if let Some((star_p, star_t)) = star {
            p = star_p + 1;
            t = star_t + 1;
            star = Some((star_p, star_t + 1));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|c| *c == '%')
}

#[cfg(test)]
mod tests {
    use super::*;
    use calassoc_common::observation::{GmosBlock, InstrumentBlock};
    use calassoc_common::{Instrument, Observation, ObservationType};

    fn candidate() -> DescriptorSet {
        let mut obs = Observation::new(3, Instrument::GmosS, ObservationType::Flat);
        obs.focal_plane_mask = Some("0.75arcsec".to_string());
        obs.central_wavelength = Some(0.52);
        obs.exposure_time = Some(60.0);
        obs.program_id = Some("GS-CAL20140601".to_string());
        obs.types.insert("LS".to_string());
        obs.block = InstrumentBlock::Gmos(GmosBlock {
            amp_read_area: Some("a+b+c+d".to_string()),
            ..Default::default()
        });
        DescriptorSet::from_observation(&obs)
    }

    #[test]
    fn test_like_patterns() {
        assert!(like_match("0.75arcsec", "%arcsec"));
        assert!(like_match("GS-CAL20140601", "G_-CAL%"));
        assert!(!like_match("GS-ENG20140601", "G_-CAL%"));
        assert!(like_match("abc", "a%c"));
        assert!(like_match("ac", "a%c"));
        assert!(!like_match("ab", "a%c"));
        assert!(like_match("", "%"));
        assert!(!like_match("ARCSEC", "%arcsec"));
    }

    #[test]
    fn test_null_semantics() {
        let c = candidate();
        assert!(Predicate::Eq(Descriptor::Disperser, None).matches(&c));
        assert!(!Predicate::eq(Descriptor::Disperser, "B600").matches(&c));
        assert!(!Predicate::ne(Descriptor::Disperser, "B600").matches(&c));
        assert!(!Predicate::none_of(Descriptor::Disperser, ["B600"]).matches(&c));
        assert!(Predicate::not(Predicate::eq(Descriptor::Disperser, "B600")).matches(&c));
    }

    #[test]
    fn test_text_and_numeric_clauses() {
        let c = candidate();
        assert!(Predicate::contains(Descriptor::AmpReadArea, "b+c").matches(&c));
        assert!(Predicate::starts_with(Descriptor::ProgramId, "GS-CAL").matches(&c));
        assert!(Predicate::one_of(Descriptor::ObservationType, ["FLAT", "ARC"]).matches(&c));
        assert!(Predicate::has_type("LS").matches(&c));
        assert!(!Predicate::has_type("MOS").matches(&c));

        let within = |delta| Predicate::Within {
            descriptor: Descriptor::ExposureTime,
            center: 50.0,
            delta,
        };
        assert!(within(10.5).matches(&c));
        // Strict inequality at the boundary
        assert!(!within(10.0).matches(&c));
        assert!(Predicate::gt(Descriptor::CentralWavelength, 0.5).matches(&c));
        assert!(!Predicate::lt(Descriptor::CentralWavelength, 0.5).matches(&c));
    }

    #[test]
    fn test_pinned_text() {
        let p = Predicate::eq(Descriptor::ReductionState, "RAW");
        assert_eq!(p.pinned_text(Descriptor::ReductionState), Some("RAW"));
        assert_eq!(p.pinned_text(Descriptor::ObservationType), None);
    }
}
