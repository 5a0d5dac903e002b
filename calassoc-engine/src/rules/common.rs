//! Shared applicability tests and matching fragments
//!
//! Small helpers several instrument modules reuse: reference classification
//! (opaque, science, imaging object ...) and query fragments such as the amp
//! read-area rule and the elevation/rotator clamp for spectroscopy flats.

use super::{CalKind, Category};
use crate::query::{CalQuery, OrderKey, Predicate};
use calassoc_common::{
    Descriptor, DescriptorSet, ObservationClass, ObservationType, ReductionState, RoiSetting,
};
use chrono::Duration;

/// Object name of twilight sky frames
pub const TWILIGHT: &str = "Twilight";

/// Focal plane mask value of imaging frames
pub const IMAGING: &str = "Imaging";

/// Elevation above which the rotator clamp no longer applies
pub const ROTATOR_CLAMP_MAX_ELEVATION: f64 = 85.0;

pub fn days(n: i64) -> Duration {
    Duration::days(n)
}

pub fn hours(n: i64) -> Duration {
    Duration::hours(n)
}

pub fn seconds(n: i64) -> Duration {
    Duration::seconds(n)
}

/// Raw and processed forms of a family
pub fn both(kind: CalKind) -> [Category; 2] {
    [Category::raw(kind), Category::processed(kind)]
}

pub fn is_type(d: &DescriptorSet, observation_type: ObservationType) -> bool {
    d.is(Descriptor::ObservationType, observation_type.as_str())
}

pub fn is_object(d: &DescriptorSet) -> bool {
    is_type(d, ObservationType::Object)
}

pub fn is_spectroscopy(d: &DescriptorSet) -> bool {
    d.flag(Descriptor::Spectroscopy).unwrap_or(false)
}

pub fn is_twilight(d: &DescriptorSet) -> bool {
    d.is(Descriptor::Object, TWILIGHT)
}

pub fn class_in(d: &DescriptorSet, classes: &[ObservationClass]) -> bool {
    classes
        .iter()
        .any(|c| d.is(Descriptor::ObservationClass, c.as_str()))
}

pub fn is_science(d: &DescriptorSet) -> bool {
    class_in(d, &[ObservationClass::Science])
}

pub fn is_acq(d: &DescriptorSet) -> bool {
    class_in(d, &[ObservationClass::Acq, ObservationClass::AcqCal])
}

pub fn roi_is(d: &DescriptorSet, roi: RoiSetting) -> bool {
    d.is(Descriptor::DetectorRoiSetting, roi.as_str())
}

pub fn lamp_in(d: &DescriptorSet, lamps: &[&str]) -> bool {
    d.text(Descriptor::GcalLamp)
        .is_some_and(|lamp| lamps.contains(&lamp))
}

/// MASK frames and reduced science carry no calibrations
pub fn is_opaque(d: &DescriptorSet) -> bool {
    is_type(d, ObservationType::Mask)
        || d.is(
            Descriptor::ReductionState,
            ReductionState::ProcessedScience.as_str(),
        )
}

/// Bias frames are meaningful for everything but biases, arcs, acquisition
/// images and central-stamp readouts
///
/// `custom_acq` additionally excludes acquisitions read out with a custom ROI.
pub fn bias_applicable(d: &DescriptorSet, custom_acq: bool) -> bool {
    let acq_image = is_acq(d) && !is_spectroscopy(d);
    let excluded = is_type(d, ObservationType::Bias)
        || is_type(d, ObservationType::Arc)
        || acq_image
        || roi_is(d, RoiSetting::CentralStamp)
        || (custom_acq && is_acq(d) && roi_is(d, RoiSetting::Custom));
    !excluded
}

/// OBJECT spectroscopy of anything but twilight sky
pub fn spectroscopy_object(d: &DescriptorSet) -> bool {
    is_object(d) && is_spectroscopy(d) && !is_twilight(d)
}

/// OBJECT imaging through the imaging mask, not twilight, not acquisition
pub fn imaging_object(d: &DescriptorSet) -> bool {
    is_object(d)
        && !is_spectroscopy(d)
        && d.is(Descriptor::FocalPlaneMask, IMAGING)
        && !is_twilight(d)
        && !is_acq(d)
}

/// Exact amp read area for full-frame and central-spectrum readouts,
/// containment of the reference value otherwise
pub fn amp_read_area(q: CalQuery<'_>) -> CalQuery<'_> {
    let d = q.reference();
    if roi_is(d, RoiSetting::FullFrame) || roi_is(d, RoiSetting::CentralSpectrum) {
        q.match_descriptors(&[Descriptor::AmpReadArea])
    } else {
        q.match_containing(Descriptor::AmpReadArea)
    }
}

/// Overscan handling for processed biases
///
/// A prepared reference needs the same overscan treatment. Otherwise
/// trimmed and subtracted products are preferred ahead of time proximity.
pub fn overscan(q: CalQuery<'_>, processed: bool) -> (CalQuery<'_>, bool) {
    if !processed {
        return (q, true);
    }
    if q.reference().flag(Descriptor::Prepared) == Some(true) {
        let q = q.match_descriptors(&[Descriptor::OverscanTrimmed, Descriptor::OverscanSubtracted]);
        return (q, true);
    }
    let q = q.order_by(vec![
        OrderKey::Prefer(Predicate::All(vec![
            Predicate::eq(Descriptor::OverscanTrimmed, true),
            Predicate::eq(Descriptor::OverscanSubtracted, true),
        ])),
        OrderKey::TimeProximity,
    ]);
    (q, false)
}

/// Elevation threshold for spectroscopy flats, if one applies
///
/// 7.5 degrees for IFU masks; 15 degrees for red settings (central wavelength
/// above 0.55 um) or the R150 grating.
pub fn spectroscopy_flat_threshold(d: &DescriptorSet) -> Option<f64> {
    let mask = d.text(Descriptor::FocalPlaneMask).unwrap_or_default();
    let disperser = d.text(Descriptor::Disperser).unwrap_or_default();
    let wavelength = d.number(Descriptor::CentralWavelength);

    if mask.starts_with("IFU") {
        Some(7.5)
    } else if wavelength.is_some_and(|w| w > 0.55) || disperser.starts_with("R150") {
        Some(15.0)
    } else {
        None
    }
}

/// Rotator tolerance for elevation threshold `t` at elevation `e` (degrees)
pub fn rotator_threshold(t: f64, e: f64) -> f64 {
    t / e.to_radians().cos()
}

/// Flexure clamp on spectroscopy flats: elevation within the threshold and,
/// below 85 degrees, rotator angle within `t / cos(e)`
pub fn spectroscopy_flat_clamp(q: CalQuery<'_>) -> CalQuery<'_> {
    let d = q.reference();
    let Some(t) = spectroscopy_flat_threshold(d) else {
        return q;
    };
    let q = q.tolerance(&[(Descriptor::Elevation, t)], true);
    match d.number(Descriptor::Elevation) {
        Some(e) if e < ROTATOR_CLAMP_MAX_ELEVATION => {
            q.tolerance(&[(Descriptor::CassRotatorPa, rotator_threshold(t, e))], true)
        }
        _ => q,
    }
}
