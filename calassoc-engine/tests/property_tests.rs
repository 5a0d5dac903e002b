//! Rule-set properties: applicability stays inside each module's declared
//! categories, every module evaluates cleanly, and exact-match categories
//! are symmetric between reference and candidate.

mod helpers;

use calassoc_common::{
    Descriptor, DescriptorSet, GcalLamp, Instrument, Observation, ObservationClass,
    ObservationType, RoiSetting,
};
use calassoc_engine::query::{Lookup, Predicate};
use calassoc_engine::{CalKind, Category, Evaluator, InMemoryStore, MetadataStore};
use helpers::*;

const INSTRUMENTS: &[&str] = &[
    "GMOS-N", "GMOS-S", "NIRI", "GNIRS", "NIFS", "NICI", "GSAOI", "GPI", "F2", "michelle",
    "GHOST", "bHROS",
];

/// A spread of references across types, classes and modes
fn sample_references() -> Vec<Observation> {
    let mut samples = Vec::new();
    let mut id = 1;
    for instrument in INSTRUMENTS {
        for observation_type in ObservationType::ALL {
            for class in [
                ObservationClass::Science,
                ObservationClass::PartnerCal,
                ObservationClass::DayCal,
                ObservationClass::Acq,
            ] {
                for spectroscopy in [false, true] {
                    let mut obs = Observation::new(id, Instrument::from(*instrument), *observation_type);
                    id += 1;
                    obs.observation_class = Some(class);
                    obs.spectroscopy = spectroscopy;
                    obs.ut_datetime = Some(utc(2018, 3, 1));
                    obs.object = Some(if class == ObservationClass::DayCal {
                        "Twilight".to_string()
                    } else {
                        "HIP 1234".to_string()
                    });
                    obs.focal_plane_mask =
                        Some(if spectroscopy { "IFU-R" } else { "Imaging" }.to_string());
                    obs.disperser =
                        Some(if spectroscopy { "32_mm&SXD" } else { "WOLLASTON" }.to_string());
                    obs.gcal_lamp = Some(GcalLamp::IrHigh);
                    obs.detector_roi_setting = Some(RoiSetting::CentralSpectrum);
                    obs.elevation = Some(45.0);
                    obs.types.insert("MOS".to_string());
                    samples.push(obs);
                }
            }
        }
    }
    samples
}

#[test]
fn test_applicable_is_subset_of_declared_categories() {
    let evaluator = Evaluator::default();
    for obs in sample_references() {
        let (module, applicable) = evaluator.applicable(&obs);
        let declared: Vec<Category> = module.categories().collect();
        for category in applicable {
            assert!(
                declared.contains(&category),
                "{} {} produced undeclared {}",
                module.name,
                obs.observation_type,
                category
            );
        }
    }
}

#[tokio::test]
async fn test_every_module_evaluates_its_applicable_set() {
    let evaluator = Evaluator::default();
    let store = InMemoryStore::new();
    for obs in sample_references() {
        let result = evaluator.evaluate(&store, &obs).await;
        assert!(
            result.is_ok(),
            "{} {} failed: {:?}",
            obs.instrument,
            obs.observation_type,
            result.err()
        );
    }
}

#[test]
fn test_null_module_for_unregistered_instrument() {
    let obs = Observation::new(1, Instrument::from("bHROS"), ObservationType::Object);
    let (module, applicable) = Evaluator::default().applicable(&obs);
    assert_eq!(module.name, "none");
    assert!(applicable.is_empty());
}

/// Candidate-as-reference predicates must admit the original reference
///
/// Type, reduction state and class pins are one-directional by nature and
/// are skipped; everything else (exact matches, tolerances, the window) must
/// hold in both directions.
async fn assert_symmetric(store: &InMemoryStore, reference: &Observation, category: Category) {
    let evaluator = Evaluator::default();
    let found = evaluator
        .evaluate_category(store, reference, category, None)
        .await
        .unwrap();
    assert!(!found.is_empty(), "no {} candidates to check", category);

    let reference_descriptors = DescriptorSet::from_observation(reference);
    for id in found {
        let candidate = store.get_observation(id).await.unwrap().unwrap();
        let (module, descriptors) = evaluator.descriptors(&candidate);
        let Lookup::Query(plan) = evaluator.lookup(module, &descriptors, category, None).unwrap()
        else {
            panic!("{} lookup empty for candidate {}", category, id);
        };

        for predicate in plan.predicates() {
            let one_directional = matches!(
                predicate,
                Predicate::Eq(
                    Descriptor::ObservationType
                        | Descriptor::ReductionState
                        | Descriptor::ObservationClass,
                    _
                )
            );
            if one_directional {
                continue;
            }
            assert!(
                predicate.matches(&reference_descriptors),
                "{} not symmetric on {:?}",
                category,
                predicate
            );
        }

        if let (Some((lower, upper)), Some(t)) = (plan.time_bounds(), reference.ut_datetime) {
            assert!(t >= lower && t <= upper, "{} window not symmetric", category);
        }
    }
}

#[tokio::test]
async fn test_bias_match_is_symmetric() {
    let science = gmos_science(1, Instrument::GmosN, utc(2014, 6, 1));
    let store = InMemoryStore::with_observations(vec![
        science.clone(),
        gmos_bias(101, Instrument::GmosN, utc(2014, 5, 15), "2x2", "a+b+c+d"),
        gmos_bias(102, Instrument::GmosN, utc(2014, 3, 20), "2x2", "a+b+c+d"),
    ]);
    assert_symmetric(&store, &science, Category::raw(CalKind::Bias)).await;
}

#[tokio::test]
async fn test_dark_match_is_symmetric() {
    let science = f2_frame(1, ObservationType::Object, utc(2019, 1, 1), "Bright Object", 30.0);
    let store = InMemoryStore::with_observations(vec![
        science.clone(),
        f2_frame(11, ObservationType::Dark, utc(2018, 12, 15), "Bright Object", 30.0),
        f2_frame(12, ObservationType::Dark, utc(2019, 2, 15), "Bright Object", 30.0),
    ]);
    assert_symmetric(&store, &science, Category::raw(CalKind::Dark)).await;
}

#[tokio::test]
async fn test_flat_match_is_symmetric() {
    let configure = |obs: &mut Observation| {
        obs.spectroscopy = true;
        obs.focal_plane_mask = Some("IFU-2".to_string());
        obs.disperser = Some("B600+_G5323".to_string());
        obs.filter_name = Some("open".to_string());
        obs.central_wavelength = Some(0.52);
        obs.elevation = Some(60.0);
    };
    let mut science = gmos_science(1, Instrument::GmosS, utc(2017, 4, 4));
    configure(&mut science);
    science.cass_rotator_pa = Some(90.0);

    let mut flat = gmos_bias(41, Instrument::GmosS, utc(2017, 4, 5), "2x2", "a+b+c+d");
    flat.observation_type = ObservationType::Flat;
    configure(&mut flat);
    flat.elevation = Some(62.0);
    flat.cass_rotator_pa = Some(95.0);

    let store = InMemoryStore::with_observations(vec![science.clone(), flat]);
    assert_symmetric(&store, &science, Category::raw(CalKind::Flat)).await;
}
