//! End-to-end association scenarios against seeded stores

mod helpers;

use calassoc_common::{Instrument, Observation, ObservationClass, ObservationId, ObservationType};
use calassoc_engine::{CalKind, Category, Evaluator, InMemoryStore, RefreshWorker};
use helpers::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

fn ids(raw: &[i64]) -> Vec<ObservationId> {
    raw.iter().copied().map(ObservationId).collect()
}

fn bias_scenario() -> (Observation, Vec<Observation>) {
    let science = gmos_science(1, Instrument::GmosN, utc(2014, 6, 1));
    let calibrations = vec![
        gmos_bias(101, Instrument::GmosN, utc(2014, 5, 15), "2x2", "a+b+c+d"),
        gmos_bias(102, Instrument::GmosN, utc(2014, 5, 20), "1x1", "a+b+c+d"),
        gmos_bias(103, Instrument::GmosN, utc(2014, 5, 30), "2x2", "a+b+c"),
    ];
    (science, calibrations)
}

#[tokio::test]
async fn test_gmos_bias_matches_binning_and_amp() {
    let (science, calibrations) = bias_scenario();
    let store = InMemoryStore::with_observations(
        std::iter::once(science.clone()).chain(calibrations),
    );

    let found = Evaluator::default()
        .evaluate_category(&store, &science, Category::raw(CalKind::Bias), None)
        .await
        .unwrap();

    // 102 differs in binning, 103 in amps under the full-frame rule
    assert_eq!(found, ids(&[101]));
}

#[tokio::test]
async fn test_gmos_bias_matches_through_sqlite_store() {
    let engine = TestEngine::new().await;
    let (science, calibrations) = bias_scenario();
    engine.seed(&[science.clone()]).await;
    engine.seed(&calibrations).await;

    let found = engine
        .ctx
        .evaluator
        .evaluate_category(engine.store.as_ref(), &science, Category::raw(CalKind::Bias), None)
        .await
        .unwrap();
    assert_eq!(found, ids(&[101]));
}

#[tokio::test]
async fn test_f2_dark_temporal_cap() {
    let mut science = f2_frame(1, ObservationType::Object, utc(2019, 1, 1), "Faint Object", 60.0);
    science.observation_class = Some(ObservationClass::Science);
    let store = InMemoryStore::with_observations(vec![
        science.clone(),
        f2_frame(11, ObservationType::Dark, utc(2018, 12, 15), "Faint Object", 60.0),
        f2_frame(12, ObservationType::Dark, utc(2018, 8, 1), "Faint Object", 60.0),
    ]);

    let found = Evaluator::default()
        .evaluate_category(&store, &science, Category::raw(CalKind::Dark), None)
        .await
        .unwrap();

    assert_eq!(found, ids(&[11]));
}

#[test]
fn test_gnirs_cross_dispersed_needs_qh_flat() {
    let mut science = Observation::new(1, Instrument::Gnirs, ObservationType::Object);
    science.observation_class = Some(ObservationClass::Science);
    science.object = Some("HD 1234".to_string());
    science.spectroscopy = true;
    science.disperser = Some("32_mm&SXD".to_string());

    let (module, applicable) = Evaluator::default().applicable(&science);
    assert_eq!(module.name, "GNIRS");
    for category in [
        Category::raw(CalKind::QhFlat),
        Category::raw(CalKind::Flat),
        Category::raw(CalKind::Arc),
        Category::raw(CalKind::PinholeMask),
        Category::raw(CalKind::TelluricStandard),
    ] {
        assert!(applicable.contains(&category), "{} missing", category);
    }

    science.disperser = Some("32_mm&SB".to_string());
    let (_, applicable) = Evaluator::default().applicable(&science);
    assert!(!applicable.contains(&Category::raw(CalKind::QhFlat)));
}

#[tokio::test]
async fn test_nod_and_shuffle_requires_matching_dark() {
    let nod = |obs: &mut Observation, count: i64| {
        let block = gmos_block(obs);
        block.nodandshuffle = Some(true);
        block.nod_count = Some(count);
        block.nod_pixels = Some(1500);
    };

    let mut science = gmos_science(1, Instrument::GmosN, utc(2015, 3, 10));
    science.spectroscopy = true;
    science.focal_plane_mask = Some("NS1.0arcsec".to_string());
    science.exposure_time = Some(900.0);
    nod(&mut science, 2);

    let dark = |id: i64, count: i64| {
        let mut obs = gmos_bias(id, Instrument::GmosN, utc(2015, 3, 1), "2x2", "a+b+c+d");
        obs.observation_type = ObservationType::Dark;
        obs.exposure_time = Some(900.0);
        nod(&mut obs, count);
        obs
    };
    let matching = dark(21, 2);
    let other_count = dark(22, 3);

    let evaluator = Evaluator::default();
    let (_, applicable) = evaluator.applicable(&science);
    assert!(applicable.contains(&Category::raw(CalKind::Dark)));
    assert!(applicable.contains(&Category::processed(CalKind::Dark)));

    let store = InMemoryStore::with_observations(vec![science.clone(), matching, other_count]);
    let found = evaluator
        .evaluate_category(&store, &science, Category::raw(CalKind::Dark), None)
        .await
        .unwrap();
    assert_eq!(found, ids(&[21]));
}

#[tokio::test]
async fn test_spectroscopy_flat_rotator_clamp() {
    let configure = |obs: &mut Observation| {
        obs.spectroscopy = true;
        obs.focal_plane_mask = Some("IFU-R".to_string());
        obs.disperser = Some("R400+_G5325".to_string());
        obs.filter_name = Some("OG515_G0330".to_string());
        obs.central_wavelength = Some(0.7);
        obs.elevation = Some(30.0);
    };

    let mut science = gmos_science(1, Instrument::GmosS, utc(2016, 9, 1));
    configure(&mut science);
    science.cass_rotator_pa = Some(0.0);

    let flat = |id: i64, rotator: f64| {
        let mut obs = gmos_bias(id, Instrument::GmosS, utc(2016, 9, 2), "2x2", "a+b+c+d");
        obs.observation_type = ObservationType::Flat;
        obs.observation_class = Some(ObservationClass::PartnerCal);
        configure(&mut obs);
        obs.cass_rotator_pa = Some(rotator);
        obs
    };

    let store = InMemoryStore::with_observations(vec![
        science.clone(),
        flat(31, 10.0),
        flat(32, 5.0),
    ]);
    let found = Evaluator::default()
        .evaluate_category(&store, &science, Category::raw(CalKind::Flat), None)
        .await
        .unwrap();

    // Threshold is 7.5 / cos(30) = 8.66 degrees
    assert_eq!(found, ids(&[32]));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cache_replacement_is_atomic_for_readers() {
    let engine = TestEngine::new().await;
    let mut science = gmos_science(1, Instrument::GmosN, utc(2014, 6, 1));
    engine
        .seed(&[
            science.clone(),
            gmos_bias(101, Instrument::GmosN, utc(2014, 5, 20), "2x2", "a+b+c+d"),
            gmos_bias(102, Instrument::GmosN, utc(2014, 5, 25), "1x1", "a+b+c+d"),
            gmos_bias(103, Instrument::GmosN, utc(2014, 5, 10), "1x1", "a+b+c+d"),
        ])
        .await;

    let bias = Category::raw(CalKind::Bias);
    let worker = RefreshWorker::with_id(engine.ctx.clone(), "scenario");
    engine.ctx.queue.enqueue(science.id).await.unwrap();
    worker.drain().await.unwrap();
    let before = ids(&[101]);
    let after = ids(&[102, 103]);
    assert_eq!(
        engine.ctx.cache.get_associations(science.id, bias).await.unwrap(),
        before
    );

    let done = Arc::new(AtomicBool::new(false));
    let reader = {
        let cache = engine.ctx.cache.clone();
        let done = done.clone();
        let (before, after) = (before.clone(), after.clone());
        tokio::spawn(async move {
            let mut reads = 0usize;
            loop {
                let finished = done.load(Ordering::SeqCst);
                let seen = cache.get_associations(ObservationId(1), bias).await.unwrap();
                assert!(seen == before || seen == after, "partial set observed: {:?}", seen);
                reads += 1;
                if finished {
                    return reads;
                }
                tokio::task::yield_now().await;
            }
        })
    };

    // Binning change makes the 1x1 biases the match
    science.detector_binning = Some("1x1".to_string());
    engine.seed(&[science.clone()]).await;
    for _ in 0..5 {
        engine.ctx.queue.enqueue(science.id).await.unwrap();
        worker.drain().await.unwrap();
    }
    done.store(true, Ordering::SeqCst);

    let reads = reader.await.unwrap();
    assert!(reads > 0);
    assert_eq!(
        engine.ctx.cache.get_associations(science.id, bias).await.unwrap(),
        after
    );
}
