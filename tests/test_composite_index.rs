use approx::assert_relative_eq;
use chrono::NaiveDate;
use disarm::core::{
    combine, high_risk_mask, is_unit_interval, HazardSources, HazardTerm, Image, IndexComposer,
    LocalEvaluator, LocalImage,
};
use disarm::{AnalysisPeriod, Hazard, Roi};
use ndarray::{arr2, Array2};

fn date(m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, m, d).unwrap()
}

fn row(values: [f32; 2]) -> Array2<f32> {
    arr2(&[values])
}

/// Two-pixel world: pixel 0 is moderate risk, pixel 1 is high risk
fn fixtures() -> LocalEvaluator {
    let sources = HazardSources::default();
    let mut eval = LocalEvaluator::new((1, 2));

    eval.insert_collection(
        &sources.sentinel1,
        vec![
            LocalImage::new("VH", row([-10.0, -10.0]))
                .acquired(date(8, 10))
                .with_property("instrumentMode", "IW"),
            LocalImage::new("VH", row([-40.0, -40.0]))
                .acquired(date(8, 12))
                .with_property("instrumentMode", "EW"),
        ],
    );
    eval.insert_collection(
        &sources.burned_area,
        vec![LocalImage::new("BurnDate", row([0.0, 200.0])).acquired(date(8, 1))],
    );
    eval.insert_collection(
        &sources.vegetation,
        vec![
            LocalImage::new("NDVI", row([4500.0, 0.0])).acquired(date(6, 10)),
            LocalImage::new("NDVI", row([4500.0, 0.0])).acquired(date(8, 10)),
        ],
    );
    eval.insert_collection(
        &sources.precipitation,
        vec![
            LocalImage::new("precipitation", row([150.0, 0.0])).acquired(date(6, 10)),
            LocalImage::new("precipitation", row([150.0, 500.0])).acquired(date(8, 10)),
        ],
    );
    eval.insert_collection(
        &sources.reanalysis,
        vec![LocalImage::new("mean_2m_air_temperature", row([308.15, 323.15]))
            .with_band("u_component_of_wind_10m", row([30.0, 30.0]))
            .with_band("v_component_of_wind_10m", row([40.0, 40.0]))
            .acquired(date(8, 10))],
    );
    eval.insert_image(&sources.elevation, LocalImage::new("elevation", row([100.0, 100.0])));
    eval
}

#[test]
fn test_hazard_indices_on_synthetic_world() {
    let _ = env_logger::builder().is_test(true).try_init();

    let composition = IndexComposer::new(Roi::global(), AnalysisPeriod::default()).compose();
    let eval = fixtures();

    let expected = [
        (Hazard::Flood, [1.0, 1.0]),
        (Hazard::Burn, [0.0, 1.0]),
        (Hazard::Drought, [0.5, 0.583_333]),
        (Hazard::Landslide, [0.2, 0.333_333]),
        (Hazard::Heatwave, [0.5, 1.0]),
        (Hazard::Cyclone, [0.65, 1.0]),
    ];

    for (hazard, values) in expected {
        let layer = composition.layer(hazard).unwrap();
        let raster = eval.evaluate_raster(&layer.index).unwrap();
        println!("{:>10}: {:?}", hazard, raster.as_slice().unwrap());
        assert!(is_unit_interval(&raster), "{} left [0, 1]", hazard);
        for (i, v) in values.iter().enumerate() {
            assert_relative_eq!(raster[[0, i]], *v, epsilon = 1e-4);
        }
    }

    let index = eval.evaluate_raster(&composition.index).unwrap();
    assert_relative_eq!(index[[0, 0]], 0.475, epsilon = 1e-4);
    assert_relative_eq!(index[[0, 1]], 0.819_444, epsilon = 1e-4);

    let mask = eval.evaluate_raster(&composition.high_risk).unwrap();
    assert_eq!(mask.as_slice().unwrap(), &[0.0, 1.0]);
}

#[test]
fn test_flood_display_layer_is_self_masked() {
    let composition = IndexComposer::new(Roi::global(), AnalysisPeriod::default()).compose();
    let mut eval = fixtures();
    eval.insert_collection(
        &HazardSources::default().sentinel1,
        vec![LocalImage::new("VH", row([-25.0, -5.0]))
            .acquired(date(8, 10))
            .with_property("instrumentMode", "IW")],
    );

    let flood = composition.layer(Hazard::Flood).unwrap();
    let display = eval.evaluate_raster(&flood.display).unwrap();
    assert!(display[[0, 0]].is_nan());
    assert_eq!(display[[0, 1]], 1.0);

    // the composite still sees a zero, not a hole
    let index = eval.evaluate_raster(&flood.index).unwrap();
    assert_eq!(index.as_slice().unwrap(), &[0.0, 1.0]);
    assert!(!eval.evaluate_raster(&composition.index).unwrap()[[0, 0]].is_nan());
}

#[test]
fn test_every_term_normalizes_its_bounds_into_unit_interval() {
    let composition = IndexComposer::new(Roi::global(), AnalysisPeriod::default()).compose();
    let eval = LocalEvaluator::new((1, 1));

    for layer in &composition.layers {
        for term in &layer.terms {
            for raw in [term.bounds.min, term.bounds.max] {
                let probe = HazardTerm {
                    raw: Image::constant(raw),
                    ..term.clone()
                };
                let v = eval.evaluate_raster(&probe.normalized()).unwrap()[[0, 0]];
                assert!(
                    (0.0..=1.0).contains(&v),
                    "{}/{} maps {} to {}",
                    layer.hazard,
                    term.name,
                    raw,
                    v
                );
                let at_min = raw == term.bounds.min;
                let expected = if at_min != term.inverted { 0.0 } else { 1.0 };
                assert_relative_eq!(v, expected, epsilon = 1e-6);
            }
        }
    }
}

#[test]
fn test_constant_inputs_give_constant_composite() {
    let eval = LocalEvaluator::new((3, 4));
    for c in [0.0, 0.1, 0.5, 0.7, 0.95, 1.0] {
        let index = combine((0..6).map(|_| Image::constant(c)));
        let raster = eval.evaluate_raster(&index).unwrap();
        for v in raster.iter() {
            assert_relative_eq!(*v, c as f32, epsilon = 1e-6);
        }

        let mask = eval.evaluate_raster(&high_risk_mask(&index)).unwrap();
        for (m, v) in mask.iter().zip(raster.iter()) {
            assert_eq!(*m == 1.0, *v > 0.7);
        }
    }
}

#[test]
fn test_threshold_boundary_is_not_high_risk() {
    let eval = LocalEvaluator::new((1, 1));
    let at = eval.evaluate_raster(&high_risk_mask(&Image::constant(0.7))).unwrap();
    assert_eq!(at[[0, 0]], 0.0);
    let above = eval.evaluate_raster(&high_risk_mask(&Image::constant(0.7001))).unwrap();
    assert_eq!(above[[0, 0]], 1.0);
}

#[test]
fn test_roi_reused_across_all_hazards() {
    let roi = Roi::global();
    let composition = IndexComposer::new(roi.clone(), AnalysisPeriod::default()).compose();

    assert!(composition.roi.same_as(&roi));
    assert_eq!(composition.layers.len(), Hazard::ALL.len());
    for layer in &composition.layers {
        assert!(layer.roi.same_as(&roi), "{} uses a different ROI", layer.hazard);
    }

    // one polygon node in the encoded graph, shared by every query
    let json = serde_json::to_string(&composition.index_expression()).unwrap();
    assert_eq!(json.matches("GeometryConstructors.Polygon").count(), 1);
}
