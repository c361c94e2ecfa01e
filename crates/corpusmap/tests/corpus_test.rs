use corpusmap::{BuildOptions, Corpus, Error, Metric, Shape, SpringConfig, Termination};
use unispring::{Disk, NeighborCriterion, Placement};

/// Twelve grains with 4-dimensional descriptors: (pitch, loudness, brightness, noisiness).
fn grains() -> Corpus<String> {
    let mut corpus = Corpus::new(4).unwrap();
    for i in 0..12 {
        let t = i as f64 / 11.0;
        let descriptor = [t, 1.0 - t, (3.0 * t).sin(), if i % 2 == 0 { 0.1 } else { 0.9 }];
        corpus.push(&descriptor, format!("grain-{i}")).unwrap();
    }
    corpus
}

#[test]
fn push_validates_rows() {
    let mut corpus = Corpus::new(2).unwrap();
    assert_eq!(corpus.push(&[0.0, 1.0], 'a').unwrap(), 0);
    assert_eq!(corpus.push(&[2.0, 3.0], 'b').unwrap(), 1);
    assert!(matches!(
        corpus.push(&[1.0], 'c'),
        Err(Error::DimensionMismatch {
            expected: 2,
            found: 1
        })
    ));
    assert!(matches!(
        corpus.push(&[1.0, f64::NAN], 'c'),
        Err(Error::NonFinite { row: 2 })
    ));
    assert_eq!(corpus.len(), 2);
    assert_eq!(corpus.descriptor(1), Some(&[2.0, 3.0][..]));
    assert_eq!(corpus.payload(1), Some(&'b'));
    assert_eq!(corpus.descriptor(2), None);

    assert!(matches!(Corpus::<()>::new(0), Err(Error::ZeroDimension)));
    assert!(matches!(
        Corpus::from_rows(2, vec![0.0, 1.0, 2.0], vec![(), ()]),
        Err(Error::Index(kdspace::Error::RaggedInput { len: 3, dim: 2 }))
    ));
    assert!(matches!(
        Corpus::from_rows(2, vec![0.0, 1.0], vec![(), ()]),
        Err(Error::PayloadCount {
            descriptors: 1,
            payloads: 2
        })
    ));
}

#[test]
fn lookup_by_example_returns_payloads() {
    let corpus = grains();
    let mut index = corpus.index(&BuildOptions::default()).unwrap();

    let query = corpus.descriptor(5).unwrap().to_vec();
    let hit = index.nearest(&query).unwrap();
    assert_eq!(hit.row, 5);
    assert_eq!(hit.payload, "grain-5");
    assert_eq!(hit.distance, 0.0);

    let other = index.nearest_other(5).unwrap();
    assert_ne!(other.row, 5);

    let hits = index.k_nearest(&query, 3).unwrap();
    assert_eq!(hits.len(), 3);
    assert_eq!(hits[0].row, 5);
    assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));

    let within = index.within(&query, 0.5).unwrap();
    assert!(within.iter().all(|h| h.distance <= 0.5));
    assert!(within.windows(2).all(|w| w[0].distance <= w[1].distance));
    assert_eq!(within[0].row, 5);
    assert!(index.stats().queries >= 4);
}

#[test]
fn weighted_metric_masks_descriptor_dimensions() {
    let corpus = grains();
    // Only noisiness counts: every grain of the same parity is at distance zero.
    let options = BuildOptions {
        metric: Metric::Weighted {
            sigma: vec![0.0, 0.0, 0.0, 1.0],
        },
        ..Default::default()
    };
    let mut index = corpus.index(&options).unwrap();
    let hits = index.within(corpus.descriptor(0).unwrap(), 0.0).unwrap();
    let rows: Vec<usize> = hits.iter().map(|h| h.row).collect();
    assert_eq!(rows, vec![0, 2, 4, 6, 8, 10]);
}

#[test]
fn layout_on_selected_axes_keeps_payload_order() {
    let corpus = grains();
    let disk: Shape = Disk::new([0.0, 0.0], 1.0).unwrap().into();
    let config = SpringConfig {
        max_iterations: 200,
        ..Default::default()
    };
    let layout = corpus.layout_axes(&[0, 2], &disk, &config).unwrap();
    assert_eq!(layout.len(), 12);
    for (row, placed) in layout.iter().enumerate() {
        assert_eq!(placed.payload, &format!("grain-{row}"));
        assert!(disk.contains(placed.position).unwrap(), "{:?}", placed.position);
        assert_eq!(Some(placed.position), layout.position(row));
    }

    assert!(matches!(
        corpus.layout_axes(&[0, 7], &disk, &config),
        Err(Error::AxisOutOfRange { axis: 7, dim: 4 })
    ));
    // All four columns cannot be laid out in a disk.
    assert!(matches!(
        corpus.layout(&disk, &config),
        Err(Error::Layout(unispring::Error::DimensionMismatch {
            expected: 2,
            found: 4
        }))
    ));
}

#[test]
fn json_request_and_document() {
    let corpus = grains();
    let layout = corpus
        .layout_request(
            r#"{
                "shape": {"type": "rectangle", "lower": [0, 0], "upper": [2, 1]},
                "config": {"maxIterations": 50, "seed": 3},
                "axes": [1, 3]
            }"#,
        )
        .unwrap();
    assert_eq!(layout.result().dim, 2);
    assert!(layout.iterations() <= 50);

    let doc: serde_json::Value = serde_json::from_str(&layout.to_json().unwrap()).unwrap();
    let points = doc["points"].as_array().unwrap();
    assert_eq!(points.len(), 12);
    assert_eq!(points[3]["payload"], "grain-3");
    assert_eq!(points[3]["position"].as_array().unwrap().len(), 2);

    assert!(matches!(
        corpus.layout_request(r#"{"shape": {"type": "disk", "center": [0, 0], "radius": -1}}"#),
        Err(Error::Layout(unispring::Error::DegenerateGeometry { .. }))
    ));
    assert!(matches!(
        corpus.layout_request(r#"{"config": {}}"#),
        Err(Error::Json(_))
    ));
}

#[test]
fn small_planar_corpus_converges() {
    let mut corpus = Corpus::new(2).unwrap();
    for (i, p) in [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [1.0, 1.0]].iter().enumerate() {
        corpus.push(p, i).unwrap();
    }
    let disk: Shape = Disk::new([0.0, 0.0], 1.0).unwrap().into();
    let config = SpringConfig {
        rest_length: Some(0.5),
        neighbors: NeighborCriterion::Radius(2.0),
        placement: Placement::Given,
        max_iterations: 500,
        ..Default::default()
    };
    let layout = corpus.layout(&disk, &config).unwrap();
    assert!(matches!(layout.termination(), Termination::Converged { .. }));
    assert_eq!(layout.into_result().edges.len(), 6);
}
