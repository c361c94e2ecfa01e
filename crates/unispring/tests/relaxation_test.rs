use unispring::rng::XorShift64Star;
use unispring::{
    ConvergenceReason, Disk, Error, NeighborCriterion, Phase, Placement, Polygon, Relaxation,
    Repulsion, RestMode, Shape, Sphere, SpringConfig, SpringLaw, Square, Termination, layout,
};

fn corners() -> Vec<f64> {
    vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 1.0]
}

fn grid(side: usize, spacing: f64) -> Vec<f64> {
    let mut out = Vec::with_capacity(side * side * 2);
    for y in 0..side {
        for x in 0..side {
            out.push(x as f64 * spacing);
            out.push(y as f64 * spacing);
        }
    }
    out
}

/// `n` points drawn uniformly from the unit disk.
fn scattered(n: usize, seed: u64) -> Vec<f64> {
    let disk: Shape = Disk::new([0.0, 0.0], 1.0).unwrap().into();
    let mut rng = XorShift64Star::new(seed);
    (0..n).flat_map(|_| disk.sample_point(&mut rng)).collect()
}

fn dist(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum::<f64>().sqrt()
}

#[test]
fn four_corners_settle_inside_the_unit_disk() {
    let disk: Shape = Disk::new([0.0, 0.0], 1.0).unwrap().into();
    let config = SpringConfig {
        rest_length: Some(0.5),
        neighbors: NeighborCriterion::Radius(2.0),
        placement: Placement::Given,
        max_iterations: 500,
        ..Default::default()
    };
    let result = layout(&corners(), 2, &disk, &config).unwrap();

    assert!(result.termination.is_converged(), "{:?}", result.termination);
    assert!(result.iterations <= 500);
    assert_eq!(result.edges.len(), 6);
    for i in 0..4 {
        assert!(disk.contains(result.point(i)).unwrap(), "{:?}", result.point(i));
        for j in (i + 1)..4 {
            let d = dist(result.point(i), result.point(j));
            assert!((0.3..=0.7).contains(&d), "|p{i} - p{j}| = {d}");
        }
    }
}

#[test]
fn solid_layout_stays_inside_the_sphere() {
    let mut pts = Vec::new();
    for z in 0..3 {
        for y in 0..3 {
            for x in 0..3 {
                pts.extend([x as f64, y as f64, z as f64]);
            }
        }
    }
    let sphere: Shape = Sphere::new([0.0, 0.0, 0.0], 2.0).unwrap().into();
    let config = SpringConfig {
        max_iterations: 300,
        ..Default::default()
    };
    let result = layout(&pts, 3, &sphere, &config).unwrap();
    assert_eq!(result.dim, 3);
    assert_eq!(result.len(), 27);
    assert!(result.energy.is_finite());
    for i in 0..result.len() {
        let p = result.point(i);
        assert!(p.iter().all(|c| c.is_finite()));
        assert!(sphere.contains(p).unwrap(), "{p:?}");
    }
}

#[test]
fn polygon_layout_keeps_points_out_of_the_notch() {
    let l_shape = Polygon::new(&[
        [0.0, 0.0],
        [2.0, 0.0],
        [2.0, 1.0],
        [1.0, 1.0],
        [1.0, 2.0],
        [0.0, 2.0],
    ])
    .unwrap();
    let shape: Shape = l_shape.into();
    let config = SpringConfig {
        placement: Placement::Sample,
        seed: 7,
        max_iterations: 200,
        ..Default::default()
    };
    let result = layout(&grid(6, 1.0), 2, &shape, &config).unwrap();
    for i in 0..result.len() {
        let p = result.point(i);
        assert!(shape.contains(p).unwrap(), "{p:?}");
        assert!(!(p[0] > 1.0 + 1e-6 && p[1] > 1.0 + 1e-6), "{p:?} is in the notch");
    }
}

#[test]
fn contraction_lowers_spring_energy() {
    let square = Square::new([0.0, 0.0], 8.0).unwrap();
    let pts: Vec<[f64; 2]> = grid(5, 1.0)
        .chunks_exact(2)
        .map(|c| [c[0] + 2.0, c[1] + 2.0])
        .collect();
    let config = SpringConfig {
        rest_length: Some(0.15),
        rest_mode: RestMode::Uniform,
        neighbors: NeighborCriterion::Radius(1.1),
        placement: Placement::Given,
        time_step: 0.1,
        repulsion: Repulsion {
            strength: 0.0,
            radius: None,
        },
        ..Default::default()
    };
    let mut engine = Relaxation::initialize(&pts, square, &config).unwrap();
    assert_eq!(engine.edges().len(), 40);

    let initial = engine.energy();
    let mut energies = Vec::new();
    for _ in 0..60 {
        energies.push(engine.step_once().unwrap().energy);
    }
    assert!(energies[9] < initial);
    assert!(energies[59] < energies[9]);
    assert!(energies[59] < 0.5 * initial);
    let increases = energies
        .windows(2)
        .filter(|w| w[1] > w[0] * (1.0 + 1e-9))
        .count();
    assert_eq!(increases, 0);
}

#[test]
fn default_config_converges_on_scattered_points() {
    let disk: Shape = Disk::new([0.0, 0.0], 1.0).unwrap().into();
    let config = SpringConfig::default();
    let result = layout(&scattered(400, 9), 2, &disk, &config).unwrap();
    assert!(result.termination.is_converged(), "{:?}", result.termination);
    assert!(result.iterations < config.max_iterations);
    for i in 0..result.len() {
        assert!(disk.contains(result.point(i)).unwrap(), "{:?}", result.point(i));
    }
}

#[test]
fn default_springs_lose_energy_every_step() {
    let disk = Disk::new([0.0, 0.0], 1.0).unwrap();
    let pts: Vec<[f64; 2]> = scattered(300, 21)
        .chunks_exact(2)
        .map(|c| [c[0], c[1]])
        .collect();
    let config = SpringConfig {
        repulsion: Repulsion {
            strength: 0.0,
            radius: None,
        },
        ..Default::default()
    };
    assert_eq!(config.neighbors, NeighborCriterion::KNearest(6));
    let mut engine = Relaxation::initialize(&pts, disk, &config).unwrap();

    let mut energies = vec![engine.energy()];
    while energies.len() <= config.max_iterations {
        energies.push(engine.step_once().unwrap().energy);
        if matches!(engine.phase(), Phase::Converged(_)) {
            break;
        }
    }
    assert!(matches!(engine.phase(), Phase::Converged(_)), "{:?}", engine.phase());
    let rises: Vec<usize> = energies
        .windows(2)
        .enumerate()
        .filter(|(_, w)| w[1] > w[0] * (1.0 + 1e-9))
        .map(|(k, _)| k + 1)
        .collect();
    assert!(rises.is_empty(), "energy rose at steps {rises:?}");
    assert!(energies[energies.len() - 1] < energies[0]);
}

#[cfg(feature = "parallel")]
#[test]
fn thread_count_does_not_change_the_layout() {
    let disk: Shape = Disk::new([0.0, 0.0], 1.0).unwrap().into();
    let pts = scattered(600, 4);
    let config = SpringConfig {
        time_step: 0.1,
        max_iterations: 200,
        ..Default::default()
    };
    let run = |threads: usize| {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .unwrap()
            .install(|| layout(&pts, 2, &disk, &config).unwrap())
    };
    let single = run(1);
    let bits = |r: &unispring::LayoutResult| -> Vec<u64> {
        r.positions.iter().map(|v| v.to_bits()).collect()
    };
    for threads in [2, 4, 7] {
        let many = run(threads);
        assert_eq!(bits(&many), bits(&single), "{threads} threads");
        assert_eq!(many, single);
    }
}

#[test]
fn identical_inputs_give_identical_layouts() {
    let square: Shape = Square::new([0.0, 0.0], 1.0).unwrap().into();
    let config = SpringConfig {
        placement: Placement::Sample,
        seed: 42,
        max_iterations: 100,
        ..Default::default()
    };
    let pts = grid(7, 0.5);
    let a = layout(&pts, 2, &square, &config).unwrap();
    let b = layout(&pts, 2, &square, &config).unwrap();
    assert_eq!(a, b);

    let other = layout(
        &pts,
        2,
        &square,
        &SpringConfig {
            seed: 43,
            ..config
        },
    )
    .unwrap();
    assert_ne!(a.positions, other.positions);
}

#[test]
fn expanding_law_fills_the_square() {
    let square: Shape = Square::new([0.0, 0.0], 2.0).unwrap().into();
    let pts = grid(6, 0.01);
    let config = SpringConfig {
        spring_law: SpringLaw::Expanding,
        rest_mode: RestMode::Uniform,
        placement: Placement::Given,
        max_iterations: 800,
        ..Default::default()
    };
    let result = layout(&pts, 2, &square, &config).unwrap();
    let (mut lo, mut hi) = ([f64::INFINITY; 2], [f64::NEG_INFINITY; 2]);
    for i in 0..result.len() {
        let p = result.point(i);
        assert!(square.contains(p).unwrap(), "{p:?}");
        for k in 0..2 {
            lo[k] = lo[k].min(p[k]);
            hi[k] = hi[k].max(p[k]);
        }
    }
    // Push-only bars spread the cluster over most of the square.
    for k in 0..2 {
        assert!(hi[k] - lo[k] > 1.0, "axis {k} spans {}", hi[k] - lo[k]);
    }
}

#[test]
fn run_is_resumable_and_idempotent_once_converged() {
    let square = Square::new([0.0, 0.0], 2.0).unwrap();
    let pts = [[0.5, 1.0], [1.5, 1.0]];
    let config = SpringConfig {
        rest_length: Some(0.5),
        neighbors: NeighborCriterion::Radius(1.5),
        placement: Placement::Given,
        ..Default::default()
    };
    let mut engine = Relaxation::initialize(&pts, square, &config).unwrap();
    assert_eq!(engine.run(1).unwrap(), Termination::IterationLimitReached);
    assert_eq!(engine.phase(), Phase::IterationLimitReached);
    assert_eq!(engine.iterations(), 1);

    let termination = engine.run(500).unwrap();
    assert!(termination.is_converged());
    let iterations = engine.iterations();
    let positions = engine.positions();
    assert_eq!(engine.run(500).unwrap(), termination);
    assert_eq!(engine.iterations(), iterations);
    assert_eq!(engine.positions(), positions);

    let d = dist(&positions[0], &positions[1]);
    assert!((d - 0.5).abs() < 0.01, "d = {d}");
    if let Termination::Converged { by } = termination {
        assert!(matches!(
            by,
            ConvergenceReason::Displacement | ConvergenceReason::EnergyStall
        ));
    }
}

#[test]
fn invalid_inputs_are_rejected() {
    let disk: Shape = Disk::new([0.0, 0.0], 1.0).unwrap().into();
    let config = SpringConfig::default();

    assert!(matches!(
        layout(&[], 2, &disk, &config),
        Err(Error::EmptyInput)
    ));
    assert!(matches!(
        layout(&[0.5, 0.5], 2, &disk, &config),
        Err(Error::InsufficientPoints { found: 1 })
    ));
    assert!(matches!(
        layout(&corners(), 3, &disk, &config),
        Err(Error::DimensionMismatch {
            expected: 2,
            found: 3
        })
    ));
    assert!(matches!(
        layout(&[0.0, 0.0, 1.0], 2, &disk, &config),
        Err(Error::RaggedInput { len: 3, dim: 2 })
    ));
    assert!(matches!(
        layout(&[0.0, 0.0, f64::INFINITY, 1.0], 2, &disk, &config),
        Err(Error::NonFinite { row: 1 })
    ));
    let bad = SpringConfig {
        h0: 0.0,
        ..Default::default()
    };
    assert!(matches!(
        layout(&corners(), 2, &disk, &bad),
        Err(Error::InvalidConfig { .. })
    ));
}

#[test]
fn result_serializes_to_camel_case_json() {
    let disk: Shape = Disk::new([0.0, 0.0], 1.0).unwrap().into();
    let config = SpringConfig {
        max_iterations: 5,
        ..Default::default()
    };
    let result = layout(&corners(), 2, &disk, &config).unwrap();
    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["dim"], 2);
    assert_eq!(json["positions"].as_array().unwrap().len(), 8);
    assert!(json["termination"]["state"].is_string());
}
