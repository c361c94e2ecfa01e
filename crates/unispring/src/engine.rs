//! Spring relaxation state machine.
//!
//! `Initialized -> Iterating -> Converged | IterationLimitReached`, then [`Relaxation::finalize`]
//! hands the positions back in caller coordinates.
//!
//! Each step reads a frozen snapshot of every position, computes all forces from it and only
//! then moves the points, so the result does not depend on the order (or thread) in which
//! points are visited.

use kdspace::{KdTree, SearchStack};
use nalgebra::SVector;
use serde::{Deserialize, Serialize};
use tracing::{debug, debug_span, trace};

use crate::config::{IndexRebuild, SpringConfig, SpringLaw};
use crate::error::{Error, Result};
use crate::placement::initial_positions;
use crate::rng::XorShift64Star;
use crate::shape::{Frame, Region};
use crate::topology::{Topology, natural_neighbors};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConvergenceReason {
    /// The largest per-step displacement fell below `displacement_tolerance * h0`.
    Displacement,
    /// Spring energy stopped decreasing for `stall_window` steps. This is a heuristic, not a
    /// proof of equilibrium.
    EnergyStall,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "state")]
pub enum Termination {
    Converged { by: ConvergenceReason },
    /// The iteration budget ran out first. Positions are still the best available.
    IterationLimitReached,
}

impl Termination {
    pub fn is_converged(&self) -> bool {
        matches!(self, Self::Converged { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Initialized,
    Iterating,
    Converged(ConvergenceReason),
    IterationLimitReached,
}

/// What one [`Relaxation::step_once`] did. Lengths are in the relaxation frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepReport {
    pub iteration: usize,
    pub max_displacement: f64,
    /// Sum of squared deviations from rest length over all neighbour pairs, after the step.
    pub energy: f64,
    pub index_rebuilt: bool,
    /// Points nudged apart because they coincided with another point.
    pub jittered: usize,
}

/// Final positions of a relaxation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutResult {
    pub dim: usize,
    /// Row-major positions in caller coordinates, in input order.
    pub positions: Vec<f64>,
    pub termination: Termination,
    pub iterations: usize,
    /// Final spring energy, in relaxation-frame units.
    pub energy: f64,
    /// Neighbour pairs `(i, j)` with `i < j` that carried springs.
    pub edges: Vec<(usize, usize)>,
}

impl LayoutResult {
    pub fn point(&self, i: usize) -> &[f64] {
        &self.positions[i * self.dim..(i + 1) * self.dim]
    }

    pub fn len(&self) -> usize {
        self.positions.len() / self.dim.max(1)
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// Verlet-style candidate lists: every pair within `cutoff` when they were built.
///
/// As long as no point has drifted more than `(cutoff - reach) / 2` since, every pair now
/// closer than `reach` is listed.
#[derive(Debug, Clone)]
struct Candidates<const D: usize> {
    cutoff: f64,
    offsets: Vec<usize>,
    rows: Vec<usize>,
    anchor: Vec<SVector<f64, D>>,
    rebuilds: usize,
}

impl<const D: usize> Candidates<D> {
    fn of(&self, i: usize) -> &[usize] {
        &self.rows[self.offsets[i]..self.offsets[i + 1]]
    }

    fn max_drift(&self, positions: &[SVector<f64, D>]) -> f64 {
        positions
            .iter()
            .zip(&self.anchor)
            .map(|(p, a)| (p - a).norm())
            .fold(0.0, f64::max)
    }

    fn rebuild(&mut self, positions: &[SVector<f64, D>]) -> Result<()> {
        let flat: Vec<f64> = positions.iter().flat_map(|p| p.iter().copied()).collect();
        let tree = KdTree::build(&flat, D)?;
        let cutoff = self.cutoff;
        let query = |stack: &mut SearchStack, i: usize| -> Result<Vec<usize>> {
            Ok(tree
                .radius_query(stack, tree.point(i), cutoff)?
                .into_iter()
                .map(|h| h.index)
                .filter(|&j| j != i)
                .collect())
        };

        #[cfg(feature = "parallel")]
        let lists: Vec<Vec<usize>> = {
            use rayon::prelude::*;
            (0..positions.len())
                .into_par_iter()
                .map_init(|| tree.stack(), |stack, i| query(stack, i))
                .collect::<Result<_>>()?
        };
        #[cfg(not(feature = "parallel"))]
        let lists: Vec<Vec<usize>> = {
            let mut stack = tree.stack();
            (0..positions.len())
                .map(|i| query(&mut stack, i))
                .collect::<Result<_>>()?
        };

        self.offsets.clear();
        self.rows.clear();
        self.offsets.push(0);
        for list in &lists {
            self.rows.extend_from_slice(list);
            self.offsets.push(self.rows.len());
        }
        self.anchor.clear();
        self.anchor.extend_from_slice(positions);
        self.rebuilds += 1;
        trace!(
            rebuilds = self.rebuilds,
            pairs = self.rows.len() / 2,
            cutoff,
            "candidate lists rebuilt"
        );
        Ok(())
    }
}

/// One relaxation run of `n` points in a `D`-dimensional region.
#[derive(Debug, Clone)]
pub struct Relaxation<const D: usize, R: Region<D>> {
    /// The target region in the relaxation frame.
    region: R,
    frame: Frame<D>,
    config: SpringConfig,
    topology: Topology,
    positions: Vec<SVector<f64, D>>,
    snapshot: Vec<SVector<f64, D>>,
    /// Per-point force and the summed stiffness of the terms behind it.
    forces: Vec<(SVector<f64, D>, f64)>,
    candidates: Candidates<D>,
    rng: XorShift64Star,
    phase: Phase,
    iterations: usize,
    energy: f64,
    stalled: usize,
    rest_length: f64,
    repulsion_radius: f64,
}

impl<const D: usize, R: Region<D>> Relaxation<D, R> {
    /// Computes the neighbour topology from `points`, places the points in `region` and
    /// builds the first candidate lists.
    ///
    /// `region` is given in caller coordinates; the run itself happens in the normalised frame
    /// described on [`Frame`].
    pub fn initialize(points: &[[f64; D]], region: R, config: &SpringConfig) -> Result<Self> {
        config.validate()?;
        let n = points.len();
        match n {
            0 => return Err(Error::EmptyInput),
            1 => return Err(Error::InsufficientPoints { found: 1 }),
            _ => {}
        }
        if let Some(row) = points.iter().position(|p| p.iter().any(|c| !c.is_finite())) {
            return Err(Error::NonFinite { row });
        }

        let frame = Frame::fit(&region.bounds())?;
        let region = region.transformed(&frame);
        let mut rng = XorShift64Star::new(config.seed);

        let flat = points.as_flattened();
        let pairs = natural_neighbors(flat, D, config.neighbors)?;
        let rest_length = config
            .rest_length
            .unwrap_or_else(|| (region.measure() / n as f64).powf(1.0 / D as f64));
        let topology = Topology::new(n, pairs, flat, D, rest_length, config.rest_mode);

        let input: Vec<SVector<f64, D>> = points.iter().map(|p| SVector::from(*p)).collect();
        let positions = initial_positions(
            &input,
            &frame,
            &region,
            config.placement,
            config.rect_scale,
            config.geps(),
            &mut rng,
        );

        let repulsion_radius = config.repulsion.radius.unwrap_or(0.5 * rest_length);
        let reach = repulsion_radius.max(config.eps.sqrt() * config.h0);
        let mut candidates = Candidates {
            cutoff: reach + 2.0 * (config.rebuild_tolerance * config.h0 + config.geps()),
            offsets: Vec::with_capacity(n + 1),
            rows: Vec::new(),
            anchor: Vec::with_capacity(n),
            rebuilds: 0,
        };
        candidates.rebuild(&positions)?;

        let mut engine = Self {
            region,
            frame,
            config: config.clone(),
            topology,
            snapshot: positions.clone(),
            forces: vec![(SVector::zeros(), 0.0); n],
            positions,
            candidates,
            rng,
            phase: Phase::Initialized,
            iterations: 0,
            energy: 0.0,
            stalled: 0,
            rest_length,
            repulsion_radius,
        };
        engine.energy = engine.spring_energy();
        debug!(
            points = n,
            dim = D,
            edges = engine.topology.edges().len(),
            rest_length,
            scale = frame.scale(),
            "relaxation initialized"
        );
        Ok(engine)
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn energy(&self) -> f64 {
        self.energy
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn frame(&self) -> &Frame<D> {
        &self.frame
    }

    /// Target region in the relaxation frame.
    pub fn region(&self) -> &R {
        &self.region
    }

    /// Mean rest length in the relaxation frame.
    pub fn rest_length(&self) -> f64 {
        self.rest_length
    }

    pub fn edges(&self) -> &[(usize, usize)] {
        self.topology.edges()
    }

    /// Number of times the candidate lists have been built, including the initial build.
    pub fn index_rebuilds(&self) -> usize {
        self.candidates.rebuilds
    }

    /// Current positions in the relaxation frame.
    pub fn local_positions(&self) -> &[SVector<f64, D>] {
        &self.positions
    }

    /// Current positions in caller coordinates.
    pub fn positions(&self) -> Vec<[f64; D]> {
        self.positions
            .iter()
            .map(|p| self.frame.to_world(p).into())
            .collect()
    }

    fn spring_energy(&self) -> f64 {
        self.topology
            .edges()
            .iter()
            .zip(self.topology.rest())
            .map(|(&(i, j), rest)| {
                let d = (self.positions[i] - self.positions[j]).norm() - rest;
                d * d
            })
            .sum()
    }

    fn coincidence_distance(&self) -> f64 {
        self.config.eps.sqrt() * self.config.h0
    }

    fn refresh_candidates(&mut self) -> Result<bool> {
        let due = match self.config.index_rebuild {
            IndexRebuild::EveryStep => true,
            IndexRebuild::OnDrift => {
                self.candidates.max_drift(&self.positions)
                    > self.config.rebuild_tolerance * self.config.h0
            }
        };
        if due {
            self.candidates.rebuild(&self.positions)?;
        }
        Ok(due)
    }

    /// Nudges the higher-indexed point of every coincident pair by `geps` in a random
    /// direction. Runs sequentially so the draws are reproducible.
    fn separate_coincident(&mut self) -> usize {
        let deps = self.coincidence_distance();
        let mut jittered = 0;
        for i in 0..self.positions.len() {
            let p = self.positions[i];
            let clash = self
                .candidates
                .of(i)
                .iter()
                .any(|&j| j < i && (self.positions[j] - p).norm() <= deps);
            if clash {
                let dir = self.rng.next_unit_vector::<D>();
                self.positions[i] += dir * self.config.geps();
                jittered += 1;
            }
        }
        jittered
    }

    /// Rest-length inflation of the expanding law: `force_scale * sqrt(sum L^2 / sum rest^2)`.
    fn expansion(&self) -> f64 {
        let (actual, rest) = self
            .topology
            .edges()
            .iter()
            .zip(self.topology.rest())
            .fold((0.0, 0.0), |(a, r), (&(i, j), rest)| {
                (
                    a + (self.snapshot[i] - self.snapshot[j]).norm_squared(),
                    r + rest * rest,
                )
            });
        if rest > 0.0 {
            self.config.force_scale * (actual / rest).sqrt()
        } else {
            self.config.force_scale
        }
    }

    /// Total force on point `i` and the summed stiffness of its active terms, read from the
    /// snapshot only.
    fn force_on(&self, i: usize, expansion: f64) -> (SVector<f64, D>, f64) {
        let c = &self.config;
        let deps = self.coincidence_distance();
        let p = self.snapshot[i];
        let mut f = SVector::<f64, D>::zeros();
        let mut stiffness = 0.0;

        let rest = self.topology.rest();
        for &(j, e) in self.topology.incident(i) {
            let v = self.snapshot[j] - p;
            let d = v.norm();
            if d <= deps {
                continue;
            }
            // Positive pulls `i` towards `j`.
            let pull = match c.spring_law {
                SpringLaw::Linear => d.min(c.max_edge_length.max(rest[e])) - rest[e],
                SpringLaw::Expanding => -(rest[e] * expansion - d).max(0.0),
            };
            // Slack push-only bars exert nothing.
            if c.spring_law == SpringLaw::Linear || pull < 0.0 {
                stiffness += 1.0;
            }
            f += v * (pull / d);
        }

        if c.repulsion.strength > 0.0 {
            let radius = self.repulsion_radius;
            for &j in self.candidates.of(i) {
                let v = p - self.snapshot[j];
                let d = v.norm();
                if d > deps && d < radius {
                    f += v * (c.repulsion.strength * (radius - d) / d);
                    stiffness += c.repulsion.strength;
                }
            }
        }

        if self.region.signed_distance(&p) > c.geps() {
            f += (self.region.project_to_boundary(&p) - p) * c.boundary_stiffness;
            stiffness += c.boundary_stiffness;
        }
        (f, stiffness)
    }

    fn compute_forces(&mut self) {
        let expansion = match self.config.spring_law {
            SpringLaw::Linear => 1.0,
            SpringLaw::Expanding => self.expansion(),
        };
        let mut forces = std::mem::take(&mut self.forces);

        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            forces
                .par_iter_mut()
                .enumerate()
                .for_each(|(i, f)| *f = self.force_on(i, expansion));
        }
        #[cfg(not(feature = "parallel"))]
        for (i, f) in forces.iter_mut().enumerate() {
            *f = self.force_on(i, expansion);
        }

        self.forces = forces;
    }

    /// Advances the relaxation by one time step.
    pub fn step_once(&mut self) -> Result<StepReport> {
        let index_rebuilt = self.refresh_candidates()?;
        let jittered = self.separate_coincident();
        self.snapshot.clone_from(&self.positions);
        self.compute_forces();

        let c = &self.config;
        let gain = match c.spring_law {
            SpringLaw::Linear => c.force_scale * c.time_step,
            // The force scale already went into the inflated rest lengths.
            SpringLaw::Expanding => c.time_step,
        };
        let max_step = c.max_step();
        let mut max_displacement = 0.0f64;
        for i in 0..self.positions.len() {
            let (force, stiffness) = self.forces[i];
            let gain = if stiffness > 0.0 {
                gain.min(c.stability_bound / stiffness)
            } else {
                gain
            };
            let mut step = force * gain;
            let len = step.norm();
            if len > max_step {
                step *= max_step / len;
            }
            let mut p = self.snapshot[i] + step;
            if c.clamp_to_boundary && self.region.signed_distance(&p) > 0.0 {
                p = self.region.project_to_boundary(&p);
            }
            max_displacement = max_displacement.max((p - self.snapshot[i]).norm());
            self.positions[i] = p;
        }

        self.iterations += 1;
        let previous = self.energy;
        self.energy = self.spring_energy();
        let decrease = previous - self.energy;
        if self.iterations > c.settle_iterations
            && decrease <= c.energy_tolerance * previous.max(f64::MIN_POSITIVE)
        {
            self.stalled += 1;
        } else {
            self.stalled = 0;
        }

        self.phase = if max_displacement / c.h0 < c.displacement_tolerance {
            Phase::Converged(ConvergenceReason::Displacement)
        } else if self.stalled >= c.stall_window {
            Phase::Converged(ConvergenceReason::EnergyStall)
        } else {
            Phase::Iterating
        };

        trace!(
            iteration = self.iterations,
            max_displacement,
            energy = self.energy,
            index_rebuilt,
            jittered,
            "relaxation step"
        );
        Ok(StepReport {
            iteration: self.iterations,
            max_displacement,
            energy: self.energy,
            index_rebuilt,
            jittered,
        })
    }

    fn termination(&self) -> Termination {
        match self.phase {
            Phase::Converged(by) => Termination::Converged { by },
            _ => Termination::IterationLimitReached,
        }
    }

    /// Steps until converged or `max_iterations` more steps have run.
    ///
    /// Running out of iterations is a normal outcome, reported as
    /// [`Termination::IterationLimitReached`].
    pub fn run(&mut self, max_iterations: usize) -> Result<Termination> {
        let span = debug_span!("relaxation", points = self.positions.len(), dim = D);
        let _guard = span.enter();

        if let Phase::Converged(by) = self.phase {
            return Ok(Termination::Converged { by });
        }
        for _ in 0..max_iterations {
            self.step_once()?;
            if matches!(self.phase, Phase::Converged(_)) {
                break;
            }
        }
        if !matches!(self.phase, Phase::Converged(_)) {
            self.phase = Phase::IterationLimitReached;
        }

        let termination = self.termination();
        debug!(
            ?termination,
            iterations = self.iterations,
            energy = self.energy,
            index_rebuilds = self.candidates.rebuilds,
            "relaxation finished"
        );
        Ok(termination)
    }

    /// Consumes the run and returns positions in caller coordinates.
    pub fn finalize(self) -> LayoutResult {
        let positions = self
            .positions
            .iter()
            .flat_map(|p| {
                let w = self.frame.to_world(p);
                (0..D).map(move |k| w[k])
            })
            .collect();
        LayoutResult {
            dim: D,
            positions,
            termination: self.termination(),
            iterations: self.iterations,
            energy: self.energy,
            edges: self.topology.edges().to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{NeighborCriterion, Placement};
    use crate::shape::{Disk, Square};

    fn square_config() -> SpringConfig {
        SpringConfig {
            neighbors: NeighborCriterion::Radius(1.5),
            placement: Placement::Given,
            rest_length: Some(0.5),
            ..Default::default()
        }
    }

    #[test]
    fn initialize_rejects_too_few_points() {
        let disk = Disk::new([0.0, 0.0], 1.0).unwrap();
        assert!(matches!(
            Relaxation::<2, _>::initialize(&[], disk, &SpringConfig::default()),
            Err(Error::EmptyInput)
        ));
        assert!(matches!(
            Relaxation::initialize(&[[0.0, 0.0]], disk, &SpringConfig::default()),
            Err(Error::InsufficientPoints { found: 1 })
        ));
        assert!(matches!(
            Relaxation::initialize(&[[0.0, 0.0], [f64::NAN, 1.0]], disk, &SpringConfig::default()),
            Err(Error::NonFinite { row: 1 })
        ));
    }

    #[test]
    fn coincident_points_are_separated_before_forces() {
        let square = Square::new([0.0, 0.0], 2.0).unwrap();
        let pts = [[1.0, 1.0], [1.0, 1.0], [0.5, 0.5]];
        let mut engine = Relaxation::initialize(&pts, square, &square_config()).unwrap();
        let report = engine.step_once().unwrap();
        assert_eq!(report.jittered, 1);
        assert!(engine.local_positions().iter().all(|p| p.iter().all(|c| c.is_finite())));
        let d = (engine.local_positions()[0] - engine.local_positions()[1]).norm();
        assert!(d > 0.0);
    }

    #[test]
    fn stretched_pair_contracts_towards_rest_length() {
        let square = Square::new([0.0, 0.0], 2.0).unwrap();
        let pts = [[0.5, 1.0], [1.5, 1.0]];
        let config = SpringConfig {
            repulsion: crate::config::Repulsion {
                strength: 0.0,
                radius: None,
            },
            ..square_config()
        };
        let mut engine = Relaxation::initialize(&pts, square, &config).unwrap();
        assert_eq!(engine.edges(), &[(0, 1)]);
        let before = engine.energy();
        engine.step_once().unwrap();
        assert!(engine.energy() < before);
        let d = (engine.local_positions()[0] - engine.local_positions()[1]).norm();
        // Each end moves 0.24 * (1.0 - 0.5) inwards.
        assert!((d - (1.0 - 2.0 * 0.24 * 0.5)).abs() < 1e-12, "d = {d}");
    }

    #[test]
    fn crowded_points_take_shorter_steps() {
        let square = Square::new([0.0, 0.0], 2.0).unwrap();
        let hub = SVector::<f64, 2>::new(1.05, 1.0);
        let mut pts = vec![[hub.x, hub.y]];
        for k in 0..8 {
            let a = std::f64::consts::FRAC_PI_4 * k as f64;
            pts.push([1.0 + 0.5 * a.cos(), 1.0 + 0.5 * a.sin()]);
        }
        let config = SpringConfig {
            neighbors: NeighborCriterion::Radius(0.6),
            placement: Placement::Given,
            rest_length: Some(0.3),
            rest_mode: crate::config::RestMode::Uniform,
            ..Default::default()
        };
        let mut engine = Relaxation::initialize(&pts, square, &config).unwrap();
        assert_eq!(engine.topology.incident(0).len(), 8);

        let expected = pts[1..].iter().fold(SVector::<f64, 2>::zeros(), |f, q| {
            let v = SVector::<f64, 2>::new(q[0], q[1]) - hub;
            let d = v.norm();
            f + v * ((d - 0.3) / d)
        });
        engine.step_once().unwrap();
        // Eight unit springs: the hub steps with 0.8 / 8 instead of 1.2 * 0.2.
        let moved = engine.local_positions()[0] - hub;
        assert!((moved - expected * 0.1).norm() < 1e-12, "{moved:?}");
    }

    #[test]
    fn zero_iterations_report_the_limit() {
        let square = Square::new([0.0, 0.0], 2.0).unwrap();
        let pts = [[0.5, 1.0], [1.5, 1.0]];
        let mut engine = Relaxation::initialize(&pts, square, &square_config()).unwrap();
        assert_eq!(engine.phase(), Phase::Initialized);
        assert_eq!(
            engine.run(0).unwrap(),
            Termination::IterationLimitReached
        );
        let result = engine.finalize();
        assert_eq!(result.iterations, 0);
        assert_eq!(result.point(1), &[1.5, 1.0]);
    }
}
