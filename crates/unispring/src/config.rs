use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// How the fixed neighbour topology is chosen in the input space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NeighborCriterion {
    /// Every pair closer than this distance, in input units.
    Radius(f64),
    /// Each point's `k` nearest other points; pairs are symmetrised.
    KNearest(usize),
}

impl Default for NeighborCriterion {
    fn default() -> Self {
        Self::KNearest(6)
    }
}

/// Where points start before the first step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Placement {
    /// Per-axis rank transform into the placement box: the i-th smallest coordinate lands at
    /// fraction `i / (n - 1)`. Ties keep input order.
    #[default]
    PreUniformize,
    /// Per-axis min-max rescale into the placement box.
    Scale,
    /// Independent uniform samples of the region.
    Sample,
    /// The input coordinates themselves.
    Given,
}

/// How each pair's rest length is derived from the mean rest length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RestMode {
    /// Input-space pair distances rescaled so their mean equals the rest length.
    #[default]
    Proportional,
    /// Every pair gets the rest length.
    Uniform,
}

/// Force law applied along each neighbour pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SpringLaw {
    /// Hooke spring `d - rest`, pulling and pushing, saturated at `max_edge_length`.
    #[default]
    Linear,
    /// Push-only bars: rest lengths are inflated by `force_scale` and the ratio of total actual
    /// to total rest length, and a pair only pushes while shorter than that. Points spread
    /// until the boundary holds them, which fills the region more evenly than `Linear`.
    Expanding,
}

/// When candidate lists for repulsion and coincidence checks are refreshed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IndexRebuild {
    EveryStep,
    /// Only once some point has drifted more than `rebuild_tolerance * h0` since the last
    /// rebuild.
    #[default]
    OnDrift,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Repulsion {
    /// Zero disables repulsion.
    pub strength: f64,
    /// Interaction radius; `None` means half the mean rest length.
    pub radius: Option<f64>,
}

impl Default for Repulsion {
    fn default() -> Self {
        Self {
            strength: 0.3,
            radius: None,
        }
    }
}

/// Every tunable of a relaxation run.
///
/// Lengths are in the relaxation frame, where the region's extent along its last axis is 2
/// (see [`crate::shape::Frame`]). `h0` is the reference spacing that displacement and drift
/// tolerances are measured against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SpringConfig {
    pub h0: f64,
    /// Mean rest length. `None` derives it from the region: `(measure / n)^(1 / dim)`.
    pub rest_length: Option<f64>,
    pub rest_mode: RestMode,
    pub spring_law: SpringLaw,
    /// Spring forces stop growing once a pair is stretched beyond this length.
    pub max_edge_length: f64,
    pub force_scale: f64,
    pub time_step: f64,
    /// Cap on a point's gain times the summed stiffness of the forces acting on it. A point
    /// with many springs takes proportionally smaller steps; explicit steps start to
    /// oscillate once this product reaches 2.
    pub stability_bound: f64,
    /// Largest distance a point may move in one step. `None` means `0.5 * h0`.
    pub max_step: Option<f64>,
    /// Converged once the largest per-step displacement over `h0` falls below this.
    pub displacement_tolerance: f64,
    /// Relative energy decrease under which a step counts as stalled.
    pub energy_tolerance: f64,
    /// Consecutive stalled steps that end the run.
    pub stall_window: usize,
    /// Steps ignored by stall detection at the start of a run.
    pub settle_iterations: usize,
    /// Drift (over `h0`) that triggers a candidate-list rebuild.
    pub rebuild_tolerance: f64,
    pub index_rebuild: IndexRebuild,
    /// Machine epsilon; points closer than `sqrt(eps) * h0` are treated as coincident.
    pub eps: f64,
    /// Geometric tolerance: boundary force threshold and coincidence jitter magnitude.
    /// `None` means `0.001 * h0`.
    pub geps: Option<f64>,
    pub polygon_grid_res: f64,
    /// Side of the placement box relative to the region's bounding box.
    pub rect_scale: f64,
    pub max_iterations: usize,
    pub seed: u64,
    pub neighbors: NeighborCriterion,
    pub placement: Placement,
    pub repulsion: Repulsion,
    pub boundary_stiffness: f64,
    /// Project points that end a step outside the region back onto its boundary.
    pub clamp_to_boundary: bool,
}

impl Default for SpringConfig {
    fn default() -> Self {
        Self {
            h0: 0.5,
            rest_length: None,
            rest_mode: RestMode::default(),
            spring_law: SpringLaw::default(),
            max_edge_length: 2.0,
            force_scale: 1.2,
            time_step: 0.2,
            stability_bound: 0.8,
            max_step: None,
            displacement_tolerance: 0.0016,
            energy_tolerance: 1e-6,
            stall_window: 20,
            settle_iterations: 10,
            rebuild_tolerance: 0.1,
            index_rebuild: IndexRebuild::default(),
            eps: 2.2204e-16,
            geps: None,
            polygon_grid_res: 0.01,
            rect_scale: std::f64::consts::SQRT_2,
            max_iterations: 1000,
            seed: 0,
            neighbors: NeighborCriterion::default(),
            placement: Placement::default(),
            repulsion: Repulsion::default(),
            boundary_stiffness: 1.0,
            clamp_to_boundary: true,
        }
    }
}

fn positive(name: &str, v: f64) -> Result<()> {
    if v.is_finite() && v > 0.0 {
        Ok(())
    } else {
        Err(Error::config(format!("{name} must be finite and positive, got {v}")))
    }
}

fn non_negative(name: &str, v: f64) -> Result<()> {
    if v.is_finite() && v >= 0.0 {
        Ok(())
    } else {
        Err(Error::config(format!(
            "{name} must be finite and non-negative, got {v}"
        )))
    }
}

impl SpringConfig {
    pub fn max_step(&self) -> f64 {
        self.max_step.unwrap_or(0.5 * self.h0)
    }

    pub fn geps(&self) -> f64 {
        self.geps.unwrap_or(0.001 * self.h0)
    }

    /// Parses a (possibly partial) JSON object; missing fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        positive("h0", self.h0)?;
        if let Some(r) = self.rest_length {
            positive("restLength", r)?;
        }
        positive("maxEdgeLength", self.max_edge_length)?;
        positive("forceScale", self.force_scale)?;
        positive("timeStep", self.time_step)?;
        positive("stabilityBound", self.stability_bound)?;
        if let Some(v) = self.max_step {
            positive("maxStep", v)?;
        }
        non_negative("displacementTolerance", self.displacement_tolerance)?;
        non_negative("energyTolerance", self.energy_tolerance)?;
        positive("rebuildTolerance", self.rebuild_tolerance)?;
        non_negative("eps", self.eps)?;
        if let Some(v) = self.geps {
            non_negative("geps", v)?;
        }
        positive("rectScale", self.rect_scale)?;
        non_negative("boundaryStiffness", self.boundary_stiffness)?;
        non_negative("repulsion.strength", self.repulsion.strength)?;
        if let Some(r) = self.repulsion.radius {
            positive("repulsion.radius", r)?;
        }
        if !(self.polygon_grid_res > 0.0 && self.polygon_grid_res <= 1.0) {
            return Err(Error::config(format!(
                "polygonGridRes must be in (0, 1], got {}",
                self.polygon_grid_res
            )));
        }
        if self.stall_window == 0 {
            return Err(Error::config("stallWindow must be at least 1"));
        }
        match self.neighbors {
            NeighborCriterion::Radius(r) => positive("neighbors.radius", r)?,
            NeighborCriterion::KNearest(0) => {
                return Err(Error::config("neighbors.kNearest must be at least 1"));
            }
            NeighborCriterion::KNearest(_) => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_table() {
        let c = SpringConfig::default();
        assert_eq!(c.h0, 0.5);
        assert_eq!(c.geps(), 0.0005);
        assert_eq!(c.max_step(), 0.25);
        assert_eq!(c.stability_bound, 0.8);
        assert_eq!(c.force_scale, 1.2);
        assert_eq!(c.time_step, 0.2);
        assert_eq!(c.displacement_tolerance, 0.0016);
        assert_eq!(c.rebuild_tolerance, 0.1);
        assert_eq!(c.rect_scale, 2f64.sqrt());
        assert_eq!(c.neighbors, NeighborCriterion::KNearest(6));
        c.validate().unwrap();
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let c = SpringConfig::from_json_str(
            r#"{"restLength": 0.25, "neighbors": {"radius": 1.5}, "placement": "given"}"#,
        )
        .unwrap();
        assert_eq!(c.rest_length, Some(0.25));
        assert_eq!(c.neighbors, NeighborCriterion::Radius(1.5));
        assert_eq!(c.placement, Placement::Given);
        assert_eq!(c.max_iterations, 1000);
    }

    #[test]
    fn derived_lengths_follow_h0() {
        let c = SpringConfig::from_json_str(r#"{"h0": 0.1}"#).unwrap();
        assert!((c.geps() - 1e-4).abs() < 1e-18);
        assert!((c.max_step() - 0.05).abs() < 1e-15);
        let pinned = SpringConfig {
            h0: 0.1,
            geps: Some(0.01),
            max_step: Some(1.0),
            ..Default::default()
        };
        assert_eq!(pinned.geps(), 0.01);
        assert_eq!(pinned.max_step(), 1.0);
        assert!(matches!(
            SpringConfig::from_json_str(r#"{"maxStep": 0}"#),
            Err(Error::InvalidConfig { .. })
        ));
    }

    #[test]
    fn invalid_values_are_reported_by_name() {
        let err = SpringConfig::from_json_str(r#"{"timeStep": -1}"#).unwrap_err();
        assert!(err.to_string().contains("timeStep"), "{err}");
        let c = SpringConfig {
            neighbors: NeighborCriterion::KNearest(0),
            ..Default::default()
        };
        assert!(matches!(c.validate(), Err(Error::InvalidConfig { .. })));
        assert!(matches!(
            SpringConfig::from_json_str("{not json"),
            Err(Error::Json(_))
        ));
    }
}
