use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Distance used both to order the tree and to rank query results.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum Metric {
    #[default]
    Euclidean,
    /// Per-dimension standard deviations: a dimension contributes `((a - b) / sigma)^2`.
    ///
    /// `sigma == 0` removes the dimension from distances and from split selection, which is how
    /// descriptor browsers mask out features without rebuilding their data.
    Weighted { sigma: Vec<f64> },
}

/// `Metric` resolved against a concrete dimension.
#[derive(Debug, Clone)]
pub(crate) struct Weights {
    /// `1 / sigma^2` per dimension, or `None` for plain Euclidean distance.
    inv_sq: Option<Vec<f64>>,
    active: Vec<usize>,
}

impl Weights {
    pub(crate) fn compile(metric: &Metric, dim: usize) -> Result<Self> {
        match metric {
            Metric::Euclidean => Ok(Self {
                inv_sq: None,
                active: (0..dim).collect(),
            }),
            Metric::Weighted { sigma } => {
                if sigma.len() != dim {
                    return Err(Error::DimensionMismatch {
                        expected: dim,
                        found: sigma.len(),
                    });
                }
                if sigma.iter().any(|s| !s.is_finite() || *s < 0.0) {
                    return Err(Error::InvalidWeights {
                        reason: "sigma must be finite and non-negative",
                    });
                }
                let inv_sq: Vec<f64> = sigma
                    .iter()
                    .map(|&s| if s > 0.0 { 1.0 / (s * s) } else { 0.0 })
                    .collect();
                let active: Vec<usize> = (0..dim).filter(|&d| inv_sq[d] > 0.0).collect();
                if active.is_empty() {
                    return Err(Error::InvalidWeights {
                        reason: "every dimension has sigma == 0",
                    });
                }
                Ok(Self {
                    inv_sq: Some(inv_sq),
                    active,
                })
            }
        }
    }

    /// Dimensions that take part in distances (all of them for Euclidean).
    pub(crate) fn active(&self) -> &[usize] {
        &self.active
    }

    #[inline]
    pub(crate) fn axis_weight(&self, axis: usize) -> f64 {
        match &self.inv_sq {
            None => 1.0,
            Some(w) => w[axis],
        }
    }

    #[inline]
    pub(crate) fn axis_sq(&self, axis: usize, diff: f64) -> f64 {
        diff * diff * self.axis_weight(axis)
    }

    #[inline]
    pub(crate) fn dist_sq(&self, a: &[f64], b: &[f64]) -> f64 {
        match &self.inv_sq {
            None => a
                .iter()
                .zip(b)
                .map(|(x, y)| {
                    let d = x - y;
                    d * d
                })
                .sum(),
            Some(w) => a
                .iter()
                .zip(b)
                .zip(w)
                .map(|((x, y), w)| {
                    let d = x - y;
                    d * d * w
                })
                .sum(),
        }
    }
}
