//! Fixed neighbour topology, computed once from the input coordinates.

use indexmap::IndexSet;
use kdspace::KdTree;
use rustc_hash::FxBuildHasher;

use crate::config::{NeighborCriterion, RestMode};
use crate::error::Result;

/// Symmetric neighbour pairs with their rest lengths, plus a per-point adjacency in CSR layout.
#[derive(Debug, Clone)]
pub(crate) struct Topology {
    edges: Vec<(usize, usize)>,
    rest: Vec<f64>,
    offsets: Vec<usize>,
    /// `(other point, edge id)` for every edge incident to a point.
    adjacency: Vec<(usize, usize)>,
}

/// Unordered pairs `(i, j)` with `i < j`, in the order the queries discover them.
pub(crate) fn natural_neighbors(
    points: &[f64],
    dim: usize,
    criterion: NeighborCriterion,
) -> Result<IndexSet<(usize, usize), FxBuildHasher>> {
    let tree = KdTree::build(points, dim)?;
    let n = tree.len();

    let query = |stack: &mut kdspace::SearchStack, i: usize| -> Result<Vec<usize>> {
        let p = tree.point(i);
        let hits = match criterion {
            NeighborCriterion::Radius(r) => tree.radius_query(stack, p, r)?,
            // One extra slot for the point itself.
            NeighborCriterion::KNearest(k) => tree.k_nearest(stack, p, k.saturating_add(1))?,
        };
        let mut others: Vec<usize> = hits.into_iter().map(|h| h.index).filter(|&j| j != i).collect();
        if let NeighborCriterion::KNearest(k) = criterion {
            others.truncate(k);
        }
        Ok(others)
    };

    #[cfg(feature = "parallel")]
    let per_point: Vec<Vec<usize>> = {
        use rayon::prelude::*;
        (0..n)
            .into_par_iter()
            .map_init(|| tree.stack(), |stack, i| query(stack, i))
            .collect::<Result<_>>()?
    };
    #[cfg(not(feature = "parallel"))]
    let per_point: Vec<Vec<usize>> = {
        let mut stack = tree.stack();
        (0..n).map(|i| query(&mut stack, i)).collect::<Result<_>>()?
    };

    let mut pairs: IndexSet<(usize, usize), FxBuildHasher> = IndexSet::default();
    for (i, others) in per_point.iter().enumerate() {
        for &j in others {
            pairs.insert((i.min(j), i.max(j)));
        }
    }
    Ok(pairs)
}

impl Topology {
    /// `points` are the input coordinates, used for proportional rest lengths.
    pub(crate) fn new(
        n: usize,
        pairs: IndexSet<(usize, usize), FxBuildHasher>,
        points: &[f64],
        dim: usize,
        rest_length: f64,
        mode: RestMode,
    ) -> Self {
        let edges: Vec<(usize, usize)> = pairs.into_iter().collect();
        let rest = rest_lengths(&edges, points, dim, rest_length, mode);

        let mut degree = vec![0usize; n];
        for &(i, j) in &edges {
            degree[i] += 1;
            degree[j] += 1;
        }
        let mut offsets = Vec::with_capacity(n + 1);
        offsets.push(0);
        for d in &degree {
            offsets.push(offsets[offsets.len() - 1] + d);
        }
        let mut fill = offsets[..n].to_vec();
        let mut adjacency = vec![(0, 0); offsets[n]];
        for (e, &(i, j)) in edges.iter().enumerate() {
            adjacency[fill[i]] = (j, e);
            fill[i] += 1;
            adjacency[fill[j]] = (i, e);
            fill[j] += 1;
        }

        Self {
            edges,
            rest,
            offsets,
            adjacency,
        }
    }

    pub(crate) fn edges(&self) -> &[(usize, usize)] {
        &self.edges
    }

    pub(crate) fn rest(&self) -> &[f64] {
        &self.rest
    }

    pub(crate) fn incident(&self, i: usize) -> &[(usize, usize)] {
        &self.adjacency[self.offsets[i]..self.offsets[i + 1]]
    }
}

/// Smallest rest length a proportional pair can get, relative to the mean.
const MIN_PROPORTIONAL_REST: f64 = 0.1;

fn rest_lengths(
    edges: &[(usize, usize)],
    points: &[f64],
    dim: usize,
    rest_length: f64,
    mode: RestMode,
) -> Vec<f64> {
    if mode == RestMode::Uniform || edges.is_empty() {
        return vec![rest_length; edges.len()];
    }
    let input: Vec<f64> = edges
        .iter()
        .map(|&(i, j)| {
            let a = &points[i * dim..(i + 1) * dim];
            let b = &points[j * dim..(j + 1) * dim];
            a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum::<f64>().sqrt()
        })
        .collect();
    let mean = input.iter().sum::<f64>() / input.len() as f64;
    if !(mean > 0.0) {
        return vec![rest_length; edges.len()];
    }
    let scale = rest_length / mean;
    let floor = MIN_PROPORTIONAL_REST * rest_length;
    input.into_iter().map(|d| (d * scale).max(floor)).collect()
}
