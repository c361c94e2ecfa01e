use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::metric::{Metric, Weights};
use crate::stack::SearchStack;

pub(crate) const NIL: usize = usize::MAX;

/// How a node picks the dimension it splits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SplitRule {
    /// Dimension with the largest (weighted) coordinate range among the node's points.
    #[default]
    MaxSpread,
    /// Tree level modulo the dimension count, skipping dimensions that are flat in the node.
    RoundRobin,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BuildOptions {
    pub split_rule: SplitRule,
    pub metric: Metric,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Node {
    /// Row of the indexed point in the borrowed data buffer.
    pub(crate) row: usize,
    pub(crate) axis: usize,
    pub(crate) split: f64,
    pub(crate) left: usize,
    pub(crate) right: usize,
}

/// Balanced kd-tree over a borrowed, row-major point buffer.
///
/// Every node stores one point (by row index) together with its split axis and value. For a
/// node splitting axis `k` at `v`, points in the left subtree have `x[k] <= v` and points in the
/// right subtree have `x[k] >= v`. Medians are taken under the `(coordinate, row)` order, so
/// the height is `ceil(log2(n + 1))` even when every point is identical.
///
/// The structure is immutable once built; rebuild it when the points move.
#[derive(Debug, Clone)]
pub struct KdTree<'a> {
    data: &'a [f64],
    dim: usize,
    nodes: Vec<Node>,
    weights: Weights,
    height: usize,
}

enum Link {
    Root,
    Left(usize),
    Right(usize),
}

struct Task {
    lo: usize,
    hi: usize,
    depth: usize,
    link: Link,
}

impl<'a> KdTree<'a> {
    /// Builds a Euclidean tree splitting on the dimension of maximum spread.
    pub fn build(data: &'a [f64], dim: usize) -> Result<Self> {
        Self::build_with(data, dim, &BuildOptions::default())
    }

    pub fn build_with(data: &'a [f64], dim: usize, options: &BuildOptions) -> Result<Self> {
        if dim == 0 {
            return Err(Error::DimensionMismatch {
                expected: 1,
                found: 0,
            });
        }
        if data.len() % dim != 0 {
            return Err(Error::RaggedInput {
                len: data.len(),
                dim,
            });
        }
        let n = data.len() / dim;
        if n == 0 {
            return Err(Error::EmptyInput);
        }
        let weights = Weights::compile(&options.metric, dim)?;

        let mut order: Vec<usize> = (0..n).collect();
        let mut nodes: Vec<Node> = Vec::with_capacity(n);
        let mut height = 0usize;
        let mut work = vec![Task {
            lo: 0,
            hi: n,
            depth: 0,
            link: Link::Root,
        }];

        // Left tasks are pushed last so nodes come out in pre-order.
        while let Some(Task {
            lo,
            hi,
            depth,
            link,
        }) = work.pop()
        {
            let axis = choose_axis(data, dim, &weights, options.split_rule, &order[lo..hi], depth);
            let mid = lo + (hi - lo) / 2;
            order[lo..hi].select_nth_unstable_by(mid - lo, |&a, &b| {
                cmp_rows(data, dim, axis, a, b)
            });
            let row = order[mid];

            let id = nodes.len();
            nodes.push(Node {
                row,
                axis,
                split: data[row * dim + axis],
                left: NIL,
                right: NIL,
            });
            match link {
                Link::Root => {}
                Link::Left(parent) => nodes[parent].left = id,
                Link::Right(parent) => nodes[parent].right = id,
            }
            height = height.max(depth + 1);

            if mid + 1 < hi {
                work.push(Task {
                    lo: mid + 1,
                    hi,
                    depth: depth + 1,
                    link: Link::Right(id),
                });
            }
            if lo < mid {
                work.push(Task {
                    lo,
                    hi: mid,
                    depth: depth + 1,
                    link: Link::Left(id),
                });
            }
        }

        tracing::trace!(points = n, dim, height, "kd-tree built");

        Ok(Self {
            data,
            dim,
            nodes,
            weights,
            height,
        })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Number of nodes on the longest root-to-leaf path.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Coordinates of the indexed point at `row`, straight from the borrowed buffer.
    pub fn point(&self, row: usize) -> &'a [f64] {
        &self.data[row * self.dim..(row + 1) * self.dim]
    }

    /// Distance between two points under the tree's metric.
    pub fn distance(&self, a: &[f64], b: &[f64]) -> f64 {
        self.weights.dist_sq(a, b).sqrt()
    }

    /// A stack sized for this tree.
    pub fn stack(&self) -> SearchStack {
        SearchStack::with_capacity(self.height + 1)
    }

    pub(crate) fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub(crate) fn weights(&self) -> &Weights {
        &self.weights
    }
}

fn cmp_rows(data: &[f64], dim: usize, axis: usize, a: usize, b: usize) -> Ordering {
    data[a * dim + axis]
        .total_cmp(&data[b * dim + axis])
        .then(a.cmp(&b))
}

fn axis_range(data: &[f64], dim: usize, axis: usize, rows: &[usize]) -> f64 {
    let mut lo = f64::INFINITY;
    let mut hi = f64::NEG_INFINITY;
    for &r in rows {
        let v = data[r * dim + axis];
        lo = lo.min(v);
        hi = hi.max(v);
    }
    hi - lo
}

fn choose_axis(
    data: &[f64],
    dim: usize,
    weights: &Weights,
    rule: SplitRule,
    rows: &[usize],
    depth: usize,
) -> usize {
    let active = weights.active();
    match rule {
        SplitRule::MaxSpread => {
            let mut best = active[0];
            let mut best_spread = f64::NEG_INFINITY;
            for &axis in active {
                let spread = axis_range(data, dim, axis, rows) * weights.axis_weight(axis).sqrt();
                if spread > best_spread {
                    best_spread = spread;
                    best = axis;
                }
            }
            best
        }
        SplitRule::RoundRobin => {
            let start = depth % active.len();
            (0..active.len())
                .map(|i| active[(start + i) % active.len()])
                .find(|&axis| axis_range(data, dim, axis, rows) > 0.0)
                .unwrap_or(active[start])
        }
    }
}
