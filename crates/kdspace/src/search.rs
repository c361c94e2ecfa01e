use crate::error::{Error, Result};
use crate::stack::{SearchStack, SearchStats};
use crate::tree::{KdTree, NIL};

/// A query hit: the row of the indexed point and its distance under the tree's metric.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub index: usize,
    pub distance: f64,
}

trait Collector {
    /// Squared distance beyond which nothing can be accepted any more.
    fn bound(&self) -> f64;
    fn offer(&mut self, row: usize, dist_sq: f64);
}

#[derive(Debug, Clone, Copy)]
enum Exclude {
    Nothing,
    /// Skip candidates sitting exactly on the query.
    Coincident,
    Row(usize),
}

/// The `k` best candidates so far, kept sorted by `(dist_sq, row)`.
struct Best {
    k: usize,
    limit_sq: f64,
    exclude: Exclude,
    items: Vec<(f64, usize)>,
}

impl Best {
    fn new(k: usize, limit_sq: f64, exclude: Exclude) -> Self {
        Self {
            k,
            limit_sq,
            exclude,
            items: Vec::with_capacity(k.min(64) + 1),
        }
    }

    fn into_neighbors(self) -> Vec<Neighbor> {
        self.items
            .into_iter()
            .map(|(d, row)| Neighbor {
                index: row,
                distance: d.sqrt(),
            })
            .collect()
    }
}

fn key_lt(a: (f64, usize), b: (f64, usize)) -> bool {
    a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)).is_lt()
}

impl Collector for Best {
    fn bound(&self) -> f64 {
        match self.items.last() {
            Some(&(worst, _)) if self.items.len() == self.k => worst,
            _ => self.limit_sq,
        }
    }

    fn offer(&mut self, row: usize, dist_sq: f64) {
        match self.exclude {
            Exclude::Coincident if dist_sq == 0.0 => return,
            Exclude::Row(r) if r == row => return,
            _ => {}
        }
        if dist_sq.is_nan() || dist_sq > self.limit_sq {
            return;
        }
        let key = (dist_sq, row);
        if self.items.len() == self.k {
            match self.items.last() {
                Some(&worst) if key_lt(key, worst) => {
                    self.items.pop();
                }
                _ => return,
            }
        }
        let at = self.items.partition_point(|&item| key_lt(item, key));
        self.items.insert(at, key);
    }
}

struct Within {
    radius_sq: f64,
    hits: Vec<Neighbor>,
}

impl Collector for Within {
    fn bound(&self) -> f64 {
        self.radius_sq
    }

    fn offer(&mut self, row: usize, dist_sq: f64) {
        if dist_sq <= self.radius_sq {
            self.hits.push(Neighbor {
                index: row,
                distance: dist_sq.sqrt(),
            });
        }
    }
}

impl<'a> KdTree<'a> {
    fn check_query(&self, query: &[f64]) -> Result<()> {
        if query.len() != self.dim() {
            return Err(Error::DimensionMismatch {
                expected: self.dim(),
                found: query.len(),
            });
        }
        Ok(())
    }

    /// Depth-first descent with an explicit stack, near child first.
    ///
    /// Each frame carries a squared lower bound on the distance from the query to its subtree:
    /// the far child of a node inherits `max(parent bound, axis gap^2)`. A frame is dropped once
    /// its bound exceeds what the collector can still accept.
    fn traverse<C: Collector>(&self, stack: &mut SearchStack, query: &[f64], collector: &mut C) {
        let nodes = self.nodes();
        let weights = self.weights();
        stack.reset(self.height() + 1);
        stack.push(0, 0.0);

        while let Some(frame) = stack.pop() {
            if frame.bound > collector.bound() {
                stack.stats.nodes_pruned += 1;
                continue;
            }
            let node = nodes[frame.node];
            stack.stats.nodes_visited += 1;
            stack.stats.distance_evaluations += 1;
            collector.offer(node.row, weights.dist_sq(query, self.point(node.row)));

            let diff = query[node.axis] - node.split;
            let (near, far) = if diff <= 0.0 {
                (node.left, node.right)
            } else {
                (node.right, node.left)
            };
            if far != NIL {
                stack.push(far, frame.bound.max(weights.axis_sq(node.axis, diff)));
            }
            if near != NIL {
                stack.push(near, frame.bound);
            }
        }
    }

    fn best(
        &self,
        stack: &mut SearchStack,
        query: &[f64],
        k: usize,
        limit_sq: f64,
        exclude: Exclude,
    ) -> Result<Vec<Neighbor>> {
        self.check_query(query)?;
        if k == 0 {
            return Ok(Vec::new());
        }
        let mut best = Best::new(k, limit_sq, exclude);
        self.traverse(stack, query, &mut best);
        Ok(best.into_neighbors())
    }

    /// Closest indexed point to `query`.
    ///
    /// With `exclude_self`, points at distance zero from the query are skipped, so querying with
    /// a member's own coordinates yields its nearest distinct neighbour. Fails with
    /// [`Error::NotFound`] when nothing is left to return.
    pub fn nearest_neighbor(
        &self,
        stack: &mut SearchStack,
        query: &[f64],
        exclude_self: bool,
    ) -> Result<Neighbor> {
        let exclude = if exclude_self {
            Exclude::Coincident
        } else {
            Exclude::Nothing
        };
        self.best(stack, query, 1, f64::INFINITY, exclude)?
            .pop()
            .ok_or(Error::NotFound)
    }

    /// Closest point to the indexed point `row`, other than `row` itself.
    ///
    /// Unlike `nearest_neighbor(.., true)` this still reports duplicates at distance zero.
    pub fn nearest_other(&self, stack: &mut SearchStack, row: usize) -> Result<Neighbor> {
        if row >= self.len() {
            return Err(Error::NotFound);
        }
        self.best(stack, self.point(row), 1, f64::INFINITY, Exclude::Row(row))?
            .pop()
            .ok_or(Error::NotFound)
    }

    /// Up to `k` closest points, ascending by distance, ties broken by row.
    pub fn k_nearest(
        &self,
        stack: &mut SearchStack,
        query: &[f64],
        k: usize,
    ) -> Result<Vec<Neighbor>> {
        self.best(stack, query, k, f64::INFINITY, Exclude::Nothing)
    }

    /// Like [`KdTree::k_nearest`], restricted to points within `radius`.
    pub fn k_nearest_within(
        &self,
        stack: &mut SearchStack,
        query: &[f64],
        k: usize,
        radius: f64,
    ) -> Result<Vec<Neighbor>> {
        if radius.is_nan() || radius < 0.0 {
            self.check_query(query)?;
            return Ok(Vec::new());
        }
        self.best(stack, query, k, radius * radius, Exclude::Nothing)
    }

    /// Every point within `radius` (inclusive), in the order the descent reaches them.
    ///
    /// The order depends only on the tree shape, so identical builds give identical results.
    pub fn radius_query(
        &self,
        stack: &mut SearchStack,
        query: &[f64],
        radius: f64,
    ) -> Result<Vec<Neighbor>> {
        self.check_query(query)?;
        if radius.is_nan() || radius < 0.0 {
            return Ok(Vec::new());
        }
        let mut within = Within {
            radius_sq: radius * radius,
            hits: Vec::new(),
        };
        self.traverse(stack, query, &mut within);
        Ok(within.hits)
    }

    /// A query handle owning its own stack.
    pub fn searcher(&self) -> Searcher<'_, 'a> {
        Searcher {
            tree: self,
            stack: self.stack(),
        }
    }
}

/// A [`KdTree`] paired with a private [`SearchStack`].
///
/// Create one per thread to query a shared tree concurrently.
#[derive(Debug, Clone)]
pub struct Searcher<'t, 'a> {
    tree: &'t KdTree<'a>,
    stack: SearchStack,
}

impl<'t, 'a> Searcher<'t, 'a> {
    pub fn tree(&self) -> &'t KdTree<'a> {
        self.tree
    }

    pub fn stats(&self) -> SearchStats {
        self.stack.stats()
    }

    pub fn take_stats(&mut self) -> SearchStats {
        self.stack.take_stats()
    }

    pub fn nearest_neighbor(&mut self, query: &[f64], exclude_self: bool) -> Result<Neighbor> {
        self.tree
            .nearest_neighbor(&mut self.stack, query, exclude_self)
    }

    pub fn nearest_other(&mut self, row: usize) -> Result<Neighbor> {
        self.tree.nearest_other(&mut self.stack, row)
    }

    pub fn k_nearest(&mut self, query: &[f64], k: usize) -> Result<Vec<Neighbor>> {
        self.tree.k_nearest(&mut self.stack, query, k)
    }

    pub fn k_nearest_within(
        &mut self,
        query: &[f64],
        k: usize,
        radius: f64,
    ) -> Result<Vec<Neighbor>> {
        self.tree
            .k_nearest_within(&mut self.stack, query, k, radius)
    }

    pub fn radius_query(&mut self, query: &[f64], radius: f64) -> Result<Vec<Neighbor>> {
        self.tree.radius_query(&mut self.stack, query, radius)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn best_keeps_lowest_rows_on_ties() {
        let mut best = Best::new(2, f64::INFINITY, Exclude::Nothing);
        best.offer(5, 1.0);
        best.offer(3, 1.0);
        best.offer(9, 1.0);
        best.offer(1, 1.0);
        assert_eq!(best.items, vec![(1.0, 1), (1.0, 3)]);
    }

    #[test]
    fn best_reports_limit_until_full() {
        let mut best = Best::new(2, 4.0, Exclude::Nothing);
        assert_eq!(best.bound(), 4.0);
        best.offer(0, 9.0);
        assert!(best.items.is_empty());
        best.offer(1, 1.0);
        assert_eq!(best.bound(), 4.0);
        best.offer(2, 2.0);
        assert_eq!(best.bound(), 2.0);
    }

    #[test]
    fn single_point_tree_has_no_other_neighbor() {
        let data = [1.0, 2.0];
        let tree = KdTree::build(&data, 2).unwrap();
        let mut s = tree.searcher();
        assert_eq!(s.nearest_other(0).unwrap_err(), Error::NotFound);
        assert_eq!(
            s.nearest_neighbor(&[1.0, 2.0], true).unwrap_err(),
            Error::NotFound
        );
        assert_eq!(s.nearest_neighbor(&[0.0, 0.0], false).unwrap().index, 0);
    }
}
