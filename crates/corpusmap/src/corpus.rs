use kdspace::{BuildOptions, KdTree, Neighbor, SearchStack, SearchStats};
use serde::{Deserialize, Serialize};
use tracing::debug;
use unispring::{LayoutResult, Shape, ShapeSpec, SpringConfig, Termination};

use crate::error::{Error, Result};

/// Descriptor vectors of one dimension, each tagged with a caller payload.
///
/// Rows are stored row-major in one buffer so indexes and layouts borrow them without copying.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Corpus<P> {
    dim: usize,
    descriptors: Vec<f64>,
    payloads: Vec<P>,
}

impl<P> Corpus<P> {
    pub fn new(dim: usize) -> Result<Self> {
        if dim == 0 {
            return Err(Error::ZeroDimension);
        }
        Ok(Self {
            dim,
            descriptors: Vec::new(),
            payloads: Vec::new(),
        })
    }

    /// Takes over a row-major descriptor buffer and its payloads.
    pub fn from_rows(dim: usize, descriptors: Vec<f64>, payloads: Vec<P>) -> Result<Self> {
        if dim == 0 {
            return Err(Error::ZeroDimension);
        }
        if descriptors.len() % dim != 0 {
            return Err(kdspace::Error::RaggedInput {
                len: descriptors.len(),
                dim,
            }
            .into());
        }
        let rows = descriptors.len() / dim;
        if rows != payloads.len() {
            return Err(Error::PayloadCount {
                descriptors: rows,
                payloads: payloads.len(),
            });
        }
        if let Some(row) = descriptors
            .chunks_exact(dim)
            .position(|r| r.iter().any(|v| !v.is_finite()))
        {
            return Err(Error::NonFinite { row });
        }
        Ok(Self {
            dim,
            descriptors,
            payloads,
        })
    }

    /// Appends a row and returns its index.
    pub fn push(&mut self, descriptor: &[f64], payload: P) -> Result<usize> {
        if descriptor.len() != self.dim {
            return Err(Error::DimensionMismatch {
                expected: self.dim,
                found: descriptor.len(),
            });
        }
        let row = self.payloads.len();
        if descriptor.iter().any(|v| !v.is_finite()) {
            return Err(Error::NonFinite { row });
        }
        self.descriptors.extend_from_slice(descriptor);
        self.payloads.push(payload);
        Ok(row)
    }

    pub fn len(&self) -> usize {
        self.payloads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payloads.is_empty()
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// The row-major descriptor buffer.
    pub fn descriptors(&self) -> &[f64] {
        &self.descriptors
    }

    pub fn descriptor(&self, row: usize) -> Option<&[f64]> {
        self.descriptors.chunks_exact(self.dim).nth(row)
    }

    pub fn payload(&self, row: usize) -> Option<&P> {
        self.payloads.get(row)
    }

    pub fn payloads(&self) -> &[P] {
        &self.payloads
    }

    pub fn iter(&self) -> impl Iterator<Item = (&[f64], &P)> {
        self.descriptors.chunks_exact(self.dim).zip(&self.payloads)
    }

    /// Builds a kd-tree over the descriptors for lookups by example.
    pub fn index(&self, options: &BuildOptions) -> Result<CorpusIndex<'_, P>> {
        let tree = KdTree::build_with(&self.descriptors, self.dim, options)?;
        debug!(
            rows = tree.len(),
            dim = self.dim,
            height = tree.height(),
            "corpus index built"
        );
        let stack = tree.stack();
        Ok(CorpusIndex {
            corpus: self,
            tree,
            stack,
        })
    }

    /// Lays the corpus out in `shape`, using every descriptor dimension as a layout axis.
    ///
    /// The corpus dimension must match the shape's (2 or 3); see [`Corpus::layout_axes`] to pick
    /// columns out of a wider descriptor.
    pub fn layout(&self, shape: &Shape, config: &SpringConfig) -> Result<CorpusLayout<'_, P>> {
        let result = unispring::layout(&self.descriptors, self.dim, shape, config)?;
        self.laid_out(result)
    }

    /// Lays the corpus out using the descriptor columns `axes` as input coordinates.
    pub fn layout_axes(
        &self,
        axes: &[usize],
        shape: &Shape,
        config: &SpringConfig,
    ) -> Result<CorpusLayout<'_, P>> {
        if let Some(&axis) = axes.iter().find(|&&a| a >= self.dim) {
            return Err(Error::AxisOutOfRange {
                axis,
                dim: self.dim,
            });
        }
        let points: Vec<f64> = self
            .descriptors
            .chunks_exact(self.dim)
            .flat_map(|row| axes.iter().map(move |&a| row[a]))
            .collect();
        let result = unispring::layout(&points, axes.len(), shape, config)?;
        self.laid_out(result)
    }

    /// Runs a layout described by a JSON [`LayoutRequest`].
    pub fn layout_request(&self, json: &str) -> Result<CorpusLayout<'_, P>> {
        let request: LayoutRequest = serde_json::from_str(json)?;
        let shape = request.shape.build(request.config.polygon_grid_res)?;
        match &request.axes {
            Some(axes) => self.layout_axes(axes, &shape, &request.config),
            None => self.layout(&shape, &request.config),
        }
    }

    fn laid_out(&self, result: LayoutResult) -> Result<CorpusLayout<'_, P>> {
        debug!(
            rows = self.len(),
            termination = ?result.termination,
            iterations = result.iterations,
            "corpus laid out"
        );
        Ok(CorpusLayout {
            corpus: self,
            result,
        })
    }
}

/// A corpus row matched by a query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Hit<'c, P> {
    pub row: usize,
    pub distance: f64,
    pub payload: &'c P,
}

/// kd-tree over a borrowed corpus, with its own search stack.
#[derive(Debug)]
pub struct CorpusIndex<'c, P> {
    corpus: &'c Corpus<P>,
    tree: KdTree<'c>,
    stack: SearchStack,
}

impl<'c, P> CorpusIndex<'c, P> {
    fn hit(&self, n: Neighbor) -> Hit<'c, P> {
        let corpus: &'c Corpus<P> = self.corpus;
        Hit {
            row: n.index,
            distance: n.distance,
            payload: &corpus.payloads[n.index],
        }
    }

    fn hits(&self, found: Vec<Neighbor>) -> Vec<Hit<'c, P>> {
        found.into_iter().map(|n| self.hit(n)).collect()
    }

    pub fn tree(&self) -> &KdTree<'c> {
        &self.tree
    }

    pub fn stats(&self) -> SearchStats {
        self.stack.stats()
    }

    pub fn nearest(&mut self, query: &[f64]) -> Result<Hit<'c, P>> {
        let n = self.tree.nearest_neighbor(&mut self.stack, query, false)?;
        Ok(self.hit(n))
    }

    /// The row closest to `row`, other than `row` itself.
    pub fn nearest_other(&mut self, row: usize) -> Result<Hit<'c, P>> {
        let n = self.tree.nearest_other(&mut self.stack, row)?;
        Ok(self.hit(n))
    }

    /// Up to `k` rows, closest first.
    pub fn k_nearest(&mut self, query: &[f64], k: usize) -> Result<Vec<Hit<'c, P>>> {
        let found = self.tree.k_nearest(&mut self.stack, query, k)?;
        Ok(self.hits(found))
    }

    /// Every row within `radius` of `query`, closest first.
    pub fn within(&mut self, query: &[f64], radius: f64) -> Result<Vec<Hit<'c, P>>> {
        let mut found = self.tree.radius_query(&mut self.stack, query, radius)?;
        found.sort_by(|a, b| a.distance.total_cmp(&b.distance).then(a.index.cmp(&b.index)));
        Ok(self.hits(found))
    }
}

/// `{ "shape": ShapeSpec, "config": SpringConfig, "axes": [..] }`; `config` and `axes` are
/// optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutRequest {
    pub shape: ShapeSpec,
    #[serde(default)]
    pub config: SpringConfig,
    #[serde(default)]
    pub axes: Option<Vec<usize>>,
}

/// One laid-out row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Placed<'a, P> {
    pub payload: &'a P,
    pub position: &'a [f64],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LayoutDocument<'a, P> {
    dim: usize,
    termination: Termination,
    iterations: usize,
    energy: f64,
    points: Vec<Placed<'a, P>>,
    edges: &'a [(usize, usize)],
}

/// Layout positions paired with the corpus payloads, in row order.
#[derive(Debug, Clone)]
pub struct CorpusLayout<'c, P> {
    corpus: &'c Corpus<P>,
    result: LayoutResult,
}

impl<'c, P> CorpusLayout<'c, P> {
    pub fn result(&self) -> &LayoutResult {
        &self.result
    }

    pub fn into_result(self) -> LayoutResult {
        self.result
    }

    pub fn termination(&self) -> Termination {
        self.result.termination
    }

    pub fn iterations(&self) -> usize {
        self.result.iterations
    }

    pub fn len(&self) -> usize {
        self.result.len()
    }

    pub fn is_empty(&self) -> bool {
        self.result.is_empty()
    }

    pub fn position(&self, row: usize) -> Option<&[f64]> {
        (row < self.len()).then(|| self.result.point(row))
    }

    pub fn iter(&self) -> impl Iterator<Item = Placed<'_, P>> {
        let dim = self.result.dim;
        self.corpus
            .payloads
            .iter()
            .zip(self.result.positions.chunks_exact(dim))
            .map(|(payload, position)| Placed { payload, position })
    }
}

impl<P: Serialize> CorpusLayout<'_, P> {
    /// Serialises positions, payloads and run statistics as one JSON document.
    pub fn to_json(&self) -> Result<String> {
        let doc = LayoutDocument {
            dim: self.result.dim,
            termination: self.result.termination,
            iterations: self.result.iterations,
            energy: self.result.energy,
            points: self.iter().collect(),
            edges: &self.result.edges,
        };
        Ok(serde_json::to_string(&doc)?)
    }
}
