use nalgebra::{SVector, Vector2};

use super::{Bounds, Frame, MAX_REJECTION_ATTEMPTS, Region};
use crate::error::{Error, Result};
use crate::rng::XorShift64Star;

/// Grid resolution used by [`Polygon::new`], as a fraction of the bounding box side.
pub const DEFAULT_GRID_RES: f64 = 0.01;

const MAX_GRID_CELLS_PER_AXIS: usize = 1024;

/// Simple polygon with a nearest-edge acceleration grid.
///
/// Vertices are stored counter-clockwise without a closing duplicate. Containment uses the
/// winding number, so points on the boundary count as inside up to the usual tolerance.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    vertices: Vec<Vector2<f64>>,
    area: f64,
    bounds: Bounds<2>,
    grid_res: f64,
    grid: EdgeGrid,
    inscribed_center: Vector2<f64>,
    inscribed_radius: f64,
}

/// Uniform grid over the bounding box. Each cell lists, in CSR layout, every edge that can be
/// nearest to some point of the cell.
#[derive(Debug, Clone, PartialEq)]
struct EdgeGrid {
    nx: usize,
    ny: usize,
    origin: Vector2<f64>,
    cell: Vector2<f64>,
    offsets: Vec<usize>,
    edges: Vec<usize>,
}

/// > 0 when `p` is left of the line through `a` and `b`, < 0 when right, 0 when on it.
pub(crate) fn is_left(a: &Vector2<f64>, b: &Vector2<f64>, p: &Vector2<f64>) -> f64 {
    (b.x - a.x) * (p.y - a.y) - (p.x - a.x) * (b.y - a.y)
}

fn closest_on_segment(a: &Vector2<f64>, b: &Vector2<f64>, p: &Vector2<f64>) -> Vector2<f64> {
    let ab = b - a;
    let len_sq = ab.norm_squared();
    if len_sq == 0.0 {
        return *a;
    }
    let t = ((p - a).dot(&ab) / len_sq).clamp(0.0, 1.0);
    a + ab * t
}

fn shoelace(vertices: &[Vector2<f64>]) -> f64 {
    let n = vertices.len();
    let twice: f64 = (0..n)
        .map(|i| {
            let a = vertices[i];
            let b = vertices[(i + 1) % n];
            a.x * b.y - b.x * a.y
        })
        .sum();
    twice / 2.0
}

impl Polygon {
    pub fn new(vertices: &[[f64; 2]]) -> Result<Self> {
        Self::with_grid_resolution(vertices, DEFAULT_GRID_RES)
    }

    /// `grid_res` is the cell side as a fraction of the bounding box, in `(0, 1]`.
    pub fn with_grid_resolution(vertices: &[[f64; 2]], grid_res: f64) -> Result<Self> {
        if !(grid_res.is_finite() && grid_res > 0.0 && grid_res <= 1.0) {
            return Err(Error::config(format!(
                "polygon grid resolution must be in (0, 1], got {grid_res}"
            )));
        }
        let mut ring: Vec<Vector2<f64>> = Vec::with_capacity(vertices.len());
        for v in vertices {
            if !(v[0].is_finite() && v[1].is_finite()) {
                return Err(Error::degenerate("polygon vertices must be finite"));
            }
            let v = Vector2::new(v[0], v[1]);
            if ring.last() != Some(&v) {
                ring.push(v);
            }
        }
        // Drop the closing vertex of an explicitly closed ring.
        while ring.len() > 1 && ring.first() == ring.last() {
            ring.pop();
        }
        if ring.len() < 3 {
            return Err(Error::degenerate(format!(
                "polygon needs at least 3 distinct vertices, got {}",
                ring.len()
            )));
        }
        let area = shoelace(&ring);
        let bounds = bounds_of(&ring);
        let extent = bounds.max - bounds.min;
        if !(area.abs() > 1e-12 * extent.x * extent.y) {
            return Err(Error::degenerate("polygon has zero area"));
        }
        if area < 0.0 {
            ring.reverse();
        }
        Ok(Self::from_ccw_ring(ring, area.abs(), grid_res))
    }

    fn from_ccw_ring(vertices: Vec<Vector2<f64>>, area: f64, grid_res: f64) -> Self {
        let bounds = bounds_of(&vertices);
        let grid = EdgeGrid::build(&vertices, &bounds, grid_res);
        let mut polygon = Self {
            vertices,
            area,
            bounds,
            grid_res,
            grid,
            inscribed_center: bounds.center(),
            inscribed_radius: 0.0,
        };
        let (center, radius) = polygon.find_inscribed_circle();
        polygon.inscribed_center = center;
        polygon.inscribed_radius = radius;
        polygon
    }

    /// Counter-clockwise vertex ring, without a closing duplicate.
    pub fn vertices(&self) -> &[Vector2<f64>] {
        &self.vertices
    }

    pub fn grid_resolution(&self) -> f64 {
        self.grid_res
    }

    /// Approximate largest inscribed circle (centre, radius), accurate to one grid cell.
    pub fn inscribed_circle(&self) -> (Vector2<f64>, f64) {
        (self.inscribed_center, self.inscribed_radius)
    }

    fn edge(&self, i: usize) -> (Vector2<f64>, Vector2<f64>) {
        let n = self.vertices.len();
        (self.vertices[i], self.vertices[(i + 1) % n])
    }

    /// Winding number of the ring around `p`.
    pub fn winding_number(&self, p: &Vector2<f64>) -> i32 {
        let mut wn = 0;
        for i in 0..self.vertices.len() {
            let (a, b) = self.edge(i);
            if a.y <= p.y {
                if b.y > p.y && is_left(&a, &b, p) > 0.0 {
                    wn += 1;
                }
            } else if b.y <= p.y && is_left(&a, &b, p) < 0.0 {
                wn -= 1;
            }
        }
        wn
    }

    /// Nearest boundary point and its squared distance.
    fn nearest_boundary_point(&self, p: &Vector2<f64>) -> (Vector2<f64>, f64) {
        let mut best = (self.vertices[0], f64::INFINITY);
        let mut consider = |i: usize| {
            let (a, b) = self.edge(i);
            let q = closest_on_segment(&a, &b, p);
            let d = (q - p).norm_squared();
            if d < best.1 {
                best = (q, d);
            }
        };
        match self.grid.cell_of(p) {
            Some(cell) => self.grid.candidates(cell).iter().for_each(|&i| consider(i)),
            None => (0..self.vertices.len()).for_each(consider),
        }
        best
    }

    /// Grid cell centre farthest from the boundary, the way a raster search finds it.
    fn find_inscribed_circle(&self) -> (Vector2<f64>, f64) {
        let mut best = (self.bounds.center(), 0.0);
        for iy in 0..self.grid.ny {
            for ix in 0..self.grid.nx {
                let c = self.grid.center(ix, iy);
                if self.winding_number(&c) == 0 {
                    continue;
                }
                let (_, d_sq) = self.nearest_boundary_point(&c);
                let d = d_sq.sqrt();
                if d > best.1 {
                    best = (c, d);
                }
            }
        }
        if best.1 == 0.0 {
            // Slivers thinner than a cell: fall back to the midpoint of the first edge.
            let (a, b) = self.edge(0);
            best = ((a + b) * 0.5, 0.0);
        }
        best
    }
}

fn bounds_of(vertices: &[Vector2<f64>]) -> Bounds<2> {
    let mut min = Vector2::repeat(f64::INFINITY);
    let mut max = Vector2::repeat(f64::NEG_INFINITY);
    for v in vertices {
        min = min.inf(v);
        max = max.sup(v);
    }
    Bounds::new(min, max)
}

impl EdgeGrid {
    fn build(vertices: &[Vector2<f64>], bounds: &Bounds<2>, grid_res: f64) -> Self {
        let per_axis = ((1.0 / grid_res).ceil() as usize).clamp(1, MAX_GRID_CELLS_PER_AXIS);
        let extent = bounds.max - bounds.min;
        let (nx, ny) = (per_axis, per_axis);
        let cell = Vector2::new(
            extent.x.max(f64::MIN_POSITIVE) / nx as f64,
            extent.y.max(f64::MIN_POSITIVE) / ny as f64,
        );
        let mut grid = Self {
            nx,
            ny,
            origin: bounds.min,
            cell,
            offsets: Vec::with_capacity(nx * ny + 1),
            edges: Vec::new(),
        };

        let n = vertices.len();
        let diagonal = cell.norm();
        let mut dist = vec![0.0; n];
        grid.offsets.push(0);
        for iy in 0..ny {
            for ix in 0..nx {
                let c = grid.center(ix, iy);
                let mut dmin = f64::INFINITY;
                for (i, d) in dist.iter_mut().enumerate() {
                    let a = vertices[i];
                    let b = vertices[(i + 1) % n];
                    *d = (closest_on_segment(&a, &b, &c) - c).norm();
                    dmin = dmin.min(*d);
                }
                // Anything nearest to a point of this cell is within dmin + diagonal of the centre.
                let limit = dmin + diagonal;
                grid.edges.extend((0..n).filter(|&i| dist[i] <= limit));
                grid.offsets.push(grid.edges.len());
            }
        }
        grid
    }

    fn center(&self, ix: usize, iy: usize) -> Vector2<f64> {
        self.origin
            + Vector2::new(
                (ix as f64 + 0.5) * self.cell.x,
                (iy as f64 + 0.5) * self.cell.y,
            )
    }

    fn cell_of(&self, p: &Vector2<f64>) -> Option<usize> {
        let rel = p - self.origin;
        let fx = rel.x / self.cell.x;
        let fy = rel.y / self.cell.y;
        if !(fx >= 0.0 && fy >= 0.0 && fx <= self.nx as f64 && fy <= self.ny as f64) {
            return None;
        }
        let ix = (fx as usize).min(self.nx - 1);
        let iy = (fy as usize).min(self.ny - 1);
        Some(iy * self.nx + ix)
    }

    fn candidates(&self, cell: usize) -> &[usize] {
        &self.edges[self.offsets[cell]..self.offsets[cell + 1]]
    }
}

impl Region<2> for Polygon {
    fn signed_distance(&self, p: &SVector<f64, 2>) -> f64 {
        let (_, d_sq) = self.nearest_boundary_point(p);
        let d = d_sq.sqrt();
        if self.winding_number(p) != 0 { -d } else { d }
    }

    fn contains_within(&self, p: &SVector<f64, 2>, tolerance: f64) -> bool {
        if self.winding_number(p) != 0 {
            return true;
        }
        let (_, d_sq) = self.nearest_boundary_point(p);
        d_sq <= tolerance * tolerance
    }

    fn project_to_boundary(&self, p: &SVector<f64, 2>) -> SVector<f64, 2> {
        self.nearest_boundary_point(p).0
    }

    fn sample_point(&self, rng: &mut XorShift64Star) -> SVector<f64, 2> {
        for _ in 0..MAX_REJECTION_ATTEMPTS {
            let p = rng.next_in_box(&self.bounds.min, &self.bounds.max);
            if self.winding_number(&p) != 0 {
                return p;
            }
        }
        self.inscribed_center
    }

    fn measure(&self) -> f64 {
        self.area
    }

    fn bounds(&self) -> Bounds<2> {
        self.bounds
    }

    /// Frames are similarities, so the edge grid and inscribed circle carry over by mapping
    /// their geometry instead of being recomputed.
    fn transformed(&self, frame: &Frame<2>) -> Self {
        let s = frame.scale();
        Self {
            vertices: self.vertices.iter().map(|v| frame.to_local(v)).collect(),
            area: self.area / (s * s),
            bounds: Bounds::new(
                frame.to_local(&self.bounds.min),
                frame.to_local(&self.bounds.max),
            ),
            grid_res: self.grid_res,
            grid: EdgeGrid {
                origin: frame.to_local(&self.grid.origin),
                cell: self.grid.cell / s,
                ..self.grid.clone()
            },
            inscribed_center: frame.to_local(&self.inscribed_center),
            inscribed_radius: self.inscribed_radius / s,
        }
    }

    /// Square inscribed in the inscribed circle, scaled like the default placement box.
    fn placement_box(&self, rect_scale: f64) -> Bounds<2> {
        let h = Vector2::repeat(self.inscribed_radius * rect_scale / 2.0);
        Bounds::new(self.inscribed_center - h, self.inscribed_center + h)
    }
}
