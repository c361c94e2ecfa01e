//! Target regions for relaxation.
//!
//! Shapes are closed sum types ([`PlanarShape`], [`SolidShape`], wrapped by [`Shape`]) so the
//! set of supported regions is fixed and every match over them is exhaustive. The engine itself
//! only sees the [`Region`] capability trait.

use nalgebra::SVector;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::rng::XorShift64Star;

mod planar;
mod polygon;
mod primitive;
mod solid;

pub use planar::{Disk, Rectangle, Square};
pub use polygon::Polygon;
pub use solid::{Cube, Parallelepiped, Sphere};

/// Distance outside a region still reported as inside by [`Region::contains`].
pub const CONTAINS_TOLERANCE: f64 = 1e-9;

pub(crate) const MAX_REJECTION_ATTEMPTS: usize = 4096;

/// Axis-aligned box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds<const D: usize> {
    pub min: SVector<f64, D>,
    pub max: SVector<f64, D>,
}

impl<const D: usize> Bounds<D> {
    pub fn new(min: SVector<f64, D>, max: SVector<f64, D>) -> Self {
        Self { min, max }
    }

    pub fn center(&self) -> SVector<f64, D> {
        (self.min + self.max) * 0.5
    }

    pub fn half_extents(&self) -> SVector<f64, D> {
        (self.max - self.min) * 0.5
    }

    pub fn contains(&self, p: &SVector<f64, D>) -> bool {
        (0..D).all(|i| p[i] >= self.min[i] && p[i] <= self.max[i])
    }

    /// Box with the same centre and half-extents multiplied by `factor`.
    pub fn scaled(&self, factor: f64) -> Self {
        let c = self.center();
        let h = self.half_extents() * factor;
        Self::new(c - h, c + h)
    }
}

/// Similarity transform between caller coordinates and the relaxation frame.
///
/// The relaxation frame places the region's bounding box at the origin and scales it so its
/// extent along the last axis is 2 (the unit disk becomes the disk of radius 1 centred at
/// `(1, 1)`). Length tunables in `SpringConfig` are expressed in this frame, which makes one
/// configuration work for regions of any size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame<const D: usize> {
    scale: f64,
    shift: SVector<f64, D>,
}

impl<const D: usize> Frame<D> {
    pub fn identity() -> Self {
        Self {
            scale: 1.0,
            shift: SVector::zeros(),
        }
    }

    pub fn fit(bounds: &Bounds<D>) -> Result<Self> {
        let extent = bounds.max[D - 1] - bounds.min[D - 1];
        if !(extent.is_finite() && extent > 0.0) {
            return Err(Error::degenerate("region has no extent along its last axis"));
        }
        Ok(Self {
            scale: extent / 2.0,
            shift: bounds.min,
        })
    }

    /// Caller units per frame unit.
    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn to_local(&self, p: &SVector<f64, D>) -> SVector<f64, D> {
        (p - self.shift) / self.scale
    }

    pub fn to_world(&self, p: &SVector<f64, D>) -> SVector<f64, D> {
        p * self.scale + self.shift
    }
}

/// What the relaxation engine needs from a target region.
pub trait Region<const D: usize>: Send + Sync {
    /// Negative inside, zero on the boundary, positive outside. Magnitude is the distance to
    /// the boundary.
    fn signed_distance(&self, p: &SVector<f64, D>) -> f64;

    fn contains_within(&self, p: &SVector<f64, D>, tolerance: f64) -> bool {
        self.signed_distance(p) <= tolerance
    }

    fn contains(&self, p: &SVector<f64, D>) -> bool {
        self.contains_within(p, CONTAINS_TOLERANCE)
    }

    /// Nearest point on the boundary. Boundary points are fixed points.
    fn project_to_boundary(&self, p: &SVector<f64, D>) -> SVector<f64, D>;

    /// Uniformly distributed point inside the region.
    fn sample_point(&self, rng: &mut XorShift64Star) -> SVector<f64, D>;

    /// Area in 2D, volume in 3D.
    fn measure(&self) -> f64;

    fn bounds(&self) -> Bounds<D>;

    /// The same region expressed in `frame`'s local coordinates.
    fn transformed(&self, frame: &Frame<D>) -> Self
    where
        Self: Sized;

    /// Box that initial placements are spread over, `rect_scale / 2` times the half-extent of
    /// the bounding box around its centre. With `rect_scale = sqrt(2)` this is the square
    /// inscribed in a disk.
    fn placement_box(&self, rect_scale: f64) -> Bounds<D> {
        self.bounds().scaled(rect_scale / 2.0)
    }
}

/// The 2D target regions.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanarShape {
    Disk(Disk),
    Square(Square),
    Rectangle(Rectangle),
    Polygon(Polygon),
}

/// The 3D target regions.
#[derive(Debug, Clone, PartialEq)]
pub enum SolidShape {
    Sphere(Sphere),
    Cube(Cube),
    Parallelepiped(Parallelepiped),
}

macro_rules! dispatch {
    (PlanarShape, $self:expr, $s:ident => $body:expr) => {
        match $self {
            PlanarShape::Disk($s) => $body,
            PlanarShape::Square($s) => $body,
            PlanarShape::Rectangle($s) => $body,
            PlanarShape::Polygon($s) => $body,
        }
    };
    (SolidShape, $self:expr, $s:ident => $body:expr) => {
        match $self {
            SolidShape::Sphere($s) => $body,
            SolidShape::Cube($s) => $body,
            SolidShape::Parallelepiped($s) => $body,
        }
    };
}

impl Region<2> for PlanarShape {
    fn signed_distance(&self, p: &SVector<f64, 2>) -> f64 {
        dispatch!(PlanarShape, self, s => s.signed_distance(p))
    }

    fn project_to_boundary(&self, p: &SVector<f64, 2>) -> SVector<f64, 2> {
        dispatch!(PlanarShape, self, s => s.project_to_boundary(p))
    }

    fn sample_point(&self, rng: &mut XorShift64Star) -> SVector<f64, 2> {
        dispatch!(PlanarShape, self, s => s.sample_point(rng))
    }

    fn measure(&self) -> f64 {
        dispatch!(PlanarShape, self, s => s.measure())
    }

    fn bounds(&self) -> Bounds<2> {
        dispatch!(PlanarShape, self, s => s.bounds())
    }

    fn transformed(&self, frame: &Frame<2>) -> Self {
        match self {
            Self::Disk(s) => Self::Disk(s.transformed(frame)),
            Self::Square(s) => Self::Square(s.transformed(frame)),
            Self::Rectangle(s) => Self::Rectangle(s.transformed(frame)),
            Self::Polygon(s) => Self::Polygon(s.transformed(frame)),
        }
    }

    fn placement_box(&self, rect_scale: f64) -> Bounds<2> {
        dispatch!(PlanarShape, self, s => s.placement_box(rect_scale))
    }
}

impl Region<3> for SolidShape {
    fn signed_distance(&self, p: &SVector<f64, 3>) -> f64 {
        dispatch!(SolidShape, self, s => s.signed_distance(p))
    }

    fn project_to_boundary(&self, p: &SVector<f64, 3>) -> SVector<f64, 3> {
        dispatch!(SolidShape, self, s => s.project_to_boundary(p))
    }

    fn sample_point(&self, rng: &mut XorShift64Star) -> SVector<f64, 3> {
        dispatch!(SolidShape, self, s => s.sample_point(rng))
    }

    fn measure(&self) -> f64 {
        dispatch!(SolidShape, self, s => s.measure())
    }

    fn bounds(&self) -> Bounds<3> {
        dispatch!(SolidShape, self, s => s.bounds())
    }

    fn transformed(&self, frame: &Frame<3>) -> Self {
        match self {
            Self::Sphere(s) => Self::Sphere(s.transformed(frame)),
            Self::Cube(s) => Self::Cube(s.transformed(frame)),
            Self::Parallelepiped(s) => Self::Parallelepiped(s.transformed(frame)),
        }
    }
}

/// Any supported target region, 2D or 3D.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Planar(PlanarShape),
    Solid(SolidShape),
}

impl Shape {
    pub fn dim(&self) -> usize {
        match self {
            Self::Planar(_) => 2,
            Self::Solid(_) => 3,
        }
    }

    /// Enclosed area, `None` for 3D shapes.
    pub fn area(&self) -> Option<f64> {
        match self {
            Self::Planar(s) => Some(s.measure()),
            Self::Solid(_) => None,
        }
    }

    /// Enclosed volume, `None` for 2D shapes.
    pub fn volume(&self) -> Option<f64> {
        match self {
            Self::Planar(_) => None,
            Self::Solid(s) => Some(s.measure()),
        }
    }

    pub fn measure(&self) -> f64 {
        match self {
            Self::Planar(s) => s.measure(),
            Self::Solid(s) => s.measure(),
        }
    }

    pub fn contains(&self, p: &[f64]) -> Result<bool> {
        match self {
            Self::Planar(s) => Ok(s.contains(&vector::<2>(p)?)),
            Self::Solid(s) => Ok(s.contains(&vector::<3>(p)?)),
        }
    }

    pub fn signed_distance(&self, p: &[f64]) -> Result<f64> {
        match self {
            Self::Planar(s) => Ok(s.signed_distance(&vector::<2>(p)?)),
            Self::Solid(s) => Ok(s.signed_distance(&vector::<3>(p)?)),
        }
    }

    pub fn project_to_boundary(&self, p: &[f64]) -> Result<Vec<f64>> {
        match self {
            Self::Planar(s) => Ok(s.project_to_boundary(&vector::<2>(p)?).as_slice().to_vec()),
            Self::Solid(s) => Ok(s.project_to_boundary(&vector::<3>(p)?).as_slice().to_vec()),
        }
    }

    pub fn sample_point(&self, rng: &mut XorShift64Star) -> Vec<f64> {
        match self {
            Self::Planar(s) => s.sample_point(rng).as_slice().to_vec(),
            Self::Solid(s) => s.sample_point(rng).as_slice().to_vec(),
        }
    }
}

impl From<PlanarShape> for Shape {
    fn from(s: PlanarShape) -> Self {
        Self::Planar(s)
    }
}

impl From<SolidShape> for Shape {
    fn from(s: SolidShape) -> Self {
        Self::Solid(s)
    }
}

macro_rules! into_shape {
    ($($ty:ident => $outer:ident :: $variant:ident),+ $(,)?) => {
        $(
            impl From<$ty> for $outer {
                fn from(s: $ty) -> Self {
                    Self::$variant(s)
                }
            }

            impl From<$ty> for Shape {
                fn from(s: $ty) -> Self {
                    Shape::from($outer::$variant(s))
                }
            }
        )+
    };
}

into_shape!(
    Disk => PlanarShape::Disk,
    Square => PlanarShape::Square,
    Rectangle => PlanarShape::Rectangle,
    Polygon => PlanarShape::Polygon,
    Sphere => SolidShape::Sphere,
    Cube => SolidShape::Cube,
    Parallelepiped => SolidShape::Parallelepiped,
);

pub(crate) fn vector<const D: usize>(p: &[f64]) -> Result<SVector<f64, D>> {
    if p.len() != D {
        return Err(Error::DimensionMismatch {
            expected: D,
            found: p.len(),
        });
    }
    Ok(SVector::<f64, D>::from_column_slice(p))
}

/// Serializable shape description, tagged by `"type"`.
///
/// ```
/// use unispring::ShapeSpec;
///
/// let spec: ShapeSpec = serde_json::from_str(r#"{"type":"disk","center":[0,0],"radius":1}"#)?;
/// assert_eq!(spec.build(0.01).unwrap().dim(), 2);
/// # Ok::<(), serde_json::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ShapeSpec {
    Disk { center: [f64; 2], radius: f64 },
    /// Axis-aligned square with lower-left corner `lower`.
    Square { lower: [f64; 2], side: f64 },
    Rectangle { lower: [f64; 2], upper: [f64; 2] },
    /// Vertex ring in either orientation; a repeated closing vertex is accepted.
    Polygon { vertices: Vec<[f64; 2]> },
    Sphere { center: [f64; 3], radius: f64 },
    Cube { lower: [f64; 3], side: f64 },
    Parallelepiped { lower: [f64; 3], upper: [f64; 3] },
}

impl ShapeSpec {
    /// Validates the parameters and builds the shape. `polygon_grid_res` only affects polygons.
    pub fn build(&self, polygon_grid_res: f64) -> Result<Shape> {
        Ok(match self {
            Self::Disk { center, radius } => Disk::new(*center, *radius)?.into(),
            Self::Square { lower, side } => Square::new(*lower, *side)?.into(),
            Self::Rectangle { lower, upper } => Rectangle::new(*lower, *upper)?.into(),
            Self::Polygon { vertices } => {
                Polygon::with_grid_resolution(vertices, polygon_grid_res)?.into()
            }
            Self::Sphere { center, radius } => Sphere::new(*center, *radius)?.into(),
            Self::Cube { lower, side } => Cube::new(*lower, *side)?.into(),
            Self::Parallelepiped { lower, upper } => Parallelepiped::new(*lower, *upper)?.into(),
        })
    }
}
